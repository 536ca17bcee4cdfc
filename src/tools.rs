//! Tools the language model can call during generation.
//!
//! A [`Tool`] declares a name, a one-line description, and a JSON Schema
//! for its parameters. The [`ToolRegistry`] hands those schemas to the
//! completion endpoint verbatim and dispatches requested calls by exact
//! name match.
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │            ToolRegistry             │
//! │  ┌───────────────────────────────┐  │
//! │  │ search_course_content         │  │
//! │  │  course_name → resolve_course │  │
//! │  │  query       → search_semantic│  │
//! │  └───────────────────────────────┘  │
//! └──────────────────┬──────────────────┘
//!                    ▼
//!          Generator (tool rounds)
//! ```

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{RagError, RagResult};
use crate::index::Index;
use crate::models::{CourseSummary, SearchFilter, SearchHit, SearchResult, Source};

/// What a tool hands back to the generator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    /// Text appended to the transcript as the tool result.
    pub content: String,
    pub results: SearchResult,
    /// Citations, one per result, in result order.
    pub sources: Vec<Source>,
}

impl ToolOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }
}

/// A capability the language model may invoke.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use serde_json::{json, Value};
/// use course_rag::error::RagResult;
/// use course_rag::tools::{Tool, ToolOutput};
///
/// pub struct EchoTool;
///
/// #[async_trait]
/// impl Tool for EchoTool {
///     fn name(&self) -> &str { "echo" }
///     fn description(&self) -> &str { "Repeat the input" }
///
///     fn parameters_schema(&self) -> Value {
///         json!({
///             "type": "object",
///             "properties": { "text": { "type": "string" } },
///             "required": ["text"]
///         })
///     }
///
///     async fn execute(&self, params: Value) -> RagResult<ToolOutput> {
///         Ok(ToolOutput::text(params["text"].as_str().unwrap_or_default()))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Lowercase identifier with underscores, e.g. `"search_course_content"`.
    fn name(&self) -> &str;

    /// One-line description the model uses to decide whether to call the tool.
    fn description(&self) -> &str;

    /// JSON Schema object (`type: "object"`) for the parameters.
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, params: Value) -> RagResult<ToolOutput>;
}

pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Registry holding the course search tool.
    pub fn with_course_search(index: Arc<Index>) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(CourseSearchTool::new(index)));
        registry
    }

    /// Register a tool, replacing any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        match self.tools.iter().position(|t| t.name() == tool.name()) {
            Some(i) => self.tools[i] = tool,
            None => self.tools.push(tool),
        }
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    /// Schemas in OpenAI function-calling format, in registration order.
    pub fn list_schemas(&self) -> Vec<Value> {
        self.tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name(),
                        "description": t.description(),
                        "parameters": t.parameters_schema(),
                    }
                })
            })
            .collect()
    }

    pub async fn invoke(&self, name: &str, params: Value) -> RagResult<ToolOutput> {
        let tool = self
            .find(name)
            .ok_or_else(|| RagError::ToolNotFound(name.to_string()))?;
        tool.execute(params).await
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Semantic search over course content with optional course and lesson filters.
pub struct CourseSearchTool {
    index: Arc<Index>,
}

impl CourseSearchTool {
    pub const NAME: &'static str = "search_course_content";

    pub fn new(index: Arc<Index>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl Tool for CourseSearchTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Search course materials with smart course name matching and lesson filtering"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to search for in the course content"
                },
                "course_name": {
                    "type": "string",
                    "description": "Course title (partial matches work, e.g. 'MCP', 'Introduction')"
                },
                "lesson_number": {
                    "type": "integer",
                    "description": "Specific lesson number to search within (e.g. 1, 2, 3)"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value) -> RagResult<ToolOutput> {
        let query = params["query"].as_str().unwrap_or("").trim();
        if query.is_empty() {
            return Err(RagError::tool(Self::NAME, "query must not be empty"));
        }

        let course_name = params["course_name"]
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let lesson_id = lesson_number(&params["lesson_number"]);

        let course_id = match course_name {
            None => None,
            Some(name) => match self.index.resolve_course_name(name).await {
                Ok(id) => Some(id),
                Err(e @ RagError::CourseNotResolved(_)) => {
                    return Ok(ToolOutput::text(e.to_string()));
                }
                Err(e) => {
                    tracing::warn!(tool = Self::NAME, error = %e, "course lookup failed");
                    return Ok(ToolOutput::text("No relevant content found."));
                }
            },
        };

        let filter = SearchFilter {
            course_id: course_id.clone(),
            lesson_id,
        };
        let results = match self.index.search_semantic(query, &filter, None).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(tool = Self::NAME, error = %e, "search failed");
                return Ok(ToolOutput::text("No relevant content found."));
            }
        };

        if results.is_empty() {
            let mut msg = String::from("No relevant content found");
            if let Some(c) = &course_id {
                msg.push_str(&format!(" in course '{}'", c));
            }
            if let Some(l) = lesson_id {
                msg.push_str(&format!(" in lesson {}", l));
            }
            msg.push('.');
            return Ok(ToolOutput::text(msg));
        }

        let content = results
            .iter()
            .map(|hit| format!("[{}]\n{}", hit.source_label(), hit.text.trim()))
            .collect::<Vec<_>>()
            .join("\n\n");
        let sources = self.sources_for(&results).await;

        Ok(ToolOutput {
            content,
            results,
            sources,
        })
    }
}

impl CourseSearchTool {
    /// One citation per hit, linked to its lesson (or course) page when the
    /// course document named one.
    async fn sources_for(&self, results: &[SearchHit]) -> Vec<Source> {
        let mut courses: HashMap<&str, Option<CourseSummary>> = HashMap::new();
        for hit in results {
            if courses.contains_key(hit.course_id.as_str()) {
                continue;
            }
            let summary = match self.index.get_course(&hit.course_id).await {
                Ok(summary) => summary,
                Err(e) => {
                    tracing::warn!(tool = Self::NAME, course = %hit.course_id, error = %e, "course lookup for links failed");
                    None
                }
            };
            courses.insert(hit.course_id.as_str(), summary);
        }

        results
            .iter()
            .map(|hit| {
                let link = courses
                    .get(hit.course_id.as_str())
                    .and_then(Option::as_ref)
                    .and_then(|course| match hit.lesson_id {
                        Some(n) => course.lesson_link(n),
                        None => course.course_link.as_deref(),
                    })
                    .map(str::to_string);
                Source::new(hit.source_label(), link)
            })
            .collect()
    }
}

/// Accept `2`, `2.0` or `"2"`; models are loose with integer arguments.
fn lesson_number(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))
            .and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{HashEmbedder, Similarity};
    use crate::models::Lesson;
    use crate::segment::segment;
    use crate::store::InMemoryStore;

    async fn seeded_index() -> Arc<Index> {
        let index = Index::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(HashEmbedder::default()),
            Similarity::Cosine,
            5,
        );
        let mut course = CourseSummary::new("Linear Algebra");
        course.lessons.push(Lesson {
            number: 1,
            title: "Vectors".to_string(),
            link: Some("https://example.com/linalg/1".to_string()),
        });
        course.lessons.push(Lesson {
            number: 2,
            title: "Matrices".to_string(),
            link: None,
        });
        index.upsert_course_summary(&course).await.unwrap();
        let mut units = segment("Linear Algebra", Some(1), "A vector has magnitude and direction.", 800, 100);
        units.extend(segment("Linear Algebra", Some(2), "A matrix is a grid of numbers.", 800, 100));
        index.upsert_units(&units).await.unwrap();
        Arc::new(index)
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry.invoke("nope", json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "Tool 'nope' not found");
    }

    #[tokio::test]
    async fn test_schema_listing() {
        let registry = ToolRegistry::with_course_search(seeded_index().await);
        let schemas = registry.list_schemas();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0]["function"]["name"], "search_course_content");
        assert_eq!(schemas[0]["function"]["parameters"]["required"][0], "query");
    }

    #[tokio::test]
    async fn test_register_replaces_same_name() {
        let index = seeded_index().await;
        let mut registry = ToolRegistry::with_course_search(index.clone());
        registry.register(Box::new(CourseSearchTool::new(index)));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_search_formats_results_and_sources() {
        let registry = ToolRegistry::with_course_search(seeded_index().await);
        let out = registry
            .invoke(
                "search_course_content",
                json!({"query": "vector", "course_name": "linear algebra", "lesson_number": 1}),
            )
            .await
            .unwrap();
        assert_eq!(out.results.len(), 1);
        assert_eq!(
            out.sources,
            vec![Source::new(
                "Linear Algebra - Lesson 1",
                Some("https://example.com/linalg/1".to_string())
            )]
        );
        assert!(out
            .content
            .starts_with("[Linear Algebra - Lesson 1]\nA vector has"));
    }

    #[tokio::test]
    async fn test_lesson_without_link_has_bare_source() {
        let registry = ToolRegistry::with_course_search(seeded_index().await);
        let out = registry
            .invoke(
                "search_course_content",
                json!({"query": "matrix", "course_name": "Linear Algebra", "lesson_number": 2}),
            )
            .await
            .unwrap();
        assert_eq!(out.sources, vec![Source::new("Linear Algebra - Lesson 2", None)]);
    }

    #[tokio::test]
    async fn test_unresolved_course_is_not_an_error() {
        let registry = ToolRegistry::with_course_search(seeded_index().await);
        let out = registry
            .invoke(
                "search_course_content",
                json!({"query": "soufflé", "course_name": "quantum cooking"}),
            )
            .await
            .unwrap();
        assert_eq!(out.content, "No course found matching 'quantum cooking'");
        assert!(out.sources.is_empty());
    }

    #[tokio::test]
    async fn test_empty_lesson_reports_no_content() {
        let registry = ToolRegistry::with_course_search(seeded_index().await);
        let out = registry
            .invoke(
                "search_course_content",
                json!({"query": "vector", "course_name": "Linear Algebra", "lesson_number": 9}),
            )
            .await
            .unwrap();
        assert_eq!(
            out.content,
            "No relevant content found in course 'Linear Algebra' in lesson 9."
        );
    }

    #[tokio::test]
    async fn test_missing_query_is_tool_error() {
        let registry = ToolRegistry::with_course_search(seeded_index().await);
        let err = registry
            .invoke("search_course_content", json!({"course_name": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::ToolExecution { .. }));
    }

    #[test]
    fn test_lesson_number_coercion() {
        assert_eq!(lesson_number(&json!(2)), Some(2));
        assert_eq!(lesson_number(&json!(2.0)), Some(2));
        assert_eq!(lesson_number(&json!("3")), Some(3));
        assert_eq!(lesson_number(&json!(-1)), None);
        assert_eq!(lesson_number(&Value::Null), None);
    }
}
