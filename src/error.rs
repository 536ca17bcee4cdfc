//! Error taxonomy for the query and ingestion pipeline.
//!
//! Every component translates its infrastructure failures (SQLite, HTTP,
//! JSON, I/O) into one of the [`RagError`] kinds at its public boundary.
//! Nothing past [`RagSystem`](crate::rag::RagSystem) sees a raw `sqlx` or
//! `reqwest` error.
//!
//! | Kind | Raised by | Handling |
//! |------|-----------|----------|
//! | `Ingestion` | document parsing / extraction | lesson or file skipped |
//! | `IndexUnavailable` | [`Index`](crate::index::Index) | fatal to ingestion, "no results" for queries |
//! | `ToolNotFound` | [`ToolRegistry`](crate::tools::ToolRegistry) | surfaced inline as tool output |
//! | `ToolExecution` | tool handlers | surfaced inline as tool output |
//! | `Generation` | completion endpoint | surfaced to the caller, no retry |
//! | `CourseNotResolved` | fuzzy course lookup | tool answers "no matching course" |

use thiserror::Error;

/// Result alias used at component boundaries.
pub type RagResult<T> = std::result::Result<T, RagError>;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("ingestion error: {0}")]
    Ingestion(String),

    #[error("index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Tool '{0}' not found")]
    ToolNotFound(String),

    #[error("tool '{tool}' failed: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("No course found matching '{0}'")]
    CourseNotResolved(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl RagError {
    pub fn index<E: std::fmt::Display>(err: E) -> Self {
        RagError::IndexUnavailable(err.to_string())
    }

    pub fn generation<E: std::fmt::Display>(err: E) -> Self {
        RagError::Generation(err.to_string())
    }

    pub fn ingestion<E: std::fmt::Display>(err: E) -> Self {
        RagError::Ingestion(err.to_string())
    }

    pub fn tool(tool: &str, message: impl Into<String>) -> Self {
        RagError::ToolExecution {
            tool: tool.to_string(),
            message: message.into(),
        }
    }

    /// Machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            RagError::Ingestion(_) => "ingestion_error",
            RagError::IndexUnavailable(_) => "index_unavailable",
            RagError::ToolNotFound(_) => "tool_not_found",
            RagError::ToolExecution { .. } => "tool_error",
            RagError::Generation(_) => "generation_failed",
            RagError::CourseNotResolved(_) => "course_not_resolved",
            RagError::Config(_) => "config_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_not_found_message() {
        let err = RagError::ToolNotFound("lookup".to_string());
        assert_eq!(err.to_string(), "Tool 'lookup' not found");
        assert_eq!(err.code(), "tool_not_found");
    }

    #[test]
    fn test_course_not_resolved_message() {
        let err = RagError::CourseNotResolved("quantum cooking".to_string());
        assert_eq!(err.to_string(), "No course found matching 'quantum cooking'");
    }

    #[test]
    fn test_helpers_wrap_display() {
        let err = RagError::index("database is locked");
        assert!(matches!(err, RagError::IndexUnavailable(ref m) if m == "database is locked"));
        let err = RagError::tool("search_course_content", "query must not be empty");
        assert_eq!(
            err.to_string(),
            "tool 'search_course_content' failed: query must not be empty"
        );
    }
}
