//! Bounded tool-calling generation loop.
//!
//! # Rounds
//!
//! 1. Send `system prompt + history + query` with the tool schemas.
//! 2. If the reply requests tools and this is not the last round, run
//!    each call in the order requested, append the call and its result to
//!    the transcript, and start the next round with the same schemas.
//! 3. Otherwise the reply text is final. Tool requests in the last round,
//!    or with no tools registered, are ignored.
//!
//! With `max_rounds = 2` the model gets one tool round and one answer
//! round; with `max_rounds = 1` it answers directly.
//!
//! Tool failures (unknown tool, bad arguments, handler error) become the
//! text of the tool result so the model can adapt. Completion failures end
//! the loop with [`RagError::Generation`] and are not retried.

use std::sync::Arc;

use crate::error::{RagError, RagResult};
use crate::llm::{ChatMessage, CompletionClient};
use crate::models::{ConversationTurn, Role, Source};
use crate::tools::ToolRegistry;

pub const SYSTEM_PROMPT: &str = "\
You are an assistant for questions about course materials, with a search tool over the course content.

Search tool usage:
- Search only for questions about specific course content or lesson material
- At most one search per query
- Build the answer from what the search returns
- If the search finds nothing, or reports that no course matches, say so plainly; never invent a course, lesson, or source

Answering:
- General knowledge questions: answer directly without searching
- Course-specific questions: search first, then answer
- Give the answer only: no description of your reasoning or of the search, and no phrases like \"based on the search results\"

Keep every answer brief, accurate, and clear, with an example when it helps understanding.";

/// Result of one [`Generator::answer`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedAnswer {
    pub text: String,
    /// Citations from executed tool calls, deduplicated by label in
    /// first-seen order.
    pub sources: Vec<Source>,
    /// Completion requests made.
    pub rounds: usize,
}

pub struct Generator {
    client: Arc<dyn CompletionClient>,
    system_prompt: String,
    max_rounds: usize,
}

impl Generator {
    pub fn new(client: Arc<dyn CompletionClient>, max_rounds: usize) -> Self {
        Self {
            client,
            system_prompt: SYSTEM_PROMPT.to_string(),
            max_rounds: max_rounds.max(1),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    pub async fn answer(
        &self,
        query: &str,
        history: &[ConversationTurn],
        tools: &ToolRegistry,
    ) -> RagResult<GeneratedAnswer> {
        let schemas = tools.list_schemas();

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(self.system_prompt.as_str()));
        for turn in history {
            messages.push(match turn.role {
                Role::User => ChatMessage::user(turn.content.as_str()),
                Role::Assistant => ChatMessage::assistant(turn.content.as_str()),
            });
        }
        messages.push(ChatMessage::user(query));

        let mut sources: Vec<Source> = Vec::new();

        for round in 1..=self.max_rounds {
            let completion = self.client.complete(&messages, &schemas).await.map_err(|e| match e {
                RagError::Generation(_) => e,
                other => RagError::generation(other),
            })?;

            let last_round = round == self.max_rounds || tools.is_empty();
            if !completion.wants_tools() || last_round {
                if completion.wants_tools() {
                    tracing::debug!(round, calls = completion.tool_calls.len(), "ignoring tool calls in final round");
                }
                let text = completion.text.ok_or_else(|| {
                    RagError::Generation(format!("round {} produced no answer text", round))
                })?;
                return Ok(GeneratedAnswer {
                    text,
                    sources,
                    rounds: round,
                });
            }

            messages.push(ChatMessage::assistant_tool_calls(
                completion.text.clone(),
                completion.tool_calls.clone(),
            ));

            for call in &completion.tool_calls {
                let content = match tools.invoke(&call.name, call.arguments.clone()).await {
                    Ok(output) => {
                        for source in output.sources {
                            if !sources.iter().any(|s| s.label == source.label) {
                                sources.push(source);
                            }
                        }
                        output.content
                    }
                    Err(e) => {
                        tracing::warn!(round, tool = %call.name, error = %e, "tool call failed");
                        e.to_string()
                    }
                };
                tracing::debug!(round, tool = %call.name, "tool call executed");
                messages.push(ChatMessage::tool_result(call.id.as_str(), content));
            }
        }

        Err(RagError::Generation(
            "round bound reached without a final answer".to_string(),
        ))
    }
}
