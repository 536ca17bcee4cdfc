#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use course_rag::config::Config;
use course_rag::embedding::HashEmbedder;
use course_rag::error::{RagError, RagResult};
use course_rag::llm::{ChatMessage, Completion, CompletionClient, ToolCall};
use course_rag::rag::RagSystem;
use course_rag::store::{InMemoryStore, VectorStore};

/// Completion endpoint double: replays canned replies in order and records
/// every request it receives.
pub struct ScriptedClient {
    replies: Mutex<Vec<Completion>>,
    pub requests: Mutex<Vec<(Vec<ChatMessage>, Vec<Value>)>>,
}

impl ScriptedClient {
    pub fn new(replies: Vec<Completion>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().rev().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn transcript(&self, n: usize) -> Vec<ChatMessage> {
        self.requests.lock().unwrap()[n].0.clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, messages: &[ChatMessage], tools: &[Value]) -> RagResult<Completion> {
        self.requests
            .lock()
            .unwrap()
            .push((messages.to_vec(), tools.to_vec()));
        self.replies
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| RagError::Generation("no scripted reply left".to_string()))
    }
}

pub fn search_call(id: &str, arguments: Value) -> Completion {
    Completion::tool_calls(vec![ToolCall {
        id: id.to_string(),
        name: "search_course_content".to_string(),
        arguments,
    }])
}

pub fn memory_system(client: Arc<ScriptedClient>) -> RagSystem {
    system_with_store(Config::minimal(), Arc::new(InMemoryStore::new()), client)
}

pub fn system_with_store(
    config: Config,
    store: Arc<dyn VectorStore>,
    client: Arc<ScriptedClient>,
) -> RagSystem {
    RagSystem::new(config, store, Arc::new(HashEmbedder::default()), client)
}

pub const LINALG: &str = "Course Title: LinAlg
Course Link: https://example.com/linalg
Course Instructor: Ada Lovelace

Lesson 1: Intro to Vectors
Lesson Link: https://example.com/linalg/1
A vector is a quantity with magnitude and direction. Vectors can be added component by component.
";
