//! In-memory collaborators for unit tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::llm_client::{
    Completion, CompletionContent, LanguageModel, Message, ResponseSchema, TokenUsage,
    UpstreamError,
};

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model: String,
    pub messages: Vec<Message>,
    pub schema: Option<String>,
}

/// Replies from a queue and remembers every request.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<Completion, UpstreamError>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(self, text: &str) -> Self {
        self.reply(Ok(Completion {
            content: CompletionContent::Text(text.to_string()),
            usage: TokenUsage {
                prompt_tokens: 100,
                completion_tokens: 20,
            },
        }))
    }

    pub fn structured(self, value: Value, usage: TokenUsage) -> Self {
        self.reply(Ok(Completion {
            content: CompletionContent::Structured(value),
            usage,
        }))
    }

    pub fn failing(self, err: UpstreamError) -> Self {
        self.reply(Err(err))
    }

    fn reply(self, reply: Result<Completion, UpstreamError>) -> Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(
        &self,
        model: &str,
        messages: &[Message],
        schema: Option<&ResponseSchema>,
    ) -> Result<Completion, UpstreamError> {
        self.calls.lock().unwrap().push(RecordedCall {
            model: model.to_string(),
            messages: messages.to_vec(),
            schema: schema.map(|s| s.name.clone()),
        });
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(UpstreamError::Transport("no scripted reply".to_string())))
    }
}
