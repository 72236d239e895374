//! A [`ChatBackend`] that replays canned replies.
//!
//! Used by the crate's own tests and by downstream tests that need to drive
//! the stages without a network. Every request is recorded so tests can
//! assert on what would have been sent.

use super::{ChatBackend, ChatFuture};
use crate::{ChatCompletion, ChatRequest, GateError};
use std::collections::VecDeque;
use std::sync::Mutex;

enum ScriptedReply {
    Content { model: Option<String>, content: String },
    Failure { status: Option<u16>, message: String },
}

/// Replays queued replies in order; errors once the queue is exhausted.
#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply whose reported model echoes the requested one.
    pub fn with_reply(self, content: impl Into<String>) -> Self {
        self.push(ScriptedReply::Content {
            model: None,
            content: content.into(),
        });
        self
    }

    /// Queue a reply that reports a specific model name.
    pub fn with_reply_from(self, model: impl Into<String>, content: impl Into<String>) -> Self {
        self.push(ScriptedReply::Content {
            model: Some(model.into()),
            content: content.into(),
        });
        self
    }

    /// Queue a JSON value as the reply content.
    pub fn with_json(self, value: serde_json::Value) -> Self {
        self.with_reply(value.to_string())
    }

    /// Queue an upstream failure.
    pub fn with_failure(self, status: Option<u16>, message: impl Into<String>) -> Self {
        self.push(ScriptedReply::Failure {
            status,
            message: message.into(),
        });
        self
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Replies still queued.
    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn push(&self, reply: ScriptedReply) {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(reply);
    }
}

impl ChatBackend for ScriptedBackend {
    fn complete<'a>(&'a self, request: &'a ChatRequest) -> ChatFuture<'a> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());
        let next = self
            .replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();

        let result = match next {
            Some(ScriptedReply::Content { model, content }) => Ok(ChatCompletion {
                model: model.unwrap_or_else(|| request.model.clone()),
                content,
                usage: None,
            }),
            Some(ScriptedReply::Failure { status, message }) => {
                Err(GateError::Upstream {
                    status,
                    message,
                    transport: false,
                })
            }
            None => Err(GateError::upstream("scripted backend has no reply left")),
        };
        Box::pin(async move { result })
    }

    fn provider(&self) -> &str {
        "scripted"
    }
}
