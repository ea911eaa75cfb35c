use serde::{Deserialize, Serialize};

/// Outcome kind of a single step invocation point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultKind {
    Completed,
    Failed,
    Skipped,
}

/// The value produced by `Step::is_skip` and `Step::run`. Immutable once
/// constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub kind: ResultKind,
    pub message: Option<String>,
    pub payload: Option<serde_json::Value>,
}

impl StepResult {
    pub fn completed() -> Self {
        Self {
            kind: ResultKind::Completed,
            message: None,
            payload: None,
        }
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        Self {
            kind: ResultKind::Skipped,
            message: Some(message.into()),
            payload: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            kind: ResultKind::Failed,
            message: Some(message.into()),
            payload: None,
        }
    }

    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn is_failed(&self) -> bool {
        self.kind == ResultKind::Failed
    }

    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or("")
    }
}
