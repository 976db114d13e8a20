use crate::error::{KbcError, Result};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Error,
}

/// Per-target result of an operation fanned out over several stacks or
/// users. Failures keep the remote error body so nothing is dropped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome {
    pub status: OutcomeStatus,
    pub response: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
}

impl Outcome {
    pub fn success(response: Value) -> Self {
        Self {
            status: OutcomeStatus::Success,
            response,
            http_status: None,
        }
    }

    pub fn failure(err: &KbcError) -> Self {
        let response = match err {
            KbcError::Api { body, .. } => body.clone(),
            other => Value::String(other.to_string()),
        };
        Self {
            status: OutcomeStatus::Error,
            response,
            http_status: err.status(),
        }
    }

    pub fn from_result(result: Result<Value>) -> Self {
        match result {
            Ok(v) => Self::success(v),
            Err(e) => {
                tracing::warn!(error = %e, "operation failed");
                Self::failure(&e)
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}
