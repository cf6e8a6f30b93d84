use crate::error::DispatchError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The structured error handed to callers: `{code, message, cause?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResult {
    pub code: u8,
    pub message: String,
    /// The downstream Stripe error, for code 4 only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Value>,
}

impl From<DispatchError> for ErrorResult {
    fn from(err: DispatchError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            cause: err
                .cause()
                .and_then(|cause| serde_json::to_value(cause).ok()),
        }
    }
}

/// Exactly one of a success payload or an error.
///
/// Serializes as `{"ok": <payload>}` or `{"error": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchOutcome {
    Ok(Value),
    Error(ErrorResult),
}

impl DispatchOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    pub fn ok(&self) -> Option<&Value> {
        match self {
            Self::Ok(value) => Some(value),
            Self::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorResult> {
        match self {
            Self::Ok(_) => None,
            Self::Error(err) => Some(err),
        }
    }

    /// Splits into the two callback arguments; exactly one is `Some`.
    pub fn into_parts(self) -> (Option<Value>, Option<ErrorResult>) {
        match self {
            Self::Ok(value) => (Some(value), None),
            Self::Error(err) => (None, Some(err)),
        }
    }
}

impl From<Result<Value, DispatchError>> for DispatchOutcome {
    fn from(result: Result<Value, DispatchError>) -> Self {
        match result {
            Ok(value) => Self::Ok(value),
            Err(err) => Self::Error(err.into()),
        }
    }
}
