use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub type Result<T, E = DispatchError> = std::result::Result<T, E>;

/// Failures a dispatch can end in, one variant per error code.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("Unsupported resource type '{0}'")]
    UnsupportedResource(String),
    #[error("Unsupported Stripe client method '{0}'")]
    UnsupportedMethod(String),
    #[error(
        "The order of parameters could not be determined. Add a paramOrder argument to your function call"
    )]
    MissingParamOrder,
    #[error("Stripe returned an error for call to {resource}.{method}(...)")]
    Stripe {
        resource: String,
        method: String,
        #[source]
        cause: StripeError,
    },
}

impl DispatchError {
    pub fn code(&self) -> u8 {
        match self {
            Self::UnsupportedResource(_) => 1,
            Self::UnsupportedMethod(_) => 2,
            Self::MissingParamOrder => 3,
            Self::Stripe { .. } => 4,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedResource(_) => "unsupported_resource",
            Self::UnsupportedMethod(_) => "unsupported_method",
            Self::MissingParamOrder => "missing_param_order",
            Self::Stripe { .. } => "stripe_error",
        }
    }

    /// The downstream error, if this failure came from Stripe.
    pub fn cause(&self) -> Option<&StripeError> {
        match self {
            Self::Stripe { cause, .. } => Some(cause),
            _ => None,
        }
    }
}

/// An error object as the Stripe API reports it inside its `{"error": {...}}` envelope.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct StripeError {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decline_code: Option<String>,
    /// HTTP status of the failed response. Absent for errors raised before any request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl StripeError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            code: None,
            message: message.into(),
            param: None,
            decline_code: None,
            status: None,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new("invalid_request_error", message).with_status(400)
    }

    pub fn missing_param(param: &str) -> Self {
        Self::invalid_request(format!("Missing required param: {param}."))
            .with_code("parameter_missing")
            .with_param(param)
    }

    pub fn resource_missing(object: &str, id: &str) -> Self {
        Self::new("invalid_request_error", format!("No such {object}: '{id}'"))
            .with_code("resource_missing")
            .with_param("id")
            .with_status(404)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new("authentication_error", message).with_status(401)
    }

    pub fn api_connection(message: impl Into<String>) -> Self {
        Self::new("api_connection_error", message)
    }

    /// Parses a non-2xx response body, falling back to a generic `api_error`.
    pub fn from_envelope(body: &Value, status: u16) -> Self {
        body.get("error")
            .cloned()
            .and_then(|error| serde_json::from_value::<StripeError>(error).ok())
            .unwrap_or_else(|| {
                Self::new(
                    "api_error",
                    format!("Unexpected response from Stripe with status {status}"),
                )
            })
            .with_status(status)
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.param = Some(param.into());
        self
    }

    pub fn with_decline_code(mut self, decline_code: impl Into<String>) -> Self {
        self.decline_code = Some(decline_code.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

/// Errors raised while reading a dispatch input or writing its outcome.
#[derive(Error, Debug, Diagnostic)]
pub enum InputError {
    #[error("IO error: {0}")]
    #[diagnostic(code(stripe_dispatch::io))]
    IoError(#[from] std::io::Error),
    #[error("Malformed dispatch input: {0}")]
    #[diagnostic(
        code(stripe_dispatch::input),
        help("expected an object of the form {{\"args\": {{\"resource\": ..., \"method\": ...}}, \"env\": {{...}}}}")
    )]
    JsonError(#[from] serde_json::Error),
}
