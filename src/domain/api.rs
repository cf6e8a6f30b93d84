use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// HTTP verb of a Stripe API operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    Get,
    Post,
    Delete,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        })
    }
}

/// Per-request options, the trailing argument every Stripe client method accepts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    #[serde(default, alias = "idempotency_key")]
    pub idempotency_key: Option<String>,
    #[serde(default, alias = "stripe_account")]
    pub stripe_account: Option<String>,
    #[serde(default, alias = "api_version")]
    pub api_version: Option<String>,
}

/// A fully bound call, ready for a [`StripeBackend`](super::ports::StripeBackend).
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub verb: Verb,
    /// Unencoded path segments, e.g. `["v1", "charges", "ch_123", "capture"]`.
    pub segments: Vec<String>,
    pub params: Map<String, Value>,
    pub options: RequestOptions,
}

impl ApiRequest {
    pub fn new(verb: Verb, segments: Vec<String>) -> Self {
        Self {
            verb,
            segments,
            params: Map::new(),
            options: RequestOptions::default(),
        }
    }

    pub fn path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }
}
