use super::api::ApiRequest;
use crate::error::StripeError;
use async_trait::async_trait;
use serde_json::Value;

/// The downstream Stripe client: executes one bound request and returns the
/// response object, or the error Stripe reported.
#[async_trait]
pub trait StripeBackend: Send + Sync {
    async fn execute(&self, request: ApiRequest) -> Result<Value, StripeError>;
}

pub type StripeBackendBox = Box<dyn StripeBackend>;
