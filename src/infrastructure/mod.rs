//! Adapters for the [`StripeBackend`](crate::domain::ports::StripeBackend) port.

pub mod form;
pub mod http;
pub mod in_memory;
