//! Application layer: the dispatch pipeline and the table of callable operations.
//!
//! [`dispatcher::Dispatcher`] resolves a resource and a method against a
//! [`registry::Registry`], binds the caller's arguments, and hands the bound request
//! to whichever [`StripeBackend`](crate::domain::ports::StripeBackend) it owns.

pub mod dispatcher;
pub mod registry;
