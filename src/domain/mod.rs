//! Domain types shared by every layer: what a caller asks for, what a call
//! resolves to, and the port the downstream Stripe client is reached through.

pub mod api;
pub mod outcome;
pub mod ports;
pub mod request;
