#![allow(dead_code)]

use serde_json::{Value, json};
use std::path::Path;
use stripe_dispatch::Dispatcher;
use stripe_dispatch::domain::request::DispatchInput;
use stripe_dispatch::infrastructure::in_memory::InMemoryStripe;

/// A dispatcher over the standard registry, backed by a fresh emulator.
pub fn memory_dispatcher() -> Dispatcher<'static> {
    Dispatcher::new(Box::new(InMemoryStripe::new()))
}

pub fn input(args: Value) -> DispatchInput {
    serde_json::from_value(json!({ "args": args })).expect("valid dispatch input")
}

pub fn charge_args() -> Value {
    json!({
        "resource": "charges",
        "method": "create",
        "charge": {
            "amount": 1099,
            "currency": "usd",
            "source": "tok_visa"
        },
        "paramOrder": ["charge"]
    })
}

pub fn customer_args() -> Value {
    json!({
        "resource": "customers",
        "method": "create",
        "customer": {
            "name": "Jenny Rosen",
            "email": "jennyrosen@example.com"
        },
        "paramOrder": ["customer"]
    })
}

pub fn write_input(path: &Path, args: Value) -> Result<(), std::io::Error> {
    let document = json!({ "args": args });
    std::fs::write(path, serde_json::to_vec_pretty(&document)?)
}
