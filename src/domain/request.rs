use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key in [`DispatchInput::env`] holding the Stripe secret key.
pub const SECRET_KEY: &str = "STRIPE_SECRET";
/// Key in [`DispatchInput::env`] overriding the Stripe API base URL.
pub const API_BASE_KEY: &str = "STRIPE_API_BASE";

/// A serialized description of one Stripe client call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchInput {
    pub args: CallArgs,
    /// Ambient settings for the call. Only string entries are read; anything else is carried along.
    #[serde(default)]
    pub env: Map<String, Value>,
}

impl DispatchInput {
    pub fn new(args: CallArgs) -> Self {
        Self {
            args,
            env: Map::new(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), Value::String(value.into()));
        self
    }

    pub fn secret(&self) -> Option<&str> {
        self.env.get(SECRET_KEY).and_then(Value::as_str)
    }
}

/// Resource and method names plus the named arguments of the call.
///
/// Any key besides `resource`, `method` and `paramOrder` is a named argument.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallArgs {
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param_order: Option<Vec<String>>,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl CallArgs {
    pub fn new(resource: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            method: method.into(),
            ..Self::default()
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: Value) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    pub fn order<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.param_order = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Reads the named arguments in `order`, yielding `null` for names that were not supplied.
    pub fn positional(&self, order: &[String]) -> Vec<Value> {
        order
            .iter()
            .map(|name| self.params.get(name).cloned().unwrap_or(Value::Null))
            .collect()
    }
}
