use crate::domain::api::{ApiRequest, RequestOptions, Verb};
use crate::error::StripeError;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static STANDARD: LazyLock<Registry> = LazyLock::new(Registry::build_standard);

/// One position in an operation's parameter schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Path identifier of an existing object.
    Id,
    /// Object of request parameters.
    Params,
}

/// The shape of a Stripe client method: which verb it uses, whether it
/// addresses a single object, and what it takes positionally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Create,
    Retrieve,
    Update,
    Delete,
    List,
    /// A `POST` on a sub-path of an object, e.g. `capture`.
    Action(&'static str),
}

impl MethodKind {
    pub fn verb(self) -> Verb {
        match self {
            Self::Retrieve | Self::List => Verb::Get,
            Self::Delete => Verb::Delete,
            Self::Create | Self::Update | Self::Action(_) => Verb::Post,
        }
    }

    /// Positional schema; an options object may follow the last slot.
    pub fn slots(self) -> &'static [Slot] {
        match self {
            Self::Create | Self::List => &[Slot::Params],
            Self::Delete => &[Slot::Id],
            Self::Retrieve | Self::Update | Self::Action(_) => &[Slot::Id, Slot::Params],
        }
    }
}

/// A registered method, bound to the API collection it operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    collection: &'static str,
    kind: MethodKind,
}

impl Operation {
    pub fn kind(&self) -> MethodKind {
        self.kind
    }

    pub fn slots(&self) -> &'static [Slot] {
        self.kind.slots()
    }

    /// Binds positional arguments to this operation's schema.
    ///
    /// Missing trailing arguments count as `null`. One argument past the schema
    /// is read as [`RequestOptions`]; anything after that is ignored.
    pub fn bind(&self, positional: Vec<Value>) -> Result<ApiRequest, StripeError> {
        let mut values = positional.into_iter();
        let mut segments = vec!["v1".to_string(), self.collection.to_string()];
        let mut params = Map::new();

        for slot in self.slots() {
            let value = values.next().unwrap_or(Value::Null);
            match slot {
                Slot::Id => segments.push(bind_id(value)?),
                Slot::Params => params = bind_params(value)?,
            }
        }
        if let MethodKind::Action(action) = self.kind {
            segments.push(action.to_string());
        }

        let options = match values.next() {
            None | Some(Value::Null) => RequestOptions::default(),
            Some(value) => serde_json::from_value(value).map_err(|e| {
                StripeError::invalid_request(format!("Invalid request options: {e}"))
            })?,
        };

        Ok(ApiRequest {
            verb: self.kind.verb(),
            segments,
            params,
            options,
        })
    }
}

fn bind_id(value: Value) -> Result<String, StripeError> {
    match value {
        Value::String(id) if !id.trim().is_empty() => Ok(id),
        Value::Null => Err(StripeError::missing_param("id")),
        _ => Err(StripeError::invalid_request(
            "Stripe: Argument \"id\" must be a non-empty string",
        )
        .with_param("id")),
    }
}

fn bind_params(value: Value) -> Result<Map<String, Value>, StripeError> {
    match value {
        Value::Null => Ok(Map::new()),
        Value::Object(params) => Ok(params),
        other => Err(StripeError::invalid_request(format!(
            "Stripe: Unknown arguments ({other}). Did you mean to pass an options object?"
        ))),
    }
}

/// A named group of methods, e.g. `charges`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    collection: &'static str,
    operations: BTreeMap<&'static str, Operation>,
}

impl Resource {
    /// `collection` is the API path segment, e.g. `payment_intents`.
    pub fn new(collection: &'static str) -> Self {
        Self {
            collection,
            operations: BTreeMap::new(),
        }
    }

    pub fn method(mut self, name: &'static str, kind: MethodKind) -> Self {
        let operation = Operation {
            collection: self.collection,
            kind,
        };
        self.operations.insert(name, operation);
        self
    }

    pub fn operation(&self, name: &str) -> Option<&Operation> {
        self.operations.get(name)
    }

    pub fn methods(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.operations.keys().copied()
    }
}

/// Resource name to [`Resource`] lookup table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    resources: BTreeMap<&'static str, Resource>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The table of every resource this crate knows how to call.
    pub fn standard() -> &'static Registry {
        &STANDARD
    }

    pub fn with_resource(mut self, name: &'static str, resource: Resource) -> Self {
        self.resources.insert(name, resource);
        self
    }

    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.get(name)
    }

    pub fn resources(&self) -> impl Iterator<Item = (&'static str, &Resource)> {
        self.resources.iter().map(|(name, resource)| (*name, resource))
    }

    fn build_standard() -> Self {
        use MethodKind::*;

        Self::new()
            .with_resource(
                "charges",
                Resource::new("charges")
                    .method("create", Create)
                    .method("retrieve", Retrieve)
                    .method("update", Update)
                    .method("capture", Action("capture"))
                    .method("list", List),
            )
            .with_resource(
                "customers",
                Resource::new("customers")
                    .method("create", Create)
                    .method("retrieve", Retrieve)
                    .method("update", Update)
                    .method("del", Delete)
                    .method("list", List),
            )
            .with_resource(
                "paymentIntents",
                Resource::new("payment_intents")
                    .method("create", Create)
                    .method("retrieve", Retrieve)
                    .method("update", Update)
                    .method("confirm", Action("confirm"))
                    .method("capture", Action("capture"))
                    .method("cancel", Action("cancel"))
                    .method("list", List),
            )
            .with_resource(
                "refunds",
                Resource::new("refunds")
                    .method("create", Create)
                    .method("retrieve", Retrieve)
                    .method("update", Update)
                    .method("list", List),
            )
            .with_resource(
                "products",
                Resource::new("products")
                    .method("create", Create)
                    .method("retrieve", Retrieve)
                    .method("update", Update)
                    .method("del", Delete)
                    .method("list", List),
            )
            .with_resource(
                "prices",
                Resource::new("prices")
                    .method("create", Create)
                    .method("retrieve", Retrieve)
                    .method("update", Update)
                    .method("list", List),
            )
    }
}
