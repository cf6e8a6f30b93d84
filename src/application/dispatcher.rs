use crate::application::registry::{Operation, Registry, Resource};
use crate::domain::outcome::{DispatchOutcome, ErrorResult};
use crate::domain::ports::StripeBackendBox;
use crate::domain::request::{CallArgs, DispatchInput};
use crate::error::{DispatchError, Result, StripeError};
use crate::infrastructure::http::HttpBackend;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Resolves a serialized call against a [`Registry`] and runs it on a Stripe backend.
///
/// A dispatch moves through three stages (resource, method, invoke) and stops at the
/// first one that fails. Each dispatch issues at most one backend call.
pub struct Dispatcher<'r> {
    registry: &'r Registry,
    backend: StripeBackendBox,
}

impl Dispatcher<'static> {
    /// Creates a dispatcher over the standard registry.
    pub fn new(backend: StripeBackendBox) -> Self {
        Self::with_registry(Registry::standard(), backend)
    }
}

impl<'r> Dispatcher<'r> {
    pub fn with_registry(registry: &'r Registry, backend: StripeBackendBox) -> Self {
        Self { registry, backend }
    }

    /// Runs one call. Every failure is returned as [`DispatchOutcome::Error`].
    pub async fn dispatch(&self, input: DispatchInput) -> DispatchOutcome {
        let args = input.args;
        let result = self.run(&args).await;
        if let Err(err) = &result {
            warn!(
                code = err.code(),
                kind = err.kind(),
                resource = %args.resource,
                method = %args.method,
                "{err}"
            );
        }
        result.into()
    }

    /// Runs one call and hands the outcome to `callback`, exactly once.
    pub async fn dispatch_with<F>(&self, input: DispatchInput, callback: F)
    where
        F: FnOnce(Option<Value>, Option<ErrorResult>),
    {
        let (ok, err) = self.dispatch(input).await.into_parts();
        callback(ok, err)
    }

    async fn run(&self, args: &CallArgs) -> Result<Value> {
        let resource = self.resolve_resource(args)?;
        let operation = resolve_method(resource, args)?;
        self.invoke(operation, args).await
    }

    fn resolve_resource(&self, args: &CallArgs) -> Result<&'r Resource> {
        debug!(resource = %args.resource, "resolving resource");
        self.registry
            .resource(&args.resource)
            .ok_or_else(|| DispatchError::UnsupportedResource(args.resource.clone()))
    }

    async fn invoke(&self, operation: &Operation, args: &CallArgs) -> Result<Value> {
        let order = args
            .param_order
            .as_deref()
            .ok_or(DispatchError::MissingParamOrder)?;
        let downstream = |cause: StripeError| DispatchError::Stripe {
            resource: args.resource.clone(),
            method: args.method.clone(),
            cause,
        };

        let request = operation.bind(args.positional(order)).map_err(downstream)?;
        info!(verb = %request.verb, path = %request.path(), "calling stripe");
        self.backend.execute(request).await.map_err(downstream)
    }
}

fn resolve_method<'a>(resource: &'a Resource, args: &CallArgs) -> Result<&'a Operation> {
    debug!(resource = %args.resource, method = %args.method, "resolving method");
    resource
        .operation(&args.method)
        .ok_or_else(|| DispatchError::UnsupportedMethod(args.method.clone()))
}

/// Dispatches `input` against the live Stripe API.
///
/// The backend is built from `input.env` for this call only, so concurrent
/// calls never share a client.
pub async fn dispatch<F>(input: DispatchInput, callback: F)
where
    F: FnOnce(Option<Value>, Option<ErrorResult>),
{
    let backend = HttpBackend::from_env(&input.env);
    Dispatcher::new(Box::new(backend))
        .dispatch_with(input, callback)
        .await
}
