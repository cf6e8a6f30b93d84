use crate::domain::api::{ApiRequest, Verb};
use crate::domain::ports::StripeBackend;
use crate::error::StripeError;
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// `created` timestamp stamped on every emulated object.
pub const CREATED: i64 = 1_700_000_000;
/// Test token whose charges are always declined.
pub const DECLINED_TOKEN: &str = "tok_chargeDeclined";

const DEFAULT_LIST_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Collection {
    Charges,
    Customers,
    PaymentIntents,
    Refunds,
    Products,
    Prices,
}

impl Collection {
    fn from_path(segment: &str) -> Option<Self> {
        match segment {
            "charges" => Some(Self::Charges),
            "customers" => Some(Self::Customers),
            "payment_intents" => Some(Self::PaymentIntents),
            "refunds" => Some(Self::Refunds),
            "products" => Some(Self::Products),
            "prices" => Some(Self::Prices),
            _ => None,
        }
    }

    fn path(self) -> &'static str {
        match self {
            Self::Charges => "charges",
            Self::Customers => "customers",
            Self::PaymentIntents => "payment_intents",
            Self::Refunds => "refunds",
            Self::Products => "products",
            Self::Prices => "prices",
        }
    }

    fn object(self) -> &'static str {
        match self {
            Self::Charges => "charge",
            Self::Customers => "customer",
            Self::PaymentIntents => "payment_intent",
            Self::Refunds => "refund",
            Self::Products => "product",
            Self::Prices => "price",
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            Self::Charges => "ch",
            Self::Customers => "cus",
            Self::PaymentIntents => "pi",
            Self::Refunds => "re",
            Self::Products => "prod",
            Self::Prices => "price",
        }
    }

    /// Fields present as `null` until a parameter sets them.
    fn nullable_fields(self) -> &'static [&'static str] {
        match self {
            Self::Charges => &["customer", "description", "receipt_email"],
            Self::Customers => &["description", "email", "name", "phone"],
            Self::PaymentIntents => &["customer", "description", "payment_method"],
            Self::Refunds => &["charge", "payment_intent", "reason"],
            Self::Products => &["description"],
            Self::Prices => &["nickname", "unit_amount"],
        }
    }

    fn deletable(self) -> bool {
        matches!(self, Self::Customers | Self::Products)
    }
}

/// A deterministic, process-local stand-in for the Stripe API.
///
/// Ids come from a per-instance counter (`ch_00000000000001`, ...) and every
/// object carries the same `created` timestamp, so identical call sequences
/// produce identical responses. Covers the resources of the standard registry.
#[derive(Default, Clone)]
pub struct InMemoryStripe {
    objects: Arc<RwLock<HashMap<String, Value>>>,
    sequence: Arc<AtomicU64>,
}

impl InMemoryStripe {
    /// Creates a new, empty emulator.
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self, prefix: &str) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{prefix}_{seq:014}")
    }

    async fn create(
        &self,
        collection: Collection,
        mut params: Map<String, Value>,
    ) -> Result<Value, StripeError> {
        let mut objects = self.objects.write().await;
        let id = self.next_id(collection.prefix());
        let computed = match collection {
            Collection::Charges => self.charge_fields(&mut params)?,
            Collection::Customers => fields(json!({"balance": 0, "delinquent": false})),
            Collection::PaymentIntents => payment_intent_fields(&mut params)?,
            Collection::Refunds => refund_fields(&mut objects, &params)?,
            Collection::Products => {
                required(&params, "name")?;
                fields(json!({"active": params.get("active").cloned().unwrap_or(json!(true))}))
            }
            Collection::Prices => price_fields(&objects, &params)?,
        };

        let mut object = fields(json!({
            "id": id,
            "object": collection.object(),
            "created": CREATED,
            "livemode": false,
            "metadata": {},
        }));
        for field in collection.nullable_fields() {
            object.insert(field.to_string(), Value::Null);
        }
        merge(&mut object, params);
        object.extend(computed);

        let object = Value::Object(object);
        objects.insert(id, object.clone());
        Ok(object)
    }

    async fn retrieve(&self, collection: Collection, id: &str) -> Result<Value, StripeError> {
        let objects = self.objects.read().await;
        objects
            .get(id)
            .filter(|object| is_a(object, collection))
            .cloned()
            .ok_or_else(|| StripeError::resource_missing(collection.object(), id))
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        params: Map<String, Value>,
    ) -> Result<Value, StripeError> {
        let mut objects = self.objects.write().await;
        let object = find_mut(&mut objects, collection, id)?;
        merge(object, params);
        Ok(Value::Object(object.clone()))
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<Value, StripeError> {
        let mut objects = self.objects.write().await;
        find_mut(&mut objects, collection, id)?;
        objects.remove(id);
        Ok(json!({"id": id, "object": collection.object(), "deleted": true}))
    }

    async fn list(
        &self,
        collection: Collection,
        params: &Map<String, Value>,
    ) -> Result<Value, StripeError> {
        let limit = match params.get("limit") {
            None | Some(Value::Null) => DEFAULT_LIST_LIMIT,
            Some(limit) => limit
                .as_u64()
                .filter(|limit| (1..=100).contains(limit))
                .ok_or_else(|| {
                    StripeError::invalid_request("Invalid integer: limit must be between 1 and 100")
                        .with_param("limit")
                })? as usize,
        };
        let customer = params.get("customer").and_then(Value::as_str);

        let objects = self.objects.read().await;
        let mut data: Vec<Value> = objects
            .values()
            .filter(|object| is_a(object, collection))
            .filter(|object| customer.is_none_or(|c| object["customer"] == c))
            .cloned()
            .collect();
        // Newest first; ids embed a zero-padded sequence.
        data.sort_by(|a, b| b["id"].as_str().cmp(&a["id"].as_str()));

        let has_more = data.len() > limit;
        data.truncate(limit);
        Ok(json!({
            "object": "list",
            "data": data,
            "has_more": has_more,
            "url": format!("/v1/{}", collection.path()),
        }))
    }

    async fn act(
        &self,
        collection: Collection,
        id: &str,
        action: &str,
        params: Map<String, Value>,
    ) -> Result<Value, StripeError> {
        let mut objects = self.objects.write().await;
        let object = find_mut(&mut objects, collection, id)?;
        match (collection, action) {
            (Collection::Charges, "capture") => capture_charge(object, &params)?,
            (Collection::PaymentIntents, "confirm") => confirm_intent(object, params)?,
            (Collection::PaymentIntents, "capture") => capture_intent(object, &params)?,
            (Collection::PaymentIntents, "cancel") => cancel_intent(object, &params)?,
            _ => {
                return Err(StripeError::invalid_request(format!(
                    "Unrecognized request URL (POST /v1/{}/{id}/{action})",
                    collection.path()
                ))
                .with_status(404));
            }
        }
        Ok(Value::Object(object.clone()))
    }

    fn charge_fields(
        &self,
        params: &mut Map<String, Value>,
    ) -> Result<Map<String, Value>, StripeError> {
        let amount = positive_amount(params, "amount")?;
        required(params, "currency")?;
        let source = params
            .get("source")
            .and_then(Value::as_str)
            .map(str::to_owned);
        if source.is_none() && params.get("customer").is_none_or(Value::is_null) {
            return Err(StripeError::invalid_request("Must provide source or customer.")
                .with_code("parameter_missing")
                .with_param("source"));
        }
        if source.as_deref() == Some(DECLINED_TOKEN) {
            return Err(StripeError::new("card_error", "Your card was declined.")
                .with_code("card_declined")
                .with_decline_code("generic_decline")
                .with_status(402));
        }

        let captured = params
            .remove("capture")
            .and_then(|capture| capture.as_bool())
            .unwrap_or(true);
        let mut computed = fields(json!({
            "status": "succeeded",
            "paid": true,
            "captured": captured,
            "amount_captured": if captured { amount } else { 0 },
            "amount_refunded": 0,
            "refunded": false,
        }));
        if source.is_some() {
            params.remove("source");
            let card = self.next_id("card");
            computed.insert("payment_method".into(), json!(card));
            computed.insert("source".into(), json!({"id": card, "object": "card"}));
        }
        Ok(computed)
    }
}

#[async_trait]
impl StripeBackend for InMemoryStripe {
    async fn execute(&self, request: ApiRequest) -> Result<Value, StripeError> {
        let (collection, id, action) = route(&request)?;
        let params = request.params.clone();
        match (request.verb, id, action) {
            (Verb::Post, None, None) => self.create(collection, params).await,
            (Verb::Get, None, None) => self.list(collection, &params).await,
            (Verb::Get, Some(id), None) => self.retrieve(collection, id).await,
            (Verb::Post, Some(id), None) => self.update(collection, id, params).await,
            (Verb::Delete, Some(id), None) if collection.deletable() => {
                self.delete(collection, id).await
            }
            (Verb::Post, Some(id), Some(action)) => self.act(collection, id, action, params).await,
            _ => Err(unrecognized(&request)),
        }
    }
}

fn route(request: &ApiRequest) -> Result<(Collection, Option<&str>, Option<&str>), StripeError> {
    let segments: Vec<&str> = request.segments.iter().map(String::as_str).collect();
    match segments.as_slice() {
        ["v1", collection, rest @ ..] if rest.len() <= 2 => {
            let collection =
                Collection::from_path(collection).ok_or_else(|| unrecognized(request))?;
            Ok((collection, rest.first().copied(), rest.get(1).copied()))
        }
        _ => Err(unrecognized(request)),
    }
}

fn unrecognized(request: &ApiRequest) -> StripeError {
    StripeError::invalid_request(format!(
        "Unrecognized request URL ({} {})",
        request.verb,
        request.path()
    ))
    .with_status(404)
}

fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn is_a(object: &Value, collection: Collection) -> bool {
    object.get("object").and_then(Value::as_str) == Some(collection.object())
}

fn find_mut<'a>(
    objects: &'a mut HashMap<String, Value>,
    collection: Collection,
    id: &str,
) -> Result<&'a mut Map<String, Value>, StripeError> {
    objects
        .get_mut(id)
        .filter(|object| is_a(object, collection))
        .and_then(Value::as_object_mut)
        .ok_or_else(|| StripeError::resource_missing(collection.object(), id))
}

/// Applies parameters to an object. `metadata` merges key by key and an empty
/// value unsets a key; identity fields are never overwritten.
fn merge(object: &mut Map<String, Value>, params: Map<String, Value>) {
    for (key, value) in params {
        if matches!(key.as_str(), "id" | "object" | "created") {
            continue;
        }
        match value {
            Value::Object(entries) if key == "metadata" => {
                let metadata = object
                    .entry("metadata")
                    .or_insert_with(|| json!({}));
                if let Some(metadata) = metadata.as_object_mut() {
                    for (name, entry) in entries {
                        if entry.is_null() || entry == "" {
                            metadata.remove(&name);
                        } else {
                            metadata.insert(name, entry);
                        }
                    }
                }
            }
            value => {
                object.insert(key, value);
            }
        }
    }
}

fn required<'a>(params: &'a Map<String, Value>, name: &str) -> Result<&'a Value, StripeError> {
    params
        .get(name)
        .filter(|value| !value.is_null())
        .ok_or_else(|| StripeError::missing_param(name))
}

fn positive_amount(params: &Map<String, Value>, name: &str) -> Result<u64, StripeError> {
    required(params, name)?
        .as_u64()
        .filter(|amount| *amount > 0)
        .ok_or_else(|| {
            StripeError::invalid_request(format!("Invalid positive integer: {name}"))
                .with_code("parameter_invalid_integer")
                .with_param(name)
        })
}

fn unexpected_state(intent: &Map<String, Value>, action: &str) -> StripeError {
    let status = intent["status"].as_str().unwrap_or_default();
    StripeError::invalid_request(format!(
        "You cannot {action} this PaymentIntent because it has a status of {status}."
    ))
    .with_code("payment_intent_unexpected_state")
}

fn payment_intent_fields(
    params: &mut Map<String, Value>,
) -> Result<Map<String, Value>, StripeError> {
    let amount = positive_amount(params, "amount")?;
    required(params, "currency")?;
    let confirm = params
        .remove("confirm")
        .and_then(|confirm| confirm.as_bool())
        .unwrap_or(false);
    let manual = params.get("capture_method").and_then(Value::as_str) == Some("manual");
    let has_method = params.get("payment_method").is_some_and(|m| !m.is_null());

    let status = match (has_method, confirm, manual) {
        (false, _, _) => "requires_payment_method",
        (true, false, _) => "requires_confirmation",
        (true, true, true) => "requires_capture",
        (true, true, false) => "succeeded",
    };
    Ok(fields(json!({
        "status": status,
        "capture_method": if manual { "manual" } else { "automatic" },
        "amount_received": if status == "succeeded" { amount } else { 0 },
    })))
}

fn refund_fields(
    objects: &mut HashMap<String, Value>,
    params: &Map<String, Value>,
) -> Result<Map<String, Value>, StripeError> {
    let requested = match params.get("amount") {
        None | Some(Value::Null) => None,
        Some(_) => Some(positive_amount(params, "amount")?),
    };

    if let Some(charge_id) = params.get("charge").and_then(Value::as_str) {
        let charge = find_mut(objects, Collection::Charges, charge_id)?;
        let captured = charge["amount_captured"].as_u64().unwrap_or_default();
        let amount = book_refund(charge, captured, requested, "charge")?;
        let fully_refunded = charge["amount_refunded"] == json!(captured);
        charge.insert("refunded".into(), json!(fully_refunded));
        return Ok(fields(json!({"amount": amount, "status": "succeeded"})));
    }

    if let Some(intent_id) = params.get("payment_intent").and_then(Value::as_str) {
        let intent = find_mut(objects, Collection::PaymentIntents, intent_id)?;
        let received = intent["amount_received"].as_u64().unwrap_or_default();
        if received == 0 {
            return Err(StripeError::invalid_request(format!(
                "PaymentIntent {intent_id} does not have a successful charge to refund."
            ))
            .with_code("charge_not_refundable"));
        }
        let amount = book_refund(intent, received, requested, "payment intent")?;
        return Ok(fields(json!({"amount": amount, "status": "succeeded"})));
    }

    Err(StripeError::missing_param("charge"))
}

/// Adds a refund of `requested` (default: all that is left of `paid`) to the
/// object's `amount_refunded`.
fn book_refund(
    object: &mut Map<String, Value>,
    paid: u64,
    requested: Option<u64>,
    noun: &str,
) -> Result<u64, StripeError> {
    let refunded = object
        .get("amount_refunded")
        .and_then(Value::as_u64)
        .unwrap_or_default();
    let remaining = paid.saturating_sub(refunded);
    let amount = requested.unwrap_or(remaining);
    if amount == 0 || amount > remaining {
        return Err(StripeError::invalid_request(format!(
            "Refund amount ({amount}) is greater than unrefunded amount on {noun} ({remaining})"
        ))
        .with_code("amount_too_large")
        .with_param("amount"));
    }
    object.insert("amount_refunded".into(), json!(refunded + amount));
    Ok(amount)
}

fn price_fields(
    objects: &HashMap<String, Value>,
    params: &Map<String, Value>,
) -> Result<Map<String, Value>, StripeError> {
    required(params, "currency")?;
    let product = required(params, "product")?.as_str().unwrap_or_default();
    if !objects
        .get(product)
        .is_some_and(|object| is_a(object, Collection::Products))
    {
        return Err(StripeError::resource_missing("product", product));
    }
    let kind = if params.get("recurring").is_some_and(|r| !r.is_null()) {
        "recurring"
    } else {
        "one_time"
    };
    Ok(fields(json!({"active": true, "type": kind})))
}

fn capture_charge(
    charge: &mut Map<String, Value>,
    params: &Map<String, Value>,
) -> Result<(), StripeError> {
    if charge["captured"] == true {
        let id = charge["id"].as_str().unwrap_or_default();
        return Err(
            StripeError::invalid_request(format!("Charge {id} has already been captured."))
                .with_code("charge_already_captured"),
        );
    }
    let amount = charge["amount"].as_u64().unwrap_or_default();
    let captured = capture_amount(params, "amount", amount)?;
    charge.insert("captured".into(), json!(true));
    charge.insert("amount_captured".into(), json!(captured));
    Ok(())
}

/// The amount to capture: `name` if given, else the whole `authorized` amount.
fn capture_amount(
    params: &Map<String, Value>,
    name: &str,
    authorized: u64,
) -> Result<u64, StripeError> {
    let amount = match params.get(name) {
        None | Some(Value::Null) => return Ok(authorized),
        Some(_) => positive_amount(params, name)?,
    };
    if amount > authorized {
        return Err(StripeError::invalid_request(format!(
            "The amount to capture ({amount}) is greater than the authorized amount ({authorized})."
        ))
        .with_code("amount_too_large")
        .with_param(name));
    }
    Ok(amount)
}

fn confirm_intent(
    intent: &mut Map<String, Value>,
    params: Map<String, Value>,
) -> Result<(), StripeError> {
    let status = intent["status"].as_str().unwrap_or_default();
    if !matches!(status, "requires_payment_method" | "requires_confirmation") {
        return Err(unexpected_state(intent, "confirm"));
    }
    merge(intent, params);
    if intent["payment_method"].is_null() {
        return Err(StripeError::invalid_request(
            "You cannot confirm this PaymentIntent because it's missing a payment method.",
        )
        .with_code("payment_intent_unexpected_state"));
    }

    if intent["capture_method"] == "manual" {
        intent.insert("status".into(), json!("requires_capture"));
    } else {
        let amount = intent["amount"].clone();
        intent.insert("status".into(), json!("succeeded"));
        intent.insert("amount_received".into(), amount);
    }
    Ok(())
}

fn capture_intent(
    intent: &mut Map<String, Value>,
    params: &Map<String, Value>,
) -> Result<(), StripeError> {
    if intent["status"] != "requires_capture" {
        return Err(unexpected_state(intent, "capture"));
    }
    let amount = intent["amount"].as_u64().unwrap_or_default();
    let received = capture_amount(params, "amount_to_capture", amount)?;
    intent.insert("status".into(), json!("succeeded"));
    intent.insert("amount_received".into(), json!(received));
    Ok(())
}

fn cancel_intent(
    intent: &mut Map<String, Value>,
    params: &Map<String, Value>,
) -> Result<(), StripeError> {
    if matches!(intent["status"].as_str(), Some("succeeded" | "canceled")) {
        return Err(unexpected_state(intent, "cancel"));
    }
    let reason = params
        .get("cancellation_reason")
        .cloned()
        .unwrap_or(Value::Null);
    intent.insert("status".into(), json!("canceled"));
    intent.insert("cancellation_reason".into(), reason);
    Ok(())
}
