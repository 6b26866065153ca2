//! Outbound request builders
//!
//! Builders return the request body without a `req_id`; the connection
//! manager stamps the identifier in just before the frame is queued or sent.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{Result, StreamError};

/// Request body, a JSON object
pub type Payload = Map<String, Value>;

/// Parameters for placing an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderParams {
    /// Stake or payout, depending on `basis`
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub basis: String,
    pub contract_type: String,
    pub currency: String,
    pub duration: u32,
    pub duration_unit: String,
    /// Underlying symbol
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barrier: Option<String>,
    /// Maximum price the caller accepts
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
}

pub fn ticks_subscribe(symbol: &str) -> Payload {
    object(json!({ "ticks": symbol, "subscribe": 1 }))
}

/// Bulk unsubscribe; the service has no per-topic variant.
pub fn forget_all_ticks() -> Payload {
    object(json!({ "forget_all": "ticks" }))
}

pub fn ticks_history(symbol: &str, count: u32) -> Payload {
    object(json!({
        "ticks_history": symbol,
        "count": count,
        "end": "latest",
        "style": "ticks",
    }))
}

pub fn authorize(token: &str) -> Payload {
    object(json!({ "authorize": token }))
}

pub fn logout() -> Payload {
    object(json!({ "logout": 1 }))
}

/// Balance request that also subscribes to later balance changes
pub fn balance() -> Payload {
    object(json!({ "balance": 1, "subscribe": 1 }))
}

pub fn buy(params: &OrderParams) -> Result<Payload> {
    let parameters = serde_json::to_value(params)?;
    let price = parameters.get("price").cloned().unwrap_or(Value::Null);
    let mut parameters = match parameters {
        Value::Object(map) => map,
        _ => return Err(StreamError::Parse("order parameters are not an object".to_string())),
    };
    parameters.remove("price");
    Ok(object(json!({ "buy": 1, "price": price, "parameters": parameters })))
}

pub fn ping() -> Payload {
    object(json!({ "ping": 1 }))
}

/// Serialize a payload carrying the given request identifier
pub fn encode(payload: &Payload, req_id: Option<u64>) -> Result<String> {
    match req_id {
        Some(id) => {
            let mut stamped = payload.clone();
            stamped.insert("req_id".to_string(), Value::from(id));
            Ok(serde_json::to_string(&stamped)?)
        }
        None => Ok(serde_json::to_string(payload)?),
    }
}

/// Accept any JSON value that is an object
pub fn payload_from(value: Value) -> Result<Payload> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(StreamError::Parse(format!(
            "request payload must be a JSON object, got {}",
            other
        ))),
    }
}

fn object(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        _ => Payload::new(),
    }
}
