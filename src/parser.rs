//! Parser module for inbound service frames
//!
//! Every frame is a JSON object. Replies echo the caller's `req_id`, pushes are
//! identified by `msg_type` and a topic-bearing field (`tick.symbol`).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, StreamError};

/// Service-reported error carried by a reply frame
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServiceError {
    pub code: String,
    pub message: String,
}

impl From<ServiceError> for StreamError {
    fn from(err: ServiceError) -> Self {
        StreamError::Service {
            code: err.code,
            message: err.message,
        }
    }
}

/// A single pushed price update
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Tick {
    /// Instrument symbol (the routing topic)
    pub symbol: String,

    /// Last quote
    pub quote: Decimal,

    /// Epoch seconds of the quote
    pub epoch: i64,

    #[serde(default)]
    pub bid: Option<Decimal>,

    #[serde(default)]
    pub ask: Option<Decimal>,

    /// Decimal places the service quotes this symbol with
    #[serde(default)]
    pub pip_size: Option<u32>,
}

/// Reply to a tick history request
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct History {
    pub prices: Vec<Decimal>,
    pub times: Vec<i64>,
}

impl History {
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

/// Identity returned by a successful authorization
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Account {
    pub loginid: String,
    pub currency: String,
    pub balance: Decimal,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub fullname: Option<String>,
}

/// Account balance, both as a reply and as a pushed update
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Balance {
    pub balance: Decimal,
    pub currency: String,
    #[serde(default)]
    pub loginid: Option<String>,
}

/// Receipt for a placed order
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OrderReceipt {
    pub contract_id: u64,
    pub transaction_id: u64,
    pub buy_price: Decimal,
    pub balance_after: Decimal,
    #[serde(default)]
    pub longcode: Option<String>,
}

/// Decoded inbound frame
#[derive(Debug, Clone)]
pub struct Inbound {
    /// Echoed request identifier, if the frame answers a request
    pub req_id: Option<u64>,

    /// Message type as named by the service
    pub msg_type: String,

    /// Service-reported failure
    pub error: Option<ServiceError>,

    /// Whole frame
    pub body: Value,
}

impl Inbound {
    /// Parse a raw text frame
    pub fn parse(raw: &str) -> Result<Self> {
        let body: Value = serde_json::from_str(raw)?;
        let object = body
            .as_object()
            .ok_or_else(|| StreamError::Parse("frame is not a JSON object".to_string()))?;

        let req_id = object.get("req_id").and_then(Value::as_u64);
        let msg_type = object
            .get("msg_type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let error = match object.get("error") {
            Some(raw_error) => Some(serde_json::from_value::<ServiceError>(raw_error.clone())?),
            None => None,
        };

        Ok(Self {
            req_id,
            msg_type,
            error,
            body,
        })
    }

    /// Decode the tick payload of a push frame
    pub fn tick(&self) -> Result<Tick> {
        self.field("tick")
    }

    /// Decode the balance payload
    pub fn balance(&self) -> Result<Balance> {
        self.field("balance")
    }

    /// Decode the payload stored under `name`
    pub fn field<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<T> {
        decode_field(&self.body, name)
    }

    /// Reply outcome: the service error if present, else the frame itself
    pub fn into_outcome(self) -> Result<Value> {
        match self.error {
            Some(error) => Err(error.into()),
            None => Ok(self.body),
        }
    }
}

/// Decode `frame[name]` into a typed payload
pub fn decode_field<T: serde::de::DeserializeOwned>(frame: &Value, name: &str) -> Result<T> {
    let payload = frame
        .get(name)
        .ok_or_else(|| StreamError::Parse(format!("frame has no `{}` field", name)))?;
    Ok(T::deserialize(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_tick_push() {
        let raw = r#"{
            "echo_req": {"ticks": "R_100", "subscribe": 1, "req_id": 3},
            "msg_type": "tick",
            "req_id": 3,
            "subscription": {"id": "9a1c"},
            "tick": {
                "ask": 1234.57,
                "bid": 1234.55,
                "epoch": 1700000000,
                "id": "9a1c",
                "pip_size": 2,
                "quote": 1234.56,
                "symbol": "R_100"
            }
        }"#;

        let frame = Inbound::parse(raw).unwrap();
        assert_eq!(frame.req_id, Some(3));

        let tick = frame.tick().unwrap();
        assert_eq!(tick.symbol, "R_100");
        assert_eq!(tick.quote, dec!(1234.56));
        assert_eq!(tick.pip_size, Some(2));
    }

    #[test]
    fn test_parse_error_reply() {
        let raw = r#"{
            "error": {"code": "InvalidToken", "message": "The token is invalid."},
            "msg_type": "authorize",
            "req_id": 7
        }"#;

        let frame = Inbound::parse(raw).unwrap();
        assert_eq!(frame.req_id, Some(7));
        match frame.into_outcome() {
            Err(StreamError::Service { code, .. }) => assert_eq!(code, "InvalidToken"),
            other => panic!("Expected service error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_history_reply() {
        let raw = r#"{
            "msg_type": "history",
            "req_id": 11,
            "pip_size": 2,
            "history": {"prices": [10.5, 10.75, "10.80"], "times": [1, 2, 3]}
        }"#;

        let frame = Inbound::parse(raw).unwrap();
        let history: History = frame.field("history").unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history.prices[2], dec!(10.80));
        assert_eq!(history.times, vec![1, 2, 3]);
    }

    #[test]
    fn test_parse_rejects_non_object() {
        assert!(matches!(Inbound::parse("[1,2]"), Err(StreamError::Parse(_))));
        assert!(Inbound::parse("not json").is_err());
    }

    #[test]
    fn test_missing_field_is_parse_error() {
        let frame = Inbound::parse(r#"{"msg_type":"ping","ping":"pong"}"#).unwrap();
        assert!(frame.req_id.is_none());
        assert!(matches!(frame.tick(), Err(StreamError::Parse(_))));
    }
}
