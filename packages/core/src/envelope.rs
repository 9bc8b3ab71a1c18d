//! Wire shapes exchanged with the host.
//!
//! Every value that crosses the boundary is a fixed-shape JSON object.  The
//! field names and the integer values of [`Status`] are a compatibility
//! contract between independently versioned host and native builds; treat
//! any change here as breaking.
//!
//! | Type | Direction | Shape |
//! |------|-----------|-------|
//! | [`PurchaseRequest`] | host → core | `{"class", "distinguisher", "expectedPrice"}` |
//! | [`ResponseEnvelope`] | core → host | `{"status", "error", "purchase"}` |
//! | [`HttpResult`] | host → engine | `{"status", "error", "body", "date"}` |
//!
//! All JSON produced here is ASCII-only (see [`to_ascii_json`]) because the
//! host string transfer uses modified UTF-8.

use std::io;

use serde::{Deserialize, Serialize};

use crate::error::ErrorValue;

/// Shared status vocabulary.  The values are owned by the engine; the bridge
/// adds nothing but relays them, using [`Status::Invalid`] for its own
/// failures.
///
/// Serialises as its integer value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum Status {
    Invalid = -1,
    Success = 0,
    ExistingTransaction = 1,
    InsufficientBalance = 2,
    TransactionAmountMismatch = 3,
    TransactionTypeNotFound = 4,
    InvalidTokens = 5,
    ServerError = 6,
}

impl From<Status> for i32 {
    fn from(s: Status) -> Self {
        s as i32
    }
}

impl TryFrom<i32> for Status {
    type Error = String;

    fn try_from(v: i32) -> Result<Self, Self::Error> {
        Ok(match v {
            -1 => Status::Invalid,
            0 => Status::Success,
            1 => Status::ExistingTransaction,
            2 => Status::InsufficientBalance,
            3 => Status::TransactionAmountMismatch,
            4 => Status::TransactionTypeNotFound,
            5 => Status::InvalidTokens,
            6 => Status::ServerError,
            other => return Err(format!("unknown status value {other}")),
        })
    }
}

/// Parameters of the "create expiring purchase" operation.
///
/// All three fields are required; a missing field or a value of the wrong
/// type is rejected by the decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub class: String,
    pub distinguisher: String,
    #[serde(rename = "expectedPrice")]
    pub expected_price: i64,
}

/// Response to an operation call.
///
/// Always serialises all three keys; absent values are JSON `null`.
///
/// ```json
/// { "status": 0, "error": null, "purchase": { "id": "..." } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub status: Status,

    /// Rendered [`ErrorValue`] chain.  Non-null only when `status` is
    /// [`Status::Invalid`].
    pub error: Option<String>,

    /// Engine-owned record, relayed unmodified.
    pub purchase: Option<serde_json::Value>,
}

impl ResponseEnvelope {
    /// A bridge-side failure: `status` is [`Status::Invalid`], no payload.
    pub fn invalid(error: &ErrorValue) -> Self {
        Self {
            status: Status::Invalid,
            error: Some(error.to_string()),
            purchase: None,
        }
    }

    /// An engine-reported outcome.  A non-success status without a purchase
    /// is not an error at this layer.
    pub fn outcome(status: Status, purchase: Option<serde_json::Value>) -> Self {
        Self {
            status,
            error: None,
            purchase,
        }
    }

    /// Encode for the host; never fails.
    pub fn encode(&self) -> String {
        to_ascii_json(self).unwrap_or_else(|e| {
            tracing::error!("response envelope encoding failed: {e}");
            ENVELOPE_FALLBACK.to_string()
        })
    }
}

/// Result of one host HTTP round trip, as the host reports it.
///
/// `status` is the HTTP status code, or `-1` when no response was obtained,
/// in which case `error` says why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResult {
    pub status: i32,
    pub error: Option<String>,
    pub body: Option<String>,
    pub date: Option<String>,
}

impl HttpResult {
    /// Status used when the request never produced an HTTP response.
    pub const NO_STATUS: i32 = -1;

    /// The result handed to the engine when the boundary itself failed.
    pub fn stub(error: &ErrorValue) -> Self {
        Self {
            status: Self::NO_STATUS,
            error: Some(error.to_string()),
            body: None,
            date: None,
        }
    }

    /// Encode for the engine; never fails.
    pub fn encode(&self) -> String {
        to_ascii_json(self).unwrap_or_else(|e| {
            tracing::error!("http result encoding failed: {e}");
            STUB_FALLBACK.to_string()
        })
    }
}

const ENVELOPE_FALLBACK: &str =
    r#"{"status":-1,"error":"response envelope encoding failed","purchase":null}"#;

const STUB_FALLBACK: &str =
    r#"{"status":-1,"error":"stub result encoding failed","body":null,"date":null}"#;

/// Serialise `value` as compact JSON with every non-ASCII character escaped
/// as `\uXXXX` (surrogate pairs outside the BMP).
pub fn to_ascii_json<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let mut out = Vec::with_capacity(128);
    let mut ser = serde_json::Serializer::with_formatter(&mut out, AsciiFormatter);
    value.serialize(&mut ser)?;
    String::from_utf8(out).map_err(<serde_json::Error as serde::ser::Error>::custom)
}

/// Compact formatter that escapes non-ASCII string content.
struct AsciiFormatter;

impl serde_json::ser::Formatter for AsciiFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut start = 0;
        for (i, c) in fragment.char_indices() {
            if c.is_ascii() {
                continue;
            }
            writer.write_all(fragment[start..i].as_bytes())?;
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                write!(writer, "\\u{unit:04x}")?;
            }
            start = i + c.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn status_serialises_as_integer() {
        assert_eq!(serde_json::to_string(&Status::Invalid).unwrap(), "-1");
        assert_eq!(serde_json::to_string(&Status::ServerError).unwrap(), "6");
        let s: Status = serde_json::from_str("2").unwrap();
        assert_eq!(s, Status::InsufficientBalance);
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!(serde_json::from_str::<Status>("99").is_err());
    }

    #[test]
    fn envelope_always_has_three_keys() {
        let v: Value =
            serde_json::from_str(&ResponseEnvelope::outcome(Status::Success, None).encode())
                .unwrap();
        let obj = v.as_object().unwrap();
        assert_eq!(obj.len(), 3);
        assert_eq!(v["status"], 0);
        assert!(v["error"].is_null());
        assert!(v["purchase"].is_null());
    }

    #[test]
    fn invalid_envelope_carries_rendered_chain() {
        let err = ErrorValue::new("inner", "f", "g", 1).wrap("outer", "f", "g", 2);
        let v: Value = serde_json::from_str(&ResponseEnvelope::invalid(&err).encode()).unwrap();
        assert_eq!(v["status"], -1);
        assert_eq!(v["error"], err.to_string());
        assert!(v["purchase"].is_null());
    }

    #[test]
    fn stub_has_exactly_four_keys() {
        let err = ErrorValue::new("NullResult", "f", "g", 1);
        let v: Value = serde_json::from_str(&HttpResult::stub(&err).encode()).unwrap();
        let mut keys: Vec<_> = v.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, ["body", "date", "error", "status"]);
        assert_eq!(v["status"], -1);
        assert!(v["error"].is_string());
        assert!(v["body"].is_null());
        assert!(v["date"].is_null());
    }

    #[test]
    fn fallbacks_are_valid_json() {
        let env: ResponseEnvelope = serde_json::from_str(ENVELOPE_FALLBACK).unwrap();
        assert_eq!(env.status, Status::Invalid);
        let stub: HttpResult = serde_json::from_str(STUB_FALLBACK).unwrap();
        assert_eq!(stub.status, HttpResult::NO_STATUS);
    }

    #[test]
    fn ascii_output_escapes_non_ascii() {
        let s = to_ascii_json(&json!({"k": "caf\u{e9} \u{1F600}"})).unwrap();
        assert!(s.is_ascii());
        assert_eq!(s, r#"{"k":"caf\u00e9 \ud83d\ude00"}"#);
        let back: Value = serde_json::from_str(&s).unwrap();
        assert_eq!(back["k"], "caf\u{e9} \u{1F600}");
    }

    #[test]
    fn envelope_with_non_ascii_keys_and_error_is_ascii() {
        let env = ResponseEnvelope {
            status: Status::Invalid,
            error: Some("\u{fc}ber \u{2603}".into()),
            purchase: Some(json!({"cl\u{e9}": ["\u{10401}"]})),
        };
        let s = env.encode();
        assert!(s.is_ascii(), "{s}");
        assert!(s.contains(r#""cl\u00e9":["\ud801\udc01"]"#), "{s}");
        let back: ResponseEnvelope = serde_json::from_str(&s).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn ascii_output_keeps_control_escapes() {
        let s = to_ascii_json(&json!("a\"b\n")).unwrap();
        assert_eq!(s, r#""a\"b\n""#);
    }

    #[test]
    fn purchase_request_uses_camel_case_price() {
        let r: PurchaseRequest = serde_json::from_str(
            r#"{"class":"speed-boost","distinguisher":"1hr","expectedPrice":100}"#,
        )
        .unwrap();
        assert_eq!(r.expected_price, 100);
        assert_eq!(r.class, "speed-boost");
    }
}
