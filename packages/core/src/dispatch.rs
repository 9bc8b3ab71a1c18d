//! Operation dispatch: JSON in, JSON envelope out.
//!
//! Each operation moves through `Received -> Validated -> Dispatched ->
//! Responded`.  Failures before dispatch short-circuit to an
//! [`Status::Invalid`] envelope without touching the engine.  Nothing is
//! retried here.

use serde_json::error::Category;

use crate::engine::Engine;
use crate::envelope::{PurchaseRequest, ResponseEnvelope};
use crate::error::ErrorValue;
use crate::host::{Host, HostCallback};
use crate::lifecycle::Bridge;
use crate::{make_error, wrap_error};

impl<E: Engine> Bridge<E> {
    /// Create an expiring purchase.
    ///
    /// `params_json` is `{"class", "distinguisher", "expectedPrice"}`, or
    /// `None` when the host passed null.  Returns the encoded
    /// [`ResponseEnvelope`]:
    ///
    /// ```json
    /// { "status": 0, "error": null, "purchase": { ... } }
    /// ```
    ///
    /// `host` is borrowed for this call only; the engine's HTTP capability
    /// is rebuilt from it every time.
    pub fn new_expiring_purchase<H: Host>(&self, host: &mut H, params_json: Option<&str>) -> String {
        self.run_new_expiring_purchase(host, params_json)
            .unwrap_or_else(|err| {
                tracing::warn!("new_expiring_purchase failed: {err}");
                ResponseEnvelope::invalid(&err)
            })
            .encode()
    }

    fn run_new_expiring_purchase<H: Host>(
        &self,
        host: &mut H,
        params_json: Option<&str>,
    ) -> Result<ResponseEnvelope, ErrorValue> {
        let params_json = params_json.ok_or_else(|| make_error!("params json is null"))?;
        let params = parse_params::<PurchaseRequest>(params_json)?;

        tracing::debug!(
            class = %params.class,
            distinguisher = %params.distinguisher,
            expected_price = params.expected_price,
            "dispatching new_expiring_purchase"
        );

        let mut http = HostCallback::new(host);
        let result = self
            .engine()
            .new_expiring_purchase(
                &mut http,
                &params.class,
                &params.distinguisher,
                params.expected_price,
            )
            .map_err(|e| wrap_error!(e, "engine new_expiring_purchase failed"))?;

        Ok(ResponseEnvelope::outcome(result.status, result.purchase))
    }
}

/// Decode operation parameters, reporting the parser's error category as
/// the diagnostic id.
fn parse_params<T: serde::de::DeserializeOwned>(json: &str) -> Result<T, ErrorValue> {
    serde_json::from_str(json)
        .map_err(|e| make_error!("params json parse failed: {e}; id: {}", category_id(&e)))
}

fn category_id(e: &serde_json::Error) -> &'static str {
    match e.classify() {
        Category::Io => "io",
        Category::Syntax => "syntax",
        Category::Data => "data",
        Category::Eof => "eof",
    }
}

/// Encoded [`Status::Invalid`](crate::Status::Invalid) envelope for failures
/// detected by a binding before the bridge is reached (unreadable input,
/// missing init).
pub fn invalid_response(err: &ErrorValue) -> String {
    ResponseEnvelope::invalid(err).encode()
}
