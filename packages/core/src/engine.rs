//! The engine seam.
//!
//! The ledger engine is an external collaborator: this crate only drives it
//! through [`Engine`].  Network I/O is handed to the engine per call as a
//! borrowed [`MakeHttpRequest`] capability, so the engine cannot keep it
//! beyond the call that supplied it.
//!
//! Engine methods take `&self`: the engine owns its own synchronisation.
//! The bridge holds no lock across a call, so a host round trip that hangs
//! only hangs its own calling thread, and a host that re-enters the bridge
//! from `makeHTTPRequest` does not deadlock on it.

use crate::envelope::Status;
use crate::error::ErrorValue;

/// A synchronous, blocking HTTP requester.
///
/// `params` is the engine's JSON description of the request; the return
/// value is always a JSON-encoded [`HttpResult`](crate::HttpResult), even
/// when the request could not be made.
pub trait MakeHttpRequest {
    fn make_http_request(&mut self, params: &str) -> String;
}

impl<F> MakeHttpRequest for F
where
    F: FnMut(&str) -> String,
{
    fn make_http_request(&mut self, params: &str) -> String {
        self(params)
    }
}

/// Outcome of a purchase attempt that reached the engine's business logic.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseResult {
    pub status: Status,

    /// The engine's own serialised purchase record.  Present whenever the
    /// engine produced one, independent of `status`.
    pub purchase: Option<serde_json::Value>,
}

/// The operations the bridge needs from the ledger engine.
///
/// Implementations must not hold internal locks while calling `http`.
pub trait Engine {
    /// Configure the engine.  No network capability is available yet.
    fn init(&self, user_agent: &str, storage_root: &str, test_mode: bool)
        -> Result<(), ErrorValue>;

    /// Create a purchase that expires server-side.
    fn new_expiring_purchase(
        &self,
        http: &mut dyn MakeHttpRequest,
        transaction_class: &str,
        distinguisher: &str,
        expected_price: i64,
    ) -> Result<PurchaseResult, ErrorValue>;
}

impl<E: Engine + ?Sized> Engine for Box<E> {
    fn init(
        &self,
        user_agent: &str,
        storage_root: &str,
        test_mode: bool,
    ) -> Result<(), ErrorValue> {
        (**self).init(user_agent, storage_root, test_mode)
    }

    fn new_expiring_purchase(
        &self,
        http: &mut dyn MakeHttpRequest,
        transaction_class: &str,
        distinguisher: &str,
        expected_price: i64,
    ) -> Result<PurchaseResult, ErrorValue> {
        (**self).new_expiring_purchase(http, transaction_class, distinguisher, expected_price)
    }
}
