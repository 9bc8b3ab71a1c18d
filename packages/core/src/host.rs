//! Host callback adapter.
//!
//! The host owns the network stack.  [`Host`] names the primitive boundary
//! operations a binding (JNI, or a test double) must provide; [`HostCallback`]
//! composes them into the engine's [`MakeHttpRequest`] capability.
//!
//! # Contract
//!
//! [`HostCallback::make_http_request`] always returns a parseable JSON string.
//! Every boundary failure degrades into a stub [`HttpResult`] with status
//! `-1` and an error tagged with the failing step:
//!
//! | Step | Failure | Tag |
//! |------|---------|-----|
//! | transfer request to host | allocation / encoding | `EncodingFailed` |
//! | invoke `makeHTTPRequest` | host raised an exception | `InvocationFailed` |
//! | invoke `makeHTTPRequest` | host returned null | `NullResult` |
//! | read result back | decoding | `DecodingFailed` |
//!
//! After each primitive the pending host fault (if any) is taken and
//! cleared, so the boundary stays usable for the next call.
//!
//! # Lifetime
//!
//! A [`HostCallback`] mutably borrows its host, which in turn borrows the
//! per-call host environment.  It therefore cannot outlive the entry point
//! that built it, and the engine, which only receives `&mut dyn
//! MakeHttpRequest`, cannot retain it at all.

use thiserror::Error;

use crate::engine::MakeHttpRequest;
use crate::envelope::HttpResult;
use crate::make_error;

/// A fault reported by the host during a boundary primitive.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct HostFault(pub String);

/// The primitive operations of one cross-boundary round trip.
///
/// Implementations are short-lived: they wrap the environment of a single
/// entry-point call.
pub trait Host {
    /// A host-owned string handle.
    type Str;

    /// Copy `s` into a host string.
    fn transfer(&mut self, s: &str) -> Result<Self::Str, HostFault>;

    /// Call the host's request-making method.  `Ok(None)` means the host
    /// returned null.
    fn make_http_request(&mut self, params: &Self::Str) -> Result<Option<Self::Str>, HostFault>;

    /// Copy a host string back into an owned `String`.
    fn read_back(&mut self, s: &Self::Str) -> Result<String, HostFault>;

    /// Release a host string handle early.
    fn release(&mut self, _s: Self::Str) {}

    /// Check for a pending host fault; if there is one, describe and clear
    /// it and return `true`.
    fn take_fault(&mut self) -> bool;
}

/// Boundary failures, tagged by the step that failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BoundaryError {
    #[error("EncodingFailed: request transfer to host failed: {0}")]
    EncodingFailed(String),

    #[error("InvocationFailed: makeHTTPRequest raised: {0}")]
    InvocationFailed(String),

    #[error("NullResult: makeHTTPRequest returned null")]
    NullResult,

    #[error("DecodingFailed: reading makeHTTPRequest result failed: {0}")]
    DecodingFailed(String),
}

impl BoundaryError {
    /// The stable tag naming the failed step.
    pub fn tag(&self) -> &'static str {
        match self {
            BoundaryError::EncodingFailed(_) => "EncodingFailed",
            BoundaryError::InvocationFailed(_) => "InvocationFailed",
            BoundaryError::NullResult => "NullResult",
            BoundaryError::DecodingFailed(_) => "DecodingFailed",
        }
    }
}

/// Single-use HTTP capability over a borrowed [`Host`].
pub struct HostCallback<'h, H: Host> {
    host: &'h mut H,
}

impl<'h, H: Host> HostCallback<'h, H> {
    pub fn new(host: &'h mut H) -> Self {
        Self { host }
    }

    fn round_trip(&mut self, params: &str) -> Result<String, BoundaryError> {
        let request = self.guarded(|h| h.transfer(params), BoundaryError::EncodingFailed)?;

        let response = self.guarded(
            |h| h.make_http_request(&request),
            BoundaryError::InvocationFailed,
        );
        self.host.release(request);
        let response = response?.ok_or(BoundaryError::NullResult)?;

        let text = self.guarded(|h| h.read_back(&response), BoundaryError::DecodingFailed);
        self.host.release(response);
        text
    }

    /// Run one primitive, then check-and-clear the host fault state.  A
    /// reported error or a fault left pending both map to `kind`.
    fn guarded<T>(
        &mut self,
        op: impl FnOnce(&mut H) -> Result<T, HostFault>,
        kind: fn(String) -> BoundaryError,
    ) -> Result<T, BoundaryError> {
        let result = op(&mut *self.host);
        let faulted = self.host.take_fault();
        match result {
            Err(HostFault(msg)) => Err(kind(msg)),
            Ok(_) if faulted => Err(kind("host exception pending".into())),
            Ok(v) => Ok(v),
        }
    }
}

impl<H: Host> MakeHttpRequest for HostCallback<'_, H> {
    fn make_http_request(&mut self, params: &str) -> String {
        match self.round_trip(params) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(tag = e.tag(), "host http request failed: {e}");
                HttpResult::stub(&make_error!("{e}")).encode()
            }
        }
    }
}
