//! Native/host call bridge for the PsiCash engine.
//!
//! The ledger engine needs network I/O it cannot perform itself; the host
//! (e.g. an Android app) owns the network stack.  This crate sits between
//! the two: it exposes the engine's operations to the host as JSON
//! request/response pairs, and hands the engine a per-call HTTP capability
//! that calls back into the host.
//!
//! It has **no host dependency**.  A binding crate (see `psicash-jni`)
//! implements [`Host`] over its runtime's primitives and forwards entry
//! points to a [`Bridge`].
//!
//! # Crate layout
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`error`] | [`ErrorValue`]: located, chainable errors; [`make_error!`] / [`wrap_error!`] |
//! | [`envelope`] | Wire shapes: [`ResponseEnvelope`], [`HttpResult`], [`PurchaseRequest`], [`Status`] |
//! | [`engine`] | The [`Engine`] seam and the [`MakeHttpRequest`] capability |
//! | [`host`] | [`Host`] primitives and the [`HostCallback`] adapter |
//! | [`lifecycle`] | Write-once [`Binding`] and the engine-owning [`Bridge`] |
//! | [`dispatch`] | Operation entry points on [`Bridge`] |
//! | [`config`] | [`BridgeConfig`] from environment variables |
//!
//! # Call flow
//!
//! ```text
//! host ── StaticInit ─────────────► Binding::bind_with   (once per process)
//! host ── ObjectInit ─────────────► Bridge::object_init  (engine Init)
//! host ── NewExpiringPurchase ────► Bridge::new_expiring_purchase
//!                                      │ HostCallback::new(host)
//!                                      ▼
//!                                   Engine ── make_http_request ──► host (0..n times)
//! ```

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod host;
pub mod lifecycle;

pub use config::BridgeConfig;
pub use dispatch::invalid_response;
pub use engine::{Engine, MakeHttpRequest, PurchaseResult};
pub use envelope::{to_ascii_json, HttpResult, PurchaseRequest, ResponseEnvelope, Status};
pub use error::{ErrorValue, LifecycleError};
pub use host::{BoundaryError, Host, HostCallback, HostFault};
pub use lifecycle::{Binding, Bridge};
