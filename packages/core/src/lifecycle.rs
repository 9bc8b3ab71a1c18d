//! Lifecycle: process-wide bindings and engine initialisation.
//!
//! Two pieces of shared state exist per process:
//!
//! - the identity of the host's request-making method, resolved once by
//!   static init and held in a [`Binding`];
//! - the engine singleton, owned by a [`Bridge`] and configured by object
//!   init.
//!
//! Both are written at init time and must be initialised before concurrent
//! operation calls begin.  The bridge itself takes no lock around engine
//! calls; see [`Engine`].

use std::sync::OnceLock;

use crate::config::BridgeConfig;
use crate::engine::Engine;
use crate::error::{ErrorValue, LifecycleError};
use crate::{make_error, wrap_error};

/// A write-once, process-wide value.
///
/// The first successful bind wins; later binds return the existing value
/// without resolving again.  A failed bind leaves the cell empty.
#[derive(Debug)]
pub struct Binding<T> {
    name: &'static str,
    cell: OnceLock<T>,
}

impl<T> Binding<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            cell: OnceLock::new(),
        }
    }

    /// Resolve and store the value unless one is already bound.
    pub fn bind_with<E>(&self, resolve: impl FnOnce() -> Result<T, E>) -> Result<&T, E> {
        if let Some(bound) = self.cell.get() {
            tracing::debug!("{} already bound; keeping existing binding", self.name);
            return Ok(bound);
        }
        let value = resolve()?;
        Ok(self.cell.get_or_init(|| value))
    }

    /// The bound value; fails fast if static init has not succeeded.
    pub fn get(&self) -> Result<&T, LifecycleError> {
        self.cell.get().ok_or(LifecycleError::NotBound(self.name))
    }

    pub fn is_bound(&self) -> bool {
        self.cell.get().is_some()
    }
}

/// Owns the engine singleton and the configuration it is initialised with.
///
/// Operation entry points (see [`crate::dispatch`]) are methods on this type.
/// A `Bridge<E>` is shareable across threads when `E: Sync`.
#[derive(Debug)]
pub struct Bridge<E> {
    config: BridgeConfig,
    engine: E,
}

impl<E: Engine> Bridge<E> {
    pub fn new(engine: E, config: BridgeConfig) -> Self {
        Self { config, engine }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Configure the engine with the user agent, a storage root, and the
    /// test-mode flag.
    ///
    /// No network capability is passed: none exists until an operation call
    /// supplies a host.  Calling this again re-runs engine init with the new
    /// arguments.
    pub fn object_init(&self, storage_root: Option<&str>, test_mode: bool) -> Result<(), ErrorValue> {
        let storage_root = match storage_root {
            None => return Err(make_error!("storage root is null")),
            Some(root) if root.is_empty() => return Err(make_error!("storage root is empty")),
            Some(root) => root,
        };

        tracing::debug!(storage_root, test_mode, "initialising engine");

        self.engine
            .init(&self.config.user_agent, storage_root, test_mode)
            .map_err(|e| wrap_error!(e, "engine init failed"))
    }
}
