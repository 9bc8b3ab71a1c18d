//! Error envelope: a located, chainable error value.
//!
//! An [`ErrorValue`] records where a failure happened (file, function, line)
//! alongside its message, and may own the error that caused it.  Wrapping
//! never replaces the cause: the full chain is kept and rendered, so the
//! host sees every level of context in a single string.
//!
//! Build values with the [`make_error!`](crate::make_error) and
//! [`wrap_error!`](crate::wrap_error) macros, which capture the source
//! location automatically:
//!
//! ```rust,ignore
//! use psicash_bridge::{make_error, wrap_error};
//!
//! let cause = make_error!("storage root {:?} is not writable", root);
//! let err = wrap_error!(cause, "engine init failed");
//! assert!(err.to_string().contains("is not writable"));
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A diagnostic error carrying its origin and an optional wrapped cause.
///
/// Immutable once constructed.  The causal chain is strictly acyclic: each
/// value owns the (boxed) value it wraps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorValue {
    message: String,
    file: String,
    function: String,
    line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    wrapped: Option<Box<ErrorValue>>,
}

impl ErrorValue {
    /// Construct a leaf error.
    pub fn new(
        message: impl Into<String>,
        file: impl Into<String>,
        function: impl Into<String>,
        line: u32,
    ) -> Self {
        Self {
            message: message.into(),
            file: file.into(),
            function: function.into(),
            line,
            wrapped: None,
        }
    }

    /// Construct a new error that owns `self` as its cause.
    pub fn wrap(
        self,
        message: impl Into<String>,
        file: impl Into<String>,
        function: impl Into<String>,
        line: u32,
    ) -> Self {
        Self {
            wrapped: Some(Box::new(self)),
            ..Self::new(message, file, function, line)
        }
    }

    /// The message of this frame only.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    /// The directly wrapped cause, if any.
    pub fn wrapped(&self) -> Option<&ErrorValue> {
        self.wrapped.as_deref()
    }

    /// Iterate over the chain, outermost frame first.
    pub fn frames(&self) -> impl Iterator<Item = &ErrorValue> {
        std::iter::successors(Some(self), |e| e.wrapped())
    }
}

/// Renders the whole chain on one line, outermost first:
///
/// ```text
/// dispatch failed (src/dispatch.rs:88 psicash_bridge::dispatch::run); caused by: no tokens (engine.rs:12 engine::buy)
/// ```
impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, frame) in self.frames().enumerate() {
            if i > 0 {
                f.write_str("; caused by: ")?;
            }
            write!(
                f,
                "{} ({}:{} {})",
                frame.message, frame.file, frame.line, frame.function
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorValue {}

/// Process-wide lifecycle failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    /// A write-once binding was read before it was written.
    #[error("{0} is not bound; static init must succeed first")]
    NotBound(&'static str),

    /// No engine has been installed for the bridge to drive.
    #[error("no engine installed")]
    EngineMissing,
}

/// Path of the enclosing function, e.g. `psicash_bridge::dispatch::run`.
#[doc(hidden)]
#[macro_export]
macro_rules! function_name {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        let mut name = type_name_of(f);
        name = name.strip_suffix("::f").unwrap_or(name);
        while let Some(outer) = name.strip_suffix("::{{closure}}") {
            name = outer;
        }
        name
    }};
}

/// Construct a leaf [`ErrorValue`](crate::ErrorValue) at the call site.
///
/// Accepts `format!`-style arguments.
#[macro_export]
macro_rules! make_error {
    ($($arg:tt)+) => {
        $crate::ErrorValue::new(
            ::std::format!($($arg)+),
            ::std::file!(),
            $crate::function_name!(),
            ::std::line!(),
        )
    };
}

/// Wrap an existing [`ErrorValue`](crate::ErrorValue) with context from the
/// call site.
#[macro_export]
macro_rules! wrap_error {
    ($cause:expr, $($arg:tt)+) => {
        ($cause).wrap(
            ::std::format!($($arg)+),
            ::std::file!(),
            $crate::function_name!(),
            ::std::line!(),
        )
    };
}
