//! Result extension trait for logging errors with context.
//!
//! Errors bubbling out of a migration are logged once, close to where the
//! failing instance or job is known, and then returned unchanged.

use std::fmt::Display;
use tracing::{error, warn};

/// Extension trait for logging errors with context.
pub trait ResultExt<T, E> {
    /// Log the error at `error` level with a context message and the
    /// caller's source location. The result is returned unchanged.
    ///
    /// ```ignore
    /// use migration_control_plane::result_ext::ResultExt;
    ///
    /// let result: Result<i32, &str> = Err("revision mismatch");
    /// let _ = result.log("committing migrated instance");
    /// ```
    fn log<S: ToString>(self, context: S) -> Result<T, E>;

    /// Like [`ResultExt::log`] but at `warn` level, for failures that are
    /// expected to be isolated (one batch part out of many).
    fn log_warn<S: ToString>(self, context: S) -> Result<T, E>;
}

impl<T, E: Display> ResultExt<T, E> for Result<T, E> {
    #[track_caller]
    fn log<S: ToString>(self, context: S) -> Result<T, E> {
        if let Err(ref e) = self {
            let location = std::panic::Location::caller();
            error!(
                target: "migration_control_plane",
                error = %e,
                file = %format!("{}:{}", location.file(), location.line()),
                context = %context.to_string(),
                "Operation failed"
            );
        }
        self
    }

    #[track_caller]
    fn log_warn<S: ToString>(self, context: S) -> Result<T, E> {
        if let Err(ref e) = self {
            let location = std::panic::Location::caller();
            warn!(
                target: "migration_control_plane",
                error = %e,
                file = %format!("{}:{}", location.file(), location.line()),
                context = %context.to_string(),
                "Operation failed"
            );
        }
        self
    }
}
