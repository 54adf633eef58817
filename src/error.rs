//! Error types for uplink

use thiserror::Error;

/// Errors surfaced by the connection lifecycle.
///
/// `Clone` and `PartialEq` so a settled outcome can be fanned out to every
/// caller sharing an in-flight attempt, and so observers can match on the
/// last error carried by a status snapshot.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UplinkError {
    /// The operation was interrupted by [`Uplink::disconnect`].
    ///
    /// Only ever reported to callers of [`Uplink::connect`]; the background
    /// reconnect loop has no caller to report to.
    ///
    /// [`Uplink::connect`]: crate::client::Uplink::connect
    /// [`Uplink::disconnect`]: crate::client::Uplink::disconnect
    #[error("operation cancelled")]
    Cancelled,

    /// A transport start or stop failed.
    ///
    /// Start failures are never fatal: the connect loop retries until it
    /// succeeds or is cancelled. Stop failures are logged and swallowed.
    #[error("transport error: {0}")]
    Transport(String),
}
