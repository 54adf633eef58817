//! Transport capability boundary.
//!
//! Single responsibility: the opaque start/stop/close surface of the
//! underlying connection. No retry logic, no lifecycle state, no
//! protocol knowledge. All of that lives in [`Uplink`].
//!
//! [`Uplink`]: crate::client::Uplink

use async_trait::async_trait;

use crate::error::UplinkError;

/// The underlying connection consumed by the lifecycle machine.
///
/// Implementations wrap whatever actually talks to the remote endpoint
/// (a WebSocket session, a TCP stream, an in-memory double in tests).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Attempt to start a session.
    ///
    /// # Errors
    /// Any failure to establish the session. The lifecycle machine
    /// treats every start failure as retryable.
    async fn start(&self) -> Result<(), UplinkError>;

    /// Stop the active session.
    ///
    /// Best-effort cleanup: the caller logs a failure and moves on, so
    /// implementations should not retry internally.
    async fn stop(&self) -> Result<(), UplinkError>;

    /// Wait until the current session ends.
    ///
    /// Resolves immediately when no session is active. Awaiting again
    /// after a later `start` re-arms the wait for the new session, and
    /// dropping the future detaches the observer; there is no listener
    /// list to clean up behind the trait.
    async fn closed(&self);
}
