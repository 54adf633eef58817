//! Connection state and the atomically-published status snapshot.

use std::fmt;

use crate::error::UplinkError;

/// The lifecycle state of the managed connection.
///
/// Exactly one state is current at any instant, starting at
/// `Disconnected`. The `Connecting…` variants belong to the initial
/// connect run; the `Reconnecting…` variants to the automatic
/// reconnect runs entered after an unsolicited close.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and no attempt in flight.
    #[default]
    Disconnected,
    /// A transport start is in flight (initial connect).
    Connecting,
    /// The last start failed while the network was offline; waiting for
    /// connectivity to return before retrying.
    ConnectingWaitingForInternet,
    /// The last start failed; waiting out the backoff delay before
    /// retrying.
    ConnectingWaitingToRetry,
    /// The transport session is up.
    Connected,
    /// A transport start is in flight (reconnect after close).
    Reconnecting,
    /// As `ConnectingWaitingForInternet`, during a reconnect run.
    ReconnectingWaitingForInternet,
    /// As `ConnectingWaitingToRetry`, during a reconnect run.
    ReconnectingWaitingToRetry,
}

impl ConnectionState {
    /// True for the four states in which the machine is suspended between
    /// attempts. These are the only states that carry an error.
    pub fn is_waiting(&self) -> bool {
        matches!(
            self,
            ConnectionState::ConnectingWaitingForInternet
                | ConnectionState::ConnectingWaitingToRetry
                | ConnectionState::ReconnectingWaitingForInternet
                | ConnectionState::ReconnectingWaitingToRetry
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::ConnectingWaitingForInternet => {
                "connecting (waiting for internet connection)"
            }
            ConnectionState::ConnectingWaitingToRetry => {
                "waiting a few moments before trying to connect again"
            }
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::ReconnectingWaitingForInternet => {
                "reconnecting (waiting for internet connection)"
            }
            ConnectionState::ReconnectingWaitingToRetry => {
                "waiting a few moments before trying to reconnect"
            }
        };
        f.write_str(text)
    }
}

/// A consistent `(state, error)` pair.
///
/// Published as one value through a single watch channel, so an observer
/// can never read a stale error against a newly-entered state or the
/// other way around.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionStatus {
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// The failure that produced the current state, if any. Non-`None`
    /// only in the waiting states.
    pub error: Option<UplinkError>,
}
