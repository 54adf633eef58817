//! Connection lifecycle state machine.
//!
//! Single responsibility: drive one logical connection through connect,
//! retry, reconnect and disconnect, keeping the observable `(state,
//! error)` pair consistent at every instant.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                        Uplink                           │
//! │  - connect(): claim-or-join the single in-flight attempt│
//! │  - disconnect(): cancel the current lineage             │
//! │  - status()/subscribe(): atomic (state, error) snapshots│
//! └────────────────────────────────────────────────────────┘
//!                            │ spawns one driver per lineage
//!                            ▼
//! ┌────────────────────────────────────────────────────────┐
//! │                      driver task                        │
//! │  - establish(): start/retry loop with backoff and       │
//! │    network-availability waits                           │
//! │  - supervise(): re-enters establish() on every close    │
//! └────────────────────────────────────────────────────────┘
//!                            │
//!               ┌────────────┼────────────┐
//!               ▼            ▼            ▼
//!          Transport    NetworkMonitor  CancelToken
//! ```
//!
//! # Guarantees
//!
//! - At most one connect attempt is ever in flight: the shared attempt
//!   handle is published under the slot lock before any suspension, so a
//!   concurrent `connect()` can only join it.
//! - Status snapshots are published as one value; a reader never sees a
//!   stale error paired with a new state.
//! - Cancellation unwinds from any suspension point and always settles
//!   the machine into `Disconnected`.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::backoff::Backoff;
use crate::cancel::CancelToken;
use crate::error::UplinkError;
use crate::network::NetworkMonitor;
use crate::state::{ConnectionState, ConnectionStatus};
use crate::transport::Transport;

/// Configuration for the connection lifecycle.
#[derive(Debug, Clone)]
pub struct UplinkConfig {
    /// Smallest delay between retry attempts.
    pub base_retry_delay: Duration,
    /// Largest delay between retry attempts.
    pub max_retry_delay: Duration,
}

impl Default for UplinkConfig {
    fn default() -> Self {
        Self {
            base_retry_delay: Duration::from_millis(5000),
            max_retry_delay: Duration::from_millis(60_000),
        }
    }
}

type Outcome = Option<Result<(), UplinkError>>;

/// The in-flight connect attempt shared by concurrent callers.
struct Attempt {
    token: CancelToken,
    outcome: watch::Receiver<Outcome>,
}

/// State shared between the public handle and the driver task.
struct Shared {
    status_tx: watch::Sender<ConnectionStatus>,
    // Keep one receiver alive so the status channel never closes: a
    // `watch::Sender::send` with zero receivers is dropped without
    // updating the stored value, which would make `publish` a no-op.
    _status_keepalive: watch::Receiver<ConnectionStatus>,
    attempt: Mutex<Option<Attempt>>,
}

impl Shared {
    fn publish(&self, state: ConnectionState, error: Option<UplinkError>) {
        let _ = self.status_tx.send(ConnectionStatus { state, error });
    }

    fn attempt_slot(&self) -> MutexGuard<'_, Option<Attempt>> {
        // The slot holds plain data; a poisoned lock cannot leave it
        // inconsistent, so recover rather than propagate.
        self.attempt
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Settle this lineage into `Disconnected`: discard the in-flight
    /// attempt and clear the observable pair in one publish.
    ///
    /// A newer lineage already occupying the slot is left untouched:
    /// a driver unwinding late must not clobber an attempt started after
    /// its own cancellation.
    fn settle_disconnected(&self, token: &CancelToken) {
        let mut slot = self.attempt_slot();
        if let Some(attempt) = slot.as_ref() {
            if !attempt.token.same_token(token) {
                return;
            }
        }
        slot.take();
        // Published while the slot lock is held so the Disconnected
        // snapshot cannot interleave after a new lineage's Connecting.
        self.publish(ConnectionState::Disconnected, None);
    }
}

/// Which run of the retry loop is executing. The two runs are the same
/// loop over different state variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Initial,
    Reconnect,
}

impl Phase {
    fn connecting(self) -> ConnectionState {
        match self {
            Phase::Initial => ConnectionState::Connecting,
            Phase::Reconnect => ConnectionState::Reconnecting,
        }
    }

    fn waiting_for_internet(self) -> ConnectionState {
        match self {
            Phase::Initial => ConnectionState::ConnectingWaitingForInternet,
            Phase::Reconnect => ConnectionState::ReconnectingWaitingForInternet,
        }
    }

    fn waiting_to_retry(self) -> ConnectionState {
        match self {
            Phase::Initial => ConnectionState::ConnectingWaitingToRetry,
            Phase::Reconnect => ConnectionState::ReconnectingWaitingToRetry,
        }
    }
}

/// A managed logical connection to a remote real-time endpoint.
///
/// # Guarantees
///
/// - `connect()` resolves when `Connected` is first reached, or fails
///   with [`UplinkError::Cancelled`] if `disconnect()` interrupts it.
/// - Overlapping `connect()` calls share one attempt and one outcome.
/// - After a successful connect, an unsolicited transport close is
///   answered with automatic reconnection until `disconnect()`.
///
/// # Non-Guarantees
///
/// - `connect()` does not time out on its own; an unreachable endpoint
///   keeps it retrying until cancelled.
pub struct Uplink {
    shared: Arc<Shared>,
    transport: Arc<dyn Transport>,
    network: NetworkMonitor,
    config: UplinkConfig,
}

impl Uplink {
    /// Create a lifecycle manager with the default retry delays.
    pub fn new(transport: Arc<dyn Transport>, network: NetworkMonitor) -> Self {
        Self::with_config(transport, network, UplinkConfig::default())
    }

    /// Create a lifecycle manager with explicit retry delays.
    pub fn with_config(
        transport: Arc<dyn Transport>,
        network: NetworkMonitor,
        config: UplinkConfig,
    ) -> Self {
        let (status_tx, status_keepalive) = watch::channel(ConnectionStatus::default());
        Self {
            shared: Arc::new(Shared {
                status_tx,
                _status_keepalive: status_keepalive,
                attempt: Mutex::new(None),
            }),
            transport,
            network,
            config,
        }
    }

    /// Connect to the endpoint, retrying until successful or cancelled.
    ///
    /// If an attempt is already in flight, or has settled into
    /// `Connected`, this joins it and returns the same outcome instead
    /// of starting a duplicate.
    ///
    /// # Errors
    /// `UplinkError::Cancelled` when [`disconnect`](Self::disconnect)
    /// interrupts the attempt.
    pub async fn connect(&self) -> Result<(), UplinkError> {
        let mut outcome = {
            let mut slot = self.shared.attempt_slot();
            match slot.as_ref() {
                Some(attempt) => attempt.outcome.clone(),
                None => {
                    // Claim the slot: the shared handle and the Connecting
                    // status are published before the lock is released,
                    // so a later caller can only ever join this attempt.
                    let token = CancelToken::new();
                    let (outcome_tx, outcome_rx) = watch::channel(None);
                    *slot = Some(Attempt {
                        token: token.clone(),
                        outcome: outcome_rx.clone(),
                    });
                    self.shared.publish(ConnectionState::Connecting, None);
                    info!("Connecting to endpoint");
                    tokio::spawn(drive(
                        Arc::clone(&self.shared),
                        Arc::clone(&self.transport),
                        self.network.clone(),
                        self.config.clone(),
                        token,
                        outcome_tx,
                    ));
                    outcome_rx
                }
            }
        };

        let result = match outcome.wait_for(|settled| settled.is_some()).await {
            Ok(settled) => (*settled).clone().unwrap_or(Err(UplinkError::Cancelled)),
            // The driver reports before exiting; a closed channel without
            // a report means the task itself died.
            Err(_) => Err(UplinkError::Transport(
                "connect driver terminated unexpectedly".into(),
            )),
        };
        result
    }

    /// Cancel the current connect lineage, wherever it is suspended.
    ///
    /// Fire-and-forget and idempotent; a no-op when nothing is in
    /// flight.
    pub fn disconnect(&self) {
        let token = self
            .shared
            .attempt_slot()
            .as_ref()
            .map(|attempt| attempt.token.clone());
        if let Some(token) = token {
            debug!("Disconnect requested");
            token.cancel();
        }
    }

    /// The current `(state, error)` snapshot.
    pub fn status(&self) -> ConnectionStatus {
        self.shared.status_tx.borrow().clone()
    }

    /// The current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.shared.status_tx.borrow().state
    }

    /// The failure that produced the current state, if any.
    pub fn last_error(&self) -> Option<UplinkError> {
        self.shared.status_tx.borrow().error.clone()
    }

    /// Whether the connection is currently up.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Subscribe to status snapshots. Every observed value is a
    /// consistent pair; intermediate snapshots may be coalesced.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status_tx.subscribe()
    }
}

impl Drop for Uplink {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Background driver for one connect lineage: runs the initial connect
/// run, reports its outcome to the waiting callers, then supervises the
/// connection until cancelled.
async fn drive(
    shared: Arc<Shared>,
    transport: Arc<dyn Transport>,
    network: NetworkMonitor,
    config: UplinkConfig,
    token: CancelToken,
    outcome_tx: watch::Sender<Outcome>,
) {
    let result = establish(&shared, &transport, &network, &config, &token, Phase::Initial).await;
    let connected = result.is_ok();
    let _ = outcome_tx.send(Some(result));
    if connected {
        supervise(&shared, &transport, &network, &config, &token).await;
    }
}

/// Reconnect-on-close supervision.
///
/// While `Connected`, a scoped cancellation listener covers the gap in
/// which the driver holds no other suspension on the token: it settles
/// the machine and stops the transport if `disconnect()` arrives
/// mid-session. Each close deregisters the listener and re-enters the
/// retry loop; nothing is reported to anyone from here. This is a
/// background process, not a caller's future.
async fn supervise(
    shared: &Arc<Shared>,
    transport: &Arc<dyn Transport>,
    network: &NetworkMonitor,
    config: &UplinkConfig,
    token: &CancelToken,
) {
    loop {
        let guard = token.listener_guard({
            let shared = Arc::clone(shared);
            let transport = Arc::clone(transport);
            let token = token.clone();
            move || {
                shared.settle_disconnected(&token);
                // Stop is async cleanup; run it out of line. Without a
                // runtime (process teardown) the stop is skipped.
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(async move {
                        if let Err(e) = transport.stop().await {
                            warn!(error = %e, "Failed to stop transport");
                        }
                    });
                }
            }
        });

        transport.closed().await;
        drop(guard);

        if token.is_cancelled() {
            // Either the listener already settled us, or cancellation
            // landed between the close and the deregistration; settling
            // is idempotent either way.
            shared.settle_disconnected(token);
            return;
        }

        info!("Connection closed, reconnecting");
        shared.publish(ConnectionState::Reconnecting, None);
        if establish(shared, transport, network, config, token, Phase::Reconnect)
            .await
            .is_err()
        {
            return;
        }
    }
}

/// One run of the start/retry loop.
///
/// Returns `Ok` after publishing `Connected`, or `Err(Cancelled)` after
/// settling the machine into `Disconnected`. Start failures never end
/// the run; they route through the waiting-for-internet or
/// waiting-to-retry states and come back around.
async fn establish(
    shared: &Arc<Shared>,
    transport: &Arc<dyn Transport>,
    network: &NetworkMonitor,
    config: &UplinkConfig,
    token: &CancelToken,
    phase: Phase,
) -> Result<(), UplinkError> {
    if token.is_cancelled() {
        shared.settle_disconnected(token);
        return Err(UplinkError::Cancelled);
    }

    let mut backoff = Backoff::new(config.base_retry_delay, config.max_retry_delay);
    loop {
        match transport.start().await {
            Ok(()) => {
                if token.is_cancelled() {
                    // Cancelled while the start was in flight: undo it.
                    if let Err(e) = transport.stop().await {
                        warn!(error = %e, "Failed to stop transport");
                    }
                    shared.settle_disconnected(token);
                    return Err(UplinkError::Cancelled);
                }
                shared.publish(ConnectionState::Connected, None);
                info!("Connected to endpoint");
                return Ok(());
            }
            Err(e) => {
                let interrupted = if network.is_offline() {
                    shared.publish(phase.waiting_for_internet(), Some(e));
                    warn!("Failed to connect to endpoint, waiting for internet");
                    let outcome = network.wait_until_online(token).await;
                    // An outage does not count toward the backoff
                    // sequence.
                    backoff.reset();
                    outcome.is_err() || token.is_cancelled()
                } else {
                    error!(error = %e, "Failed to connect to endpoint");
                    shared.publish(phase.waiting_to_retry(), Some(e));
                    let delay = backoff.next();
                    debug!(delay_ms = delay.as_millis() as u64, "Waiting before retry");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => token.is_cancelled(),
                        _ = token.cancelled() => true,
                    }
                };
                if interrupted {
                    shared.settle_disconnected(token);
                    return Err(UplinkError::Cancelled);
                }
                // Back on the attempt path; the previous failure no
                // longer describes the current state.
                shared.publish(phase.connecting(), None);
            }
        }
    }
}
