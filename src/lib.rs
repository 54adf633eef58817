//! Uplink - resilient connection lifecycle for real-time endpoints
//!
//! Manages the lifecycle of a single logical connection to a remote
//! real-time service: establishing it, retrying with decorrelated-jitter
//! backoff, pausing retries while the network is known to be offline,
//! reconnecting automatically after an unsolicited close, and unwinding
//! cleanly on cancellation from whichever step is currently suspended.
//!
//! # Architecture
//!
//! The crate is organized by concern, with each module having a single
//! responsibility:
//!
//! | Module      | Responsibility                                     |
//! |-------------|----------------------------------------------------|
//! | `transport` | The consumed start/stop/close capability           |
//! | `network`   | The consumed connectivity signal                   |
//! | `backoff`   | Decorrelated-jitter retry delays                   |
//! | `cancel`    | Cancellation token with cleanup listeners          |
//! | `state`     | State enum and the atomic status snapshot          |
//! | `client`    | The connect/reconnect state machine                |
//!
//! # Key Design Principles
//!
//! ## 1. One Attempt In Flight
//!
//! `connect()` claims or joins a single shared attempt under a lock,
//! publishing the shared handle before any suspension, so two overlapping
//! calls can never race into duplicate transport starts.
//!
//! ## 2. No Torn Status Reads
//!
//! The `(state, error)` pair is one watch value, published atomically.
//! An observer reacts to either half without ever seeing a stale error
//! against a new state.
//!
//! ## 3. Cooperative Cancellation
//!
//! `disconnect()` cancels the lineage token; every wait in the system
//! loses a `tokio::select!` against it promptly, and every unwind path
//! settles the machine into `Disconnected`.
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use uplink::{NetworkMonitor, Uplink};
//!
//! let link = Uplink::new(Arc::new(my_transport), NetworkMonitor::assume_online());
//!
//! // Resolves when connected; retries with backoff until then.
//! link.connect().await?;
//!
//! // React to lifecycle changes.
//! let mut status = link.subscribe();
//!
//! // Tear everything down, wherever the machine currently is.
//! link.disconnect();
//! ```

pub mod backoff;
pub mod cancel;
pub mod client;
pub mod error;
pub mod network;
pub mod state;
pub mod transport;

pub use cancel::{CancelToken, ListenerGuard, ListenerId};
pub use client::{Uplink, UplinkConfig};
pub use error::UplinkError;
pub use network::{network_status, NetworkMonitor, NetworkReporter};
pub use state::{ConnectionState, ConnectionStatus};
pub use transport::Transport;
