//! Network availability boundary.
//!
//! Single responsibility: expose the external connectivity detector to
//! the connect loop as a readable boolean signal plus a cancellable
//! wait-until-online. The detector itself lives outside this crate; it
//! feeds the [`NetworkReporter`] half and the loop consumes the
//! [`NetworkMonitor`] half.

use tokio::sync::watch;

use crate::cancel::CancelToken;
use crate::error::UplinkError;

/// Create a connected reporter/monitor pair.
///
/// The signal starts as unknown, which is treated as online: only an
/// explicit `set_online(false)` makes the loop wait for connectivity.
pub fn network_status() -> (NetworkReporter, NetworkMonitor) {
    let (tx, rx) = watch::channel(None);
    (NetworkReporter { tx }, NetworkMonitor { rx })
}

/// The writing half fed by the external connectivity detector.
pub struct NetworkReporter {
    tx: watch::Sender<Option<bool>>,
}

impl NetworkReporter {
    /// Publish the current availability reading.
    pub fn set_online(&self, online: bool) {
        let _ = self.tx.send(Some(online));
    }
}

/// The reading half consumed by the connect loop.
#[derive(Clone)]
pub struct NetworkMonitor {
    rx: watch::Receiver<Option<bool>>,
}

impl NetworkMonitor {
    /// A monitor with no detector behind it; never reports offline.
    pub fn assume_online() -> Self {
        let (_tx, rx) = watch::channel(Some(true));
        Self { rx }
    }

    /// Whether the network is currently known to be offline.
    ///
    /// Unknown readings are not offline, and neither is a vanished
    /// detector (a dropped reporter freezes the last value, which must
    /// not wedge the loop into waiting forever).
    pub fn is_offline(&self) -> bool {
        self.rx.has_changed().is_ok() && matches!(*self.rx.borrow(), Some(false))
    }

    /// Wait until the signal stops reporting offline, or cancellation.
    ///
    /// # Errors
    /// `UplinkError::Cancelled` when the token fires first.
    pub async fn wait_until_online(&self, token: &CancelToken) -> Result<(), UplinkError> {
        let mut rx = self.rx.clone();
        tokio::select! {
            changed = rx.wait_for(|reading| !matches!(reading, Some(false))) => {
                // A closed channel means the detector is gone; treat it
                // like an unknown reading.
                drop(changed);
                Ok(())
            }
            _ = token.cancelled() => Err(UplinkError::Cancelled),
        }
    }
}
