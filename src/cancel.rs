//! Cooperative cancellation for a connect lineage.
//!
//! Single responsibility: a shareable one-way cancellation flag with
//! registerable cleanup listeners and an awaitable completion.
//!
//! One token covers one connect lineage (the initial connect and every
//! automatic reconnect that follows it) and is discarded when the
//! lineage settles into `Disconnected`. Cancellation is cooperative: it
//! is observed at the suspension points (`tokio::select!` against
//! [`CancelToken::cancelled`]) and at explicit checkpoints, never by
//! preempting running code.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;

type Listener = Box<dyn FnOnce() + Send>;

/// Identifier for a registered cancellation listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct TokenState {
    cancelled: bool,
    next_id: u64,
    listeners: HashMap<u64, Listener>,
}

struct TokenInner {
    state: Mutex<TokenState>,
    notify: Notify,
}

/// A shareable one-way cancellation signal.
///
/// Cloning yields another handle to the same token. `cancel()` is
/// idempotent: the first call sets the flag, wakes every waiter, and
/// runs every registered listener exactly once.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

impl CancelToken {
    /// Create a fresh, uncancelled token.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                state: Mutex::new(TokenState {
                    cancelled: false,
                    next_id: 0,
                    listeners: HashMap::new(),
                }),
                notify: Notify::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, TokenState> {
        // The state is plain data; a poisoned lock cannot leave it
        // inconsistent, so recover rather than propagate.
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.state().cancelled
    }

    /// Whether two handles refer to the same token.
    pub fn same_token(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Request cancellation.
    ///
    /// Idempotent. Every listener registered at this moment runs exactly
    /// once, outside the internal lock; the listener map is cleared.
    /// Waiters on [`cancelled`](Self::cancelled) are woken first so
    /// suspended work starts unwinding while cleanup runs.
    pub fn cancel(&self) {
        let listeners: Vec<Listener> = {
            let mut state = self.state();
            if state.cancelled {
                return;
            }
            state.cancelled = true;
            state.listeners.drain().map(|(_, f)| f).collect()
        };
        self.inner.notify.notify_waiters();
        for listener in listeners {
            listener();
        }
    }

    /// Register a cleanup listener, returning its id.
    ///
    /// If the token is already cancelled the listener must still fire; it
    /// runs immediately on the calling thread and the returned id refers
    /// to nothing.
    pub fn add_listener(&self, f: impl FnOnce() + Send + 'static) -> ListenerId {
        let mut state = self.state();
        let id = state.next_id;
        state.next_id += 1;
        if state.cancelled {
            drop(state);
            f();
        } else {
            state.listeners.insert(id, Box::new(f));
        }
        ListenerId(id)
    }

    /// Deregister a listener. No-op if it already ran or never existed.
    pub fn remove_listener(&self, id: ListenerId) {
        self.state().listeners.remove(&id.0);
    }

    /// Register a listener scoped to a guard: dropping the guard
    /// deregisters it, guaranteeing cleanup bookkeeping is undone on
    /// every exit path.
    pub fn listener_guard(&self, f: impl FnOnce() + Send + 'static) -> ListenerGuard {
        ListenerGuard {
            token: self.clone(),
            id: self.add_listener(f),
        }
    }

    /// Wait until cancellation is requested. Completes immediately if it
    /// already was.
    pub async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a cancel between the check
        // and the await cannot be missed.
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped registration of a cancellation listener.
///
/// Deregisters on drop; a no-op if cancellation already fired the
/// listener.
pub struct ListenerGuard {
    token: CancelToken,
    id: ListenerId,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.token.remove_listener(self.id);
    }
}
