//! A single batch window: the lookups collected before one dispatch.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tokio::sync::{oneshot, Notify};

use crate::error::{DomainError, DomainResult};

type Waiter<V> = oneshot::Sender<DomainResult<V>>;

/// Lookups registered in a window, keyed by entity id.
pub(crate) struct Pending<V> {
    /// Distinct ids in first-request order.
    order: Vec<String>,
    waiters: HashMap<String, Vec<Waiter<V>>>,
}

impl<V> Default for Pending<V> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            waiters: HashMap::new(),
        }
    }
}

impl<V: Clone> Pending<V> {
    /// Drops callers that stopped waiting and returns the ids somebody
    /// still needs.
    pub(crate) fn live_ids(&mut self) -> Vec<String> {
        self.waiters.retain(|_, waiters| {
            waiters.retain(|waiter| !waiter.is_closed());
            !waiters.is_empty()
        });
        let waiters = &self.waiters;
        self.order.retain(|id| waiters.contains_key(id));
        self.order.clone()
    }

    /// Hands every caller its own outcome.
    ///
    /// A failed call fails every caller; an id missing from a successful
    /// response fails only the callers of that id.
    pub(crate) fn resolve(self, outcome: DomainResult<HashMap<String, V>>) {
        match outcome {
            Ok(mut records) => {
                for (id, waiters) in self.waiters {
                    let result = records
                        .remove(&id)
                        .ok_or_else(|| DomainError::NotFound { id: id.clone() });
                    for waiter in waiters {
                        // A closed receiver means that caller gave up.
                        let _ = waiter.send(result.clone());
                    }
                }
            }
            Err(err) => {
                for waiter in self.waiters.into_values().flatten() {
                    let _ = waiter.send(Err(err.clone()));
                }
            }
        }
    }
}

enum WindowState<V> {
    Open(Pending<V>),
    Closed,
}

/// Result of registering a lookup.
pub(crate) struct Joined<V> {
    pub(crate) receiver: oneshot::Receiver<DomainResult<V>>,
    /// The window reached its size limit and should dispatch now.
    pub(crate) full: bool,
}

/// Collection of lookups open for joining until it is dispatched.
///
/// Once closed a window never reopens; later lookups go to a new window.
pub(crate) struct BatchWindow<V> {
    state: Mutex<WindowState<V>>,
    flush: Notify,
}

impl<V> BatchWindow<V> {
    #[cfg(test)]
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(WindowState::Open(Pending::default())),
            flush: Notify::new(),
        }
    }

    /// Opens a window whose first lookup is `id`.
    pub(crate) fn opened_with(id: &str, max_batch_size: usize) -> (Self, Joined<V>) {
        let (tx, rx) = oneshot::channel();
        let pending = Pending {
            order: vec![id.to_string()],
            waiters: HashMap::from([(id.to_string(), vec![tx])]),
        };
        let window = Self {
            state: Mutex::new(WindowState::Open(pending)),
            flush: Notify::new(),
        };
        let joined = Joined {
            receiver: rx,
            full: max_batch_size <= 1,
        };
        (window, joined)
    }

    /// Registers a lookup for `id`.
    ///
    /// Returns `None` if the window is closed, or full and `id` is not
    /// already part of it.
    pub(crate) fn join(&self, id: &str, max_batch_size: usize) -> Option<Joined<V>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let pending = match &mut *state {
            WindowState::Open(pending) => pending,
            WindowState::Closed => return None,
        };

        let (tx, rx) = oneshot::channel();
        match pending.waiters.get_mut(id) {
            Some(waiters) => waiters.push(tx),
            None => {
                if pending.order.len() >= max_batch_size {
                    return None;
                }
                pending.order.push(id.to_string());
                pending.waiters.insert(id.to_string(), vec![tx]);
            }
        }

        Some(Joined {
            receiver: rx,
            full: pending.order.len() >= max_batch_size,
        })
    }

    /// Closes the window and takes its lookups.
    pub(crate) fn close(&self) -> Pending<V> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match std::mem::replace(&mut *state, WindowState::Closed) {
            WindowState::Open(pending) => pending,
            WindowState::Closed => Pending::default(),
        }
    }

    /// Asks the dispatcher to stop waiting for the coalescing delay.
    pub(crate) fn request_flush(&self) {
        self.flush.notify_one();
    }

    /// Completes once a flush was requested.
    pub(crate) async fn flush_requested(&self) {
        self.flush.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_ids_share_a_slot() {
        let window: BatchWindow<String> = BatchWindow::new();
        let _a = window.join("1", 10).unwrap();
        let _b = window.join("2", 10).unwrap();
        let _c = window.join("1", 10).unwrap();

        let mut pending = window.close();
        assert_eq!(pending.live_ids(), vec!["1".to_string(), "2".to_string()]);
    }

    #[test]
    fn test_closed_window_rejects_joins() {
        let window: BatchWindow<String> = BatchWindow::new();
        let _a = window.join("1", 10).unwrap();
        let _ = window.close();

        assert!(window.join("2", 10).is_none());
        assert!(window.join("1", 10).is_none());
    }

    #[test]
    fn test_full_window_accepts_only_known_ids() {
        let window: BatchWindow<String> = BatchWindow::new();
        assert!(!window.join("1", 2).unwrap().full);
        assert!(window.join("2", 2).unwrap().full);

        assert!(window.join("3", 2).is_none());
        assert!(window.join("1", 2).is_some());
    }

    #[test]
    fn test_abandoned_callers_are_dropped_before_dispatch() {
        let window: BatchWindow<String> = BatchWindow::new();
        let gone = window.join("1", 10).unwrap();
        let kept = window.join("2", 10).unwrap();
        drop(gone.receiver);

        let mut pending = window.close();
        assert_eq!(pending.live_ids(), vec!["2".to_string()]);
        drop(kept);
    }

    #[test]
    fn test_missing_id_fails_only_its_callers() {
        let window: BatchWindow<String> = BatchWindow::new();
        let mut found = window.join("1", 10).unwrap().receiver;
        let mut missing = window.join("3", 10).unwrap().receiver;

        let mut pending = window.close();
        pending.live_ids();
        pending.resolve(Ok(HashMap::from([("1".to_string(), "one".to_string())])));

        assert_eq!(found.try_recv().unwrap(), Ok("one".to_string()));
        assert_eq!(
            missing.try_recv().unwrap(),
            Err(DomainError::NotFound {
                id: "3".to_string()
            })
        );
    }
}
