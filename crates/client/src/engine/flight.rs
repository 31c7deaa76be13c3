//! In-process single-flight: concurrent callers share one execution.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OnceCell;

/// Coalesces concurrent calls into one in-flight operation.
///
/// The first caller runs the operation; callers arriving while it runs
/// await the same result. Once it finishes the slot is cleared, so the next
/// call starts fresh. If the running caller is cancelled, a waiter takes
/// over with its own operation.
pub struct SingleFlight<T> {
    slot: Mutex<Option<Arc<OnceCell<T>>>>,
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self { slot: Mutex::new(None) }
    }
}

impl<T: Clone> SingleFlight<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an operation is currently in flight.
    pub fn in_flight(&self) -> bool {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Run `op`, or join the operation already running.
    ///
    /// Returns the shared value and whether this caller executed `op`.
    pub async fn run<F, Fut>(&self, op: F) -> (T, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let cell = {
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            slot.get_or_insert_with(|| Arc::new(OnceCell::new())).clone()
        };

        let mut leader = false;
        let value = cell
            .get_or_init(|| {
                leader = true;
                op()
            })
            .await
            .clone();

        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, &cell)) {
            *slot = None;
        }

        (value, leader)
    }
}
