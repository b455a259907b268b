//! Cancellable, re-armable trailing-edge debounce.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

type Action = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct Pending {
    action: Option<Action>,
    timer: Option<JoinHandle<()>>,
    generation: u64,
}

/// Runs the most recently scheduled action once `delay` has passed without
/// another call.
///
/// Each [`call`](Self::call) replaces the pending action and re-arms the
/// timer. [`settle`](Self::settle) runs the pending action right away.
/// Outside a tokio runtime the action runs immediately.
pub struct Debouncer {
    delay: Duration,
    pending: Arc<Mutex<Pending>>,
}

impl std::fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debouncer")
            .field("delay", &self.delay)
            .field("pending", &self.is_pending())
            .finish()
    }
}

fn lock(pending: &Mutex<Pending>) -> MutexGuard<'_, Pending> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Arc::new(Mutex::new(Pending::default())),
        }
    }

    /// Schedule `action`, replacing whatever was pending.
    pub fn call(&self, action: impl FnOnce() + Send + 'static) {
        let mut pending = lock(&self.pending);
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }
        pending.action = Some(Box::new(action));
        pending.generation = pending.generation.wrapping_add(1);
        let generation = pending.generation;

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            let action = pending.action.take();
            drop(pending);
            if let Some(action) = action {
                action();
            }
            return;
        };

        let shared = Arc::clone(&self.pending);
        let delay = self.delay;
        pending.timer = Some(handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let action = {
                let mut pending = lock(&shared);
                if pending.generation != generation {
                    return;
                }
                pending.timer = None;
                pending.action.take()
            };
            if let Some(action) = action {
                action();
            }
        }));
    }

    /// Run the pending action now, if any. Returns whether one ran.
    pub fn settle(&self) -> bool {
        let action = {
            let mut pending = lock(&self.pending);
            if let Some(timer) = pending.timer.take() {
                timer.abort();
            }
            pending.generation = pending.generation.wrapping_add(1);
            pending.action.take()
        };
        match action {
            Some(action) => {
                action();
                true
            }
            None => false,
        }
    }

    /// Drop the pending action without running it.
    pub fn cancel(&self) {
        let mut pending = lock(&self.pending);
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }
        pending.generation = pending.generation.wrapping_add(1);
        pending.action = None;
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.pending).action.is_some()
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        if let Some(timer) = lock(&self.pending).timer.take() {
            timer.abort();
        }
    }
}
