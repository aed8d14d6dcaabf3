use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Calls an async tick at a fixed interval until the tick returns `false`.
/// At most one cycle runs at a time.
///
/// Each cycle gets a generation number. `active` holds the generation of the
/// running cycle, or 0 when idle, so a finishing cycle only clears its own
/// entry and never a newer one started after a `stop`.
#[derive(Default)]
pub struct Poller {
    active: Arc<AtomicU64>,
    generation: AtomicU64,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Poller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::SeqCst) != 0
    }

    /// Start a cycle. Returns `false` without doing anything if one is active.
    /// Must be called from within a tokio runtime.
    pub fn start<F, Fut>(&self, interval: Duration, mut tick: F) -> bool
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if self
            .active
            .compare_exchange(0, generation, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::debug!("poller already running; start ignored");
            return false;
        }

        let active = Arc::clone(&self.active);
        let handle = tokio::spawn(async move {
            let mut ticks = 0u64;
            loop {
                tokio::time::sleep(interval).await;
                ticks += 1;
                if !tick().await {
                    break;
                }
            }
            log::debug!("poll cycle {} finished after {} ticks", generation, ticks);
            let _ = active.compare_exchange(generation, 0, Ordering::SeqCst, Ordering::SeqCst);
        });

        let previous = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
        true
    }

    pub fn stop(&self) {
        if let Some(handle) = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        self.active.store(0, Ordering::SeqCst);
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}
