use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Single-send-at-a-time guard shared between the controller and the view.
#[derive(Debug, Clone, Default)]
pub struct BusyFlag {
    busy: Arc<AtomicBool>,
}

impl BusyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Mark the flag busy, or return `None` if it already is.
    ///
    /// The flag is cleared when the returned guard drops, whichever way the
    /// holder exits.
    pub fn try_acquire(&self) -> Option<BusyGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard {
                busy: Arc::clone(&self.busy),
                on_release: None,
            })
    }
}

pub struct BusyGuard {
    busy: Arc<AtomicBool>,
    on_release: Option<Box<dyn FnOnce() + Send>>,
}

impl BusyGuard {
    /// Run `f` right after the flag is cleared.
    pub fn on_release<F>(mut self, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_release = Some(Box::new(f));
        self
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
        if let Some(f) = self.on_release.take() {
            f();
        }
    }
}
