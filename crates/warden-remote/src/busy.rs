use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::LifecycleError;

/// Single-flight guard: at most one lifecycle operation may run at a time.
/// Owned by the orchestrator and handed out by handle rather than living in
/// a process-wide global, so tests don't need cross-test fixtures.
#[derive(Clone, Debug, Default)]
pub struct BusyFlag {
    held: Arc<AtomicBool>,
}

impl BusyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare-and-set acquisition. The returned permit releases the flag
    /// when dropped, which is what guarantees release on every exit path,
    /// including failure and cancellation.
    pub fn try_acquire(&self) -> Result<BusyPermit, LifecycleError> {
        if self
            .held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            Ok(BusyPermit {
                flag: self.held.clone(),
            })
        } else {
            Err(LifecycleError::AlreadyBusy)
        }
    }

    pub fn is_busy(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct BusyPermit {
    flag: Arc<AtomicBool>,
}

impl Drop for BusyPermit {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
