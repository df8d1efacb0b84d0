use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Default, Debug)]
struct FaultInjectionState {
    store_failures: AtomicU32,
}

/// Fault injection toggles for exercising transient store failures.
///
/// Cloned handles share state, so a test can arm faults on its copy while the
/// store consumes them on another.
#[derive(Clone, Default, Debug)]
pub struct FaultInjector {
    state: Arc<FaultInjectionState>,
}

impl FaultInjector {
    /// Arm the next `count` store operations to fail.
    pub fn fail_store_ops(&self, count: u32) {
        self.state.store_failures.store(count, Ordering::Relaxed);
    }

    /// Consume one pending store fault, if any.
    pub fn take_store_fault(&self) -> bool {
        self.state
            .store_failures
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
    }

    pub fn pending_store_faults(&self) -> u32 {
        self.state.store_failures.load(Ordering::Relaxed)
    }
}
