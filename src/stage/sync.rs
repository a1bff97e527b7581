//! Synchronization primitives for stage submission.
//!
//! Semaphores order GPU work between stages; fences let the CPU observe
//! completion of a presented frame. Both are host-side planning objects:
//! a queue layer that plays back submission plans would attach native
//! handles to them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::backend::{FenceView, SemaphoreView};

/// GPU-GPU synchronization semaphore owned by one stage graph edge.
///
/// One stage signals the semaphore when its submission finishes; the
/// dependent stage waits on it before starting.
#[derive(Debug)]
pub struct Semaphore {
    /// Unique identifier for debugging.
    id: u64,
    /// "parent -> child" edge name. Empty in release builds.
    debug_name: String,
    view: SemaphoreView,
}

impl Semaphore {
    pub(crate) fn new(id: u64, debug_name: String) -> Self {
        Self {
            id,
            debug_name,
            view: SemaphoreView::Dummy,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }

    pub fn view(&self) -> &SemaphoreView {
        &self.view
    }
}

/// Status of a fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    /// The fence has not yet been signaled.
    Unsignaled,
    /// The fence has been signaled (GPU work complete).
    Signaled,
}

/// CPU-GPU synchronization primitive.
///
/// Cloning shares the underlying signal state, so a fence can be handed
/// to the waiting side while the graph keeps its own copy.
#[derive(Debug)]
pub struct Fence {
    signaled: Arc<AtomicBool>,
}

impl Fence {
    pub(crate) fn new_unsignaled() -> Self {
        Self {
            signaled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn view(&self) -> FenceView {
        FenceView::Dummy(self.signaled.clone())
    }

    pub fn status(&self) -> FenceStatus {
        if self.signaled.load(Ordering::Acquire) {
            FenceStatus::Signaled
        } else {
            FenceStatus::Unsignaled
        }
    }

    pub fn is_signaled(&self) -> bool {
        self.status() == FenceStatus::Signaled
    }

    /// Block until the fence signals.
    pub fn wait(&self) {
        while !self.signaled.load(Ordering::Acquire) {
            std::hint::spin_loop();
        }
    }

    /// Block until the fence signals or `timeout` elapses. Returns
    /// whether the fence signaled.
    pub fn wait_timeout(&self, timeout: std::time::Duration) -> bool {
        let start = std::time::Instant::now();
        while !self.signaled.load(Ordering::Acquire) {
            if start.elapsed() >= timeout {
                return false;
            }
            std::hint::spin_loop();
        }
        true
    }

    /// Reset to unsignaled. Only valid when no submission is pending on
    /// this fence.
    pub fn reset(&self) {
        self.signaled.store(false, Ordering::Release);
    }

    pub(crate) fn signal(&self) {
        self.signaled.store(true, Ordering::Release);
    }
}

impl Clone for Fence {
    fn clone(&self) -> Self {
        Self {
            signaled: Arc::clone(&self.signaled),
        }
    }
}

impl Default for Fence {
    fn default() -> Self {
        Self::new_unsignaled()
    }
}
