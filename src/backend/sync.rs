//! CPU-GPU synchronization primitives.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Status of a fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    /// The fence has not yet been signaled.
    Unsignaled,
    /// The fence has been signaled (GPU work complete).
    Signaled,
}

#[derive(Debug, Default)]
struct FenceState {
    signaled: Mutex<bool>,
    condvar: Condvar,
}

/// CPU-GPU synchronization primitive.
///
/// The frame graph creates one fence per submitted frame and hands it to
/// [`RenderDevice::submit`](crate::backend::RenderDevice::submit); the backend
/// signals it when the GPU finishes that frame. Clones share state, so a
/// backend may keep a clone and signal it from a completion thread.
#[derive(Debug, Clone, Default)]
pub struct Fence {
    state: Arc<FenceState>,
}

impl Fence {
    /// Create a new fence in the unsignaled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new fence in the signaled state.
    pub fn new_signaled() -> Self {
        let fence = Self::new();
        fence.signal();
        fence
    }

    /// Check the current status of the fence.
    pub fn status(&self) -> FenceStatus {
        if *self.state.signaled.lock() {
            FenceStatus::Signaled
        } else {
            FenceStatus::Unsignaled
        }
    }

    /// Check if the fence is signaled (non-blocking).
    pub fn is_signaled(&self) -> bool {
        self.status() == FenceStatus::Signaled
    }

    /// Wait for the fence with a timeout.
    ///
    /// Returns `true` if the fence was signaled, `false` if timeout elapsed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut signaled = self.state.signaled.lock();
        if *signaled {
            return true;
        }
        let result = self
            .state
            .condvar
            .wait_while_for(&mut signaled, |signaled| !*signaled, timeout);
        !result.timed_out() || *signaled
    }

    /// Signal the fence and wake every waiter.
    ///
    /// Called by backends when the GPU work guarded by this fence completes.
    pub fn signal(&self) {
        let mut signaled = self.state.signaled.lock();
        *signaled = true;
        self.state.condvar.notify_all();
    }

    /// Reset the fence to unsignaled state.
    ///
    /// Must only be called when no GPU work is pending on this fence.
    pub fn reset(&self) {
        *self.state.signaled.lock() = false;
    }
}
