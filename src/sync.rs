//! CPU/GPU synchronization.
//!
//! The [`Fence`] is a monotonically increasing counter. The CPU asks the
//! queue to set it to a new target once all previously submitted work has
//! finished ([`signal`](Fence::signal)), and blocks on the device's wait
//! primitive until the completed value reaches a target
//! ([`wait`](Fence::wait)). [`flush`](Fence::flush) does both and is the only
//! blocking point of the frame loop.
//!
//! A resource last used by GPU work submitted before fence value `N` may be
//! reclaimed only once the completed value is at least `N`.

use crate::backend::GpuBackend;
use crate::device_call;
use crate::error::GraphicsResult;

/// Monotonic frame fence.
#[derive(Debug, Default)]
pub struct Fence {
    last_signaled: u64,
}

impl Fence {
    pub fn new() -> Self {
        Self::default()
    }

    /// The highest value requested so far.
    pub fn last_signaled(&self) -> u64 {
        self.last_signaled
    }

    /// The highest value the GPU has reached.
    pub fn completed(&self, backend: &dyn GpuBackend) -> u64 {
        backend.completed_value()
    }

    pub fn is_complete(&self, backend: &dyn GpuBackend, value: u64) -> bool {
        backend.completed_value() >= value
    }

    /// Whether every requested value has been reached.
    pub fn is_idle(&self, backend: &dyn GpuBackend) -> bool {
        self.is_complete(backend, self.last_signaled)
    }

    /// Enqueue a signal of `last_signaled + 1` behind all submitted work.
    pub fn signal(&mut self, backend: &dyn GpuBackend) -> GraphicsResult<u64> {
        let target = self.last_signaled + 1;
        device_call!(backend.signal(target))?;
        self.last_signaled = target;
        Ok(target)
    }

    /// Block until the GPU reaches `value`.
    pub fn wait(&self, backend: &dyn GpuBackend, value: u64) -> GraphicsResult<()> {
        if backend.completed_value() >= value {
            return Ok(());
        }
        log::trace!("waiting for fence value {value}");
        device_call!(backend.wait_for_value(value))
    }

    /// Signal and wait, retiring all work submitted before the call.
    pub fn flush(&mut self, backend: &dyn GpuBackend) -> GraphicsResult<u64> {
        let target = self.signal(backend)?;
        self.wait(backend, target)?;
        Ok(target)
    }
}
