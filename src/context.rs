//! Device context: backend, fence, command context and state tracker.
//!
//! Everything that records or submits GPU work goes through a [`GpuContext`].
//! It couples barrier insertion with recording so a transition is always
//! recorded in the same command stream that updates the tracker, and it
//! refuses to release a resource while submitted work might still use it.

use std::sync::Arc;

use crate::backend::GpuBackend;
use crate::command::{Command, CommandContext};
use crate::device_call;
use crate::error::{GraphicsError, GraphicsResult};
use crate::state_tracker::{ResourceState, ResourceStateTracker};
use crate::sync::Fence;
use crate::types::{BufferDesc, BufferId, PipelineId, ResourceId, TextureDesc, TextureId};

pub struct GpuContext {
    backend: Arc<dyn GpuBackend>,
    fence: Fence,
    commands: CommandContext,
    tracker: ResourceStateTracker,
}

impl GpuContext {
    /// Create a context whose command list is open for recording.
    pub fn new(backend: Arc<dyn GpuBackend>) -> Self {
        log::info!("creating GPU context on {}", backend.name());
        Self {
            backend,
            fence: Fence::new(),
            commands: CommandContext::new(),
            tracker: ResourceStateTracker::new(),
        }
    }

    pub fn backend(&self) -> &dyn GpuBackend {
        self.backend.as_ref()
    }

    pub fn backend_arc(&self) -> Arc<dyn GpuBackend> {
        Arc::clone(&self.backend)
    }

    pub fn fence(&self) -> &Fence {
        &self.fence
    }

    pub fn commands(&self) -> &CommandContext {
        &self.commands
    }

    /// Direct access to the command list, for commands that change no
    /// resource state.
    pub fn commands_mut(&mut self) -> &mut CommandContext {
        &mut self.commands
    }

    pub fn tracker(&self) -> &ResourceStateTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut ResourceStateTracker {
        &mut self.tracker
    }

    /// Reopen the command list if it is closed.
    ///
    /// Fails if the allocator's last submission has not retired.
    pub fn begin(&mut self, initial_pipeline: Option<PipelineId>) -> GraphicsResult<()> {
        if self.commands.is_recording() {
            return Ok(());
        }
        let completed = self.backend.completed_value();
        self.commands.reset(completed, initial_pipeline)
    }

    pub fn record(&mut self, command: Command) -> GraphicsResult<()> {
        self.commands.record(command)
    }

    /// Transition a resource and record the barrier.
    pub fn transition(
        &mut self,
        resource: impl Into<ResourceId>,
        to: ResourceState,
    ) -> GraphicsResult<()> {
        let barrier = self.tracker.transition(resource, to)?;
        self.commands.barriers(vec![barrier])
    }

    /// Transition a resource only if it is in another state.
    pub fn ensure(&mut self, resource: impl Into<ResourceId>, to: ResourceState) -> GraphicsResult<()> {
        match self.tracker.ensure(resource, to)? {
            Some(barrier) => self.commands.barriers(vec![barrier]),
            None => Ok(()),
        }
    }

    /// Transition several resources with a single barrier batch.
    pub fn transition_many(&mut self, transitions: &[(ResourceId, ResourceState)]) -> GraphicsResult<()> {
        let barriers = self.tracker.transition_many(transitions)?;
        self.commands.barriers(barriers)
    }

    /// Close and submit the recorded commands. Returns the fence value that
    /// marks their completion.
    pub fn submit(&mut self) -> GraphicsResult<u64> {
        self.commands.close()?;
        self.commands.submit(self.backend.as_ref(), &mut self.fence)
    }

    /// Block until every submitted command has retired.
    pub fn flush(&mut self) -> GraphicsResult<u64> {
        self.fence.flush(self.backend.as_ref())
    }

    /// Submit the recorded commands and wait for them.
    pub fn submit_and_flush(&mut self) -> GraphicsResult<u64> {
        self.submit()?;
        self.flush()
    }

    pub fn is_idle(&self) -> bool {
        self.fence.is_idle(self.backend.as_ref())
    }

    /// Create a texture and track it in its initial state.
    pub fn create_texture(&mut self, desc: &TextureDesc) -> GraphicsResult<TextureId> {
        let texture = device_call!(self.backend.create_texture(desc))?;
        self.tracker.register(texture, desc.initial_state);
        Ok(texture)
    }

    /// Create a buffer and track it in its initial state.
    pub fn create_buffer(&mut self, desc: &BufferDesc) -> GraphicsResult<BufferId> {
        let buffer = device_call!(self.backend.create_buffer(desc))?;
        self.tracker.register(buffer, desc.initial_state);
        Ok(buffer)
    }

    fn expect_idle(&self, resource: ResourceId) -> GraphicsResult<()> {
        if !self.is_idle() {
            return Err(GraphicsError::ResourceInUse {
                resource,
                signaled: self.fence.last_signaled(),
                completed: self.fence.completed(self.backend.as_ref()),
            });
        }
        Ok(())
    }

    /// Stop tracking and destroy a texture. The GPU must be idle.
    pub fn release_texture(&mut self, texture: TextureId) -> GraphicsResult<()> {
        self.expect_idle(texture.into())?;
        self.tracker.forget(texture);
        self.backend.destroy_texture(texture);
        Ok(())
    }

    /// Stop tracking and destroy a buffer. The GPU must be idle.
    pub fn release_buffer(&mut self, buffer: BufferId) -> GraphicsResult<()> {
        self.expect_idle(buffer.into())?;
        self.tracker.forget(buffer);
        self.backend.destroy_buffer(buffer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;
    use crate::types::TextureFormat;

    fn context() -> (Arc<HeadlessBackend>, GpuContext) {
        let backend = Arc::new(HeadlessBackend::new());
        let ctx = GpuContext::new(backend.clone());
        (backend, ctx)
    }

    #[test]
    fn test_transition_records_barrier() {
        let (_backend, mut ctx) = context();
        let texture = ctx
            .create_texture(
                &TextureDesc::new_2d("depth", 8, 8, TextureFormat::Depth24UnormStencil8),
            )
            .unwrap();

        ctx.transition(texture, ResourceState::DepthWrite).unwrap();
        ctx.ensure(texture, ResourceState::DepthWrite).unwrap();

        assert_eq!(ctx.commands().commands().len(), 1);
        assert_eq!(ctx.tracker().state(texture), Some(ResourceState::DepthWrite));
    }

    #[test]
    fn test_release_requires_idle_gpu() {
        let (backend, mut ctx) = context();
        let texture = ctx
            .create_texture(&TextureDesc::new_2d("target", 8, 8, TextureFormat::Rgba8Unorm))
            .unwrap();
        ctx.submit().unwrap();

        let err = ctx.release_texture(texture).unwrap_err();
        assert!(matches!(err, GraphicsError::ResourceInUse { .. }));
        assert!(ctx.tracker().contains(texture));

        ctx.flush().unwrap();
        ctx.release_texture(texture).unwrap();
        assert!(!ctx.tracker().contains(texture));
        assert_eq!(backend.live_textures(), 0);
    }

    #[test]
    fn test_begin_after_submit_waits_for_retirement() {
        let (backend, mut ctx) = context();
        ctx.submit().unwrap();
        assert!(matches!(
            ctx.begin(None),
            Err(GraphicsError::AllocatorInFlight { .. })
        ));
        backend.complete_pending();
        ctx.begin(None).unwrap();
        assert!(ctx.commands().is_recording());
    }
}
