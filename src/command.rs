//! Command recording.
//!
//! A [`CommandContext`] owns one [`CommandAllocator`] and one [`CommandList`].
//! It is created once, reset at the start of every frame, and submitted to
//! the queue after it has been closed:
//!
//! ```text
//!            reset()               close()             submit()
//!  Closed ───────────► Recording ──────────► Closed ──────────► queue
//!    ▲                                                            │
//!    └──────────── allocator retired when fence ≥ submit value ◄──┘
//! ```
//!
//! Resetting while the allocator's last submission has not retired on the
//! GPU would overwrite command memory the GPU is still reading, so
//! [`reset`](CommandContext::reset) refuses with
//! [`GraphicsError::AllocatorInFlight`].

use crate::backend::{AccelBuildInputs, GpuBackend};
use crate::device_call;
use crate::error::{GraphicsError, GraphicsResult};
use crate::state_tracker::Barrier;
use crate::sync::Fence;
use crate::types::{
    BufferId, IndexFormat, PipelineId, PrimitiveTopology, ResourceId, ScissorRect, TextureFormat,
    TextureId, Viewport,
};

/// A single recorded GPU operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Barriers(Vec<Barrier>),
    /// Orders unordered-access writes to a resource before later reads.
    UavBarrier(ResourceId),
    ClearRenderTarget {
        target: TextureId,
        color: [f32; 4],
    },
    ClearDepthStencil {
        target: TextureId,
        depth: f32,
        stencil: u8,
    },
    SetRenderTargets {
        color: Vec<TextureId>,
        depth: Option<TextureId>,
    },
    SetViewport(Viewport),
    SetScissor(ScissorRect),
    SetPipeline(PipelineId),
    SetPassConstants {
        buffer: BufferId,
        slot: u32,
        offset: u64,
    },
    SetObjectConstants {
        buffer: BufferId,
        slot: u32,
        offset: u64,
    },
    SetMaterialTable {
        buffer: BufferId,
    },
    SetTextureTable {
        first: u32,
        count: u32,
    },
    SetShadowMap(TextureId),
    SetVertexBuffer {
        buffer: BufferId,
        stride: u64,
    },
    SetIndexBuffer {
        buffer: BufferId,
        format: IndexFormat,
    },
    SetTopology(PrimitiveTopology),
    DrawIndexed {
        index_count: u32,
        start_index: u32,
        base_vertex: i32,
    },
    Resolve {
        source: TextureId,
        destination: TextureId,
        format: TextureFormat,
    },
    CopyBufferToTexture {
        source: BufferId,
        destination: TextureId,
    },
    BuildAccelerationStructure {
        inputs: AccelBuildInputs,
        scratch: BufferId,
        result: BufferId,
    },
}

/// Recording state of a [`CommandContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Recording,
    Closed,
}

/// Backing memory for recorded commands.
///
/// Remembers the fence value of the last submission that referenced it.
#[derive(Debug, Default)]
pub struct CommandAllocator {
    submitted_at: u64,
}

impl CommandAllocator {
    /// Fence value that must complete before the allocator can be reused.
    pub fn submitted_at(&self) -> u64 {
        self.submitted_at
    }

    pub fn is_retired(&self, completed: u64) -> bool {
        completed >= self.submitted_at
    }
}

#[derive(Debug, Default)]
pub struct CommandList {
    commands: Vec<Command>,
}

impl CommandList {
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Single command allocator and command list pair.
#[derive(Debug)]
pub struct CommandContext {
    allocator: CommandAllocator,
    list: CommandList,
    state: ContextState,
    submissions: u64,
}

impl Default for CommandContext {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandContext {
    /// Create a context that is open for recording.
    pub fn new() -> Self {
        Self {
            allocator: CommandAllocator::default(),
            list: CommandList::default(),
            state: ContextState::Recording,
            submissions: 0,
        }
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == ContextState::Recording
    }

    pub fn allocator(&self) -> &CommandAllocator {
        &self.allocator
    }

    pub fn commands(&self) -> &[Command] {
        self.list.commands()
    }

    /// Number of times this context has been submitted.
    pub fn submissions(&self) -> u64 {
        self.submissions
    }

    fn expect_state(&self, expected: ContextState) -> GraphicsResult<()> {
        if self.state != expected {
            return Err(GraphicsError::InvalidContextState {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }

    /// Reuse the allocator and reopen the list for recording.
    ///
    /// The context must be closed and its last submission must have retired
    /// (`completed >= submitted_at`).
    pub fn reset(
        &mut self,
        completed: u64,
        initial_pipeline: Option<PipelineId>,
    ) -> GraphicsResult<()> {
        self.expect_state(ContextState::Closed)?;
        if !self.allocator.is_retired(completed) {
            return Err(GraphicsError::AllocatorInFlight {
                submitted: self.allocator.submitted_at,
                completed,
            });
        }

        self.list.commands.clear();
        self.state = ContextState::Recording;
        if let Some(pipeline) = initial_pipeline {
            self.list.commands.push(Command::SetPipeline(pipeline));
        }
        Ok(())
    }

    /// Append a command. The context must be recording.
    pub fn record(&mut self, command: Command) -> GraphicsResult<()> {
        self.expect_state(ContextState::Recording)?;
        self.list.commands.push(command);
        Ok(())
    }

    /// Record a batch of barriers. An empty batch records nothing.
    pub fn barriers(&mut self, barriers: Vec<Barrier>) -> GraphicsResult<()> {
        if barriers.is_empty() {
            return self.expect_state(ContextState::Recording);
        }
        self.record(Command::Barriers(barriers))
    }

    pub fn uav_barrier(&mut self, resource: impl Into<ResourceId>) -> GraphicsResult<()> {
        self.record(Command::UavBarrier(resource.into()))
    }

    pub fn clear_render_target(&mut self, target: TextureId, color: [f32; 4]) -> GraphicsResult<()> {
        self.record(Command::ClearRenderTarget { target, color })
    }

    pub fn clear_depth_stencil(&mut self, target: TextureId, depth: f32, stencil: u8) -> GraphicsResult<()> {
        self.record(Command::ClearDepthStencil {
            target,
            depth,
            stencil,
        })
    }

    pub fn set_render_targets(&mut self, color: &[TextureId], depth: Option<TextureId>) -> GraphicsResult<()> {
        self.record(Command::SetRenderTargets {
            color: color.to_vec(),
            depth,
        })
    }

    pub fn set_viewport(&mut self, viewport: Viewport) -> GraphicsResult<()> {
        self.record(Command::SetViewport(viewport))
    }

    pub fn set_scissor(&mut self, scissor: ScissorRect) -> GraphicsResult<()> {
        self.record(Command::SetScissor(scissor))
    }

    pub fn set_pipeline(&mut self, pipeline: PipelineId) -> GraphicsResult<()> {
        self.record(Command::SetPipeline(pipeline))
    }

    pub fn set_pass_constants(&mut self, buffer: BufferId, slot: u32, offset: u64) -> GraphicsResult<()> {
        self.record(Command::SetPassConstants {
            buffer,
            slot,
            offset,
        })
    }

    pub fn set_object_constants(&mut self, buffer: BufferId, slot: u32, offset: u64) -> GraphicsResult<()> {
        self.record(Command::SetObjectConstants {
            buffer,
            slot,
            offset,
        })
    }

    pub fn set_material_table(&mut self, buffer: BufferId) -> GraphicsResult<()> {
        self.record(Command::SetMaterialTable { buffer })
    }

    pub fn set_texture_table(&mut self, first: u32, count: u32) -> GraphicsResult<()> {
        self.record(Command::SetTextureTable { first, count })
    }

    pub fn set_shadow_map(&mut self, texture: TextureId) -> GraphicsResult<()> {
        self.record(Command::SetShadowMap(texture))
    }

    pub fn set_vertex_buffer(&mut self, buffer: BufferId, stride: u64) -> GraphicsResult<()> {
        self.record(Command::SetVertexBuffer { buffer, stride })
    }

    pub fn set_index_buffer(&mut self, buffer: BufferId, format: IndexFormat) -> GraphicsResult<()> {
        self.record(Command::SetIndexBuffer { buffer, format })
    }

    pub fn set_topology(&mut self, topology: PrimitiveTopology) -> GraphicsResult<()> {
        self.record(Command::SetTopology(topology))
    }

    pub fn draw_indexed(&mut self, index_count: u32, start_index: u32, base_vertex: i32) -> GraphicsResult<()> {
        self.record(Command::DrawIndexed {
            index_count,
            start_index,
            base_vertex,
        })
    }

    pub fn resolve(&mut self, source: TextureId, destination: TextureId, format: TextureFormat) -> GraphicsResult<()> {
        self.record(Command::Resolve {
            source,
            destination,
            format,
        })
    }

    pub fn copy_buffer_to_texture(&mut self, source: BufferId, destination: TextureId) -> GraphicsResult<()> {
        self.record(Command::CopyBufferToTexture {
            source,
            destination,
        })
    }

    pub fn build_acceleration_structure(
        &mut self,
        inputs: AccelBuildInputs,
        scratch: BufferId,
        result: BufferId,
    ) -> GraphicsResult<()> {
        self.record(Command::BuildAccelerationStructure {
            inputs,
            scratch,
            result,
        })
    }

    pub fn close(&mut self) -> GraphicsResult<()> {
        self.expect_state(ContextState::Recording)?;
        self.state = ContextState::Closed;
        Ok(())
    }

    /// Hand the closed list to the queue and signal the fence behind it.
    ///
    /// Returns the fence value that marks completion of this submission.
    pub fn submit(&mut self, backend: &dyn GpuBackend, fence: &mut Fence) -> GraphicsResult<u64> {
        self.expect_state(ContextState::Closed)?;
        device_call!(backend.execute(&self.list.commands))?;
        let value = fence.signal(backend)?;
        self.allocator.submitted_at = value;
        self.submissions += 1;
        log::trace!(
            "submitted {} commands at fence value {value}",
            self.list.commands.len()
        );
        Ok(value)
    }
}
