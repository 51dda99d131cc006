//! Headless GPU backend for testing and development.
//!
//! This backend doesn't execute any rendering but emulates the parts of a
//! device the frame core depends on: resource lifetimes, a queue fence whose
//! signals complete only when waited on, a swapchain that rotates back
//! buffers on present, and a validation layer that rejects commands which
//! use a resource in the wrong state.
//!
//! Every observable action is appended to an event log so tests can inspect
//! submission order, fence traffic and resource destruction.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::command::Command;
use crate::error::DeviceStatus;
use crate::pipeline::RenderPipelineDesc;
use crate::state_tracker::{Barrier, ResourceState};
use crate::types::{
    BufferDesc, BufferId, BufferUsage, PipelineId, ResourceId, TextureDesc, TextureFormat,
    TextureId, TextureUsage,
};

use super::{
    AccelBuildInputs, AccelPrebuildInfo, DeviceResult, GpuBackend, SwapchainDesc,
};

const ADDRESS_BASE: u64 = 0x1_0000_0000;
const PLACEMENT_ALIGNMENT: u64 = 256;

/// Something the headless device observed.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    BufferCreated {
        buffer: BufferId,
        label: String,
    },
    TextureCreated {
        texture: TextureId,
        label: String,
    },
    /// A buffer was destroyed while the fence stood at the given values.
    BufferDestroyed {
        buffer: BufferId,
        completed: u64,
        signaled: u64,
    },
    /// A texture was destroyed while the fence stood at the given values.
    TextureDestroyed {
        texture: TextureId,
        label: String,
        completed: u64,
        signaled: u64,
    },
    PipelineCreated {
        pipeline: PipelineId,
        label: String,
    },
    Executed {
        commands: Vec<Command>,
    },
    Signaled(u64),
    Waited(u64),
    Presented {
        back_buffer: TextureId,
    },
    SwapchainResized {
        width: u32,
        height: u32,
    },
}

#[derive(Debug)]
struct TextureRecord {
    desc: TextureDesc,
    state: ResourceState,
}

#[derive(Debug)]
struct BufferRecord {
    desc: BufferDesc,
    state: ResourceState,
    data: Vec<u8>,
    address: u64,
}

#[derive(Debug)]
struct PipelineRecord {
    sample_count: u32,
    color_formats: Vec<TextureFormat>,
    depth_format: Option<TextureFormat>,
}

#[derive(Debug)]
struct SwapchainState {
    desc: SwapchainDesc,
    buffers: Vec<TextureId>,
    current: usize,
}

#[derive(Debug, Default)]
struct BoundState {
    pipeline: Option<PipelineId>,
    color: Vec<TextureId>,
    depth: Option<TextureId>,
}

#[derive(Debug)]
struct HeadlessState {
    next_id: u64,
    next_address: u64,
    buffers: HashMap<BufferId, BufferRecord>,
    textures: HashMap<TextureId, TextureRecord>,
    pipelines: HashMap<PipelineId, PipelineRecord>,
    signaled: u64,
    completed: u64,
    pending: VecDeque<u64>,
    swapchain: Option<SwapchainState>,
    lost: Option<DeviceStatus>,
    msaa_quality_levels: u32,
    events: Vec<BackendEvent>,
}

impl Default for HeadlessState {
    fn default() -> Self {
        Self {
            next_id: 1,
            next_address: ADDRESS_BASE,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            pipelines: HashMap::new(),
            signaled: 0,
            completed: 0,
            pending: VecDeque::new(),
            swapchain: None,
            lost: None,
            msaa_quality_levels: 4,
            events: Vec::new(),
        }
    }
}

impl HeadlessState {
    fn alive(&self) -> DeviceResult<()> {
        match self.lost {
            Some(status) => Err(status),
            None => Ok(()),
        }
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn insert_texture(&mut self, desc: &TextureDesc) -> TextureId {
        let texture = TextureId(self.allocate_id());
        self.textures.insert(
            texture,
            TextureRecord {
                desc: desc.clone(),
                state: desc.initial_state,
            },
        );
        self.events.push(BackendEvent::TextureCreated {
            texture,
            label: desc.label.clone(),
        });
        texture
    }

    fn create_back_buffers(&mut self, desc: &SwapchainDesc) -> Vec<TextureId> {
        (0..desc.buffer_count)
            .map(|i| {
                let texture_desc =
                    TextureDesc::new_2d(format!("back buffer {i}"), desc.width, desc.height, desc.format)
                        .with_usage(
                            TextureUsage::RENDER_TARGET
                                | TextureUsage::RESOLVE_DST
                                | TextureUsage::PRESENT,
                        )
                        .with_initial_state(ResourceState::Present);
                self.insert_texture(&texture_desc)
            })
            .collect()
    }

    fn resource_state_mut(&mut self, resource: ResourceId) -> Option<&mut ResourceState> {
        match resource {
            ResourceId::Texture(id) => self.textures.get_mut(&id).map(|r| &mut r.state),
            ResourceId::Buffer(id) => self.buffers.get_mut(&id).map(|r| &mut r.state),
        }
    }

    fn texture_state(&self, texture: TextureId) -> Option<ResourceState> {
        self.textures.get(&texture).map(|r| r.state)
    }

    fn apply_barrier(&mut self, barrier: &Barrier) -> DeviceResult<()> {
        let state = self
            .resource_state_mut(barrier.resource)
            .ok_or(DeviceStatus::InvalidArgument)?;
        if *state != barrier.before {
            log::error!(
                "HeadlessBackend: barrier on {:?} expects {:?} but resource is in {:?}",
                barrier.resource,
                barrier.before,
                state
            );
            return Err(DeviceStatus::InvalidCall);
        }
        *state = barrier.after;
        Ok(())
    }

    fn expect_texture_state(
        &self,
        texture: TextureId,
        expected: ResourceState,
        usage: &str,
    ) -> DeviceResult<()> {
        let actual = self
            .texture_state(texture)
            .ok_or(DeviceStatus::InvalidArgument)?;
        if actual != expected {
            log::error!(
                "HeadlessBackend: {usage} uses {texture:?} in {actual:?}, expected {expected:?}"
            );
            return Err(DeviceStatus::InvalidCall);
        }
        Ok(())
    }

    fn expect_buffer_state(&self, buffer: BufferId, expected: ResourceState) -> DeviceResult<()> {
        let actual = self
            .buffers
            .get(&buffer)
            .map(|r| r.state)
            .ok_or(DeviceStatus::InvalidArgument)?;
        if actual != expected {
            log::error!(
                "HeadlessBackend: {buffer:?} is in {actual:?}, expected {expected:?}"
            );
            return Err(DeviceStatus::InvalidCall);
        }
        Ok(())
    }

    fn validate_draw(&self, bound: &BoundState) -> DeviceResult<()> {
        let pipeline = bound
            .pipeline
            .and_then(|id| self.pipelines.get(&id))
            .ok_or(DeviceStatus::InvalidCall)?;

        if pipeline.color_formats.len() != bound.color.len()
            || pipeline.depth_format.is_some() != bound.depth.is_some()
        {
            log::error!("HeadlessBackend: draw with pipeline targets not matching bound targets");
            return Err(DeviceStatus::InvalidCall);
        }

        for &target in &bound.color {
            self.expect_texture_state(target, ResourceState::RenderTarget, "draw")?;
            self.expect_sample_count(target, pipeline.sample_count)?;
        }
        if let Some(depth) = bound.depth {
            self.expect_texture_state(depth, ResourceState::DepthWrite, "draw")?;
            self.expect_sample_count(depth, pipeline.sample_count)?;
        }
        Ok(())
    }

    fn expect_sample_count(&self, texture: TextureId, sample_count: u32) -> DeviceResult<()> {
        let record = self
            .textures
            .get(&texture)
            .ok_or(DeviceStatus::InvalidArgument)?;
        if record.desc.sample_count != sample_count {
            log::error!(
                "HeadlessBackend: {texture:?} has {} samples, pipeline expects {sample_count}",
                record.desc.sample_count
            );
            return Err(DeviceStatus::InvalidCall);
        }
        Ok(())
    }

    fn execute(&mut self, commands: &[Command]) -> DeviceResult<()> {
        let mut bound = BoundState::default();

        for command in commands {
            match command {
                Command::Barriers(barriers) => {
                    for barrier in barriers {
                        self.apply_barrier(barrier)?;
                    }
                }
                Command::ClearRenderTarget { target, .. } => {
                    self.expect_texture_state(*target, ResourceState::RenderTarget, "clear")?;
                }
                Command::ClearDepthStencil { target, .. } => {
                    self.expect_texture_state(*target, ResourceState::DepthWrite, "clear")?;
                }
                Command::SetRenderTargets { color, depth } => {
                    bound.color = color.clone();
                    bound.depth = *depth;
                }
                Command::SetPipeline(pipeline) => {
                    if !self.pipelines.contains_key(pipeline) {
                        return Err(DeviceStatus::InvalidArgument);
                    }
                    bound.pipeline = Some(*pipeline);
                }
                Command::SetShadowMap(texture) => {
                    self.expect_texture_state(
                        *texture,
                        ResourceState::ShaderResource,
                        "shadow map binding",
                    )?;
                }
                Command::DrawIndexed { .. } => self.validate_draw(&bound)?,
                Command::Resolve {
                    source,
                    destination,
                    ..
                } => {
                    self.expect_texture_state(*source, ResourceState::ResolveSource, "resolve")?;
                    self.expect_texture_state(*destination, ResourceState::ResolveDest, "resolve")?;
                }
                Command::CopyBufferToTexture {
                    source,
                    destination,
                } => {
                    if !self.buffers.contains_key(source) {
                        return Err(DeviceStatus::InvalidArgument);
                    }
                    self.expect_texture_state(*destination, ResourceState::CopyDest, "copy")?;
                }
                Command::BuildAccelerationStructure {
                    scratch, result, ..
                } => {
                    self.expect_buffer_state(*scratch, ResourceState::UnorderedAccess)?;
                    self.expect_buffer_state(*result, ResourceState::AccelerationStructure)?;
                }
                Command::UavBarrier(_)
                | Command::SetViewport(_)
                | Command::SetScissor(_)
                | Command::SetPassConstants { .. }
                | Command::SetObjectConstants { .. }
                | Command::SetMaterialTable { .. }
                | Command::SetTextureTable { .. }
                | Command::SetVertexBuffer { .. }
                | Command::SetIndexBuffer { .. }
                | Command::SetTopology(_) => {}
            }
        }

        self.events.push(BackendEvent::Executed {
            commands: commands.to_vec(),
        });
        Ok(())
    }
}

/// Headless device that records instead of rendering.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    state: Mutex<HeadlessState>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent device call fail as if the GPU was removed.
    pub fn simulate_device_removed(&self) {
        log::warn!("HeadlessBackend: simulating device removal");
        self.state.lock().lost = Some(DeviceStatus::DeviceRemoved);
    }

    /// Override the reported quality levels for multisampled formats.
    pub fn set_msaa_quality_levels(&self, levels: u32) {
        self.state.lock().msaa_quality_levels = levels;
    }

    /// Let the GPU catch up with every pending signal without a CPU wait.
    pub fn complete_pending(&self) {
        let mut state = self.state.lock();
        if let Some(&last) = state.pending.back() {
            state.completed = last;
        }
        state.pending.clear();
    }

    pub fn events(&self) -> Vec<BackendEvent> {
        self.state.lock().events.clone()
    }

    /// Drain the event log.
    pub fn take_events(&self) -> Vec<BackendEvent> {
        std::mem::take(&mut self.state.lock().events)
    }

    /// Every command executed so far, flattened in submission order.
    pub fn executed_commands(&self) -> Vec<Command> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                BackendEvent::Executed { commands } => Some(commands.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Fence values the CPU blocked on.
    pub fn waits(&self) -> Vec<u64> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                BackendEvent::Waited(value) => Some(*value),
                _ => None,
            })
            .collect()
    }

    pub fn pipelines_created(&self) -> usize {
        self.state.lock().pipelines.len()
    }

    pub fn signaled_value(&self) -> u64 {
        self.state.lock().signaled
    }

    pub fn live_textures(&self) -> usize {
        self.state.lock().textures.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.state.lock().buffers.len()
    }

    pub fn texture_desc(&self, texture: TextureId) -> Option<TextureDesc> {
        self.state.lock().textures.get(&texture).map(|r| r.desc.clone())
    }

    /// State of a texture as seen by the emulated GPU.
    pub fn texture_state(&self, texture: TextureId) -> Option<ResourceState> {
        self.state.lock().texture_state(texture)
    }

    pub fn buffer_contents(&self, buffer: BufferId) -> Option<Vec<u8>> {
        self.state.lock().buffers.get(&buffer).map(|r| r.data.clone())
    }

    pub fn back_buffers(&self) -> Vec<TextureId> {
        self.state
            .lock()
            .swapchain
            .as_ref()
            .map(|s| s.buffers.clone())
            .unwrap_or_default()
    }

    /// Index of the back buffer the next present will show.
    pub fn current_back_buffer(&self) -> Option<usize> {
        self.state.lock().swapchain.as_ref().map(|s| s.current)
    }
}

fn align_to(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

impl GpuBackend for HeadlessBackend {
    fn name(&self) -> &'static str {
        "Headless Backend"
    }

    fn create_buffer(&self, desc: &BufferDesc) -> DeviceResult<BufferId> {
        let mut state = self.state.lock();
        state.alive()?;
        if desc.size == 0 {
            return Err(DeviceStatus::InvalidArgument);
        }
        log::trace!(
            "HeadlessBackend: creating buffer {:?} (size: {})",
            desc.label,
            desc.size
        );

        let buffer = BufferId(state.allocate_id());
        let address = state.next_address;
        state.next_address += align_to(desc.size, PLACEMENT_ALIGNMENT);
        state.buffers.insert(
            buffer,
            BufferRecord {
                desc: desc.clone(),
                state: desc.initial_state,
                data: vec![0; desc.size as usize],
                address,
            },
        );
        state.events.push(BackendEvent::BufferCreated {
            buffer,
            label: desc.label.clone(),
        });
        Ok(buffer)
    }

    fn create_texture(&self, desc: &TextureDesc) -> DeviceResult<TextureId> {
        let mut state = self.state.lock();
        state.alive()?;
        if desc.width == 0 || desc.height == 0 || desc.sample_count == 0 {
            return Err(DeviceStatus::InvalidArgument);
        }
        if desc.sample_count > 1 && desc.sample_quality >= state.msaa_quality_levels {
            return Err(DeviceStatus::InvalidArgument);
        }
        log::trace!(
            "HeadlessBackend: creating texture {:?} ({}x{}, {} samples)",
            desc.label,
            desc.width,
            desc.height,
            desc.sample_count
        );
        Ok(state.insert_texture(desc))
    }

    fn destroy_buffer(&self, buffer: BufferId) {
        let mut state = self.state.lock();
        if state.buffers.remove(&buffer).is_none() {
            log::warn!("HeadlessBackend: destroying unknown buffer {buffer:?}");
            return;
        }
        let (completed, signaled) = (state.completed, state.signaled);
        state.events.push(BackendEvent::BufferDestroyed {
            buffer,
            completed,
            signaled,
        });
    }

    fn destroy_texture(&self, texture: TextureId) {
        let mut state = self.state.lock();
        let Some(record) = state.textures.remove(&texture) else {
            log::warn!("HeadlessBackend: destroying unknown texture {texture:?}");
            return;
        };
        let (completed, signaled) = (state.completed, state.signaled);
        state.events.push(BackendEvent::TextureDestroyed {
            texture,
            label: record.desc.label,
            completed,
            signaled,
        });
    }

    fn write_buffer(&self, buffer: BufferId, offset: u64, data: &[u8]) -> DeviceResult<()> {
        let mut state = self.state.lock();
        state.alive()?;
        let record = state
            .buffers
            .get_mut(&buffer)
            .ok_or(DeviceStatus::InvalidArgument)?;
        if !record.desc.usage.contains(BufferUsage::UPLOAD) {
            return Err(DeviceStatus::InvalidCall);
        }
        let start = offset as usize;
        let end = start + data.len();
        if end > record.data.len() {
            return Err(DeviceStatus::InvalidArgument);
        }
        record.data[start..end].copy_from_slice(data);
        Ok(())
    }

    fn buffer_address(&self, buffer: BufferId) -> DeviceResult<u64> {
        let state = self.state.lock();
        state.alive()?;
        state
            .buffers
            .get(&buffer)
            .map(|r| r.address)
            .ok_or(DeviceStatus::InvalidArgument)
    }

    fn msaa_quality_levels(&self, _format: TextureFormat, sample_count: u32) -> DeviceResult<u32> {
        let state = self.state.lock();
        state.alive()?;
        Ok(match sample_count {
            1 => 1,
            2 | 4 | 8 => state.msaa_quality_levels,
            _ => 0,
        })
    }

    fn create_render_pipeline(&self, desc: &RenderPipelineDesc) -> DeviceResult<PipelineId> {
        let mut state = self.state.lock();
        state.alive()?;
        if desc.vertex.spirv.is_empty() || desc.fragment.spirv.is_empty() {
            return Err(DeviceStatus::InvalidArgument);
        }
        if desc.sample.count > 1 && desc.sample.quality >= state.msaa_quality_levels {
            return Err(DeviceStatus::InvalidArgument);
        }
        log::trace!("HeadlessBackend: creating pipeline {:?}", desc.label);

        let pipeline = PipelineId(state.allocate_id());
        state.pipelines.insert(
            pipeline,
            PipelineRecord {
                sample_count: desc.sample.count,
                color_formats: desc.color_formats.clone(),
                depth_format: desc.depth_format,
            },
        );
        state.events.push(BackendEvent::PipelineCreated {
            pipeline,
            label: desc.label.clone(),
        });
        Ok(pipeline)
    }

    fn accel_prebuild_info(&self, inputs: &AccelBuildInputs) -> DeviceResult<AccelPrebuildInfo> {
        let state = self.state.lock();
        state.alive()?;
        let (result, scratch) = match inputs {
            AccelBuildInputs::BottomLevel { geometries } => {
                if geometries.is_empty() {
                    return Err(DeviceStatus::InvalidArgument);
                }
                let triangles: u64 = geometries.iter().map(|g| g.index_count as u64 / 3).sum();
                let vertices: u64 = geometries.iter().map(|g| g.vertex_count as u64).sum();
                let result = triangles * 64 + vertices * 16;
                (result, result / 2)
            }
            AccelBuildInputs::TopLevel { instance_count, .. } => {
                let count = *instance_count as u64;
                (count * 128, count * 64)
            }
        };
        Ok(AccelPrebuildInfo {
            result_size: align_to(result.max(1), PLACEMENT_ALIGNMENT),
            scratch_size: align_to(scratch.max(1), PLACEMENT_ALIGNMENT),
        })
    }

    fn execute(&self, commands: &[Command]) -> DeviceResult<()> {
        let mut state = self.state.lock();
        state.alive()?;
        log::trace!("HeadlessBackend: executing {} commands", commands.len());
        state.execute(commands)
    }

    fn signal(&self, value: u64) -> DeviceResult<()> {
        let mut state = self.state.lock();
        state.alive()?;
        if value <= state.signaled {
            return Err(DeviceStatus::InvalidArgument);
        }
        state.signaled = value;
        state.pending.push_back(value);
        state.events.push(BackendEvent::Signaled(value));
        Ok(())
    }

    fn completed_value(&self) -> u64 {
        self.state.lock().completed
    }

    fn wait_for_value(&self, value: u64) -> DeviceResult<()> {
        let mut state = self.state.lock();
        state.alive()?;
        state.events.push(BackendEvent::Waited(value));
        while let Some(&front) = state.pending.front() {
            if front > value {
                break;
            }
            state.completed = front;
            state.pending.pop_front();
        }
        if state.completed < value {
            log::error!("HeadlessBackend: waiting for fence value {value} that was never signaled");
            return Err(DeviceStatus::DeviceHung);
        }
        Ok(())
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> DeviceResult<Vec<TextureId>> {
        let mut state = self.state.lock();
        state.alive()?;
        if state.swapchain.is_some() || desc.buffer_count < 2 {
            return Err(DeviceStatus::InvalidCall);
        }
        let buffers = state.create_back_buffers(desc);
        state.swapchain = Some(SwapchainState {
            desc: desc.clone(),
            buffers: buffers.clone(),
            current: 0,
        });
        Ok(buffers)
    }

    fn resize_swapchain(&self, width: u32, height: u32) -> DeviceResult<Vec<TextureId>> {
        let mut state = self.state.lock();
        state.alive()?;
        let Some(swapchain) = state.swapchain.take() else {
            return Err(DeviceStatus::InvalidCall);
        };
        if swapchain
            .buffers
            .iter()
            .any(|buffer| state.textures.contains_key(buffer))
        {
            log::error!("HeadlessBackend: swapchain resized while back buffers are still referenced");
            state.swapchain = Some(swapchain);
            return Err(DeviceStatus::InvalidCall);
        }

        let desc = SwapchainDesc {
            width,
            height,
            ..swapchain.desc
        };
        let buffers = state.create_back_buffers(&desc);
        state.swapchain = Some(SwapchainState {
            desc,
            buffers: buffers.clone(),
            current: 0,
        });
        state.events.push(BackendEvent::SwapchainResized { width, height });
        Ok(buffers)
    }

    fn present(&self) -> DeviceResult<()> {
        let mut state = self.state.lock();
        state.alive()?;
        let (back_buffer, count) = match &state.swapchain {
            Some(swapchain) => (swapchain.buffers[swapchain.current], swapchain.buffers.len()),
            None => return Err(DeviceStatus::InvalidCall),
        };
        state.expect_texture_state(back_buffer, ResourceState::Present, "present")?;
        if let Some(swapchain) = state.swapchain.as_mut() {
            swapchain.current = (swapchain.current + 1) % count;
        }
        state.events.push(BackendEvent::Presented { back_buffer });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn swapchain_desc() -> SwapchainDesc {
        SwapchainDesc {
            width: 64,
            height: 32,
            buffer_count: 2,
            format: TextureFormat::Rgba8Unorm,
        }
    }

    #[test]
    fn test_signal_completes_on_wait() {
        let backend = HeadlessBackend::new();
        backend.signal(1).unwrap();
        backend.signal(2).unwrap();
        assert_eq!(backend.completed_value(), 0);

        backend.wait_for_value(1).unwrap();
        assert_eq!(backend.completed_value(), 1);
        backend.wait_for_value(2).unwrap();
        assert_eq!(backend.completed_value(), 2);
    }

    #[test]
    fn test_wait_for_unsignaled_value_hangs() {
        let backend = HeadlessBackend::new();
        assert_eq!(backend.wait_for_value(1), Err(DeviceStatus::DeviceHung));
    }

    #[test]
    fn test_signal_must_increase() {
        let backend = HeadlessBackend::new();
        backend.signal(3).unwrap();
        assert_eq!(backend.signal(3), Err(DeviceStatus::InvalidArgument));
    }

    #[test]
    fn test_barrier_validation() {
        let backend = HeadlessBackend::new();
        let texture = backend
            .create_texture(
                &TextureDesc::new_2d("shadow", 16, 16, TextureFormat::R24G8Typeless)
                    .with_initial_state(ResourceState::ShaderResource),
            )
            .unwrap();

        let wrong = Barrier {
            resource: texture.into(),
            before: ResourceState::DepthWrite,
            after: ResourceState::ShaderResource,
        };
        assert_eq!(
            backend.execute(&[Command::Barriers(vec![wrong])]),
            Err(DeviceStatus::InvalidCall)
        );

        let right = Barrier {
            resource: texture.into(),
            before: ResourceState::ShaderResource,
            after: ResourceState::DepthWrite,
        };
        backend.execute(&[Command::Barriers(vec![right])]).unwrap();
        assert_eq!(backend.texture_state(texture), Some(ResourceState::DepthWrite));
    }

    #[test]
    fn test_present_rotates_back_buffers() {
        let backend = HeadlessBackend::new();
        let buffers = backend.create_swapchain(&swapchain_desc()).unwrap();
        backend.present().unwrap();
        backend.present().unwrap();

        let presented: Vec<TextureId> = backend
            .events()
            .into_iter()
            .filter_map(|e| match e {
                BackendEvent::Presented { back_buffer } => Some(back_buffer),
                _ => None,
            })
            .collect();
        assert_eq!(presented, buffers);
        assert_eq!(backend.current_back_buffer(), Some(0));
    }

    #[test]
    fn test_resize_requires_released_back_buffers() {
        let backend = HeadlessBackend::new();
        let buffers = backend.create_swapchain(&swapchain_desc()).unwrap();
        assert_eq!(backend.resize_swapchain(128, 64), Err(DeviceStatus::InvalidCall));

        for buffer in buffers {
            backend.destroy_texture(buffer);
        }
        let resized = backend.resize_swapchain(128, 64).unwrap();
        assert_eq!(resized.len(), 2);
        assert_eq!(backend.texture_desc(resized[0]).unwrap().width, 128);
    }

    #[test]
    fn test_write_buffer_bounds() {
        let backend = HeadlessBackend::new();
        let buffer = backend
            .create_buffer(&BufferDesc::new("upload", 8, BufferUsage::UPLOAD))
            .unwrap();
        backend.write_buffer(buffer, 4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(
            backend.write_buffer(buffer, 6, &[1, 2, 3]),
            Err(DeviceStatus::InvalidArgument)
        );
        assert_eq!(
            backend.buffer_contents(buffer).unwrap(),
            vec![0, 0, 0, 0, 1, 2, 3, 4]
        );
    }

    #[test]
    fn test_device_removed_fails_every_call() {
        let backend = HeadlessBackend::new();
        backend.simulate_device_removed();
        assert_eq!(backend.signal(1), Err(DeviceStatus::DeviceRemoved));
        assert_eq!(backend.execute(&[]), Err(DeviceStatus::DeviceRemoved));
        assert_eq!(
            backend.wait_for_value(1),
            Err(DeviceStatus::DeviceRemoved)
        );
    }
}
