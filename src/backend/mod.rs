//! GPU device abstraction.
//!
//! [`GpuBackend`] is the seam between the frame core and a graphics API. Every
//! fallible method reports a raw [`DeviceStatus`]; callers wrap each call in
//! [`device_call!`](crate::device_call) so that failures carry the call text
//! and source location.
//!
//! The backend owns a single direct queue with one fence. Command lists passed
//! to [`execute`](GpuBackend::execute) run in submission order, and
//! [`signal`](GpuBackend::signal) values complete in the order they were
//! enqueued.

pub mod headless;

pub use headless::{BackendEvent, HeadlessBackend};

use crate::command::Command;
use crate::error::DeviceStatus;
use crate::pipeline::RenderPipelineDesc;
use crate::types::{BufferDesc, BufferId, IndexFormat, PipelineId, TextureDesc, TextureFormat, TextureId};

/// Result of a raw device call.
pub type DeviceResult<T> = Result<T, DeviceStatus>;

#[derive(Debug, Clone, PartialEq)]
pub struct SwapchainDesc {
    pub width: u32,
    pub height: u32,
    pub buffer_count: u32,
    pub format: TextureFormat,
}

/// Triangle geometry referenced by a bottom-level acceleration structure.
#[derive(Debug, Clone, PartialEq)]
pub struct AccelGeometry {
    pub vertex_buffer: BufferId,
    pub vertex_count: u32,
    pub vertex_stride: u64,
    pub index_buffer: BufferId,
    pub index_count: u32,
    pub index_format: IndexFormat,
    pub opaque: bool,
}

/// Inputs for sizing and building an acceleration structure.
#[derive(Debug, Clone, PartialEq)]
pub enum AccelBuildInputs {
    BottomLevel { geometries: Vec<AccelGeometry> },
    TopLevel { instances: BufferId, instance_count: u32 },
}

/// Memory required to build an acceleration structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccelPrebuildInfo {
    pub result_size: u64,
    pub scratch_size: u64,
}

/// Device, direct queue and swapchain of a graphics API.
pub trait GpuBackend: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    // === Resources ===

    fn create_buffer(&self, desc: &BufferDesc) -> DeviceResult<BufferId>;
    fn create_texture(&self, desc: &TextureDesc) -> DeviceResult<TextureId>;
    fn destroy_buffer(&self, buffer: BufferId);
    fn destroy_texture(&self, texture: TextureId);

    /// Write CPU data into an upload buffer.
    fn write_buffer(&self, buffer: BufferId, offset: u64, data: &[u8]) -> DeviceResult<()>;

    /// GPU virtual address of a buffer.
    fn buffer_address(&self, buffer: BufferId) -> DeviceResult<u64>;

    // === Queries and pipelines ===

    /// Number of quality levels supported for `sample_count` samples of
    /// `format`. Zero means the combination is unsupported.
    fn msaa_quality_levels(&self, format: TextureFormat, sample_count: u32) -> DeviceResult<u32>;

    fn create_render_pipeline(&self, desc: &RenderPipelineDesc) -> DeviceResult<PipelineId>;

    fn accel_prebuild_info(&self, inputs: &AccelBuildInputs) -> DeviceResult<AccelPrebuildInfo>;

    // === Submission and synchronization ===

    /// Queue a closed command list for execution.
    fn execute(&self, commands: &[Command]) -> DeviceResult<()>;

    /// Enqueue a fence signal behind all previously executed work.
    fn signal(&self, value: u64) -> DeviceResult<()>;

    /// Highest fence value the GPU has reached.
    fn completed_value(&self) -> u64;

    /// Block the calling thread until the fence reaches `value`.
    fn wait_for_value(&self, value: u64) -> DeviceResult<()>;

    // === Swapchain ===

    /// Create the swapchain, returning its back buffers in the present state.
    fn create_swapchain(&self, desc: &SwapchainDesc) -> DeviceResult<Vec<TextureId>>;

    /// Resize the swapchain. Every previous back buffer must have been
    /// destroyed first.
    fn resize_swapchain(&self, width: u32, height: u32) -> DeviceResult<Vec<TextureId>>;

    /// Present the current back buffer and advance to the next one.
    fn present(&self) -> DeviceResult<()>;
}
