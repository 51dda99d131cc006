//! # Lumen Frame
//!
//! Frame submission and resource synchronization core for a multi-pass
//! renderer.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`FrameRenderer`] - Records shadow, main and environment passes, resolves
//!   and presents, with at most one frame of GPU work outstanding
//! - [`ResourceStateTracker`] - Current state of every GPU-visible resource and
//!   the barriers that move it
//! - [`PipelineCache`] - Pipeline variants keyed by pass, material
//!   capabilities and quality toggles, built on first use
//! - [`GpuBackend`] - Device seam, with a [`HeadlessBackend`] that validates
//!   resource states like a debug layer
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use lumen_frame::{FrameRenderer, HeadlessBackend, RendererConfig};
//!
//! let backend = Arc::new(HeadlessBackend::new());
//! let mut renderer = FrameRenderer::new(backend, RendererConfig::default())?;
//! renderer.import(&model)?;
//! let report = renderer.render_frame()?;
//! ```

pub mod accel;
pub mod backend;
pub mod command;
pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod events;
pub mod frame;
pub mod pipeline;
pub mod scene;
pub mod shader;
pub mod state_tracker;
pub mod sync;
pub mod types;

// Re-export main types for convenience
pub use accel::{AccelInstance, AccelerationStructure, AccelerationStructureBuilder, InstanceDesc};
pub use backend::{BackendEvent, GpuBackend, HeadlessBackend};
pub use command::{Command, CommandContext, ContextState};
pub use config::RendererConfig;
pub use constants::{MaterialConstants, ObjectConstants, PassConstants};
pub use context::GpuContext;
pub use error::{report_fatal, DeviceStatus, GraphicsError, GraphicsResult};
pub use events::{EventRouter, EventSink, PlatformEvent};
pub use frame::{DrawRecord, FrameRenderer, FrameReport, FrameTargets, PassReport};
pub use pipeline::{MaterialCaps, PassKind, PipelineCache, QualityToggles, VariantKey};
pub use scene::{MaterialData, MaterialTextures, MeshData, ModelImport, RenderLayer, Scene, TextureData};
pub use shader::{ShaderComposer, ShaderStage};
pub use state_tracker::{Barrier, ResourceState, ResourceStateTracker};
pub use sync::Fence;
pub use types::{BufferId, PipelineId, ResourceId, TextureFormat, TextureId, Vertex};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the library version.
///
/// Call once after the logger is installed.
pub fn init() {
    log::info!("Lumen Frame v{} initialized", VERSION);
}
