//! Render pass orchestrator.
//!
//! [`FrameRenderer`] owns the GPU context, the pipeline cache, the scene and
//! the frame targets, and records one frame as a fixed sequence of passes:
//!
//! ```text
//! Shadow:      shadow map  ShaderResource -> DepthWrite -> ShaderResource
//! Main:        color       Present/ResolveSource -> RenderTarget
//! Environment: sky drawn into the main targets
//! Resolve:     MSAA on   msaa target -> ResolveSource, back buffer -> ResolveDest -> Present
//!              MSAA off  back buffer RenderTarget -> Present
//! ```
//!
//! Every resource ends the frame in the state it started in. The frame is
//! submitted, presented and flushed before `render_frame` returns, so at most
//! one frame of GPU work is ever outstanding.

use std::sync::Arc;

use glam::{Vec3, Vec4};

use crate::accel::{AccelInstance, AccelerationStructureBuilder};
use crate::backend::{GpuBackend, SwapchainDesc};
use crate::config::RendererConfig;
use crate::constants::{
    MaterialConstants, ObjectConstants, PassConstants, UploadRegion, MAIN_PASS_SLOT,
    PASS_SLOT_COUNT, SHADOW_PASS_SLOT,
};
use crate::context::GpuContext;
use crate::device_call;
use crate::error::{GraphicsError, GraphicsResult};
use crate::pipeline::{MsaaSettings, PassKind, PipelineCache, QualityToggles, TargetFormats, VariantKey};
use crate::scene::{
    generate_sphere, ImportSummary, MaterialData, ModelImport, RenderLayer, Scene, SceneLimits,
};
use crate::shader::ShaderComposer;
use crate::state_tracker::{ResourceState, ResourceStateTracker};
use crate::sync::Fence;
use crate::types::{
    PipelineId, ResourceId, ScissorRect, TextureDesc, TextureFormat, TextureId, TextureUsage,
    Viewport,
};

/// Format the shadow map is created with, so it can be viewed as depth and
/// sampled.
pub const SHADOW_MAP_FORMAT: TextureFormat = TextureFormat::R24G8Typeless;
/// Format shadow pipelines write depth in.
pub const SHADOW_DEPTH_FORMAT: TextureFormat = TextureFormat::Depth24UnormStencil8;

const SKY_SEGMENTS: u32 = 20;
const SKY_RINGS: u32 = 20;

/// Render targets owned by the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameTargets {
    pub back_buffers: Vec<TextureId>,
    pub depth: TextureId,
    /// Multisampled color target; present only while MSAA is enabled.
    pub msaa: Option<TextureId>,
    pub shadow: TextureId,
}

/// One draw recorded during a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawRecord {
    /// Index of the render item.
    pub item: usize,
    pub pipeline: PipelineId,
    pub key: VariantKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub pass: PassKind,
    /// Variants built during this pass.
    pub misses: Vec<VariantKey>,
    pub draws: Vec<DrawRecord>,
}

impl PassReport {
    fn new(pass: PassKind) -> Self {
        Self {
            pass,
            misses: Vec::new(),
            draws: Vec::new(),
        }
    }
}

/// What a call to [`FrameRenderer::render_frame`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameReport {
    pub frame_index: u64,
    /// Back buffer the frame was presented from.
    pub back_buffer: TextureId,
    /// Shadow, main and environment pass, in recording order.
    pub passes: Vec<PassReport>,
    /// Whether the frame went through a multisample resolve.
    pub resolved: bool,
    /// Fence value signaled behind the frame's commands.
    pub fence_value: u64,
}

impl FrameReport {
    pub fn pass(&self, kind: PassKind) -> Option<&PassReport> {
        self.passes.iter().find(|p| p.pass == kind)
    }

    /// Pipeline variants built during the frame.
    pub fn cache_misses(&self) -> usize {
        self.passes.iter().map(|p| p.misses.len()).sum()
    }

    pub fn draw_count(&self) -> usize {
        self.passes.iter().map(|p| p.draws.len()).sum()
    }
}

pub struct FrameRenderer {
    config: RendererConfig,
    gpu: GpuContext,
    pipelines: PipelineCache,
    shaders: ShaderComposer,
    scene: Scene,
    targets: FrameTargets,
    objects: UploadRegion<ObjectConstants>,
    passes: UploadRegion<PassConstants>,
    materials: UploadRegion<MaterialConstants>,
    main_pass: PassConstants,
    shadow_pass: PassConstants,
    accel: AccelerationStructureBuilder,
    accel_dirty: bool,
    toggles: QualityToggles,
    width: u32,
    height: u32,
    viewport: Viewport,
    scissor: ScissorRect,
    back_buffer_index: usize,
    frame_index: u64,
    shut_down: bool,
}

impl FrameRenderer {
    /// Create the swapchain, frame targets, constant regions and the sky.
    pub fn new(backend: Arc<dyn GpuBackend>, config: RendererConfig) -> GraphicsResult<Self> {
        config.validate()?;
        log::info!(
            "creating frame renderer {}x{} on {}",
            config.width,
            config.height,
            backend.name()
        );

        let mut shaders = ShaderComposer::with_builtin();
        if let Some(dir) = &config.shader_dir {
            let loaded = shaders.load_overrides(dir)?;
            log::info!("loaded {loaded} shader overrides from {}", dir.display());
        }

        let quality_levels = device_call!(
            backend.msaa_quality_levels(config.back_buffer_format, config.msaa_sample_count)
        )?;
        if quality_levels == 0 {
            return Err(GraphicsError::InvalidConfig(format!(
                "{}x MSAA is not supported for {:?}",
                config.msaa_sample_count, config.back_buffer_format
            )));
        }
        let msaa = MsaaSettings {
            sample_count: config.msaa_sample_count,
            quality_levels,
        };
        log::debug!("{}x MSAA with {quality_levels} quality levels", msaa.sample_count);

        let pipelines = PipelineCache::new(
            TargetFormats {
                color: config.back_buffer_format,
                depth: config.depth_format,
                shadow: SHADOW_DEPTH_FORMAT,
            },
            msaa,
        );

        let objects = UploadRegion::constant(backend.as_ref(), "object constants", config.max_render_items)?;
        let passes = UploadRegion::constant(backend.as_ref(), "pass constants", PASS_SLOT_COUNT)?;
        let materials = UploadRegion::structured(backend.as_ref(), "material table", config.max_materials)?;

        let mut gpu = GpuContext::new(backend);
        let back_buffers = device_call!(gpu.backend().create_swapchain(&SwapchainDesc {
            width: config.width,
            height: config.height,
            buffer_count: config.back_buffer_count,
            format: config.back_buffer_format,
        }))?;
        for &back_buffer in &back_buffers {
            gpu.tracker_mut().register(back_buffer, ResourceState::Present);
        }

        let shadow = gpu.create_texture(
            &TextureDesc::new_2d(
                "shadow map",
                config.shadow_map_size,
                config.shadow_map_size,
                SHADOW_MAP_FORMAT,
            )
            .with_usage(TextureUsage::DEPTH_STENCIL | TextureUsage::SHADER_RESOURCE)
            .with_initial_state(ResourceState::ShaderResource),
        )?;

        let mut toggles = QualityToggles::empty();
        toggles.set(QualityToggles::WIREFRAME, config.wireframe);
        toggles.set(QualityToggles::MSAA, config.msaa);

        let (depth, msaa_target) = create_screen_targets(
            &mut gpu,
            &config,
            config.msaa.then_some(msaa),
            config.width,
            config.height,
        )?;

        let mut scene = Scene::new(SceneLimits {
            max_render_items: config.max_render_items,
            max_textures: config.max_textures,
            max_materials: config.max_materials,
        });
        let sky = generate_sphere("sky", 1.0, SKY_SEGMENTS, SKY_RINGS, 0);
        let sky = ModelImport::environment(sky.vertices, sky.indices, sky_material(), None);
        let (_, staging) = scene.import(&mut gpu, &sky)?;
        gpu.submit_and_flush()?;
        for buffer in staging {
            gpu.release_buffer(buffer)?;
        }

        let mut main_pass = PassConstants::default();
        main_pass.set_render_target_size(config.width, config.height);
        let mut shadow_pass = PassConstants::default();
        shadow_pass.set_render_target_size(config.shadow_map_size, config.shadow_map_size);

        let (width, height) = (config.width, config.height);
        Ok(Self {
            config,
            gpu,
            pipelines,
            shaders,
            scene,
            targets: FrameTargets {
                back_buffers,
                depth,
                msaa: msaa_target,
                shadow,
            },
            objects,
            passes,
            materials,
            main_pass,
            shadow_pass,
            accel: AccelerationStructureBuilder::new(),
            accel_dirty: false,
            toggles,
            width,
            height,
            viewport: Viewport::full(width, height),
            scissor: ScissorRect::full(width, height),
            back_buffer_index: 0,
            frame_index: 0,
            shut_down: false,
        })
    }

    fn ensure_running(&self) -> GraphicsResult<()> {
        if self.shut_down {
            return Err(GraphicsError::ShutDown);
        }
        Ok(())
    }

    // === Scene ===

    /// Upload a model and append its items, materials and textures.
    pub fn import(&mut self, model: &ModelImport) -> GraphicsResult<ImportSummary> {
        self.ensure_running()?;
        self.gpu.begin(None)?;
        let (summary, staging) = self.scene.import(&mut self.gpu, model)?;
        self.gpu.submit_and_flush()?;
        for buffer in staging {
            self.gpu.release_buffer(buffer)?;
        }
        if !summary.items.is_empty() {
            self.accel_dirty = true;
        }
        Ok(summary)
    }

    /// Set the world transform of every render item called `name`.
    pub fn set_transform(&mut self, name: &str, world: glam::Mat4) -> GraphicsResult<usize> {
        self.ensure_running()?;
        let updated = self.scene.set_transform(name, world)?;
        self.accel_dirty = true;
        Ok(updated)
    }

    /// Camera, lights and shadow transform of the main and environment
    /// passes. The render target size is filled in by the renderer.
    pub fn set_main_pass_constants(&mut self, constants: PassConstants) {
        self.main_pass = constants;
        self.main_pass.set_render_target_size(self.width, self.height);
    }

    /// Light-space camera of the shadow pass.
    pub fn set_shadow_pass_constants(&mut self, constants: PassConstants) {
        let size = self.config.shadow_map_size;
        self.shadow_pass = constants;
        self.shadow_pass.set_render_target_size(size, size);
    }

    // === Quality toggles ===

    pub fn set_wireframe(&mut self, enabled: bool) -> GraphicsResult<()> {
        self.ensure_running()?;
        if self.toggles.contains(QualityToggles::WIREFRAME) != enabled {
            log::info!("wireframe {}", if enabled { "on" } else { "off" });
            self.toggles.set(QualityToggles::WIREFRAME, enabled);
        }
        Ok(())
    }

    /// Switch multisampling. The depth buffer and MSAA target are recreated
    /// through the resize path so their sample counts match the pipelines.
    pub fn set_msaa(&mut self, enabled: bool) -> GraphicsResult<()> {
        self.ensure_running()?;
        if self.toggles.contains(QualityToggles::MSAA) == enabled {
            return Ok(());
        }
        log::info!("MSAA {}", if enabled { "on" } else { "off" });
        self.toggles.set(QualityToggles::MSAA, enabled);
        self.recreate_screen_targets(self.width, self.height)
    }

    pub fn toggles(&self) -> QualityToggles {
        self.toggles
    }

    // === Frame ===

    /// Record, submit and present one frame, then wait for it to finish.
    pub fn render_frame(&mut self) -> GraphicsResult<FrameReport> {
        self.ensure_running()?;
        self.gpu.begin(None)?;
        self.gpu.tracker_mut().clear_history();
        self.upload_constants()?;

        let back_buffer = self.current_back_buffer()?;
        let passes = vec![
            self.record_shadow_pass()?,
            self.record_main_pass(back_buffer)?,
            self.record_environment_pass()?,
        ];
        let resolved = self.record_resolve(back_buffer)?;

        let fence_value = self.gpu.submit()?;
        device_call!(self.gpu.backend().present())?;
        self.back_buffer_index = (self.back_buffer_index + 1) % self.targets.back_buffers.len();
        self.gpu.flush()?;

        let report = FrameReport {
            frame_index: self.frame_index,
            back_buffer,
            passes,
            resolved,
            fence_value,
        };
        log::trace!(
            "frame {} presented with {} draws and {} new variants",
            report.frame_index,
            report.draw_count(),
            report.cache_misses()
        );
        self.frame_index += 1;
        Ok(report)
    }

    fn current_back_buffer(&self) -> GraphicsResult<TextureId> {
        self.targets
            .back_buffers
            .get(self.back_buffer_index)
            .copied()
            .ok_or_else(|| {
                GraphicsError::InvalidConfig(format!(
                    "back buffer {} of {}",
                    self.back_buffer_index,
                    self.targets.back_buffers.len()
                ))
            })
    }

    fn upload_constants(&mut self) -> GraphicsResult<()> {
        let backend = self.gpu.backend();
        self.passes.write(backend, MAIN_PASS_SLOT, &self.main_pass)?;
        self.passes.write(backend, SHADOW_PASS_SLOT, &self.shadow_pass)?;

        for slot in self.scene.take_dirty_objects() {
            if let Some(item) = self.scene.item(slot as usize) {
                self.objects.write(backend, slot, &self.scene.object_constants(item))?;
            }
        }
        for index in self.scene.take_dirty_materials() {
            if let Some(material) = self.scene.materials().get(index) {
                self.materials.write(backend, index as u32, &material.constants())?;
            }
        }
        Ok(())
    }

    fn bind_tables(&mut self, pass_slot: u32) -> GraphicsResult<()> {
        let commands = self.gpu.commands_mut();
        commands.set_pass_constants(self.passes.buffer(), pass_slot, self.passes.offset(pass_slot))?;
        commands.set_material_table(self.materials.buffer())?;
        commands.set_texture_table(0, self.scene.textures().len() as u32)
    }

    /// Draw every item of `layer`, one variant per capability group.
    fn draw_layer(&mut self, pass: PassKind, layer: RenderLayer, report: &mut PassReport) -> GraphicsResult<()> {
        for (caps, items) in self.scene.groups(layer) {
            let key = VariantKey::new(pass, caps, self.toggles);
            let lookup = self.pipelines.get_or_build(key, self.gpu.backend(), &self.shaders)?;
            if lookup.built {
                report.misses.push(key);
            }

            let commands = self.gpu.commands_mut();
            commands.set_pipeline(lookup.pipeline)?;
            for index in items {
                let Some(item) = self.scene.item(index) else {
                    continue;
                };
                let mesh = self
                    .scene
                    .mesh(item.mesh)
                    .ok_or_else(|| GraphicsError::UnknownRenderItem(item.name.clone()))?;

                commands.set_object_constants(
                    self.objects.buffer(),
                    item.object_slot,
                    self.objects.offset(item.object_slot),
                )?;
                commands.set_vertex_buffer(mesh.vertex_buffer, mesh.vertex_stride)?;
                commands.set_index_buffer(mesh.index_buffer, mesh.index_format)?;
                commands.set_topology(item.topology)?;
                commands.draw_indexed(item.index_count, item.start_index, item.base_vertex)?;
                report.draws.push(DrawRecord {
                    item: index,
                    pipeline: lookup.pipeline,
                    key,
                });
            }
        }
        Ok(())
    }

    fn record_shadow_pass(&mut self) -> GraphicsResult<PassReport> {
        let shadow = self.targets.shadow;
        let size = self.config.shadow_map_size;
        let mut report = PassReport::new(PassKind::Shadow);

        self.gpu.transition(shadow, ResourceState::DepthWrite)?;
        let commands = self.gpu.commands_mut();
        commands.set_viewport(Viewport::full(size, size))?;
        commands.set_scissor(ScissorRect::full(size, size))?;
        commands.clear_depth_stencil(shadow, 1.0, 0)?;
        commands.set_render_targets(&[], Some(shadow))?;
        self.bind_tables(SHADOW_PASS_SLOT)?;

        self.draw_layer(PassKind::Shadow, RenderLayer::Opaque, &mut report)?;

        self.gpu.transition(shadow, ResourceState::ShaderResource)?;
        Ok(report)
    }

    fn record_main_pass(&mut self, back_buffer: TextureId) -> GraphicsResult<PassReport> {
        let color = self.targets.msaa.unwrap_or(back_buffer);
        let depth = self.targets.depth;
        let mut report = PassReport::new(PassKind::Main);

        self.gpu.transition(color, ResourceState::RenderTarget)?;
        self.gpu.ensure(depth, ResourceState::DepthWrite)?;
        let commands = self.gpu.commands_mut();
        commands.set_viewport(self.viewport)?;
        commands.set_scissor(self.scissor)?;
        commands.clear_render_target(color, self.config.clear_color)?;
        commands.clear_depth_stencil(depth, 1.0, 0)?;
        commands.set_render_targets(&[color], Some(depth))?;
        self.bind_tables(MAIN_PASS_SLOT)?;
        self.gpu.commands_mut().set_shadow_map(self.targets.shadow)?;

        self.draw_layer(PassKind::Main, RenderLayer::Opaque, &mut report)?;
        Ok(report)
    }

    fn record_environment_pass(&mut self) -> GraphicsResult<PassReport> {
        let mut report = PassReport::new(PassKind::Environment);
        self.draw_layer(PassKind::Environment, RenderLayer::Environment, &mut report)?;
        Ok(report)
    }

    /// Return the color targets to their resting states, resolving the MSAA
    /// target into the back buffer first when it is in use.
    fn record_resolve(&mut self, back_buffer: TextureId) -> GraphicsResult<bool> {
        match self.targets.msaa {
            Some(msaa) => {
                self.gpu.transition_many(&[
                    (ResourceId::from(msaa), ResourceState::ResolveSource),
                    (ResourceId::from(back_buffer), ResourceState::ResolveDest),
                ])?;
                self.gpu
                    .commands_mut()
                    .resolve(msaa, back_buffer, self.config.back_buffer_format)?;
                self.gpu.transition(back_buffer, ResourceState::Present)?;
                Ok(true)
            }
            None => {
                self.gpu.transition(back_buffer, ResourceState::Present)?;
                Ok(false)
            }
        }
    }

    // === Size-dependent targets ===

    /// Recreate the swapchain and the size-dependent targets.
    ///
    /// Zero-sized requests, as sent while a window is minimized, are
    /// ignored.
    pub fn resize(&mut self, width: u32, height: u32) -> GraphicsResult<()> {
        self.ensure_running()?;
        if width == 0 || height == 0 {
            log::warn!("ignoring resize to {width}x{height}");
            return Ok(());
        }
        log::info!("resizing from {}x{} to {width}x{height}", self.width, self.height);
        self.recreate_screen_targets(width, height)
    }

    fn recreate_screen_targets(&mut self, width: u32, height: u32) -> GraphicsResult<()> {
        self.gpu.flush()?;
        self.gpu.begin(None)?;

        for back_buffer in std::mem::take(&mut self.targets.back_buffers) {
            self.gpu.release_texture(back_buffer)?;
        }
        self.gpu.release_texture(self.targets.depth)?;
        if let Some(msaa) = self.targets.msaa.take() {
            self.gpu.release_texture(msaa)?;
        }

        let back_buffers = device_call!(self.gpu.backend().resize_swapchain(width, height))?;
        for &back_buffer in &back_buffers {
            self.gpu.tracker_mut().register(back_buffer, ResourceState::Present);
        }
        let msaa = self
            .toggles
            .contains(QualityToggles::MSAA)
            .then(|| self.pipelines.msaa());
        let (depth, msaa_target) = create_screen_targets(&mut self.gpu, &self.config, msaa, width, height)?;
        self.gpu.submit_and_flush()?;

        self.targets.back_buffers = back_buffers;
        self.targets.depth = depth;
        self.targets.msaa = msaa_target;
        self.back_buffer_index = 0;
        self.width = width;
        self.height = height;
        self.viewport = Viewport::full(width, height);
        self.scissor = ScissorRect::full(width, height);
        self.main_pass.set_render_target_size(width, height);
        Ok(())
    }

    // === Acceleration structures ===

    /// Build bottom levels for every opaque mesh and the top level over all
    /// opaque items, and wait for the builds.
    pub fn build_acceleration_structures(&mut self) -> GraphicsResult<u64> {
        self.ensure_running()?;
        let value = self.accel.build_scene(&mut self.gpu, &self.scene)?;
        self.accel_dirty = false;
        Ok(value)
    }

    /// Rebuild the top level if transforms or items changed since the last
    /// build. Returns `None` when nothing was rebuilt.
    pub fn refresh_acceleration_structures(&mut self) -> GraphicsResult<Option<u64>> {
        self.ensure_running()?;
        if !self.accel_dirty || self.accel.top().is_none() {
            return Ok(None);
        }
        let instances = AccelInstance::from_scene(&self.scene);
        let value = if instances.iter().all(|i| self.accel.bottom(i.mesh).is_some()) {
            self.accel.rebuild(&mut self.gpu, &instances)?
        } else {
            self.accel.build_scene(&mut self.gpu, &self.scene)?
        };
        self.accel_dirty = false;
        Ok(Some(value))
    }

    pub fn acceleration_structures(&self) -> &AccelerationStructureBuilder {
        &self.accel
    }

    // === Shutdown ===

    /// Wait for the GPU and release every resource. Safe to call more than
    /// once; later calls do nothing.
    pub fn shutdown(&mut self) -> GraphicsResult<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;
        log::info!("shutting down frame renderer after {} frames", self.frame_index);

        self.gpu.flush()?;
        self.accel.release(&mut self.gpu)?;

        let (buffers, textures) = self.scene.take_gpu_resources();
        for buffer in buffers {
            self.gpu.release_buffer(buffer)?;
        }
        for texture in textures {
            self.gpu.release_texture(texture)?;
        }

        for back_buffer in std::mem::take(&mut self.targets.back_buffers) {
            self.gpu.release_texture(back_buffer)?;
        }
        if let Some(msaa) = self.targets.msaa.take() {
            self.gpu.release_texture(msaa)?;
        }
        self.gpu.release_texture(self.targets.depth)?;
        self.gpu.release_texture(self.targets.shadow)?;

        let backend = self.gpu.backend();
        self.objects.destroy(backend);
        self.passes.destroy(backend);
        self.materials.destroy(backend);
        Ok(())
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    // === Accessors ===

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn pipeline_cache(&self) -> &PipelineCache {
        &self.pipelines
    }

    pub fn tracker(&self) -> &ResourceStateTracker {
        self.gpu.tracker()
    }

    pub fn fence(&self) -> &Fence {
        self.gpu.fence()
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    pub fn backend(&self) -> &dyn GpuBackend {
        self.gpu.backend()
    }

    pub fn targets(&self) -> &FrameTargets {
        &self.targets
    }

    pub fn back_buffer_index(&self) -> usize {
        self.back_buffer_index
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }
}

impl Drop for FrameRenderer {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log::error!("frame renderer shutdown failed: {err}");
        }
    }
}

fn sky_material() -> MaterialData {
    MaterialData {
        diffuse_albedo: Vec4::ONE,
        fresnel_r0: Vec3::splat(0.1),
        roughness: 1.0,
        ..MaterialData::new("sky")
    }
}

/// Create the depth buffer, and the MSAA color target when `msaa` is set.
///
/// Depth starts in `Common` and gets a recorded transition to `DepthWrite`.
/// The MSAA target starts in `ResolveSource`, where every frame leaves it.
fn create_screen_targets(
    gpu: &mut GpuContext,
    config: &RendererConfig,
    msaa: Option<MsaaSettings>,
    width: u32,
    height: u32,
) -> GraphicsResult<(TextureId, Option<TextureId>)> {
    let sample = msaa.map(MsaaSettings::sample_desc);
    let (count, quality) = sample.map_or((1, 0), |s| (s.count, s.quality));

    let depth = gpu.create_texture(
        &TextureDesc::new_2d("depth buffer", width, height, config.depth_format)
            .with_usage(TextureUsage::DEPTH_STENCIL)
            .with_samples(count, quality)
            .with_initial_state(ResourceState::Common),
    )?;
    gpu.transition(depth, ResourceState::DepthWrite)?;

    let msaa_target = match sample {
        Some(sample) => Some(gpu.create_texture(
            &TextureDesc::new_2d("msaa color", width, height, config.back_buffer_format)
                .with_usage(TextureUsage::RENDER_TARGET | TextureUsage::RESOLVE_SRC)
                .with_samples(sample.count, sample.quality)
                .with_initial_state(ResourceState::ResolveSource),
        )?),
        None => None,
    };
    Ok((depth, msaa_target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;
    use crate::scene::SKY_ITEM_NAME;

    fn renderer(config: RendererConfig) -> (Arc<HeadlessBackend>, FrameRenderer) {
        let backend = Arc::new(HeadlessBackend::new());
        let renderer = FrameRenderer::new(backend.clone(), config.with_size(64, 32)).unwrap();
        (backend, renderer)
    }

    #[test]
    fn test_startup_state() {
        let (backend, renderer) = renderer(RendererConfig::default());
        let targets = renderer.targets();
        assert_eq!(targets.back_buffers.len(), 2);
        assert!(targets.msaa.is_none());
        assert_eq!(renderer.tracker().state(targets.depth), Some(ResourceState::DepthWrite));
        assert_eq!(backend.texture_state(targets.depth), Some(ResourceState::DepthWrite));
        assert_eq!(
            renderer.tracker().state(targets.shadow),
            Some(ResourceState::ShaderResource)
        );
        assert!(renderer.gpu().is_idle());

        let sky = renderer.scene().item(0).unwrap();
        assert_eq!(sky.name, SKY_ITEM_NAME);
        assert_eq!(sky.object_slot, 0);
    }

    #[test]
    fn test_msaa_startup_creates_matching_targets() {
        let (backend, renderer) = renderer(RendererConfig::default().with_msaa(true));
        let targets = renderer.targets();
        let msaa = targets.msaa.unwrap();
        assert_eq!(backend.texture_desc(msaa).unwrap().sample_count, 4);
        assert_eq!(backend.texture_desc(targets.depth).unwrap().sample_count, 4);
        assert_eq!(backend.texture_state(msaa), Some(ResourceState::ResolveSource));
    }

    #[test]
    fn test_unsupported_msaa_is_a_config_error() {
        let backend = Arc::new(HeadlessBackend::new());
        backend.set_msaa_quality_levels(0);
        let result = FrameRenderer::new(backend, RendererConfig::default());
        assert!(matches!(result, Err(GraphicsError::InvalidConfig(_))));
    }

    #[test]
    fn test_sky_is_drawn_by_environment_pass() {
        let (_backend, mut renderer) = renderer(RendererConfig::default());
        let report = renderer.render_frame().unwrap();

        let environment = report.pass(PassKind::Environment).unwrap();
        assert_eq!(environment.draws.len(), 1);
        assert_eq!(environment.draws[0].item, 0);
        assert!(report.pass(PassKind::Main).unwrap().draws.is_empty());
        assert!(!report.resolved);
    }

    #[test]
    fn test_zero_resize_is_ignored() {
        let (backend, mut renderer) = renderer(RendererConfig::default());
        let before = renderer.targets().clone();
        renderer.resize(0, 100).unwrap();
        assert_eq!(renderer.targets(), &before);
        assert!(!backend
            .events()
            .iter()
            .any(|e| matches!(e, crate::backend::BackendEvent::SwapchainResized { .. })));
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let (backend, mut renderer) = renderer(RendererConfig::default());
        renderer.render_frame().unwrap();
        renderer.shutdown().unwrap();
        renderer.shutdown().unwrap();
        assert_eq!(backend.live_textures(), 0);
        assert_eq!(backend.live_buffers(), 0);
        assert!(matches!(renderer.render_frame(), Err(GraphicsError::ShutDown)));
    }
}
