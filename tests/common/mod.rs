//! Common utilities for frame core integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use glam::Vec3;
use lumen_frame::scene::generate_box;
use lumen_frame::{
    BackendEvent, FrameRenderer, HeadlessBackend, MaterialData, MaterialTextures, ModelImport,
    RendererConfig, TextureData, TextureId,
};

pub const WIDTH: u32 = 64;
pub const HEIGHT: u32 = 48;

/// Install a test logger once. Safe to call from every test.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A headless backend and a renderer on top of it.
pub struct TestContext {
    pub backend: Arc<HeadlessBackend>,
    pub renderer: FrameRenderer,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(RendererConfig::default())
    }

    pub fn with_config(config: RendererConfig) -> Self {
        init_logging();
        let backend = Arc::new(HeadlessBackend::new());
        let renderer = FrameRenderer::new(backend.clone(), config.with_size(WIDTH, HEIGHT))
            .expect("renderer creation should succeed on the headless backend");
        Self { backend, renderer }
    }

    /// Discard events recorded so far.
    pub fn clear_events(&self) {
        self.backend.take_events();
    }
}

/// Material channels with the given texture slots, all pointing at texture 0.
pub fn channels(diffuse: bool, normal: bool, mask: bool) -> MaterialTextures {
    let slot = |on: bool| on.then_some(0);
    MaterialTextures {
        diffuse: slot(diffuse),
        normal: slot(normal),
        mask: slot(mask),
        ..Default::default()
    }
}

/// A box called `name` whose material uses `textures`.
pub fn box_model(name: &str, textures: MaterialTextures) -> ModelImport {
    let mut model = ModelImport::new(name)
        .with_material(MaterialData::new(format!("{name} material")).with_textures(textures))
        .with_mesh(generate_box(name, Vec3::ONE, 0));
    if textures.max_index().is_some() {
        model = model.with_texture(TextureData::solid(format!("{name} texture"), 4, 4, [200, 120, 40, 255]));
    }
    model
}

/// A box whose material only has a diffuse texture.
pub fn diffuse_box(name: &str) -> ModelImport {
    box_model(name, channels(true, false, false))
}

/// Textures destroyed so far, with the fence values at destruction.
pub fn destroyed_textures(backend: &HeadlessBackend) -> Vec<(TextureId, String, u64, u64)> {
    backend
        .events()
        .into_iter()
        .filter_map(|event| match event {
            BackendEvent::TextureDestroyed {
                texture,
                label,
                completed,
                signaled,
            } => Some((texture, label, completed, signaled)),
            _ => None,
        })
        .collect()
}
