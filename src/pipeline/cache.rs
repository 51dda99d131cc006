//! Lazily populated pipeline variant cache.

use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::GpuBackend;
use crate::device_call;
use crate::error::GraphicsResult;
use crate::shader::{CompiledShader, ShaderComposer, ShaderStage};
use crate::types::{PipelineId, PrimitiveTopology, Vertex};

use super::desc::{describe_fixed_function, MsaaSettings, RenderPipelineDesc, TargetFormats};
use super::key::VariantKey;

/// A compiled pipeline and the programs it was built from.
#[derive(Debug, Clone)]
pub struct PipelineVariant {
    pub key: VariantKey,
    pub pipeline: PipelineId,
    pub vertex: Arc<CompiledShader>,
    pub fragment: Arc<CompiledShader>,
}

/// Outcome of a cache lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLookup {
    pub pipeline: PipelineId,
    /// Whether this lookup compiled and created the pipeline.
    pub built: bool,
}

/// Map from [`VariantKey`] to compiled pipeline, filled on first use.
///
/// Entries are never evicted or rebuilt; a key that misses once is served
/// from the cache for the lifetime of the cache.
pub struct PipelineCache {
    entries: HashMap<VariantKey, PipelineVariant>,
    formats: TargetFormats,
    msaa: MsaaSettings,
    hits: u64,
    misses: u64,
}

impl PipelineCache {
    pub fn new(formats: TargetFormats, msaa: MsaaSettings) -> Self {
        Self {
            entries: HashMap::new(),
            formats,
            msaa,
            hits: 0,
            misses: 0,
        }
    }

    /// Return the pipeline for `key`, building it on a miss.
    ///
    /// A build compiles the pass program for both stages with the key's
    /// capability defines. Any compile or device failure is returned and
    /// nothing is inserted.
    pub fn get_or_build(
        &mut self,
        key: VariantKey,
        backend: &dyn GpuBackend,
        shaders: &ShaderComposer,
    ) -> GraphicsResult<CacheLookup> {
        if let Some(variant) = self.entries.get(&key) {
            self.hits += 1;
            return Ok(CacheLookup {
                pipeline: variant.pipeline,
                built: false,
            });
        }

        let variant = self.build(key, backend, shaders)?;
        let pipeline = variant.pipeline;
        self.entries.insert(key, variant);
        self.misses += 1;
        Ok(CacheLookup {
            pipeline,
            built: true,
        })
    }

    fn build(
        &self,
        key: VariantKey,
        backend: &dyn GpuBackend,
        shaders: &ShaderComposer,
    ) -> GraphicsResult<PipelineVariant> {
        log::debug!("building pipeline variant {key}");

        let program = key.pass.program();
        let defines = key.caps.defines();
        let vertex = Arc::new(shaders.compile(program, ShaderStage::Vertex, &defines)?);
        let fragment = Arc::new(shaders.compile(program, ShaderStage::Fragment, &defines)?);

        let fixed = describe_fixed_function(&key, &self.formats, &self.msaa);
        let desc = RenderPipelineDesc {
            label: format!("{key}"),
            key,
            vertex: Arc::clone(&vertex),
            fragment: Arc::clone(&fragment),
            input_layout: Vertex::layout(),
            topology: PrimitiveTopology::TriangleList,
            rasterizer: fixed.rasterizer,
            depth_stencil: fixed.depth_stencil,
            color_formats: fixed.color_formats,
            depth_format: fixed.depth_format,
            sample: fixed.sample,
        };
        let pipeline = device_call!(backend.create_render_pipeline(&desc))?;

        Ok(PipelineVariant {
            key,
            pipeline,
            vertex,
            fragment,
        })
    }

    pub fn get(&self, key: &VariantKey) -> Option<&PipelineVariant> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &VariantKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn msaa(&self) -> MsaaSettings {
        self.msaa
    }
}
