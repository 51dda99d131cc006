//! Render pipeline descriptions and fixed-function derivation.

use std::sync::Arc;

use crate::shader::CompiledShader;
use crate::types::{PrimitiveTopology, TextureFormat, VertexLayout};

use super::key::{MaterialCaps, PassKind, QualityToggles, VariantKey};

/// Depth bias applied to shadow casters, in depth buffer units.
pub const SHADOW_DEPTH_BIAS: i32 = 10_000;
pub const SHADOW_DEPTH_BIAS_CLAMP: f32 = 0.0;
pub const SHADOW_SLOPE_SCALED_DEPTH_BIAS: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillMode {
    #[default]
    Solid,
    Wireframe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompareFunction {
    #[default]
    Less,
    LessEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RasterizerState {
    pub fill_mode: FillMode,
    pub cull_mode: CullMode,
    pub depth_bias: i32,
    pub depth_bias_clamp: f32,
    pub slope_scaled_depth_bias: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStencilState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub compare: CompareFunction,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_test: true,
            depth_write: true,
            compare: CompareFunction::Less,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleDesc {
    pub count: u32,
    pub quality: u32,
}

impl SampleDesc {
    pub const SINGLE: SampleDesc = SampleDesc {
        count: 1,
        quality: 0,
    };
}

/// Formats of the targets pipelines render into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetFormats {
    pub color: TextureFormat,
    pub depth: TextureFormat,
    pub shadow: TextureFormat,
}

/// Multisampling supported by the device for the color format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsaaSettings {
    pub sample_count: u32,
    /// Quality levels reported by the device. Pipelines use the highest.
    pub quality_levels: u32,
}

impl MsaaSettings {
    pub fn sample_desc(self) -> SampleDesc {
        SampleDesc {
            count: self.sample_count,
            quality: self.quality_levels.saturating_sub(1),
        }
    }
}

/// Everything about a pipeline except its programs.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedFunctionState {
    pub rasterizer: RasterizerState,
    pub depth_stencil: DepthStencilState,
    pub color_formats: Vec<TextureFormat>,
    pub depth_format: Option<TextureFormat>,
    pub sample: SampleDesc,
}

/// Derive the fixed-function state of a variant from its key.
pub fn describe_fixed_function(
    key: &VariantKey,
    formats: &TargetFormats,
    msaa: &MsaaSettings,
) -> FixedFunctionState {
    let mut rasterizer = RasterizerState::default();
    if key.toggles.contains(QualityToggles::WIREFRAME) {
        rasterizer.fill_mode = FillMode::Wireframe;
    }
    if key.caps.contains(MaterialCaps::MASK) {
        rasterizer.cull_mode = CullMode::None;
    }

    let mut depth_stencil = DepthStencilState::default();
    let sample = if key.toggles.contains(QualityToggles::MSAA) && key.pass != PassKind::Shadow {
        msaa.sample_desc()
    } else {
        SampleDesc::SINGLE
    };

    match key.pass {
        PassKind::Main => FixedFunctionState {
            rasterizer,
            depth_stencil,
            color_formats: vec![formats.color],
            depth_format: Some(formats.depth),
            sample,
        },
        PassKind::Shadow => {
            rasterizer.depth_bias = SHADOW_DEPTH_BIAS;
            rasterizer.depth_bias_clamp = SHADOW_DEPTH_BIAS_CLAMP;
            rasterizer.slope_scaled_depth_bias = SHADOW_SLOPE_SCALED_DEPTH_BIAS;
            FixedFunctionState {
                rasterizer,
                depth_stencil,
                color_formats: Vec::new(),
                depth_format: Some(formats.shadow),
                sample,
            }
        }
        PassKind::Environment => {
            rasterizer.cull_mode = CullMode::None;
            depth_stencil.compare = CompareFunction::LessEqual;
            FixedFunctionState {
                rasterizer,
                depth_stencil,
                color_formats: vec![formats.color],
                depth_format: Some(formats.depth),
                sample,
            }
        }
    }
}

/// Full description handed to the device to create a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPipelineDesc {
    pub label: String,
    pub key: VariantKey,
    pub vertex: Arc<CompiledShader>,
    pub fragment: Arc<CompiledShader>,
    pub input_layout: VertexLayout,
    pub topology: PrimitiveTopology,
    pub rasterizer: RasterizerState,
    pub depth_stencil: DepthStencilState,
    pub color_formats: Vec<TextureFormat>,
    pub depth_format: Option<TextureFormat>,
    pub sample: SampleDesc,
}
