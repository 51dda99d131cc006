//! Pipeline variants.
//!
//! A variant is identified by a [`VariantKey`]: the pass it renders in, the
//! texture channels of the material, and the frame-wide quality toggles.
//! The [`PipelineCache`] builds a variant the first time its key is seen and
//! serves it from memory afterwards.
//!
//! | Key field  | Affects                                                   |
//! |------------|-----------------------------------------------------------|
//! | `pass`     | program, target formats, depth bias, cull and depth test  |
//! | `caps`     | capability defines, culling for masked materials          |
//! | `toggles`  | fill mode, sample count and quality                       |

mod cache;
mod desc;
mod key;

pub use cache::{CacheLookup, PipelineCache, PipelineVariant};
pub use desc::{
    describe_fixed_function, CompareFunction, CullMode, DepthStencilState, FillMode,
    FixedFunctionState, MsaaSettings, RasterizerState, RenderPipelineDesc, SampleDesc,
    TargetFormats, SHADOW_DEPTH_BIAS, SHADOW_DEPTH_BIAS_CLAMP, SHADOW_SLOPE_SCALED_DEPTH_BIAS,
};
pub use key::{MaterialCaps, PassKind, QualityToggles, VariantKey};
