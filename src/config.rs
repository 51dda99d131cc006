//! Renderer configuration.

use std::path::PathBuf;

use crate::error::{GraphicsError, GraphicsResult};
use crate::types::TextureFormat;

/// Configuration for creating a [`FrameRenderer`](crate::FrameRenderer)
#[derive(Debug, Clone, PartialEq)]
pub struct RendererConfig {
    /// Initial output width
    pub width: u32,
    /// Initial output height
    pub height: u32,
    /// Number of swapchain back buffers
    pub back_buffer_count: u32,
    pub back_buffer_format: TextureFormat,
    pub depth_format: TextureFormat,
    /// Shadow map resolution (square)
    pub shadow_map_size: u32,
    /// Samples per pixel when MSAA is enabled
    pub msaa_sample_count: u32,
    /// Fixed capacity of the render item table and object constants
    pub max_render_items: u32,
    /// Fixed capacity of the texture table
    pub max_textures: u32,
    /// Fixed capacity of the material table
    pub max_materials: u32,
    pub clear_color: [f32; 4],
    pub wireframe: bool,
    pub msaa: bool,
    /// Directory with `.glsl` files replacing the built-in programs
    pub shader_dir: Option<PathBuf>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            back_buffer_count: 2,
            back_buffer_format: TextureFormat::Rgba8Unorm,
            depth_format: TextureFormat::Depth24UnormStencil8,
            shadow_map_size: 2048,
            msaa_sample_count: 4,
            max_render_items: 512,
            max_textures: 128,
            max_materials: 128,
            clear_color: [0.69, 0.77, 0.87, 1.0],
            wireframe: false,
            msaa: false,
            shader_dir: None,
        }
    }
}

impl RendererConfig {
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_msaa(mut self, msaa: bool) -> Self {
        self.msaa = msaa;
        self
    }

    pub fn with_wireframe(mut self, wireframe: bool) -> Self {
        self.wireframe = wireframe;
        self
    }

    pub fn with_shadow_map_size(mut self, size: u32) -> Self {
        self.shadow_map_size = size;
        self
    }

    pub fn with_capacity(mut self, max_render_items: u32, max_textures: u32) -> Self {
        self.max_render_items = max_render_items;
        self.max_textures = max_textures;
        self
    }

    pub fn with_shader_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shader_dir = Some(dir.into());
        self
    }

    /// Check the configuration before any GPU object is created.
    pub fn validate(&self) -> GraphicsResult<()> {
        let invalid = |msg: String| Err(GraphicsError::InvalidConfig(msg));

        if self.width == 0 || self.height == 0 {
            return invalid(format!("output size {}x{} is empty", self.width, self.height));
        }
        if self.back_buffer_count < 2 {
            return invalid(format!(
                "at least 2 back buffers are required, got {}",
                self.back_buffer_count
            ));
        }
        if self.back_buffer_format.is_depth() {
            return invalid(format!(
                "back buffer format {:?} is a depth format",
                self.back_buffer_format
            ));
        }
        if !self.depth_format.is_depth() {
            return invalid(format!("depth format {:?} has no depth", self.depth_format));
        }
        if self.shadow_map_size == 0 {
            return invalid("shadow map size is zero".to_string());
        }
        if self.msaa_sample_count < 2 || !self.msaa_sample_count.is_power_of_two() {
            return invalid(format!(
                "MSAA sample count {} is not a power of two above 1",
                self.msaa_sample_count
            ));
        }
        if self.max_render_items == 0 || self.max_textures == 0 || self.max_materials == 0 {
            return invalid("table capacities must be non-zero".to_string());
        }
        Ok(())
    }
}
