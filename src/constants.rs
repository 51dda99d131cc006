//! GPU constant layouts and fixed-slot upload regions.
//!
//! Layouts mirror the blocks declared in `common.glsl`. Per-pass and
//! per-object constants live in constant-buffer regions whose elements are
//! padded to [`CONSTANT_BUFFER_ALIGNMENT`]; the material table is a tightly
//! packed array.

use std::marker::PhantomData;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};
use static_assertions::const_assert_eq;

use crate::backend::GpuBackend;
use crate::device_call;
use crate::error::{GraphicsError, GraphicsResult};
use crate::types::{BufferDesc, BufferId, BufferUsage};

/// Constant buffer views must start on this boundary.
pub const CONSTANT_BUFFER_ALIGNMENT: u64 = 256;

pub const MAX_LIGHTS: usize = 16;

/// Pass constant slot read by the main and environment passes.
pub const MAIN_PASS_SLOT: u32 = 0;
/// Pass constant slot read by the shadow pass.
pub const SHADOW_PASS_SLOT: u32 = 1;
pub const PASS_SLOT_COUNT: u32 = 2;

/// Texture index meaning "channel not present".
pub const NO_TEXTURE: u32 = u32::MAX;

/// Round `size` up to the constant buffer alignment.
pub const fn constant_buffer_size(size: u64) -> u64 {
    (size + CONSTANT_BUFFER_ALIGNMENT - 1) & !(CONSTANT_BUFFER_ALIGNMENT - 1)
}

/// Per-object data
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ObjectConstants {
    pub world: Mat4,
    pub tex_transform: Mat4,
    pub material_index: u32,
    pub _padding: [u32; 3],
}

impl Default for ObjectConstants {
    fn default() -> Self {
        Self {
            world: Mat4::IDENTITY,
            tex_transform: Mat4::IDENTITY,
            material_index: 0,
            _padding: [0; 3],
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct Light {
    pub strength: Vec3,
    pub falloff_start: f32,
    /// Direction the light travels, for directional and spot lights.
    pub direction: Vec3,
    pub falloff_end: f32,
    pub position: Vec3,
    pub spot_power: f32,
}

impl Light {
    pub fn directional(direction: Vec3, strength: Vec3) -> Self {
        Self {
            strength,
            direction: direction.normalize_or_zero(),
            ..Self::default()
        }
    }
}

/// Per-pass data: camera, lights, ambient term and shadow transform.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct PassConstants {
    pub view: Mat4,
    pub inv_view: Mat4,
    pub proj: Mat4,
    pub inv_proj: Mat4,
    pub view_proj: Mat4,
    pub inv_view_proj: Mat4,
    pub shadow_transform: Mat4,
    pub eye_position: Vec3,
    pub _padding0: f32,
    pub render_target_size: Vec2,
    pub inv_render_target_size: Vec2,
    pub near_z: f32,
    pub far_z: f32,
    pub total_time: f32,
    pub delta_time: f32,
    pub ambient_light: Vec4,
    pub lights: [Light; MAX_LIGHTS],
}

impl Default for PassConstants {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            inv_view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
            inv_proj: Mat4::IDENTITY,
            view_proj: Mat4::IDENTITY,
            inv_view_proj: Mat4::IDENTITY,
            shadow_transform: Mat4::IDENTITY,
            eye_position: Vec3::ZERO,
            _padding0: 0.0,
            render_target_size: Vec2::ZERO,
            inv_render_target_size: Vec2::ZERO,
            near_z: 1.0,
            far_z: 1000.0,
            total_time: 0.0,
            delta_time: 0.0,
            ambient_light: Vec4::new(0.25, 0.25, 0.35, 1.0),
            lights: [Light::default(); MAX_LIGHTS],
        }
    }
}

impl PassConstants {
    /// Fill the camera matrices and their inverses.
    pub fn set_camera(&mut self, view: Mat4, proj: Mat4, eye_position: Vec3) {
        self.view = view;
        self.inv_view = view.inverse();
        self.proj = proj;
        self.inv_proj = proj.inverse();
        self.view_proj = proj * view;
        self.inv_view_proj = self.view_proj.inverse();
        self.eye_position = eye_position;
    }

    pub fn set_render_target_size(&mut self, width: u32, height: u32) {
        self.render_target_size = Vec2::new(width as f32, height as f32);
        self.inv_render_target_size = Vec2::new(1.0 / width.max(1) as f32, 1.0 / height.max(1) as f32);
    }
}

/// One entry of the material table.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct MaterialConstants {
    pub diffuse_albedo: Vec4,
    pub fresnel_r0: Vec3,
    pub roughness: f32,
    pub mat_transform: Mat4,
    pub diffuse_map: u32,
    pub normal_map: u32,
    pub bump_map: u32,
    pub roughness_map: u32,
    pub shininess_map: u32,
    pub specular_map: u32,
    pub mask_map: u32,
    pub _padding: u32,
}

const_assert_eq!(std::mem::size_of::<ObjectConstants>(), 144);
const_assert_eq!(std::mem::size_of::<PassConstants>(), 512 + 48 * MAX_LIGHTS);
const_assert_eq!(std::mem::size_of::<MaterialConstants>(), 128);

/// A buffer of `capacity` fixed-size slots written from the CPU.
///
/// Slot `i` always lives at the same offset, so a render item keeps one slot
/// for its whole lifetime.
#[derive(Debug)]
pub struct UploadRegion<T> {
    buffer: BufferId,
    element_size: u64,
    capacity: u32,
    _marker: PhantomData<T>,
}

impl<T: Pod> UploadRegion<T> {
    /// Create a constant-buffer region with elements padded to 256 bytes.
    pub fn constant(backend: &dyn GpuBackend, label: &str, capacity: u32) -> GraphicsResult<Self> {
        let element_size = constant_buffer_size(std::mem::size_of::<T>() as u64);
        Self::create(backend, label, capacity, element_size, BufferUsage::CONSTANT)
    }

    /// Create a tightly packed structured region.
    pub fn structured(backend: &dyn GpuBackend, label: &str, capacity: u32) -> GraphicsResult<Self> {
        let element_size = std::mem::size_of::<T>() as u64;
        Self::create(backend, label, capacity, element_size, BufferUsage::STRUCTURED)
    }

    fn create(
        backend: &dyn GpuBackend,
        label: &str,
        capacity: u32,
        element_size: u64,
        usage: BufferUsage,
    ) -> GraphicsResult<Self> {
        let desc = BufferDesc::new(
            label,
            element_size * capacity.max(1) as u64,
            usage | BufferUsage::UPLOAD,
        );
        let buffer = device_call!(backend.create_buffer(&desc))?;
        Ok(Self {
            buffer,
            element_size,
            capacity,
            _marker: PhantomData,
        })
    }

    pub fn write(&self, backend: &dyn GpuBackend, slot: u32, value: &T) -> GraphicsResult<()> {
        if slot >= self.capacity {
            return Err(GraphicsError::CapacityExceeded {
                what: "upload region slot",
                capacity: self.capacity as usize,
            });
        }
        device_call!(backend.write_buffer(self.buffer, self.offset(slot), bytemuck::bytes_of(value)))
    }

    pub fn offset(&self, slot: u32) -> u64 {
        slot as u64 * self.element_size
    }

    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    pub fn element_size(&self) -> u64 {
        self.element_size
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Release the buffer. The GPU must no longer reference it.
    pub fn destroy(&self, backend: &dyn GpuBackend) {
        backend.destroy_buffer(self.buffer);
    }
}
