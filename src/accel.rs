//! Two-level ray tracing acceleration structures.
//!
//! Every mesh drawn by the opaque passes gets one bottom-level structure,
//! built once and kept until release. The top level holds one instance per
//! opaque render item and is rebuilt from scratch whenever transforms change;
//! there is no refitting.
//!
//! A build allocates a scratch buffer in `UnorderedAccess` and a result
//! buffer in `AccelerationStructure`, records the build and follows it with
//! a UAV barrier on the result so later builds and traces see the finished
//! structure.

use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use static_assertions::const_assert_eq;

use crate::backend::{AccelBuildInputs, AccelGeometry, AccelPrebuildInfo};
use crate::context::GpuContext;
use crate::device_call;
use crate::error::{GraphicsError, GraphicsResult};
use crate::scene::{Mesh, MeshId, RenderLayer, Scene};
use crate::state_tracker::ResourceState;
use crate::types::{BufferDesc, BufferId, BufferUsage};

/// Visibility mask given to every instance.
pub const INSTANCE_MASK: u32 = 0xFF;

const INSTANCE_ID_BITS: u32 = 24;
const INSTANCE_ID_MASK: u32 = (1 << INSTANCE_ID_BITS) - 1;

/// Device layout of one top-level instance.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct InstanceDesc {
    /// Rows of the 3x4 object-to-world transform.
    pub transform: [[f32; 4]; 3],
    /// Instance id in the low 24 bits, mask in the high 8.
    pub instance_id_and_mask: u32,
    /// Hit group offset in the low 24 bits, flags in the high 8.
    pub contribution_and_flags: u32,
    pub blas_address: u64,
}

const_assert_eq!(std::mem::size_of::<InstanceDesc>(), 64);

impl InstanceDesc {
    pub fn new(transform: Mat4, instance_id: u32, blas_address: u64) -> Self {
        Self {
            transform: [
                transform.row(0).to_array(),
                transform.row(1).to_array(),
                transform.row(2).to_array(),
            ],
            instance_id_and_mask: (instance_id & INSTANCE_ID_MASK) | (INSTANCE_MASK << INSTANCE_ID_BITS),
            contribution_and_flags: 0,
            blas_address,
        }
    }

    pub fn instance_id(&self) -> u32 {
        self.instance_id_and_mask & INSTANCE_ID_MASK
    }

    pub fn mask(&self) -> u32 {
        self.instance_id_and_mask >> INSTANCE_ID_BITS
    }
}

/// Buffers backing one built structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccelerationStructure {
    pub result: BufferId,
    pub scratch: BufferId,
    pub size_bytes: u64,
    /// GPU address of the result buffer.
    pub address: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopLevel {
    pub structure: AccelerationStructure,
    pub instances: BufferId,
    pub instance_count: u32,
}

/// One placement of a mesh in the top level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccelInstance {
    pub mesh: MeshId,
    pub transform: Mat4,
    pub id: u32,
}

impl AccelInstance {
    /// One instance per opaque render item, identified by its object slot.
    pub fn from_scene(scene: &Scene) -> Vec<AccelInstance> {
        scene
            .items()
            .iter()
            .filter(|item| item.layer == RenderLayer::Opaque)
            .map(|item| AccelInstance {
                mesh: item.mesh,
                transform: item.world,
                id: item.object_slot,
            })
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct AccelerationStructureBuilder {
    bottoms: HashMap<MeshId, AccelerationStructure>,
    top: Option<TopLevel>,
    top_builds: u64,
}

impl AccelerationStructureBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the build of a mesh's bottom level, unless it already exists.
    ///
    /// Returns the structure's GPU address.
    pub fn build_bottom(&mut self, gpu: &mut GpuContext, id: MeshId, mesh: &Mesh) -> GraphicsResult<u64> {
        if let Some(existing) = self.bottoms.get(&id) {
            return Ok(existing.address);
        }

        let inputs = AccelBuildInputs::BottomLevel {
            geometries: vec![AccelGeometry {
                vertex_buffer: mesh.vertex_buffer,
                vertex_count: mesh.vertex_count,
                vertex_stride: mesh.vertex_stride,
                index_buffer: mesh.index_buffer,
                index_count: mesh.index_count,
                index_format: mesh.index_format,
                opaque: true,
            }],
        };
        let sizes = device_call!(gpu.backend().accel_prebuild_info(&inputs))?;
        let structure = allocate(gpu, &format!("{} BLAS", mesh.name), sizes)?;
        record_build(gpu, inputs, &structure)?;

        log::debug!(
            "recorded bottom-level build for `{}` ({} bytes)",
            mesh.name,
            structure.size_bytes
        );
        self.bottoms.insert(id, structure);
        Ok(structure.address)
    }

    /// Record a fresh top-level build over `instances`.
    ///
    /// Any previous top level is released first, so the GPU must be idle.
    /// Every instance's mesh needs a bottom level.
    pub fn build_top(&mut self, gpu: &mut GpuContext, instances: &[AccelInstance]) -> GraphicsResult<TopLevel> {
        let descs = instances
            .iter()
            .map(|instance| {
                let bottom = self
                    .bottoms
                    .get(&instance.mesh)
                    .ok_or(GraphicsError::MissingAccelerationStructure(instance.mesh.index()))?;
                Ok(InstanceDesc::new(instance.transform, instance.id, bottom.address))
            })
            .collect::<GraphicsResult<Vec<_>>>()?;

        if let Some(old) = self.top.take() {
            release_top(gpu, old)?;
        }

        let instance_bytes = (descs.len().max(1) * std::mem::size_of::<InstanceDesc>()) as u64;
        let instance_buffer = device_call!(gpu.backend().create_buffer(&BufferDesc::new(
            "TLAS instances",
            instance_bytes,
            BufferUsage::UPLOAD,
        )))?;
        device_call!(gpu
            .backend()
            .write_buffer(instance_buffer, 0, bytemuck::cast_slice(&descs)))?;

        let inputs = AccelBuildInputs::TopLevel {
            instances: instance_buffer,
            instance_count: descs.len() as u32,
        };
        let sizes = device_call!(gpu.backend().accel_prebuild_info(&inputs))?;
        let structure = allocate(gpu, "TLAS", sizes)?;
        record_build(gpu, inputs, &structure)?;

        let top = TopLevel {
            structure,
            instances: instance_buffer,
            instance_count: descs.len() as u32,
        };
        self.top = Some(top);
        self.top_builds += 1;
        log::debug!("recorded top-level build over {} instances", descs.len());
        Ok(top)
    }

    /// Build missing bottom levels for the scene's opaque items and rebuild
    /// the top level, then wait for the GPU.
    pub fn build_scene(&mut self, gpu: &mut GpuContext, scene: &Scene) -> GraphicsResult<u64> {
        let instances = AccelInstance::from_scene(scene);

        gpu.flush()?;
        gpu.begin(None)?;
        for instance in &instances {
            let mesh = scene
                .mesh(instance.mesh)
                .ok_or(GraphicsError::MissingAccelerationStructure(instance.mesh.index()))?;
            self.build_bottom(gpu, instance.mesh, mesh)?;
        }
        self.build_top(gpu, &instances)?;
        gpu.submit_and_flush()
    }

    /// Rebuild the top level with new instance transforms.
    pub fn rebuild(&mut self, gpu: &mut GpuContext, instances: &[AccelInstance]) -> GraphicsResult<u64> {
        gpu.flush()?;
        gpu.begin(None)?;
        self.build_top(gpu, instances)?;
        gpu.submit_and_flush()
    }

    /// Release every structure. The GPU must be idle.
    pub fn release(&mut self, gpu: &mut GpuContext) -> GraphicsResult<()> {
        if let Some(top) = self.top.take() {
            release_top(gpu, top)?;
        }
        for (_, bottom) in self.bottoms.drain() {
            release_structure(gpu, &bottom)?;
        }
        Ok(())
    }

    pub fn bottom(&self, mesh: MeshId) -> Option<&AccelerationStructure> {
        self.bottoms.get(&mesh)
    }

    pub fn bottom_count(&self) -> usize {
        self.bottoms.len()
    }

    pub fn top(&self) -> Option<&TopLevel> {
        self.top.as_ref()
    }

    /// Number of top-level builds recorded so far.
    pub fn top_builds(&self) -> u64 {
        self.top_builds
    }
}

fn allocate(gpu: &mut GpuContext, label: &str, sizes: AccelPrebuildInfo) -> GraphicsResult<AccelerationStructure> {
    let scratch = gpu.create_buffer(
        &BufferDesc::new(format!("{label} scratch"), sizes.scratch_size, BufferUsage::UNORDERED_ACCESS)
            .with_initial_state(ResourceState::UnorderedAccess),
    )?;
    let result = gpu.create_buffer(
        &BufferDesc::new(
            format!("{label} result"),
            sizes.result_size,
            BufferUsage::UNORDERED_ACCESS | BufferUsage::ACCELERATION_STRUCTURE,
        )
        .with_initial_state(ResourceState::AccelerationStructure),
    )?;
    let address = device_call!(gpu.backend().buffer_address(result))?;
    Ok(AccelerationStructure {
        result,
        scratch,
        size_bytes: sizes.result_size,
        address,
    })
}

fn record_build(
    gpu: &mut GpuContext,
    inputs: AccelBuildInputs,
    structure: &AccelerationStructure,
) -> GraphicsResult<()> {
    let commands = gpu.commands_mut();
    commands.build_acceleration_structure(inputs, structure.scratch, structure.result)?;
    commands.uav_barrier(structure.result)
}

fn release_structure(gpu: &mut GpuContext, structure: &AccelerationStructure) -> GraphicsResult<()> {
    gpu.release_buffer(structure.scratch)?;
    gpu.release_buffer(structure.result)
}

fn release_top(gpu: &mut GpuContext, top: TopLevel) -> GraphicsResult<()> {
    release_structure(gpu, &top.structure)?;
    gpu.release_buffer(top.instances)
}
