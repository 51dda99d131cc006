//! Append-only scene tables.
//!
//! The scene holds the meshes, materials, textures and render items the frame
//! orchestrator draws. Every table has a fixed capacity taken from the
//! configuration; exceeding it is an error, never a silent truncation.
//! Nothing is removed once added, so indices and object constant slots are
//! stable for the lifetime of the scene.
//!
//! Render items are grouped by the capability set of their material so that
//! items sharing a pipeline variant are drawn back to back.

mod geometry;
mod import;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use glam::{Mat4, Vec3, Vec4};

use crate::constants::{MaterialConstants, ObjectConstants, NO_TEXTURE};
use crate::error::{GraphicsError, GraphicsResult};
use crate::pipeline::MaterialCaps;
use crate::types::{BufferId, IndexFormat, PrimitiveTopology, TextureId};

pub use geometry::{generate_box, generate_sphere};
pub use import::{ImportSummary, MaterialData, MeshData, ModelImport, TextureData};

/// Name of the environment item created for the sky.
pub const SKY_ITEM_NAME: &str = "sky";
/// Radius the unit sky mesh is scaled to.
pub const SKY_RADIUS: f32 = 5000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub(crate) usize);

impl MeshId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Geometry uploaded to the GPU.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub name: String,
    pub vertex_buffer: BufferId,
    pub index_buffer: BufferId,
    pub vertex_count: u32,
    pub index_count: u32,
    pub vertex_stride: u64,
    pub index_format: IndexFormat,
}

/// Texture table indices used by a material, one per optional channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MaterialTextures {
    pub diffuse: Option<u32>,
    pub normal: Option<u32>,
    pub bump: Option<u32>,
    pub roughness: Option<u32>,
    pub shininess: Option<u32>,
    pub specular: Option<u32>,
    pub mask: Option<u32>,
}

impl MaterialTextures {
    fn channels(&self) -> [(MaterialCaps, Option<u32>); 7] {
        [
            (MaterialCaps::DIFFUSE, self.diffuse),
            (MaterialCaps::NORMAL, self.normal),
            (MaterialCaps::BUMP, self.bump),
            (MaterialCaps::ROUGHNESS, self.roughness),
            (MaterialCaps::SHININESS, self.shininess),
            (MaterialCaps::SPECULAR, self.specular),
            (MaterialCaps::MASK, self.mask),
        ]
    }

    pub fn caps(&self) -> MaterialCaps {
        self.channels()
            .iter()
            .filter(|(_, index)| index.is_some())
            .fold(MaterialCaps::empty(), |caps, (cap, _)| caps | *cap)
    }

    /// Highest texture index referenced.
    pub fn max_index(&self) -> Option<u32> {
        self.channels().iter().filter_map(|(_, index)| *index).max()
    }

    /// Shift every index by `base`.
    pub fn offset(&self, base: u32) -> Self {
        let shift = |index: Option<u32>| index.map(|i| i + base);
        Self {
            diffuse: shift(self.diffuse),
            normal: shift(self.normal),
            bump: shift(self.bump),
            roughness: shift(self.roughness),
            shininess: shift(self.shininess),
            specular: shift(self.specular),
            mask: shift(self.mask),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub diffuse_albedo: Vec4,
    pub fresnel_r0: Vec3,
    pub roughness: f32,
    pub mat_transform: Mat4,
    pub textures: MaterialTextures,
}

impl Material {
    pub fn caps(&self) -> MaterialCaps {
        self.textures.caps()
    }

    pub fn constants(&self) -> MaterialConstants {
        let index = |i: Option<u32>| i.unwrap_or(NO_TEXTURE);
        MaterialConstants {
            diffuse_albedo: self.diffuse_albedo,
            fresnel_r0: self.fresnel_r0,
            roughness: self.roughness,
            mat_transform: self.mat_transform,
            diffuse_map: index(self.textures.diffuse),
            normal_map: index(self.textures.normal),
            bump_map: index(self.textures.bump),
            roughness_map: index(self.textures.roughness),
            shininess_map: index(self.textures.shininess),
            specular_map: index(self.textures.specular),
            mask_map: index(self.textures.mask),
            _padding: 0,
        }
    }
}

/// Which passes draw an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderLayer {
    /// Drawn by the shadow and main passes.
    #[default]
    Opaque,
    /// Drawn by the environment pass only.
    Environment,
}

/// One drawable index range.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderItem {
    pub name: String,
    pub mesh: MeshId,
    /// Absolute index into the material table.
    pub material: usize,
    pub index_count: u32,
    pub start_index: u32,
    pub base_vertex: i32,
    pub topology: PrimitiveTopology,
    /// Slot in the object constant region.
    pub object_slot: u32,
    pub layer: RenderLayer,
    pub world: Mat4,
    pub tex_transform: Mat4,
}

/// Fields of a render item supplied by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderItemDesc {
    pub name: String,
    pub mesh: MeshId,
    pub material: usize,
    pub index_count: u32,
    pub start_index: u32,
    pub base_vertex: i32,
    pub topology: PrimitiveTopology,
    pub layer: RenderLayer,
    pub world: Mat4,
    pub tex_transform: Mat4,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneTexture {
    pub name: String,
    pub texture: TextureId,
}

/// Fixed capacities of the scene tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneLimits {
    pub max_render_items: u32,
    pub max_textures: u32,
    pub max_materials: u32,
}

#[derive(Debug)]
pub struct Scene {
    limits: SceneLimits,
    meshes: Vec<Mesh>,
    materials: Vec<Material>,
    textures: Vec<SceneTexture>,
    items: Vec<RenderItem>,
    names: HashMap<String, Vec<usize>>,
    dirty_objects: BTreeSet<u32>,
    dirty_materials: BTreeSet<usize>,
}

impl Scene {
    pub fn new(limits: SceneLimits) -> Self {
        Self {
            limits,
            meshes: Vec::new(),
            materials: Vec::new(),
            textures: Vec::new(),
            items: Vec::new(),
            names: HashMap::new(),
            dirty_objects: BTreeSet::new(),
            dirty_materials: BTreeSet::new(),
        }
    }

    pub fn limits(&self) -> SceneLimits {
        self.limits
    }

    /// Fail if adding the given counts would exceed any table capacity.
    pub fn check_capacity(&self, items: usize, materials: usize, textures: usize) -> GraphicsResult<()> {
        let checks = [
            ("render item", self.items.len() + items, self.limits.max_render_items),
            ("material", self.materials.len() + materials, self.limits.max_materials),
            ("texture", self.textures.len() + textures, self.limits.max_textures),
        ];
        for (what, needed, capacity) in checks {
            if needed > capacity as usize {
                return Err(GraphicsError::CapacityExceeded {
                    what,
                    capacity: capacity as usize,
                });
            }
        }
        Ok(())
    }

    pub fn add_mesh(&mut self, mesh: Mesh) -> MeshId {
        self.meshes.push(mesh);
        MeshId(self.meshes.len() - 1)
    }

    pub fn add_material(&mut self, material: Material) -> GraphicsResult<usize> {
        self.check_capacity(0, 1, 0)?;
        if let Some(max) = material.textures.max_index() {
            if max as usize >= self.textures.len() {
                return Err(GraphicsError::InvalidImport(format!(
                    "material `{}` references texture {max} but only {} exist",
                    material.name,
                    self.textures.len()
                )));
            }
        }
        self.materials.push(material);
        let index = self.materials.len() - 1;
        self.dirty_materials.insert(index);
        Ok(index)
    }

    pub fn add_texture(&mut self, name: impl Into<String>, texture: TextureId) -> GraphicsResult<u32> {
        self.check_capacity(0, 0, 1)?;
        self.textures.push(SceneTexture {
            name: name.into(),
            texture,
        });
        Ok(self.textures.len() as u32 - 1)
    }

    /// Append a render item and give it the next object constant slot.
    pub fn add_item(&mut self, desc: RenderItemDesc) -> GraphicsResult<usize> {
        self.check_capacity(1, 0, 0)?;
        if desc.mesh.0 >= self.meshes.len() {
            return Err(GraphicsError::InvalidImport(format!(
                "render item `{}` references unknown mesh {}",
                desc.name, desc.mesh.0
            )));
        }
        if desc.material >= self.materials.len() {
            return Err(GraphicsError::InvalidImport(format!(
                "render item `{}` references unknown material {}",
                desc.name, desc.material
            )));
        }

        let index = self.items.len();
        let object_slot = index as u32;
        self.names.entry(desc.name.clone()).or_default().push(index);
        self.items.push(RenderItem {
            name: desc.name,
            mesh: desc.mesh,
            material: desc.material,
            index_count: desc.index_count,
            start_index: desc.start_index,
            base_vertex: desc.base_vertex,
            topology: desc.topology,
            object_slot,
            layer: desc.layer,
            world: desc.world,
            tex_transform: desc.tex_transform,
        });
        self.dirty_objects.insert(object_slot);
        Ok(index)
    }

    /// Set the world transform of every item called `name`.
    ///
    /// Returns the number of items updated.
    pub fn set_transform(&mut self, name: &str, world: Mat4) -> GraphicsResult<usize> {
        let indices = self
            .names
            .get(name)
            .ok_or_else(|| GraphicsError::UnknownRenderItem(name.to_string()))?;
        for &index in indices {
            let item = &mut self.items[index];
            item.world = world;
            self.dirty_objects.insert(item.object_slot);
        }
        Ok(indices.len())
    }

    /// Capability set of an item's material.
    pub fn item_caps(&self, item: usize) -> MaterialCaps {
        self.items
            .get(item)
            .and_then(|item| self.materials.get(item.material))
            .map(Material::caps)
            .unwrap_or_default()
    }

    /// Items of a layer grouped by material capabilities, in insertion
    /// order within each group.
    pub fn groups(&self, layer: RenderLayer) -> BTreeMap<MaterialCaps, Vec<usize>> {
        let mut groups: BTreeMap<MaterialCaps, Vec<usize>> = BTreeMap::new();
        for (index, item) in self.items.iter().enumerate() {
            if item.layer == layer {
                groups.entry(self.item_caps(index)).or_default().push(index);
            }
        }
        groups
    }

    pub fn object_constants(&self, item: &RenderItem) -> ObjectConstants {
        ObjectConstants {
            world: item.world,
            tex_transform: item.tex_transform,
            material_index: item.material as u32,
            _padding: [0; 3],
        }
    }

    /// Object slots changed since the last call.
    pub fn take_dirty_objects(&mut self) -> Vec<u32> {
        std::mem::take(&mut self.dirty_objects).into_iter().collect()
    }

    /// Material indices changed since the last call.
    pub fn take_dirty_materials(&mut self) -> Vec<usize> {
        std::mem::take(&mut self.dirty_materials).into_iter().collect()
    }

    pub fn mesh(&self, id: MeshId) -> Option<&Mesh> {
        self.meshes.get(id.0)
    }

    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn textures(&self) -> &[SceneTexture] {
        &self.textures
    }

    pub fn items(&self) -> &[RenderItem] {
        &self.items
    }

    pub fn item(&self, index: usize) -> Option<&RenderItem> {
        self.items.get(index)
    }

    /// Indices of the items called `name`.
    pub fn items_named(&self, name: &str) -> &[usize] {
        self.names.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Move out every GPU resource the scene references, leaving the tables
    /// empty.
    pub(crate) fn take_gpu_resources(&mut self) -> (Vec<BufferId>, Vec<TextureId>) {
        let buffers = self
            .meshes
            .drain(..)
            .flat_map(|mesh| [mesh.vertex_buffer, mesh.index_buffer])
            .collect();
        let textures = self.textures.drain(..).map(|t| t.texture).collect();
        self.items.clear();
        self.materials.clear();
        self.names.clear();
        self.dirty_objects.clear();
        self.dirty_materials.clear();
        (buffers, textures)
    }
}
