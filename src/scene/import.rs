//! Model import into the scene tables.
//!
//! An import brings its own meshes, materials and textures. Material and
//! texture references inside a [`ModelImport`] are relative to the import;
//! they are rebased onto the end of the scene tables so that every import
//! occupies a disjoint range.

use std::ops::Range;

use glam::{Mat4, Vec3, Vec4};

use crate::context::GpuContext;
use crate::device_call;
use crate::error::{GraphicsError, GraphicsResult};
use crate::command::Command;
use crate::state_tracker::ResourceState;
use crate::types::{
    BufferDesc, BufferId, BufferUsage, IndexFormat, PrimitiveTopology, TextureDesc,
    TextureFormat, TextureUsage, Vertex,
};

use super::{
    Material, MaterialTextures, Mesh, RenderItemDesc, RenderLayer, Scene, SKY_ITEM_NAME,
    SKY_RADIUS,
};

/// CPU-side geometry of one mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    /// Index into the import's materials.
    pub material: usize,
    pub topology: PrimitiveTopology,
}

impl MeshData {
    pub fn new(name: impl Into<String>, vertices: Vec<Vertex>, indices: Vec<u32>, material: usize) -> Self {
        Self {
            name: name.into(),
            vertices,
            indices,
            material,
            topology: PrimitiveTopology::TriangleList,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterialData {
    pub name: String,
    pub diffuse_albedo: Vec4,
    pub fresnel_r0: Vec3,
    pub roughness: f32,
    /// Channel indices into the import's textures.
    pub textures: MaterialTextures,
}

impl MaterialData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            diffuse_albedo: Vec4::ONE,
            fresnel_r0: Vec3::splat(0.01),
            roughness: 0.5,
            textures: MaterialTextures::default(),
        }
    }

    pub fn with_textures(mut self, textures: MaterialTextures) -> Self {
        self.textures = textures;
        self
    }
}

/// Decoded pixels of one texture.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureData {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub pixels: Vec<u8>,
}

impl TextureData {
    /// A texture filled with a single RGBA8 color.
    pub fn solid(name: impl Into<String>, width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            format: TextureFormat::Rgba8Unorm,
            pixels: rgba.repeat((width * height) as usize),
        }
    }
}

/// A model ready to be added to the scene.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelImport {
    pub name: String,
    pub meshes: Vec<MeshData>,
    pub materials: Vec<MaterialData>,
    pub textures: Vec<TextureData>,
    pub layer: RenderLayer,
    /// World transform given to every item of the import.
    pub transform: Mat4,
}

impl ModelImport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            meshes: Vec::new(),
            materials: Vec::new(),
            textures: Vec::new(),
            layer: RenderLayer::Opaque,
            transform: Mat4::IDENTITY,
        }
    }

    /// Sky import: one unit sphere scaled to [`SKY_RADIUS`] and drawn by
    /// the environment pass as an item called [`SKY_ITEM_NAME`].
    pub fn environment(
        vertices: Vec<Vertex>,
        indices: Vec<u32>,
        material: MaterialData,
        cube_map: Option<TextureData>,
    ) -> Self {
        Self {
            name: SKY_ITEM_NAME.to_string(),
            meshes: vec![MeshData::new(SKY_ITEM_NAME, vertices, indices, 0)],
            materials: vec![material],
            textures: cube_map.into_iter().collect(),
            layer: RenderLayer::Environment,
            transform: Mat4::from_scale(Vec3::splat(SKY_RADIUS)),
        }
    }

    pub fn with_mesh(mut self, mesh: MeshData) -> Self {
        self.meshes.push(mesh);
        self
    }

    pub fn with_material(mut self, material: MaterialData) -> Self {
        self.materials.push(material);
        self
    }

    pub fn with_texture(mut self, texture: TextureData) -> Self {
        self.textures.push(texture);
        self
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    fn validate(&self) -> GraphicsResult<()> {
        let invalid = |msg: String| Err(GraphicsError::InvalidImport(format!("{}: {msg}", self.name)));

        if self.meshes.is_empty() {
            return invalid("no meshes".to_string());
        }
        for mesh in &self.meshes {
            if mesh.vertices.is_empty() || mesh.indices.is_empty() {
                return invalid(format!("mesh `{}` has no geometry", mesh.name));
            }
            if mesh.material >= self.materials.len() {
                return invalid(format!(
                    "mesh `{}` uses material {} of {}",
                    mesh.name,
                    mesh.material,
                    self.materials.len()
                ));
            }
            if let Some(&index) = mesh.indices.iter().find(|&&i| i as usize >= mesh.vertices.len()) {
                return invalid(format!("mesh `{}` indexes vertex {index} out of range", mesh.name));
            }
        }
        for material in &self.materials {
            if let Some(max) = material.textures.max_index() {
                if max as usize >= self.textures.len() {
                    return invalid(format!(
                        "material `{}` uses texture {max} of {}",
                        material.name,
                        self.textures.len()
                    ));
                }
            }
        }
        for texture in &self.textures {
            let expected = texture.width as usize * texture.height as usize * texture.format.bytes_per_pixel() as usize;
            if texture.width == 0 || texture.height == 0 || texture.pixels.len() != expected {
                return invalid(format!(
                    "texture `{}` has {} bytes, expected {expected}",
                    texture.name,
                    texture.pixels.len()
                ));
            }
        }
        Ok(())
    }
}

/// Table ranges an import was placed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub items: Range<usize>,
    pub materials: Range<usize>,
    pub textures: Range<u32>,
}

impl Scene {
    /// Upload a model and append it to the scene.
    ///
    /// Texture copies are recorded into `gpu`'s open command list. The
    /// returned staging buffers must stay alive until that list has
    /// executed.
    pub(crate) fn import(
        &mut self,
        gpu: &mut GpuContext,
        model: &ModelImport,
    ) -> GraphicsResult<(ImportSummary, Vec<BufferId>)> {
        model.validate()?;
        self.check_capacity(model.meshes.len(), model.materials.len(), model.textures.len())?;

        let texture_base = self.textures.len() as u32;
        let material_base = self.materials.len();
        let item_base = self.items.len();

        let mut staging = Vec::with_capacity(model.textures.len());
        for texture in &model.textures {
            staging.push(self.upload_texture(gpu, texture)?);
        }

        for material in &model.materials {
            self.add_material(Material {
                name: material.name.clone(),
                diffuse_albedo: material.diffuse_albedo,
                fresnel_r0: material.fresnel_r0,
                roughness: material.roughness,
                mat_transform: Mat4::IDENTITY,
                textures: material.textures.offset(texture_base),
            })?;
        }

        for data in &model.meshes {
            let mesh = upload_mesh(gpu, data)?;
            let index_count = mesh.index_count;
            let mesh = self.add_mesh(mesh);
            self.add_item(RenderItemDesc {
                name: data.name.clone(),
                mesh,
                material: material_base + data.material,
                index_count,
                start_index: 0,
                base_vertex: 0,
                topology: data.topology,
                layer: model.layer,
                world: model.transform,
                tex_transform: Mat4::IDENTITY,
            })?;
        }

        log::info!(
            "imported `{}`: {} items, {} materials, {} textures",
            model.name,
            model.meshes.len(),
            model.materials.len(),
            model.textures.len()
        );

        let summary = ImportSummary {
            items: item_base..self.items.len(),
            materials: material_base..self.materials.len(),
            textures: texture_base..self.textures.len() as u32,
        };
        Ok((summary, staging))
    }

    fn upload_texture(&mut self, gpu: &mut GpuContext, data: &TextureData) -> GraphicsResult<BufferId> {
        let texture = gpu.create_texture(
            &TextureDesc::new_2d(data.name.clone(), data.width, data.height, data.format)
                .with_usage(TextureUsage::SHADER_RESOURCE | TextureUsage::COPY_DST)
                .with_initial_state(ResourceState::CopyDest),
        )?;

        let upload = device_call!(gpu.backend().create_buffer(&BufferDesc::new(
            format!("{} upload", data.name),
            data.pixels.len() as u64,
            BufferUsage::UPLOAD | BufferUsage::COPY_SRC,
        )))?;
        device_call!(gpu.backend().write_buffer(upload, 0, &data.pixels))?;

        gpu.record(Command::CopyBufferToTexture {
            source: upload,
            destination: texture,
        })?;
        gpu.transition(texture, ResourceState::ShaderResource)?;
        self.add_texture(data.name.clone(), texture)?;
        Ok(upload)
    }
}

fn upload_mesh(gpu: &GpuContext, data: &MeshData) -> GraphicsResult<Mesh> {
    let vertex_bytes: &[u8] = bytemuck::cast_slice(&data.vertices);
    let index_bytes: &[u8] = bytemuck::cast_slice(&data.indices);

    let vertex_buffer = device_call!(gpu.backend().create_buffer(&BufferDesc::new(
        format!("{} vertices", data.name),
        vertex_bytes.len() as u64,
        BufferUsage::VERTEX | BufferUsage::UPLOAD,
    )))?;
    device_call!(gpu.backend().write_buffer(vertex_buffer, 0, vertex_bytes))?;

    let index_buffer = device_call!(gpu.backend().create_buffer(&BufferDesc::new(
        format!("{} indices", data.name),
        index_bytes.len() as u64,
        BufferUsage::INDEX | BufferUsage::UPLOAD,
    )))?;
    device_call!(gpu.backend().write_buffer(index_buffer, 0, index_bytes))?;

    Ok(Mesh {
        name: data.name.clone(),
        vertex_buffer,
        index_buffer,
        vertex_count: data.vertices.len() as u32,
        index_count: data.indices.len() as u32,
        vertex_stride: std::mem::size_of::<Vertex>() as u64,
        index_format: IndexFormat::Uint32,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::HeadlessBackend;
    use crate::pipeline::MaterialCaps;
    use crate::scene::SceneLimits;

    fn triangle(name: &str, material: usize) -> MeshData {
        let vertices = vec![
            Vertex::new(Vec3::ZERO, Vec3::Z, glam::Vec2::ZERO),
            Vertex::new(Vec3::X, Vec3::Z, glam::Vec2::X),
            Vertex::new(Vec3::Y, Vec3::Z, glam::Vec2::Y),
        ];
        MeshData::new(name, vertices, vec![0, 1, 2], material)
    }

    fn textured_model(name: &str) -> ModelImport {
        ModelImport::new(name)
            .with_texture(TextureData::solid("albedo", 2, 2, [255, 0, 0, 255]))
            .with_material(MaterialData::new("painted").with_textures(MaterialTextures {
                diffuse: Some(0),
                ..Default::default()
            }))
            .with_mesh(triangle(name, 0))
    }

    fn setup(max_textures: u32) -> (Arc<HeadlessBackend>, GpuContext, Scene) {
        let backend = Arc::new(HeadlessBackend::new());
        let gpu = GpuContext::new(backend.clone());
        let scene = Scene::new(SceneLimits {
            max_render_items: 8,
            max_textures,
            max_materials: 8,
        });
        (backend, gpu, scene)
    }

    #[test]
    fn test_imports_occupy_disjoint_ranges() {
        let (_backend, mut gpu, mut scene) = setup(8);
        let (first, _) = scene.import(&mut gpu, &textured_model("a")).unwrap();
        let (second, _) = scene.import(&mut gpu, &textured_model("b")).unwrap();

        assert_eq!(first.textures, 0..1);
        assert_eq!(second.textures, 1..2);
        assert_eq!(second.materials, 1..2);
        assert_eq!(scene.materials()[1].textures.diffuse, Some(1));
        assert_eq!(scene.item(1).unwrap().material, 1);
        assert_eq!(scene.item_caps(1), MaterialCaps::DIFFUSE);
    }

    #[test]
    fn test_texture_upload_is_recorded() {
        let (backend, mut gpu, mut scene) = setup(8);
        let (summary, staging) = scene.import(&mut gpu, &textured_model("a")).unwrap();
        assert_eq!(staging.len(), 1);

        let texture = scene.textures()[summary.textures.start as usize].texture;
        assert!(gpu
            .commands()
            .commands()
            .iter()
            .any(|c| matches!(c, Command::CopyBufferToTexture { destination, .. } if *destination == texture)));
        assert_eq!(gpu.tracker().state(texture), Some(ResourceState::ShaderResource));

        gpu.submit_and_flush().unwrap();
        assert_eq!(backend.texture_state(texture), Some(ResourceState::ShaderResource));
        assert_eq!(backend.buffer_contents(staging[0]).unwrap()[..4], [255, 0, 0, 255]);
    }

    #[test]
    fn test_capacity_checked_before_upload() {
        let (backend, mut gpu, mut scene) = setup(1);
        scene.import(&mut gpu, &textured_model("a")).unwrap();
        let buffers = backend.live_buffers();

        let err = scene.import(&mut gpu, &textured_model("b")).unwrap_err();
        assert!(matches!(err, GraphicsError::CapacityExceeded { what: "texture", .. }));
        assert_eq!(backend.live_buffers(), buffers);
        assert_eq!(scene.items().len(), 1);
    }

    #[test]
    fn test_invalid_references_are_rejected() {
        let (_backend, mut gpu, mut scene) = setup(8);
        let model = ModelImport::new("broken")
            .with_material(MaterialData::new("m"))
            .with_mesh(triangle("tri", 3));
        assert!(matches!(
            scene.import(&mut gpu, &model),
            Err(GraphicsError::InvalidImport(_))
        ));

        let mut short = textured_model("short");
        short.textures[0].pixels.truncate(3);
        assert!(matches!(
            scene.import(&mut gpu, &short),
            Err(GraphicsError::InvalidImport(_))
        ));
    }

    #[test]
    fn test_environment_import() {
        let (_backend, mut gpu, mut scene) = setup(8);
        let sky = triangle("unused", 0);
        let model = ModelImport::environment(sky.vertices, sky.indices, MaterialData::new("sky"), None);
        scene.import(&mut gpu, &model).unwrap();

        let item = scene.item(0).unwrap();
        assert_eq!(item.name, SKY_ITEM_NAME);
        assert_eq!(item.layer, RenderLayer::Environment);
        assert_eq!(item.world, Mat4::from_scale(Vec3::splat(SKY_RADIUS)));
    }
}
