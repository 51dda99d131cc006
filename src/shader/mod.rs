//! Shader composition and compilation.
//!
//! Programs are GLSL files containing both stages behind `#ifdef VERTEX` /
//! `#ifdef FRAGMENT` blocks. The [`ShaderComposer`] resolves `#include`
//! directives, defines the stage macro plus any capability defines, parses
//! the result with naga, validates it and emits SPIR-V.
//!
//! # Example
//!
//! ```ignore
//! use lumen_frame::shader::{ShaderComposer, ShaderStage};
//!
//! let composer = ShaderComposer::with_builtin();
//! let vs = composer.compile("lit.glsl", ShaderStage::Vertex, &["HAS_DIFFUSE_TEXTURE"])?;
//! ```

pub mod library;

use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::error::{GraphicsError, GraphicsResult};

pub use library::ShaderLibrary;

/// Programmable stage of a render pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    fn define(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "VERTEX",
            ShaderStage::Fragment => "FRAGMENT",
        }
    }

    fn to_naga(self) -> naga::ShaderStage {
        match self {
            ShaderStage::Vertex => naga::ShaderStage::Vertex,
            ShaderStage::Fragment => naga::ShaderStage::Fragment,
        }
    }
}

/// A validated program for one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledShader {
    pub name: String,
    pub stage: ShaderStage,
    pub defines: Vec<String>,
    pub spirv: Vec<u32>,
}

/// Shader composer with `#include` resolution and SPIR-V output.
pub struct ShaderComposer {
    /// Compilable programs: name -> source text.
    programs: HashMap<String, String>,
    /// Registered include sources: path -> source text.
    includes: HashMap<String, String>,
}

impl Default for ShaderComposer {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderComposer {
    pub fn new() -> Self {
        Self {
            programs: HashMap::new(),
            includes: HashMap::new(),
        }
    }

    /// Create a composer with the built-in programs registered.
    pub fn with_builtin() -> Self {
        let mut composer = Self::new();
        composer.add_library(&ShaderLibrary::builtin());
        composer
    }

    pub fn add_library(&mut self, library: &ShaderLibrary) {
        for (name, source) in library.programs() {
            self.register_program(name, source);
        }
        for (path, source) in library.includes() {
            self.register_include(path, source);
        }
    }

    pub fn register_program(&mut self, name: &str, source: &str) {
        self.programs.insert(name.to_string(), source.to_string());
    }

    /// Register a single include source.
    ///
    /// The path is what appears in `#include "path"` directives.
    pub fn register_include(&mut self, path: &str, source: &str) {
        self.includes.insert(path.to_string(), source.to_string());
    }

    pub fn has_program(&self, name: &str) -> bool {
        self.programs.contains_key(name)
    }

    /// Replace registered programs and includes with `.glsl` files found in
    /// `dir`. Files whose names match neither are ignored.
    ///
    /// Returns the number of sources replaced.
    pub fn load_overrides(&mut self, dir: &Path) -> GraphicsResult<usize> {
        let io_error = |source| GraphicsError::ShaderIo {
            path: dir.to_path_buf(),
            source,
        };

        let mut replaced = 0;
        for entry in std::fs::read_dir(dir).map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("glsl") {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };
            let target = if self.programs.contains_key(&name) {
                &mut self.programs
            } else if self.includes.contains_key(&name) {
                &mut self.includes
            } else {
                log::warn!("ignoring unknown shader override {}", path.display());
                continue;
            };

            let source = std::fs::read_to_string(&path).map_err(|source| GraphicsError::ShaderIo {
                path: path.clone(),
                source,
            })?;
            log::info!("using shader override {}", path.display());
            target.insert(name, source);
            replaced += 1;
        }
        Ok(replaced)
    }

    /// Compile a registered program for one stage with the given defines.
    pub fn compile(
        &self,
        name: &str,
        stage: ShaderStage,
        defines: &[&str],
    ) -> GraphicsResult<CompiledShader> {
        let source = self
            .programs
            .get(name)
            .ok_or_else(|| GraphicsError::ShaderNotFound(name.to_string()))?;

        let module = self.compose_to_naga(name, source, stage, defines)?;
        let spirv = emit_spirv(name, &module, stage)?;
        log::debug!(
            "compiled {name} ({stage:?}) with [{}] to {} words",
            defines.join(", "),
            spirv.len()
        );

        Ok(CompiledShader {
            name: name.to_string(),
            stage,
            defines: defines.iter().map(|d| d.to_string()).collect(),
            spirv,
        })
    }

    /// Compose a GLSL program and return the raw naga module.
    pub fn compose_to_naga(
        &self,
        name: &str,
        source: &str,
        stage: ShaderStage,
        defines: &[&str],
    ) -> GraphicsResult<naga::Module> {
        let mut included = HashSet::new();
        let resolved = self.resolve_includes(name, source, &mut included)?;

        let mut naga_defines = naga::FastHashMap::default();
        naga_defines.insert(stage.define().to_string(), String::new());
        for define in defines {
            naga_defines.insert(define.to_string(), String::new());
        }

        let options = naga::front::glsl::Options {
            stage: stage.to_naga(),
            defines: naga_defines,
        };

        let mut frontend = naga::front::glsl::Frontend::default();
        frontend
            .parse(&options, &resolved)
            .map_err(|errors| GraphicsError::ShaderCompilation {
                name: name.to_string(),
                diagnostics: format!("GLSL parse error:\n{errors}"),
            })
    }

    /// Resolve `#include "path"` directives recursively.
    fn resolve_includes(
        &self,
        name: &str,
        source: &str,
        included: &mut HashSet<String>,
    ) -> GraphicsResult<String> {
        let mut result = String::with_capacity(source.len());

        for line in source.lines() {
            if let Some(path) = parse_include_directive(line.trim()) {
                if !included.insert(path.to_string()) {
                    continue;
                }
                let include_source =
                    self.includes
                        .get(path)
                        .ok_or_else(|| GraphicsError::IncludeNotFound {
                            shader: name.to_string(),
                            include: path.to_string(),
                        })?;
                let resolved = self.resolve_includes(name, include_source, included)?;
                result.push_str(&resolved);
            } else {
                result.push_str(line);
            }
            result.push('\n');
        }

        Ok(result)
    }
}

fn emit_spirv(name: &str, module: &naga::Module, stage: ShaderStage) -> GraphicsResult<Vec<u32>> {
    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    let info = validator
        .validate(module)
        .map_err(|err| GraphicsError::ShaderCompilation {
            name: name.to_string(),
            diagnostics: format!("validation error: {err}"),
        })?;

    let pipeline_options = naga::back::spv::PipelineOptions {
        shader_stage: stage.to_naga(),
        entry_point: "main".to_string(),
    };
    naga::back::spv::write_vec(
        module,
        &info,
        &naga::back::spv::Options::default(),
        Some(&pipeline_options),
    )
    .map_err(|err| GraphicsError::ShaderCompilation {
        name: name.to_string(),
        diagnostics: format!("SPIR-V generation error: {err}"),
    })
}

/// Parse a `#include "path"` directive, returning the path if found.
fn parse_include_directive(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("#include")?.trim();
    if let Some(inner) = rest.strip_prefix('"') {
        inner.strip_suffix('"')
    } else if let Some(inner) = rest.strip_prefix('<') {
        inner.strip_suffix('>')
    } else {
        None
    }
}
