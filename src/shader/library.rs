//! Built-in shader sources.
//!
//! Top-level programs are selected by pass kind; `common.glsl` holds the
//! constant block layouts shared by all of them and is pulled in with
//! `#include`.

/// Shared constant layouts and lighting helpers.
pub const COMMON_GLSL: &str = include_str!("glsl/common.glsl");

/// Forward lit program for the main pass.
pub const LIT_GLSL: &str = include_str!("glsl/lit.glsl");

/// Depth-only program for the shadow pass.
pub const SHADOW_GLSL: &str = include_str!("glsl/shadow.glsl");

/// Sky program for the environment pass.
pub const ENVIRONMENT_GLSL: &str = include_str!("glsl/environment.glsl");

/// A named collection of shader sources.
#[derive(Debug, Clone, Default)]
pub struct ShaderLibrary {
    programs: Vec<(&'static str, &'static str)>,
    includes: Vec<(&'static str, &'static str)>,
}

impl ShaderLibrary {
    /// The programs and includes shipped with the crate.
    pub fn builtin() -> Self {
        Self {
            programs: vec![
                ("lit.glsl", LIT_GLSL),
                ("shadow.glsl", SHADOW_GLSL),
                ("environment.glsl", ENVIRONMENT_GLSL),
            ],
            includes: vec![("common.glsl", COMMON_GLSL)],
        }
    }

    pub fn programs(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.programs.iter().copied()
    }

    pub fn includes(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.includes.iter().copied()
    }
}
