//! Structured pipeline variant keys.

use std::fmt;

use bitflags::bitflags;

/// Which pass a pipeline variant renders in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PassKind {
    /// Lit color pass into the main target.
    Main,
    /// Depth-only pass into the shadow map.
    Shadow,
    /// Sky pass drawn after opaque geometry.
    Environment,
}

impl PassKind {
    pub const ALL: [PassKind; 3] = [PassKind::Main, PassKind::Shadow, PassKind::Environment];

    /// Program compiled for variants of this pass.
    pub fn program(self) -> &'static str {
        match self {
            PassKind::Main => "lit.glsl",
            PassKind::Shadow => "shadow.glsl",
            PassKind::Environment => "environment.glsl",
        }
    }

    fn index(self) -> u32 {
        match self {
            PassKind::Main => 0,
            PassKind::Shadow => 1,
            PassKind::Environment => 2,
        }
    }

    fn from_index(index: u32) -> Option<Self> {
        match index {
            0 => Some(PassKind::Main),
            1 => Some(PassKind::Shadow),
            2 => Some(PassKind::Environment),
            _ => None,
        }
    }
}

bitflags! {
    /// Optional texture channels a material provides.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
    pub struct MaterialCaps: u32 {
        const DIFFUSE = 1 << 0;
        const NORMAL = 1 << 1;
        const BUMP = 1 << 2;
        const ROUGHNESS = 1 << 3;
        const SHININESS = 1 << 4;
        const SPECULAR = 1 << 5;
        /// Alpha-tested material.
        const MASK = 1 << 6;
    }
}

impl MaterialCaps {
    /// Preprocessor defines enabling each present channel.
    pub fn defines(self) -> Vec<&'static str> {
        const DEFINES: [(MaterialCaps, &str); 7] = [
            (MaterialCaps::DIFFUSE, "HAS_DIFFUSE_TEXTURE"),
            (MaterialCaps::NORMAL, "HAS_NORMAL_TEXTURE"),
            (MaterialCaps::BUMP, "HAS_BUMP_TEXTURE"),
            (MaterialCaps::ROUGHNESS, "HAS_ROUGHNESS_TEXTURE"),
            (MaterialCaps::SHININESS, "HAS_SHININESS_TEXTURE"),
            (MaterialCaps::SPECULAR, "HAS_SPECULAR_TEXTURE"),
            (MaterialCaps::MASK, "HAS_MASK_TEXTURE"),
        ];
        DEFINES
            .iter()
            .filter(|(cap, _)| self.contains(*cap))
            .map(|&(_, define)| define)
            .collect()
    }
}

bitflags! {
    /// Frame-wide render quality switches overlaid on every key.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
    pub struct QualityToggles: u32 {
        const WIREFRAME = 1 << 0;
        const MSAA = 1 << 1;
    }
}

const TOGGLE_BITS: u32 = 2;
const PASS_BITS: u32 = 2;
const PASS_SHIFT: u32 = TOGGLE_BITS;
const CAPS_SHIFT: u32 = TOGGLE_BITS + PASS_BITS;

/// Identity of a pipeline variant.
///
/// Two keys select the same cached pipeline only if the pass, every
/// capability bit and every toggle match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariantKey {
    pub pass: PassKind,
    pub caps: MaterialCaps,
    pub toggles: QualityToggles,
}

impl VariantKey {
    pub fn new(pass: PassKind, caps: MaterialCaps, toggles: QualityToggles) -> Self {
        Self {
            pass,
            caps,
            toggles,
        }
    }

    pub fn main(caps: MaterialCaps) -> Self {
        Self::new(PassKind::Main, caps, QualityToggles::empty())
    }

    pub fn shadow(caps: MaterialCaps) -> Self {
        Self::new(PassKind::Shadow, caps, QualityToggles::empty())
    }

    pub fn environment(caps: MaterialCaps) -> Self {
        Self::new(PassKind::Environment, caps, QualityToggles::empty())
    }

    pub fn with_toggles(self, toggles: QualityToggles) -> Self {
        Self { toggles, ..self }
    }

    /// Compact packing used in labels and logs.
    ///
    /// Layout: toggles in bits 0-1, pass in bits 2-3, capabilities from bit 4.
    pub fn bits(self) -> u32 {
        self.toggles.bits()
            | (self.pass.index() << PASS_SHIFT)
            | (self.caps.bits() << CAPS_SHIFT)
    }

    /// Inverse of [`bits`](Self::bits). Returns `None` for packings that
    /// no key produces.
    pub fn from_bits(bits: u32) -> Option<Self> {
        let toggles = QualityToggles::from_bits(bits & ((1 << TOGGLE_BITS) - 1))?;
        let pass = PassKind::from_index((bits >> PASS_SHIFT) & ((1 << PASS_BITS) - 1))?;
        let caps = MaterialCaps::from_bits(bits >> CAPS_SHIFT)?;
        Some(Self::new(pass, caps, toggles))
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.pass)?;
        for (name, _) in self.caps.iter_names() {
            write!(f, "+{}", name.to_lowercase())?;
        }
        for (name, _) in self.toggles.iter_names() {
            write!(f, "+{}", name.to_lowercase())?;
        }
        write!(f, " (0x{:03x})", self.bits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defines_follow_caps() {
        let caps = MaterialCaps::DIFFUSE | MaterialCaps::MASK;
        assert_eq!(caps.defines(), vec!["HAS_DIFFUSE_TEXTURE", "HAS_MASK_TEXTURE"]);
        assert!(MaterialCaps::empty().defines().is_empty());
    }

    #[test]
    fn test_bits_round_trip_for_every_key() {
        let mut seen = std::collections::HashSet::new();
        for pass in PassKind::ALL {
            for caps in 0..=MaterialCaps::all().bits() {
                for toggles in 0..=QualityToggles::all().bits() {
                    let key = VariantKey::new(
                        pass,
                        MaterialCaps::from_bits_truncate(caps),
                        QualityToggles::from_bits_truncate(toggles),
                    );
                    assert_eq!(VariantKey::from_bits(key.bits()), Some(key));
                    assert!(seen.insert(key.bits()));
                }
            }
        }
    }

    #[test]
    fn test_invalid_pass_bits_rejected() {
        assert_eq!(VariantKey::from_bits(3 << PASS_SHIFT), None);
    }

    #[test]
    fn test_display() {
        let key = VariantKey::main(MaterialCaps::DIFFUSE).with_toggles(QualityToggles::MSAA);
        let text = key.to_string();
        assert!(text.starts_with("Main+diffuse+msaa"));
    }
}
