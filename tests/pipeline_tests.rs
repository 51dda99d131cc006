//! Pipeline variant building against the built-in programs.

mod common;

use rstest::rstest;

use lumen_frame::pipeline::{MsaaSettings, TargetFormats};
use lumen_frame::{
    HeadlessBackend, MaterialCaps, PassKind, PipelineCache, QualityToggles, ShaderComposer,
    TextureFormat, VariantKey,
};

fn cache() -> PipelineCache {
    PipelineCache::new(
        TargetFormats {
            color: TextureFormat::Rgba8Unorm,
            depth: TextureFormat::Depth24UnormStencil8,
            shadow: TextureFormat::Depth24UnormStencil8,
        },
        MsaaSettings {
            sample_count: 4,
            quality_levels: 4,
        },
    )
}

// ============================================================================
// Every variant the renderer can request compiles
// ============================================================================

#[rstest]
#[case::main_plain(PassKind::Main, MaterialCaps::empty(), QualityToggles::empty())]
#[case::main_every_channel(PassKind::Main, MaterialCaps::all(), QualityToggles::empty())]
#[case::main_all_toggles(PassKind::Main, MaterialCaps::DIFFUSE | MaterialCaps::NORMAL, QualityToggles::all())]
#[case::shadow_opaque(PassKind::Shadow, MaterialCaps::DIFFUSE, QualityToggles::empty())]
#[case::shadow_masked(PassKind::Shadow, MaterialCaps::DIFFUSE | MaterialCaps::MASK, QualityToggles::WIREFRAME)]
#[case::environment_plain(PassKind::Environment, MaterialCaps::empty(), QualityToggles::MSAA)]
#[case::environment_textured(PassKind::Environment, MaterialCaps::DIFFUSE, QualityToggles::empty())]
fn test_variant_builds(#[case] pass: PassKind, #[case] caps: MaterialCaps, #[case] toggles: QualityToggles) {
    common::init_logging();
    let backend = HeadlessBackend::new();
    let shaders = ShaderComposer::with_builtin();
    let mut cache = cache();

    let key = VariantKey::new(pass, caps, toggles);
    let lookup = cache.get_or_build(key, &backend, &shaders).unwrap();
    assert!(lookup.built);

    let variant = cache.get(&key).unwrap();
    assert_eq!(variant.key, key);
    assert_eq!(variant.pipeline, lookup.pipeline);
    assert_eq!(backend.pipelines_created(), 1);
}

// ============================================================================
// Key identity
// ============================================================================

#[test]
fn test_distinct_keys_get_distinct_pipelines() {
    let backend = HeadlessBackend::new();
    let shaders = ShaderComposer::with_builtin();
    let mut cache = cache();

    let keys = [
        VariantKey::main(MaterialCaps::DIFFUSE),
        VariantKey::main(MaterialCaps::DIFFUSE | MaterialCaps::NORMAL),
        VariantKey::shadow(MaterialCaps::DIFFUSE),
        VariantKey::main(MaterialCaps::DIFFUSE).with_toggles(QualityToggles::MSAA),
        VariantKey::main(MaterialCaps::DIFFUSE).with_toggles(QualityToggles::WIREFRAME),
    ];
    let pipelines: Vec<_> = keys
        .iter()
        .map(|key| cache.get_or_build(*key, &backend, &shaders).unwrap().pipeline)
        .collect();

    for (i, a) in pipelines.iter().enumerate() {
        for b in &pipelines[i + 1..] {
            assert_ne!(a, b);
        }
    }
    assert_eq!(cache.len(), keys.len());
    assert_eq!(cache.misses(), keys.len() as u64);
}

#[rstest]
#[case::main(VariantKey::main(MaterialCaps::DIFFUSE))]
#[case::shadow_masked(VariantKey::shadow(MaterialCaps::DIFFUSE | MaterialCaps::MASK))]
#[case::environment_msaa(VariantKey::environment(MaterialCaps::empty()).with_toggles(QualityToggles::MSAA))]
fn test_repeated_lookup_is_stable(#[case] key: VariantKey) {
    let backend = HeadlessBackend::new();
    let shaders = ShaderComposer::with_builtin();
    let mut cache = cache();

    let first = cache.get_or_build(key, &backend, &shaders).unwrap();
    for _ in 0..3 {
        let again = cache.get_or_build(key, &backend, &shaders).unwrap();
        assert!(!again.built);
        assert_eq!(again.pipeline, first.pipeline);
    }
    assert_eq!(cache.hits(), 3);
    assert_eq!(cache.misses(), 1);
    assert_eq!(backend.pipelines_created(), 1);
}
