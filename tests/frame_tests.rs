//! Frame orchestration tests against the headless backend.
//!
//! The headless backend rejects any command that uses a resource in the
//! wrong state, so every successful `render_frame` here also proves that the
//! recorded barriers match what each pass needs.

mod common;

use glam::{Mat4, Vec3};
use rstest::rstest;

use common::{box_model, channels, destroyed_textures, diffuse_box, TestContext, HEIGHT, WIDTH};
use lumen_frame::{
    BackendEvent, Command, DeviceStatus, GraphicsError, MaterialCaps, PassKind, QualityToggles,
    RendererConfig, ResourceId, ResourceState, VariantKey,
};

// ============================================================================
// End-to-end scenarios
// ============================================================================

#[test]
fn test_single_diffuse_item_builds_one_main_variant() {
    let mut ctx = TestContext::new();
    let summary = ctx.renderer.import(&diffuse_box("crate")).unwrap();
    let item = summary.items.start;

    let report = ctx.renderer.render_frame().unwrap();
    let main = report.pass(PassKind::Main).unwrap();

    let key = VariantKey::main(MaterialCaps::DIFFUSE);
    assert_eq!(main.misses, vec![key]);
    assert_eq!(main.draws.len(), 1);
    assert_eq!(main.draws[0].item, item);
    assert_eq!(main.draws[0].key, key);

    let cached = ctx.renderer.pipeline_cache().get(&key).unwrap();
    assert_eq!(main.draws[0].pipeline, cached.pipeline);

    // The draw is issued with that pipeline bound.
    let commands = ctx.backend.executed_commands();
    let bind = commands
        .iter()
        .position(|c| *c == Command::SetPipeline(cached.pipeline))
        .unwrap();
    let draw = commands[bind..]
        .iter()
        .position(|c| matches!(c, Command::DrawIndexed { index_count: 36, .. }));
    assert!(draw.is_some());
}

#[test]
fn test_enabling_msaa_builds_tagged_variants_and_resolves() {
    let mut ctx = TestContext::new();
    ctx.renderer.import(&diffuse_box("crate")).unwrap();

    let plain = ctx.renderer.render_frame().unwrap();
    assert!(!plain.resolved);

    ctx.renderer.set_msaa(true).unwrap();
    ctx.clear_events();
    let msaa = ctx.renderer.render_frame().unwrap();
    assert!(msaa.resolved);

    let plain_misses: Vec<VariantKey> = plain.passes.iter().flat_map(|p| p.misses.clone()).collect();
    let msaa_misses: Vec<VariantKey> = msaa.passes.iter().flat_map(|p| p.misses.clone()).collect();
    assert_eq!(plain_misses.len(), msaa_misses.len());
    for key in plain_misses {
        assert!(msaa_misses.contains(&key.with_toggles(QualityToggles::MSAA)), "{key}");
    }

    let resolves = ctx
        .backend
        .executed_commands()
        .iter()
        .filter(|c| matches!(c, Command::Resolve { .. }))
        .count();
    assert_eq!(resolves, 1);

    ctx.renderer.set_msaa(false).unwrap();
    ctx.clear_events();
    let back = ctx.renderer.render_frame().unwrap();
    assert!(!back.resolved);
    assert_eq!(back.cache_misses(), 0);
    assert!(!ctx
        .backend
        .executed_commands()
        .iter()
        .any(|c| matches!(c, Command::Resolve { .. })));
}

#[test]
fn test_resize_waits_before_releasing_back_buffers() {
    let mut ctx = TestContext::new();
    ctx.renderer.import(&diffuse_box("crate")).unwrap();
    ctx.renderer.render_frame().unwrap();
    let old_back_buffers = ctx.renderer.targets().back_buffers.clone();
    ctx.clear_events();

    ctx.renderer.resize(WIDTH * 2, HEIGHT * 2).unwrap();

    let events = ctx.backend.events();
    let first_wait = events
        .iter()
        .position(|e| matches!(e, BackendEvent::Waited(_)))
        .unwrap();
    let first_release = events
        .iter()
        .position(|e| matches!(e, BackendEvent::TextureDestroyed { .. }))
        .unwrap();
    assert!(first_wait < first_release);

    let destroyed = destroyed_textures(&ctx.backend);
    for old in &old_back_buffers {
        let (_, _, completed, signaled) = destroyed.iter().find(|(t, ..)| t == old).unwrap();
        assert_eq!(completed, signaled, "back buffer released while GPU work was pending");
    }

    let targets = ctx.renderer.targets();
    assert!(targets.back_buffers.iter().all(|b| !old_back_buffers.contains(b)));
    let desc = ctx.backend.texture_desc(targets.back_buffers[0]).unwrap();
    assert_eq!((desc.width, desc.height), (WIDTH * 2, HEIGHT * 2));
    assert_eq!(ctx.renderer.back_buffer_index(), 0);
    assert_eq!(ctx.renderer.viewport().width, (WIDTH * 2) as f32);

    ctx.renderer.render_frame().unwrap();
}

// ============================================================================
// Barrier symmetry
// ============================================================================

#[rstest]
#[case::single_sample(false)]
#[case::multisampled(true)]
fn test_borrowed_resources_return_to_starting_state(#[case] msaa: bool) {
    let mut ctx = TestContext::with_config(RendererConfig::default().with_msaa(msaa));
    ctx.renderer.import(&diffuse_box("crate")).unwrap();
    let report = ctx.renderer.render_frame().unwrap();

    let targets = ctx.renderer.targets().clone();
    let tracker = ctx.renderer.tracker();
    assert_eq!(
        tracker.history(targets.shadow),
        &[
            ResourceState::ShaderResource,
            ResourceState::DepthWrite,
            ResourceState::ShaderResource
        ]
    );
    assert_eq!(tracker.history(targets.depth), &[ResourceState::DepthWrite]);

    if msaa {
        assert_eq!(
            tracker.history(targets.msaa.unwrap()),
            &[
                ResourceState::ResolveSource,
                ResourceState::RenderTarget,
                ResourceState::ResolveSource
            ]
        );
        assert_eq!(
            tracker.history(report.back_buffer),
            &[
                ResourceState::Present,
                ResourceState::ResolveDest,
                ResourceState::Present
            ]
        );
    } else {
        assert!(targets.msaa.is_none());
        assert_eq!(
            tracker.history(report.back_buffer),
            &[
                ResourceState::Present,
                ResourceState::RenderTarget,
                ResourceState::Present
            ]
        );
    }

    // The emulated device agrees with the tracker.
    assert_eq!(ctx.backend.texture_state(targets.shadow), Some(ResourceState::ShaderResource));
    assert_eq!(ctx.backend.texture_state(report.back_buffer), Some(ResourceState::Present));
}

#[test]
fn test_depth_starts_common_and_is_transitioned() {
    let ctx = TestContext::new();
    let depth = ctx.renderer.targets().depth;
    let transitioned = ctx.backend.executed_commands().iter().any(|c| match c {
        Command::Barriers(barriers) => barriers.iter().any(|b| {
            b.resource == ResourceId::from(depth)
                && b.before == ResourceState::Common
                && b.after == ResourceState::DepthWrite
        }),
        _ => false,
    });
    assert!(transitioned);
}

// ============================================================================
// Grouping
// ============================================================================

#[test]
fn test_items_with_same_caps_share_one_variant() {
    let mut ctx = TestContext::new();
    for name in ["a", "b", "c"] {
        ctx.renderer.import(&diffuse_box(name)).unwrap();
    }
    ctx.renderer
        .import(&box_model("normal mapped", channels(false, true, false)))
        .unwrap();
    ctx.renderer.import(&diffuse_box("d")).unwrap();

    let report = ctx.renderer.render_frame().unwrap();
    for pass in [PassKind::Main, PassKind::Shadow] {
        let pass = report.pass(pass).unwrap();
        assert_eq!(pass.misses.len(), 2);
        assert_eq!(pass.draws.len(), 5);

        let diffuse: Vec<_> = pass
            .draws
            .iter()
            .filter(|d| d.key.caps == MaterialCaps::DIFFUSE)
            .collect();
        assert_eq!(diffuse.len(), 4);
        assert!(diffuse.iter().all(|d| d.pipeline == diffuse[0].pipeline));

        // Each group is drawn contiguously.
        let switches = pass
            .draws
            .windows(2)
            .filter(|w| w[0].pipeline != w[1].pipeline)
            .count();
        assert_eq!(switches, 1);
    }
}

#[test]
fn test_second_frame_hits_the_cache() {
    let mut ctx = TestContext::new();
    ctx.renderer.import(&diffuse_box("crate")).unwrap();
    let first = ctx.renderer.render_frame().unwrap();
    let second = ctx.renderer.render_frame().unwrap();

    assert_eq!(first.cache_misses(), 3);
    assert_eq!(second.cache_misses(), 0);
    assert_eq!(first.draw_count(), second.draw_count());
    assert_eq!(ctx.backend.pipelines_created(), 3);
}

#[rstest]
#[case::masked(channels(true, false, true), MaterialCaps::DIFFUSE | MaterialCaps::MASK)]
#[case::plain(channels(false, false, false), MaterialCaps::empty())]
#[case::normal(channels(true, true, false), MaterialCaps::DIFFUSE | MaterialCaps::NORMAL)]
fn test_variant_caps_follow_material(
    #[case] textures: lumen_frame::MaterialTextures,
    #[case] caps: MaterialCaps,
) {
    let mut ctx = TestContext::new();
    ctx.renderer.import(&box_model("item", textures)).unwrap();
    let report = ctx.renderer.render_frame().unwrap();
    assert_eq!(report.pass(PassKind::Main).unwrap().misses, vec![VariantKey::main(caps)]);
}

#[test]
fn test_wireframe_toggle_is_a_distinct_variant() {
    let mut ctx = TestContext::new();
    ctx.renderer.import(&diffuse_box("crate")).unwrap();
    ctx.renderer.render_frame().unwrap();

    ctx.renderer.set_wireframe(true).unwrap();
    let report = ctx.renderer.render_frame().unwrap();
    let main = report.pass(PassKind::Main).unwrap();
    assert_eq!(
        main.misses,
        vec![VariantKey::main(MaterialCaps::DIFFUSE).with_toggles(QualityToggles::WIREFRAME)]
    );
}

// ============================================================================
// Presentation and lifetime
// ============================================================================

#[test]
fn test_back_buffers_alternate() {
    let mut ctx = TestContext::new();
    let back_buffers = ctx.renderer.targets().back_buffers.clone();

    let presented: Vec<_> = (0..4)
        .map(|_| ctx.renderer.render_frame().unwrap().back_buffer)
        .collect();
    assert_eq!(
        presented,
        vec![back_buffers[0], back_buffers[1], back_buffers[0], back_buffers[1]]
    );
}

#[test]
fn test_every_frame_is_flushed() {
    let mut ctx = TestContext::new();
    for _ in 0..3 {
        let report = ctx.renderer.render_frame().unwrap();
        assert!(ctx.renderer.fence().last_signaled() > report.fence_value);
        assert!(ctx.renderer.gpu().is_idle());
    }
}

#[test]
fn test_device_removal_surfaces_as_fault() {
    let mut ctx = TestContext::new();
    ctx.renderer.render_frame().unwrap();
    ctx.backend.simulate_device_removed();

    match ctx.renderer.render_frame() {
        Err(GraphicsError::DeviceFault { status, call, .. }) => {
            assert_eq!(status, DeviceStatus::DeviceRemoved);
            assert!(!call.is_empty());
        }
        other => panic!("expected a device fault, got {other:?}"),
    }
}

#[test]
fn test_capacity_exceeded_on_import() {
    let mut ctx = TestContext::with_config(RendererConfig::default().with_capacity(2, 8));
    ctx.renderer.import(&diffuse_box("first")).unwrap();
    let err = ctx.renderer.import(&diffuse_box("second")).unwrap_err();
    assert!(matches!(
        err,
        GraphicsError::CapacityExceeded {
            what: "render item",
            capacity: 2
        }
    ));
    assert_eq!(ctx.renderer.scene().items().len(), 2);
}

#[test]
fn test_set_transform_by_name() {
    let mut ctx = TestContext::new();
    ctx.renderer.import(&diffuse_box("crate")).unwrap();
    let world = Mat4::from_translation(Vec3::new(0.0, 3.0, 0.0));

    assert_eq!(ctx.renderer.set_transform("crate", world).unwrap(), 1);
    let index = ctx.renderer.scene().items_named("crate")[0];
    assert_eq!(ctx.renderer.scene().item(index).unwrap().world, world);
    assert!(matches!(
        ctx.renderer.set_transform("missing", world),
        Err(GraphicsError::UnknownRenderItem(_))
    ));
    ctx.renderer.render_frame().unwrap();
}

#[test]
fn test_shader_override_failure_is_reported() {
    let dir = std::env::temp_dir().join(format!("lumen-frame-overrides-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("shadow.glsl"), "#version 450\nvoid main() { not glsl }\n").unwrap();

    let mut ctx = TestContext::with_config(RendererConfig::default().with_shader_dir(&dir));
    ctx.renderer.import(&diffuse_box("crate")).unwrap();
    let err = ctx.renderer.render_frame().unwrap_err();
    assert!(matches!(err, GraphicsError::ShaderCompilation { .. }));
    assert!(ctx.renderer.pipeline_cache().is_empty());

    std::fs::remove_dir_all(&dir).unwrap();
}
