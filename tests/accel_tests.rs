//! Acceleration structure building through the renderer.

mod common;

use glam::{Mat4, Vec3};

use common::{diffuse_box, TestContext};
use lumen_frame::{Command, InstanceDesc, RenderLayer};

fn instances(ctx: &TestContext) -> Vec<InstanceDesc> {
    let top = ctx.renderer.acceleration_structures().top().unwrap();
    let bytes = ctx.backend.buffer_contents(top.instances).unwrap();
    bytes
        .chunks_exact(std::mem::size_of::<InstanceDesc>())
        .take(top.instance_count as usize)
        .map(bytemuck::pod_read_unaligned)
        .collect()
}

#[test]
fn test_build_covers_opaque_items() {
    let mut ctx = TestContext::new();
    ctx.renderer.import(&diffuse_box("left")).unwrap();
    ctx.renderer.import(&diffuse_box("right")).unwrap();

    ctx.renderer.build_acceleration_structures().unwrap();
    assert!(ctx.renderer.gpu().is_idle());

    let accel = ctx.renderer.acceleration_structures();
    let scene = ctx.renderer.scene();
    assert_eq!(accel.bottom_count(), 2);
    assert_eq!(accel.top_builds(), 1);

    let opaque: Vec<_> = scene
        .items()
        .iter()
        .filter(|item| item.layer == RenderLayer::Opaque)
        .collect();
    let descs = instances(&ctx);
    assert_eq!(descs.len(), opaque.len());
    for (desc, item) in descs.iter().zip(&opaque) {
        assert_eq!(desc.instance_id(), item.object_slot);
        assert_eq!(desc.blas_address, accel.bottom(item.mesh).unwrap().address);
    }

    // The sky lives in the environment layer and has no bottom level.
    let sky = scene.item(0).unwrap();
    assert_eq!(sky.layer, RenderLayer::Environment);
    assert!(accel.bottom(sky.mesh).is_none());
}

#[test]
fn test_builds_are_followed_by_uav_barriers() {
    let mut ctx = TestContext::new();
    ctx.renderer.import(&diffuse_box("crate")).unwrap();
    ctx.clear_events();
    ctx.renderer.build_acceleration_structures().unwrap();

    let commands = ctx.backend.executed_commands();
    let builds: Vec<_> = commands
        .iter()
        .enumerate()
        .filter_map(|(i, c)| match c {
            Command::BuildAccelerationStructure { result, .. } => Some((i, *result)),
            _ => None,
        })
        .collect();
    assert_eq!(builds.len(), 2);
    for (index, result) in builds {
        assert_eq!(commands[index + 1], Command::UavBarrier(result.into()));
    }
}

#[test]
fn test_refresh_rebuilds_top_level_only() {
    let mut ctx = TestContext::new();
    ctx.renderer.import(&diffuse_box("crate")).unwrap();
    ctx.renderer.build_acceleration_structures().unwrap();
    let first_top = *ctx.renderer.acceleration_structures().top().unwrap();

    assert_eq!(ctx.renderer.refresh_acceleration_structures().unwrap(), None);

    let world = Mat4::from_translation(Vec3::new(4.0, 0.0, -2.0));
    ctx.renderer.set_transform("crate", world).unwrap();
    assert!(ctx.renderer.refresh_acceleration_structures().unwrap().is_some());

    let accel = ctx.renderer.acceleration_structures();
    assert_eq!(accel.top_builds(), 2);
    assert_eq!(accel.bottom_count(), 1);
    assert_ne!(accel.top().unwrap().structure.result, first_top.structure.result);

    let descs = instances(&ctx);
    assert_eq!(descs[0].transform[0][3], 4.0);
    assert_eq!(descs[0].transform[2][3], -2.0);

    // The previous top level was released once the GPU was idle.
    assert!(ctx.backend.buffer_contents(first_top.instances).is_none());
}

#[test]
fn test_refresh_builds_missing_bottom_levels() {
    let mut ctx = TestContext::new();
    ctx.renderer.import(&diffuse_box("first")).unwrap();
    ctx.renderer.build_acceleration_structures().unwrap();

    ctx.renderer.import(&diffuse_box("second")).unwrap();
    ctx.renderer.refresh_acceleration_structures().unwrap().unwrap();

    let accel = ctx.renderer.acceleration_structures();
    assert_eq!(accel.bottom_count(), 2);
    assert_eq!(accel.top().unwrap().instance_count, 2);
}

#[test]
fn test_refresh_before_first_build_does_nothing() {
    let mut ctx = TestContext::new();
    ctx.renderer.import(&diffuse_box("crate")).unwrap();
    assert_eq!(ctx.renderer.refresh_acceleration_structures().unwrap(), None);
    assert!(ctx.renderer.acceleration_structures().top().is_none());
}

#[test]
fn test_frames_render_after_build() {
    let mut ctx = TestContext::new();
    ctx.renderer.import(&diffuse_box("crate")).unwrap();
    ctx.renderer.build_acceleration_structures().unwrap();
    let report = ctx.renderer.render_frame().unwrap();
    assert_eq!(report.draw_count(), 3);
}
