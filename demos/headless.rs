//! Headless frame loop.
//!
//! Drives the renderer on the headless backend through the same event
//! router a windowed application would use, and logs what each frame did.
//!
//! # Usage
//!
//! ```bash
//! # Ten frames at 1280x720
//! cargo run --example headless
//!
//! # MSAA on, wireframe toggled at frame 3, resize at frame 5
//! cargo run --example headless -- --msaa --wireframe-at 3 --resize-at 5
//! ```

use std::sync::Arc;

use clap::Parser;
use glam::{Mat4, Vec3};

use lumen_frame::constants::Light;
use lumen_frame::scene::{generate_box, generate_sphere};
use lumen_frame::{
    report_fatal, EventRouter, FrameRenderer, GraphicsResult, HeadlessBackend, MaterialData,
    MaterialTextures, ModelImport, PassConstants, PlatformEvent, RendererConfig, TextureData,
};

/// Headless Lumen Frame demo.
#[derive(Parser, Debug)]
#[command(name = "headless", about = "Render frames on the headless backend", version)]
struct Args {
    /// Number of frames to render.
    #[arg(long, default_value = "10")]
    frames: u64,

    /// Output width in pixels.
    #[arg(long, default_value = "1280")]
    width: u32,

    /// Output height in pixels.
    #[arg(long, default_value = "720")]
    height: u32,

    /// Start with 4x MSAA.
    #[arg(long)]
    msaa: bool,

    /// Toggle wireframe before this frame.
    #[arg(long)]
    wireframe_at: Option<u64>,

    /// Double the output size before this frame.
    #[arg(long)]
    resize_at: Option<u64>,

    /// Directory with `.glsl` shader overrides.
    #[arg(long)]
    shaders: Option<std::path::PathBuf>,
}

fn scene_models() -> Vec<ModelImport> {
    let floor = ModelImport::new("floor")
        .with_material(MaterialData::new("stone"))
        .with_mesh(generate_box("floor", Vec3::new(10.0, 0.1, 10.0), 0))
        .with_transform(Mat4::from_translation(Vec3::new(0.0, -1.0, 0.0)));

    let crate_textures = MaterialTextures {
        diffuse: Some(0),
        ..Default::default()
    };
    let crate_box = ModelImport::new("crate")
        .with_texture(TextureData::solid("crate diffuse", 8, 8, [180, 130, 70, 255]))
        .with_material(MaterialData::new("wood").with_textures(crate_textures))
        .with_mesh(generate_box("crate", Vec3::ONE, 0));

    let ball = ModelImport::new("ball")
        .with_material(MaterialData::new("metal"))
        .with_mesh(generate_sphere("ball", 0.75, 24, 16, 0))
        .with_transform(Mat4::from_translation(Vec3::new(2.5, 0.0, 0.0)));

    vec![floor, crate_box, ball]
}

fn pass_constants(width: u32, height: u32) -> (PassConstants, PassConstants) {
    let eye = Vec3::new(0.0, 4.0, -10.0);
    let aspect = width as f32 / height.max(1) as f32;
    let mut main = PassConstants::default();
    main.set_camera(
        Mat4::look_at_lh(eye, Vec3::ZERO, Vec3::Y),
        Mat4::perspective_lh(std::f32::consts::FRAC_PI_4, aspect, 1.0, 1000.0),
        eye,
    );
    let light_dir = Vec3::new(0.57, -0.57, 0.57);
    main.lights[0] = Light::directional(light_dir, Vec3::splat(0.9));

    let light_eye = -light_dir * 20.0;
    let light_view = Mat4::look_at_lh(light_eye, Vec3::ZERO, Vec3::Y);
    let light_proj = Mat4::orthographic_lh(-15.0, 15.0, -15.0, 15.0, 1.0, 40.0);
    let mut shadow = PassConstants::default();
    shadow.set_camera(light_view, light_proj, light_eye);
    main.shadow_transform = light_proj * light_view;

    (main, shadow)
}

fn run(args: &Args) -> GraphicsResult<()> {
    let backend = Arc::new(HeadlessBackend::new());
    let mut config = RendererConfig::default()
        .with_size(args.width, args.height)
        .with_msaa(args.msaa);
    if let Some(dir) = &args.shaders {
        config = config.with_shader_dir(dir);
    }

    let mut renderer = FrameRenderer::new(backend.clone(), config)?;
    for model in scene_models() {
        let summary = renderer.import(&model)?;
        log::info!("imported `{}`: items {:?}", model.name, summary.items);
    }
    let (main, shadow) = pass_constants(args.width, args.height);
    renderer.set_main_pass_constants(main);
    renderer.set_shadow_pass_constants(shadow);
    renderer.build_acceleration_structures()?;

    let mut router = EventRouter::new(renderer);
    for frame in 0..args.frames {
        if args.wireframe_at == Some(frame) {
            router.handle(PlatformEvent::ToggleWireframe)?;
        }
        if args.resize_at == Some(frame) {
            let (width, height) = router.sink().size();
            router.handle(PlatformEvent::Resized {
                width: width * 2,
                height: height * 2,
            })?;
        }
        if !router.should_render() {
            continue;
        }

        let renderer = router.sink_mut();
        let angle = frame as f32 * 0.1;
        renderer.set_transform("crate", Mat4::from_rotation_y(angle))?;
        renderer.refresh_acceleration_structures()?;

        let report = renderer.render_frame()?;
        log::info!(
            "frame {}: {} draws, {} new variants, resolved: {}",
            report.frame_index,
            report.draw_count(),
            report.cache_misses(),
            report.resolved
        );
    }

    let mut renderer = router.into_inner();
    log::info!(
        "{} pipeline variants, {} cache hits",
        renderer.pipeline_cache().len(),
        renderer.pipeline_cache().hits()
    );
    renderer.shutdown()?;
    log::info!(
        "released everything: {} textures and {} buffers still alive",
        backend.live_textures(),
        backend.live_buffers()
    );
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    lumen_frame::init();

    let args = Args::parse();
    if let Err(err) = run(&args) {
        report_fatal(&err);
    }
}
