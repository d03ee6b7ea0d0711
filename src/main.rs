use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use pose_overlay::{
    PoseError, PoseResult, assets,
    config::{CameraArgs, Cli, Commands, ImageArgs, PipelineConfig},
    pipeline::{ModelContract, OrtEngine, PosePipeline},
    still,
};

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Camera(args) => run_camera(&args),
        Commands::Image(args) => run_image(&args),
    }
}

/// Engine loader shared by both modes. A model that is missing and cannot be
/// downloaded makes inference unavailable.
fn engine_loader(
    model_path: PathBuf,
    model_url: Option<String>,
) -> impl FnOnce(&ModelContract) -> PoseResult<OrtEngine> + Send + 'static {
    move |contract| {
        assets::ensure_asset_ready(
            assets::AssetKind::PoseModel,
            &model_path,
            model_url.as_deref(),
            |_evt| {},
        )
        .map_err(|err| PoseError::InferenceUnavailable(format!("{err:#}")))?;
        OrtEngine::new(&model_path, contract)
    }
}

fn run_image(args: &ImageArgs) -> Result<()> {
    let config = PipelineConfig::from_image_args(args)?;

    let image = match &args.input {
        Some(path) => image::open(path)
            .with_context(|| format!("failed to open image {}", path.display()))?
            .to_rgba8(),
        None => {
            log::info!("no input image given, using the built-in stick figure");
            still::stick_figure()
        }
    };

    let load = engine_loader(config.model_path.clone(), config.model_url.clone());
    let engine = load(&config.contract).context("failed to start pose engine")?;
    let mut pipeline = PosePipeline::new(engine, &config.contract);
    let font = assets::prepare_font(&config.font_path, config.font_url.as_deref());

    let annotated = still::annotate_still(
        &mut pipeline,
        image,
        config.rotation_degrees,
        config.toggles,
        font,
    )?;
    pipeline.close();

    log::info!(
        "detected {} keypoints",
        annotated
            .snapshot
            .keypoints
            .iter()
            .filter(|kp| kp.confidence > 0.0)
            .count()
    );
    annotated
        .image
        .save(&args.output)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    log::info!("annotated image written to {}", args.output.display());
    Ok(())
}

#[cfg(feature = "camera-nokhwa")]
fn run_camera(args: &CameraArgs) -> Result<()> {
    use pose_overlay::{
        pipeline::{
            FrameRouter, available_cameras, latest_channel, start_camera_stream, start_pose_worker,
        },
        viewer::LiveViewer,
    };

    if args.list {
        for device in available_cameras().context("failed to query cameras")? {
            println!("{}", device.label);
        }
        return Ok(());
    }

    let config = PipelineConfig::from_camera_args(args)?;
    let font = assets::prepare_font(&config.font_path, config.font_url.as_deref());

    let (frame_tx, frame_rx) = latest_channel();
    let (preview_tx, preview_rx) = latest_channel();
    let (update_tx, update_rx) = latest_channel();

    let worker = start_pose_worker(
        engine_loader(config.model_path.clone(), config.model_url.clone()),
        config.contract.clone(),
        frame_rx,
        update_tx,
    );

    let router = FrameRouter::new(config.gate.clone(), preview_tx, frame_tx);
    let stream = start_camera_stream(args.camera, config.rotation_degrees, router)
        .with_context(|| format!("failed to start camera {}", args.camera))?;

    let viewer = LiveViewer::new(
        "Pose Overlay",
        config.view_width as usize,
        config.view_height as usize,
        config.toggles,
        font,
    )?;
    let result = viewer.run(preview_rx, update_rx);

    // Stopping capture drops the frame sender, which ends the worker loop.
    stream.stop();
    if worker.join().is_err() {
        log::error!("pose worker panicked");
    }
    result
}

#[cfg(not(feature = "camera-nokhwa"))]
fn run_camera(_args: &CameraArgs) -> Result<()> {
    Err(anyhow::anyhow!(
        "built without camera support; enable the camera-nokhwa feature"
    ))
}
