use std::{path::PathBuf, time::Duration};

use anyhow::anyhow;
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::{
    assets,
    pipeline::{
        encoder::InputDtype,
        engine::{ModelContract, POSENET_GRID_SIZE},
        frame_gate::{DEFAULT_FRAME_INTERVAL, FrameGate},
        overlay::OverlayToggles,
    },
    types::ViewGeometry,
};

pub const DEFAULT_VIEW_WIDTH: u32 = 960;
pub const DEFAULT_VIEW_HEIGHT: u32 = 720;
pub const DEFAULT_OUTPUT: &str = "pose_overlay.png";

/// Single-person pose overlay for a camera feed or a still image.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = r#"Examples:
    pose-overlay camera --model models/movenet_singlepose_lightning.onnx
    pose-overlay camera --camera 1 --rotation 90 --every-nth 3
    pose-overlay image photo.jpg --output annotated.png
    pose-overlay image --strategy posenet --model posenet.onnx --grid 9"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run live on a camera and show the overlay in a window
    Camera(CameraArgs),
    /// Annotate one image (a built-in stick figure if no path is given)
    Image(ImageArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Strategy {
    /// Direct regression, one (1, 17, 3) output
    Movenet,
    /// Heatmap argmax with offset refinement
    Posenet,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Dtype {
    F32,
    U8,
}

#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    /// Path to the ONNX pose model
    #[arg(short, long, default_value_os_t = assets::default_model_path())]
    pub model: PathBuf,

    /// Download the model from this URL if the file is missing
    #[arg(long)]
    pub model_url: Option<String>,

    /// Output layout of the model
    #[arg(long, value_enum, default_value_t = Strategy::Movenet)]
    pub strategy: Strategy,

    /// Heatmap grid size for the posenet layout
    #[arg(long, default_value_t = POSENET_GRID_SIZE)]
    pub grid: usize,

    /// Input element type for the movenet layout
    #[arg(long, value_enum, default_value_t = Dtype::F32)]
    pub dtype: Dtype,

    /// Clockwise rotation that makes the source upright (multiple of 90)
    #[arg(long, default_value_t = 0)]
    pub rotation: u32,

    /// TTF font for labels
    #[arg(long, default_value_os_t = assets::default_font_path())]
    pub font: PathBuf,

    /// Do not download the label font; draw shapes only if it is missing
    #[arg(long, default_value_t = false)]
    pub offline: bool,
}

#[derive(Args, Debug)]
pub struct CameraArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// Camera index
    #[arg(short, long, default_value_t = 0)]
    pub camera: u32,

    /// List cameras and exit
    #[arg(long, default_value_t = false)]
    pub list: bool,

    /// Minimum time between frames sent to the model, in milliseconds
    #[arg(long, conflicts_with = "every_nth")]
    pub interval_ms: Option<u64>,

    /// Send every n-th frame to the model instead of gating by time (bare flag: every 5th)
    #[arg(long, num_args = 0..=1, default_missing_value = "5")]
    pub every_nth: Option<u64>,

    /// Initial window width
    #[arg(long, default_value_t = DEFAULT_VIEW_WIDTH)]
    pub width: u32,

    /// Initial window height
    #[arg(long, default_value_t = DEFAULT_VIEW_HEIGHT)]
    pub height: u32,
}

#[derive(Args, Debug)]
pub struct ImageArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// Image to annotate
    pub input: Option<PathBuf>,

    /// Where to write the annotated PNG
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    pub output: PathBuf,

    /// Dim the image under the skeleton
    #[arg(long, default_value_t = false)]
    pub background: bool,

    /// Hide the debug panel
    #[arg(long, default_value_t = false)]
    pub no_debug: bool,
}

/// Everything the pipeline needs, resolved from the command line.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub contract: ModelContract,
    pub model_path: PathBuf,
    pub model_url: Option<String>,
    pub gate: FrameGate,
    pub rotation_degrees: u32,
    pub view_width: u32,
    pub view_height: u32,
    pub font_path: PathBuf,
    pub font_url: Option<String>,
    pub toggles: OverlayToggles,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            contract: ModelContract::movenet(InputDtype::F32Normalized),
            model_path: assets::default_model_path(),
            model_url: None,
            gate: FrameGate::interval(DEFAULT_FRAME_INTERVAL),
            rotation_degrees: 0,
            view_width: DEFAULT_VIEW_WIDTH,
            view_height: DEFAULT_VIEW_HEIGHT,
            font_path: assets::default_font_path(),
            font_url: Some(assets::default_font_url()),
            toggles: OverlayToggles::default(),
        }
    }
}

impl PipelineConfig {
    fn with_model(model: &ModelArgs) -> Self {
        let contract = match model.strategy {
            Strategy::Movenet => ModelContract::movenet(match model.dtype {
                Dtype::F32 => InputDtype::F32Normalized,
                Dtype::U8 => InputDtype::U8,
            }),
            Strategy::Posenet => ModelContract::posenet(model.grid),
        };
        Self {
            contract,
            model_path: model.model.clone(),
            model_url: model.model_url.clone(),
            rotation_degrees: model.rotation,
            font_path: model.font.clone(),
            font_url: (!model.offline).then(assets::default_font_url),
            ..Self::default()
        }
    }

    pub fn from_camera_args(args: &CameraArgs) -> anyhow::Result<Self> {
        let gate = match (args.every_nth, args.interval_ms) {
            (Some(stride), _) => FrameGate::every_nth(stride),
            (None, Some(ms)) => FrameGate::interval(Duration::from_millis(ms)),
            (None, None) => FrameGate::default(),
        };
        let config = Self {
            gate,
            view_width: args.width,
            view_height: args.height,
            ..Self::with_model(&args.model)
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_image_args(args: &ImageArgs) -> anyhow::Result<Self> {
        let mut config = Self::with_model(&args.model);
        config.toggles.background = args.background;
        config.toggles.debug = !args.no_debug;
        config.validate()?;
        Ok(config)
    }

    pub fn view(&self) -> ViewGeometry {
        ViewGeometry::new(self.view_width as f32, self.view_height as f32)
    }

    /// Rejects settings that would otherwise fail on every frame.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.rotation_degrees % 90 != 0 {
            return Err(anyhow!(
                "rotation must be a multiple of 90 degrees, got {}",
                self.rotation_degrees
            ));
        }
        if self.view_width == 0 || self.view_height == 0 {
            return Err(anyhow!(
                "view size {}x{} is empty",
                self.view_width,
                self.view_height
            ));
        }
        if let FrameGate::Count { stride: 0, .. } = self.gate {
            return Err(anyhow!("frame stride must be at least 1"));
        }
        Ok(())
    }
}
