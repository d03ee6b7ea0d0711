use std::sync::Arc;

use ab_glyph::FontVec;
use anyhow::Context;
use image::RgbaImage;

use crate::{
    pipeline::{
        engine::PoseEngine,
        overlay::{Canvas, OverlayRenderer, OverlayState, OverlayToggles},
        skeleton::RgbaCanvas,
        worker::PosePipeline,
    },
    types::{Frame, PoseSnapshot, PoseUpdate},
};

pub const TEST_IMAGE_WIDTH: u32 = 500;
pub const TEST_IMAGE_HEIGHT: u32 = 800;

const INK: [u8; 4] = [0, 0, 0, 255];
const PAPER: [u8; 4] = [255, 255, 255, 255];
const STROKE: f32 = 10.0;

/// A black stick figure on white, for running the pipeline without a camera.
pub fn stick_figure() -> RgbaImage {
    let mut canvas = RgbaCanvas::from_image(RgbaImage::from_pixel(
        TEST_IMAGE_WIDTH,
        TEST_IMAGE_HEIGHT,
        image::Rgba(PAPER),
    ));

    // Head outline.
    canvas.fill_circle((250.0, 150.0), 50.0 + STROKE / 2.0, INK);
    canvas.fill_circle((250.0, 150.0), 50.0 - STROKE / 2.0, PAPER);

    let strokes = [
        ((250.0, 200.0), (250.0, 400.0)),
        ((250.0, 250.0), (150.0, 300.0)),
        ((250.0, 250.0), (350.0, 300.0)),
        ((250.0, 400.0), (150.0, 600.0)),
        ((250.0, 400.0), (350.0, 600.0)),
    ];
    for (from, to) in strokes {
        canvas.stroke_line(from, to, STROKE, INK);
    }

    canvas.into_image()
}

/// Result of annotating one still image.
pub struct Annotated {
    pub image: RgbaImage,
    pub snapshot: PoseSnapshot,
}

/// Runs one image through the same stages as live mode and draws the overlay
/// over the upright image.
pub fn annotate_still<E: PoseEngine>(
    pipeline: &mut PosePipeline<E>,
    image: RgbaImage,
    rotation_degrees: u32,
    toggles: OverlayToggles,
    font: Option<Arc<FontVec>>,
) -> anyhow::Result<Annotated> {
    let (width, height) = image.dimensions();
    let frame = Frame::new(image.into_raw(), width, height, rotation_degrees);
    let preview = frame.preview();

    let snapshot = pipeline
        .process(frame)
        .context("pose inference failed")?;

    let (view_width, view_height) = if rotation_degrees % 180 == 90 {
        (height, width)
    } else {
        (width, height)
    };
    let mut canvas = RgbaCanvas::new(view_width, view_height).with_font(font);
    canvas.blit_letterboxed(&preview)?;

    let mut state = OverlayState::new(toggles);
    state.update(PoseUpdate::Pose(snapshot.clone()));
    let view = canvas.view();
    state.render(&OverlayRenderer::default(), &mut canvas, view);

    Ok(Annotated {
        image: canvas.into_image(),
        snapshot,
    })
}
