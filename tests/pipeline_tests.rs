use std::time::Duration;

use pose_overlay::{
    PoseError, PoseResult,
    pipeline::{
        FrameGate, FrameRouter, InputDtype, ModelContract, OutputTensor, OverlayRenderer,
        OverlayState, OverlayToggles, PoseEngine, PosePipeline, RgbaCanvas, encoder::InputTensor,
        latest_channel, map_keypoints, overlay::RED, start_pose_worker,
    },
    still,
    types::{BodyPart, CoordinateSpace, Frame, PoseUpdate, ViewGeometry},
};

const QUIET: OverlayToggles = OverlayToggles {
    debug: false,
    labels: false,
    background: false,
};

/// Direct-regression stand-in: reports only a nose at a fixed normalized
/// position.
struct NoseEngine {
    y: f32,
    x: f32,
    score: f32,
}

impl PoseEngine for NoseEngine {
    fn infer(&mut self, input: &InputTensor) -> PoseResult<Vec<OutputTensor>> {
        assert_eq!(input.shape(), &[1, 192, 192, 3]);
        let mut data = vec![0.0; 17 * 3];
        data[0] = self.y;
        data[1] = self.x;
        data[2] = self.score;
        Ok(vec![OutputTensor::new(vec![1, 1, 17, 3], data)])
    }
}

/// Heatmap stand-in on a 9x9 grid with one confident nose peak.
struct HeatmapEngine;

impl PoseEngine for HeatmapEngine {
    fn infer(&mut self, _input: &InputTensor) -> PoseResult<Vec<OutputTensor>> {
        let (grid, k) = (9, 17);
        let mut heatmap = vec![0.0; grid * grid * k];
        let mut offsets = vec![0.0; grid * grid * k * 2];
        let cell = 2 * grid + 4;
        heatmap[cell * k] = 0.8;
        offsets[cell * k * 2] = 0.5;
        offsets[cell * k * 2 + k] = 0.5;
        Ok(vec![
            OutputTensor::new(vec![1, grid, grid, k], heatmap),
            OutputTensor::new(vec![1, grid, grid, k * 2], offsets),
        ])
    }
}

struct ClosedEngine;

impl PoseEngine for ClosedEngine {
    fn infer(&mut self, _input: &InputTensor) -> PoseResult<Vec<OutputTensor>> {
        Err(PoseError::InferenceUnavailable("session closed".into()))
    }
}

#[test]
fn still_image_gets_nose_marker_in_place() {
    let contract = ModelContract::movenet(InputDtype::F32Normalized);
    let engine = NoseEngine {
        y: 150.0 / 800.0,
        x: 0.5,
        score: 0.9,
    };
    let mut pipeline = PosePipeline::new(engine, &contract);

    let annotated =
        still::annotate_still(&mut pipeline, still::stick_figure(), 0, QUIET, None).unwrap();

    assert_eq!(annotated.image.dimensions(), (500, 800));
    assert_eq!(annotated.snapshot.space, CoordinateSpace::Pixel);
    let nose = annotated.snapshot.keypoint(BodyPart::Nose).unwrap();
    assert!((nose.x() - 250.0).abs() < 1e-3);
    assert!((nose.y() - 150.0).abs() < 1e-3);
    assert_eq!(annotated.image.get_pixel(250, 150).0, RED);
    // Hidden keypoints get no marker; the far corner keeps the image.
    assert_eq!(annotated.image.get_pixel(499, 799).0, [255, 255, 255, 255]);
}

#[test]
fn rotated_still_swaps_view_dimensions() {
    let contract = ModelContract::movenet(InputDtype::U8);
    let engine = NoseEngine {
        y: 0.5,
        x: 0.5,
        score: 0.2,
    };
    let mut pipeline = PosePipeline::new(engine, &contract);

    let annotated =
        still::annotate_still(&mut pipeline, still::stick_figure(), 90, QUIET, None).unwrap();

    assert_eq!(annotated.image.dimensions(), (800, 500));
    assert_eq!(annotated.snapshot.context.source_width, 800);
    assert_eq!(annotated.snapshot.context.source_height, 500);
}

#[test]
fn heatmap_strategy_maps_normalized_positions_into_view() {
    let contract = ModelContract::posenet(9);
    let mut pipeline = PosePipeline::new(HeatmapEngine, &contract);
    let frame = Frame::new(vec![90; 360 * 360 * 4], 360, 360, 0);

    let snapshot = pipeline.process(frame).unwrap();
    assert_eq!(snapshot.space, CoordinateSpace::Normalized);
    assert_eq!(snapshot.keypoints.len(), 1);
    assert_eq!(snapshot.keypoints[0].confidence, 0.8);

    let mapped = map_keypoints(
        &snapshot.keypoints,
        &snapshot.context,
        snapshot.space,
        ViewGeometry::new(720.0, 720.0),
    );
    assert!((mapped[0].x() - 360.0).abs() < 1e-3);
    assert!((mapped[0].y() - 200.0).abs() < 1e-3);
}

#[test]
fn live_path_delivers_snapshot_to_render_side() {
    let contract = ModelContract::movenet(InputDtype::F32Normalized);
    let (frame_tx, frame_rx) = latest_channel();
    let (preview_tx, preview_rx) = latest_channel();
    let (update_tx, update_rx) = latest_channel();

    let worker = start_pose_worker(
        |_| {
            Ok(NoseEngine {
                y: 0.5,
                x: 0.25,
                score: 0.95,
            })
        },
        contract,
        frame_rx,
        update_tx,
    );

    let mut router = FrameRouter::new(FrameGate::every_nth(1), preview_tx, frame_tx);
    assert!(router.route(Frame::new(vec![30; 320 * 240 * 4], 320, 240, 0)));
    assert!(preview_rx.try_recv().is_ok());

    let update = update_rx.recv_timeout(Duration::from_secs(10)).unwrap();
    let mut state = OverlayState::new(QUIET);
    state.update(update);
    let snapshot = state.latest().unwrap();
    assert_eq!(snapshot.context.source_width, 320);

    // 320x240 into 640x480 is a pure 2x scale.
    let mut canvas = RgbaCanvas::new(640, 480);
    let view = canvas.view();
    state.render(&OverlayRenderer::default(), &mut canvas, view);
    assert_eq!(canvas.pixel(160, 240), Some(RED));

    drop(router);
    worker.join().unwrap();
}

#[test]
fn closed_engine_disables_overlay() {
    let contract = ModelContract::movenet(InputDtype::U8);
    let (frame_tx, frame_rx) = latest_channel();
    let (update_tx, update_rx) = latest_channel();
    let worker = start_pose_worker(|_| Ok(ClosedEngine), contract, frame_rx, update_tx);

    frame_tx.send(Frame::new(vec![0; 16 * 16 * 4], 16, 16, 0));
    let update = update_rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert!(matches!(update, PoseUpdate::Unavailable(_)));
    worker.join().unwrap();

    let mut state = OverlayState::default();
    state.update(update);
    assert!(state.is_unavailable());
    assert!(state.latest().is_none());
}
