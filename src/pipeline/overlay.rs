use crate::{
    pipeline::{mapper::map_keypoints, skeleton::SKELETON_EDGES},
    types::{BodyPart, Keypoint, PoseSnapshot, PoseUpdate, ViewGeometry},
};

pub type Color = [u8; 4];

pub const HIGH_CONFIDENCE: f32 = 0.70;
pub const MEDIUM_CONFIDENCE: f32 = 0.35;
pub const LOW_CONFIDENCE: f32 = 0.15;

pub const GREEN: Color = [0, 255, 0, 255];
pub const YELLOW: Color = [255, 255, 0, 255];
pub const RED: Color = [255, 0, 0, 255];
pub const CYAN: Color = [0, 255, 255, 255];
pub const BLUE: Color = [0, 0, 255, 255];
pub const MAGENTA: Color = [255, 0, 255, 255];
pub const WHITE: Color = [255, 255, 255, 255];
pub const SHADE: Color = [0, 0, 0, 100];

/// Drawing primitives supplied by the render surface.
pub trait Canvas {
    fn fill_circle(&mut self, center: (f32, f32), radius: f32, color: Color);
    fn stroke_line(&mut self, from: (f32, f32), to: (f32, f32), thickness: f32, color: Color);
    fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Color);
    fn text_with_shadow(&mut self, text: &str, at: (f32, f32), size: f32, color: Color);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
    Hidden,
}

impl ConfidenceTier {
    pub fn of(confidence: f32) -> Self {
        if confidence > HIGH_CONFIDENCE {
            ConfidenceTier::High
        } else if confidence > MEDIUM_CONFIDENCE {
            ConfidenceTier::Medium
        } else if confidence > LOW_CONFIDENCE {
            ConfidenceTier::Low
        } else {
            ConfidenceTier::Hidden
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TierCounts {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl TierCounts {
    pub fn count(keypoints: &[Keypoint]) -> Self {
        let mut counts = TierCounts::default();
        for kp in keypoints {
            match ConfidenceTier::of(kp.confidence) {
                ConfidenceTier::High => counts.high += 1,
                ConfidenceTier::Medium => counts.medium += 1,
                ConfidenceTier::Low => counts.low += 1,
                ConfidenceTier::Hidden => {}
            }
        }
        counts
    }
}

/// Presentation flags. They never reach the decoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OverlayToggles {
    pub debug: bool,
    pub labels: bool,
    pub background: bool,
}

impl Default for OverlayToggles {
    fn default() -> Self {
        Self {
            debug: true,
            labels: true,
            background: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct OverlayStyle {
    pub point_size: f32,
    pub line_thickness: f32,
    pub label_text_size: f32,
    pub debug_text_size: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            point_size: 30.0,
            line_thickness: 10.0,
            label_text_size: 40.0,
            debug_text_size: 30.0,
        }
    }
}

pub fn body_part_color(part: BodyPart) -> Color {
    match part {
        BodyPart::Nose => RED,
        BodyPart::LeftEye | BodyPart::RightEye | BodyPart::LeftEar | BodyPart::RightEar => YELLOW,
        BodyPart::LeftShoulder | BodyPart::RightShoulder => GREEN,
        BodyPart::LeftElbow | BodyPart::RightElbow => CYAN,
        BodyPart::LeftWrist | BodyPart::RightWrist => BLUE,
        BodyPart::LeftHip | BodyPart::RightHip => MAGENTA,
        BodyPart::LeftKnee | BodyPart::RightKnee => YELLOW,
        BodyPart::LeftAnkle | BodyPart::RightAnkle => WHITE,
    }
}

pub fn edge_color(avg_confidence: f32) -> Color {
    if avg_confidence > HIGH_CONFIDENCE {
        GREEN
    } else if avg_confidence > MEDIUM_CONFIDENCE {
        YELLOW
    } else {
        RED
    }
}

#[derive(Clone, Debug, Default)]
pub struct OverlayRenderer {
    style: OverlayStyle,
}

impl OverlayRenderer {
    pub fn new(style: OverlayStyle) -> Self {
        Self { style }
    }

    /// Draws one frame of overlay. `keypoints` must already be in view space.
    pub fn draw<C: Canvas>(
        &self,
        canvas: &mut C,
        keypoints: &[Keypoint],
        view: ViewGeometry,
        toggles: OverlayToggles,
    ) {
        if keypoints.is_empty() {
            self.draw_no_detection(canvas);
            return;
        }

        if toggles.background {
            canvas.fill_rect(0.0, 0.0, view.view_width, view.view_height, SHADE);
        }

        // Lines first so markers sit on top.
        self.draw_edges(canvas, keypoints);
        self.draw_markers(canvas, keypoints, toggles.labels);

        if toggles.debug {
            self.draw_debug(canvas, keypoints);
        }
    }

    pub fn draw_unavailable<C: Canvas>(&self, canvas: &mut C, reason: &str) {
        let size = self.style.debug_text_size;
        canvas.text_with_shadow("Pose detection unavailable", (50.0, 100.0), size, RED);
        canvas.text_with_shadow(reason, (50.0, 150.0), size, WHITE);
    }

    fn draw_no_detection<C: Canvas>(&self, canvas: &mut C) {
        let size = self.style.debug_text_size;
        canvas.text_with_shadow("No keypoints detected", (50.0, 100.0), size, WHITE);
        canvas.text_with_shadow("Try showing your full body", (50.0, 150.0), size, WHITE);
    }

    fn draw_edges<C: Canvas>(&self, canvas: &mut C, keypoints: &[Keypoint]) {
        for &(first, second) in SKELETON_EDGES {
            let (Some(a), Some(b)) = (find(keypoints, first), find(keypoints, second)) else {
                continue;
            };
            if !edge_visible(a.confidence, b.confidence) {
                continue;
            }

            let avg = (a.confidence + b.confidence) / 2.0;
            let thickness = self.style.line_thickness * (0.5 + avg);
            canvas.stroke_line(a.position, b.position, thickness, edge_color(avg));
        }
    }

    fn draw_markers<C: Canvas>(&self, canvas: &mut C, keypoints: &[Keypoint], labels: bool) {
        for kp in keypoints {
            if ConfidenceTier::of(kp.confidence) == ConfidenceTier::Hidden {
                continue;
            }

            let radius = self.marker_radius(kp.confidence);
            canvas.fill_circle(kp.position, radius, body_part_color(kp.body_part));

            if labels {
                let (x, y) = kp.position;
                let text_x = x + radius + 5.0;
                let size = self.style.label_text_size;
                canvas.text_with_shadow(kp.body_part.label(), (text_x, y), size, WHITE);
                canvas.text_with_shadow(
                    &percent(kp.confidence),
                    (text_x, y + size + 5.0),
                    size,
                    WHITE,
                );
            }
        }
    }

    fn draw_debug<C: Canvas>(&self, canvas: &mut C, keypoints: &[Keypoint]) {
        canvas.fill_rect(10.0, 10.0, 340.0, 240.0, SHADE);

        let counts = TierCounts::count(keypoints);
        let size = self.style.debug_text_size;
        let mut lines = vec![
            format!("Total keypoints: {}", keypoints.len()),
            format!("High confidence: {}", counts.high),
            format!("Medium confidence: {}", counts.medium),
            format!("Low confidence: {}", counts.low),
        ];
        if let Some(nose) = find(keypoints, BodyPart::Nose) {
            lines.push(format!("Nose: {}", percent(nose.confidence)));
        }

        let mut y = 50.0;
        for line in &lines {
            canvas.text_with_shadow(line, (20.0, y), size, WHITE);
            y += 40.0;
        }
    }

    pub fn marker_radius(&self, confidence: f32) -> f32 {
        self.style.point_size * (0.5 + confidence / 2.0)
    }
}

/// An edge is drawn when at least one endpoint clears the medium tier.
pub fn edge_visible(first: f32, second: f32) -> bool {
    first > MEDIUM_CONFIDENCE || second > MEDIUM_CONFIDENCE
}

fn find(keypoints: &[Keypoint], part: BodyPart) -> Option<&Keypoint> {
    keypoints.iter().find(|kp| kp.body_part == part)
}

fn percent(confidence: f32) -> String {
    format!("{}%", (confidence * 100.0) as i32)
}

/// Render-side view model: the latest snapshot plus toggles. Owned by the
/// render loop only.
#[derive(Debug, Default)]
pub struct OverlayState {
    pub toggles: OverlayToggles,
    latest: Option<PoseSnapshot>,
    unavailable: Option<String>,
}

impl OverlayState {
    pub fn new(toggles: OverlayToggles) -> Self {
        Self {
            toggles,
            latest: None,
            unavailable: None,
        }
    }

    /// Takes a worker update; returns true when a redraw is needed.
    pub fn update(&mut self, update: PoseUpdate) -> bool {
        match update {
            PoseUpdate::Pose(snapshot) => {
                let counts = TierCounts::count(&snapshot.keypoints);
                log::debug!(
                    "pose update: {} keypoints, high confidence {}/{}",
                    snapshot.keypoints.len(),
                    counts.high,
                    snapshot.keypoints.len()
                );
                self.latest = Some(snapshot);
            }
            PoseUpdate::Unavailable(reason) => {
                log::error!("pose detection disabled: {reason}");
                self.latest = None;
                self.unavailable = Some(reason);
            }
        }
        true
    }

    pub fn latest(&self) -> Option<&PoseSnapshot> {
        self.latest.as_ref()
    }

    pub fn is_unavailable(&self) -> bool {
        self.unavailable.is_some()
    }

    pub fn render<C: Canvas>(
        &self,
        renderer: &OverlayRenderer,
        canvas: &mut C,
        view: ViewGeometry,
    ) {
        if let Some(reason) = &self.unavailable {
            renderer.draw_unavailable(canvas, reason);
            return;
        }

        let screen = match &self.latest {
            Some(snapshot) => {
                map_keypoints(&snapshot.keypoints, &snapshot.context, snapshot.space, view)
            }
            None => Vec::new(),
        };
        renderer.draw(canvas, &screen, view, self.toggles);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::types::{CoordinateSpace, FrameContext};

    #[derive(Clone, Debug, PartialEq)]
    pub(crate) enum Op {
        Circle {
            center: (f32, f32),
            radius: f32,
            color: Color,
        },
        Line {
            from: (f32, f32),
            to: (f32, f32),
            thickness: f32,
            color: Color,
        },
        Rect,
        Text(String),
    }

    #[derive(Default)]
    pub(crate) struct RecordingCanvas {
        pub ops: Vec<Op>,
    }

    impl RecordingCanvas {
        pub fn lines(&self) -> Vec<&Op> {
            self.ops.iter().filter(|op| matches!(op, Op::Line { .. })).collect()
        }

        pub fn circles(&self) -> Vec<&Op> {
            self.ops
                .iter()
                .filter(|op| matches!(op, Op::Circle { .. }))
                .collect()
        }

        pub fn texts(&self) -> Vec<&str> {
            self.ops
                .iter()
                .filter_map(|op| match op {
                    Op::Text(text) => Some(text.as_str()),
                    _ => None,
                })
                .collect()
        }
    }

    impl Canvas for RecordingCanvas {
        fn fill_circle(&mut self, center: (f32, f32), radius: f32, color: Color) {
            self.ops.push(Op::Circle {
                center,
                radius,
                color,
            });
        }

        fn stroke_line(&mut self, from: (f32, f32), to: (f32, f32), thickness: f32, color: Color) {
            self.ops.push(Op::Line {
                from,
                to,
                thickness,
                color,
            });
        }

        fn fill_rect(&mut self, _x: f32, _y: f32, _width: f32, _height: f32, _color: Color) {
            self.ops.push(Op::Rect);
        }

        fn text_with_shadow(&mut self, text: &str, _at: (f32, f32), _size: f32, _color: Color) {
            self.ops.push(Op::Text(text.to_string()));
        }
    }

    const VIEW: ViewGeometry = ViewGeometry {
        view_width: 640.0,
        view_height: 480.0,
    };

    fn quiet() -> OverlayToggles {
        OverlayToggles {
            debug: false,
            labels: false,
            background: false,
        }
    }

    fn shoulder_elbow(first: f32, second: f32) -> Vec<Keypoint> {
        vec![
            Keypoint::new(BodyPart::LeftShoulder, 100.0, 100.0, first),
            Keypoint::new(BodyPart::LeftElbow, 150.0, 200.0, second),
        ]
    }

    #[test]
    fn tiers_are_strictly_above_thresholds() {
        assert_eq!(ConfidenceTier::of(0.71), ConfidenceTier::High);
        assert_eq!(ConfidenceTier::of(0.70), ConfidenceTier::Medium);
        assert_eq!(ConfidenceTier::of(0.36), ConfidenceTier::Medium);
        assert_eq!(ConfidenceTier::of(0.35), ConfidenceTier::Low);
        assert_eq!(ConfidenceTier::of(0.16), ConfidenceTier::Low);
        assert_eq!(ConfidenceTier::of(0.15), ConfidenceTier::Hidden);
    }

    #[test]
    fn edge_drawn_when_one_endpoint_clears_medium() {
        let renderer = OverlayRenderer::default();
        let mut canvas = RecordingCanvas::default();
        renderer.draw(&mut canvas, &shoulder_elbow(0.40, 0.10), VIEW, quiet());
        assert_eq!(canvas.lines().len(), 1);

        let mut canvas = RecordingCanvas::default();
        renderer.draw(&mut canvas, &shoulder_elbow(0.30, 0.10), VIEW, quiet());
        assert!(canvas.lines().is_empty());
    }

    #[test]
    fn edge_style_follows_average_confidence() {
        let renderer = OverlayRenderer::default();
        let mut canvas = RecordingCanvas::default();
        renderer.draw(&mut canvas, &shoulder_elbow(0.9, 0.8), VIEW, quiet());

        let Op::Line {
            thickness, color, ..
        } = canvas.lines()[0].clone()
        else {
            unreachable!();
        };
        assert_eq!(color, GREEN);
        assert!((thickness - 10.0 * (0.5 + 0.85)).abs() < 1e-5);

        assert_eq!(edge_color(0.5), YELLOW);
        assert_eq!(edge_color(0.35), RED);
    }

    #[test]
    fn markers_skip_hidden_tier_and_scale_radius() {
        let renderer = OverlayRenderer::default();
        let mut canvas = RecordingCanvas::default();
        let keypoints = shoulder_elbow(0.8, 0.15);
        renderer.draw(&mut canvas, &keypoints, VIEW, quiet());

        let circles = canvas.circles();
        assert_eq!(circles.len(), 1);
        let Op::Circle { radius, color, .. } = circles[0].clone() else {
            unreachable!();
        };
        assert!((radius - 30.0 * (0.5 + 0.4)).abs() < 1e-5);
        assert_eq!(color, GREEN);
    }

    #[test]
    fn empty_list_draws_no_detection_indicator() {
        let renderer = OverlayRenderer::default();
        let mut canvas = RecordingCanvas::default();
        renderer.draw(&mut canvas, &[], VIEW, OverlayToggles::default());

        assert!(canvas.lines().is_empty());
        assert!(canvas.circles().is_empty());
        assert!(canvas.texts().contains(&"No keypoints detected"));
    }

    #[test]
    fn debug_mode_reports_tier_counts_and_nose() {
        let renderer = OverlayRenderer::default();
        let mut canvas = RecordingCanvas::default();
        let keypoints = vec![
            Keypoint::new(BodyPart::Nose, 10.0, 10.0, 0.93),
            Keypoint::new(BodyPart::LeftEye, 12.0, 8.0, 0.5),
            Keypoint::new(BodyPart::RightEye, 8.0, 8.0, 0.2),
            Keypoint::new(BodyPart::LeftEar, 14.0, 9.0, 0.05),
        ];
        let toggles = OverlayToggles {
            debug: true,
            ..quiet()
        };
        renderer.draw(&mut canvas, &keypoints, VIEW, toggles);

        let texts = canvas.texts();
        assert!(texts.contains(&"Total keypoints: 4"));
        assert!(texts.contains(&"High confidence: 1"));
        assert!(texts.contains(&"Medium confidence: 1"));
        assert!(texts.contains(&"Low confidence: 1"));
        assert!(texts.contains(&"Nose: 93%"));
    }

    #[test]
    fn labels_name_each_drawn_marker() {
        let renderer = OverlayRenderer::default();
        let mut canvas = RecordingCanvas::default();
        let toggles = OverlayToggles {
            labels: true,
            ..quiet()
        };
        renderer.draw(&mut canvas, &shoulder_elbow(0.8, 0.2), VIEW, toggles);

        let texts = canvas.texts();
        assert_eq!(texts, vec!["LEFT_SHOULDER", "80%", "LEFT_ELBOW", "20%"]);
    }

    #[test]
    fn background_toggle_adds_shade() {
        let renderer = OverlayRenderer::default();
        let mut canvas = RecordingCanvas::default();
        let toggles = OverlayToggles {
            background: true,
            ..quiet()
        };
        renderer.draw(&mut canvas, &shoulder_elbow(0.8, 0.8), VIEW, toggles);
        assert_eq!(canvas.ops.first(), Some(&Op::Rect));
    }

    #[test]
    fn state_maps_snapshot_into_view() {
        let mut state = OverlayState::new(quiet());
        let snapshot = PoseSnapshot {
            keypoints: vec![Keypoint::new(BodyPart::Nose, 100.0, 50.0, 0.9)],
            context: FrameContext {
                source_width: 640,
                source_height: 480,
                rotation_degrees: 0,
            },
            space: CoordinateSpace::Pixel,
            timestamp: Instant::now(),
        };
        assert!(state.update(PoseUpdate::Pose(snapshot)));

        let renderer = OverlayRenderer::default();
        let mut canvas = RecordingCanvas::default();
        state.render(&renderer, &mut canvas, ViewGeometry::new(1280.0, 960.0));

        let Op::Circle { center, .. } = canvas.circles()[0].clone() else {
            unreachable!();
        };
        assert_eq!(center, (200.0, 100.0));
    }

    #[test]
    fn unavailable_replaces_pose_rendering() {
        let mut state = OverlayState::default();
        state.update(PoseUpdate::Unavailable("engine closed".into()));
        assert!(state.is_unavailable());

        let renderer = OverlayRenderer::default();
        let mut canvas = RecordingCanvas::default();
        state.render(&renderer, &mut canvas, VIEW);
        assert!(canvas.texts().contains(&"Pose detection unavailable"));
    }
}
