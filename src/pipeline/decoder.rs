use crate::{
    error::{PoseError, PoseResult},
    pipeline::engine::OutputTensor,
    types::{BodyPart, CoordinateSpace, FrameContext, Keypoint, NUM_KEYPOINTS},
};

/// Heatmap peaks below this are dropped, not emitted with low confidence.
pub const HEATMAP_THRESHOLD: f32 = 0.3;
const HIGH_CONFIDENCE_LOG: f32 = 0.7;

/// Output layouts a pose model may expose. Chosen once from the model contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeypointDecoder {
    /// One `(1, K, 3)` tensor of `(y, x, confidence)`, coordinates in `[0, 1]`.
    DirectRegression,
    /// A `(grid_h, grid_w, K)` heatmap and a `(grid_h, grid_w, 2K)` offset map.
    HeatmapOffset { grid_height: usize, grid_width: usize },
}

/// Keypoints of one frame plus the error that emptied them, if any.
#[derive(Debug, Default)]
pub struct Decoded {
    pub keypoints: Vec<Keypoint>,
    pub error: Option<PoseError>,
}

impl KeypointDecoder {
    pub fn output_count(&self) -> usize {
        match self {
            KeypointDecoder::DirectRegression => 1,
            KeypointDecoder::HeatmapOffset { .. } => 2,
        }
    }

    pub fn space(&self) -> CoordinateSpace {
        match self {
            KeypointDecoder::DirectRegression => CoordinateSpace::Pixel,
            KeypointDecoder::HeatmapOffset { .. } => CoordinateSpace::Normalized,
        }
    }

    pub fn decode(
        &self,
        outputs: &[OutputTensor],
        context: &FrameContext,
    ) -> PoseResult<Vec<Keypoint>> {
        if outputs.len() < self.output_count() {
            return Err(PoseError::Decode(format!(
                "model returned {} outputs, expected {}",
                outputs.len(),
                self.output_count()
            )));
        }

        let keypoints = match *self {
            KeypointDecoder::DirectRegression => decode_direct(
                &outputs[0].data,
                context.source_width,
                context.source_height,
            )?,
            KeypointDecoder::HeatmapOffset {
                grid_height,
                grid_width,
            } => decode_heatmap(&outputs[0].data, &outputs[1].data, grid_height, grid_width)?,
        };

        log_statistics(&keypoints);
        Ok(keypoints)
    }

    /// Never fails: a malformed output becomes an empty list with the error
    /// attached, so one bad frame only costs that frame.
    pub fn decode_or_empty(&self, outputs: &[OutputTensor], context: &FrameContext) -> Decoded {
        match self.decode(outputs, context) {
            Ok(keypoints) => Decoded {
                keypoints,
                error: None,
            },
            Err(err) => {
                log::warn!("pose decode failed: {err}");
                Decoded {
                    keypoints: Vec::new(),
                    error: Some(err),
                }
            }
        }
    }
}

/// Direct regression: every keypoint is emitted regardless of confidence.
pub fn decode_direct(
    output: &[f32],
    image_width: u32,
    image_height: u32,
) -> PoseResult<Vec<Keypoint>> {
    if output.len() != NUM_KEYPOINTS * 3 {
        return Err(PoseError::Decode(format!(
            "unexpected output size: got {}, expected {}",
            output.len(),
            NUM_KEYPOINTS * 3
        )));
    }

    let mut keypoints = Vec::with_capacity(NUM_KEYPOINTS);
    for (channel, chunk) in output.chunks_exact(3).enumerate() {
        let Some(body_part) = BodyPart::from_channel(channel) else {
            break;
        };
        let y = chunk[0] * image_height as f32;
        let x = chunk[1] * image_width as f32;
        keypoints.push(Keypoint::new(body_part, x, y, chunk[2]));
    }
    Ok(keypoints)
}

/// Heatmap argmax with offset refinement. Positions come out normalized.
pub fn decode_heatmap(
    heatmap: &[f32],
    offsets: &[f32],
    grid_height: usize,
    grid_width: usize,
) -> PoseResult<Vec<Keypoint>> {
    let cells = grid_height
        .checked_mul(grid_width)
        .ok_or_else(|| PoseError::Decode("heatmap grid overflow".to_string()))?;
    if cells == 0 {
        return Err(PoseError::Decode(format!(
            "empty heatmap grid {grid_height}x{grid_width}"
        )));
    }
    if heatmap.len() != cells * NUM_KEYPOINTS {
        return Err(PoseError::Decode(format!(
            "heatmap size mismatch: got {}, expected {}",
            heatmap.len(),
            cells * NUM_KEYPOINTS
        )));
    }
    if offsets.len() != cells * NUM_KEYPOINTS * 2 {
        return Err(PoseError::Decode(format!(
            "offset map size mismatch: got {}, expected {}",
            offsets.len(),
            cells * NUM_KEYPOINTS * 2
        )));
    }

    let mut keypoints = Vec::with_capacity(NUM_KEYPOINTS);
    for channel in 0..NUM_KEYPOINTS {
        let mut best_cell = 0;
        let mut best = f32::NEG_INFINITY;
        for cell in 0..cells {
            let value = heatmap[cell * NUM_KEYPOINTS + channel];
            // NaN never compares greater; strict `>` keeps the first cell on ties.
            if value > best {
                best = value;
                best_cell = cell;
            }
        }

        if best < HEATMAP_THRESHOLD {
            continue;
        }

        let Some(body_part) = BodyPart::from_channel(channel) else {
            continue;
        };
        let row = best_cell / grid_width;
        let col = best_cell % grid_width;
        let base = best_cell * NUM_KEYPOINTS * 2;
        let offset_x = offsets[base + channel];
        let offset_y = offsets[base + channel + NUM_KEYPOINTS];

        let x = (col as f32 + offset_x) / grid_width as f32;
        let y = (row as f32 + offset_y) / grid_height as f32;
        keypoints.push(Keypoint::new(body_part, x, y, best));
    }

    Ok(keypoints)
}

fn log_statistics(keypoints: &[Keypoint]) {
    if !log::log_enabled!(log::Level::Debug) || keypoints.is_empty() {
        return;
    }

    let (min, max, sum) = keypoints.iter().fold(
        (f32::MAX, f32::MIN, 0.0_f32),
        |(min, max, sum), kp| {
            (
                min.min(kp.confidence),
                max.max(kp.confidence),
                sum + kp.confidence,
            )
        },
    );
    let high = keypoints
        .iter()
        .filter(|kp| kp.confidence > HIGH_CONFIDENCE_LOG)
        .count();
    log::debug!(
        "decoded {} keypoints, confidence {min:.3}..{max:.3}, avg {:.3}, high {high}",
        keypoints.len(),
        sum / keypoints.len() as f32
    );
    for kp in keypoints.iter().take(5) {
        log::debug!(
            "{}: x={:.1}, y={:.1}, score={:.3}",
            kp.body_part,
            kp.x(),
            kp.y(),
            kp.confidence
        );
    }
}
