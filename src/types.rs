use std::{fmt, time::Instant};

/// Body-part labels in the channel order of the pose model's output tensors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BodyPart {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

pub const NUM_KEYPOINTS: usize = 17;

/// Channel index -> body part. Output channel `k` of every supported model is
/// `CHANNEL_ORDER[k]`; changing this table changes the model wire contract.
pub const CHANNEL_ORDER: [BodyPart; NUM_KEYPOINTS] = [
    BodyPart::Nose,
    BodyPart::LeftEye,
    BodyPart::RightEye,
    BodyPart::LeftEar,
    BodyPart::RightEar,
    BodyPart::LeftShoulder,
    BodyPart::RightShoulder,
    BodyPart::LeftElbow,
    BodyPart::RightElbow,
    BodyPart::LeftWrist,
    BodyPart::RightWrist,
    BodyPart::LeftHip,
    BodyPart::RightHip,
    BodyPart::LeftKnee,
    BodyPart::RightKnee,
    BodyPart::LeftAnkle,
    BodyPart::RightAnkle,
];

impl BodyPart {
    pub fn from_channel(channel: usize) -> Option<Self> {
        CHANNEL_ORDER.get(channel).copied()
    }

    pub fn channel(self) -> usize {
        // The table is the source of truth, not the declaration order.
        CHANNEL_ORDER
            .iter()
            .position(|part| *part == self)
            .unwrap_or(usize::MAX)
    }

    pub fn label(&self) -> &'static str {
        match self {
            BodyPart::Nose => "NOSE",
            BodyPart::LeftEye => "LEFT_EYE",
            BodyPart::RightEye => "RIGHT_EYE",
            BodyPart::LeftEar => "LEFT_EAR",
            BodyPart::RightEar => "RIGHT_EAR",
            BodyPart::LeftShoulder => "LEFT_SHOULDER",
            BodyPart::RightShoulder => "RIGHT_SHOULDER",
            BodyPart::LeftElbow => "LEFT_ELBOW",
            BodyPart::RightElbow => "RIGHT_ELBOW",
            BodyPart::LeftWrist => "LEFT_WRIST",
            BodyPart::RightWrist => "RIGHT_WRIST",
            BodyPart::LeftHip => "LEFT_HIP",
            BodyPart::RightHip => "RIGHT_HIP",
            BodyPart::LeftKnee => "LEFT_KNEE",
            BodyPart::RightKnee => "RIGHT_KNEE",
            BodyPart::LeftAnkle => "LEFT_ANKLE",
            BodyPart::RightAnkle => "RIGHT_ANKLE",
        }
    }
}

impl fmt::Display for BodyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keypoint {
    pub body_part: BodyPart,
    pub position: (f32, f32),
    pub confidence: f32,
}

impl Keypoint {
    pub fn new(body_part: BodyPart, x: f32, y: f32, confidence: f32) -> Self {
        Self {
            body_part,
            position: (x, y),
            confidence,
        }
    }

    pub fn x(&self) -> f32 {
        self.position.0
    }

    pub fn y(&self) -> f32 {
        self.position.1
    }
}

/// Geometry of the (rotation-corrected) frame a keypoint set came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameContext {
    pub source_width: u32,
    pub source_height: u32,
    pub rotation_degrees: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewGeometry {
    pub view_width: f32,
    pub view_height: f32,
}

impl ViewGeometry {
    pub fn new(view_width: f32, view_height: f32) -> Self {
        Self {
            view_width,
            view_height,
        }
    }
}

/// Coordinate space a decoder emits positions in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoordinateSpace {
    /// Pixels of the rotation-corrected source frame.
    Pixel,
    /// `[0, 1]` fractions of the source frame.
    Normalized,
}

/// Calls the owner's release callback exactly once, when the frame is dropped.
pub struct FrameRelease(Option<Box<dyn FnOnce() + Send>>);

impl FrameRelease {
    pub fn new<F>(release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self(Some(Box::new(release)))
    }
}

impl Drop for FrameRelease {
    fn drop(&mut self) {
        if let Some(release) = self.0.take() {
            release();
        }
    }
}

impl fmt::Debug for FrameRelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FrameRelease")
    }
}

/// A camera frame as RGBA8 pixels. Dropping it releases the source handle.
#[derive(Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub rotation_degrees: u32,
    pub timestamp: Instant,
    release: Option<FrameRelease>,
}

impl Frame {
    pub fn new(rgba: Vec<u8>, width: u32, height: u32, rotation_degrees: u32) -> Self {
        Self {
            rgba,
            width,
            height,
            rotation_degrees,
            timestamp: Instant::now(),
            release: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: Instant) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_release(mut self, release: FrameRelease) -> Self {
        self.release = Some(release);
        self
    }

    /// Pixel copy for the preview path; the copy holds no release handle.
    pub fn preview(&self) -> PreviewImage {
        PreviewImage {
            rgba: self.rgba.clone(),
            width: self.width,
            height: self.height,
            rotation_degrees: self.rotation_degrees,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PreviewImage {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub rotation_degrees: u32,
}

/// Immutable result of one accepted frame, handed from the worker to the
/// render side.
#[derive(Clone, Debug)]
pub struct PoseSnapshot {
    pub keypoints: Vec<Keypoint>,
    pub context: FrameContext,
    pub space: CoordinateSpace,
    pub timestamp: Instant,
}

impl PoseSnapshot {
    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    pub fn keypoint(&self, part: BodyPart) -> Option<&Keypoint> {
        self.keypoints.iter().find(|kp| kp.body_part == part)
    }
}

#[derive(Clone, Debug)]
pub enum PoseUpdate {
    Pose(PoseSnapshot),
    /// The engine is gone for this session; the render side should disable
    /// the feature instead of waiting for more poses.
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    #[test]
    fn channel_table_round_trips() {
        for (channel, part) in CHANNEL_ORDER.iter().enumerate() {
            assert_eq!(part.channel(), channel);
            assert_eq!(BodyPart::from_channel(channel), Some(*part));
        }
        assert_eq!(BodyPart::from_channel(NUM_KEYPOINTS), None);
    }

    #[test]
    fn channel_order_matches_movenet_layout() {
        assert_eq!(BodyPart::from_channel(0), Some(BodyPart::Nose));
        assert_eq!(BodyPart::from_channel(5), Some(BodyPart::LeftShoulder));
        assert_eq!(BodyPart::from_channel(16), Some(BodyPart::RightAnkle));
    }

    #[test]
    fn dropping_frame_runs_release_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let frame = Frame::new(vec![0; 4], 1, 1, 0).with_release(FrameRelease::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let preview = frame.preview();
        drop(preview);
        assert_eq!(released.load(Ordering::SeqCst), 0);

        drop(frame);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
