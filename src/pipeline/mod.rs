pub mod camera;
pub mod decoder;
pub mod encoder;
pub mod engine;
pub mod frame_gate;
pub mod mapper;
pub mod overlay;
pub mod rgba_converter;
pub mod skeleton;
pub mod worker;

// Re-exports for convenience
#[cfg(feature = "camera-nokhwa")]
pub use camera::{CameraDevice, CameraStream, available_cameras, start_camera_stream};
pub use camera::FrameRouter;
pub use decoder::KeypointDecoder;
pub use encoder::{InputDtype, InputSpec, TensorEncoder};
pub use engine::{ModelContract, OrtEngine, OutputTensor, PoseEngine};
pub use frame_gate::FrameGate;
pub use mapper::{ViewTransform, map_keypoints};
pub use overlay::{Canvas, OverlayRenderer, OverlayState, OverlayToggles};
pub use skeleton::RgbaCanvas;
pub use worker::{LatestSender, PosePipeline, latest_channel, start_pose_worker};
