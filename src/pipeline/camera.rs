use crate::types::{Frame, PreviewImage};

use super::{frame_gate::FrameGate, worker::LatestSender};

#[cfg(feature = "camera-nokhwa")]
pub use self::nokhwa_source::{
    CameraDevice, CameraStream, available_cameras, start_camera_stream,
};

/// Sends every captured frame to the preview and the frames the gate admits
/// to the pose worker.
pub struct FrameRouter {
    gate: FrameGate,
    preview_tx: LatestSender<PreviewImage>,
    frame_tx: LatestSender<Frame>,
    captured: u64,
    admitted: u64,
}

impl FrameRouter {
    pub fn new(
        gate: FrameGate,
        preview_tx: LatestSender<PreviewImage>,
        frame_tx: LatestSender<Frame>,
    ) -> Self {
        Self {
            gate,
            preview_tx,
            frame_tx,
            captured: 0,
            admitted: 0,
        }
    }

    /// Returns whether the frame was handed to the worker.
    pub fn route(&mut self, frame: Frame) -> bool {
        self.captured += 1;
        self.preview_tx.send(frame.preview());

        let timestamp = frame.timestamp;
        let Some(frame) = self.gate.filter(timestamp, frame) else {
            return false;
        };
        self.admitted += 1;
        if self.frame_tx.send(frame).is_some() {
            log::trace!("pose worker busy, replaced pending frame");
        }
        true
    }

    pub fn counts(&self) -> (u64, u64) {
        (self.captured, self.admitted)
    }
}

#[cfg(feature = "camera-nokhwa")]
mod nokhwa_source {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
        thread,
        time::Instant,
    };

    use anyhow::{Result, anyhow};
    use nokhwa::{
        Camera,
        pixel_format::RgbFormat,
        query,
        utils::{
            ApiBackend, CameraIndex, CameraInfo, FrameFormat, RequestedFormat,
            RequestedFormatType,
        },
    };

    use super::FrameRouter;
    use crate::pipeline::rgba_converter;

    // Prefer pixel formats that are widely supported on macOS (the built-in
    // cameras often reject YUYV even though Nokhwa reports it).
    const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
        FrameFormat::RAWRGB,
        FrameFormat::RAWBGR,
        FrameFormat::GRAY,
        FrameFormat::YUYV,
        FrameFormat::NV12,
        FrameFormat::MJPEG,
    ];

    const STATS_EVERY: u64 = 300;

    fn requested_formats() -> [RequestedFormat<'static>; 4] {
        [
            RequestedFormat::with_formats(
                RequestedFormatType::AbsoluteHighestFrameRate,
                PREFERRED_PIXEL_FORMATS,
            ),
            RequestedFormat::with_formats(
                RequestedFormatType::AbsoluteHighestResolution,
                PREFERRED_PIXEL_FORMATS,
            ),
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
        ]
    }

    #[derive(Clone, Debug)]
    pub struct CameraDevice {
        pub index: CameraIndex,
        pub label: String,
    }

    /// Capture thread handle. Dropping it stops capture and joins the thread.
    #[derive(Debug)]
    pub struct CameraStream {
        stop: Arc<AtomicBool>,
        handle: Option<thread::JoinHandle<()>>,
    }

    impl CameraStream {
        pub fn stop(mut self) {
            self.shutdown();
        }

        fn shutdown(&mut self) {
            self.stop.store(true, Ordering::SeqCst);
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
        }
    }

    impl Drop for CameraStream {
        fn drop(&mut self) {
            self.shutdown();
        }
    }

    pub fn available_cameras() -> Result<Vec<CameraDevice>> {
        let cameras = query(ApiBackend::Auto)?;
        Ok(cameras
            .into_iter()
            .map(|info| CameraDevice {
                index: info.index().clone(),
                label: format_camera_label(&info),
            })
            .collect())
    }

    fn format_camera_label(info: &CameraInfo) -> String {
        format!("{} ({})", info.human_name(), info.index())
    }

    fn build_camera(index: CameraIndex) -> Result<Camera> {
        let mut last_err = None;

        for requested in requested_formats() {
            match Camera::new(index.clone(), requested) {
                Ok(mut camera) => match camera.open_stream() {
                    Ok(()) => return Ok(camera),
                    Err(err) => last_err = Some(err.into()),
                },
                Err(err) => last_err = Some(err.into()),
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("failed to open camera with any supported format")))
    }

    /// Opens the camera and starts capturing on a background thread. Nokhwa
    /// reports no sensor orientation, so `rotation_degrees` is supplied by the
    /// caller and stamped on every frame.
    pub fn start_camera_stream(
        camera: u32,
        rotation_degrees: u32,
        mut router: FrameRouter,
    ) -> Result<CameraStream> {
        let index = CameraIndex::Index(camera);
        // Fail fast before spawning the capture thread.
        build_camera(index.clone())?;

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let handle = thread::spawn(move || {
            let mut camera = match build_camera(index) {
                Ok(cam) => cam,
                Err(err) => {
                    log::error!("failed to open camera: {err:?}");
                    return;
                }
            };
            log::info!("camera opened with format {}", camera.camera_format());

            while !stop_flag.load(Ordering::Relaxed) {
                let frame_start = Instant::now();
                let buffer = match camera.frame() {
                    Ok(buffer) => buffer,
                    Err(err) => {
                        log::warn!(
                            "camera frame read failed (after {:?}): {err:?}",
                            frame_start.elapsed()
                        );
                        continue;
                    }
                };

                let resolution = buffer.resolution();
                let frame = match rgba_converter::to_frame(
                    rgba_converter::layout_of(buffer.source_frame_format()),
                    buffer.buffer(),
                    resolution.width_x,
                    resolution.height_y,
                    rotation_degrees,
                ) {
                    Ok(frame) => frame,
                    Err(err) => {
                        log::warn!("failed to decode camera frame {err:?}");
                        continue;
                    }
                };

                router.route(frame);
                let (captured, admitted) = router.counts();
                if captured % STATS_EVERY == 0 {
                    log::debug!(
                        "camera: {captured} frames captured, {admitted} sent to pose worker"
                    );
                }
            }

            if let Err(err) = camera.stop_stream() {
                log::warn!("failed to stop camera stream: {err:?}");
            }
        });

        Ok(CameraStream {
            stop,
            handle: Some(handle),
        })
    }
}
