use std::{thread, time::Instant};

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded};

use super::{
    decoder::KeypointDecoder,
    encoder::TensorEncoder,
    engine::{ModelContract, PoseEngine},
};
use crate::{
    error::PoseResult,
    types::{Frame, FrameContext, Keypoint, PoseSnapshot, PoseUpdate},
};

const STATS_EVERY: u64 = 30;

/// Sending half of a one-slot channel where a new value replaces the one
/// still waiting. Replaced frames are dropped, which releases them.
pub struct LatestSender<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Clone for LatestSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}

impl<T> LatestSender<T> {
    /// Returns the value that was replaced, if any.
    pub fn send(&self, value: T) -> Option<T> {
        let mut value = value;
        let mut replaced = None;
        loop {
            match self.tx.try_send(value) {
                Ok(()) => return replaced,
                Err(TrySendError::Full(back)) => {
                    value = back;
                    match self.rx.try_recv() {
                        Ok(stale) => replaced = Some(stale),
                        Err(TryRecvError::Empty) => {}
                        Err(TryRecvError::Disconnected) => return replaced,
                    }
                }
                Err(TrySendError::Disconnected(_)) => return replaced,
            }
        }
    }
}

pub fn latest_channel<T>() -> (LatestSender<T>, Receiver<T>) {
    let (tx, rx) = bounded(1);
    (
        LatestSender {
            tx,
            rx: rx.clone(),
        },
        rx,
    )
}

/// Blocks for the next value, then skips to the newest one queued.
pub fn recv_latest<T>(rx: &Receiver<T>) -> Option<T> {
    let mut value = rx.recv().ok()?;
    while let Ok(newer) = rx.try_recv() {
        value = newer;
    }
    Some(value)
}

/// Encoder, engine and decoder for one model variant, run synchronously.
pub struct PosePipeline<E: PoseEngine> {
    engine: E,
    encoder: TensorEncoder,
    decoder: KeypointDecoder,
}

impl<E: PoseEngine> PosePipeline<E> {
    pub fn new(engine: E, contract: &ModelContract) -> Self {
        Self {
            engine,
            encoder: TensorEncoder::new(contract.input),
            decoder: contract.decoder,
        }
    }

    /// Runs one frame. Encoding and decoding failures yield an empty snapshot;
    /// only a failure that ends the session is returned as an error. The frame
    /// is released as soon as its tensor is built.
    pub fn process(&mut self, frame: Frame) -> PoseResult<PoseSnapshot> {
        let timestamp = frame.timestamp;
        let encoded = self.encoder.encode(&frame);
        let fallback_context = FrameContext {
            source_width: frame.width,
            source_height: frame.height,
            rotation_degrees: frame.rotation_degrees % 360,
        };
        drop(frame);

        let encoded = match encoded {
            Ok(encoded) => encoded,
            Err(err) => {
                log::warn!("skipping frame: {err}");
                return Ok(self.snapshot(Vec::new(), fallback_context, timestamp));
            }
        };

        log::debug!(
            "encoded {}x{} frame (rotation {}) into {:?}",
            encoded.context.source_width,
            encoded.context.source_height,
            encoded.context.rotation_degrees,
            encoded.tensor.shape()
        );

        let started = Instant::now();
        let outputs = match self.engine.infer(&encoded.tensor) {
            Ok(outputs) => {
                log::debug!(
                    "inference took {:?}, output sizes {:?}",
                    started.elapsed(),
                    outputs.iter().map(|o| o.data.len()).collect::<Vec<_>>()
                );
                outputs
            }
            Err(err) if err.is_per_frame() => {
                log::warn!("skipping frame: {err}");
                return Ok(self.snapshot(Vec::new(), encoded.context, timestamp));
            }
            Err(err) => return Err(err),
        };

        let decoded = self.decoder.decode_or_empty(&outputs, &encoded.context);
        Ok(self.snapshot(decoded.keypoints, encoded.context, timestamp))
    }

    pub fn close(&mut self) {
        self.engine.close();
    }

    fn snapshot(
        &self,
        keypoints: Vec<Keypoint>,
        context: FrameContext,
        timestamp: Instant,
    ) -> PoseSnapshot {
        PoseSnapshot {
            keypoints,
            context,
            space: self.decoder.space(),
            timestamp,
        }
    }
}

/// Processes frames until the frame channel closes or the engine becomes
/// unavailable. In the latter case a final `Unavailable` update is sent.
pub fn run_worker_loop<E: PoseEngine>(
    mut pipeline: PosePipeline<E>,
    frame_rx: Receiver<Frame>,
    update_tx: LatestSender<PoseUpdate>,
) {
    let mut processed: u64 = 0;
    let mut empty: u64 = 0;

    while let Some(frame) = recv_latest(&frame_rx) {
        let started = Instant::now();
        match pipeline.process(frame) {
            Ok(snapshot) => {
                processed += 1;
                if snapshot.is_empty() {
                    empty += 1;
                }
                log::trace!(
                    "frame processed in {:?} ({} keypoints)",
                    started.elapsed(),
                    snapshot.keypoints.len()
                );
                update_tx.send(PoseUpdate::Pose(snapshot));
            }
            Err(err) => {
                log::error!("pose inference stopped: {err}");
                pipeline.close();
                update_tx.send(PoseUpdate::Unavailable(err.to_string()));
                return;
            }
        }

        if processed % STATS_EVERY == 0 {
            log::debug!("pose worker: {processed} frames processed, {empty} without keypoints");
        }
    }

    pipeline.close();
    log::info!("pose worker finished after {processed} frames");
}

/// Loads the engine on the worker thread, then runs the loop. A load failure
/// is reported as `Unavailable` so the render side can disable the overlay.
pub fn start_pose_worker<E, F>(
    load: F,
    contract: ModelContract,
    frame_rx: Receiver<Frame>,
    update_tx: LatestSender<PoseUpdate>,
) -> thread::JoinHandle<()>
where
    E: PoseEngine,
    F: FnOnce(&ModelContract) -> PoseResult<E> + Send + 'static,
{
    thread::spawn(move || {
        let engine = match load(&contract) {
            Ok(engine) => engine,
            Err(err) => {
                log::error!("failed to start {} engine: {err}", contract.name);
                update_tx.send(PoseUpdate::Unavailable(err.to_string()));
                return;
            }
        };

        run_worker_loop(PosePipeline::new(engine, &contract), frame_rx, update_tx);
    })
}
