use thiserror::Error;

pub type PoseResult<T> = std::result::Result<T, PoseError>;

#[derive(Debug, Error)]
pub enum PoseError {
    /// Source frame or buffer does not match its declared geometry.
    #[error("encoding error: {0}")]
    Encoding(String),
    /// Output tensors do not match the decoder's declared layout.
    #[error("decode error: {0}")]
    Decode(String),
    /// A single inference call failed; the engine stays usable.
    #[error("inference error: {0}")]
    Inference(String),
    /// The inference engine is not loaded or has been closed.
    #[error("inference unavailable: {0}")]
    InferenceUnavailable(String),
    /// Model declares shapes that differ from the configured contract.
    #[error("model contract mismatch: {0}")]
    Contract(String),
}

impl PoseError {
    /// Per-frame errors are skipped; everything else ends the session.
    pub fn is_per_frame(&self) -> bool {
        matches!(
            self,
            PoseError::Encoding(_) | PoseError::Decode(_) | PoseError::Inference(_)
        )
    }
}
