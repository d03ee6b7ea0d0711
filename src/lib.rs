pub mod assets;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod still;
pub mod types;
pub mod viewer;

pub use error::{PoseError, PoseResult};
