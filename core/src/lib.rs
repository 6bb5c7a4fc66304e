//! Shared building blocks for generalized-camera stereo: camera models,
//! rigid transforms, grayscale image primitives and the common error type.

pub mod camera;
pub mod geometry;
pub mod image;
pub mod runtime;

pub use self::camera::*;
pub use self::geometry::*;
pub use self::image::*;
pub use self::runtime::{
    configured_cpu_threads, current_cpu_threads, init_global_thread_pool, ThreadCount,
};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Projection failure: {0}")]
    ProjectionFailure(String),

    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("Runtime error: {0}")]
    RuntimeError(String),
}

impl Error {
    pub fn invalid_parameters(msg: impl Into<String>) -> Self {
        Self::InvalidParameters(msg.into())
    }

    pub fn degenerate(msg: impl Into<String>) -> Self {
        Self::DegenerateGeometry(msg.into())
    }

    /// Per-point failures that leave the rest of a frame usable.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::ProjectionFailure(_) | Self::DegenerateGeometry(_))
    }
}
