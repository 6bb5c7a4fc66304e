pub use gcam_core as core;
pub use gcam_stereo as stereo;

pub use gcam_core::{Camera, CameraModel, Error, Eucm, Pinhole, Result, Transformation};
pub use gcam_stereo::{CurveStereo, DisparityGrid, DistanceGrid, StereoParameters};

/// Initialize a single global Rayon thread pool for all CPU-parallel stages.
///
/// Call this once at application startup before running stereo workloads.
/// Repeated calls are idempotent and return the first initialization result.
///
/// Priority order:
/// 1. explicit `num_threads`
/// 2. `GCAM_CPU_THREADS` env var
/// 3. Rayon default
pub fn init_thread_pool(num_threads: Option<usize>) -> Result<()> {
    gcam_core::init_global_thread_pool(num_threads)
}
