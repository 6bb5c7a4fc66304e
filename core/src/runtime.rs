//! Process-wide worker pool for the data-parallel stereo stages.
//!
//! Cost, aggregation, selection and triangulation all run on rayon's global
//! pool. The pool can be sized once, before the first parallel call.

use crate::{Error, Result};
use rayon::ThreadPoolBuilder;
use std::sync::OnceLock;
use tracing::debug;

/// Environment variable consulted when no explicit worker count is given.
pub const CPU_THREADS_ENV: &str = "GCAM_CPU_THREADS";

/// Worker count the pool was built with, or the reason it was not.
/// `None` inside `Ok` means rayon picked its own default.
static POOL_SIZE: OnceLock<std::result::Result<Option<usize>, String>> = OnceLock::new();

/// Where the worker count for the global pool comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadCount {
    Explicit(usize),
    Environment(usize),
    RayonDefault,
}

impl ThreadCount {
    /// Pick the worker count from an explicit request, else from
    /// `lookup(CPU_THREADS_ENV)`, else leave it to rayon.
    pub fn resolve<F>(requested: Option<usize>, lookup: F) -> Result<Self>
    where
        F: FnOnce(&str) -> Option<String>,
    {
        if let Some(n) = requested {
            return positive(n, "requested thread count").map(Self::Explicit);
        }
        match lookup(CPU_THREADS_ENV) {
            None => Ok(Self::RayonDefault),
            Some(raw) => {
                let n = raw.trim().parse::<usize>().map_err(|_| {
                    Error::invalid_parameters(format!(
                        "{CPU_THREADS_ENV} must be a positive integer, got '{raw}'"
                    ))
                })?;
                positive(n, CPU_THREADS_ENV).map(Self::Environment)
            }
        }
    }

    pub fn workers(self) -> Option<usize> {
        match self {
            Self::Explicit(n) | Self::Environment(n) => Some(n),
            Self::RayonDefault => None,
        }
    }
}

fn positive(n: usize, what: &str) -> Result<usize> {
    if n == 0 {
        Err(Error::invalid_parameters(format!("{what} must be >= 1")))
    } else {
        Ok(n)
    }
}

/// Size rayon's global pool for the matching stages.
///
/// An explicit `num_threads` wins over `GCAM_CPU_THREADS`; without either,
/// rayon's default applies. Only the first call builds the pool. Later calls
/// return its outcome regardless of their argument.
pub fn init_global_thread_pool(num_threads: Option<usize>) -> Result<()> {
    let outcome = POOL_SIZE.get_or_init(|| {
        let count = ThreadCount::resolve(num_threads, |key| std::env::var(key).ok())
            .map_err(|e| e.to_string())?;
        let workers = count.workers();
        ThreadPoolBuilder::new()
            .num_threads(workers.unwrap_or(0))
            .build_global()
            .map_err(|e| e.to_string())?;
        debug!(?count, "global thread pool ready");
        Ok(workers)
    });
    match outcome {
        Ok(_) => Ok(()),
        Err(msg) => Err(Error::RuntimeError(msg.clone())),
    }
}

/// Worker count fixed by [`init_global_thread_pool`], if it ran and
/// was given one.
pub fn configured_cpu_threads() -> Option<usize> {
    POOL_SIZE.get().and_then(|outcome| outcome.clone().ok().flatten())
}

pub fn current_cpu_threads() -> usize {
    rayon::current_num_threads()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_with(value: Option<&str>) -> impl FnOnce(&str) -> Option<String> + '_ {
        move |key: &str| {
            assert_eq!(key, CPU_THREADS_ENV);
            value.map(str::to_string)
        }
    }

    #[test]
    fn test_explicit_count_wins_over_environment() {
        let count = ThreadCount::resolve(Some(3), env_with(Some("8"))).unwrap();
        assert_eq!(count, ThreadCount::Explicit(3));
        assert_eq!(count.workers(), Some(3));
    }

    #[test]
    fn test_environment_count_is_trimmed() {
        let count = ThreadCount::resolve(None, env_with(Some(" 2 "))).unwrap();
        assert_eq!(count, ThreadCount::Environment(2));
    }

    #[test]
    fn test_missing_environment_leaves_rayon_default() {
        let count = ThreadCount::resolve(None, env_with(None)).unwrap();
        assert_eq!(count, ThreadCount::RayonDefault);
        assert_eq!(count.workers(), None);
    }

    #[test]
    fn test_zero_and_garbage_counts_are_rejected() {
        for (requested, raw) in [(Some(0), None), (None, Some("0")), (None, Some("many"))] {
            let result = ThreadCount::resolve(requested, env_with(raw));
            assert!(matches!(result, Err(Error::InvalidParameters(_))), "{requested:?} {raw:?}");
        }
    }
}
