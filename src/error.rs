//! Module: Error
//! But: Error taxonomy shared by the resolver, the derivers and the worker pool.
//!
//! *Signed: kryon.kas*

use thiserror::Error;

/// Errors raised while building a key-pair pool.
#[derive(Debug, Error)]
pub enum KeyPoolError {
    /// Seed material is missing or cannot produce a master key.
    #[error("invalid seed material: {0}")]
    InvalidSeed(String),

    /// The derivation path template is malformed.
    #[error("invalid path template: {0}")]
    InvalidPathTemplate(String),

    /// A single connection index failed to derive.
    #[error("derivation failed at index {index}: {reason}")]
    Derivation { index: u32, reason: String },

    /// A partitioned-pool worker did not complete its slice.
    #[error("worker {worker} failed: {cause}")]
    WorkerFailure { worker: usize, cause: WorkerFailureCause },

    /// Two slices produced the same connection index.
    #[error("duplicate connection index {0} in merged pool")]
    DuplicateIndex(u32),

    /// Pool configuration or job sizing is unusable.
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    /// The worker thread pool could not be built.
    #[error("worker pool unavailable: {0}")]
    WorkerPool(String),
}

/// Why a worker was declared failed.
#[derive(Debug, Error)]
pub enum WorkerFailureCause {
    #[error("no readiness acknowledgment before timeout")]
    ReadinessTimeout,

    #[error("no result before timeout")]
    Timeout,

    #[error("worker exited without replying")]
    Lost,

    #[error(transparent)]
    Failed(Box<KeyPoolError>),
}

/// Result type for key-pool operations.
pub type Result<T> = std::result::Result<T, KeyPoolError>;

impl KeyPoolError {
    /// Wraps `self` as the failure of `worker`.
    pub fn in_worker(self, worker: usize) -> Self {
        KeyPoolError::WorkerFailure {
            worker,
            cause: WorkerFailureCause::Failed(Box::new(self)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivation_error_names_index() {
        let err = KeyPoolError::Derivation { index: 42, reason: "bad path".into() };
        assert_eq!(err.to_string(), "derivation failed at index 42: bad path");
    }

    #[test]
    fn test_worker_failure_wraps_inner_error() {
        let err = KeyPoolError::Derivation { index: 7, reason: "overflow".into() }.in_worker(3);
        assert_eq!(
            err.to_string(),
            "worker 3 failed: derivation failed at index 7: overflow"
        );
        match err {
            KeyPoolError::WorkerFailure { worker, cause: WorkerFailureCause::Failed(inner) } => {
                assert_eq!(worker, 3);
                assert!(matches!(*inner, KeyPoolError::Derivation { index: 7, .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
