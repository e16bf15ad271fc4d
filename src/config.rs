//! Module: Config
//! But: Sizing policy and timeouts for the partitioned worker pool.
//!
//! *Signed: kryon.kas*

use std::time::Duration;

use crate::error::{KeyPoolError, Result};
use crate::path::PathTemplate;

// --- Défauts ---

pub const DEFAULT_WORKER_COUNT: usize = 5;
/// Refill only when fewer unused pairs than this remain.
pub const DEFAULT_REFILL_THRESHOLD: u32 = 20;
pub const DEFAULT_RESUME_SLICE_SIZE: u32 = 20;
/// Pairs generated on a fresh start on top of the existing connections.
pub const DEFAULT_FRESH_BASE_COUNT: u32 = 100;
/// Fresh-start slice size is `ceil((base + connections) / divisor)`.
pub const DEFAULT_FRESH_DIVISOR: u32 = 5;
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(120);

/// What to do when a worker reports an error or disappears.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Fail the whole job on the first worker failure.
    #[default]
    Abort,
    /// Respawn a worker for the same slice, at most `max_retries` times.
    Retry { max_retries: u32 },
}

impl FailurePolicy {
    /// Whether a slice that already failed `failures` times may run again.
    pub fn allows_retry(self, failures: u32) -> bool {
        match self {
            FailurePolicy::Abort => false,
            FailurePolicy::Retry { max_retries } => failures <= max_retries,
        }
    }
}

/// Partitioned pool configuration.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    pub worker_count: usize,
    pub refill_threshold: u32,
    pub resume_slice_size: u32,
    pub fresh_base_count: u32,
    /// Independent of `worker_count`.
    pub fresh_divisor: u32,
    pub path_template: PathTemplate,
    /// Upper bound on a worker's readiness handshake.
    pub ready_timeout: Duration,
    /// Upper bound on a worker's derivation. `None` waits forever.
    pub job_timeout: Option<Duration>,
    pub failure_policy: FailurePolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            refill_threshold: DEFAULT_REFILL_THRESHOLD,
            resume_slice_size: DEFAULT_RESUME_SLICE_SIZE,
            fresh_base_count: DEFAULT_FRESH_BASE_COUNT,
            fresh_divisor: DEFAULT_FRESH_DIVISOR,
            path_template: PathTemplate::default(),
            ready_timeout: DEFAULT_READY_TIMEOUT,
            job_timeout: Some(DEFAULT_JOB_TIMEOUT),
            failure_policy: FailurePolicy::Abort,
        }
    }
}

impl PoolConfig {
    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_fresh_divisor(mut self, fresh_divisor: u32) -> Self {
        self.fresh_divisor = fresh_divisor;
        self
    }

    pub fn with_path_template(mut self, path_template: PathTemplate) -> Self {
        self.path_template = path_template;
        self
    }

    pub fn with_job_timeout(mut self, job_timeout: Option<Duration>) -> Self {
        self.job_timeout = job_timeout;
        self
    }

    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    /// True when `available` unused pairs are too few and a refill should run.
    pub fn needs_refill(&self, available: u32) -> bool {
        available < self.refill_threshold
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(KeyPoolError::InvalidConfig("worker_count must be at least 1".into()));
        }
        if self.fresh_divisor == 0 {
            return Err(KeyPoolError::InvalidConfig("fresh_divisor must be at least 1".into()));
        }
        if self.resume_slice_size == 0 {
            return Err(KeyPoolError::InvalidConfig("resume_slice_size must be at least 1".into()));
        }
        if self.ready_timeout.is_zero() {
            return Err(KeyPoolError::InvalidConfig("ready_timeout must be non-zero".into()));
        }
        Ok(())
    }
}
