//! Module: Partition
//! But: Splits a pool refill into per-worker slices and drives the worker pool.
//!
//! *Signed: kryon.kas*

use std::ops::Range;

use tracing::{debug, info};

use crate::config::PoolConfig;
use crate::error::{KeyPoolError, Result};
use crate::keypair::KeyPair;
use crate::merge::merge;
use crate::seed::SeedMaterial;
use crate::worker::WorkerPool;

/// Contiguous index range owned by one worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SliceAssignment {
    pub worker: usize,
    pub start: u32,
    pub count: u32,
}

impl SliceAssignment {
    pub fn indices(&self) -> Range<u32> {
        // NB: plan_slices guarantees start + count fits in u32
        self.start..self.start.saturating_add(self.count)
    }
}

/// One refill request from the connection manager.
#[derive(Clone, Debug)]
pub struct DerivationJob {
    pub seed: SeedMaterial,
    /// Connections already holding a key pair.
    pub connections_count: u32,
    /// Unused key pairs still available to the caller.
    pub connections_key_pair_count: u32,
    /// Last generated index when continuing a previous pool, `None` for a fresh one.
    pub resume_from: Option<u32>,
}

impl DerivationJob {
    pub fn new(seed: SeedMaterial, connections_count: u32) -> Self {
        Self {
            seed,
            connections_count,
            connections_key_pair_count: 0,
            resume_from: None,
        }
    }

    pub fn with_available(mut self, connections_key_pair_count: u32) -> Self {
        self.connections_key_pair_count = connections_key_pair_count;
        self
    }

    pub fn resuming_from(mut self, last_index: u32) -> Self {
        self.resume_from = Some(last_index);
        self
    }

    /// Takes a persisted counter where `-1` (any negative) means "never generated".
    pub fn with_resume_index(mut self, last_index: i64) -> Self {
        self.resume_from = (last_index >= 0).then(|| u32::try_from(last_index).unwrap_or(u32::MAX));
        self
    }
}

// --- Planification ---

/// Computes each worker's slice.
///
/// Resuming: every worker takes `resume_slice_size` indices after the
/// existing connections. Fresh: every worker takes
/// `ceil((fresh_base_count + connections_count) / fresh_divisor)` indices
/// from index 0, whatever the worker count.
pub fn plan_slices(
    config: &PoolConfig,
    connections_count: u32,
    resume_from: Option<u32>,
) -> Result<Vec<SliceAssignment>> {
    config.validate()?;
    let per_worker = match resume_from {
        Some(_) => u64::from(config.resume_slice_size),
        None => (u64::from(config.fresh_base_count) + u64::from(connections_count))
            .div_ceil(u64::from(config.fresh_divisor)),
    };

    (0..config.worker_count)
        .map(|worker| {
            let offset = worker as u64 * per_worker;
            let start = match resume_from {
                Some(_) => u64::from(connections_count) + offset,
                None => offset,
            };

            let end = start + per_worker;
            if end > u64::from(u32::MAX) {
                return Err(KeyPoolError::InvalidConfig(format!(
                    "slice of worker {worker} ends at {end}, beyond the index space"
                )));
            }

            Ok(SliceAssignment {
                worker,
                start: start as u32,
                count: per_worker as u32,
            })
        })
        .collect()
}

// --- Exécution ---

/// Refills the pool across `config.worker_count` isolated workers.
///
/// Returns nothing when the caller still has `refill_threshold` pairs or
/// more. Otherwise every worker must succeed (subject to the retry policy)
/// and the merged result is ordered by connection index.
pub fn generate_partitioned(job: &DerivationJob, config: &PoolConfig) -> Result<Vec<KeyPair>> {
    config.validate()?;

    if !config.needs_refill(job.connections_key_pair_count) {
        debug!(available = job.connections_key_pair_count, "Pool not depleted, no refill");
        return Ok(Vec::new());
    }

    // Bad seed material is the caller's error, not a worker failure
    job.seed.resolve()?;

    let assignments = plan_slices(config, job.connections_count, job.resume_from)?;
    info!(
        workers = assignments.len(),
        connections = job.connections_count,
        resuming = job.resume_from.is_some(),
        "Starting partitioned refill"
    );

    let slices = WorkerPool::new(config)?.run(&job.seed, assignments)?;
    let pairs = merge(slices)?;

    info!(count = pairs.len(), "Partitioned refill complete");
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_fresh() {
        let config = PoolConfig::default();
        let plan = plan_slices(&config, 3, None).unwrap();

        // ceil(103 / 5) = 21
        assert_eq!(plan.len(), 5);
        for (i, slice) in plan.iter().enumerate() {
            assert_eq!(slice.worker, i);
            assert_eq!(slice.count, 21);
            assert_eq!(slice.start, i as u32 * 21);
        }
    }

    #[test]
    fn test_plan_resume() {
        let config = PoolConfig::default();
        let plan = plan_slices(&config, 37, Some(36)).unwrap();

        let starts: Vec<u32> = plan.iter().map(|s| s.start).collect();
        assert_eq!(starts, vec![37, 57, 77, 97, 117]);
        assert!(plan.iter().all(|s| s.count == 20));
    }

    #[test]
    fn test_plan_rejects_overflow() {
        let config = PoolConfig::default();
        let result = plan_slices(&config, u32::MAX - 10, Some(0));
        assert!(matches!(result, Err(KeyPoolError::InvalidConfig(_))));
    }

    #[test]
    fn test_plan_slice_size_ignores_worker_count() {
        let config = PoolConfig::default().with_worker_count(8);
        let plan = plan_slices(&config, 0, None).unwrap();
        assert_eq!(plan.len(), 8);
        // ceil(100 / 5) = 20, still
        assert!(plan.iter().all(|s| s.count == 20));
        assert_eq!(plan[7].indices(), 140..160);

        let config = config.with_fresh_divisor(10);
        let plan = plan_slices(&config, 0, None).unwrap();
        assert_eq!(plan[7].indices(), 70..80);
    }

    #[test]
    fn test_resume_index_mapping() {
        let job = DerivationJob::new(SeedMaterial::default(), 0);
        assert_eq!(job.clone().with_resume_index(-1).resume_from, None);
        assert_eq!(job.clone().with_resume_index(0).resume_from, Some(0));
        assert_eq!(job.with_resume_index(42).resume_from, Some(42));
    }

    #[test]
    fn test_no_refill_when_pool_is_full() {
        // Seed is never touched when no refill is due
        let job = DerivationJob::new(SeedMaterial::default(), 10).with_available(20);
        let pairs = generate_partitioned(&job, &PoolConfig::default()).unwrap();
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_invalid_seed_surfaces_directly() {
        let job = DerivationJob::new(SeedMaterial::default(), 0);
        let result = generate_partitioned(&job, &PoolConfig::default());
        assert!(matches!(result, Err(KeyPoolError::InvalidSeed(_))));
    }
}
