//! Module: Worker
//! But: Isolated slice workers, readiness handshake and the join loop that
//! collects their results.
//!
//! *Signed: kryon.kas*

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, warn};

use crate::config::PoolConfig;
use crate::error::{KeyPoolError, Result, WorkerFailureCause};
use crate::keypair::KeyPair;
use crate::partition::SliceAssignment;
use crate::path::{PathTemplate, derive_range};
use crate::seed::SeedMaterial;

// --- Messages ---

/// Work order handed to one worker. Carries its own copy of the seed.
#[derive(Clone, Debug)]
pub struct WorkerRequest {
    pub seed: SeedMaterial,
    pub template: PathTemplate,
    pub start_index: u32,
    pub count: u32,
}

impl WorkerRequest {
    /// Derives `start_index..start_index + count` from a freshly resolved root.
    pub fn execute(&self) -> Result<Vec<KeyPair>> {
        let root = self.seed.resolve()?;
        derive_range(&root, &self.template, self.start_index, self.count)
    }
}

/// Turns a request into its slice. `WorkerRequest::execute` outside of tests.
type Executor = Arc<dyn Fn(&WorkerRequest) -> Result<Vec<KeyPair>> + Send + Sync>;

/// A worker's single reply.
#[derive(Debug)]
pub enum WorkerResponse {
    Slice(Vec<KeyPair>),
    Error(KeyPoolError),
}

#[derive(Debug)]
enum WorkerEvent {
    Ready { worker: usize, attempt: u32 },
    Finished { worker: usize, attempt: u32, response: WorkerResponse },
    Lost { worker: usize, attempt: u32 },
}

impl WorkerEvent {
    fn origin(&self) -> (usize, u32) {
        match *self {
            WorkerEvent::Ready { worker, attempt }
            | WorkerEvent::Finished { worker, attempt, .. }
            | WorkerEvent::Lost { worker, attempt } => (worker, attempt),
        }
    }
}

// --- Côté worker ---

/// Sends the worker's outcome. Reports `Lost` if dropped before that,
/// e.g. while unwinding from a panic.
struct Reporter {
    worker: usize,
    attempt: u32,
    events: Sender<WorkerEvent>,
    settled: bool,
}

impl Reporter {
    fn ready(&self) -> bool {
        self.events
            .send(WorkerEvent::Ready { worker: self.worker, attempt: self.attempt })
            .is_ok()
    }

    fn finish(mut self, response: WorkerResponse) {
        self.settled = true;
        let _ = self.events.send(WorkerEvent::Finished {
            worker: self.worker,
            attempt: self.attempt,
            response,
        });
    }

    fn dismiss(mut self) {
        self.settled = true;
    }
}

impl Drop for Reporter {
    fn drop(&mut self) {
        if !self.settled {
            let _ = self.events.send(WorkerEvent::Lost { worker: self.worker, attempt: self.attempt });
        }
    }
}

/// Handshake, one request, one reply, exit.
fn run_worker(reporter: Reporter, requests: Receiver<WorkerRequest>, execute: Executor) {
    if !reporter.ready() {
        reporter.dismiss();
        return;
    }

    match requests.recv() {
        Ok(request) => {
            let response = match execute(&request) {
                Ok(pairs) => WorkerResponse::Slice(pairs),
                Err(err) => WorkerResponse::Error(err),
            };
            reporter.finish(response);
        }
        // Reclaimed before dispatch
        Err(_) => reporter.dismiss(),
    }
}

// --- Côté manager ---

enum SlotState {
    Starting { deadline: Instant },
    Running { deadline: Option<Instant> },
    Done,
}

/// Manager-side handle on one worker incarnation.
struct WorkerSlot {
    assignment: SliceAssignment,
    attempt: u32,
    requests: Option<Sender<WorkerRequest>>,
    state: SlotState,
    result: Vec<KeyPair>,
}

impl WorkerSlot {
    fn spawn(
        pool: &ThreadPool,
        assignment: SliceAssignment,
        attempt: u32,
        events: &Sender<WorkerEvent>,
        ready_timeout: Duration,
        execute: Executor,
    ) -> Self {
        let (requests_tx, requests_rx) = mpsc::channel();
        let reporter = Reporter {
            worker: assignment.worker,
            attempt,
            events: events.clone(),
            settled: false,
        };
        pool.spawn(move || run_worker(reporter, requests_rx, execute));

        debug!(
            worker = assignment.worker,
            attempt,
            start = assignment.start,
            count = assignment.count,
            "Worker spawned"
        );

        Self {
            assignment,
            attempt,
            requests: Some(requests_tx),
            state: SlotState::Starting { deadline: Instant::now() + ready_timeout },
            result: Vec::new(),
        }
    }

    fn is_done(&self) -> bool {
        matches!(self.state, SlotState::Done)
    }

    fn deadline(&self) -> Option<(Instant, WorkerFailureCause)> {
        match self.state {
            SlotState::Starting { deadline } => Some((deadline, WorkerFailureCause::ReadinessTimeout)),
            SlotState::Running { deadline } => deadline.map(|at| (at, WorkerFailureCause::Timeout)),
            SlotState::Done => None,
        }
    }

    /// Sends the request. False if the worker is already gone.
    fn dispatch(&mut self, request: WorkerRequest, job_timeout: Option<Duration>) -> bool {
        let sent = self.requests.as_ref().is_some_and(|tx| tx.send(request).is_ok());
        self.state = SlotState::Running { deadline: job_timeout.map(|t| Instant::now() + t) };
        debug!(worker = self.assignment.worker, attempt = self.attempt, sent, "Request dispatched");
        sent
    }

    fn complete(&mut self, pairs: Vec<KeyPair>) {
        debug!(worker = self.assignment.worker, pairs = pairs.len(), "Slice received");
        self.result = pairs;
        self.state = SlotState::Done;
        self.terminate();
    }

    /// Releases the worker. Idempotent: the handle is reclaimed once.
    fn terminate(&mut self) {
        if let Some(requests) = self.requests.take() {
            drop(requests);
            debug!(worker = self.assignment.worker, attempt = self.attempt, "Worker reclaimed");
        }
    }
}

impl Drop for WorkerSlot {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Fixed-size pool running one isolated worker per slice.
pub(crate) struct WorkerPool<'a> {
    config: &'a PoolConfig,
    pool: ThreadPool,
    execute: Executor,
}

impl<'a> WorkerPool<'a> {
    pub(crate) fn new(config: &'a PoolConfig) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.worker_count)
            .thread_name(|i| format!("keypool-worker-{i}"))
            .panic_handler(|_| warn!("Worker thread panicked"))
            .build()
            .map_err(|e| KeyPoolError::WorkerPool(e.to_string()))?;
        Ok(Self {
            config,
            pool,
            execute: Arc::new(WorkerRequest::execute),
        })
    }

    #[cfg(test)]
    fn with_executor(mut self, execute: Executor) -> Self {
        self.execute = execute;
        self
    }

    fn spawn_slot(
        &self,
        assignment: SliceAssignment,
        attempt: u32,
        events: &Sender<WorkerEvent>,
    ) -> WorkerSlot {
        WorkerSlot::spawn(
            &self.pool,
            assignment,
            attempt,
            events,
            self.config.ready_timeout,
            Arc::clone(&self.execute),
        )
    }

    /// Runs every assignment and returns the slices in assignment order.
    ///
    /// Blocks until all workers reply or one fails for good.
    pub(crate) fn run(
        &self,
        seed: &SeedMaterial,
        assignments: Vec<SliceAssignment>,
    ) -> Result<Vec<Vec<KeyPair>>> {
        self.run_on(seed, assignments, mpsc::channel())
    }

    fn run_on(
        &self,
        seed: &SeedMaterial,
        assignments: Vec<SliceAssignment>,
        (events_tx, events_rx): (Sender<WorkerEvent>, Receiver<WorkerEvent>),
    ) -> Result<Vec<Vec<KeyPair>>> {
        let mut slots: Vec<WorkerSlot> = assignments
            .into_iter()
            .map(|a| self.spawn_slot(a, 0, &events_tx))
            .collect();

        while slots.iter().any(|slot| !slot.is_done()) {
            let event = self.next_event(&events_rx, &slots)?;
            let (worker, attempt) = event.origin();

            let Some(slot) = slots
                .iter_mut()
                .find(|s| s.assignment.worker == worker && s.attempt == attempt)
            else {
                debug!(worker, attempt, "Ignoring event from a replaced worker");
                continue;
            };

            match event {
                WorkerEvent::Ready { .. } => {
                    debug!(worker, attempt, "Worker ready");
                    let request = WorkerRequest {
                        seed: seed.clone(),
                        template: self.config.path_template.clone(),
                        start_index: slot.assignment.start,
                        count: slot.assignment.count,
                    };
                    if !slot.dispatch(request, self.config.job_timeout) {
                        self.fail(slot, WorkerFailureCause::Lost, &events_tx)?;
                    }
                }
                WorkerEvent::Finished { response: WorkerResponse::Slice(pairs), .. } => {
                    slot.complete(pairs);
                }
                WorkerEvent::Finished { response: WorkerResponse::Error(err), .. } => {
                    self.fail(slot, WorkerFailureCause::Failed(Box::new(err)), &events_tx)?;
                }
                WorkerEvent::Lost { .. } => {
                    self.fail(slot, WorkerFailureCause::Lost, &events_tx)?;
                }
            }
        }

        Ok(slots.iter_mut().map(|slot| std::mem::take(&mut slot.result)).collect())
    }

    /// Retries the slice when the policy allows it, otherwise aborts the job.
    fn fail(
        &self,
        slot: &mut WorkerSlot,
        cause: WorkerFailureCause,
        events: &Sender<WorkerEvent>,
    ) -> Result<()> {
        slot.terminate();
        let worker = slot.assignment.worker;
        let failures = slot.attempt + 1;

        if !self.config.failure_policy.allows_retry(failures) {
            return Err(KeyPoolError::WorkerFailure { worker, cause });
        }

        warn!(worker, failures, %cause, "Worker failed, retrying slice");
        *slot = self.spawn_slot(slot.assignment, failures, events);
        Ok(())
    }

    /// Waits for the next event, bounded by the nearest pending deadline.
    fn next_event(&self, events: &Receiver<WorkerEvent>, slots: &[WorkerSlot]) -> Result<WorkerEvent> {
        let nearest = slots
            .iter()
            .filter_map(|slot| slot.deadline().map(|(at, cause)| (at, slot.assignment.worker, cause)))
            .min_by_key(|(at, _, _)| *at);

        let Some((at, worker, cause)) = nearest else {
            // Pas de timeout: wait as long as it takes
            return events
                .recv()
                .map_err(|_| KeyPoolError::WorkerPool("event channel closed".into()));
        };

        match events.recv_timeout(at.saturating_duration_since(Instant::now())) {
            Ok(event) => Ok(event),
            Err(RecvTimeoutError::Timeout) => Err(KeyPoolError::WorkerFailure { worker, cause }),
            Err(RecvTimeoutError::Disconnected) => {
                Err(KeyPoolError::WorkerPool("event channel closed".into()))
            }
        }
    }
}
