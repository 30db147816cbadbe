//! Background job queue for long-running analysis work.
//!
//! FIFO with per-resource mutual exclusion: jobs sharing a resource key
//! (the target function entry) run strictly in submission order, while
//! jobs on disjoint keys run concurrently up to the configured worker
//! count. Engine calls run on blocking threads; only the final merge of
//! a result goes through the session gate.
//!
//! Cancellation is cooperative. A queued job is withdrawn outright; a
//! running job finishes its computation, but the result is discarded
//! instead of being applied.

use crate::config::WorkspaceConfig;
use crate::core::addr::Addr;
use crate::engine::{EngineResult, ProgressSink, RawFunction};
use crate::events::{Event, EventPublisher};
use crate::session::{Mutation, Session};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What a job asks the engine to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobOp {
    Analyze,
    Decompile,
}

impl JobOp {
    pub fn value(&self) -> &str {
        match self {
            JobOp::Analyze => "analyze",
            JobOp::Decompile => "decompile",
        }
    }
}

/// A job request: operation plus target. The target entry address is
/// also the mutual-exclusion resource key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub op: JobOp,
    pub target: Addr,
}

impl JobSpec {
    pub fn analyze(target: Addr) -> Self {
        JobSpec {
            op: JobOp::Analyze,
            target,
        }
    }

    pub fn decompile(target: Addr) -> Self {
        JobSpec {
            op: JobOp::Decompile,
            target,
        }
    }

    pub fn resource_key(&self) -> Addr {
        self.target
    }
}

/// Job lifecycle state. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Queued,
    Running,
    Done,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed | JobState::Cancelled)
    }
}

/// Terminal result of one job as observed through its handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobOutcome {
    Done,
    Failed(String),
    /// The job was cancelled; any computed result was discarded at the
    /// gate. Informational, not an error.
    Cancelled,
}

/// Bookkeeping snapshot for one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub spec: JobSpec,
    pub state: JobState,
    pub progress: f64,
    pub progress_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Job lifecycle notification published on the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    pub id: Uuid,
    pub op: JobOp,
    pub target: Addr,
    pub stage: JobStage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobStage {
    Started,
    Progress { fraction: f64, text: Option<String> },
    Finished { state: JobState, error: Option<String> },
}

/// Handle returned by `submit`. Await [`JobHandle::wait`] to suspend
/// until the job reaches a terminal state.
#[derive(Clone)]
pub struct JobHandle {
    pub id: Uuid,
    pub spec: JobSpec,
    done: watch::Receiver<Option<JobOutcome>>,
}

impl JobHandle {
    /// Suspend until the job finishes. Never busy-waits; resumes when
    /// the queue stores the terminal outcome.
    pub async fn wait(&self) -> JobOutcome {
        let mut rx = self.done.clone();
        let outcome = rx.wait_for(|v| v.is_some()).await.map(|v| v.clone());
        match outcome {
            Ok(outcome) => outcome.unwrap_or(JobOutcome::Cancelled),
            Err(_) => JobOutcome::Failed("job queue shut down".into()),
        }
    }
}

struct JobEntry {
    record: JobRecord,
    cancel: Arc<AtomicBool>,
    done_tx: watch::Sender<Option<JobOutcome>>,
}

#[derive(Default)]
struct SchedulerState {
    /// Submission order; scanned front to back for the first job whose
    /// resource key is free.
    pending: VecDeque<Uuid>,
    busy_keys: HashSet<Addr>,
    entries: HashMap<Uuid, JobEntry>,
}

/// The queue itself. Workers are spawned by [`JobQueue::start`] and live
/// as long as the queue.
pub struct JobQueue {
    session: Arc<Session>,
    publisher: EventPublisher,
    config: WorkspaceConfig,
    /// Shared with running jobs' [`JobContext`]s so progress reports
    /// land in the records.
    state: Arc<Mutex<SchedulerState>>,
    wakeup: Notify,
}

impl JobQueue {
    /// Create the queue and spawn its workers. Must be called from
    /// within a tokio runtime.
    pub fn start(
        session: Arc<Session>,
        publisher: EventPublisher,
        config: &WorkspaceConfig,
    ) -> Arc<JobQueue> {
        let queue = Arc::new(JobQueue {
            session,
            publisher,
            config: config.clone(),
            state: Arc::new(Mutex::new(SchedulerState::default())),
            wakeup: Notify::new(),
        });
        for worker in 0..config.workers.max(1) {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                worker_loop(queue, worker).await;
            });
        }
        queue
    }

    /// Enqueue a job. Non-blocking; returns immediately with a handle.
    pub fn submit(&self, spec: JobSpec) -> JobHandle {
        let id = Uuid::new_v4();
        let (done_tx, done_rx) = watch::channel(None);
        let record = JobRecord {
            id,
            spec,
            state: JobState::Queued,
            progress: 0.0,
            progress_text: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
        };
        {
            let mut state = self.lock();
            state.entries.insert(
                id,
                JobEntry {
                    record,
                    cancel: Arc::new(AtomicBool::new(false)),
                    done_tx,
                },
            );
            state.pending.push_back(id);
        }
        debug!(job = %id, op = spec.op.value(), target = %spec.target, "job submitted");
        self.wakeup.notify_one();
        JobHandle {
            id,
            spec,
            done: done_rx,
        }
    }

    /// Best-effort cancel. A queued job is withdrawn; a running job is
    /// flagged and its result discarded at the gate. Returns false when
    /// the job is unknown or already terminal.
    pub fn cancel(&self, id: Uuid) -> bool {
        let mut state = self.lock();
        let current = match state.entries.get(&id) {
            Some(entry) => entry.record.state,
            None => return false,
        };
        match current {
            JobState::Queued => {
                state.pending.retain(|queued| *queued != id);
                let entry = state.entries.get_mut(&id).expect("entry vanished");
                entry.record.state = JobState::Cancelled;
                entry.record.finished_at = Some(Utc::now());
                entry.done_tx.send_replace(Some(JobOutcome::Cancelled));
                let event = JobEvent {
                    id,
                    op: entry.record.spec.op,
                    target: entry.record.spec.target,
                    stage: JobStage::Finished {
                        state: JobState::Cancelled,
                        error: None,
                    },
                };
                drop(state);
                info!(job = %id, "queued job cancelled");
                self.publisher.publish(Event::Job(event));
                true
            }
            JobState::Running => {
                if let Some(entry) = state.entries.get(&id) {
                    entry.cancel.store(true, Ordering::SeqCst);
                }
                info!(job = %id, "running job flagged for cancellation");
                true
            }
            _ => false,
        }
    }

    /// Snapshot of one job's record.
    pub fn job(&self, id: Uuid) -> Option<JobRecord> {
        self.lock().entries.get(&id).map(|e| e.record.clone())
    }

    /// Snapshots of all known jobs, newest first.
    pub fn jobs(&self) -> Vec<JobRecord> {
        let mut records: Vec<JobRecord> = self
            .lock()
            .entries
            .values()
            .map(|e| e.record.clone())
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }

    /// Rebuild a handle for a submitted job, e.g. for a console `await`.
    pub fn handle(&self, id: Uuid) -> Option<JobHandle> {
        let state = self.lock();
        let entry = state.entries.get(&id)?;
        Some(JobHandle {
            id,
            spec: entry.record.spec,
            done: entry.done_tx.subscribe(),
        })
    }

    /// Wait until no job has been queued or running for `grace`. The
    /// grace window covers jobs that enqueue follow-up work as they
    /// finish, so the queue must stay drained for the whole window.
    pub async fn join_all(&self, grace: Duration) {
        let mut last_active = Instant::now();
        loop {
            let active = {
                let state = self.lock();
                state
                    .entries
                    .values()
                    .any(|e| !e.record.state.is_terminal())
            };
            if active {
                last_active = Instant::now();
            } else if last_active.elapsed() >= grace {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SchedulerState> {
        self.state.lock().expect("job scheduler lock poisoned")
    }

    /// Pop the earliest pending job whose resource key is free, marking
    /// it running. FIFO per key falls out of the front-to-back scan.
    fn take_runnable(&self) -> Option<(Uuid, JobSpec, Arc<AtomicBool>)> {
        let mut state = self.lock();
        let idx = state.pending.iter().position(|id| {
            state
                .entries
                .get(id)
                .map(|e| !state.busy_keys.contains(&e.record.spec.resource_key()))
                .unwrap_or(false)
        })?;
        let id = state.pending.remove(idx).expect("pending index vanished");
        let entry = state.entries.get_mut(&id).expect("entry vanished");
        entry.record.state = JobState::Running;
        entry.record.started_at = Some(Utc::now());
        let spec = entry.record.spec;
        let cancel = Arc::clone(&entry.cancel);
        state.busy_keys.insert(spec.resource_key());
        // Another pending job may now be runnable on a different key.
        if !state.pending.is_empty() {
            self.wakeup.notify_one();
        }
        Some((id, spec, cancel))
    }

    fn finish(&self, id: Uuid, spec: JobSpec, outcome: JobOutcome) {
        let state_value = match &outcome {
            JobOutcome::Done => JobState::Done,
            JobOutcome::Failed(_) => JobState::Failed,
            JobOutcome::Cancelled => JobState::Cancelled,
        };
        let error = match &outcome {
            JobOutcome::Failed(msg) => Some(msg.clone()),
            _ => None,
        };
        {
            let mut state = self.lock();
            state.busy_keys.remove(&spec.resource_key());
            if let Some(entry) = state.entries.get_mut(&id) {
                entry.record.state = state_value;
                entry.record.finished_at = Some(Utc::now());
                entry.record.error = error.clone();
                entry.done_tx.send_replace(Some(outcome));
            }
        }
        self.wakeup.notify_one();
        self.publisher.publish(Event::Job(JobEvent {
            id,
            op: spec.op,
            target: spec.target,
            stage: JobStage::Finished {
                state: state_value,
                error,
            },
        }));
    }

    async fn run_job(self: &Arc<Self>, id: Uuid, spec: JobSpec, cancel: Arc<AtomicBool>) {
        let started = Instant::now();
        info!(job = %id, op = spec.op.value(), target = %spec.target, "job started");
        self.publisher.publish(Event::Job(JobEvent {
            id,
            op: spec.op,
            target: spec.target,
            stage: JobStage::Started,
        }));

        // Generation the result is computed against; the gate rejects the
        // result if the structure changes underneath the job.
        let Some(function) = self.session.function(spec.target) else {
            let error = crate::error::SessionError::InvalidAddress(spec.target).to_string();
            warn!(job = %id, target = %spec.target, "job target unknown");
            self.finish(id, spec, JobOutcome::Failed(error));
            return;
        };
        let generation = function.generation;

        if spec.op == JobOp::Analyze {
            // Status flip goes through the gate like everything else.
            if let Err(err) = self
                .session
                .apply_mutation(Mutation::BeginAnalysis { entry: spec.target })
            {
                self.finish(id, spec, JobOutcome::Failed(err.to_string()));
                return;
            }
        }

        let engine = self.session.engine();
        let ctx = JobContext::new(
            id,
            spec,
            self.publisher.clone(),
            &self.config,
            Arc::clone(&self.state),
        );
        let computed = tokio::task::spawn_blocking(move || -> EngineResult<EngineOutput> {
            match spec.op {
                JobOp::Analyze => engine
                    .analyze(spec.target, &ctx)
                    .map(EngineOutput::Analysis),
                JobOp::Decompile => engine.decompile(spec.target, &ctx).map(EngineOutput::Text),
            }
        })
        .await;

        let outcome = if cancel.load(Ordering::SeqCst) {
            // The computation ran to completion; its result is discarded
            // at the gate rather than applied.
            info!(job = %id, "cancelled job result discarded");
            JobOutcome::Cancelled
        } else {
            match computed {
                Ok(Ok(output)) => {
                    let mutation = match output {
                        EngineOutput::Analysis(raw) => Mutation::ApplyAnalysis {
                            entry: spec.target,
                            generation,
                            raw,
                        },
                        EngineOutput::Text(text) => Mutation::ApplyDecompilation {
                            entry: spec.target,
                            generation,
                            text,
                        },
                    };
                    match self.session.apply_mutation(mutation) {
                        Ok(_) => JobOutcome::Done,
                        Err(err) => self.record_failure(id, spec, err.to_string()),
                    }
                }
                Ok(Err(engine_err)) => {
                    let error =
                        crate::error::SessionError::EngineFailure(engine_err.to_string())
                            .to_string();
                    self.record_failure(id, spec, error)
                }
                Err(join_err) => self.record_failure(id, spec, format!("job panicked: {}", join_err)),
            }
        };

        let duration = started.elapsed();
        match &outcome {
            JobOutcome::Done => {
                info!(job = %id, op = spec.op.value(), ?duration, "job completed")
            }
            JobOutcome::Failed(error) => {
                warn!(job = %id, op = spec.op.value(), ?duration, error = %error, "job failed")
            }
            JobOutcome::Cancelled => {
                info!(job = %id, op = spec.op.value(), ?duration, "job cancelled")
            }
        }
        self.finish(id, spec, outcome);
    }

    /// Surface a failure as an annotation on the target function. The
    /// session's analysis state is otherwise untouched.
    fn record_failure(&self, id: Uuid, spec: JobSpec, error: String) -> JobOutcome {
        let annotate = Mutation::RecordJobFailure {
            entry: spec.target,
            job: id,
            error: error.clone(),
        };
        if let Err(err) = self.session.apply_mutation(annotate) {
            debug!(job = %id, error = %err, "failure annotation not applied");
        }
        JobOutcome::Failed(error)
    }
}

enum EngineOutput {
    Analysis(RawFunction),
    Text(String),
}

async fn worker_loop(queue: Arc<JobQueue>, worker: usize) {
    debug!(worker, "job worker started");
    loop {
        match queue.take_runnable() {
            Some((id, spec, cancel)) => queue.run_job(id, spec, cancel).await,
            None => queue.wakeup.notified().await,
        }
    }
}

/// Passed (via [`ProgressSink`]) into engine calls so jobs can report
/// progress. Forwarding is throttled: a report goes out only when the
/// fraction moved by the configured delta or the text changed, and at
/// most once per configured interval.
pub struct JobContext {
    id: Uuid,
    spec: JobSpec,
    publisher: EventPublisher,
    scheduler: Arc<Mutex<SchedulerState>>,
    min_delta: f64,
    min_interval: Duration,
    throttle: Mutex<ThrottleState>,
}

struct ThrottleState {
    last_fraction: f64,
    last_text: Option<String>,
    last_sent: Option<Instant>,
}

impl JobContext {
    fn new(
        id: Uuid,
        spec: JobSpec,
        publisher: EventPublisher,
        config: &WorkspaceConfig,
        scheduler: Arc<Mutex<SchedulerState>>,
    ) -> Self {
        JobContext {
            id,
            spec,
            publisher,
            scheduler,
            min_delta: config.progress_min_delta,
            min_interval: config.progress_min_interval(),
            throttle: Mutex::new(ThrottleState {
                last_fraction: 0.0,
                last_text: None,
                last_sent: None,
            }),
        }
    }
}

impl ProgressSink for JobContext {
    fn report(&self, fraction: f64, text: &str) {
        let fraction = fraction.clamp(0.0, 1.0);
        let mut throttle = self.throttle.lock().expect("progress throttle poisoned");
        let delta = fraction - throttle.last_fraction;
        let text_changed = throttle.last_text.as_deref() != Some(text);
        let interval_ok = throttle
            .last_sent
            .map(|at| at.elapsed() >= self.min_interval)
            .unwrap_or(true);
        if (delta > self.min_delta || text_changed) && interval_ok {
            throttle.last_fraction = fraction;
            throttle.last_text = Some(text.to_string());
            throttle.last_sent = Some(Instant::now());
            // A mid-flight `job(id)` reads the same progress callers see
            // on the bus.
            {
                let mut scheduler = self.scheduler.lock().expect("job scheduler lock poisoned");
                if let Some(entry) = scheduler.entries.get_mut(&self.id) {
                    entry.record.progress = fraction;
                    entry.record.progress_text = Some(text.to_string());
                }
            }
            self.publisher.publish(Event::Job(JobEvent {
                id: self.id,
                op: self.spec.op,
                target: self.spec.target,
                stage: JobStage::Progress {
                    fraction,
                    text: Some(text.to_string()),
                },
            }));
        }
    }
}
