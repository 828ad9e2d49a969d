//! One tokio task per (job, truck) owns its classifier and transition
//! history and is the only writer of its cycles.

use crate::classifier::{ClassifierConfig, ZoneClassifier};
use crate::cycle::amend::Amendment;
use crate::cycle::engine::LoadCycleEngine;
use crate::cycle::manual::load_number_or_sentinel;
use crate::cycle::query::count_closed_cycles;
use crate::error::AppError;
use crate::model::{
    AssignationId, CycleId, CycleKey, LoadCycle, PositionSample, TransitionEvent, TruckKey,
    ZoneClassification,
};
use crate::state::{AppState, IngestResult};
use crate::transition::TransitionTracker;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, error, info, warn};

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 3;
pub const DEFAULT_WORKER_IDLE_MINUTES: u64 = 60;

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub queue_capacity: usize,
    pub max_conflict_retries: u32,
    /// None keeps workers alive forever.
    pub idle_timeout: Option<Duration>,
    pub classifier: ClassifierConfig,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
            idle_timeout: Some(Duration::from_secs(DEFAULT_WORKER_IDLE_MINUTES * 60)),
            classifier: ClassifierConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    OutOfOrder,
    UnknownJob,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutcome {
    /// `closed_cycles` is only read back when a transition fired.
    Applied {
        classification: ZoneClassification,
        events: Vec<TransitionEvent>,
        closed_cycles: Option<usize>,
    },
    /// Remembered, but no assignation links the driver to the truck.
    Unassigned {
        classification: ZoneClassification,
        events: Vec<TransitionEvent>,
    },
    Dropped(DropReason),
}

type WorkerMap = Arc<Mutex<HashMap<TruckKey, mpsc::Sender<Command>>>>;

enum Command {
    Sample {
        sample: PositionSample,
        reply: oneshot::Sender<Result<SampleOutcome, AppError>>,
    },
    Manual {
        assignation_id: AssignationId,
        now: OffsetDateTime,
        reply: oneshot::Sender<Result<u32, AppError>>,
    },
    Amend {
        cycle_id: CycleId,
        amendment: Amendment,
        reply: oneshot::Sender<Result<LoadCycle, AppError>>,
    },
}

struct TruckWorker {
    truck: TruckKey,
    engine: LoadCycleEngine,
    state: Arc<RwLock<AppState>>,
    classifier: ZoneClassifier,
    tracker: TransitionTracker,
    max_conflict_retries: u32,
    idle_timeout: Option<Duration>,
    workers: WorkerMap,
}

impl TruckWorker {
    fn new(
        truck: TruckKey,
        engine: LoadCycleEngine,
        state: Arc<RwLock<AppState>>,
        settings: &DispatchSettings,
        workers: WorkerMap,
    ) -> Self {
        Self {
            truck,
            engine,
            state,
            classifier: ZoneClassifier::new(settings.classifier.clone()),
            tracker: TransitionTracker::new(),
            max_conflict_retries: settings.max_conflict_retries,
            idle_timeout: settings.idle_timeout,
            workers,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            let next = match self.idle_timeout {
                Some(idle) => match tokio::time::timeout(idle, commands.recv()).await {
                    Ok(next) => next,
                    // a truck parked inside a site keeps its worker, or its EXIT would be lost
                    Err(_) if self.tracker.inside_site() => continue,
                    Err(_) => {
                        // no replacement can start while the registry is held
                        let workers = Arc::clone(&self.workers);
                        let mut workers = workers.lock().await;
                        commands.close();
                        while let Ok(command) = commands.try_recv() {
                            self.handle(command);
                        }
                        workers.remove(&self.truck);
                        debug!(
                            job_id = self.truck.job_id,
                            truck_id = self.truck.truck_id,
                            "Truck worker idle"
                        );
                        None
                    }
                },
                None => commands.recv().await,
            };
            let Some(command) = next else {
                break;
            };
            self.handle(command);
        }
        debug!(
            job_id = self.truck.job_id,
            truck_id = self.truck.truck_id,
            "Truck worker stopped"
        );
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Sample { sample, reply } => {
                let _ = reply.send(self.handle_sample(&sample));
            }
            Command::Manual {
                assignation_id,
                now,
                reply,
            } => {
                let _ = reply.send(self.handle_manual(assignation_id, now));
            }
            Command::Amend {
                cycle_id,
                amendment,
                reply,
            } => {
                let _ = reply.send(self.engine.amend(self.truck, cycle_id, &amendment));
            }
        }
    }

    fn handle_sample(&mut self, sample: &PositionSample) -> Result<SampleOutcome, AppError> {
        if !self.tracker.accepts(sample) {
            self.record(IngestResult::OutOfOrder, 0);
            return Ok(SampleOutcome::Dropped(DropReason::OutOfOrder));
        }

        let directory = Arc::clone(self.engine.directory());
        let Some(sites) = directory.sites(sample.job_id) else {
            warn!(
                job_id = sample.job_id,
                truck_id = sample.truck_id,
                "Dropping sample for unknown job"
            );
            self.record(IngestResult::UnknownJob, 0);
            return Ok(SampleOutcome::Dropped(DropReason::UnknownJob));
        };

        let classification = self.classifier.classify(sample, &sites);
        let events = self.tracker.transitions(sample, classification);

        let Some(assignation_id) =
            directory.assignation(sample.job_id, sample.truck_id, sample.driver_id)
        else {
            if !events.is_empty() {
                warn!(
                    job_id = sample.job_id,
                    truck_id = sample.truck_id,
                    driver_id = sample.driver_id,
                    transitions = events.len(),
                    "No assignation for driver, transitions not applied"
                );
            }
            self.tracker.commit(sample, classification);
            self.record(IngestResult::Unassigned, events.len());
            return Ok(SampleOutcome::Unassigned {
                classification,
                events,
            });
        };

        let mut closed_cycles = None;
        for event in &events {
            match self.apply_with_retry(assignation_id, event) {
                Ok(count) => closed_cycles = Some(count),
                Err(err) => {
                    error!(
                        job_id = sample.job_id,
                        truck_id = sample.truck_id,
                        zone = ?event.zone_type,
                        action = ?event.action,
                        retryable = err.is_retryable(),
                        error = %err,
                        "Failed to apply transition"
                    );
                    self.record(IngestResult::Failed, 0);
                    return Err(err);
                }
            }
        }
        self.tracker.commit(sample, classification);

        if let Some(count) = closed_cycles {
            self.set_live_count(assignation_id, count);
        }
        self.record(IngestResult::Applied, events.len());
        Ok(SampleOutcome::Applied {
            classification,
            events,
            closed_cycles,
        })
    }

    fn apply_with_retry(
        &self,
        assignation_id: AssignationId,
        event: &TransitionEvent,
    ) -> Result<usize, AppError> {
        self.retry_conflicts(|| self.engine.apply(assignation_id, event))
    }

    fn handle_manual(
        &self,
        assignation_id: AssignationId,
        now: OffsetDateTime,
    ) -> Result<u32, AppError> {
        let key = self.cycle_key(assignation_id);
        let load_number = self.retry_conflicts(|| self.engine.try_record_manual_cycle(key, now))?;
        match count_closed_cycles(self.engine.store().as_ref(), &key) {
            Ok(count) => self.set_live_count(assignation_id, count),
            Err(err) => warn!(error = %err, "Failed to refresh live count after manual cycle"),
        }
        Ok(load_number)
    }

    fn retry_conflicts<T>(
        &self,
        mut op: impl FnMut() -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let mut attempt = 0;
        loop {
            match op() {
                Err(err @ AppError::Conflict { .. }) if attempt < self.max_conflict_retries => {
                    attempt += 1;
                    warn!(
                        job_id = self.truck.job_id,
                        truck_id = self.truck.truck_id,
                        attempt,
                        error = %err,
                        "Load number conflict, retrying"
                    );
                }
                result => return result,
            }
        }
    }

    fn cycle_key(&self, assignation_id: AssignationId) -> CycleKey {
        CycleKey {
            job_id: self.truck.job_id,
            truck_id: self.truck.truck_id,
            assignation_id,
        }
    }

    fn set_live_count(&self, assignation_id: AssignationId, count: usize) {
        let key = self.cycle_key(assignation_id);
        let result = self
            .state
            .write()
            .map(|mut guard| guard.set_live_count(key, count))
            .map_err(|_| AppError::StateLock);
        if let Err(err) = result {
            warn!(error = %err, "Failed to update live cycle count");
        }
    }

    fn record(&self, result: IngestResult, transitions: usize) {
        let recorded = self
            .state
            .write()
            .map(|mut guard| guard.record_ingest(result, transitions))
            .map_err(|_| AppError::StateLock);
        if let Err(err) = recorded {
            warn!(error = %err, "Failed to update ingest stats");
        }
    }
}

#[derive(Debug)]
struct DispatcherInner {
    engine: LoadCycleEngine,
    state: Arc<RwLock<AppState>>,
    settings: DispatchSettings,
    workers: WorkerMap,
}

/// Routes work to the worker of its (job, truck), starting it on first use.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    pub fn new(
        engine: LoadCycleEngine,
        state: Arc<RwLock<AppState>>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                engine,
                state,
                settings,
                workers: Arc::new(Mutex::new(HashMap::new())),
            }),
        }
    }

    pub fn engine(&self) -> &LoadCycleEngine {
        &self.inner.engine
    }

    pub fn state(&self) -> &Arc<RwLock<AppState>> {
        &self.inner.state
    }

    /// On a retryable error nothing about the sample was remembered, so
    /// submitting it again replays the same transitions.
    pub async fn submit_sample(&self, sample: PositionSample) -> Result<SampleOutcome, AppError> {
        let truck = sample.truck_key();
        let (reply, response) = oneshot::channel();
        self.send(truck, Command::Sample { sample, reply }, response)
            .await?
    }

    pub async fn try_record_manual_cycle(
        &self,
        key: CycleKey,
        now: OffsetDateTime,
    ) -> Result<u32, AppError> {
        let (reply, response) = oneshot::channel();
        let command = Command::Manual {
            assignation_id: key.assignation_id,
            now,
            reply,
        };
        self.send(key.truck_key(), command, response).await?
    }

    pub async fn record_manual_cycle(&self, key: CycleKey, now: OffsetDateTime) -> i64 {
        let result = self.try_record_manual_cycle(key, now).await;
        load_number_or_sentinel(&key, result)
    }

    pub async fn amend(
        &self,
        truck: TruckKey,
        cycle_id: CycleId,
        amendment: Amendment,
    ) -> Result<LoadCycle, AppError> {
        let (reply, response) = oneshot::channel();
        let command = Command::Amend {
            cycle_id,
            amendment,
            reply,
        };
        self.send(truck, command, response).await?
    }

    /// Workers still running; stopped ones are pruned.
    pub async fn worker_count(&self) -> usize {
        let mut workers = self.inner.workers.lock().await;
        workers.retain(|_, sender| !sender.is_closed());
        workers.len()
    }

    async fn send<T>(
        &self,
        truck: TruckKey,
        command: Command,
        response: oneshot::Receiver<T>,
    ) -> Result<T, AppError> {
        let stopped = || AppError::WorkerStopped {
            job_id: truck.job_id,
            truck_id: truck.truck_id,
        };
        let mut command = command;
        // a worker that went idle between lookup and send hands the command back
        for _ in 0..2 {
            let sender = self.worker(truck).await;
            match sender.send(command).await {
                Ok(()) => return response.await.map_err(|_| stopped()),
                Err(SendError(returned)) => command = returned,
            }
        }
        Err(stopped())
    }

    async fn worker(&self, truck: TruckKey) -> mpsc::Sender<Command> {
        let mut workers = self.inner.workers.lock().await;
        if let Some(sender) = workers.get(&truck)
            && !sender.is_closed()
        {
            return sender.clone();
        }
        workers.retain(|_, sender| !sender.is_closed());

        let (sender, receiver) = mpsc::channel(self.inner.settings.queue_capacity.max(1));
        let worker = TruckWorker::new(
            truck,
            self.inner.engine.clone(),
            Arc::clone(&self.inner.state),
            &self.inner.settings,
            Arc::clone(&self.inner.workers),
        );
        tokio::spawn(worker.run(receiver));
        info!(
            job_id = truck.job_id,
            truck_id = truck.truck_id,
            "Truck worker started"
        );
        workers.insert(truck, sender.clone());
        sender
    }
}
