//! Simulation orchestrator.
//!
//! Owns the worker threads and the aggregator. Every command is broadcast
//! to all workers and waits for each to acknowledge it, so by the time a call
//! returns the workers have acted on it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Sender};
use synrad_core::{LoadedScenario, PhysicsTables, ResultBuffer, SimulationParams};

use crate::aggregator::{Aggregator, AggregatorMessage};
use crate::control::{Command, ControlSlot, WorkerState, WorkerStatus};
use crate::error::{SimulationError, SimulationResult};
use crate::model::Model;
use crate::worker::Worker;

/// Slack added to the longest a worker can take to answer a command.
const ACK_SLACK_MS: u64 = 5000;

struct WorkerHandle {
    commands: Sender<Command>,
    slot: Arc<ControlSlot>,
    thread: Option<JoinHandle<()>>,
    sent: u64,
}

pub struct Simulation {
    params: SimulationParams,
    workers: Vec<WorkerHandle>,
    aggregator: Sender<AggregatorMessage>,
    aggregator_thread: Option<JoinHandle<()>>,
    desorbed: Arc<AtomicU64>,
    model: Option<Arc<Model>>,
}

impl Simulation {
    /// Spawn the aggregator and `params.worker_count` idle workers.
    pub fn new(params: SimulationParams) -> SimulationResult<Self> {
        params.validate()?;

        let desorbed = Arc::new(AtomicU64::new(0));
        let (aggregator, receiver) = bounded(params.worker_count * 2);
        let aggregator_thread = Aggregator::new(Arc::clone(&desorbed)).spawn(receiver)?;

        let mut workers = Vec::with_capacity(params.worker_count);
        for id in 0..params.worker_count {
            let (commands, command_receiver) = unbounded();
            let slot = Arc::new(ControlSlot::new());
            let thread = Worker::new(
                id,
                params.clone(),
                command_receiver,
                aggregator.clone(),
                Arc::clone(&slot),
            )
            .spawn()?;
            workers.push(WorkerHandle {
                commands,
                slot,
                thread: Some(thread),
                sent: 0,
            });
        }
        log::info!("Started {} workers", workers.len());

        Ok(Self {
            params,
            workers,
            aggregator,
            aggregator_thread: Some(aggregator_thread),
            desorbed,
            model: None,
        })
    }

    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    pub fn model(&self) -> Option<&Arc<Model>> {
        self.model.as_ref()
    }

    /// Build the model for a scenario and load it into every worker.
    pub fn load(&mut self, loaded: LoadedScenario, tables: Arc<PhysicsTables>) -> SimulationResult<()> {
        let model = Model::from_scenario(loaded, tables)?;
        self.load_model(Arc::new(model))
    }

    /// Load `model` into every worker and clear the results.
    ///
    /// A worker that rejects the model is left in [`WorkerState::Error`];
    /// see [`Simulation::errors`].
    pub fn load_model(&mut self, model: Arc<Model>) -> SimulationResult<()> {
        self.broadcast(|| Command::Load(Arc::clone(&model)))?;
        self.send_aggregator(AggregatorMessage::Reset(model.new_buffer()))?;
        log::info!(
            "Loaded {} facets, {} trajectory points",
            model.geometry.facets.len(),
            model.points_total
        );
        for (id, message) in self.errors() {
            log::error!("Worker {id} rejected the model: {message}");
        }
        self.model = Some(model);
        Ok(())
    }

    pub fn start(&mut self) -> SimulationResult<()> {
        if self.model.is_none() {
            return Err(SimulationError::NotLoaded);
        }
        self.broadcast(|| Command::Start)
    }

    /// Idle all workers after a best-effort final merge.
    ///
    /// Workers whose merge timed out still idle and keep their results
    /// until the next start or pause; see [`Simulation::merge_pending`].
    pub fn pause(&mut self) -> SimulationResult<()> {
        self.broadcast(|| Command::Pause)
    }

    /// Stop all workers and zero every counter.
    pub fn reset(&mut self) -> SimulationResult<()> {
        self.broadcast(|| Command::Reset)?;
        if let Some(model) = &self.model {
            self.send_aggregator(AggregatorMessage::Reset(model.new_buffer()))?;
        }
        Ok(())
    }

    /// Hand new parameters to every worker.
    ///
    /// The worker count and spectrum range are fixed when the simulation is
    /// created and loaded; changes to them apply on the next run.
    pub fn update_params(&mut self, params: SimulationParams) -> SimulationResult<()> {
        params.validate()?;
        if params.worker_count != self.params.worker_count {
            log::warn!(
                "Worker count stays at {} until the simulation is recreated",
                self.params.worker_count
            );
        }
        if params.spectrum != self.params.spectrum {
            log::warn!("Spectrum range changes apply on the next load");
        }
        let update = params.clone();
        self.broadcast(|| Command::UpdateParams(update.clone()))?;
        self.params = params;
        Ok(())
    }

    /// Stop every thread. Called on drop if not called explicitly.
    pub fn exit(&mut self) -> SimulationResult<()> {
        for worker in &self.workers {
            // A worker that already stopped has dropped its receiver
            let _ = worker.commands.send(Command::Exit);
        }
        let mut result = Ok(());
        for (id, worker) in self.workers.iter_mut().enumerate() {
            if let Some(thread) = worker.thread.take() {
                if thread.join().is_err() {
                    result = Err(SimulationError::WorkerPanicked(id));
                }
            }
        }
        if let Some(thread) = self.aggregator_thread.take() {
            let _ = self.aggregator.send(AggregatorMessage::Shutdown);
            if thread.join().is_err() {
                log::error!("Aggregator thread panicked");
            }
        }
        result
    }

    /// Photons merged into the shared results so far.
    pub fn desorbed(&self) -> u64 {
        self.desorbed.load(Ordering::Relaxed)
    }

    /// `"<desorbed>/<limit> (<pct>%)"`, or just the count without a limit.
    /// Gains a `", merge pending"` suffix while any worker holds back results.
    pub fn status_string(&self) -> String {
        let desorbed = self.desorbed();
        let mut status = match self.params.desorption_limit {
            Some(limit) if limit > 0 => {
                let pct = 100.0 * desorbed as f64 / limit as f64;
                format!("{desorbed}/{limit} ({pct:.1}%)")
            }
            _ => desorbed.to_string(),
        };
        if self.merge_pending() {
            status.push_str(", merge pending");
        }
        status
    }

    /// True when a worker's last merge timed out and its results are not yet shared.
    pub fn merge_pending(&self) -> bool {
        self.workers.iter().any(|w| w.slot.snapshot().merge_pending)
    }

    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.workers.iter().map(|w| w.slot.state()).collect()
    }

    pub fn worker_status(&self, id: usize) -> Option<WorkerStatus> {
        self.workers.get(id).map(|w| w.slot.snapshot())
    }

    /// `(worker, message)` for every worker in error.
    pub fn errors(&self) -> Vec<(usize, String)> {
        self.workers
            .iter()
            .enumerate()
            .map(|(id, w)| (id, w.slot.snapshot()))
            .filter(|(_, s)| s.state == WorkerState::Error)
            .map(|(id, s)| (id, s.message))
            .collect()
    }

    /// True when every worker has reached its desorption limit.
    pub fn is_done(&self) -> bool {
        self.workers.iter().all(|w| w.slot.state() == WorkerState::Done)
    }

    /// True while any worker is tracing.
    pub fn is_running(&self) -> bool {
        self.workers.iter().any(|w| w.slot.state() == WorkerState::Running)
    }

    /// Copy of the merged results.
    pub fn snapshot(&self) -> SimulationResult<ResultBuffer> {
        let (reply, answer) = bounded(1);
        self.send_aggregator(AggregatorMessage::Snapshot(reply))?;
        answer
            .recv_timeout(self.ack_timeout())
            .map_err(|_| SimulationError::Timeout("result snapshot".into()))?
            .ok_or(SimulationError::NotLoaded)
    }

    fn ack_timeout(&self) -> Duration {
        Duration::from_millis(
            self.params.slice_ms + self.params.pause_merge_timeout_ms + ACK_SLACK_MS,
        )
    }

    fn send_aggregator(&self, message: AggregatorMessage) -> SimulationResult<()> {
        self.aggregator
            .send_timeout(message, self.ack_timeout())
            .map_err(|_| SimulationError::AggregatorDisconnected)
    }

    /// Send a command to every worker, then wait for each acknowledgement.
    fn broadcast(&mut self, make: impl Fn() -> Command) -> SimulationResult<()> {
        let timeout = self.ack_timeout();
        let mut name = "";
        for (id, worker) in self.workers.iter_mut().enumerate() {
            let command = make();
            name = command.name();
            worker
                .commands
                .send(command)
                .map_err(|_| SimulationError::WorkerDisconnected(id))?;
            worker.sent += 1;
        }
        for (id, worker) in self.workers.iter().enumerate() {
            if !worker.slot.wait_acknowledged(worker.sent, timeout) {
                return Err(SimulationError::Timeout(format!(
                    "worker {id} to acknowledge {name}"
                )));
            }
        }
        Ok(())
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        if self.aggregator_thread.is_some() {
            if let Err(e) = self.exit() {
                log::error!("Error stopping simulation: {}", e);
            }
        }
    }
}
