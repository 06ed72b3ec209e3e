//! Worker threads.
//!
//! A worker owns its RNG, a [`Tracer`] and a private result buffer with the
//! shared layout. While running it traces photons for one wall-clock slice,
//! then hands its buffer to the aggregator and polls for commands. A merge
//! that times out keeps the buffer and is retried on the next slice, start
//! or pause. Pausing always idles the worker, merged or not.

use std::io;
use std::mem;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, SendTimeoutError, Sender, TryRecvError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use synrad_core::{ResultBuffer, SimulationParams};

use crate::aggregator::{AggregatorMessage, Delta};
use crate::control::{Command, ControlSlot, WorkerState};
use crate::model::Model;
use crate::transport::Tracer;

/// State tied to one loaded model.
struct Session {
    tracer: Tracer,
    buffer: ResultBuffer,
}

pub struct Worker {
    id: usize,
    commands: Receiver<Command>,
    aggregator: Sender<AggregatorMessage>,
    slot: Arc<ControlSlot>,
    params: SimulationParams,
    rng: StdRng,
    session: Option<Session>,
    /// Photons generated since the last load or reset.
    desorbed: u64,
}

impl Worker {
    pub fn new(
        id: usize,
        params: SimulationParams,
        commands: Receiver<Command>,
        aggregator: Sender<AggregatorMessage>,
        slot: Arc<ControlSlot>,
    ) -> Self {
        let rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(id as u64)),
            None => StdRng::from_entropy(),
        };
        Self {
            id,
            commands,
            aggregator,
            slot,
            params,
            rng,
            session: None,
            desorbed: 0,
        }
    }

    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("synrad-worker-{}", self.id))
            .spawn(move || self.run())
    }

    /// Command loop. Blocks for commands while idle, polls them between slices while running.
    pub fn run(mut self) {
        log::info!("Worker {} started", self.id);
        loop {
            let command = if self.slot.state() == WorkerState::Running {
                match self.commands.try_recv() {
                    Ok(command) => Some(command),
                    Err(TryRecvError::Empty) => None,
                    Err(TryRecvError::Disconnected) => break,
                }
            } else {
                match self.commands.recv() {
                    Ok(command) => Some(command),
                    Err(_) => break,
                }
            };

            match command {
                Some(command) => {
                    let keep_going = self.handle(command);
                    self.slot.acknowledge();
                    if !keep_going {
                        break;
                    }
                }
                None => self.run_slice(),
            }
        }
        self.slot.set_state(WorkerState::Killed, "Exited");
        log::info!("Worker {} stopped", self.id);
    }

    /// Apply one command. Returns false on exit.
    fn handle(&mut self, command: Command) -> bool {
        log::debug!("Worker {}: {}", self.id, command.name());
        match command {
            Command::Load(model) => self.load(model),
            Command::Start => match self.slot.state() {
                WorkerState::Error | WorkerState::Done | WorkerState::Running => {}
                _ if self.session.is_none() => {
                    self.slot.set_state(WorkerState::Error, "No geometry loaded");
                }
                _ => {
                    self.merge(Duration::from_millis(self.params.merge_timeout_ms));
                    if self.slot.state() != WorkerState::Error {
                        self.slot.set_state(WorkerState::Running, "Running");
                    }
                }
            },
            Command::Pause => {
                if matches!(self.slot.state(), WorkerState::Running | WorkerState::Ready) {
                    let timeout = Duration::from_millis(self.params.pause_merge_timeout_ms);
                    if self.merge(timeout) {
                        self.slot.set_state(WorkerState::Ready, "Paused");
                    } else if self.slot.state() != WorkerState::Error {
                        self.slot.set_state(WorkerState::Ready, "Paused, merge pending");
                    }
                }
            }
            Command::Reset => {
                if let Some(session) = &mut self.session {
                    session.tracer.model().reset_buffer(&mut session.buffer);
                }
                self.desorbed = 0;
                self.slot.set_desorbed(0);
                self.slot.set_merge_pending(false);
                if self.slot.state() != WorkerState::Error {
                    self.slot.set_state(WorkerState::Ready, "Reset");
                }
            }
            Command::UpdateParams(params) => {
                if let Some(session) = &mut self.session {
                    session.tracer.set_params(params.clone());
                }
                self.params = params;
            }
            Command::Exit => return false,
        }
        true
    }

    fn load(&mut self, model: Arc<Model>) {
        self.session = None;
        self.desorbed = 0;
        self.slot.set_desorbed(0);
        self.slot.set_merge_pending(false);
        if let Err(e) = model.geometry.check_links() {
            log::error!("Worker {}: {}", self.id, e);
            self.slot.set_state(WorkerState::Error, e.to_string());
            return;
        }
        self.session = Some(Session {
            buffer: model.new_buffer(),
            tracer: Tracer::new(model, self.params.clone()),
        });
        self.slot.set_state(WorkerState::Ready, "Loaded");
    }

    /// Trace until the slice deadline or this worker's share of the desorption limit.
    fn run_slice(&mut self) {
        let Some(session) = &mut self.session else {
            self.slot.set_state(WorkerState::Error, "No geometry loaded");
            return;
        };
        let limit = self.params.worker_limit(self.id);
        let start = Instant::now();
        let deadline = start + Duration::from_millis(self.params.slice_ms);
        let before = self.desorbed;

        loop {
            if limit.map_or(false, |l| self.desorbed >= l) {
                break;
            }
            if session.tracer.trace_next(&mut session.buffer, &mut self.rng).is_none() {
                self.slot.set_state(WorkerState::Error, "Model has no trajectory points");
                return;
            }
            self.desorbed += 1;
            if Instant::now() >= deadline {
                break;
            }
        }
        self.slot.set_desorbed(self.desorbed);
        log::debug!(
            "Worker {}: {} photons in {:.1?}",
            self.id,
            self.desorbed - before,
            start.elapsed()
        );

        if limit.map_or(false, |l| self.desorbed >= l) {
            let timeout = Duration::from_millis(self.params.pause_merge_timeout_ms);
            if self.merge(timeout) {
                log::info!("Worker {} reached its limit of {} photons", self.id, self.desorbed);
                self.slot.set_state(WorkerState::Done, "Desorption limit reached");
            }
        } else {
            let timeout = Duration::from_millis(self.params.merge_timeout_ms);
            self.merge(timeout);
        }
    }

    /// Hand the private buffer to the aggregator.
    ///
    /// Returns true once nothing is left to merge. A timed-out send keeps
    /// the buffer; a disconnected aggregator puts the worker in error.
    fn merge(&mut self, timeout: Duration) -> bool {
        let Some(session) = &mut self.session else {
            return true;
        };
        if session.buffer.header().counter.nb_desorbed == 0 {
            return true;
        }
        let fresh = session.tracer.model().new_buffer();
        let buffer = mem::replace(&mut session.buffer, fresh);
        let message = AggregatorMessage::Merge(Delta {
            worker: self.id,
            buffer,
        });
        match self.aggregator.send_timeout(message, timeout) {
            Ok(()) => {
                self.slot.set_merge_pending(false);
                true
            }
            Err(SendTimeoutError::Timeout(message)) => {
                if let AggregatorMessage::Merge(delta) = message {
                    session.buffer = delta.buffer;
                }
                self.slot.set_merge_pending(true);
                log::warn!("Worker {}: merge postponed after {:?}", self.id, timeout);
                false
            }
            Err(SendTimeoutError::Disconnected(_)) => {
                log::error!("Worker {}: aggregator disconnected", self.id);
                self.slot.set_state(WorkerState::Error, "Aggregator disconnected");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{absorber_geometry, bend_region, model, single_facet_geometry};
    use crossbeam_channel::{bounded, unbounded};
    use synrad_core::{FacetDescriptor, Link};

    struct Harness {
        commands: Sender<Command>,
        slot: Arc<ControlSlot>,
        handle: JoinHandle<()>,
        sent: u64,
    }

    impl Harness {
        fn new(params: SimulationParams, aggregator: Sender<AggregatorMessage>) -> Self {
            let (commands, receiver) = unbounded();
            let slot = Arc::new(ControlSlot::new());
            let handle = Worker::new(0, params, receiver, aggregator, Arc::clone(&slot))
                .spawn()
                .unwrap();
            Self {
                commands,
                slot,
                handle,
                sent: 0,
            }
        }

        fn send(&mut self, command: Command) {
            self.commands.send(command).unwrap();
            self.sent += 1;
            assert!(self.slot.wait_acknowledged(self.sent, Duration::from_secs(30)));
        }

        fn wait_for(&self, state: WorkerState) {
            let deadline = Instant::now() + Duration::from_secs(30);
            while self.slot.state() != state {
                assert!(Instant::now() < deadline, "worker never reached {state}");
                thread::sleep(Duration::from_millis(5));
            }
        }

        fn exit(mut self) {
            self.send(Command::Exit);
            self.handle.join().unwrap();
            assert_eq!(self.slot.state(), WorkerState::Killed);
        }
    }

    fn params() -> SimulationParams {
        SimulationParams {
            seed: Some(7),
            slice_ms: 10,
            ..Default::default()
        }
    }

    #[test]
    fn test_runs_to_limit_and_merges() {
        let (sender, receiver) = bounded(64);
        let mut harness = Harness::new(
            SimulationParams {
                desorption_limit: Some(500),
                ..params()
            },
            sender,
        );
        let m = model(absorber_geometry(1.0), vec![bend_region(|_| {})]);
        harness.send(Command::Load(m));
        harness.send(Command::Start);
        harness.wait_for(WorkerState::Done);
        assert_eq!(harness.slot.snapshot().desorbed, 500);

        let merged: u64 = receiver
            .try_iter()
            .filter_map(|m| match m {
                AggregatorMessage::Merge(delta) => Some(delta.buffer.header().counter.nb_desorbed),
                _ => None,
            })
            .sum();
        assert_eq!(merged, 500);

        // Done stays done until reset
        harness.send(Command::Start);
        assert_eq!(harness.slot.state(), WorkerState::Done);
        harness.send(Command::Reset);
        assert_eq!(harness.slot.state(), WorkerState::Ready);
        assert_eq!(harness.slot.snapshot().desorbed, 0);
        harness.exit();
    }

    #[test]
    fn test_missing_teleport_destination_is_a_worker_error() {
        let (sender, _receiver) = bounded(16);
        let mut harness = Harness::new(params(), sender);
        let g = single_facet_geometry(FacetDescriptor {
            link: Link::Teleport { facet: 7 },
            ..Default::default()
        });
        harness.send(Command::Load(model(g, vec![bend_region(|_| {})])));
        let status = harness.slot.snapshot();
        assert_eq!(status.state, WorkerState::Error);
        assert!(!status.message.is_empty());

        harness.send(Command::Start);
        assert_eq!(harness.slot.state(), WorkerState::Error);
        harness.exit();
    }

    #[test]
    fn test_start_without_model_is_an_error() {
        let (sender, _receiver) = bounded(16);
        let mut harness = Harness::new(params(), sender);
        harness.send(Command::Start);
        assert_eq!(harness.slot.state(), WorkerState::Error);
        harness.exit();
    }

    #[test]
    fn test_disconnected_aggregator_is_a_worker_error() {
        let (sender, receiver) = bounded(16);
        drop(receiver);
        let mut harness = Harness::new(params(), sender);
        harness.send(Command::Load(model(absorber_geometry(1.0), vec![bend_region(|_| {})])));
        harness.send(Command::Start);
        harness.wait_for(WorkerState::Error);
        assert_eq!(harness.slot.snapshot().message, "Aggregator disconnected");
        harness.exit();
    }

    #[test]
    fn test_full_channel_postpones_merge_but_pause_idles() {
        // Capacity one and nobody reading: the second merge times out
        let (sender, receiver) = bounded(1);
        let mut harness = Harness::new(
            SimulationParams {
                merge_timeout_ms: 1,
                pause_merge_timeout_ms: 1,
                ..params()
            },
            sender,
        );
        harness.send(Command::Load(model(absorber_geometry(1.0), vec![bend_region(|_| {})])));
        harness.send(Command::Start);
        thread::sleep(Duration::from_millis(100));

        harness.send(Command::Pause);
        let status = harness.slot.snapshot();
        assert_eq!(status.state, WorkerState::Ready);
        assert!(status.merge_pending);
        assert_eq!(status.message, "Paused, merge pending");

        // Idle means no more photons
        let paused = status.desorbed;
        thread::sleep(Duration::from_millis(100));
        assert_eq!(harness.slot.snapshot().desorbed, paused);

        // Drain the channel; a repeated pause hands over the held-back results
        let drain = thread::spawn(move || {
            receiver
                .iter()
                .filter_map(|m| match m {
                    AggregatorMessage::Merge(delta) => Some(delta.buffer.header().counter.nb_desorbed),
                    _ => None,
                })
                .sum::<u64>()
        });
        let deadline = Instant::now() + Duration::from_secs(30);
        while harness.slot.snapshot().merge_pending {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(5));
            harness.send(Command::Pause);
        }
        let status = harness.slot.snapshot();
        assert_eq!(status.state, WorkerState::Ready);
        assert_eq!(status.message, "Paused");
        harness.exit();
        assert_eq!(drain.join().unwrap(), paused);
    }
}
