//! The aggregator thread: sole owner of the canonical result buffer.
//!
//! Workers hand over their private buffers as deltas; the aggregator adds
//! them in arrival order. Merges commute, so that order does not matter.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use synrad_core::{Accumulate, ResultBuffer};

/// Results accumulated by one worker since its last merge.
#[derive(Debug)]
pub struct Delta {
    pub worker: usize,
    pub buffer: ResultBuffer,
}

/// Messages understood by the aggregator.
#[derive(Debug)]
pub enum AggregatorMessage {
    Merge(Delta),
    /// Reply with a copy of the canonical buffer, if one is loaded.
    Snapshot(Sender<Option<ResultBuffer>>),
    /// Replace the canonical buffer with a zeroed one (load or reset).
    Reset(ResultBuffer),
    Shutdown,
}

pub struct Aggregator {
    buffer: Option<ResultBuffer>,
    desorbed: Arc<AtomicU64>,
    merges: u64,
}

impl Aggregator {
    /// `desorbed` mirrors the merged desorption count for status display.
    pub fn new(desorbed: Arc<AtomicU64>) -> Self {
        Self {
            buffer: None,
            desorbed,
            merges: 0,
        }
    }

    pub fn buffer(&self) -> Option<&ResultBuffer> {
        self.buffer.as_ref()
    }

    pub fn merges(&self) -> u64 {
        self.merges
    }

    /// Apply one message. Returns false on shutdown.
    pub fn handle(&mut self, message: AggregatorMessage) -> bool {
        match message {
            AggregatorMessage::Merge(delta) => self.merge(delta),
            AggregatorMessage::Snapshot(reply) => {
                // The requester may have given up waiting
                let _ = reply.send(self.buffer.clone());
            }
            AggregatorMessage::Reset(buffer) => {
                self.desorbed.store(buffer.header().counter.nb_desorbed, Ordering::Relaxed);
                self.buffer = Some(buffer);
                self.merges = 0;
            }
            AggregatorMessage::Shutdown => return false,
        }
        true
    }

    fn merge(&mut self, delta: Delta) {
        let Some(buffer) = self.buffer.as_mut() else {
            log::warn!("Dropping delta from worker {}: nothing loaded", delta.worker);
            return;
        };
        if buffer.layout() != delta.buffer.layout() {
            log::warn!("Dropping stale delta from worker {}", delta.worker);
            return;
        }
        buffer.accumulate(&delta.buffer);
        self.merges += 1;
        self.desorbed
            .store(buffer.header().counter.nb_desorbed, Ordering::Relaxed);
    }

    /// Process messages until shutdown or until every sender is gone.
    pub fn run(mut self, receiver: Receiver<AggregatorMessage>) {
        while let Ok(message) = receiver.recv() {
            if !self.handle(message) {
                break;
            }
        }
        log::info!("Aggregator stopped after {} merges", self.merges);
    }

    pub fn spawn(self, receiver: Receiver<AggregatorMessage>) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("synrad-aggregator".into())
            .spawn(move || self.run(receiver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{model, strip_geometry};
    use crossbeam_channel::bounded;

    #[test]
    fn test_merges_deltas_and_tracks_desorbed() {
        let m = model(strip_geometry(2), Vec::new());
        let desorbed = Arc::new(AtomicU64::new(0));
        let mut aggregator = Aggregator::new(Arc::clone(&desorbed));
        assert!(aggregator.handle(AggregatorMessage::Reset(m.new_buffer())));

        for worker in 0..3 {
            let mut buffer = m.new_buffer();
            buffer.header_mut().counter.nb_desorbed = 10;
            buffer.counter_mut(1).nb_abs = 2;
            aggregator.handle(AggregatorMessage::Merge(Delta { worker, buffer }));
        }
        let merged = aggregator.buffer().unwrap();
        assert_eq!(merged.header().counter.nb_desorbed, 30);
        assert_eq!(merged.counter(1).nb_abs, 6);
        assert_eq!(merged.header().points_total, m.points_total);
        assert_eq!(desorbed.load(Ordering::Relaxed), 30);
        assert_eq!(aggregator.merges(), 3);

        aggregator.handle(AggregatorMessage::Reset(m.new_buffer()));
        assert_eq!(desorbed.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_stale_layout_is_dropped() {
        let old = model(strip_geometry(2), Vec::new());
        let new = model(strip_geometry(3), Vec::new());
        let mut aggregator = Aggregator::new(Arc::new(AtomicU64::new(0)));
        aggregator.handle(AggregatorMessage::Reset(new.new_buffer()));

        let mut stale = old.new_buffer();
        stale.header_mut().counter.nb_desorbed = 5;
        aggregator.handle(AggregatorMessage::Merge(Delta {
            worker: 0,
            buffer: stale,
        }));
        assert_eq!(aggregator.buffer().unwrap().header().counter.nb_desorbed, 0);
        assert_eq!(aggregator.merges(), 0);
    }

    #[test]
    fn test_thread_answers_snapshots_and_shuts_down() {
        let m = model(strip_geometry(1), Vec::new());
        let (sender, receiver) = bounded(4);
        let handle = Aggregator::new(Arc::new(AtomicU64::new(0)))
            .spawn(receiver)
            .unwrap();

        let (reply, answer) = bounded(1);
        sender.send(AggregatorMessage::Snapshot(reply)).unwrap();
        assert!(answer.recv().unwrap().is_none());

        sender.send(AggregatorMessage::Reset(m.new_buffer())).unwrap();
        let (reply, answer) = bounded(1);
        sender.send(AggregatorMessage::Snapshot(reply)).unwrap();
        assert_eq!(answer.recv().unwrap().unwrap().facet_count(), 1);

        sender.send(AggregatorMessage::Shutdown).unwrap();
        handle.join().unwrap();
    }
}
