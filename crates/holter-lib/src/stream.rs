//! Bounded hand-off between an acquisition source and pipeline workers.

use crate::{error::Result, pipeline::AnalysisResult, pipeline::Pipeline, signal::RawSegment};
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, thread::JoinHandle};

/// What a full feed does with the next segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Wait for a worker to take a segment.
    #[default]
    Block,
    /// Discard the incoming segment.
    DropNewest,
    /// Discard the oldest queued segment to make room.
    DropOldest,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SequencedSegment {
    pub sequence: u64,
    pub segment: RawSegment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Accepted,
    /// The pushed segment was discarded.
    DroppedNewest,
    /// Queued, after evicting the segment with this sequence number.
    DroppedOldest(u64),
    /// Every consumer is gone.
    Disconnected,
}

/// Producer side of the segment queue.
pub struct AcquisitionFeed {
    tx: Sender<SequencedSegment>,
    // kept for eviction under DropOldest
    rx: Receiver<SequencedSegment>,
    policy: OverflowPolicy,
    next_sequence: u64,
    dropped: u64,
}

impl AcquisitionFeed {
    pub fn bounded(capacity: usize, policy: OverflowPolicy) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self {
            tx,
            rx,
            policy,
            next_sequence: 0,
            dropped: 0,
        }
    }

    /// Consumer handle; clone it for each worker pool.
    pub fn receiver(&self) -> Receiver<SequencedSegment> {
        self.rx.clone()
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Segments discarded so far under a drop policy.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn push(&mut self, segment: RawSegment) -> PushOutcome {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let item = SequencedSegment { sequence, segment };
        match self.policy {
            OverflowPolicy::Block => match self.tx.send(item) {
                Ok(()) => PushOutcome::Accepted,
                Err(_) => PushOutcome::Disconnected,
            },
            OverflowPolicy::DropNewest => match self.tx.try_send(item) {
                Ok(()) => PushOutcome::Accepted,
                Err(TrySendError::Full(_)) => {
                    self.dropped += 1;
                    warn!("feed full, dropped incoming segment {}", sequence);
                    PushOutcome::DroppedNewest
                }
                Err(TrySendError::Disconnected(_)) => PushOutcome::Disconnected,
            },
            OverflowPolicy::DropOldest => self.push_evicting(item),
        }
    }

    fn push_evicting(&mut self, mut item: SequencedSegment) -> PushOutcome {
        let mut evicted = None;
        loop {
            match self.tx.try_send(item) {
                Ok(()) => {
                    return match evicted {
                        Some(seq) => PushOutcome::DroppedOldest(seq),
                        None => PushOutcome::Accepted,
                    }
                }
                Err(TrySendError::Full(back)) => {
                    item = back;
                    match self.rx.try_recv() {
                        Ok(old) => {
                            self.dropped += 1;
                            warn!("feed full, dropped queued segment {}", old.sequence);
                            evicted = Some(old.sequence);
                        }
                        // a worker took one meanwhile; retry the send
                        Err(TryRecvError::Empty) => {}
                        Err(TryRecvError::Disconnected) => return PushOutcome::Disconnected,
                    }
                }
                Err(TrySendError::Disconnected(_)) => return PushOutcome::Disconnected,
            }
        }
    }
}

/// Analysis of one queued segment.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentOutcome {
    pub sequence: u64,
    pub result: Result<AnalysisResult>,
}

/// Threads that each run whole, independent pipeline invocations.
pub struct WorkerPool {
    outcomes: Receiver<SegmentOutcome>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Workers exit once every feed sender is dropped and the queue is empty.
    /// The outcome channel is bounded, so drain it while workers run.
    pub fn spawn(
        pipeline: Arc<Pipeline>,
        input: Receiver<SequencedSegment>,
        workers: usize,
    ) -> Self {
        let workers = workers.max(1);
        let (out_tx, outcomes) = bounded(workers * 4);
        let handles = (0..workers)
            .map(|id| {
                let pipeline = Arc::clone(&pipeline);
                let input = input.clone();
                let out_tx = out_tx.clone();
                std::thread::spawn(move || {
                    for item in input.iter() {
                        debug!("worker {} analysing segment {}", id, item.sequence);
                        let outcome = SegmentOutcome {
                            sequence: item.sequence,
                            result: pipeline.analyze(&item.segment),
                        };
                        if out_tx.send(outcome).is_err() {
                            break;
                        }
                    }
                })
            })
            .collect();
        Self { outcomes, handles }
    }

    pub fn outcomes(&self) -> &Receiver<SegmentOutcome> {
        &self.outcomes
    }

    /// Drain every outcome until the workers finish, ordered by sequence.
    pub fn collect(self) -> Vec<SegmentOutcome> {
        let mut all: Vec<SegmentOutcome> = self.outcomes.iter().collect();
        for handle in self.handles {
            if handle.join().is_err() {
                warn!("pipeline worker panicked");
            }
        }
        all.sort_by_key(|o| o.sequence);
        all
    }
}

/// What a [`run_batch`] call produced.
#[derive(Debug)]
pub struct BatchReport {
    /// Outcomes ordered by sequence number.
    pub outcomes: Vec<SegmentOutcome>,
    /// Segments the feed accepted.
    pub queued: usize,
    /// Segments discarded by the overflow policy.
    pub dropped: u64,
}

/// Feed `segments` through a bounded queue to `workers` threads and gather
/// every outcome.
///
/// Segments are pushed from a separate thread while this one drains the
/// outcome channel, so neither bounded channel can stall the other however
/// many segments there are.
pub fn run_batch<I>(
    pipeline: Arc<Pipeline>,
    segments: I,
    capacity: usize,
    policy: OverflowPolicy,
    workers: usize,
) -> BatchReport
where
    I: IntoIterator<Item = RawSegment>,
    I::IntoIter: Send,
{
    let mut feed = AcquisitionFeed::bounded(capacity, policy);
    let pool = WorkerPool::spawn(pipeline, feed.receiver(), workers);
    let segments = segments.into_iter();
    std::thread::scope(|scope| {
        let producer = scope.spawn(move || {
            let mut queued = 0usize;
            for segment in segments {
                match feed.push(segment) {
                    PushOutcome::Accepted | PushOutcome::DroppedOldest(_) => queued += 1,
                    PushOutcome::DroppedNewest => {}
                    PushOutcome::Disconnected => {
                        warn!("all pipeline workers stopped; {} segments queued", queued);
                        break;
                    }
                }
            }
            // dropping the feed closes the queue and lets the workers finish
            (queued, feed.dropped())
        });
        let outcomes = pool.collect();
        let (queued, dropped) = producer.join().unwrap_or_else(|_| {
            warn!("segment producer panicked");
            (0, 0)
        });
        if dropped > 0 {
            warn!("{} segments dropped by the feed", dropped);
        }
        BatchReport {
            outcomes,
            queued,
            dropped,
        }
    })
}
