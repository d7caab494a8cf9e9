use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, warn};

use crate::transport::ByteEvent;

/// Weight of the newest sample in the throughput average.
const SMOOTHING_FACTOR: f64 = 0.3;
/// Floor for the interval between two events, so back-to-back reads don't divide by zero.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Live counters for one part. Written by the [`Aggregator`] only.
#[derive(Debug, Default)]
pub struct PartProgress {
    bytes: AtomicU64,
    rate_bits: AtomicU64,
}

impl PartProgress {
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Acquire)
    }

    /// Bytes per second.
    pub fn rate(&self) -> f64 {
        f64::from_bits(self.rate_bits.load(Ordering::Acquire))
    }
}

#[derive(Debug)]
pub struct ProgressBoard {
    parts: Vec<PartProgress>,
}

impl ProgressBoard {
    pub fn new(parts: usize) -> Self {
        Self {
            parts: (0..parts).map(|_| PartProgress::default()).collect(),
        }
    }

    pub fn part(&self, id: usize) -> Option<&PartProgress> {
        self.parts.get(id)
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.parts.iter().map(PartProgress::bytes).sum()
    }
}

/// Folds byte events into the [`ProgressBoard`].
pub struct Aggregator {
    board: Arc<ProgressBoard>,
    last_event: Vec<Instant>,
    smoothed: Vec<Option<f64>>,
}

impl Aggregator {
    pub fn new(board: Arc<ProgressBoard>) -> Self {
        let now = Instant::now();
        let parts = board.len();
        Self {
            board,
            last_event: vec![now; parts],
            smoothed: vec![None; parts],
        }
    }

    pub fn record(&mut self, event: ByteEvent, now: Instant) {
        let Some(slot) = self.board.part(event.part) else {
            warn!(part = event.part, "byte event for unknown part");
            return;
        };

        slot.bytes.fetch_add(event.bytes as u64, Ordering::AcqRel);

        let interval = now
            .saturating_duration_since(self.last_event[event.part])
            .max(MIN_INTERVAL);
        let sample = event.bytes as f64 / interval.as_secs_f64();
        let rate = match self.smoothed[event.part] {
            Some(previous) => previous + SMOOTHING_FACTOR * (sample - previous),
            None => sample,
        };
        self.smoothed[event.part] = Some(rate);
        slot.rate_bits.store(rate.to_bits(), Ordering::Release);
        self.last_event[event.part] = now;
    }

    /// Consumes events until every sender is gone, then returns the bytes
    /// counted per part.
    pub async fn run(mut self, mut events: UnboundedReceiver<ByteEvent>) -> Vec<u64> {
        while let Some(event) = events.recv().await {
            self.record(event, Instant::now());
        }
        debug!(total = self.board.total_bytes(), "byte events drained");
        (0..self.board.len())
            .map(|id| self.board.part(id).map_or(0, PartProgress::bytes))
            .collect()
    }
}
