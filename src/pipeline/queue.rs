//! Frame hand-off between the producer and the render thread

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crossbeam::utils::CachePadded;
use flume::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::capture::source::FrameSource;
use crate::capture::Frame;

/// How long a consumer waits for a frame when it does not pick a timeout
pub const DEFAULT_POP_TIMEOUT: Duration = Duration::from_millis(200);

/// What to do with a push that finds a bounded queue full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropPolicy {
    /// Evict the frame at the head
    #[default]
    Oldest,
    /// Discard the incoming frame
    Newest,
}

/// FIFO of decoded frames.
///
/// `push` never blocks and is unbounded unless a capacity was given.
/// `pop` waits up to a timeout for the next frame.
pub struct FrameQueue {
    tx: Sender<Frame>,
    rx: Receiver<Frame>,
    limit: Option<(usize, DropPolicy)>,

    /// Serializes pushes so evict-then-send stays atomic
    push_lock: Mutex<()>,

    stats: CachePadded<Stats>,
}

#[derive(Default)]
struct Stats {
    frames_pushed: AtomicUsize,
    frames_popped: AtomicUsize,
    frames_dropped: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pushed: usize,
    pub popped: usize,
    pub dropped: usize,
}

impl FrameQueue {
    pub fn new() -> Self {
        let (tx, rx) = flume::unbounded();
        Self {
            tx,
            rx,
            limit: None,
            push_lock: Mutex::new(()),
            stats: CachePadded::new(Stats::default()),
        }
    }

    /// Queue holding at most `capacity` frames (minimum 1).
    pub fn bounded(capacity: usize, policy: DropPolicy) -> Self {
        Self {
            limit: Some((capacity.max(1), policy)),
            ..Self::new()
        }
    }

    /// Producer: hand a frame over. Never blocks on the consumer.
    ///
    /// Eviction races with a concurrent `pop`: if the consumer takes a frame
    /// between the fullness check and the eviction, one frame more than
    /// needed is dropped. The queue never grows past its capacity and every
    /// frame is counted exactly once as popped, dropped or still queued.
    pub fn push(&self, frame: Frame) {
        let _guard = self.push_lock.lock();

        if let Some((capacity, policy)) = self.limit {
            if self.rx.len() >= capacity {
                match policy {
                    DropPolicy::Oldest => {
                        if let Ok(oldest) = self.rx.try_recv() {
                            self.record_drop(&oldest, policy);
                        }
                    }
                    DropPolicy::Newest => {
                        self.record_drop(&frame, policy);
                        return;
                    }
                }
            }
        }

        // We hold `rx`, so the channel can never be disconnected.
        if self.tx.send(frame).is_ok() {
            self.stats.frames_pushed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_drop(&self, frame: &Frame, policy: DropPolicy) {
        self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("queue_frames_dropped").increment(1);
        debug!(sequence = frame.meta().sequence, ?policy, "Queue full, dropping frame");
    }

    /// Consumer: take the head, waiting up to `timeout` for one to arrive.
    pub fn pop(&self, timeout: Duration) -> Option<Frame> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => {
                self.stats.frames_popped.fetch_add(1, Ordering::Relaxed);
                Some(frame)
            }
            Err(RecvTimeoutError::Timeout) => {
                trace!("No frame within {:?}", timeout);
                None
            }
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Drop every queued frame without displaying it.
    pub fn clear(&self) -> usize {
        let _guard = self.push_lock.lock();
        let discarded = self.rx.drain().count();
        if discarded > 0 {
            debug!("Discarded {} queued frames", discarded);
        }
        discarded
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pushed: self.stats.frames_pushed.load(Ordering::Relaxed),
            popped: self.stats.frames_popped.load(Ordering::Relaxed),
            dropped: self.stats.frames_dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for FrameQueue {
    fn available_frame(&self, timeout: Duration) -> Option<Frame> {
        self.pop(timeout)
    }

    fn discard_pending(&self) -> usize {
        self.clear()
    }
}
