//! Producer and consumer boundaries of the frame pipeline

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error};

use crate::capture::Frame;
use crate::pipeline::{FrameQueue, DEFAULT_POP_TIMEOUT};

/// Supplies frames to the render thread.
///
/// Only ever called from the single render thread.
pub trait FrameSource: Send + Sync {
    /// Next frame to display, waiting at most `timeout` for one.
    fn available_frame(&self, timeout: Duration) -> Option<Frame>;

    /// [`available_frame`](Self::available_frame) with [`DEFAULT_POP_TIMEOUT`].
    fn next_available(&self) -> Option<Frame> {
        self.available_frame(DEFAULT_POP_TIMEOUT)
    }

    /// Drop frames that will never be displayed. Returns how many.
    fn discard_pending(&self) -> usize {
        0
    }
}

/// Periodic producer statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateStats {
    pub total: u64,
    pub dropped: u64,
    pub decoded: u64,
}

/// Callbacks a frame producer delivers into.
///
/// Errors and rate statistics are observability only; they never reach the
/// render thread.
pub trait StreamEvents: Send + Sync {
    fn on_frame(&self, frame: Frame);

    fn on_error(&self, code: i32, message: &str);

    fn on_rate(&self, stats: RateStats);
}

/// Delivers produced frames into a [`FrameQueue`] and logs the rest.
#[derive(Clone)]
pub struct QueueSink {
    queue: Arc<FrameQueue>,
}

impl QueueSink {
    pub fn new(queue: Arc<FrameQueue>) -> Self {
        Self { queue }
    }
}

impl StreamEvents for QueueSink {
    fn on_frame(&self, frame: Frame) {
        self.queue.push(frame);
    }

    fn on_error(&self, code: i32, message: &str) {
        error!(code, "Stream error: {}", message);
    }

    fn on_rate(&self, stats: RateStats) {
        debug!(
            total = stats.total,
            dropped = stats.dropped,
            decoded = stats.decoded,
            queued = self.queue.len(),
            "Frame rate"
        );
    }
}
