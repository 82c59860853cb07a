pub mod queue;

pub use queue::{DropPolicy, FrameQueue, QueueStats, DEFAULT_POP_TIMEOUT};
