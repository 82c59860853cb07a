pub mod frame;
pub mod pattern;
pub mod rawfile;
pub mod source;
pub mod stream;

pub use frame::{Frame, FrameMetadata, PixelFormat, Plane};
pub use source::{FrameSource, QueueSink, RateStats, StreamEvents};
pub use stream::{SourceAddress, VideoStream};
