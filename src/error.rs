use thiserror::Error;

use crate::capture::frame::PixelFormat;
use crate::display::backend::TextureSpec;

/// A frame whose plane table does not describe its buffer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame has zero width or height")]
    ZeroDimension,

    #[error("frame has {0} planes, at most {max} are supported", max = crate::capture::frame::MAX_PLANES)]
    TooManyPlanes(usize),

    #[error("{format:?} needs {expected} planes, frame has {found}")]
    MissingPlanes {
        format: PixelFormat,
        expected: usize,
        found: usize,
    },

    #[error("plane {plane} stride {stride} is shorter than a row ({min} bytes)")]
    StrideTooSmall {
        plane: usize,
        stride: isize,
        min: usize,
    },

    #[error("plane {plane} rows fall outside the frame buffer")]
    PlaneOutOfBounds { plane: usize },
}

/// Failures inside the display pipeline and its backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DisplayError {
    /// The graphics context could not be set up at all
    #[error("graphics context unavailable: {0}")]
    Context(String),

    #[error("could not create window surface: {0}")]
    Surface(String),

    #[error("could not create {spec} texture: {reason}")]
    TextureCreate { spec: TextureSpec, reason: String },

    #[error("texture upload failed: {0}")]
    Upload(String),

    #[error("draw failed: {0}")]
    Draw(String),

    #[error("mixed negative and positive plane strides are not supported")]
    MixedStrides,

    #[error("pixel format {0:?} cannot be uploaded")]
    UnsupportedFormat(PixelFormat),

    #[error("no window surface")]
    NoSurface,
}

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("playback already started")]
    AlreadyPlaying,

    #[error("failed to initialize display: {0}")]
    Init(#[source] DisplayError),

    #[error("failed to spawn render thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("render thread exited during initialization")]
    RenderThreadExited,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("unsupported source address {0:?}")]
    UnsupportedAddress(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Frame(#[from] FrameError),
}

impl SourceError {
    /// Numeric code reported through `StreamEvents::on_error`.
    /// OS errors keep their errno, everything else is -1.
    pub fn code(&self) -> i32 {
        match self {
            Self::Io(e) => e.raw_os_error().unwrap_or(-1),
            _ => -1,
        }
    }
}
