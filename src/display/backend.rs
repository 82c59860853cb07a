//! Seam between the display pipeline and the windowing/GPU layer

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::capture::frame::PlaneRows;
use crate::display::rect::DisplayRect;
use crate::error::DisplayError;

/// Streaming texture pixel layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TextureFormat {
    /// Y, U, V planes (I420)
    Iyuv,
    /// Y, V, U planes
    Yv12,
}

impl fmt::Display for TextureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Iyuv => f.write_str("IYUV"),
            Self::Yv12 => f.write_str("YV12"),
        }
    }
}

/// Everything that forces a texture reallocation when it changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureSpec {
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for TextureSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} {}", self.width, self.height, self.format)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendEvent {
    /// The user asked to close the window
    Quit,
    Resized { width: u32, height: u32 },
    Other,
}

/// GPU and window operations used by the render thread.
///
/// Implementations are created on, and never leave, the render thread.
pub trait RenderBackend {
    /// Create the window if it does not exist yet.
    fn open_surface(&mut self, width: u32, height: u32, title: &str) -> Result<(), DisplayError>;

    fn has_surface(&self) -> bool;

    /// Current drawable size of the window.
    fn surface_size(&self) -> Result<(u32, u32), DisplayError>;

    /// Next pending window/input event, without blocking.
    fn poll_event(&mut self) -> Option<BackendEvent>;

    /// Replace the active texture with a new one matching `spec`.
    fn create_texture(&mut self, spec: TextureSpec) -> Result<(), DisplayError>;

    /// Copy three planes into the active texture. Rows are walked forward
    /// from the start of each slice.
    fn update_yuv(
        &mut self,
        y: PlaneRows<'_>,
        u: PlaneRows<'_>,
        v: PlaneRows<'_>,
    ) -> Result<(), DisplayError>;

    /// Clear the back buffer to black.
    fn clear(&mut self);

    /// Draw the active texture into `dest`, no rotation or flip.
    fn draw(&mut self, dest: DisplayRect) -> Result<(), DisplayError>;

    /// Swap the back buffer onto the screen.
    fn present(&mut self);
}
