pub mod backend;
pub mod pipeline;
pub mod rect;

#[cfg(feature = "sdl")]
pub mod sdl;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{BackendEvent, RenderBackend, TextureFormat, TextureSpec};
pub use pipeline::DisplayPipeline;
pub use rect::{compute_destination_rect, DisplayRect};

#[cfg(feature = "sdl")]
pub use sdl::SdlBackend;
