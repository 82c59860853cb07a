//! Turns frames into pixels on screen, reusing the texture while the
//! frame geometry stays the same.

use std::time::Instant;

use tracing::{debug, error, info};

use crate::capture::frame::{PixelFormat, StrideLayout};
use crate::capture::Frame;
use crate::display::backend::{RenderBackend, TextureFormat, TextureSpec};
use crate::display::rect::{compute_destination_rect, DisplayRect};
use crate::error::DisplayError;
use crate::DisplayConfig;

pub struct DisplayPipeline<B> {
    backend: B,
    config: DisplayConfig,

    /// Spec of the texture currently held by the backend
    texture: Option<TextureSpec>,
}

impl<B: RenderBackend> DisplayPipeline<B> {
    pub fn new(backend: B, config: DisplayConfig) -> Self {
        Self {
            backend,
            config,
            texture: None,
        }
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn texture(&self) -> Option<TextureSpec> {
        self.texture
    }

    /// Open the window on first use.
    pub fn ensure_surface(&mut self) -> Result<(), DisplayError> {
        if self.backend.has_surface() {
            return Ok(());
        }
        self.backend
            .open_surface(self.config.width, self.config.height, &self.config.title)?;
        info!("Opened {}x{} window", self.config.width, self.config.height);
        Ok(())
    }

    /// Reallocate the texture only if format or size changed.
    pub fn ensure_texture(
        &mut self,
        format: TextureFormat,
        width: u32,
        height: u32,
    ) -> Result<(), DisplayError> {
        let spec = TextureSpec {
            format,
            width,
            height,
        };
        if self.texture == Some(spec) {
            return Ok(());
        }

        // The backend has dropped the old texture whether or not this succeeds
        self.texture = None;
        self.backend.create_texture(spec)?;
        self.texture = Some(spec);
        metrics::counter!("texture_allocations").increment(1);
        info!("Initialized {} texture", spec);
        Ok(())
    }

    /// Upload the planes of `frame` into the texture.
    ///
    /// Bottom-up frames are uploaded from their last row with the absolute
    /// stride. Frames mixing stride signs are rejected before the texture is
    /// touched.
    pub fn upload_planar(&mut self, frame: &Frame) -> Result<(), DisplayError> {
        if frame.format() != PixelFormat::Yuv420p {
            return Err(DisplayError::UnsupportedFormat(frame.format()));
        }

        let layout = frame.stride_layout();
        if layout == StrideLayout::Mixed {
            error!(
                sequence = frame.meta().sequence,
                "Mixed negative and positive linesizes are not supported"
            );
            return Err(DisplayError::MixedStrides);
        }

        self.ensure_texture(self.config.format, frame.width(), frame.height())?;

        let (Some(y), Some(u), Some(v)) =
            (frame.plane_rows(0), frame.plane_rows(1), frame.plane_rows(2))
        else {
            return Err(DisplayError::Upload("frame planes out of range".into()));
        };
        if layout == StrideLayout::BottomUp {
            debug!(sequence = frame.meta().sequence, "Uploading bottom-up frame");
        }
        self.backend.update_yuv(y, u, v)
    }

    /// Clear, upload, draw into `dest` and present.
    ///
    /// The frame is released as soon as the upload returns. If the upload
    /// fails nothing is presented and the previous picture stays up.
    pub fn render_frame(&mut self, frame: Frame, dest: DisplayRect) -> Result<(), DisplayError> {
        self.backend.clear();
        self.upload_planar(&frame)?;
        drop(frame);

        self.backend.draw(dest)?;
        self.backend.present();
        Ok(())
    }

    /// Letterbox `frame` into the current window and show it.
    pub fn render(&mut self, frame: Frame) -> Result<(), DisplayError> {
        let render_start = Instant::now();
        metrics::histogram!("frame_latency_ms")
            .record(frame.timestamp().elapsed().as_secs_f64() * 1000.0);

        let (surface_width, surface_height) = self.backend.surface_size()?;
        let dest = compute_destination_rect(
            surface_width,
            surface_height,
            frame.width(),
            frame.height(),
            1.0,
        );

        let sequence = frame.meta().sequence;
        match self.render_frame(frame, dest) {
            Ok(()) => {
                metrics::counter!("frames_rendered").increment(1);
                metrics::histogram!("render_time_us")
                    .record(render_start.elapsed().as_micros() as f64);
                Ok(())
            }
            Err(e) => {
                metrics::counter!("frames_skipped").increment(1);
                debug!(sequence, "Frame skipped");
                Err(e)
            }
        }
    }
}
