//! SDL2 Window Display Module
//! Window management, streaming YUV texture and presentation on top of the
//! sdl2 crate. Everything here lives on the render thread.

use sdl2::event::{Event, WindowEvent};
use sdl2::pixels::{Color, PixelFormatEnum};
use sdl2::rect::Rect;
use sdl2::render::{BlendMode, Texture, TextureCreator, WindowCanvas};
use sdl2::video::WindowContext;
use sdl2::{EventPump, Sdl, VideoSubsystem};
use tracing::{info, instrument, warn};

use crate::capture::frame::PlaneRows;
use crate::display::backend::{BackendEvent, RenderBackend, TextureFormat, TextureSpec};
use crate::display::rect::DisplayRect;
use crate::error::DisplayError;

/// SDL2 renderer backend.
/// The window is created lazily on the first refresh, with a hardware
/// accelerated vsync renderer when available.
pub struct SdlBackend {
    texture: Option<Texture>,
    texture_creator: Option<TextureCreator<WindowContext>>,
    canvas: Option<WindowCanvas>,
    event_pump: EventPump,
    video_subsystem: VideoSubsystem,
    _sdl_context: Sdl,
}

impl SdlBackend {
    /// Set up the SDL video subsystem and event pump.
    #[instrument]
    pub fn new() -> Result<Self, DisplayError> {
        let sdl_context = sdl2::init().map_err(DisplayError::Context)?;
        let video_subsystem = sdl_context.video().map_err(DisplayError::Context)?;
        let event_pump = sdl_context.event_pump().map_err(DisplayError::Context)?;

        sdl2::hint::set("SDL_RENDER_SCALE_QUALITY", "linear");
        info!("Initialized SDL {}", sdl2::version::version());

        Ok(Self {
            texture: None,
            texture_creator: None,
            canvas: None,
            event_pump,
            video_subsystem,
            _sdl_context: sdl_context,
        })
    }

    fn build_canvas(
        &self,
        width: u32,
        height: u32,
        title: &str,
    ) -> Result<WindowCanvas, DisplayError> {
        let build_window = || {
            self.video_subsystem
                .window(title, width, height)
                .position_centered()
                .resizable()
                .build()
                .map_err(|e| DisplayError::Surface(e.to_string()))
        };

        match build_window()?.into_canvas().accelerated().present_vsync().build() {
            Ok(canvas) => Ok(canvas),
            Err(e) => {
                warn!("Failed to initialize a hardware accelerated renderer: {}", e);
                build_window()?
                    .into_canvas()
                    .build()
                    .map_err(|e| DisplayError::Surface(e.to_string()))
            }
        }
    }
}

fn pixel_format(format: TextureFormat) -> PixelFormatEnum {
    match format {
        TextureFormat::Iyuv => PixelFormatEnum::IYUV,
        TextureFormat::Yv12 => PixelFormatEnum::YV12,
    }
}

fn chroma_slice<'a>(plane: &PlaneRows<'a>, luma_height: usize) -> &'a [u8] {
    let data: &'a [u8] = plane.data;
    let len = (plane.pitch * luma_height / 2).min(data.len());
    &data[..len]
}

impl RenderBackend for SdlBackend {
    #[instrument(skip(self))]
    fn open_surface(&mut self, width: u32, height: u32, title: &str) -> Result<(), DisplayError> {
        let canvas = self.build_canvas(width, height, title)?;
        info!("Initialized {} renderer", canvas.info().name);

        self.texture = None;
        self.texture_creator = Some(canvas.texture_creator());
        self.canvas = Some(canvas);
        Ok(())
    }

    fn has_surface(&self) -> bool {
        self.canvas.is_some()
    }

    fn surface_size(&self) -> Result<(u32, u32), DisplayError> {
        self.canvas
            .as_ref()
            .ok_or(DisplayError::NoSurface)?
            .output_size()
            .map_err(DisplayError::Surface)
    }

    fn poll_event(&mut self) -> Option<BackendEvent> {
        let event = match self.event_pump.poll_event()? {
            Event::Quit { .. } => BackendEvent::Quit,
            Event::Window {
                win_event: WindowEvent::Resized(width, height),
                ..
            } => BackendEvent::Resized {
                width: width.max(0) as u32,
                height: height.max(0) as u32,
            },
            _ => BackendEvent::Other,
        };
        Some(event)
    }

    fn create_texture(&mut self, spec: TextureSpec) -> Result<(), DisplayError> {
        if let Some(old) = self.texture.take() {
            // SAFETY: the renderer that owns it is still alive and nothing
            // else holds the texture.
            unsafe { old.destroy() };
        }

        let creator = self.texture_creator.as_ref().ok_or(DisplayError::NoSurface)?;
        let mut texture = creator
            .create_texture_streaming(pixel_format(spec.format), spec.width, spec.height)
            .map_err(|e| DisplayError::TextureCreate {
                spec,
                reason: e.to_string(),
            })?;
        texture.set_blend_mode(BlendMode::None);

        self.texture = Some(texture);
        Ok(())
    }

    fn update_yuv(
        &mut self,
        y: PlaneRows<'_>,
        u: PlaneRows<'_>,
        v: PlaneRows<'_>,
    ) -> Result<(), DisplayError> {
        let texture = self
            .texture
            .as_mut()
            .ok_or_else(|| DisplayError::Upload("no texture".into()))?;

        // sdl2 insists on chroma slices of exactly pitch * height / 2 bytes.
        // For odd heights SDL still reads the last chroma row, which the
        // frame validated as present in its buffer.
        let height = y.rows;
        texture
            .update_yuv(
                None,
                y.data,
                y.pitch,
                chroma_slice(&u, height),
                u.pitch,
                chroma_slice(&v, height),
                v.pitch,
            )
            .map_err(|e| DisplayError::Upload(e.to_string()))
    }

    fn clear(&mut self) {
        if let Some(canvas) = self.canvas.as_mut() {
            canvas.set_draw_color(Color::RGB(0, 0, 0));
            canvas.clear();
        }
    }

    fn draw(&mut self, dest: DisplayRect) -> Result<(), DisplayError> {
        let canvas = self.canvas.as_mut().ok_or(DisplayError::NoSurface)?;
        let texture = self
            .texture
            .as_ref()
            .ok_or_else(|| DisplayError::Draw("no texture".into()))?;

        let dest = Rect::new(dest.x, dest.y, dest.width, dest.height);
        canvas
            .copy_ex(texture, None, Some(dest), 0.0, None, false, false)
            .map_err(DisplayError::Draw)
    }

    fn present(&mut self) {
        if let Some(canvas) = self.canvas.as_mut() {
            canvas.present();
        }
    }
}
