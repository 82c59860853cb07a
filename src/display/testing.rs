//! In-memory backend that records what the pipeline asked of it

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::capture::frame::PlaneRows;
use crate::display::backend::{BackendEvent, RenderBackend, TextureSpec};
use crate::display::rect::DisplayRect;
use crate::error::DisplayError;

pub type MockState = Arc<Mutex<MockLog>>;

/// Uploaded plane contents, rows in the order they reached the texture
pub type UploadedPlanes = Vec<Vec<Vec<u8>>>;

#[derive(Debug, Default)]
pub struct MockLog {
    pub surface: (u32, u32),
    pub surface_open: bool,
    pub textures_created: Vec<TextureSpec>,
    pub uploads: Vec<UploadedPlanes>,
    pub draws: Vec<DisplayRect>,
    pub clears: usize,
    pub presents: usize,
    pub events: VecDeque<BackendEvent>,
    pub fail_surface: bool,
    pub fail_textures: bool,
    pub fail_uploads: bool,
}

pub struct MockBackend {
    state: MockState,
    texture: Option<TextureSpec>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::with_state(MockState::default())
    }

    pub fn with_state(state: MockState) -> Self {
        Self {
            state,
            texture: None,
        }
    }

    pub fn state(&self) -> MockState {
        self.state.clone()
    }
}

impl RenderBackend for MockBackend {
    fn open_surface(&mut self, width: u32, height: u32, _title: &str) -> Result<(), DisplayError> {
        let mut state = self.state.lock();
        if state.fail_surface {
            return Err(DisplayError::Surface("mock".into()));
        }
        state.surface_open = true;
        state.surface = (width, height);
        Ok(())
    }

    fn has_surface(&self) -> bool {
        self.state.lock().surface_open
    }

    fn surface_size(&self) -> Result<(u32, u32), DisplayError> {
        let state = self.state.lock();
        if !state.surface_open {
            return Err(DisplayError::NoSurface);
        }
        Ok(state.surface)
    }

    fn poll_event(&mut self) -> Option<BackendEvent> {
        self.state.lock().events.pop_front()
    }

    fn create_texture(&mut self, spec: TextureSpec) -> Result<(), DisplayError> {
        self.texture = None;
        let mut state = self.state.lock();
        if state.fail_textures {
            return Err(DisplayError::TextureCreate {
                spec,
                reason: "mock".into(),
            });
        }
        state.textures_created.push(spec);
        self.texture = Some(spec);
        Ok(())
    }

    fn update_yuv(
        &mut self,
        y: PlaneRows<'_>,
        u: PlaneRows<'_>,
        v: PlaneRows<'_>,
    ) -> Result<(), DisplayError> {
        let mut state = self.state.lock();
        if state.fail_uploads || self.texture.is_none() {
            return Err(DisplayError::Upload("mock".into()));
        }
        let planes = [y, u, v]
            .iter()
            .map(|plane| plane.lines().map(<[u8]>::to_vec).collect())
            .collect();
        state.uploads.push(planes);
        Ok(())
    }

    fn clear(&mut self) {
        self.state.lock().clears += 1;
    }

    fn draw(&mut self, dest: DisplayRect) -> Result<(), DisplayError> {
        self.state.lock().draws.push(dest);
        Ok(())
    }

    fn present(&mut self) {
        self.state.lock().presents += 1;
    }
}
