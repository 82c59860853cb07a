//! Render thread lifecycle and the poll/refresh loop

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use flume::{Receiver, Sender};
use tracing::{debug, error, info, trace, warn, Dispatch};

use crate::capture::source::FrameSource;
use crate::display::{BackendEvent, DisplayPipeline, RenderBackend};
use crate::error::{DisplayError, PlayerError};
use crate::{DisplayConfig, PipelineConfig};

/// Builds the backend on the render thread
pub type BackendFactory<B> = dyn Fn() -> Result<B, DisplayError> + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Initializing,
    Running,
    Stopping,
}

/// Notifications from the render thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEvent {
    /// The window was closed
    QuitRequested,
}

/// Owns the render thread.
///
/// `play` spawns it, `stop` asks it to finish and joins it. All backend and
/// GPU work happens on that thread; the controller never touches frames.
pub struct PlaybackController<B> {
    display: DisplayConfig,
    pipeline: PipelineConfig,
    source: Arc<dyn FrameSource>,
    factory: Arc<BackendFactory<B>>,
    dispatch: Dispatch,

    state: PlayerState,
    stop: Arc<AtomicBool>,
    render_thread: Option<JoinHandle<()>>,
    events_tx: Sender<PlayerEvent>,
    events_rx: Receiver<PlayerEvent>,
}

impl<B: RenderBackend + 'static> PlaybackController<B> {
    pub fn new<F>(
        display: DisplayConfig,
        pipeline: PipelineConfig,
        source: Arc<dyn FrameSource>,
        factory: F,
    ) -> Self
    where
        F: Fn() -> Result<B, DisplayError> + Send + Sync + 'static,
    {
        let (events_tx, events_rx) = flume::unbounded();
        Self {
            display,
            pipeline,
            source,
            factory: Arc::new(factory),
            dispatch: tracing::dispatcher::get_default(Dispatch::clone),
            state: PlayerState::Idle,
            stop: Arc::new(AtomicBool::new(true)),
            render_thread: None,
            events_tx,
            events_rx,
        }
    }

    /// Log through `dispatch` on the render thread instead of the
    /// subscriber that was current at construction.
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn events(&self) -> Receiver<PlayerEvent> {
        self.events_rx.clone()
    }

    /// Start the render thread.
    ///
    /// Blocks until the backend has been created on the new thread. A backend
    /// failure is returned and leaves the controller idle.
    pub fn play(&mut self) -> Result<(), PlayerError> {
        if self.state != PlayerState::Idle {
            return Err(PlayerError::AlreadyPlaying);
        }
        self.state = PlayerState::Initializing;
        self.stop.store(false, Ordering::Release);

        let (ready_tx, ready_rx) = flume::bounded(1);
        let render_loop = RenderLoopParts {
            display: self.display.clone(),
            refresh_interval: self.pipeline.refresh_interval(),
            idle_sleep: self.pipeline.idle_sleep(),
            source: self.source.clone(),
            stop: self.stop.clone(),
            events: self.events_tx.clone(),
        };
        let factory = self.factory.clone();
        let dispatch = self.dispatch.clone();

        let spawned = thread::Builder::new()
            .name("render".into())
            .spawn(move || {
                let _guard = tracing::dispatcher::set_default(&dispatch);
                let backend = match factory() {
                    Ok(backend) => backend,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                render_loop.into_loop(backend).run();
            });
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.state = PlayerState::Idle;
                return Err(PlayerError::Spawn(e));
            }
        };

        let ready = ready_rx.recv();
        match ready {
            Ok(Ok(())) => {
                self.render_thread = Some(handle);
                self.state = PlayerState::Running;
                info!("Playback started");
                Ok(())
            }
            Ok(Err(e)) => {
                join_render_thread(handle);
                self.stop.store(true, Ordering::Release);
                self.state = PlayerState::Idle;
                error!("Could not initialize display: {}", e);
                Err(PlayerError::Init(e))
            }
            Err(_) => {
                join_render_thread(handle);
                self.stop.store(true, Ordering::Release);
                self.state = PlayerState::Idle;
                Err(PlayerError::RenderThreadExited)
            }
        }
    }

    /// Stop the render thread and wait for it to exit.
    ///
    /// No backend call happens after this returns. Frames still queued are
    /// dropped without being displayed; their count is returned.
    pub fn stop(&mut self) -> usize {
        let Some(handle) = self.render_thread.take() else {
            return 0;
        };

        self.state = PlayerState::Stopping;
        self.stop.store(true, Ordering::Release);
        join_render_thread(handle);

        let discarded = self.source.discard_pending();
        self.state = PlayerState::Idle;
        info!(discarded, "Playback stopped");
        discarded
    }
}

impl<B> Drop for PlaybackController<B> {
    fn drop(&mut self) {
        if let Some(handle) = self.render_thread.take() {
            self.stop.store(true, Ordering::Release);
            join_render_thread(handle);
            self.source.discard_pending();
        }
    }
}

fn join_render_thread(handle: JoinHandle<()>) {
    if handle.join().is_err() {
        error!("Render thread panicked");
    }
}

/// Everything the render thread needs besides its backend
struct RenderLoopParts {
    display: DisplayConfig,
    refresh_interval: Duration,
    idle_sleep: Duration,
    source: Arc<dyn FrameSource>,
    stop: Arc<AtomicBool>,
    events: Sender<PlayerEvent>,
}

impl RenderLoopParts {
    fn into_loop<B: RenderBackend>(self, backend: B) -> RenderLoop<B> {
        RenderLoop {
            pipeline: DisplayPipeline::new(backend, self.display),
            refresh_interval: self.refresh_interval,
            idle_sleep: self.idle_sleep,
            source: self.source,
            stop: self.stop,
            events: self.events,
        }
    }
}

struct RenderLoop<B> {
    pipeline: DisplayPipeline<B>,
    refresh_interval: Duration,
    idle_sleep: Duration,
    source: Arc<dyn FrameSource>,
    stop: Arc<AtomicBool>,
    events: Sender<PlayerEvent>,
}

impl<B: RenderBackend> RenderLoop<B> {
    fn run(mut self) {
        info!("Render loop started");
        let mut refreshed = false;

        while !self.stopped() {
            if let Some(event) = self.pipeline.backend_mut().poll_event() {
                self.handle_event(event);
                refreshed = false;
                continue;
            }

            // Back off between refreshes that found no event
            if refreshed {
                thread::sleep(self.idle_sleep);
                if self.stopped() {
                    break;
                }
            }
            self.refresh();
            refreshed = true;
        }

        info!("Render loop exited");
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    fn handle_event(&mut self, event: BackendEvent) {
        match event {
            BackendEvent::Quit => {
                info!("Quit event received");
                let _ = self.events.send(PlayerEvent::QuitRequested);
            }
            BackendEvent::Resized { width, height } => {
                debug!("Window resized to {}x{}", width, height);
            }
            BackendEvent::Other => {}
        }
    }

    fn refresh(&mut self) {
        if let Err(e) = self.pipeline.ensure_surface() {
            error!("Could not set video mode: {}", e);
            return;
        }

        let Some(frame) = self.source.available_frame(self.refresh_interval) else {
            trace!("No frame available");
            return;
        };

        // A stop that arrived while waiting wins over the frame
        if self.stopped() {
            return;
        }

        let sequence = frame.meta().sequence;
        if let Err(e) = self.pipeline.render(frame) {
            warn!(sequence, "Render error: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::{FrameMetadata, PixelFormat};
    use crate::capture::Frame;
    use crate::display::testing::{MockBackend, MockState};
    use crate::pipeline::FrameQueue;
    use bytes::Bytes;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    /// Backing buffer that counts its releases
    struct Tracked {
        bytes: Vec<u8>,
        released: Arc<AtomicUsize>,
    }

    impl AsRef<[u8]> for Tracked {
        fn as_ref(&self) -> &[u8] {
            &self.bytes
        }
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn tracked_frame(sequence: u64, released: &Arc<AtomicUsize>) -> Frame {
        let owner = Tracked {
            bytes: vec![sequence as u8; PixelFormat::Yuv420p.packed_len(16, 16)],
            released: released.clone(),
        };
        let meta = FrameMetadata::new(sequence, 16, 16, PixelFormat::Yuv420p);
        Frame::packed(Bytes::from_owner(owner), meta, false).unwrap()
    }

    fn pipeline_config() -> PipelineConfig {
        PipelineConfig {
            refresh_interval_ms: 20,
            idle_sleep_ms: 1,
            ..PipelineConfig::default()
        }
    }

    fn controller(queue: &Arc<FrameQueue>, state: &MockState) -> PlaybackController<MockBackend> {
        let state = state.clone();
        PlaybackController::new(
            DisplayConfig::default(),
            pipeline_config(),
            queue.clone(),
            move || Ok(MockBackend::with_state(state.clone())),
        )
    }

    fn wait_for(condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_renders_frames_in_push_order() {
        let queue = Arc::new(FrameQueue::new());
        let state = MockState::default();
        let mut player = controller(&queue, &state);

        player.play().unwrap();
        assert_eq!(player.state(), PlayerState::Running);

        let released = Arc::new(AtomicUsize::new(0));
        for sequence in 0..5 {
            queue.push(tracked_frame(sequence, &released));
        }

        assert!(wait_for(|| state.lock().presents == 5));
        assert_eq!(player.stop(), 0);
        assert_eq!(player.state(), PlayerState::Idle);
        assert_eq!(released.load(Ordering::SeqCst), 5);

        let state = state.lock();
        assert!(state.surface_open);
        assert_eq!(state.textures_created.len(), 1);
        let order: Vec<u8> = state.uploads.iter().map(|planes| planes[0][0][0]).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_stop_drops_queued_frames_without_rendering() {
        let queue = Arc::new(FrameQueue::new());
        let state = MockState::default();
        let mut player = controller(&queue, &state);
        player.play().unwrap();

        let released = Arc::new(AtomicUsize::new(0));
        let pushed = 50;
        for sequence in 0..pushed {
            queue.push(tracked_frame(sequence, &released));
        }
        player.stop();

        let presents = state.lock().presents;
        assert!(queue.is_empty());
        assert_eq!(released.load(Ordering::SeqCst), pushed as usize);

        // Nothing reaches the screen once stop has returned
        queue.push(tracked_frame(pushed, &released));
        thread::sleep(Duration::from_millis(100));
        assert_eq!(state.lock().presents, presents);
    }

    #[test]
    fn test_init_failure_leaves_controller_idle() {
        let queue = Arc::new(FrameQueue::new());
        let mut player: PlaybackController<MockBackend> = PlaybackController::new(
            DisplayConfig::default(),
            pipeline_config(),
            queue,
            || Err(DisplayError::Context("no display".into())),
        );

        let err = player.play().unwrap_err();
        assert!(matches!(err, PlayerError::Init(DisplayError::Context(_))));
        assert_eq!(player.state(), PlayerState::Idle);
        assert_eq!(player.stop(), 0);
    }

    #[test]
    fn test_play_twice_is_rejected_and_restart_works() {
        let queue = Arc::new(FrameQueue::new());
        let state = MockState::default();
        let mut player = controller(&queue, &state);

        player.play().unwrap();
        assert!(matches!(player.play(), Err(PlayerError::AlreadyPlaying)));
        player.stop();

        player.play().unwrap();
        let released = Arc::new(AtomicUsize::new(0));
        queue.push(tracked_frame(0, &released));
        assert!(wait_for(|| state.lock().presents == 1));
        player.stop();
    }

    #[test]
    fn test_window_close_is_reported() {
        let queue = Arc::new(FrameQueue::new());
        let state = MockState::default();
        state.lock().events.push_back(BackendEvent::Quit);
        let mut player = controller(&queue, &state);
        let events = player.events();

        player.play().unwrap();
        assert_eq!(
            events.recv_timeout(Duration::from_secs(5)),
            Ok(PlayerEvent::QuitRequested)
        );
        player.stop();
    }

    #[test]
    fn test_surface_failure_is_retried() {
        let queue = Arc::new(FrameQueue::new());
        let state = MockState::default();
        state.lock().fail_surface = true;
        let mut player = controller(&queue, &state);

        player.play().unwrap();
        thread::sleep(Duration::from_millis(30));
        assert!(!state.lock().surface_open);

        state.lock().fail_surface = false;
        assert!(wait_for(|| state.lock().surface_open));
        player.stop();
    }

    #[test]
    fn test_render_errors_are_not_fatal() {
        let queue = Arc::new(FrameQueue::new());
        let state = MockState::default();
        state.lock().fail_uploads = true;
        let mut player = controller(&queue, &state);
        player.play().unwrap();

        let released = Arc::new(AtomicUsize::new(0));
        queue.push(tracked_frame(0, &released));
        assert!(wait_for(|| released.load(Ordering::SeqCst) == 1));
        assert_eq!(state.lock().presents, 0);

        state.lock().fail_uploads = false;
        queue.push(tracked_frame(1, &released));
        assert!(wait_for(|| state.lock().presents == 1));
        player.stop();
    }

    #[test]
    fn test_factory_panic_is_reported_as_exited() {
        let queue = Arc::new(FrameQueue::new());
        let mut player: PlaybackController<MockBackend> = PlaybackController::new(
            DisplayConfig::default(),
            pipeline_config(),
            queue,
            || panic!("backend factory exploded"),
        );

        assert!(matches!(player.play(), Err(PlayerError::RenderThreadExited)));
        assert_eq!(player.state(), PlayerState::Idle);
    }
}
