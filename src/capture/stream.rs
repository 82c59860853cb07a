//! Source addresses and the producer task feeding the frame queue

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::instrument::WithSubscriber;
use tracing::{error, info, instrument, Dispatch};

use crate::capture::frame::Frame;
use crate::capture::pattern::PatternGenerator;
use crate::capture::rawfile::RawFileReader;
use crate::capture::source::{QueueSink, RateStats, StreamEvents};
use crate::error::SourceError;
use crate::pipeline::FrameQueue;
use crate::SourceConfig;

const RATE_INTERVAL: Duration = Duration::from_secs(1);

/// Where frames come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceAddress {
    /// Synthetic moving gradient
    Pattern,
    /// Concatenated yuv420p frames
    RawFile(PathBuf),
}

impl FromStr for SourceAddress {
    type Err = SourceError;

    fn from_str(address: &str) -> Result<Self, Self::Err> {
        let address = address.trim();
        if address == "pattern" || address.starts_with("pattern://") {
            return Ok(Self::Pattern);
        }
        if let Some(path) = address.strip_prefix("file://") {
            if !path.is_empty() {
                return Ok(Self::RawFile(PathBuf::from(path)));
            }
        } else if !address.contains("://") && address.ends_with(".yuv") {
            return Ok(Self::RawFile(PathBuf::from(address)));
        }
        Err(SourceError::UnsupportedAddress(address.to_string()))
    }
}

impl fmt::Display for SourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pattern => write!(f, "pattern://"),
            Self::RawFile(path) => write!(f, "file://{}", path.display()),
        }
    }
}

enum Producer {
    Pattern(PatternGenerator),
    RawFile(RawFileReader),
}

impl Producer {
    async fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        match self {
            Self::Pattern(generator) => Ok(Some(generator.next_frame()?)),
            Self::RawFile(reader) => reader.next_frame().await,
        }
    }
}

/// An open source delivering frames into a [`FrameQueue`] from a tokio task.
///
/// Dropping the stream without [`close`](Self::close) still ends the task at
/// its next tick.
pub struct VideoStream {
    address: SourceAddress,
    queue: Arc<FrameQueue>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl VideoStream {
    /// Open `address` and start producing at `config.fps`.
    ///
    /// Must be called from within a tokio runtime. The producer task logs
    /// through `dispatch`.
    #[instrument(skip(config, queue, dispatch))]
    pub async fn open(
        address: &str,
        config: &SourceConfig,
        queue: Arc<FrameQueue>,
        dispatch: Dispatch,
    ) -> Result<Self, SourceError> {
        let address: SourceAddress = address.parse()?;
        let producer = match &address {
            SourceAddress::Pattern => Producer::Pattern(PatternGenerator::new(
                config.width,
                config.height,
                config.fps,
                config.bottom_up,
            )),
            SourceAddress::RawFile(path) => Producer::RawFile(
                RawFileReader::open(
                    path,
                    config.width,
                    config.height,
                    config.fps,
                    config.bottom_up,
                    config.looping,
                )
                .await?,
            ),
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let sink = QueueSink::new(queue.clone());
        let frame_interval = Duration::from_secs_f64(1.0 / config.fps.max(1) as f64);
        let task = tokio::spawn(
            produce(producer, sink, frame_interval, shutdown_rx).with_subscriber(dispatch),
        );

        info!(%address, fps = config.fps, "Stream opened");
        Ok(Self {
            address,
            queue,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn address(&self) -> &SourceAddress {
        &self.address
    }

    /// Queue the producer delivers into
    pub fn queue(&self) -> Arc<FrameQueue> {
        self.queue.clone()
    }

    /// Stop the producer and wait for it to finish. Idempotent.
    pub async fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Producer task failed: {}", e);
            }
            info!(address = %self.address, "Stream closed");
        }
    }
}

async fn produce<E: StreamEvents>(
    mut producer: Producer,
    events: E,
    frame_interval: Duration,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut frames = interval(frame_interval);
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut report = interval(RATE_INTERVAL);
    report.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately
    report.tick().await;

    let mut stats = RateStats::default();
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = report.tick() => events.on_rate(stats),
            _ = frames.tick() => match producer.next_frame().await {
                Ok(Some(frame)) => {
                    stats.total += 1;
                    stats.decoded += 1;
                    events.on_frame(frame);
                }
                Ok(None) => {
                    info!(frames = stats.total, "End of stream");
                    break;
                }
                Err(e) => {
                    stats.dropped += 1;
                    events.on_error(e.code(), &e.to_string());
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::FrameSource;

    #[test]
    fn test_parse_addresses() {
        assert_eq!("pattern".parse::<SourceAddress>().unwrap(), SourceAddress::Pattern);
        assert_eq!(
            "pattern://gradient".parse::<SourceAddress>().unwrap(),
            SourceAddress::Pattern
        );
        assert_eq!(
            "file:///tmp/clip.bin".parse::<SourceAddress>().unwrap(),
            SourceAddress::RawFile(PathBuf::from("/tmp/clip.bin"))
        );
        assert_eq!(
            "clips/foreman.yuv".parse::<SourceAddress>().unwrap(),
            SourceAddress::RawFile(PathBuf::from("clips/foreman.yuv"))
        );
    }

    #[test]
    fn test_network_addresses_rejected() {
        for address in [
            "udp://239.0.0.1:5000",
            "192.168.1.10:8554",
            "rtsp://cam/stream.yuv",
            "file://",
        ] {
            assert!(
                matches!(
                    address.parse::<SourceAddress>(),
                    Err(SourceError::UnsupportedAddress(_))
                ),
                "{address}"
            );
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pattern_frames_arrive_in_order() {
        let queue = Arc::new(FrameQueue::new());
        let config = SourceConfig {
            width: 16,
            height: 8,
            fps: 200,
            ..SourceConfig::default()
        };
        let mut stream = VideoStream::open("pattern", &config, queue.clone(), Dispatch::none())
            .await
            .unwrap();

        let mut sequences = Vec::new();
        while sequences.len() < 5 {
            let frame = queue
                .available_frame(Duration::from_secs(2))
                .expect("producer stalled");
            assert_eq!((frame.width(), frame.height()), (16, 8));
            sequences.push(frame.meta().sequence);
        }
        stream.close().await;

        assert_eq!(sequences, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_close_stops_producer() {
        let queue = Arc::new(FrameQueue::new());
        let mut stream =
            VideoStream::open("pattern", &SourceConfig::default(), queue.clone(), Dispatch::none())
                .await
                .unwrap();
        stream.close().await;
        stream.close().await;

        let produced = queue.stats().pushed;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(queue.stats().pushed, produced);
    }

    #[tokio::test]
    async fn test_open_rejects_network_source() {
        let result = VideoStream::open(
            "udp://0.0.0.0:1234",
            &SourceConfig::default(),
            Arc::new(FrameQueue::new()),
            Dispatch::none(),
        )
        .await;
        assert!(matches!(result, Err(SourceError::UnsupportedAddress(_))));
    }
}
