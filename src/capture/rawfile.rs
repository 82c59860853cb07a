//! Raw yuv420p file reader

use std::io;
use std::path::{Path, PathBuf};

use bytes::BytesMut;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info};

use crate::capture::frame::{Frame, FrameMetadata, PixelFormat};
use crate::error::SourceError;

/// Reads concatenated, tightly packed yuv420p frames of a fixed size.
pub struct RawFileReader {
    path: PathBuf,
    file: File,
    width: u32,
    height: u32,
    fps: u32,
    bottom_up: bool,
    looping: bool,
    sequence: u64,
}

impl RawFileReader {
    pub async fn open(
        path: &Path,
        width: u32,
        height: u32,
        fps: u32,
        bottom_up: bool,
        looping: bool,
    ) -> Result<Self, SourceError> {
        let file = File::open(path).await?;
        info!(path = %path.display(), width, height, "Opened raw yuv420p file");

        Ok(Self {
            path: path.to_path_buf(),
            file,
            width,
            height,
            fps: fps.max(1),
            bottom_up,
            looping,
            sequence: 0,
        })
    }

    fn frame_len(&self) -> usize {
        PixelFormat::Yuv420p.packed_len(self.width, self.height)
    }

    /// Next frame, or `None` at end of file when not looping.
    /// A trailing partial frame counts as end of file.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let mut buf = BytesMut::zeroed(self.frame_len());

        match self.file.read_exact(&mut buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                if !self.looping {
                    info!(path = %self.path.display(), frames = self.sequence, "End of file");
                    return Ok(None);
                }
                debug!(path = %self.path.display(), "Rewinding");
                self.file.rewind().await?;
                if let Err(e) = self.file.read_exact(&mut buf).await {
                    // Not even one whole frame in the file
                    return Err(if e.kind() == io::ErrorKind::UnexpectedEof {
                        SourceError::Io(io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("{} holds no complete frame", self.path.display()),
                        ))
                    } else {
                        e.into()
                    });
                }
            }
            Err(e) => return Err(e.into()),
        }

        let mut meta =
            FrameMetadata::new(self.sequence, self.width, self.height, PixelFormat::Yuv420p);
        meta.pts = (self.sequence * 1000 / self.fps as u64) as i64;
        meta.key_frame = true;
        self.sequence += 1;

        Ok(Some(Frame::packed(buf.freeze(), meta, self.bottom_up)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_clip(name: &str, frames: u8) -> PathBuf {
        let path = std::env::temp_dir()
            .join(format!("streamview-{}-{}.yuv", name, std::process::id()));
        // 4x2 yuv420p frames are 8 + 2 + 2 bytes, filled with their index
        let data: Vec<u8> = (0..frames).flat_map(|i| std::iter::repeat(i).take(12)).collect();
        std::fs::write(&path, data).unwrap();
        path
    }

    #[tokio::test]
    async fn test_reads_frames_until_end() {
        let path = write_clip("once", 2);
        let mut reader = RawFileReader::open(&path, 4, 2, 30, false, false).await.unwrap();

        let first = reader.next_frame().await.unwrap().unwrap();
        let second = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(first.data()[0], 0);
        assert_eq!(second.data()[0], 1);
        assert_eq!(second.meta().sequence, 1);
        assert!(reader.next_frame().await.unwrap().is_none());

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_loops_at_end() {
        let path = write_clip("loop", 2);
        let mut reader = RawFileReader::open(&path, 4, 2, 30, false, true).await.unwrap();

        let firsts: Vec<u8> = {
            let mut out = Vec::new();
            for _ in 0..5 {
                out.push(reader.next_frame().await.unwrap().unwrap().data()[0]);
            }
            out
        };
        assert_eq!(firsts, vec![0, 1, 0, 1, 0]);

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_short_file_is_an_error() {
        let path = write_clip("short", 0);
        let mut reader = RawFileReader::open(&path, 4, 2, 30, false, true).await.unwrap();
        assert!(reader.next_frame().await.is_err());

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_missing_file() {
        let path = std::env::temp_dir().join("streamview-missing.yuv");
        assert!(matches!(
            RawFileReader::open(&path, 4, 2, 30, false, true).await,
            Err(SourceError::Io(_))
        ));
    }
}
