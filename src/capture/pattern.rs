//! Synthetic moving test pattern

use bytes::Bytes;

use crate::capture::frame::{Frame, FrameMetadata, PixelFormat};
use crate::error::FrameError;

/// Produces yuv420p frames of a diagonal luma ramp scrolling two pixels per
/// frame over horizontal/vertical chroma ramps.
pub struct PatternGenerator {
    width: u32,
    height: u32,
    fps: u32,
    bottom_up: bool,
    sequence: u64,
}

impl PatternGenerator {
    pub fn new(width: u32, height: u32, fps: u32, bottom_up: bool) -> Self {
        Self {
            width,
            height,
            fps: fps.max(1),
            bottom_up,
            sequence: 0,
        }
    }

    pub fn next_frame(&mut self) -> Result<Frame, FrameError> {
        if self.width == 0 || self.height == 0 {
            return Err(FrameError::ZeroDimension);
        }
        let format = PixelFormat::Yuv420p;
        let mut data = vec![0u8; format.packed_len(self.width, self.height)];
        let shift = (self.sequence as usize).wrapping_mul(2);

        let mut start = 0;
        for plane in 0..format.plane_count() {
            let row_bytes = format.row_bytes(plane, self.width);
            let rows = format.plane_rows(plane, self.height);
            let bytes = &mut data[start..start + row_bytes * rows];

            for (memory_row, line) in bytes.chunks_mut(row_bytes).enumerate() {
                // Bottom-up frames store their first row last
                let row = if self.bottom_up {
                    rows - 1 - memory_row
                } else {
                    memory_row
                };
                for (col, px) in line.iter_mut().enumerate() {
                    *px = match plane {
                        0 => (col + row + shift) as u8,
                        1 => (col * 255 / row_bytes.max(1)) as u8,
                        _ => (row * 255 / rows.max(1)) as u8,
                    };
                }
            }
            start += row_bytes * rows;
        }

        let mut meta = FrameMetadata::new(self.sequence, self.width, self.height, format);
        meta.pts = (self.sequence * 1000 / self.fps as u64) as i64;
        meta.key_frame = self.sequence % self.fps as u64 == 0;
        self.sequence += 1;

        Frame::packed(Bytes::from(data), meta, self.bottom_up)
    }
}
