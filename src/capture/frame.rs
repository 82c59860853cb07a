use arrayvec::ArrayVec;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::FrameError;

/// Upper bound on planes a decoder may hand us
pub const MAX_PLANES: usize = 8;

/// Decoded frame with planar pixel data.
///
/// The frame exclusively owns its backing buffer. It moves from the producer
/// into the queue and on to the render thread, which drops it as soon as its
/// planes have been uploaded.
#[derive(Debug)]
pub struct Frame {
    data: Bytes,
    planes: ArrayVec<Plane, MAX_PLANES>,
    meta: FrameMetadata,

    /// Build time, for latency tracking
    timestamp: Instant,
}

/// Frame metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameMetadata {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub pts: i64,
    pub key_frame: bool,
    pub crop: Crop,
}

impl FrameMetadata {
    pub fn new(sequence: u64, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            sequence,
            width,
            height,
            format,
            pts: 0,
            key_frame: false,
            crop: Crop::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Crop {
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
}

/// Location of one plane inside the frame buffer.
///
/// `offset` points at row 0, the top displayed row. Row `r` starts at
/// `offset + r * stride`, so a negative stride stores the plane bottom-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plane {
    pub offset: usize,
    pub stride: isize,
}

impl Plane {
    pub const fn new(offset: usize, stride: isize) -> Self {
        Self { offset, stride }
    }
}

/// Planar pixel formats we understand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Yuv420p,
    Yuv422p,
    Yuv444p,
}

impl PixelFormat {
    pub const fn plane_count(self) -> usize {
        3
    }

    /// Horizontal and vertical subsampling shift of `plane`.
    pub const fn subsampling(self, plane: usize) -> (u32, u32) {
        if plane == 0 {
            return (0, 0);
        }
        match self {
            Self::Yuv420p => (1, 1),
            Self::Yuv422p => (1, 0),
            Self::Yuv444p => (0, 0),
        }
    }

    /// Bytes of visible pixels in one row of `plane`.
    pub const fn row_bytes(self, plane: usize, width: u32) -> usize {
        ceil_rshift(width, self.subsampling(plane).0)
    }

    /// Number of rows stored in `plane`.
    pub const fn plane_rows(self, plane: usize, height: u32) -> usize {
        ceil_rshift(height, self.subsampling(plane).1)
    }

    /// Size of a tightly packed frame in this format.
    pub const fn packed_len(self, width: u32, height: u32) -> usize {
        let mut len = 0;
        let mut plane = 0;
        while plane < self.plane_count() {
            len += self.row_bytes(plane, width) * self.plane_rows(plane, height);
            plane += 1;
        }
        len
    }
}

/// `value / 2^shift` rounded toward +inf
pub const fn ceil_rshift(value: u32, shift: u32) -> usize {
    ((value as u64 + (1u64 << shift) - 1) >> shift) as usize
}

/// Storage direction shared by the planes of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrideLayout {
    TopDown,
    BottomUp,
    Mixed,
}

/// One plane's rows in ascending memory order.
///
/// For a bottom-up plane the first row here is the plane's last displayed
/// row; walking forward with `pitch` reproduces the mirrored layout.
#[derive(Debug, Clone, Copy)]
pub struct PlaneRows<'a> {
    pub data: &'a [u8],
    pub pitch: usize,
    pub rows: usize,
    pub row_bytes: usize,
}

impl<'a> PlaneRows<'a> {
    /// Visible bytes of each row, padding stripped.
    pub fn lines(&self) -> impl Iterator<Item = &'a [u8]> {
        let data: &'a [u8] = self.data;
        let row_bytes = self.row_bytes;
        data.chunks(self.pitch)
            .take(self.rows)
            .map(move |row| &row[..row_bytes.min(row.len())])
    }
}

impl Frame {
    /// Wrap a decoded picture, checking that every plane the format needs
    /// lies inside `data`.
    ///
    /// Stride signs are not checked here, the display pipeline rejects
    /// frames that mix them.
    pub fn new(data: Bytes, meta: FrameMetadata, planes: &[Plane]) -> Result<Self, FrameError> {
        if meta.width == 0 || meta.height == 0 {
            return Err(FrameError::ZeroDimension);
        }
        if planes.len() > MAX_PLANES {
            return Err(FrameError::TooManyPlanes(planes.len()));
        }

        let format = meta.format;
        if planes.len() < format.plane_count() {
            return Err(FrameError::MissingPlanes {
                format,
                expected: format.plane_count(),
                found: planes.len(),
            });
        }

        for (index, plane) in planes.iter().take(format.plane_count()).enumerate() {
            let row_bytes = format.row_bytes(index, meta.width);
            let rows = format.plane_rows(index, meta.height);
            let pitch = plane.stride.unsigned_abs();
            if pitch < row_bytes {
                return Err(FrameError::StrideTooSmall {
                    plane: index,
                    stride: plane.stride,
                    min: row_bytes,
                });
            }

            let end = lowest_row(plane, rows)
                .zip(pitch.checked_mul(rows))
                .and_then(|(start, span)| start.checked_add(span));
            match end {
                Some(end) if end <= data.len() => {}
                _ => return Err(FrameError::PlaneOutOfBounds { plane: index }),
            }
        }

        Ok(Self {
            data,
            planes: planes.iter().copied().collect(),
            meta,
            timestamp: Instant::now(),
        })
    }

    /// Wrap a tightly packed frame (planes back to back, stride = row width).
    ///
    /// With `bottom_up` the same bytes are described with negative strides,
    /// each plane's row 0 being its last row in memory.
    pub fn packed(data: Bytes, meta: FrameMetadata, bottom_up: bool) -> Result<Self, FrameError> {
        let format = meta.format;
        let mut planes = ArrayVec::<Plane, MAX_PLANES>::new();
        let mut start = 0;
        for index in 0..format.plane_count() {
            let pitch = format.row_bytes(index, meta.width);
            let rows = format.plane_rows(index, meta.height);
            let plane = if bottom_up {
                Plane::new(start + pitch * rows.saturating_sub(1), -(pitch as isize))
            } else {
                Plane::new(start, pitch as isize)
            };
            planes.push(plane);
            start += pitch * rows;
        }
        Self::new(data, meta, &planes)
    }

    pub fn meta(&self) -> &FrameMetadata {
        &self.meta
    }

    pub fn width(&self) -> u32 {
        self.meta.width
    }

    pub fn height(&self) -> u32 {
        self.meta.height
    }

    pub fn format(&self) -> PixelFormat {
        self.meta.format
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// Direction the format's planes are stored in.
    pub fn stride_layout(&self) -> StrideLayout {
        let used = &self.planes[..self.meta.format.plane_count()];
        if used.iter().all(|p| p.stride > 0) {
            StrideLayout::TopDown
        } else if used.iter().all(|p| p.stride < 0) {
            StrideLayout::BottomUp
        } else {
            StrideLayout::Mixed
        }
    }

    /// Rows of plane `index` starting from its lowest address.
    pub fn plane_rows(&self, index: usize) -> Option<PlaneRows<'_>> {
        let format = self.meta.format;
        if index >= format.plane_count() {
            return None;
        }
        let plane = self.planes.get(index)?;
        let rows = format.plane_rows(index, self.meta.height);
        let pitch = plane.stride.unsigned_abs();
        let start = lowest_row(plane, rows)?;
        let data = self.data.get(start..start + pitch * rows)?;

        Some(PlaneRows {
            data,
            pitch,
            rows,
            row_bytes: format.row_bytes(index, self.meta.width),
        })
    }
}

/// Byte offset of the row with the lowest address.
fn lowest_row(plane: &Plane, rows: usize) -> Option<usize> {
    if plane.stride >= 0 {
        Some(plane.offset)
    } else {
        plane
            .stride
            .unsigned_abs()
            .checked_mul(rows.saturating_sub(1))
            .and_then(|back| plane.offset.checked_sub(back))
    }
}
