/// Placement of the picture inside the window, in surface pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Letterbox a `frame_width` x `frame_height` picture inside the surface.
///
/// `aspect_ratio` is the sample aspect ratio; values <= 0 mean square
/// samples. Dimensions are rounded to even values and centered. The surface
/// is assumed to have square pixels.
pub fn compute_destination_rect(
    surface_width: u32,
    surface_height: u32,
    frame_width: u32,
    frame_height: u32,
    aspect_ratio: f32,
) -> DisplayRect {
    let aspect_ratio = if aspect_ratio <= 0.0 { 1.0 } else { aspect_ratio };
    let aspect_ratio = aspect_ratio * frame_width as f32 / frame_height.max(1) as f32;

    let surface_width = surface_width as i64;
    let surface_height = surface_height as i64;

    let mut height = surface_height;
    let mut width = even(height as f32 * aspect_ratio);
    if width > surface_width {
        width = surface_width;
        height = even(width as f32 / aspect_ratio);
    }

    let x = (surface_width - width) / 2;
    let y = (surface_height - height) / 2;

    DisplayRect {
        x: x as i32,
        y: y as i32,
        width: width.max(1) as u32,
        height: height.max(1) as u32,
    }
}

/// Round half to even, then clear the low bit.
fn even(value: f32) -> i64 {
    if !value.is_finite() {
        return 0;
    }
    (value.round_ties_even() as i64) & !1
}
