//! Frame brightness reduction

use contracts::CameraFrame;

/// Default sampling step, in pixels, along both axes
pub const DEFAULT_SAMPLE_STRIDE: usize = 8;

/// Mean brightness (0-1) of a frame's luma plane
#[inline]
pub fn luma_brightness(frame: &CameraFrame) -> f32 {
    strided_mean(
        &frame.luma,
        frame.width as usize,
        frame.height as usize,
        frame.row_stride,
        DEFAULT_SAMPLE_STRIDE,
    )
}

/// Mean of every `stride`-th luma byte on every `stride`-th row, scaled to 0-1
///
/// Rows that would run past the end of `luma` are ignored; an empty plane is black.
pub fn strided_mean(
    luma: &[u8],
    width: usize,
    height: usize,
    row_stride: usize,
    stride: usize,
) -> f32 {
    let stride = stride.max(1);
    let row_stride = row_stride.max(width);

    let mut sum: u64 = 0;
    let mut count: u64 = 0;

    for y in (0..height).step_by(stride) {
        let start = y * row_stride;
        let Some(row) = luma.get(start..start + width) else {
            break;
        };
        for &value in row.iter().step_by(stride) {
            sum += u64::from(value);
            count += 1;
        }
    }

    if count == 0 {
        return 0.0;
    }
    (sum as f64 / count as f64 / 255.0) as f32
}
