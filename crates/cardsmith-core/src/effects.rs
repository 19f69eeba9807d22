//! Pixel effects shared by the drawables: blur, color filters and coverage
//! dilation.
//!
//! All RGBA operations work on premultiplied data in place. The color
//! filters are linear, so they apply directly to premultiplied channels and
//! results are clamped to alpha.

use crate::layer::ImageFilter;
use tiny_skia::Pixmap;

/// Box-blur passes; three approximate a gaussian.
const BLUR_PASSES: usize = 3;

fn blur_line(src: &[u8], dst: &mut [u8], len: usize, stride: usize, offset: usize, radius: usize) {
    let window = (2 * radius + 1) as u32;
    let at = |i: usize| offset + i * stride;

    let mut sum: u32 = 0;
    for i in 0..=radius.min(len.saturating_sub(1)) {
        sum += src[at(i)] as u32;
    }
    for i in 0..len {
        dst[at(i)] = ((sum + window / 2) / window) as u8;
        let add = i + radius + 1;
        if add < len {
            sum += src[at(add)] as u32;
        }
        if i >= radius {
            sum -= src[at(i - radius)] as u32;
        }
    }
}

/// Blurs interleaved 8-bit data with `channels` channels per pixel.
/// Pixels outside the buffer count as zero.
pub fn box_blur(data: &mut [u8], width: usize, height: usize, channels: usize, radius: usize) {
    if radius == 0 || width == 0 || height == 0 || data.len() < width * height * channels {
        return;
    }
    let mut scratch = data.to_vec();
    for _ in 0..BLUR_PASSES {
        for y in 0..height {
            for c in 0..channels {
                blur_line(data, &mut scratch, width, channels, y * width * channels + c, radius);
            }
        }
        for x in 0..width {
            for c in 0..channels {
                blur_line(&scratch, data, height, width * channels, x * channels + c, radius);
            }
        }
    }
}

/// Gaussian-like blur of a premultiplied pixmap.
pub fn blur_pixmap(pixmap: &mut Pixmap, radius: f32) {
    let (w, h) = (pixmap.width() as usize, pixmap.height() as usize);
    box_blur(pixmap.data_mut(), w, h, 4, blur_radius_px(radius));
}

/// Converts a blur radius in pixels to the box radius used per pass.
pub fn blur_radius_px(radius: f32) -> usize {
    if !radius.is_finite() || radius <= 0.0 {
        return 0;
    }
    // Three passes of a box of radius r have a spread close to r * sqrt(3).
    (radius / 1.732).round().max(1.0) as usize
}

/// Grows coverage by `radius` pixels (square structuring element).
pub fn dilate(data: &mut [u8], width: usize, height: usize, radius: usize) {
    if radius == 0 || width == 0 || height == 0 || data.len() < width * height {
        return;
    }
    let mut scratch = vec![0u8; data.len()];
    for y in 0..height {
        for x in 0..width {
            let lo = x.saturating_sub(radius);
            let hi = (x + radius).min(width - 1);
            let row = &data[y * width + lo..=y * width + hi];
            scratch[y * width + x] = row.iter().copied().max().unwrap_or(0);
        }
    }
    for y in 0..height {
        for x in 0..width {
            let lo = y.saturating_sub(radius);
            let hi = (y + radius).min(height - 1);
            data[y * width + x] = (lo..=hi).map(|yy| scratch[yy * width + x]).max().unwrap_or(0);
        }
    }
}

fn map_rgb(pixmap: &mut Pixmap, f: impl Fn(f32, f32, f32, f32) -> [f32; 3]) {
    for px in pixmap.data_mut().chunks_exact_mut(4) {
        let a = px[3] as f32;
        if a == 0.0 {
            continue;
        }
        let out = f(px[0] as f32, px[1] as f32, px[2] as f32, a);
        for (dst, v) in px.iter_mut().zip(out) {
            *dst = v.round().clamp(0.0, a) as u8;
        }
    }
}

/// Applies a color filter in place. `blur_px` is only used by
/// [`ImageFilter::Blur`].
pub fn apply_filter(pixmap: &mut Pixmap, filter: ImageFilter, blur_px: f32) {
    match filter {
        ImageFilter::None => {}
        ImageFilter::Grayscale => map_rgb(pixmap, |r, g, b, _| {
            let l = 0.299 * r + 0.587 * g + 0.114 * b;
            [l, l, l]
        }),
        ImageFilter::Sepia => map_rgb(pixmap, |r, g, b, _| {
            [
                0.393 * r + 0.769 * g + 0.189 * b,
                0.349 * r + 0.686 * g + 0.168 * b,
                0.272 * r + 0.534 * g + 0.131 * b,
            ]
        }),
        ImageFilter::Invert => map_rgb(pixmap, |r, g, b, a| [a - r, a - g, a - b]),
        ImageFilter::Blur => blur_pixmap(pixmap, blur_px),
    }
}

/// Alpha channel of a pixmap as a coverage buffer.
pub fn alpha_of(pixmap: &Pixmap) -> Vec<u8> {
    pixmap.pixels().iter().map(|p| p.alpha()).collect()
}
