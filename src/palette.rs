//! Color-mapped rendering of Celsius frames.
//!
//! The palette is a pinned ten-stop inferno ramp with linear
//! interpolation between stops. Each frame is normalised over
//! its own min..max range; a flat frame renders entirely in
//! the first stop.
use image::{Rgb, RgbImage};

use crate::temperature::ThermalFrame;

const INFERNO: [[u8; 3]; 10] = [
    [0x00, 0x00, 0x04],
    [0x1b, 0x0c, 0x42],
    [0x4b, 0x0c, 0x6b],
    [0x78, 0x1c, 0x6d],
    [0xa5, 0x2c, 0x60],
    [0xcf, 0x44, 0x46],
    [0xed, 0x69, 0x25],
    [0xfb, 0x9a, 0x06],
    [0xf7, 0xd0, 0x3c],
    [0xfc, 0xff, 0xa4],
];

/// Palette color at `t` in `[0, 1]` (clamped).
pub fn sample(t: f32) -> Rgb<u8> {
    let t = if t.is_nan() { 0. } else { t.clamp(0., 1.) };
    let pos = t * (INFERNO.len() - 1) as f32;
    let lo = (pos.floor() as usize).min(INFERNO.len() - 2);
    let frac = pos - lo as f32;

    let (a, b) = (INFERNO[lo], INFERNO[lo + 1]);
    let mut out = [0u8; 3];
    for ch in 0..3 {
        let v = a[ch] as f32 + (b[ch] as f32 - a[ch] as f32) * frac;
        out[ch] = v.round() as u8;
    }
    Rgb(out)
}

/// Render a frame at its native resolution.
pub fn render(frame: &ThermalFrame) -> RgbImage {
    let stats = frame.stats();
    let span = stats.max - stats.min;
    let (wid, ht) = frame.dimensions();

    RgbImage::from_fn(wid, ht, |x, y| {
        let v = frame.celsius[(y as usize, x as usize)];
        if span > 0. {
            sample((v - stats.min) / span)
        } else {
            sample(0.)
        }
    })
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn endpoints_hit_first_and_last_stop() {
        assert_eq!(sample(0.), Rgb([0x00, 0x00, 0x04]));
        assert_eq!(sample(1.), Rgb([0xfc, 0xff, 0xa4]));
        assert_eq!(sample(-3.), sample(0.));
        assert_eq!(sample(7.), sample(1.));
        assert_eq!(sample(f32::NAN), sample(0.));
    }

    #[test]
    fn ramp_brightens_monotonically() {
        let luma = |c: Rgb<u8>| c[0] as u32 * 299 + c[1] as u32 * 587 + c[2] as u32 * 114;
        let lumas: Vec<_> = (0..=20).map(|i| luma(sample(i as f32 / 20.))).collect();
        assert!(lumas.windows(2).all(|w| w[0] <= w[1]), "{:?}", lumas);
    }

    #[test]
    fn render_spans_frame_range() {
        let frame = ThermalFrame {
            celsius: array![[20., 25.], [30., 420.]],
        };
        let img = render(&frame);
        assert_eq!(img.dimensions(), (2, 2));
        assert_eq!(*img.get_pixel(0, 0), sample(0.));
        assert_eq!(*img.get_pixel(1, 1), sample(1.));
    }

    #[test]
    fn flat_frame_renders_first_stop() {
        let frame = ThermalFrame {
            celsius: array![[21.5, 21.5, 21.5]],
        };
        assert!(render(&frame).pixels().all(|p| *p == sample(0.)));
    }
}
