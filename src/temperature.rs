//! Celsius frames and their conversions.
//!
//! Two pinned conversions produce a [`ThermalFrame`]:
//!
//! 1. Radiometric raw counts (as stored in the APP3 segments
//!    of DJI R-JPEGs) are in units of 1/64 Kelvin:
//!    `C = raw / 64 - 273.15`.
//!
//! 2. Palette-rendered video frames carry no radiometry; their
//!    luma is mapped linearly onto a configured
//!    [`CelsiusRange`]: `C = min + luma / 255 * (max - min)`.
//!
//! The same input always yields bit-identical values, and
//! [`ThermalFrame::to_tiff`] is byte-for-byte reproducible.
use std::{fmt, io::Cursor, str::FromStr};

use anyhow::{anyhow, ensure, Error, Result};
use image::GrayImage;
use ndarray::Array2;
use serde_derive::*;
use tiff::encoder::{colortype, TiffEncoder};

const KELVIN_OFFSET: f32 = 273.15;
const RAW_COUNTS_PER_KELVIN: f32 = 64.;

/// A decoded thermal frame: one Celsius value per pixel,
/// `(rows, cols)` shaped.
#[derive(Debug, Clone, PartialEq)]
pub struct ThermalFrame {
    pub celsius: Array2<f32>,
}

/// Per-frame Celsius statistics, used for thresholding.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct CelsiusStats {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
}

/// Celsius span onto which palette-rendered frames are
/// mapped. Parses from `MIN:MAX`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct CelsiusRange {
    pub min: f32,
    pub max: f32,
}

impl CelsiusRange {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.min.is_finite() && self.max.is_finite() && self.min < self.max,
            "invalid Celsius range {}: min must be below max",
            self
        );
        Ok(())
    }
}

impl fmt::Display for CelsiusRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.min, self.max)
    }
}

impl FromStr for CelsiusRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (min, max) = s
            .split_once(':')
            .ok_or_else(|| anyhow!("expected MIN:MAX, got `{}`", s))?;
        let range = CelsiusRange {
            min: min.trim().parse()?,
            max: max.trim().parse()?,
        };
        range.validate()?;
        Ok(range)
    }
}

impl ThermalFrame {
    pub fn from_raw(raw: &Array2<u16>) -> Self {
        ThermalFrame {
            celsius: raw.mapv(|v| v as f32 / RAW_COUNTS_PER_KELVIN - KELVIN_OFFSET),
        }
    }

    pub fn from_luma(luma: &GrayImage, range: &CelsiusRange) -> Self {
        let (wid, ht) = luma.dimensions();
        let span = range.max - range.min;
        let celsius = Array2::from_shape_fn((ht as usize, wid as usize), |(row, col)| {
            let v = luma.get_pixel(col as u32, row as u32)[0];
            range.min + v as f32 / 255. * span
        });
        ThermalFrame { celsius }
    }

    /// `(width, height)`
    pub fn dimensions(&self) -> (u32, u32) {
        let (ht, wid) = self.celsius.dim();
        (wid as u32, ht as u32)
    }

    pub fn stats(&self) -> CelsiusStats {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        let mut sum = 0f64;
        for &v in self.celsius.iter() {
            min = min.min(v);
            max = max.max(v);
            sum += v as f64;
        }
        let count = self.celsius.len().max(1);
        CelsiusStats {
            min,
            max,
            mean: (sum / count as f64) as f32,
        }
    }

    /// Encode as a single-channel 32-bit float TIFF.
    pub fn to_tiff(&self) -> Result<Vec<u8>> {
        let (wid, ht) = self.dimensions();
        ensure!(wid > 0 && ht > 0, "empty thermal frame");

        let values: Vec<f32> = self.celsius.iter().copied().collect();
        let mut cursor = Cursor::new(Vec::with_capacity(4 * values.len() + 256));
        TiffEncoder::new(&mut cursor)?.write_image::<colortype::Gray32Float>(wid, ht, &values)?;
        Ok(cursor.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn raw_counts_are_sixty_fourths_of_a_kelvin() {
        let raw = array![[17481u16, 19200], [0, 64 * 300]];
        let frame = ThermalFrame::from_raw(&raw);
        assert!((frame.celsius[(0, 0)] - (17481. / 64. - 273.15)).abs() < 1e-4);
        assert!((frame.celsius[(0, 1)] - 26.85).abs() < 1e-3);
        assert!((frame.celsius[(1, 0)] + 273.15).abs() < 1e-4);
        assert_eq!(frame.dimensions(), (2, 2));
    }

    #[test]
    fn luma_maps_onto_range() {
        let luma = GrayImage::from_raw(3, 1, vec![0, 255, 51]).unwrap();
        let range: CelsiusRange = "-20:480".parse().unwrap();
        let frame = ThermalFrame::from_luma(&luma, &range);
        assert_eq!(frame.celsius.dim(), (1, 3));
        assert_eq!(frame.celsius[(0, 0)], -20.);
        assert_eq!(frame.celsius[(0, 1)], 480.);
        assert!((frame.celsius[(0, 2)] - 80.).abs() < 1e-3);
    }

    #[test]
    fn stats_cover_the_frame() {
        let frame = ThermalFrame {
            celsius: array![[10., 20.], [30., 40.]],
        };
        let stats = frame.stats();
        assert_eq!((stats.min, stats.max, stats.mean), (10., 40., 25.));
    }

    #[test]
    fn tiff_output_is_reproducible() -> Result<()> {
        let raw = Array2::from_shape_fn((8, 10), |(r, c)| (18000 + r * 40 + c) as u16);
        let a = ThermalFrame::from_raw(&raw).to_tiff()?;
        let b = ThermalFrame::from_raw(&raw).to_tiff()?;
        assert_eq!(a, b);
        assert!(a.len() > 8 * 10 * 4);
        Ok(())
    }

    #[test]
    fn rejects_inverted_range() {
        assert!("50:10".parse::<CelsiusRange>().is_err());
        assert!("50".parse::<CelsiusRange>().is_err());
    }
}
