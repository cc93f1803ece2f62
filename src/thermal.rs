//! Thermal regeneration: from a decoded frame to the Celsius
//! TIFF and palette JPEG artifacts.
use std::path::Path;

use anyhow::{Context, Result};
use image::{codecs::jpeg::JpegEncoder, RgbImage};

use crate::{
    exif::with_exif_of,
    palette::render,
    temperature::{CelsiusStats, ThermalFrame},
};

const JPEG_QUALITY: u8 = 95;

/// Encoded outputs of one thermal frame.
#[derive(Debug)]
pub struct ThermalArtifacts {
    pub stats: CelsiusStats,
    pub tiff: Vec<u8>,
    pub jpeg: Vec<u8>,
}

pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .encode_image(image)
        .context("encoding jpeg")?;
    Ok(out)
}

/// Regenerate the artifacts of `frame`. The frame is consumed
/// and its buffers released before returning; only encoded
/// bytes survive. The palette JPEG carries the EXIF block of
/// `exif_source` when given.
pub fn regenerate(frame: ThermalFrame, exif_source: Option<&Path>) -> Result<ThermalArtifacts> {
    let stats = frame.stats();
    let tiff = frame.to_tiff()?;
    let rendered = render(&frame);
    drop(frame);

    let mut jpeg = encode_jpeg(&rendered)?;
    if let Some(source) = exif_source {
        jpeg = with_exif_of(jpeg, source)?;
    }
    Ok(ThermalArtifacts { stats, tiff, jpeg })
}

#[cfg(test)]
mod tests {
    use ndarray::Array2;

    use super::*;

    #[test]
    fn artifacts_are_reproducible() -> Result<()> {
        let raw = Array2::from_shape_fn((16, 20), |(r, c)| (18000 + 25 * r + 3 * c) as u16);
        let a = regenerate(ThermalFrame::from_raw(&raw), None)?;
        let b = regenerate(ThermalFrame::from_raw(&raw), None)?;
        assert_eq!(a.tiff, b.tiff);
        assert_eq!(a.jpeg, b.jpeg);
        assert_eq!(a.stats, b.stats);

        let img = image::load_from_memory(&a.jpeg)?;
        assert_eq!((img.width(), img.height()), (20, 16));
        Ok(())
    }
}
