//! Decoding thermal sources into Celsius frames.
//!
//! The default decoder is pure Rust and reads the radiometric
//! payload DJI stores in the APP3 segments of its R-JPEGs. With
//! the `dji` feature, [`DjiSdkDecoder`](crate::dji::DjiSdkDecoder)
//! delegates to the vendor SDK instead.
use std::{fmt, fs::read, io::Cursor, path::Path, str::FromStr};

use anyhow::{anyhow, bail, Error, Result};
use byteordered::ByteOrdered;
use image::ImageReader;
use img_parts::{
    jpeg::{markers, Jpeg},
    Bytes,
};
use ndarray::Array2;
use serde_derive::*;

use crate::{error::RegenError, temperature::ThermalFrame};

/// Turns a thermal image file into a Celsius frame.
pub trait ThermalDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<ThermalFrame, RegenError>;
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DecoderKind {
    RawSegment,
    DjiSdk,
}

impl Default for DecoderKind {
    fn default() -> Self {
        DecoderKind::RawSegment
    }
}

impl FromStr for DecoderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "raw-segment" => Ok(DecoderKind::RawSegment),
            "dji-sdk" => Ok(DecoderKind::DjiSdk),
            _ => bail!("unknown thermal decoder `{}` (expected raw-segment or dji-sdk)", s),
        }
    }
}

impl fmt::Display for DecoderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DecoderKind::RawSegment => "raw-segment",
            DecoderKind::DjiSdk => "dji-sdk",
        })
    }
}

/// Build the decoder selected by `kind`.
pub fn decoder_for(kind: DecoderKind) -> Result<Box<dyn ThermalDecoder>> {
    match kind {
        DecoderKind::RawSegment => Ok(Box::new(RawSegmentDecoder)),
        #[cfg(feature = "dji")]
        DecoderKind::DjiSdk => Ok(Box::new(crate::dji::DjiSdkDecoder)),
        #[cfg(not(feature = "dji"))]
        DecoderKind::DjiSdk => bail!("the dji-sdk decoder requires the `dji` feature"),
    }
}

/// Reads the little-endian `u16` raster concatenated across
/// APP3 segments. The raster has the JPEG's own dimensions.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawSegmentDecoder;

impl RawSegmentDecoder {
    pub fn decode_bytes(&self, bytes: Vec<u8>) -> Result<ThermalFrame, RegenError> {
        let (wid, ht) = ImageReader::new(Cursor::new(&bytes))
            .with_guessed_format()
            .map_err(|e| RegenError::Decode(e.into()))?
            .into_dimensions()
            .map_err(|e| RegenError::Decode(e.into()))?;

        let jpeg = Jpeg::from_bytes(Bytes::from(bytes))
            .map_err(|e| RegenError::Decode(anyhow!("could not parse jpeg: {}", e)))?;

        let mut payload = Vec::new();
        for segment in jpeg.segments_by_marker(markers::APP3) {
            payload.extend_from_slice(segment.contents());
        }
        if payload.is_empty() {
            return Err(RegenError::MissingCalibration);
        }

        let expected = 2 * wid as usize * ht as usize;
        if payload.len() != expected {
            return Err(RegenError::MalformedCalibration(format!(
                "{} raw bytes for a {}x{} frame (expected {})",
                payload.len(),
                wid,
                ht,
                expected
            )));
        }

        let raw = raw_raster(&payload, wid as usize, ht as usize)
            .map_err(|e| RegenError::MalformedCalibration(format!("{:#}", e)))?;
        Ok(ThermalFrame::from_raw(&raw))
    }
}

fn raw_raster(payload: &[u8], wid: usize, ht: usize) -> Result<Array2<u16>> {
    let mut rdr = ByteOrdered::le(payload);
    let values = (0..wid * ht)
        .map(|_| rdr.read_u16())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Array2::from_shape_vec((ht, wid), values)?)
}

impl ThermalDecoder for RawSegmentDecoder {
    fn decode(&self, path: &Path) -> Result<ThermalFrame, RegenError> {
        let bytes = read(path).map_err(|e| RegenError::Decode(e.into()))?;
        self.decode_bytes(bytes)
    }
}
