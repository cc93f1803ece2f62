//! Typed failures of the sorting stages.
//!
//! Each maps onto exactly one [`Stage`] of the run manifest.
use std::path::PathBuf;

use crate::{capture::CameraModel, manifest::Stage};

/// Why a file was left out of pairing.
#[derive(thiserror::Error, Debug)]
pub enum ClassificationError {
    #[error("placeholder file")]
    Placeholder,
    #[error("unsupported extension `{0}`")]
    UnsupportedExtension(String),
    #[error("no `W` or `T` token in file name")]
    NoModalityToken,
    #[error("both `W` and `T` tokens in file name")]
    AmbiguousModality,
    #[error("{0} variant discarded by policy")]
    Discarded(&'static str),
    #[error("unreadable metadata: {0:#}")]
    Metadata(anyhow::Error),
    #[error("frame height {found} does not match expected {expected}")]
    FrameHeight { expected: u32, found: u32 },
}

/// Camera-model preconditions that abort a whole sub-folder.
#[derive(thiserror::Error, Debug)]
pub enum PairingError {
    #[error("{model} sub-folder has more RGB images ({rgb}) than thermal images ({thermal})")]
    RgbExceedsThermal {
        model: CameraModel,
        rgb: usize,
        thermal: usize,
    },
}

/// Failure to produce Celsius values for one thermal frame.
#[derive(thiserror::Error, Debug)]
pub enum RegenError {
    #[error("no radiometric calibration data")]
    MissingCalibration,
    #[error("malformed calibration data: {0}")]
    MalformedCalibration(String),
    #[error("could not decode frame: {0:#}")]
    Decode(anyhow::Error),
}

/// Failure of a single output write.
#[derive(thiserror::Error, Debug)]
pub enum WriteError {
    #[error("output name collision: {}", .0.display())]
    Collision(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("{0:#}")]
    Encode(anyhow::Error),
}

impl ClassificationError {
    pub fn stage(&self) -> Stage {
        Stage::Classification
    }
}

impl PairingError {
    pub fn stage(&self) -> Stage {
        Stage::Pairing
    }
}

impl RegenError {
    pub fn stage(&self) -> Stage {
        Stage::ThermalRegeneration
    }
}

impl WriteError {
    pub fn stage(&self) -> Stage {
        Stage::Output
    }
}
