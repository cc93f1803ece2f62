//! Turn a sub-folder listing into classified capture files.
//!
//! Classification is a typed step: every path yields either a
//! [`CaptureFile`] or a [`ClassificationError`], which the job
//! records as a skip. The file naming convention is one
//! [`Classifier`]; [`FrameHeight`] classifies by pixel height
//! instead.
use std::{fmt, path::Path, str::FromStr};

use anyhow::{bail, Error, Result};
use rayon::prelude::*;
use serde_derive::*;

use crate::{
    capture::{file_name_of, CameraModel, CaptureFile, Kind, Modality, Orientation},
    error::ClassificationError,
    exif::capture_timestamp,
    manifest::{ManifestEntry, RunLog},
    video::VideoSource,
};

/// Frame height of thermal captures of both supported
/// payloads.
pub const THERMAL_FRAME_HEIGHT: u32 = 512;

/// Name tokens marking screen-capture or zoom-lens variants.
const DISCARD_TOKENS: &[(&str, &str)] = &[
    ("Z", "zoom-lens"),
    ("ZOOM", "zoom-lens"),
    ("S", "screen-capture"),
    ("SCREEN", "screen-capture"),
    ("SCREENSHOT", "screen-capture"),
];

pub trait Classifier: Sync {
    fn classify(&self, path: &Path, camera: CameraModel) -> Result<CaptureFile, ClassificationError>;
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ClassifierKind {
    Naming,
    FrameHeight,
}

impl Default for ClassifierKind {
    fn default() -> Self {
        ClassifierKind::Naming
    }
}

impl FromStr for ClassifierKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "naming" => Ok(ClassifierKind::Naming),
            "frame-height" => Ok(ClassifierKind::FrameHeight),
            _ => bail!("unknown classifier `{}` (expected naming or frame-height)", s),
        }
    }
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ClassifierKind::Naming => "naming",
            ClassifierKind::FrameHeight => "frame-height",
        })
    }
}

pub fn classifier_for<'a>(kind: ClassifierKind, video: &'a dyn VideoSource) -> Box<dyn Classifier + 'a> {
    match kind {
        ClassifierKind::Naming => Box::new(NamingConvention),
        ClassifierKind::FrameHeight => Box::new(FrameHeight { video }),
    }
}

/// Upper-cased alphanumeric runs of the file stem.
fn name_tokens(path: &Path) -> Vec<String> {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    stem.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_uppercase())
        .collect()
}

/// Placeholder, extension and discard-policy checks shared by
/// every classifier.
fn screen(path: &Path) -> Result<(Kind, Vec<String>), ClassificationError> {
    if file_name_of(path).starts_with('.') {
        return Err(ClassificationError::Placeholder);
    }
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    let kind = Kind::from_extension(&ext).ok_or(ClassificationError::UnsupportedExtension(ext))?;

    let tokens = name_tokens(path);
    for (token, variant) in DISCARD_TOKENS {
        if tokens.iter().any(|t| t == token) {
            return Err(ClassificationError::Discarded(*variant));
        }
    }
    Ok((kind, tokens))
}

fn timestamp(path: &Path, kind: Kind) -> Result<Option<chrono::NaiveDateTime>, ClassificationError> {
    match kind {
        Kind::Image => capture_timestamp(path).map_err(ClassificationError::Metadata),
        Kind::Video => Ok(None),
    }
}

/// Modality from a `W` or `T` token in the file name.
#[derive(Debug, Default, Clone, Copy)]
pub struct NamingConvention;

impl Classifier for NamingConvention {
    fn classify(&self, path: &Path, camera: CameraModel) -> Result<CaptureFile, ClassificationError> {
        let (kind, tokens) = screen(path)?;
        let wide = tokens.iter().any(|t| t == "W");
        let thermal = tokens.iter().any(|t| t == "T");
        let orientation = match (wide, thermal) {
            (true, false) => Orientation::Wide,
            (false, true) => Orientation::Thermal,
            (true, true) => return Err(ClassificationError::AmbiguousModality),
            (false, false) => return Err(ClassificationError::NoModalityToken),
        };

        Ok(CaptureFile {
            path: path.to_path_buf(),
            modality: orientation.modality(),
            kind,
            camera,
            orientation,
            timestamp: timestamp(path, kind)?,
        })
    }
}

/// Modality from pixel height: frames
/// [`THERMAL_FRAME_HEIGHT`] pixels high are thermal,
/// everything else is RGB.
pub struct FrameHeight<'a> {
    pub video: &'a dyn VideoSource,
}

impl Classifier for FrameHeight<'_> {
    fn classify(&self, path: &Path, camera: CameraModel) -> Result<CaptureFile, ClassificationError> {
        let (kind, _) = screen(path)?;
        let height = match kind {
            Kind::Image => image::image_dimensions(path)
                .map_err(|e| ClassificationError::Metadata(e.into()))?
                .1,
            Kind::Video => {
                self.video
                    .probe(path)
                    .map_err(ClassificationError::Metadata)?
                    .height
            }
        };
        let modality = if height == THERMAL_FRAME_HEIGHT {
            Modality::Thermal
        } else {
            Modality::Rgb
        };

        Ok(CaptureFile {
            path: path.to_path_buf(),
            modality,
            kind,
            camera,
            orientation: Orientation::for_modality(modality),
            timestamp: timestamp(path, kind)?,
        })
    }
}

/// M2EA thermal videos must have thermal frame height.
fn validate(file: &CaptureFile, video: &dyn VideoSource) -> Result<(), ClassificationError> {
    if file.camera != CameraModel::M2EA || file.kind != Kind::Video || file.modality != Modality::Thermal {
        return Ok(());
    }
    let info = video.probe(&file.path).map_err(ClassificationError::Metadata)?;
    if info.height != THERMAL_FRAME_HEIGHT {
        return Err(ClassificationError::FrameHeight {
            expected: THERMAL_FRAME_HEIGHT,
            found: info.height,
        });
    }
    Ok(())
}

/// Classify every path of one sub-folder. Rejected paths are
/// recorded as skips, in listing order.
pub fn classify_job(
    paths: &[impl AsRef<Path> + Sync],
    camera: CameraModel,
    classifier: &dyn Classifier,
    video: &dyn VideoSource,
    log: &RunLog,
) -> Vec<CaptureFile> {
    let results: Vec<_> = paths
        .par_iter()
        .map(|p| -> Result<CaptureFile, ClassificationError> {
            let file = classifier.classify(p.as_ref(), camera)?;
            validate(&file, video)?;
            Ok(file)
        })
        .collect();

    paths
        .iter()
        .zip(results)
        .filter_map(|(path, res)| match res {
            Ok(file) => Some(file),
            Err(e) => {
                log.record(ManifestEntry::skip(path.as_ref(), e.stage(), &e));
                None
            }
        })
        .collect()
}
