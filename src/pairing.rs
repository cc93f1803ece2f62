//! Match RGB captures to thermal captures within one
//! sub-folder.
//!
//! Each modality is sorted with [`order`] and the two
//! sequences are zipped positionally: the k-th RGB image goes
//! with the k-th thermal image, and surplus files on either
//! side become single-sided pairs. Videos are matched the same
//! way, separately from images.
use std::fmt;

use itertools::{EitherOrBoth, Itertools};
use serde_derive::*;

use crate::{
    capture::{order, CameraModel, CaptureFile, Kind, Modality},
    error::PairingError,
    label::Label,
};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum PairStatus {
    Complete,
    RgbOnly,
    ThermalOnly,
}

impl fmt::Display for PairStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PairStatus::Complete => "complete",
            PairStatus::RgbOnly => "rgb-only",
            PairStatus::ThermalOnly => "thermal-only",
        })
    }
}

/// The unit of work downstream of pairing.
///
/// Both sides always come from the same sub-folder and camera
/// model. `frame` is set for pairs expanded from a video
/// pair, and names the frame number within the source videos.
#[derive(Clone, Debug, PartialEq)]
pub struct Pair {
    pub job: String,
    pub camera: CameraModel,
    pub kind: Kind,
    pub rgb: Option<CaptureFile>,
    pub thermal: Option<CaptureFile>,
    pub frame: Option<usize>,
    pub index: usize,
    pub label: Label,
}

impl Pair {
    fn from_sides(job: &str, camera: CameraModel, kind: Kind, sides: EitherOrBoth<CaptureFile, CaptureFile>) -> Self {
        let (rgb, thermal) = match sides {
            EitherOrBoth::Both(rgb, thermal) => (Some(rgb), Some(thermal)),
            EitherOrBoth::Left(rgb) => (Some(rgb), None),
            EitherOrBoth::Right(thermal) => (None, Some(thermal)),
        };
        Pair {
            job: job.to_string(),
            camera,
            kind,
            rgb,
            thermal,
            frame: None,
            index: 0,
            label: Label::Unlabeled,
        }
    }

    /// A frame-level pair expanded from a video pair.
    pub fn frame_of(&self, frame: usize, has_rgb: bool, has_thermal: bool, index: usize) -> Self {
        Pair {
            job: self.job.clone(),
            camera: self.camera,
            kind: Kind::Image,
            rgb: self.rgb.clone().filter(|_| has_rgb),
            thermal: self.thermal.clone().filter(|_| has_thermal),
            frame: Some(frame),
            index,
            label: Label::Unlabeled,
        }
    }

    pub fn status(&self) -> PairStatus {
        match (&self.rgb, &self.thermal) {
            (Some(_), Some(_)) => PairStatus::Complete,
            (Some(_), None) => PairStatus::RgbOnly,
            _ => PairStatus::ThermalOnly,
        }
    }

    /// Source files of this pair.
    pub fn sources(&self) -> impl Iterator<Item = &CaptureFile> {
        self.rgb.iter().chain(self.thermal.iter())
    }
}

/// Pairs of one sub-folder, images and videos kept apart.
#[derive(Debug, Default)]
pub struct JobPairs {
    pub images: Vec<Pair>,
    pub videos: Vec<Pair>,
}

impl JobPairs {
    pub fn len(&self) -> usize {
        self.images.len() + self.videos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn sorted(files: &[CaptureFile], kind: Kind, modality: Modality) -> Vec<CaptureFile> {
    let mut files: Vec<_> = files
        .iter()
        .filter(|f| f.kind == kind && f.modality == modality)
        .cloned()
        .collect();
    files.sort_by_cached_key(order);
    files
}

fn zip_sides(job: &str, camera: CameraModel, kind: Kind, rgb: Vec<CaptureFile>, thermal: Vec<CaptureFile>) -> Vec<Pair> {
    rgb.into_iter()
        .zip_longest(thermal)
        .map(|sides| Pair::from_sides(job, camera, kind, sides))
        .collect()
}

/// Pair all classified files of one sub-folder.
///
/// Fails without producing any pair if the camera model's
/// precondition does not hold: an M2EA sub-folder may not
/// hold more RGB images than thermal images.
pub fn pair_job(job: &str, camera: CameraModel, files: &[CaptureFile]) -> Result<JobPairs, PairingError> {
    let rgb_images = sorted(files, Kind::Image, Modality::Rgb);
    let thermal_images = sorted(files, Kind::Image, Modality::Thermal);

    if camera == CameraModel::M2EA && rgb_images.len() > thermal_images.len() {
        return Err(PairingError::RgbExceedsThermal {
            model: camera,
            rgb: rgb_images.len(),
            thermal: thermal_images.len(),
        });
    }

    let rgb_videos = sorted(files, Kind::Video, Modality::Rgb);
    let thermal_videos = sorted(files, Kind::Video, Modality::Thermal);

    Ok(JobPairs {
        images: zip_sides(job, camera, Kind::Image, rgb_images, thermal_images),
        videos: zip_sides(job, camera, Kind::Video, rgb_videos, thermal_videos),
    })
}
