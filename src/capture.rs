//! Classified capture files and the ordering rule shared by
//! pairing and output indexing.
//!
//! Ordering never depends on directory traversal order: every
//! file gets an explicit [`SortKey`] via [`order`], built from
//! its capture timestamp (when the metadata carries one) and a
//! natural ordering of its file name where runs of digits
//! compare as integers (`img2` sorts before `img10`).

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{bail, Error, Result};
use chrono::NaiveDateTime;
use lazy_static::lazy_static;
use regex::Regex;
use serde_derive::*;

/// Supported drone payloads.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CameraModel {
    M30T,
    M2EA,
}

impl CameraModel {
    /// Infer the model from a folder name, if it mentions
    /// one (case-insensitive).
    pub fn from_folder_name(name: &str) -> Option<Self> {
        let name = name.to_uppercase();
        if name.contains("M2EA") {
            Some(CameraModel::M2EA)
        } else if name.contains("M30T") {
            Some(CameraModel::M30T)
        } else {
            None
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CameraModel::M30T => "M30T",
            CameraModel::M2EA => "M2EA",
        }
    }
}

impl fmt::Display for CameraModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CameraModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "M30T" => Ok(CameraModel::M30T),
            "M2EA" => Ok(CameraModel::M2EA),
            _ => bail!("unsupported camera model: {} (expected M30T or M2EA)", s),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Modality {
    Rgb,
    Thermal,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum Kind {
    Image,
    Video,
}

impl Kind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Kind::Image),
            "mp4" => Some(Kind::Video),
            _ => None,
        }
    }
}

/// Lens tag carried in the file name: `W` (wide, RGB) or
/// `T` (thermal).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Orientation {
    #[serde(rename = "W")]
    Wide,
    #[serde(rename = "T")]
    Thermal,
}

impl Orientation {
    pub fn modality(&self) -> Modality {
        match self {
            Orientation::Wide => Modality::Rgb,
            Orientation::Thermal => Modality::Thermal,
        }
    }

    pub fn for_modality(modality: Modality) -> Self {
        match modality {
            Modality::Rgb => Orientation::Wide,
            Modality::Thermal => Orientation::Thermal,
        }
    }
}

/// One classified file of a sub-folder.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct CaptureFile {
    pub path: PathBuf,
    pub modality: Modality,
    pub kind: Kind,
    pub camera: CameraModel,
    pub orientation: Orientation,
    pub timestamp: Option<NaiveDateTime>,
}

impl CaptureFile {
    pub fn file_name(&self) -> String {
        file_name_of(&self.path)
    }

    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn sort_key(&self) -> SortKey {
        order(self)
    }
}

pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Total order over capture files. Compares timestamps
/// first (files without one sort before timestamped files),
/// then the natural name, then the raw name.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct SortKey {
    timestamp: Option<NaiveDateTime>,
    name: Vec<NamePart>,
    raw: String,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum NamePart {
    // Leading zeros stripped; comparing (len, digits) is
    // integer comparison without overflow.
    Number { len: usize, digits: String },
    Text(String),
}

impl SortKey {
    pub fn for_name(name: &str) -> Self {
        Self::new(None, name)
    }

    pub fn new(timestamp: Option<NaiveDateTime>, name: &str) -> Self {
        lazy_static! {
            static ref PARTS: Regex = Regex::new(r"[0-9]+|[^0-9]+").unwrap();
        }

        let name_parts = PARTS
            .find_iter(name)
            .map(|m| {
                let part = m.as_str();
                if part.as_bytes()[0].is_ascii_digit() {
                    let digits = part.trim_start_matches('0').to_string();
                    NamePart::Number {
                        len: digits.len(),
                        digits,
                    }
                } else {
                    NamePart::Text(part.to_lowercase())
                }
            })
            .collect();

        SortKey {
            timestamp,
            name: name_parts,
            raw: name.to_string(),
        }
    }
}

/// The ordering rule: a pure function of the file's
/// timestamp and name.
pub fn order(file: &CaptureFile) -> SortKey {
    SortKey::new(file.timestamp, &file.file_name())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(names: &[&str]) -> Vec<String> {
        let mut names: Vec<_> = names.iter().map(|s| s.to_string()).collect();
        names.sort_by_key(|n| SortKey::for_name(n));
        names
    }

    #[test]
    fn numeric_runs_compare_as_integers() {
        assert_eq!(
            sorted(&["img2.jpg", "img10.jpg", "img1.jpg"]),
            vec!["img1.jpg", "img2.jpg", "img10.jpg"]
        );
        assert_eq!(
            sorted(&["frame10_T.jpg", "frame9_T.jpg"]),
            vec!["frame9_T.jpg", "frame10_T.jpg"]
        );
    }

    #[test]
    fn long_digit_runs_do_not_overflow() {
        assert_eq!(
            sorted(&[
                "DJI_202305011200000000000002_W.JPG",
                "DJI_202305011200000000000001_W.JPG",
            ]),
            vec![
                "DJI_202305011200000000000001_W.JPG",
                "DJI_202305011200000000000002_W.JPG",
            ]
        );
    }

    #[test]
    fn leading_zeros_tie_break_on_raw_name() {
        let a = SortKey::for_name("img007.jpg");
        let b = SortKey::for_name("img7.jpg");
        assert_ne!(a, b);
        assert_eq!(sorted(&["img7.jpg", "img007.jpg"]), sorted(&["img007.jpg", "img7.jpg"]));
    }

    #[test]
    fn timestamp_precedes_name() {
        let early = NaiveDateTime::parse_from_str("2023:05:01 12:00:00", "%Y:%m:%d %H:%M:%S").unwrap();
        let late = NaiveDateTime::parse_from_str("2023:05:01 12:00:05", "%Y:%m:%d %H:%M:%S").unwrap();
        assert!(SortKey::new(Some(early), "b.jpg") < SortKey::new(Some(late), "a.jpg"));
        assert!(SortKey::new(None, "z.jpg") < SortKey::new(Some(early), "a.jpg"));
    }

    #[test]
    fn camera_model_from_folder_name() {
        assert_eq!(CameraModel::from_folder_name("Burn1_m2ea_plot3"), Some(CameraModel::M2EA));
        assert_eq!(CameraModel::from_folder_name("M30T flight"), Some(CameraModel::M30T));
        assert_eq!(CameraModel::from_folder_name("Plot 4"), None);
        assert_eq!("m30t".parse::<CameraModel>().unwrap(), CameraModel::M30T);
        assert!("H20T".parse::<CameraModel>().is_err());
    }
}
