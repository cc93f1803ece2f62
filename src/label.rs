//! Fire / No-Fire seed labels.
//!
//! Labels at this stage are only a seed. A later labeling
//! pass re-splits the output tree; nothing here mutates
//! pairing results.
use std::{collections::HashMap, fmt, fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};
use serde_derive::*;

use crate::temperature::CelsiusStats;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Label {
    Fire,
    NoFire,
    Unlabeled,
}

impl Label {
    /// Top-level folder of the output root this label's
    /// pairs are placed under. Unlabeled pairs sit directly
    /// under the output root.
    pub fn root_dir(&self) -> Option<&'static str> {
        match self {
            Label::Fire => Some("Fire"),
            Label::NoFire => Some("No Fire"),
            Label::Unlabeled => None,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Label::Fire => "fire",
            Label::NoFire => "no-fire",
            Label::Unlabeled => "unlabeled",
        })
    }
}

/// Seed labels from a prior pass, keyed by sub-folder name
/// and pair index.
///
/// ```json
/// { "Plot 1": { "0": "fire", "7": "no-fire" } }
/// ```
#[derive(Deserialize, Default, Debug)]
#[serde(transparent)]
pub struct SeedLabels(HashMap<String, HashMap<usize, Label>>);

impl SeedLabels {
    pub fn from_json_path(path: &Path) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("opening seed labels {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parsing seed labels {}", path.display()))
    }

    pub fn get(&self, job: &str, index: usize) -> Option<Label> {
        self.0.get(job)?.get(&index).copied()
    }
}

/// Chooses the initial label of a pair: a seed label if one
/// was supplied, else the Celsius threshold heuristic if
/// configured, else [`Label::Unlabeled`].
#[derive(Default, Debug)]
pub struct Labeler {
    seeds: SeedLabels,
    fire_threshold: Option<f32>,
}

impl Labeler {
    pub fn new(seeds: SeedLabels, fire_threshold: Option<f32>) -> Self {
        Labeler {
            seeds,
            fire_threshold,
        }
    }

    pub fn label(&self, job: &str, index: usize, thermal: Option<&CelsiusStats>) -> Label {
        if let Some(label) = self.seeds.get(job, index) {
            return label;
        }
        match (self.fire_threshold, thermal) {
            (Some(threshold), Some(stats)) if stats.max >= threshold => Label::Fire,
            (Some(_), Some(_)) => Label::NoFire,
            _ => Label::Unlabeled,
        }
    }
}
