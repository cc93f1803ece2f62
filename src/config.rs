//! Run configuration.
//!
//! A [`SortConfig`] can be loaded from JSON; every field is
//! optional and defaults to the values below. The binary
//! overlays its command-line flags on top.
use std::{fs, path::Path, path::PathBuf};

use anyhow::{bail, ensure, Context, Result};
use serde_derive::*;

use crate::{
    capture::CameraModel, classify::ClassifierKind, decode::DecoderKind, temperature::CelsiusRange,
};

/// Observed peak memory per processed pair.
pub const PEAK_MIB_PER_PAIR: u64 = 13;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct SortConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Camera model of sub-folders whose name does not
    /// mention one.
    pub camera: CameraModel,
    pub classifier: ClassifierKind,
    pub decoder: DecoderKind,
    pub rename: bool,
    /// Zero-padded index width; derived from the pair count
    /// when unset.
    pub index_digits: Option<usize>,
    /// Pairs with a lower index are not rewritten.
    pub resume_from: Option<usize>,
    /// Extract every n-th video frame as an image pair.
    pub frame_stride: Option<u32>,
    /// Celsius span of palette-rendered thermal video frames.
    pub video_range: Option<CelsiusRange>,
    pub fire_threshold: Option<f32>,
    /// Seed labels JSON.
    pub labels: Option<PathBuf>,
    pub jobs: Option<usize>,
    pub memory_budget_mib: Option<u64>,
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for SortConfig {
    fn default() -> Self {
        SortConfig {
            input: "./Input Folder".into(),
            output: "./Output Folder".into(),
            camera: CameraModel::M30T,
            classifier: ClassifierKind::default(),
            decoder: DecoderKind::default(),
            rename: true,
            index_digits: None,
            resume_from: None,
            frame_stride: None,
            video_range: None,
            fire_threshold: None,
            labels: None,
            jobs: None,
            memory_budget_mib: None,
            ffmpeg: "ffmpeg".into(),
            ffprobe: "ffprobe".into(),
        }
    }
}

impl SortConfig {
    pub fn from_json_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(stride) = self.frame_stride {
            ensure!(stride > 0, "frame stride must be positive");
            match &self.video_range {
                Some(range) => range.validate()?,
                None => bail!("frame extraction needs a video Celsius range"),
            }
        }
        if let Some(range) = &self.video_range {
            range.validate()?;
        }
        ensure!(self.index_digits != Some(0), "index digits must be positive");
        ensure!(self.jobs != Some(0), "worker count must be positive");
        ensure!(
            self.memory_budget_mib.map_or(true, |m| m > 0),
            "memory budget must be positive"
        );
        if let Some(t) = self.fire_threshold {
            ensure!(t.is_finite(), "fire threshold must be finite");
        }
        if self.decoder == DecoderKind::DjiSdk && cfg!(not(feature = "dji")) {
            bail!("the dji-sdk decoder requires the `dji` feature");
        }
        Ok(())
    }

    /// Size of the worker pool: the requested count (else the
    /// available parallelism), capped so the pool fits in the
    /// memory budget.
    pub fn worker_count(&self) -> usize {
        let requested = self.jobs.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });
        let cap = self
            .memory_budget_mib
            .map(|m| (m / PEAK_MIB_PER_PAIR).max(1) as usize)
            .unwrap_or(usize::MAX);
        requested.min(cap).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() -> Result<()> {
        let config: SortConfig = serde_json::from_str(
            r#"{ "input": "in", "camera": "M2EA", "frame-stride": 30, "video-range": { "min": 0, "max": 500 } }"#,
        )?;
        assert_eq!(config.input, PathBuf::from("in"));
        assert_eq!(config.camera, CameraModel::M2EA);
        assert_eq!(config.output, PathBuf::from("./Output Folder"));
        assert!(config.rename);
        config.validate()?;
        Ok(())
    }

    #[test]
    fn stride_needs_a_range() {
        let config = SortConfig {
            frame_stride: Some(10),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn workers_fit_the_memory_budget() {
        let config = SortConfig {
            jobs: Some(16),
            memory_budget_mib: Some(64),
            ..Default::default()
        };
        assert_eq!(config.worker_count(), 4);

        let config = SortConfig {
            jobs: Some(2),
            memory_budget_mib: Some(1),
            ..Default::default()
        };
        assert_eq!(config.worker_count(), 1);
    }
}
