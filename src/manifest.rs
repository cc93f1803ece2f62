//! The run manifest and its log sink.
//!
//! [`RunLog`] is the single writer every stage reports to.
//! Entries are appended under one lock, written as one
//! plain-text line each (flushed immediately), echoed to the
//! console through `log`, and kept in order so the whole
//! manifest can be persisted as JSON at the end of the run.
use std::{
    fmt,
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use anyhow::{Context, Result};
use serde_derive::*;

use crate::{label::Label, pairing::PairStatus};

/// Plain-text log file name inside the output root.
pub const LOG_FILE_NAME: &str = "sorting-log.txt";
/// JSON manifest file name inside the output root.
pub const MANIFEST_FILE_NAME: &str = "sorting-manifest.json";

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Classification,
    Pairing,
    ThermalRegeneration,
    GeometricCorrection,
    Output,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Classification => "classification",
            Stage::Pairing => "pairing",
            Stage::ThermalRegeneration => "thermal-regeneration",
            Stage::GeometricCorrection => "geometric-correction",
            Stage::Output => "output",
        })
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ManifestEntry {
    /// A pairing decision.
    Pair {
        job: String,
        index: usize,
        status: PairStatus,
        rgb: Option<PathBuf>,
        thermal: Option<PathBuf>,
    },
    /// One source (or regenerated artifact of a source)
    /// written under its output name.
    Rename {
        from: PathBuf,
        to: PathBuf,
        label: Label,
    },
    /// A non-fatal exclusion: a file or frame left out.
    Skip {
        paths: Vec<PathBuf>,
        stage: Stage,
        reason: String,
    },
    /// A failure fatal to a sub-folder or a single write.
    Fail {
        job: String,
        paths: Vec<PathBuf>,
        stage: Stage,
        reason: String,
    },
    Warn {
        path: PathBuf,
        stage: Stage,
        message: String,
    },
}

impl ManifestEntry {
    pub fn skip(path: &Path, stage: Stage, reason: impl fmt::Display) -> Self {
        ManifestEntry::Skip {
            paths: vec![path.to_path_buf()],
            stage,
            reason: reason.to_string(),
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, ManifestEntry::Skip { .. })
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, ManifestEntry::Fail { .. })
    }
}

fn display_opt(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "-".into())
}

fn display_all(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for ManifestEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestEntry::Pair {
                job,
                index,
                status,
                rgb,
                thermal,
            } => write!(
                f,
                "pair {} #{} [{}]: rgb={} thermal={}",
                job,
                index,
                status,
                display_opt(rgb),
                display_opt(thermal)
            ),
            ManifestEntry::Rename { from, to, label } => write!(
                f,
                "rename {} -> {} ({})",
                from.display(),
                to.display(),
                label
            ),
            ManifestEntry::Skip {
                paths,
                stage,
                reason,
            } => write!(f, "skip [{}] {}: {}", stage, display_all(paths), reason),
            ManifestEntry::Fail {
                job,
                paths,
                stage,
                reason,
            } => write!(
                f,
                "fail [{}] {} ({}): {}",
                stage,
                job,
                display_all(paths),
                reason
            ),
            ManifestEntry::Warn {
                path,
                stage,
                message,
            } => write!(f, "warn [{}] {}: {}", stage, path.display(), message),
        }
    }
}

struct Inner {
    sink: Option<BufWriter<File>>,
    entries: Vec<ManifestEntry>,
}

/// Append-only, thread-safe run log.
pub struct RunLog {
    inner: Mutex<Inner>,
}

impl RunLog {
    /// Log that keeps entries in memory only.
    pub fn in_memory() -> Self {
        RunLog {
            inner: Mutex::new(Inner {
                sink: None,
                entries: vec![],
            }),
        }
    }

    /// Log that also appends every line to `path`.
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening log file {}", path.display()))?;
        Ok(RunLog {
            inner: Mutex::new(Inner {
                sink: Some(BufWriter::new(file)),
                entries: vec![],
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record(&self, entry: ManifestEntry) {
        let line = entry.to_string();
        match &entry {
            ManifestEntry::Skip { .. } | ManifestEntry::Warn { .. } => log::warn!("{}", line),
            ManifestEntry::Fail { .. } => log::error!("{}", line),
            _ => log::debug!("{}", line),
        }

        let mut inner = self.lock();
        if let Some(sink) = inner.sink.as_mut() {
            if let Err(e) = writeln!(sink, "{}", line).and_then(|_| sink.flush()) {
                log::error!("could not write log line: {}", e);
            }
        }
        inner.entries.push(entry);
    }

    /// Snapshot of all entries, in write order.
    pub fn entries(&self) -> Vec<ManifestEntry> {
        self.lock().entries.clone()
    }

    pub fn count(&self, pred: impl Fn(&ManifestEntry) -> bool) -> usize {
        self.lock().entries.iter().filter(|e| pred(e)).count()
    }

    pub fn persist_manifest(&self, path: &Path) -> Result<()> {
        let inner = self.lock();
        let writer = BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        );
        serde_json::to_writer_pretty(writer, &inner.entries)?;
        Ok(())
    }
}
