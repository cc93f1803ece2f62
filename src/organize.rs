//! The output directory contract and deterministic file
//! naming.
//!
//! Every sub-folder job gets the layout below, under the
//! output root for unlabeled pairs, or under `Fire/` and
//! `No Fire/` for labeled ones:
//!
//! ```text
//! <Job>/Images/RGB/Raw
//! <Job>/Images/RGB/Corrected FOV
//! <Job>/Images/Thermal/Celsius TIFF
//! <Job>/Images/Thermal/JPG
//! <Job>/Videos/RGB
//! <Job>/Videos/Thermal
//! ```
//!
//! Files are named `{job}_{index}_{role}.{ext}`. A name is
//! never written twice in one run; a second write to it fails
//! with [`WriteError::Collision`]. Files already on disk also
//! collide, unless a resumed run replaces them.
use std::{
    collections::HashSet,
    fs::{create_dir_all, File, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use crate::{
    error::WriteError,
    label::Label,
    manifest::{ManifestEntry, RunLog},
};

/// Index width used when the number of outputs is not known
/// up front.
pub const DEFAULT_INDEX_DIGITS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    RgbRaw,
    RgbFov,
    Celsius,
    ThermalJpg,
    RgbVideo,
    ThermalVideo,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::RgbRaw,
        Role::RgbFov,
        Role::Celsius,
        Role::ThermalJpg,
        Role::RgbVideo,
        Role::ThermalVideo,
    ];

    pub fn dir(&self) -> &'static [&'static str] {
        match self {
            Role::RgbRaw => &["Images", "RGB", "Raw"],
            Role::RgbFov => &["Images", "RGB", "Corrected FOV"],
            Role::Celsius => &["Images", "Thermal", "Celsius TIFF"],
            Role::ThermalJpg => &["Images", "Thermal", "JPG"],
            Role::RgbVideo => &["Videos", "RGB"],
            Role::ThermalVideo => &["Videos", "Thermal"],
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            Role::RgbRaw | Role::RgbVideo => "rgb",
            Role::RgbFov => "rgb_fov",
            Role::Celsius => "celsius",
            Role::ThermalJpg | Role::ThermalVideo => "thermal",
        }
    }

    /// Output extension. Copied sources keep theirs.
    pub fn extension(&self, source: &Path) -> String {
        match self {
            Role::RgbFov | Role::ThermalJpg => "jpg".into(),
            Role::Celsius => "tiff".into(),
            Role::RgbRaw | Role::RgbVideo | Role::ThermalVideo => source
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default(),
        }
    }
}

/// Smallest width that fits every index below `count`.
pub fn auto_digits(count: usize) -> usize {
    count.saturating_sub(1).to_string().len()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Naming {
    /// With renaming off, outputs keep the source stem.
    pub rename: bool,
    pub digits: usize,
}

impl Naming {
    pub fn file_name(&self, job: &str, index: usize, role: Role, stem: &str, ext: &str) -> String {
        if self.rename {
            format!(
                "{}_{:0>width$}_{}.{}",
                job,
                index,
                role.suffix(),
                ext,
                width = self.digits
            )
        } else {
            format!("{}.{}", stem, ext)
        }
    }
}

/// Writes artifacts under the output root and records each
/// write in the run log.
pub struct Organizer<'a> {
    root: PathBuf,
    log: &'a RunLog,
    claimed: Mutex<HashSet<PathBuf>>,
    layouts: Mutex<HashSet<(String, Label)>>,
    overwrite: bool,
}

impl<'a> Organizer<'a> {
    pub fn new(root: &Path, log: &'a RunLog) -> Self {
        Organizer {
            root: root.to_path_buf(),
            log,
            claimed: Mutex::new(HashSet::new()),
            layouts: Mutex::new(HashSet::new()),
            overwrite: false,
        }
    }

    /// Replace files left on disk by an earlier run instead of
    /// treating them as collisions. Names claimed twice within
    /// this run still collide.
    pub fn overwrite_existing(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn job_root(&self, job: &str, label: Label) -> PathBuf {
        let mut path = self.root.clone();
        if let Some(dir) = label.root_dir() {
            path.push(dir);
        }
        path.push(job);
        path
    }

    /// Output path of `role` for one pair.
    pub fn target(&self, job: &str, label: Label, role: Role, file_name: &str) -> PathBuf {
        let mut path = self.job_root(job, label);
        path.extend(role.dir());
        path.push(file_name);
        path
    }

    /// Create the full layout of `job` under `label`'s root.
    pub fn ensure_layout(&self, job: &str, label: Label) -> Result<(), WriteError> {
        let mut layouts = self.layouts.lock().unwrap_or_else(|e| e.into_inner());
        if layouts.contains(&(job.to_string(), label)) {
            return Ok(());
        }
        let root = self.job_root(job, label);
        for role in Role::ALL {
            let mut dir = root.clone();
            dir.extend(role.dir());
            create_dir_all(&dir)?;
        }
        layouts.insert((job.to_string(), label));
        Ok(())
    }

    fn create(&self, target: &Path) -> Result<File, WriteError> {
        let mut options = OpenOptions::new();
        options.write(true);
        if self.overwrite {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        match options.open(target) {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(WriteError::Collision(target.to_path_buf())),
            Err(e) => Err(e.into()),
        }
    }

    fn claim(&self, target: &Path) -> Result<(), WriteError> {
        let mut claimed = self.claimed.lock().unwrap_or_else(|e| e.into_inner());
        if !claimed.insert(target.to_path_buf()) {
            return Err(WriteError::Collision(target.to_path_buf()));
        }
        Ok(())
    }

    /// Write `bytes` (derived from `source`) to `target`.
    pub fn write_bytes(&self, source: &Path, target: &Path, label: Label, bytes: &[u8]) -> Result<(), WriteError> {
        self.claim(target)?;
        let mut file = self.create(target)?;
        file.write_all(bytes)?;

        self.log.record(ManifestEntry::Rename {
            from: source.to_path_buf(),
            to: target.to_path_buf(),
            label,
        });
        Ok(())
    }

    /// Copy `source` unchanged to `target`.
    pub fn copy_file(&self, source: &Path, target: &Path, label: Label) -> Result<(), WriteError> {
        self.claim(target)?;
        let mut from = File::open(source)?;
        let mut to = self.create(target)?;
        std::io::copy(&mut from, &mut to)?;

        self.log.record(ManifestEntry::Rename {
            from: source.to_path_buf(),
            to: target.to_path_buf(),
            label,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn names_follow_the_scheme() {
        let naming = Naming {
            rename: true,
            digits: 5,
        };
        assert_eq!(
            naming.file_name("Plot 3", 42, Role::Celsius, "DJI_0042_T", "tiff"),
            "Plot 3_00042_celsius.tiff"
        );
        let naming = Naming {
            rename: false,
            digits: 5,
        };
        assert_eq!(
            naming.file_name("Plot 3", 42, Role::ThermalJpg, "DJI_0042_W", "jpg"),
            "DJI_0042_W.jpg"
        );
    }

    #[test]
    fn auto_width_fits_the_largest_index() {
        assert_eq!(auto_digits(0), 1);
        assert_eq!(auto_digits(2), 1);
        assert_eq!(auto_digits(10), 1);
        assert_eq!(auto_digits(11), 2);
        assert_eq!(auto_digits(1001), 4);
    }

    #[test]
    fn extensions_per_role() {
        let src = Path::new("in/DJI_0001_W.JPG");
        assert_eq!(Role::RgbRaw.extension(src), "jpg");
        assert_eq!(Role::Celsius.extension(src), "tiff");
        assert_eq!(Role::ThermalVideo.extension(Path::new("v_T.MP4")), "mp4");
    }

    #[test]
    fn label_roots_and_layout() -> Result<(), WriteError> {
        let dir = tempfile::tempdir()?;
        let log = RunLog::in_memory();
        let org = Organizer::new(dir.path(), &log);

        assert_eq!(
            org.target("A", Label::NoFire, Role::RgbFov, "x.jpg"),
            dir.path().join("No Fire/A/Images/RGB/Corrected FOV/x.jpg")
        );
        org.ensure_layout("A", Label::Unlabeled)?;
        for role in Role::ALL {
            let mut d = dir.path().join("A");
            d.extend(role.dir());
            assert!(d.is_dir(), "{}", d.display());
        }
        assert!(!dir.path().join("Fire").exists());
        Ok(())
    }

    #[test]
    fn second_write_to_a_name_collides() -> Result<(), WriteError> {
        let dir = tempfile::tempdir()?;
        let log = RunLog::in_memory();
        let org = Organizer::new(dir.path(), &log);
        org.ensure_layout("A", Label::Unlabeled)?;

        let target = org.target("A", Label::Unlabeled, Role::Celsius, "A_0_celsius.tiff");
        org.write_bytes(Path::new("in/a_T.jpg"), &target, Label::Unlabeled, b"first")?;
        assert!(matches!(
            org.write_bytes(Path::new("in/b_T.jpg"), &target, Label::Unlabeled, b"second"),
            Err(WriteError::Collision(_))
        ));
        assert_eq!(fs::read(&target)?, b"first");

        // Pre-existing files also collide.
        let stale = org.target("A", Label::Unlabeled, Role::RgbRaw, "A_0_rgb.jpg");
        fs::write(&stale, b"stale")?;
        assert!(matches!(
            org.copy_file(&target, &stale, Label::Unlabeled),
            Err(WriteError::Collision(_))
        ));
        assert_eq!(log.entries().len(), 1);
        Ok(())
    }

    #[test]
    fn resumed_runs_replace_stale_files_once() -> Result<(), WriteError> {
        let dir = tempfile::tempdir()?;
        let log = RunLog::in_memory();
        let org = Organizer::new(dir.path(), &log).overwrite_existing(true);
        org.ensure_layout("A", Label::Unlabeled)?;

        let target = org.target("A", Label::Unlabeled, Role::RgbRaw, "A_1_rgb.jpg");
        fs::write(&target, b"trunc")?;
        org.write_bytes(Path::new("in/img2_W.jpg"), &target, Label::Unlabeled, b"complete frame")?;
        assert_eq!(fs::read(&target)?, b"complete frame");

        assert!(matches!(
            org.write_bytes(Path::new("in/img3_W.jpg"), &target, Label::Unlabeled, b"other"),
            Err(WriteError::Collision(_))
        ));
        assert_eq!(fs::read(&target)?, b"complete frame");
        Ok(())
    }
}
