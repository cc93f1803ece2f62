//! Discovery of sub-folder jobs under the input root.
use std::{
    fs::read_dir,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

use crate::{
    capture::{file_name_of, CameraModel},
    manifest::{ManifestEntry, RunLog, Stage},
};

/// One immediate sub-folder of the input root. All pairing
/// and indexing is scoped to a job.
#[derive(Debug, Clone, PartialEq)]
pub struct SubfolderJob {
    pub name: String,
    pub root: PathBuf,
    pub camera: CameraModel,
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = read_dir(dir)
        .with_context(|| format!("listing {}", dir.display()))?
        .map(|e| e.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("listing {}", dir.display()))?;
    paths.sort();
    Ok(paths)
}

impl SubfolderJob {
    /// Regular files of the job, sorted by path.
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        Ok(sorted_entries(&self.root)?
            .into_iter()
            .filter(|p| p.is_file())
            .collect())
    }
}

/// List the jobs of `input`, sorted by name. Loose files at
/// the top level are recorded as skips. Each job's camera
/// model comes from its folder name, else `default_camera`.
pub fn discover(input: &Path, default_camera: CameraModel, log: &RunLog) -> Result<Vec<SubfolderJob>> {
    let mut jobs = vec![];
    for path in sorted_entries(input)? {
        let name = file_name_of(&path);
        if !path.is_dir() {
            if !name.starts_with('.') {
                log.record(ManifestEntry::skip(
                    &path,
                    Stage::Classification,
                    "not inside a sub-folder",
                ));
            }
            continue;
        }
        let camera = CameraModel::from_folder_name(&name).unwrap_or(default_camera);
        jobs.push(SubfolderJob {
            name,
            root: path,
            camera,
        });
    }
    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn discovers_sorted_jobs_with_camera_models() -> Result<()> {
        let dir = tempfile::tempdir()?;
        for sub in ["b_M2EA", "a", "c"] {
            fs::create_dir(dir.path().join(sub))?;
        }
        fs::write(dir.path().join("stray.jpg"), b"")?;
        fs::write(dir.path().join(".gitkeep"), b"")?;
        fs::write(dir.path().join("a").join("img1_W.jpg"), b"")?;
        fs::create_dir(dir.path().join("a").join("nested"))?;

        let log = RunLog::in_memory();
        let jobs = discover(dir.path(), CameraModel::M30T, &log)?;
        let names: Vec<_> = jobs.iter().map(|j| (j.name.as_str(), j.camera)).collect();
        assert_eq!(
            names,
            vec![
                ("a", CameraModel::M30T),
                ("b_M2EA", CameraModel::M2EA),
                ("c", CameraModel::M30T)
            ]
        );
        assert_eq!(log.count(ManifestEntry::is_skip), 1);
        assert_eq!(jobs[0].files()?, vec![dir.path().join("a").join("img1_W.jpg")]);
        Ok(())
    }
}
