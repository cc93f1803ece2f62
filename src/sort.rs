//! The sorting run: classify, pair, regenerate, correct and
//! organize every sub-folder job of the input root.
//!
//! Jobs run one after the other. Within a job, image pairs are
//! processed on a bounded rayon pool; each pair's decoded
//! buffers live only for the duration of its own processing.
//! Video frames are streamed in lockstep, one frame pair at a
//! time.
use std::{
    fmt,
    fs::{create_dir_all, read_dir},
    path::Path,
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use image::RgbImage;
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use itertools::{EitherOrBoth, Itertools};
use rayon::{prelude::*, ThreadPool, ThreadPoolBuilder};
use serde_derive::*;

use crate::{
    capture::CaptureFile,
    classify::{classifier_for, classify_job, Classifier},
    config::SortConfig,
    decode::{decoder_for, ThermalDecoder},
    error::{RegenError, WriteError},
    exif::with_exif_of,
    fov::{correct, correct_file, Corrected},
    job::{discover, SubfolderJob},
    label::{Label, Labeler, SeedLabels},
    manifest::{ManifestEntry, RunLog, Stage, LOG_FILE_NAME, MANIFEST_FILE_NAME},
    organize::{auto_digits, Naming, Organizer, Role, DEFAULT_INDEX_DIGITS},
    pairing::{pair_job, Pair, PairStatus},
    temperature::{CelsiusRange, ThermalFrame},
    thermal::{encode_jpeg, regenerate, ThermalArtifacts},
    video::{Ffmpeg, VideoSource},
};

/// End-of-run counts.
#[derive(Serialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct Summary {
    pub jobs: usize,
    pub failed_jobs: usize,
    pub pairs: usize,
    pub complete: usize,
    pub rgb_only: usize,
    pub thermal_only: usize,
    pub fire: usize,
    pub no_fire: usize,
    pub unlabeled: usize,
    pub resumed: usize,
    pub discarded: usize,
    pub skipped: usize,
    pub failures: usize,
    pub artifacts: usize,
}

impl Summary {
    fn record(mut self, outcome: PairOutcome) -> Self {
        self.pairs += 1;
        match outcome.status {
            PairStatus::Complete => self.complete += 1,
            PairStatus::RgbOnly => self.rgb_only += 1,
            PairStatus::ThermalOnly => self.thermal_only += 1,
        }
        if outcome.resumed {
            self.resumed += 1;
            return self;
        }
        match outcome.label {
            Label::Fire => self.fire += 1,
            Label::NoFire => self.no_fire += 1,
            Label::Unlabeled => self.unlabeled += 1,
        }
        if outcome.artifacts == 0 {
            self.discarded += 1;
        }
        self.artifacts += outcome.artifacts;
        self
    }

    fn merge(mut self, other: Summary) -> Self {
        self.jobs += other.jobs;
        self.failed_jobs += other.failed_jobs;
        self.pairs += other.pairs;
        self.complete += other.complete;
        self.rgb_only += other.rgb_only;
        self.thermal_only += other.thermal_only;
        self.fire += other.fire;
        self.no_fire += other.no_fire;
        self.unlabeled += other.unlabeled;
        self.resumed += other.resumed;
        self.discarded += other.discarded;
        self.skipped += other.skipped;
        self.failures += other.failures;
        self.artifacts += other.artifacts;
        self
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Sorted {} pairs from {} sub-folders ({} failed)",
            self.pairs, self.jobs, self.failed_jobs
        )?;
        writeln!(
            f,
            "  complete: {}, rgb-only: {}, thermal-only: {}",
            self.complete, self.rgb_only, self.thermal_only
        )?;
        writeln!(
            f,
            "  fire: {}, no-fire: {}, unlabeled: {}",
            self.fire, self.no_fire, self.unlabeled
        )?;
        if self.resumed > 0 {
            writeln!(f, "  resumed (not rewritten): {}", self.resumed)?;
        }
        write!(
            f,
            "  {} artifacts written, {} pairs discarded, {} skips, {} failures",
            self.artifacts, self.discarded, self.skipped, self.failures
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct PairOutcome {
    status: PairStatus,
    label: Label,
    artifacts: usize,
    resumed: bool,
}

enum RgbInput<'p> {
    File(&'p Path),
    Frame(RgbImage),
}

pub struct Sorter {
    config: SortConfig,
    video: Arc<dyn VideoSource>,
}

impl Sorter {
    pub fn new(config: SortConfig) -> Self {
        let video = Arc::new(Ffmpeg {
            ffmpeg: config.ffmpeg.clone(),
            ffprobe: config.ffprobe.clone(),
        });
        Sorter { config, video }
    }

    pub fn with_video_source(mut self, video: Arc<dyn VideoSource>) -> Self {
        self.video = video;
        self
    }

    pub fn config(&self) -> &SortConfig {
        &self.config
    }

    /// Sort the whole input root. Only configuration and
    /// output-root problems fail the run; everything else is
    /// recorded in the run log.
    pub fn run(&self) -> Result<Summary> {
        let config = &self.config;
        config.validate()?;
        prepare_output(&config.output, config.resume_from)?;

        let log = RunLog::create(&config.output.join(LOG_FILE_NAME))?;
        let seeds = match &config.labels {
            Some(path) => SeedLabels::from_json_path(path)?,
            None => SeedLabels::default(),
        };
        let decoder = decoder_for(config.decoder)?;
        let classifier = classifier_for(config.classifier, &*self.video);
        let workers = config.worker_count();
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .context("building worker pool")?;
        log::info!("processing pairs on {} workers", workers);

        let run = Run {
            config,
            log: &log,
            organizer: Organizer::new(&config.output, &log).overwrite_existing(config.resume_from.is_some()),
            decoder: &*decoder,
            classifier: &*classifier,
            video: &*self.video,
            labeler: Labeler::new(seeds, config.fire_threshold),
            pool,
        };

        let jobs = discover(&config.input, config.camera, &log)?;
        log::info!("{} sub-folders under {}", jobs.len(), config.input.display());

        let mut summary = Summary::default();
        for job in &jobs {
            summary.jobs += 1;
            match run.job(job) {
                Ok(Some(job_summary)) => summary = summary.merge(job_summary),
                Ok(None) => summary.failed_jobs += 1,
                Err(e) => {
                    summary.failed_jobs += 1;
                    log.record(ManifestEntry::Fail {
                        job: job.name.clone(),
                        paths: vec![job.root.clone()],
                        stage: Stage::Classification,
                        reason: format!("{:#}", e),
                    });
                }
            }
        }

        summary.skipped = log.count(ManifestEntry::is_skip);
        summary.failures = log.count(ManifestEntry::is_fail);
        log.persist_manifest(&config.output.join(MANIFEST_FILE_NAME))?;
        Ok(summary)
    }
}

fn prepare_output(output: &Path, resume_from: Option<usize>) -> Result<()> {
    if output.exists() {
        let occupied = read_dir(output)
            .with_context(|| format!("listing {}", output.display()))?
            .next()
            .is_some();
        match (occupied, resume_from) {
            (true, None) => bail!(
                "output folder {} is not empty; remove old data or set a resume index",
                output.display()
            ),
            (true, Some(index)) => log::warn!(
                "output folder {} is not empty and resuming from pair {}; proceed with caution",
                output.display(),
                index
            ),
            _ => {}
        }
    }
    create_dir_all(output).with_context(|| format!("creating {}", output.display()))
}

fn progress_bar(len: usize) -> ProgressBar {
    let bar = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar().template("[{elapsed_precise}] {wide_bar:cyan/blue} {pos:>7}/{len:7}") {
        bar.set_style(style);
    }
    bar
}

/// State shared by every job of one run.
struct Run<'a> {
    config: &'a SortConfig,
    log: &'a RunLog,
    organizer: Organizer<'a>,
    decoder: &'a dyn ThermalDecoder,
    classifier: &'a dyn Classifier,
    video: &'a dyn VideoSource,
    labeler: Labeler,
    pool: ThreadPool,
}

impl Run<'_> {
    /// Process one job. `Ok(None)` if the job was aborted on a
    /// camera-model precondition.
    fn job(&self, job: &SubfolderJob) -> Result<Option<Summary>> {
        let files = job.files()?;
        log::info!("{}: {} files ({})", job.name, files.len(), job.camera);

        let captures = classify_job(&files, job.camera, self.classifier, self.video, self.log);
        let mut pairs = match pair_job(&job.name, job.camera, &captures) {
            Ok(pairs) => pairs,
            Err(e) => {
                self.log.record(ManifestEntry::Fail {
                    job: job.name.clone(),
                    paths: vec![job.root.clone()],
                    stage: e.stage(),
                    reason: e.to_string(),
                });
                return Ok(None);
            }
        };

        let extracting = self.config.frame_stride.is_some() && !pairs.videos.is_empty();
        let digits = self.config.index_digits.unwrap_or_else(|| {
            if extracting {
                DEFAULT_INDEX_DIGITS
            } else {
                auto_digits(pairs.len())
            }
        });
        let naming = Naming {
            rename: self.config.rename,
            digits,
        };

        for (index, pair) in pairs.images.iter_mut().chain(pairs.videos.iter_mut()).enumerate() {
            pair.index = index;
            self.log_pair(pair);
        }

        let bar = progress_bar(pairs.images.len());
        let images = &pairs.images;
        let mut summary = self.pool.install(|| {
            images
                .par_iter()
                .progress_with(bar)
                .map(|pair| self.image_pair(pair, naming))
                .fold(Summary::default, Summary::record)
                .reduce(Summary::default, Summary::merge)
        });

        for pair in &pairs.videos {
            summary = summary.record(self.video_pair(pair, naming));
        }

        if let (Some(stride), Some(range)) = (self.config.frame_stride, self.config.video_range) {
            let mut next_index = pairs.len();
            for pair in &pairs.videos {
                summary = self.expand_frames(pair, stride, &range, naming, &mut next_index, summary);
            }
        }
        Ok(Some(summary))
    }

    fn log_pair(&self, pair: &Pair) {
        self.log.record(ManifestEntry::Pair {
            job: pair.job.clone(),
            index: pair.index,
            status: pair.status(),
            rgb: pair.rgb.as_ref().map(|f| f.path.clone()),
            thermal: pair.thermal.as_ref().map(|f| f.path.clone()),
        });
    }

    fn resumed(&self, pair: &Pair) -> bool {
        self.config.resume_from.map_or(false, |r| pair.index < r)
    }

    fn skip(&self, path: &Path, stage: Stage, reason: impl fmt::Display) {
        self.log.record(ManifestEntry::skip(path, stage, reason));
    }

    fn image_pair(&self, pair: &Pair, naming: Naming) -> PairOutcome {
        if self.resumed(pair) {
            return self.finish(pair, naming, None, None);
        }
        let thermal = pair.thermal.as_ref().map(|t| (self.decoder.decode(&t.path), Some(t.path.as_path())));
        let rgb = pair.rgb.as_ref().map(|f| RgbInput::File(&f.path));
        self.finish(pair, naming, rgb, thermal)
    }

    fn video_pair(&self, pair: &Pair, naming: Naming) -> PairOutcome {
        let mut outcome = PairOutcome {
            status: pair.status(),
            label: self.labeler.label(&pair.job, pair.index, None),
            artifacts: 0,
            resumed: self.resumed(pair),
        };
        if outcome.resumed {
            return outcome;
        }

        let stem = frame_stem(pair);
        let sides = [(&pair.rgb, Role::RgbVideo), (&pair.thermal, Role::ThermalVideo)];
        for (file, role) in sides {
            if let Some(file) = file {
                let ext = role.extension(&file.path);
                let name = naming.file_name(&pair.job, pair.index, role, &stem, &ext);
                if self.emit(pair, outcome.label, role, &file.path, &name, None) {
                    outcome.artifacts += 1;
                }
            }
        }
        outcome
    }

    fn expand_frames(
        &self,
        pair: &Pair,
        stride: u32,
        range: &CelsiusRange,
        naming: Naming,
        next_index: &mut usize,
        mut summary: Summary,
    ) -> Summary {
        let open = |file: &Option<CaptureFile>, stage: Stage| {
            let file = file.as_ref()?;
            match self.video.frames(&file.path, stride) {
                Ok(frames) => Some(frames),
                Err(e) => {
                    self.skip(&file.path, stage, format!("{:#}", e));
                    None
                }
            }
        };
        let rgb = open(&pair.rgb, Stage::GeometricCorrection);
        let thermal = open(&pair.thermal, Stage::ThermalRegeneration);

        let frames = rgb.into_iter().flatten().zip_longest(thermal.into_iter().flatten());
        for (n, sides) in frames.enumerate() {
            let (rgb, thermal) = match sides {
                EitherOrBoth::Both(r, t) => (Some(r), Some(t)),
                EitherOrBoth::Left(r) => (Some(r), None),
                EitherOrBoth::Right(t) => (None, Some(t)),
            };
            let rgb = self.frame_or_skip(rgb, &pair.rgb, Stage::GeometricCorrection);
            let thermal = self.frame_or_skip(thermal, &pair.thermal, Stage::ThermalRegeneration);
            if rgb.is_none() && thermal.is_none() {
                continue;
            }

            let frame_pair = pair.frame_of(n * stride as usize, rgb.is_some(), thermal.is_some(), *next_index);
            *next_index += 1;
            self.log_pair(&frame_pair);

            let thermal = thermal.map(|img| {
                let luma = image::DynamicImage::ImageRgb8(img).to_luma8();
                (Ok(ThermalFrame::from_luma(&luma, range)), None)
            });
            let outcome = self.finish(&frame_pair, naming, rgb.map(RgbInput::Frame), thermal);
            summary = summary.record(outcome);
        }
        summary
    }

    fn frame_or_skip(&self, frame: Option<Result<RgbImage>>, source: &Option<CaptureFile>, stage: Stage) -> Option<RgbImage> {
        match (frame?, source) {
            (Ok(img), _) => Some(img),
            (Err(e), Some(file)) => {
                self.skip(&file.path, stage, format!("{:#}", e));
                None
            }
            (Err(_), None) => None,
        }
    }

    /// Regenerate, correct and write one pair. All decoded
    /// buffers are dropped before this returns.
    fn finish(
        &self,
        pair: &Pair,
        naming: Naming,
        rgb: Option<RgbInput>,
        thermal: Option<(Result<ThermalFrame, RegenError>, Option<&Path>)>,
    ) -> PairOutcome {
        let mut outcome = PairOutcome {
            status: pair.status(),
            label: Label::Unlabeled,
            artifacts: 0,
            resumed: self.resumed(pair),
        };
        if outcome.resumed {
            outcome.label = self.labeler.label(&pair.job, pair.index, None);
            return outcome;
        }

        let artifacts = thermal.and_then(|(frame, exif_source)| self.thermal_artifacts(pair, frame, exif_source));
        outcome.label = self
            .labeler
            .label(&pair.job, pair.index, artifacts.as_ref().map(|a| &a.stats));
        let stem = frame_stem(pair);

        if let (Some(rgb), Some(file)) = (rgb, &pair.rgb) {
            outcome.artifacts += self.rgb_artifacts(pair, naming, outcome.label, &stem, rgb, &file.path);
        }

        if let (Some(artifacts), Some(file)) = (artifacts, &pair.thermal) {
            let writes = [
                (Role::Celsius, artifacts.tiff.as_slice()),
                (Role::ThermalJpg, artifacts.jpeg.as_slice()),
            ];
            for (role, bytes) in writes {
                let name = naming.file_name(&pair.job, pair.index, role, &stem, &role.extension(&file.path));
                if self.emit(pair, outcome.label, role, &file.path, &name, Some(bytes)) {
                    outcome.artifacts += 1;
                }
            }
        }
        outcome
    }

    fn thermal_artifacts(
        &self,
        pair: &Pair,
        frame: Result<ThermalFrame, RegenError>,
        exif_source: Option<&Path>,
    ) -> Option<ThermalArtifacts> {
        let path = pair.thermal.as_ref().map(|f| f.path.as_path()).unwrap_or(Path::new(""));
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                self.skip(path, e.stage(), &e);
                return None;
            }
        };
        match regenerate(frame, exif_source) {
            Ok(artifacts) => Some(artifacts),
            Err(e) => {
                self.skip(path, Stage::ThermalRegeneration, format!("{:#}", e));
                None
            }
        }
    }

    fn rgb_artifacts(&self, pair: &Pair, naming: Naming, label: Label, stem: &str, rgb: RgbInput, source: &Path) -> usize {
        let mut written = 0;
        let corrected = match rgb {
            RgbInput::File(path) => {
                let name = naming.file_name(&pair.job, pair.index, Role::RgbRaw, stem, &Role::RgbRaw.extension(path));
                if self.emit(pair, label, Role::RgbRaw, path, &name, None) {
                    written += 1;
                }
                correct_file(pair.camera, path).and_then(|c| encode_corrected(c, Some(path), source, self.log))
            }
            RgbInput::Frame(frame) => {
                let name = naming.file_name(&pair.job, pair.index, Role::RgbRaw, stem, "jpg");
                match encode_jpeg(&frame) {
                    Ok(bytes) => {
                        if self.emit(pair, label, Role::RgbRaw, source, &name, Some(bytes.as_slice())) {
                            written += 1;
                        }
                    }
                    Err(e) => self.skip(source, Stage::Output, format!("{:#}", e)),
                }
                correct(pair.camera, &frame).and_then(|c| encode_corrected(c, None, source, self.log))
            }
        };

        match corrected {
            Ok(bytes) => {
                let name = naming.file_name(&pair.job, pair.index, Role::RgbFov, stem, "jpg");
                if self.emit(pair, label, Role::RgbFov, source, &name, Some(bytes.as_slice())) {
                    written += 1;
                }
            }
            Err(e) => self.skip(source, Stage::GeometricCorrection, format!("{:#}", e)),
        }
        written
    }

    /// Write one artifact: copy `source` when `bytes` is
    /// `None`. Failures are recorded and affect only this
    /// write.
    fn emit(&self, pair: &Pair, label: Label, role: Role, source: &Path, name: &str, bytes: Option<&[u8]>) -> bool {
        let target = self.organizer.target(&pair.job, label, role, name);
        let res = self
            .organizer
            .ensure_layout(&pair.job, label)
            .and_then(|_| match bytes {
                Some(bytes) => self.organizer.write_bytes(source, &target, label, bytes),
                None => self.organizer.copy_file(source, &target, label),
            });
        match res {
            Ok(()) => true,
            Err(e) => {
                self.record_write_failure(pair, source, &e);
                false
            }
        }
    }

    fn record_write_failure(&self, pair: &Pair, source: &Path, e: &WriteError) {
        self.log.record(ManifestEntry::Fail {
            job: pair.job.clone(),
            paths: vec![source.to_path_buf()],
            stage: e.stage(),
            reason: e.to_string(),
        });
    }
}

fn encode_corrected(corrected: Corrected, exif_source: Option<&Path>, source: &Path, log: &RunLog) -> Result<Vec<u8>> {
    for message in corrected.warnings {
        log.record(ManifestEntry::Warn {
            path: source.to_path_buf(),
            stage: Stage::GeometricCorrection,
            message,
        });
    }
    let bytes = encode_jpeg(&corrected.image)?;
    match exif_source {
        Some(path) => with_exif_of(bytes, path),
        None => Ok(bytes),
    }
}

/// Stem used when renaming is off: the RGB source stem (else
/// the thermal one), plus the frame number for video frames.
fn frame_stem(pair: &Pair) -> String {
    let stem = pair
        .rgb
        .as_ref()
        .or(pair.thermal.as_ref())
        .map(CaptureFile::stem)
        .unwrap_or_default();
    match pair.frame {
        Some(frame) => format!("{}_frame{}", stem, frame),
        None => stem,
    }
}

#[cfg(test)]
mod tests {
    use std::{
        path::PathBuf,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use super::*;
    use crate::capture::{CameraModel, Kind, Modality, Orientation};

    #[derive(Default)]
    struct CountingDecoder(AtomicUsize);

    impl ThermalDecoder for CountingDecoder {
        fn decode(&self, _: &Path) -> Result<ThermalFrame, RegenError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(RegenError::MissingCalibration)
        }
    }

    fn capture(path: &str, modality: Modality) -> CaptureFile {
        CaptureFile {
            path: PathBuf::from(path),
            modality,
            kind: Kind::Image,
            camera: CameraModel::M30T,
            orientation: Orientation::for_modality(modality),
            timestamp: None,
        }
    }

    #[test]
    fn resumed_pairs_are_not_decoded() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = SortConfig {
            output: dir.path().to_path_buf(),
            resume_from: Some(1),
            ..Default::default()
        };
        let log = RunLog::in_memory();
        let decoder = CountingDecoder::default();
        let video = Ffmpeg::default();
        let classifier = classifier_for(config.classifier, &video);
        let run = Run {
            config: &config,
            log: &log,
            organizer: Organizer::new(dir.path(), &log),
            decoder: &decoder,
            classifier: &*classifier,
            video: &video,
            labeler: Labeler::new(SeedLabels::default(), None),
            pool: ThreadPoolBuilder::new().num_threads(1).build()?,
        };

        let pair = Pair {
            job: "A".into(),
            camera: CameraModel::M30T,
            kind: Kind::Image,
            rgb: None,
            thermal: Some(capture("in/A/img1_T.jpg", Modality::Thermal)),
            frame: None,
            index: 0,
            label: Label::Unlabeled,
        };
        let naming = Naming {
            rename: true,
            digits: 1,
        };

        let outcome = run.image_pair(&pair, naming);
        assert!(outcome.resumed);
        assert_eq!(decoder.0.load(Ordering::SeqCst), 0);

        let outcome = run.image_pair(&Pair { index: 1, ..pair }, naming);
        assert!(!outcome.resumed);
        assert_eq!(outcome.artifacts, 0);
        assert_eq!(decoder.0.load(Ordering::SeqCst), 1);
        assert_eq!(log.count(ManifestEntry::is_skip), 1);
        Ok(())
    }
}
