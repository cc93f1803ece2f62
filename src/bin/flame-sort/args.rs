use std::path::PathBuf;

use anyhow::Result;
use clap::{value_t_or_exit, ArgMatches};
use flame_sort::{
    capture::CameraModel, classify::ClassifierKind, config::SortConfig, decode::DecoderKind,
    temperature::CelsiusRange,
};
use flame_sort::{arg, args_parser, opt};

pub struct Args {
    pub config: SortConfig,
    pub verbose: bool,
}

macro_rules! overlay {
    ($matches:ident, $name:expr, Option<$ty:ty>, $field:expr) => {
        if $matches.is_present($name) {
            $field = Some(value_t_or_exit!($matches, $name, $ty));
        }
    };
    ($matches:ident, $name:expr, $ty:ty, $field:expr) => {
        if $matches.is_present($name) {
            $field = value_t_or_exit!($matches, $name, $ty);
        }
    };
}

impl Args {
    pub fn from_cmd_line() -> Result<Args> {
        let matches = args_parser!("flame-sort")
            .setting(clap::AppSettings::AllowLeadingHyphen)
            .about("Pair, regenerate and sort raw RGB + thermal drone captures.")
            .arg(
                opt!("config")
                    .short("c")
                    .help("JSON config file; flags override its values"),
            )
            .arg(opt!("output").short("o").help("Output root (must be empty)"))
            .arg(
                opt!("camera")
                    .help("Camera model of sub-folders not named after one: M30T or M2EA"),
            )
            .arg(opt!("classifier").help("naming (W/T file name tokens) or frame-height"))
            .arg(opt!("decoder").help("Thermal decoder: raw-segment or dji-sdk"))
            .arg(
                opt!("keep names")
                    .takes_value(false)
                    .help("Keep source file stems instead of renaming outputs"),
            )
            .arg(opt!("index digits").help("Zero-padded index width (default: fit the pair count)"))
            .arg(opt!("resume from").help("Do not rewrite pairs with a lower index"))
            .arg(opt!("frame stride").help("Extract every n-th video frame as an image pair"))
            .arg(opt!("video range").help("Celsius span MIN:MAX of thermal video frames"))
            .arg(opt!("fire threshold").help("Label pairs whose max Celsius reaches this as fire"))
            .arg(opt!("labels").help("Seed labels JSON"))
            .arg(opt!("jobs").short("j").help("Worker threads"))
            .arg(opt!("memory budget").help("Memory budget in MiB; caps the worker count"))
            .arg(opt!("ffmpeg").help("Path to the ffmpeg binary"))
            .arg(opt!("ffprobe").help("Path to the ffprobe binary"))
            .arg(
                opt!("verbose")
                    .short("v")
                    .takes_value(false)
                    .help("Log every decision to the console"),
            )
            .arg(arg!("input").help("Input root with one sub-folder per job"))
            .get_matches();

        let mut config = if matches.is_present("config") {
            SortConfig::from_json_path(&value_t_or_exit!(matches, "config", PathBuf))?
        } else {
            SortConfig::default()
        };
        overlay_matches(&matches, &mut config);

        Ok(Args {
            config,
            verbose: matches.is_present("verbose"),
        })
    }
}

fn overlay_matches(matches: &ArgMatches, config: &mut SortConfig) {
    overlay!(matches, "input", PathBuf, config.input);
    overlay!(matches, "output", PathBuf, config.output);
    overlay!(matches, "camera", CameraModel, config.camera);
    overlay!(matches, "classifier", ClassifierKind, config.classifier);
    overlay!(matches, "decoder", DecoderKind, config.decoder);
    overlay!(matches, "index digits", Option<usize>, config.index_digits);
    overlay!(matches, "resume from", Option<usize>, config.resume_from);
    overlay!(matches, "frame stride", Option<u32>, config.frame_stride);
    overlay!(matches, "video range", Option<CelsiusRange>, config.video_range);
    overlay!(matches, "fire threshold", Option<f32>, config.fire_threshold);
    overlay!(matches, "labels", Option<PathBuf>, config.labels);
    overlay!(matches, "jobs", Option<usize>, config.jobs);
    overlay!(matches, "memory budget", Option<u64>, config.memory_budget_mib);
    overlay!(matches, "ffmpeg", PathBuf, config.ffmpeg);
    overlay!(matches, "ffprobe", PathBuf, config.ffprobe);
    if matches.is_present("keep names") {
        config.rename = false;
    }
}
