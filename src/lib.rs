//! Sort raw captures of dual RGB + thermal drone payloads
//! (DJI M30T and M2EA) into a paired, regenerated dataset.
//!
//! Given an input root with one level of sub-folders of
//! `.jpg` images and `.mp4` videos, a run:
//!
//! 1. [classifies](classify) every file by kind and modality,
//!    using the `W` / `T` file name convention (or frame
//!    height);
//!
//! 2. [pairs](pairing) RGB and thermal captures per
//!    sub-folder, positionally in [capture order](capture::order);
//!
//! 3. [regenerates](thermal) every thermal frame into a
//!    Celsius TIFF and an inferno-palette JPEG, and
//!    [corrects](fov) every RGB frame to the thermal field of
//!    view;
//!
//! 4. [writes](organize) the results under a fixed directory
//!    layout with deterministic names, recording every
//!    decision in the [run log](manifest).
//!
//! # Usage
//!
//! ```rust,no_run
//! # fn run() -> anyhow::Result<()> {
//! use flame_sort::{SortConfig, Sorter};
//!
//! let config = SortConfig {
//!     input: "Input Folder".into(),
//!     output: "Output Folder".into(),
//!     ..Default::default()
//! };
//! let summary = Sorter::new(config).run()?;
//! eprintln!("{}", summary);
//! # Ok(())
//! # }
//! ```
//!
//! Thermal images are decoded from the radiometric payload
//! of DJI R-JPEGs by default. Enable the `dji` feature to use
//! the vendor SDK instead.

pub mod capture;
pub mod classify;
pub mod config;
pub mod decode;
pub mod error;
pub mod exif;
pub mod fov;
pub mod job;
pub mod label;
pub mod manifest;
pub mod organize;
pub mod pairing;
pub mod palette;
pub mod sort;
pub mod temperature;
pub mod thermal;
pub mod video;

#[cfg(feature = "dji")]
pub mod dji;

#[cfg(feature = "cli")]
pub mod cli;

pub use crate::capture::{order, CameraModel, CaptureFile, SortKey};
pub use crate::config::SortConfig;
pub use crate::manifest::{ManifestEntry, RunLog};
pub use crate::pairing::{pair_job, Pair, PairStatus};
pub use crate::sort::{Sorter, Summary};
