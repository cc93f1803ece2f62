use std::path::PathBuf;
use std::{env, fs};

use anyhow::Result;
use criterion::*;
use glob::{glob_with, MatchOptions};
use ndarray::Array2;

use flame_sort::{
    capture::{CameraModel, Kind, Modality, Orientation},
    decode::{RawSegmentDecoder, ThermalDecoder},
    pair_job, palette,
    temperature::ThermalFrame,
    CaptureFile, SortKey,
};

fn captures(count: usize) -> Vec<CaptureFile> {
    (0..count)
        .flat_map(|i| {
            [Modality::Rgb, Modality::Thermal].into_iter().map(move |modality| {
                let orientation = Orientation::for_modality(modality);
                let tag = if modality == Modality::Rgb { "W" } else { "T" };
                CaptureFile {
                    path: PathBuf::from(format!("Plot/DJI_{:04}_{}.JPG", (i * 7919) % count, tag)),
                    modality,
                    kind: Kind::Image,
                    camera: CameraModel::M30T,
                    orientation,
                    timestamp: None,
                }
            })
        })
        .collect()
}

/// R-JPEG samples under `$DJI_SAMPLES`, if set.
fn get_samples(key: &'static str) -> Result<Vec<PathBuf>> {
    let base = env::var(key)?;
    let mut opts = MatchOptions::new();
    opts.case_sensitive = false;
    let samples: Vec<_> = glob_with(&format!("{base}/**/*_T.jpg"), opts)?
        .take(5)
        .map(|r| Result::Ok(r?))
        .collect::<Result<_>>()?;
    Ok(samples)
}

fn pairing(c: &mut Criterion) {
    c.bench_function("sort_key", |b| {
        let names: Vec<_> = (0..1000).map(|i| format!("DJI_20230501{:06}_{:04}_W.JPG", i * 3, i)).collect();
        b.iter(|| {
            for name in names.iter() {
                black_box(SortKey::for_name(name));
            }
        })
    });

    c.bench_function("pair_3000", |b| {
        let files = captures(3000);
        b.iter(|| pair_job("Plot", CameraModel::M30T, black_box(&files)).unwrap())
    });
}

fn regeneration(c: &mut Criterion) {
    c.bench_function("palette_640x512", |b| {
        let raw = Array2::from_shape_fn((512, 640), |(r, c)| (18000 + r * 3 + c) as u16);
        let frame = ThermalFrame::from_raw(&raw);
        b.iter(|| palette::render(black_box(&frame)))
    });

    if let Ok(samples) = get_samples("DJI_SAMPLES") {
        c.bench_function("raw_segment_decode", |b| {
            let bytes: Vec<_> = samples.iter().map(|p| fs::read(p).unwrap()).collect();
            b.iter(|| {
                for data in bytes.iter() {
                    let _ = RawSegmentDecoder.decode_bytes(data.clone());
                }
            })
        });

        c.bench_function("raw_segment_decode_path", |b| {
            b.iter(|| {
                for path in samples.iter() {
                    let _ = RawSegmentDecoder.decode(path);
                }
            })
        });
    }
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = pairing, regeneration
}

criterion_main!(benches);
