#![allow(dead_code)]

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Result;
use flame_sort::{
    video::{Frames, VideoInfo, VideoSource},
    SortConfig,
};
use image::{codecs::jpeg::JpegEncoder, GrayImage, Luma, Rgb, RgbImage};
use img_parts::{
    jpeg::{markers, Jpeg, JpegSegment},
    Bytes, ImageEXIF,
};

fn encode(image: impl Into<image::DynamicImage>) -> Vec<u8> {
    let image = image.into();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 90)
        .encode_image(&image)
        .unwrap();
    out
}

/// A plain RGB JPEG with a gradient.
pub fn rgb_jpeg(wid: u32, ht: u32) -> Vec<u8> {
    encode(RgbImage::from_fn(wid, ht, |x, y| {
        Rgb([(x * 255 / wid) as u8, (y * 255 / ht) as u8, 128])
    }))
}

/// A DJI-style R-JPEG: a grayscale preview plus the raw
/// `u16` raster (1/64 K counts) in APP3 segments.
pub fn radiometric_jpeg(wid: u32, ht: u32, celsius: f32) -> Vec<u8> {
    let base = ((celsius + 273.15) * 64.) as u16;
    let raw: Vec<u16> = (0..wid * ht).map(|i| base + (i % 97) as u16).collect();
    let preview = GrayImage::from_fn(wid, ht, |x, y| Luma([(raw[(y * wid + x) as usize] >> 8) as u8]));
    let payload: Vec<u8> = raw.iter().flat_map(|v| v.to_le_bytes()).collect();

    let mut jpeg = Jpeg::from_bytes(Bytes::from(encode(preview))).unwrap();
    for (i, chunk) in payload.chunks(60000).enumerate() {
        jpeg.segments_mut().insert(
            1 + i,
            JpegSegment::new_with_contents(markers::APP3, Bytes::copy_from_slice(chunk)),
        );
    }
    let mut out = Vec::new();
    jpeg.encoder().write_to(&mut out).unwrap();
    out
}

/// Attach an EXIF block whose IFD0 carries `date_time`
/// (`YYYY:MM:DD HH:MM:SS`).
pub fn with_date_time(encoded: Vec<u8>, date_time: &str) -> Vec<u8> {
    let mut value = date_time.as_bytes().to_vec();
    value.push(0);

    let mut tiff = b"II".to_vec();
    tiff.extend_from_slice(&42u16.to_le_bytes());
    tiff.extend_from_slice(&8u32.to_le_bytes());
    tiff.extend_from_slice(&1u16.to_le_bytes());
    tiff.extend_from_slice(&0x0132u16.to_le_bytes());
    tiff.extend_from_slice(&2u16.to_le_bytes());
    tiff.extend_from_slice(&(value.len() as u32).to_le_bytes());
    tiff.extend_from_slice(&26u32.to_le_bytes());
    tiff.extend_from_slice(&0u32.to_le_bytes());
    tiff.extend_from_slice(&value);

    let mut jpeg = Jpeg::from_bytes(Bytes::from(encoded)).unwrap();
    jpeg.set_exif(Some(Bytes::from(tiff)));
    let mut out = Vec::new();
    jpeg.encoder().write_to(&mut out).unwrap();
    out
}

pub fn write(dir: &Path, name: &str, bytes: &[u8]) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join(name), bytes).unwrap();
}

/// Scratch input and output roots.
pub struct Scratch {
    _dir: tempfile::TempDir,
    pub input: PathBuf,
    pub output: PathBuf,
}

impl Scratch {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("Input Folder");
        let output = dir.path().join("Output Folder");
        fs::create_dir_all(&input).unwrap();
        Scratch {
            _dir: dir,
            input,
            output,
        }
    }

    pub fn job(&self, name: &str) -> PathBuf {
        let path = self.input.join(name);
        fs::create_dir_all(&path).unwrap();
        path
    }

    pub fn config(&self) -> SortConfig {
        SortConfig {
            input: self.input.clone(),
            output: self.output.clone(),
            jobs: Some(2),
            ..Default::default()
        }
    }

    /// File names directly under `rel` in the output root,
    /// sorted.
    pub fn outputs(&self, rel: &str) -> Vec<String> {
        let pattern = format!("{}/{}/*", self.output.display(), rel);
        let mut names: Vec<_> = glob::glob(&pattern)
            .unwrap()
            .map(|p| p.unwrap().file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    pub fn log_lines(&self) -> Vec<String> {
        fs::read_to_string(self.output.join(flame_sort::manifest::LOG_FILE_NAME))
            .unwrap()
            .lines()
            .map(String::from)
            .collect()
    }
}

/// Video source that never touches the file: every video is
/// 640x512, RGB videos (`W` in the name) have `rgb_frames`
/// decimated frames and thermal ones `thermal_frames`.
pub struct FakeVideo {
    pub height: u32,
    pub rgb_frames: usize,
    pub thermal_frames: usize,
}

impl Default for FakeVideo {
    fn default() -> Self {
        FakeVideo {
            height: 512,
            rgb_frames: 3,
            thermal_frames: 2,
        }
    }
}

impl VideoSource for FakeVideo {
    fn probe(&self, _: &Path) -> Result<VideoInfo> {
        Ok(VideoInfo {
            width: 640,
            height: self.height,
        })
    }

    fn frames<'a>(&'a self, path: &Path, _stride: u32) -> Result<Frames<'a>> {
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        let count = if name.contains("_W") {
            self.rgb_frames
        } else {
            self.thermal_frames
        };
        Ok(Box::new((0..count).map(|n| {
            Ok(RgbImage::from_fn(40, 30, move |x, y| {
                Rgb([(x * 6) as u8, (y * 8) as u8, (n * 50) as u8])
            }))
        })))
    }
}
