//! Field-of-view correction of RGB frames.
//!
//! The wide RGB lens sees more than the thermal sensor. A
//! fixed per-model crop box (on the design raw frame) cuts the
//! RGB frame down to the thermal field of view, which is then
//! resized to the thermal design resolution. The transform is
//! a pure function of the camera model and the input frame.
use std::path::Path;

use anyhow::{ensure, Context, Result};
use image::{
    imageops::{self, FilterType},
    RgbImage,
};

use crate::capture::CameraModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FovCorrection {
    /// Design `(width, height)` of the raw RGB frame.
    pub raw: (u32, u32),
    /// `(left, top, right, bottom)` on the design raw frame.
    pub crop: (u32, u32, u32, u32),
    /// Output `(width, height)`.
    pub target: (u32, u32),
}

pub const TARGET: (u32, u32) = (640, 512);

impl FovCorrection {
    pub fn for_model(model: CameraModel) -> Self {
        match model {
            CameraModel::M30T => FovCorrection {
                raw: (4000, 3000),
                crop: (620, 454, 3248, 2486),
                target: TARGET,
            },
            CameraModel::M2EA => FovCorrection {
                raw: (8000, 6000),
                crop: (1360, 824, 6800, 5176),
                target: TARGET,
            },
        }
    }

    /// Crop rectangle `(x, y, width, height)` for a frame of
    /// the given size, scaled from the design frame.
    pub fn crop_rect(&self, wid: u32, ht: u32) -> (u32, u32, u32, u32) {
        let sx = |v: u32| (v as u64 * wid as u64 / self.raw.0 as u64) as u32;
        let sy = |v: u32| (v as u64 * ht as u64 / self.raw.1 as u64) as u32;
        let (l, t, r, b) = self.crop;
        (sx(l), sy(t), sx(r) - sx(l), sy(b) - sy(t))
    }

    pub fn apply(&self, frame: &RgbImage) -> Result<Corrected> {
        let (wid, ht) = frame.dimensions();
        let mut warnings = vec![];
        if (wid, ht) != self.raw {
            warnings.push(format!(
                "raw frame is {}x{}, expected {}x{}; crop box scaled",
                wid, ht, self.raw.0, self.raw.1
            ));
        }

        let (x, y, w, h) = self.crop_rect(wid, ht);
        ensure!(w > 0 && h > 0, "frame of {}x{} too small to correct", wid, ht);

        let cropped = imageops::crop_imm(frame, x, y, w, h).to_image();
        let image = imageops::resize(&cropped, self.target.0, self.target.1, FilterType::CatmullRom);

        if image.dimensions() != self.target {
            let (ow, oh) = image.dimensions();
            warnings.push(format!(
                "corrected frame is {}x{}, expected {}x{}",
                ow, oh, self.target.0, self.target.1
            ));
        }
        Ok(Corrected { image, warnings })
    }
}

/// A corrected frame with any non-fatal warnings raised
/// along the way.
#[derive(Debug)]
pub struct Corrected {
    pub image: RgbImage,
    pub warnings: Vec<String>,
}

pub fn correct(model: CameraModel, frame: &RgbImage) -> Result<Corrected> {
    FovCorrection::for_model(model).apply(frame)
}

pub fn correct_file(model: CameraModel, path: &Path) -> Result<Corrected> {
    let frame = image::open(path)
        .with_context(|| format!("decoding {}", path.display()))?
        .to_rgb8();
    correct(model, &frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(wid: u32, ht: u32) -> RgbImage {
        RgbImage::from_fn(wid, ht, |x, y| image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8]))
    }

    #[test]
    fn design_frames_map_to_target_without_warnings() -> Result<()> {
        let out = correct(CameraModel::M30T, &gradient(4000, 3000))?;
        assert_eq!(out.image.dimensions(), TARGET);
        assert!(out.warnings.is_empty());
        Ok(())
    }

    #[test]
    fn m30t_design_box() {
        let fov = FovCorrection::for_model(CameraModel::M30T);
        assert_eq!(fov.crop_rect(4000, 3000), (620, 454, 2628, 2032));
    }

    #[test]
    fn other_sizes_scale_the_box_and_warn() -> Result<()> {
        let fov = FovCorrection::for_model(CameraModel::M2EA);
        assert_eq!(fov.crop_rect(8000, 6000), (1360, 824, 5440, 4352));
        assert_eq!(fov.crop_rect(800, 600), (136, 82, 544, 435));

        let out = fov.apply(&gradient(800, 600))?;
        assert_eq!(out.image.dimensions(), TARGET);
        assert_eq!(out.warnings.len(), 1);
        Ok(())
    }

    #[test]
    fn correction_is_a_pure_function_of_the_frame() -> Result<()> {
        let frame = gradient(400, 300);
        let a = correct(CameraModel::M30T, &frame)?;
        let b = correct(CameraModel::M30T, &frame)?;
        assert_eq!(a.image, b.image);
        Ok(())
    }

    #[test]
    fn tiny_frames_are_rejected() {
        assert!(correct(CameraModel::M30T, &gradient(1, 1)).is_err());
    }
}
