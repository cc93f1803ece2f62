use anyhow::{bail, Result};
use ndarray::Array2;
use std::{
    mem::{size_of, MaybeUninit},
    path::Path,
};

use dji_thermal_sys::*;

use crate::{decode::ThermalDecoder, error::RegenError, temperature::ThermalFrame};

/// An R-JPEG opened through the DJI thermal SDK. The SDK
/// handle is released on drop.
#[derive(Debug)]
pub struct RJpeg {
    handle: DIRP_HANDLE,
    // The SDK reads from this buffer for the handle's lifetime.
    _bytes: Vec<u8>,
}

impl RJpeg {
    pub fn try_from_path(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::try_from_bytes(data)
    }

    pub fn try_from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let size = bytes.len() as i32;
        let mut handle = MaybeUninit::uninit();
        let ret = unsafe { dirp_create_from_rjpeg(bytes.as_ptr(), size, handle.as_mut_ptr()) };
        if ret != 0 {
            bail!("could not parse rjpeg (dirp error {})", ret);
        }

        Ok(RJpeg {
            handle: unsafe { handle.assume_init() },
            _bytes: bytes,
        })
    }

    pub fn dimensions(&self) -> Result<(i32, i32)> {
        let mut resolution = MaybeUninit::uninit();
        let ret = unsafe { dirp_get_rjpeg_resolution(self.handle, resolution.as_mut_ptr()) };
        if ret != 0 {
            bail!("could not read rjpeg dimensions (dirp error {})", ret);
        }

        let resolution = unsafe { resolution.assume_init() };
        Ok((resolution.width, resolution.height))
    }

    pub fn temperatures(&self) -> Result<Array2<f32>> {
        let (width, height) = self.dimensions()?;
        let num_values = width * height;

        let mut values = Vec::with_capacity(num_values as usize);
        let ret = unsafe {
            dirp_measure_ex(
                self.handle,
                values.as_mut_ptr(),
                num_values * size_of::<f32>() as i32,
            )
        };
        if ret != 0 {
            bail!("could not calculate rjpeg temperatures (dirp error {})", ret);
        }
        unsafe {
            values.set_len(num_values as usize);
        }

        let values = Array2::from_shape_vec((height as usize, width as usize), values)?;
        Ok(values)
    }
}

impl Drop for RJpeg {
    fn drop(&mut self) {
        unsafe {
            dirp_destroy(self.handle);
        }
    }
}

/// Decoder backed by the vendor SDK's own measurement
/// routine.
#[derive(Debug, Default, Clone, Copy)]
pub struct DjiSdkDecoder;

impl ThermalDecoder for DjiSdkDecoder {
    fn decode(&self, path: &Path) -> Result<ThermalFrame, RegenError> {
        let rjpeg = RJpeg::try_from_path(path).map_err(|_| RegenError::MissingCalibration)?;
        let celsius = rjpeg.temperatures().map_err(RegenError::Decode)?;
        Ok(ThermalFrame { celsius })
    }
}
