//! Still images and conversions between `image` buffers and OpenCV mats

use crate::error::Error;
use anyhow::{Context, Result};
use image::RgbImage;
use opencv::core::{Mat, Scalar, CV_8UC3};
use opencv::prelude::*;
use std::path::Path;

/// Load an image from disk as RGB
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<RgbImage> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(Error::ImageNotFound(path.to_path_buf()).into());
    }

    let image = image::open(path)
        .with_context(|| format!("Failed to decode image {}", path.display()))?
        .to_rgb8();

    let (width, height) = image.dimensions();
    tracing::info!("Image size: {}x{}", width, height);
    Ok(image)
}

/// Copy an RGB image into a BGR `CV_8UC3` mat
pub fn rgb_to_mat(image: &RgbImage) -> Result<Mat> {
    let (width, height) = image.dimensions();
    let mut mat =
        Mat::new_rows_cols_with_default(height as i32, width as i32, CV_8UC3, Scalar::all(0.0))?;

    let bytes = mat.data_bytes_mut()?;
    for (dst, src) in bytes.chunks_exact_mut(3).zip(image.pixels()) {
        dst[0] = src[2];
        dst[1] = src[1];
        dst[2] = src[0];
    }

    Ok(mat)
}

/// Copy a BGR `CV_8UC3` mat into an RGB image
pub fn mat_to_rgb(mat: &Mat) -> Result<RgbImage> {
    if mat.typ() != CV_8UC3 {
        anyhow::bail!("Expected an 8-bit BGR frame, got mat type {}", mat.typ());
    }

    let continuous;
    let mat = if mat.is_continuous() {
        mat
    } else {
        continuous = mat.try_clone()?;
        &continuous
    };

    let width = mat.cols() as u32;
    let height = mat.rows() as u32;
    let bytes = mat.data_bytes()?;

    let mut rgb = Vec::with_capacity(bytes.len());
    for bgr in bytes.chunks_exact(3) {
        rgb.extend_from_slice(&[bgr[2], bgr[1], bgr[0]]);
    }

    RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| anyhow::anyhow!("Frame buffer does not match {}x{}", width, height))
}
