//! Converting between image files and `(1, height, width, 3)` tensors with
//! values in `[0, 1]`.

use std::path::Path;

use image::{imageops::FilterType, RgbImage};
use instafly_core::{prelude::Cpu, tensor::Tensor};

use crate::{model::ImageSize, Error};

/// Reads the image at `path`, resizes it to `size` (nearest neighbour) unless
/// it already has that size, and scales every channel into `[0, 1]`.
pub fn load_image_tensor<P: AsRef<Path>>(
    device: &Cpu,
    path: P,
    size: ImageSize,
) -> Result<Tensor, Error> {
    let img = image::open(path.as_ref())?;
    let (w, h) = (size.width as u32, size.height as u32);
    let rgb = if img.width() == w && img.height() == h {
        img.to_rgb8()
    } else {
        img.resize_exact(w, h, FilterType::Nearest).to_rgb8()
    };
    rgb_to_tensor(device, &rgb)
}

pub fn rgb_to_tensor(device: &Cpu, img: &RgbImage) -> Result<Tensor, Error> {
    let (w, h) = img.dimensions();
    let data = img.as_raw().iter().map(|&v| v as f32 / 255.0).collect();
    Ok(device.try_tensor_from_vec(data, [1, h as usize, w as usize, 3])?)
}

/// Reverses [rgb_to_tensor]: values are scaled by 255, rounded and clamped to
/// the valid pixel range.
pub fn tensor_to_rgb(t: &Tensor) -> Result<RgbImage, Error> {
    let (h, w) = match t.shape().dims() {
        &[1, h, w, 3] => (h, w),
        _ => return Err(Error::NotAnImage(t.shape().clone())),
    };
    let raw = t
        .as_slice()
        .iter()
        .map(|v| (v * 255.0).round().clamp(0.0, 255.0) as u8)
        .collect();
    RgbImage::from_raw(w as u32, h as u32, raw).ok_or_else(|| Error::NotAnImage(t.shape().clone()))
}

/// Writes `t` to `path`, with the format picked from the extension.
pub fn save_image_tensor<P: AsRef<Path>>(t: &Tensor, path: P) -> Result<(), Error> {
    tensor_to_rgb(t)?.save(path.as_ref())?;
    Ok(())
}
