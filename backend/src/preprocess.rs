use image::{DynamicImage, ImageReader, imageops};
use ndarray::Array4;
use std::io::Cursor;

use crate::config::{ImageConfig, TensorLayout};

/// Decodes any format the `image` crate recognises from its magic bytes.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, image::ImageError> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .decode()
}

/// RGB conversion, plain resize (aspect ratio is not preserved), scaling to
/// [0, 1] and a leading batch dimension of one.
pub fn to_batch(image: &DynamicImage, config: &ImageConfig) -> Array4<f32> {
    let rgb = image.to_rgb8();
    let resized = imageops::resize(
        &rgb,
        config.width,
        config.height,
        config.resize_filter.into(),
    );
    let (w, h) = (config.width as usize, config.height as usize);

    match config.layout {
        TensorLayout::Nhwc => Array4::from_shape_fn((1, h, w, 3), |(_, y, x, c)| {
            f32::from(resized.get_pixel(x as u32, y as u32)[c]) / 255.0
        }),
        TensorLayout::Nchw => Array4::from_shape_fn((1, 3, h, w), |(_, c, y, x)| {
            f32::from(resized.get_pixel(x as u32, y as u32)[c]) / 255.0
        }),
    }
}

pub fn preprocess(bytes: &[u8], config: &ImageConfig) -> Result<Array4<f32>, image::ImageError> {
    let image = decode(bytes)?;
    log::debug!(
        "Decoded {}x{} image ({:?})",
        image.width(),
        image.height(),
        image.color()
    );
    Ok(to_batch(&image, config))
}
