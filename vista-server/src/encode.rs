use std::io::Cursor;

use anyhow::{Context, Result};
use base64::{prelude::BASE64_STANDARD, Engine};
use image::DynamicImage;

/// Encodes an image as PNG in memory and returns it base64-encoded.
pub fn image_to_base64_png(img: &DynamicImage) -> Result<String> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .context("failed to encode image as PNG")?;
    Ok(BASE64_STANDARD.encode(&bytes))
}
