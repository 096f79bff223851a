use std::io::Cursor;

use glimpse_contracts::layout::{compute_row_layout, RowLayout};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

use crate::error::ImageDecodeError;

/// PNG-encoded thumbnail ready to be embedded in the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Decodes image bytes into plain RGB, compositing any alpha onto white.
///
/// Palette and grayscale sources are expanded by the decoder, so every mode
/// ends up as 8-bit RGB.
pub fn decode_flattened(bytes: &[u8]) -> Result<RgbImage, ImageDecodeError> {
    let decoded = image::load_from_memory(bytes).map_err(|err| ImageDecodeError {
        message: err.to_string(),
    })?;
    Ok(flatten_on_white(decoded))
}

fn flatten_on_white(image: DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.into_rgb8();
    }
    let rgba = image.into_rgba8();
    let mut flat = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = u16::from(a);
        let blend = |channel: u8| -> u8 {
            ((u16::from(channel) * alpha + 255 * (255 - alpha) + 127) / 255) as u8
        };
        flat.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }
    flat
}

/// Resizes `image` to exactly `width` x `height` and encodes it as PNG.
pub fn render_thumbnail(
    image: &RgbImage,
    width: u32,
    height: u32,
) -> Result<Thumbnail, ImageDecodeError> {
    let resized = image::imageops::resize(image, width, height, FilterType::Lanczos3);

    let mut png = Vec::new();
    DynamicImage::ImageRgb8(resized)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|err| ImageDecodeError {
            message: format!("thumbnail encoding failed: {err}"),
        })?;
    Ok(Thumbnail { png, width, height })
}

/// Decodes the source, sizes its row from `analysis_text`, and renders the thumbnail.
pub fn thumbnail_for_row(
    bytes: &[u8],
    analysis_text: &str,
) -> Result<(Thumbnail, RowLayout), ImageDecodeError> {
    let image = decode_flattened(bytes)?;
    let layout = compute_row_layout(analysis_text, image.width(), image.height());
    let thumbnail = render_thumbnail(&image, layout.thumbnail_width, layout.thumbnail_height)?;
    Ok((thumbnail, layout))
}
