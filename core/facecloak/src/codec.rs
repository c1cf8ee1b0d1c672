use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageEncoder, RgbImage, RgbaImage};

use crate::error::CloakError;

/// Decode JPEG or PNG bytes into an RGB raster.
///
/// Transparent pixels are composited onto white. Empty images are rejected.
pub(crate) fn decode_image(input: &[u8]) -> Result<RgbImage, CloakError> {
    let decoded =
        image::load_from_memory(input).map_err(|e| CloakError::InvalidImage(e.to_string()))?;

    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(CloakError::InvalidImage("image dimensions are zero".to_string()));
    }

    Ok(if decoded.color().has_alpha() {
        flatten_alpha(&decoded)
    } else {
        decoded.to_rgb8()
    })
}

/// Flatten alpha channel by compositing onto a white background.
pub(crate) fn flatten_alpha(image: &DynamicImage) -> RgbImage {
    let rgba: RgbaImage = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = a as f32 / 255.0;
        let over_white = |c: u8| (c as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        image::Rgb([over_white(r), over_white(g), over_white(b)])
    })
}

/// Encode an RGB raster as baseline JPEG at `quality` (1–100).
pub(crate) fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, CloakError> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| CloakError::EncodeError(e.to_string()))?;
    Ok(buffer)
}
