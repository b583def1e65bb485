//! Image normalization for vision requests
//!
//! Every image sent to a chat-completion backend is resampled to roughly one
//! megapixel (aspect ratio preserved), encoded as PNG, and base64-encoded.

use crate::error::{Error, Result};
use crate::types::EncodedImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;

/// Pixel budget of a normalized image
pub const TARGET_PIXELS: u64 = 1_000_000;

/// Output dimensions for an input of `width` x `height`
///
/// `new_h = round(sqrt(TARGET_PIXELS / r))`, `new_w = round(new_h * r)` with
/// `r = width / height`. Each dimension is at least 1; when one side sits at
/// that floor the other is capped at the pixel budget.
pub fn target_dimensions(width: u32, height: u32) -> Result<(u32, u32)> {
    if width == 0 || height == 0 {
        return Err(Error::image(format!(
            "image has a zero dimension ({}x{})",
            width, height
        )));
    }

    let ratio = f64::from(width) / f64::from(height);
    let budget = TARGET_PIXELS as f64;
    let mut new_h = (budget / ratio).sqrt().round().max(1.0);
    let mut new_w = (new_h * ratio).round().max(1.0);

    if new_h <= 1.0 {
        new_w = new_w.min(budget);
    }
    if new_w <= 1.0 {
        new_h = new_h.min(budget);
    }

    Ok((new_w as u32, new_h as u32))
}

/// Resize to the pixel budget and encode as base64 PNG
pub fn normalize(image: &DynamicImage) -> Result<EncodedImage> {
    let (width, height) = image.dimensions();
    let (new_w, new_h) = target_dimensions(width, height)?;

    let resized;
    let output = if u64::from(width) * u64::from(height) == TARGET_PIXELS {
        image
    } else {
        resized = image.resize_exact(new_w, new_h, FilterType::Lanczos3);
        &resized
    };

    let mut png = Vec::new();
    output
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| Error::image(format!("PNG encoding failed: {}", e)))?;

    tracing::debug!(
        from = %format!("{}x{}", width, height),
        to = %format!("{}x{}", output.width(), output.height()),
        png_bytes = png.len(),
        "normalized image"
    );

    Ok(EncodedImage::from_base64(STANDARD.encode(&png)))
}

/// Decode an uploaded file (format sniffed from its bytes) and normalize it
pub fn normalize_bytes(bytes: &[u8]) -> Result<EncodedImage> {
    if bytes.is_empty() {
        return Err(Error::image("image data is empty"));
    }

    let image = image::load_from_memory(bytes)
        .map_err(|e| Error::image(format!("failed to decode image: {}", e)))?;
    normalize(&image)
}

/// Decode base64 PNG text back into an image
pub fn decode(encoded: &EncodedImage) -> Result<DynamicImage> {
    let bytes = STANDARD
        .decode(encoded.as_str())
        .map_err(|e| Error::image(format!("invalid base64 encoding: {}", e)))?;
    image::load_from_memory_with_format(&bytes, ImageFormat::Png)
        .map_err(|e| Error::image(format!("failed to decode PNG: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 5 % 256) as u8, 128])
        }))
    }

    #[test]
    fn test_target_dimensions_four_by_three() {
        assert_eq!(target_dimensions(40, 30).unwrap(), (1155, 866));
        assert_eq!(target_dimensions(4000, 3000).unwrap(), (1155, 866));
    }

    #[test]
    fn test_target_dimensions_square() {
        assert_eq!(target_dimensions(64, 64).unwrap(), (1000, 1000));
    }

    #[test]
    fn test_target_dimensions_stay_near_budget() {
        for (w, h) in [(1920, 1080), (1080, 1920), (333, 777), (5000, 17), (3, 2)] {
            let (new_w, new_h) = target_dimensions(w, h).unwrap();
            let ratio = w as f64 / h as f64;
            let exact_h = (TARGET_PIXELS as f64 / ratio).sqrt();

            assert!((new_h as f64 - exact_h).abs() <= 1.0, "{}x{}", w, h);
            assert!((new_w as f64 - new_h as f64 * ratio).abs() <= 1.0, "{}x{}", w, h);

            let pixels = new_w as f64 * new_h as f64;
            let slack = new_w as f64 + new_h as f64 + 1.0;
            assert!((pixels - TARGET_PIXELS as f64).abs() <= slack, "{}x{}", w, h);
        }
    }

    #[test]
    fn test_target_dimensions_extreme_ratio_clamps() {
        let (new_w, new_h) = target_dimensions(1, 100_000).unwrap();
        assert!(new_w >= 1);
        assert_eq!(new_h, 316_228);
    }

    #[test]
    fn test_target_dimensions_one_pixel_strips_keep_budget() {
        for (w, h) in [(4_000_000, 1), (10_000_000, 1), (1, 10_000_000)] {
            let (new_w, new_h) = target_dimensions(w, h).unwrap();
            let pixels = u64::from(new_w) * u64::from(new_h);
            let slack = u64::from(new_w) + u64::from(new_h);
            assert!(pixels <= TARGET_PIXELS + slack, "{}x{} -> {}x{}", w, h, new_w, new_h);
            assert!(new_w >= 1 && new_h >= 1);
        }

        assert_eq!(target_dimensions(4_000_000, 1).unwrap(), (1_000_000, 1));
        assert_eq!(target_dimensions(1, 10_000_000).unwrap(), (1, 1_000_000));
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let err = target_dimensions(0, 10).unwrap_err();
        assert!(matches!(err, Error::ImageProcessing(_)));

        let empty = DynamicImage::new_rgb8(0, 0);
        assert!(matches!(normalize(&empty), Err(Error::ImageProcessing(_))));
    }

    #[test]
    fn test_normalize_resizes_and_round_trips() {
        let encoded = normalize(&gradient(40, 30)).unwrap();
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.dimensions(), (1155, 866));

        let bytes = STANDARD.decode(encoded.as_str()).unwrap();
        assert_eq!(&bytes[..4], &[0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let image = gradient(50, 20);
        assert_eq!(normalize(&image).unwrap(), normalize(&image).unwrap());
    }

    #[test]
    fn test_exact_budget_is_not_resampled() {
        let image = gradient(1000, 1000);
        let decoded = decode(&normalize(&image).unwrap()).unwrap();
        assert_eq!(decoded.to_rgb8(), image.to_rgb8());
    }

    #[test]
    fn test_normalize_bytes_decodes_upload() {
        let mut jpeg = Vec::new();
        gradient(64, 48)
            .write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)
            .unwrap();

        let decoded = decode(&normalize_bytes(&jpeg).unwrap()).unwrap();
        assert_eq!(decoded.dimensions(), (1155, 866));
    }

    #[test]
    fn test_normalize_bytes_rejects_garbage() {
        assert!(matches!(normalize_bytes(&[]), Err(Error::ImageProcessing(_))));
        assert!(matches!(
            normalize_bytes(b"definitely not an image"),
            Err(Error::ImageProcessing(_))
        ));
    }
}
