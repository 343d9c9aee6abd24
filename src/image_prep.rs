//! Image preprocessing: bound the diagram payload before it reaches the
//! model gateway.
//!
//! User-uploaded architecture diagrams can be arbitrarily large; gateway
//! request bodies cannot. Every image is decoded, downscaled to fit the
//! configured bounding box (aspect ratio preserved, never upscaled),
//! re-encoded as JPEG, and base64-wrapped. The resize filter is fixed so
//! the same input bytes always produce the same payload.

use crate::config::ImageLimits;
use crate::error::ThreatDocError;
use crate::transport::ImagePayload;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::GenericImageView;
use std::io::Cursor;
use tracing::debug;

/// Decode, downscale, and re-encode an uploaded diagram into the payload
/// shape the model gateway accepts.
pub fn prepare_image(bytes: &[u8], limits: &ImageLimits) -> Result<ImagePayload, ThreatDocError> {
    let img = image::load_from_memory(bytes).map_err(|e| ThreatDocError::ImageUnsupported {
        detail: e.to_string(),
    })?;

    let (w, h) = img.dimensions();
    let img = if w > limits.max_width || h > limits.max_height {
        img.resize(limits.max_width, limits.max_height, FilterType::Triangle)
    } else {
        img
    };

    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut buf), limits.jpeg_quality);
    img.to_rgb8()
        .write_with_encoder(encoder)
        .map_err(|e| ThreatDocError::ImageUnsupported {
            detail: format!("JPEG re-encode failed: {e}"),
        })?;

    debug!(
        original = format!("{w}x{h}"),
        resized = format!("{}x{}", img.width(), img.height()),
        jpeg_bytes = buf.len(),
        "prepared diagram payload"
    );

    Ok(ImagePayload {
        mime_type: "image/jpeg".to_string(),
        data: STANDARD.encode(&buf),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            width,
            height,
            Rgba([10, 120, 200, 255]),
        ));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn small_image_keeps_dimensions() {
        let payload = prepare_image(&png_bytes(100, 50), &ImageLimits::default()).unwrap();
        assert_eq!(payload.mime_type, "image/jpeg");
        let jpeg = STANDARD.decode(&payload.data).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (100, 50));
    }

    #[test]
    fn oversized_image_fits_bounding_box() {
        let limits = ImageLimits {
            max_width: 64,
            max_height: 48,
            jpeg_quality: 70,
        };
        let payload = prepare_image(&png_bytes(640, 240), &limits).unwrap();
        let jpeg = STANDARD.decode(&payload.data).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        let (w, h) = decoded.dimensions();
        assert!(w <= 64 && h <= 48, "got {w}x{h}");
        // Aspect ratio preserved: 640x240 scales to 64x24.
        assert_eq!((w, h), (64, 24));
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        let err = prepare_image(b"definitely not an image", &ImageLimits::default()).unwrap_err();
        assert!(matches!(err, ThreatDocError::ImageUnsupported { .. }));
    }

    #[test]
    fn output_is_deterministic() {
        let bytes = png_bytes(300, 300);
        let a = prepare_image(&bytes, &ImageLimits::default()).unwrap();
        let b = prepare_image(&bytes, &ImageLimits::default()).unwrap();
        assert_eq!(a, b);
    }
}
