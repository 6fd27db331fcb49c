use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::io::Reader as ImageReader;
use image::{ColorType, ImageFormat};
use std::io::Cursor;

use super::error::MediaError;
use super::settings::UploadLimits;

pub const OUTPUT_FORMAT: &str = "JPEG";
pub const OUTPUT_CONTENT_TYPE: &str = "image/jpeg";
const JPEG_QUALITY: u8 = 85;

/// An upload after normalization to JPEG
#[derive(Debug)]
pub struct NormalizedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub source_format: String,
}

/// Decode base64 image data, accepting an optional `data:<mime>;base64,` prefix.
pub fn decode_payload(image_data: &str, limits: &UploadLimits) -> Result<Vec<u8>, MediaError> {
    let encoded = match image_data.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => image_data,
    };
    // Clients wrap long base64 lines
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| MediaError::InvalidImage(format!("base64 decode failed: {}", e)))?;

    if bytes.len() > limits.max_image_bytes {
        return Err(MediaError::Validation(format!(
            "Image too large. Max size: {} bytes",
            limits.max_image_bytes
        )));
    }
    Ok(bytes)
}

/// Decode any supported image and re-encode it as RGB JPEG (alpha dropped).
pub fn normalize(bytes: &[u8], limits: &UploadLimits) -> Result<NormalizedImage, MediaError> {
    let format = image::guess_format(bytes)
        .map_err(|e| MediaError::InvalidImage(format!("unrecognized format: {}", e)))?;

    // Check the header before paying for a full decode
    let (width, height) = ImageReader::with_format(Cursor::new(bytes), format)
        .into_dimensions()
        .map_err(|e| MediaError::InvalidImage(e.to_string()))?;
    if width > limits.max_dimension || height > limits.max_dimension {
        return Err(MediaError::Validation(format!(
            "Image dimensions too large. Max: {}x{}",
            limits.max_dimension, limits.max_dimension
        )));
    }

    let decoded = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| MediaError::InvalidImage(e.to_string()))?;
    let rgb = decoded.to_rgb8();

    let mut output = Vec::new();
    JpegEncoder::new_with_quality(&mut output, JPEG_QUALITY)
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
        .map_err(|e| MediaError::InvalidImage(format!("jpeg encode failed: {}", e)))?;

    Ok(NormalizedImage {
        bytes: output,
        width: rgb.width(),
        height: rgb.height(),
        source_format: format_name(format),
    })
}

fn format_name(format: ImageFormat) -> String {
    format!("{:?}", format).to_uppercase()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};

    /// Encode a solid RGBA image in `format` and return it base64-encoded
    pub(crate) fn encoded_image(width: u32, height: u32, format: ImageFormat) -> String {
        let img = RgbaImage::from_pixel(width, height, Rgba([200, 30, 30, 128]));
        let mut out = Vec::new();
        let img = match format {
            ImageFormat::Jpeg => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(img).to_rgb8()),
            _ => DynamicImage::ImageRgba8(img),
        };
        img.write_to(&mut Cursor::new(&mut out), format).unwrap();
        STANDARD.encode(out)
    }

    #[test]
    fn png_with_alpha_becomes_jpeg() {
        let limits = UploadLimits::default();
        let bytes = decode_payload(&encoded_image(7, 3, ImageFormat::Png), &limits).unwrap();

        let normalized = normalize(&bytes, &limits).unwrap();
        assert_eq!((normalized.width, normalized.height), (7, 3));
        assert_eq!(normalized.source_format, "PNG");
        assert!(normalized.bytes.starts_with(&[0xFF, 0xD8, 0xFF]));
    }

    #[test]
    fn data_url_prefix_is_accepted() {
        let limits = UploadLimits::default();
        let url = format!("data:image/png;base64,{}", encoded_image(2, 2, ImageFormat::Png));
        let bytes = decode_payload(&url, &limits).unwrap();
        assert_eq!(normalize(&bytes, &limits).unwrap().width, 2);
    }

    #[test]
    fn invalid_base64_is_an_image_error() {
        let err = decode_payload("invalid_base64_data!!", &UploadLimits::default()).unwrap_err();
        assert!(matches!(err, MediaError::InvalidImage(_)));
    }

    #[test]
    fn non_image_bytes_are_rejected() {
        let err = normalize(b"definitely not an image", &UploadLimits::default()).unwrap_err();
        assert!(matches!(err, MediaError::InvalidImage(_)));
    }

    #[test]
    fn oversized_payloads_are_rejected() {
        let limits = UploadLimits {
            max_image_bytes: 16,
            ..UploadLimits::default()
        };
        let err = decode_payload(&encoded_image(10, 10, ImageFormat::Png), &limits).unwrap_err();
        assert!(matches!(err, MediaError::Validation(_)));
    }

    #[test]
    fn oversized_dimensions_are_rejected() {
        let limits = UploadLimits {
            max_dimension: 8,
            ..UploadLimits::default()
        };
        let bytes = decode_payload(&encoded_image(9, 2, ImageFormat::Png), &limits).unwrap();
        assert!(matches!(normalize(&bytes, &limits), Err(MediaError::Validation(_))));
    }
}
