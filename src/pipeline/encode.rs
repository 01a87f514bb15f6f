//! Image encoding: rendered pages and stored images → base64 [`ImagePayload`].
//!
//! Rendered PDF pages are re-encoded as JPEG. At 2× scale a PNG of a scanned
//! page easily exceeds several megabytes; JPEG keeps a chunk of five pages
//! well under provider upload limits, and scans carry JPEG artefacts anyway.
//! Images that already exist in storage are passed through untouched.

use crate::pipeline::segment::ImagePayload;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use tracing::debug;

/// Encode a rasterised page as a base64 JPEG.
pub fn encode_page(img: &DynamicImage) -> Result<ImagePayload, image::ImageError> {
    // The JPEG encoder rejects alpha channels; pdfium renders RGBA.
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut buf = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)?;

    let data = STANDARD.encode(&buf);
    debug!("Encoded page → {} bytes base64", data.len());

    Ok(ImagePayload {
        data,
        mime_type: "image/jpeg".to_string(),
    })
}

/// Wrap stored image bytes, deriving the MIME type from the reference name.
pub fn encode_bytes(bytes: &[u8], reference: &str) -> ImagePayload {
    ImagePayload {
        data: STANDARD.encode(bytes),
        mime_type: mime_for(reference).to_string(),
    }
}

/// MIME type from a file extension; unknown extensions are assumed JPEG.
pub fn mime_for(reference: &str) -> &'static str {
    let ext = reference
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_rgba_page_as_jpeg() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let data = encode_page(&img).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/jpeg");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        // JPEG SOI marker
        assert_eq!(&decoded[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn encode_bytes_passes_through() {
        let payload = encode_bytes(b"\x89PNG....", "uploads/fig-1.PNG");
        assert_eq!(payload.mime_type, "image/png");
        assert_eq!(STANDARD.decode(&payload.data).unwrap(), b"\x89PNG....");
    }

    #[test]
    fn mime_defaults_to_jpeg() {
        assert_eq!(mime_for("scan.jpeg"), "image/jpeg");
        assert_eq!(mime_for("scan"), "image/jpeg");
        assert_eq!(mime_for("diagram.webp"), "image/webp");
    }
}
