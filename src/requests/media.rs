//! File extension inference for fetched images

use image::ImageFormat;

/// Extension used when neither the content nor the headers identify the image
pub const FALLBACK_EXTENSION: &str = "bin";

fn extension_from_content_type(content_type: &str) -> Option<&'static str> {
    let mime = content_type.split(';').next()?.trim().to_ascii_lowercase();

    let ext = match mime.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/avif" => "avif",
        "image/bmp" => "bmp",
        _ => return None,
    };

    Some(ext)
}

/// Picks a stable, filename-safe extension: the sniffed image format first, the
/// `Content-Type` header second
pub fn infer_extension(bytes: &[u8], content_type: Option<&str>) -> &'static str {
    image::guess_format(bytes)
        .ok()
        .and_then(|format| format.extensions_str().first().copied())
        .or_else(|| content_type.and_then(extension_from_content_type))
        .unwrap_or(FALLBACK_EXTENSION)
}

/// Whether `ext` names a format that can be decoded for the PDF export
pub fn is_decodable(ext: &str) -> bool {
    ImageFormat::from_extension(ext).is_some_and(|format| format.reading_enabled())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];
    const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10];

    #[test]
    fn test_sniffed_format_wins() {
        assert_eq!(infer_extension(PNG_MAGIC, Some("image/jpeg")), "png");
        assert_eq!(infer_extension(JPEG_MAGIC, None), "jpg");
        assert_eq!(infer_extension(b"GIF89a......", None), "gif");
    }

    #[test]
    fn test_content_type_fallback() {
        assert_eq!(
            infer_extension(b"not an image", Some("image/webp; charset=binary")),
            "webp"
        );
        assert_eq!(infer_extension(b"not an image", Some("IMAGE/JPEG")), "jpg");
    }

    #[test]
    fn test_unknown_content() {
        assert_eq!(infer_extension(b"", None), FALLBACK_EXTENSION);
        assert_eq!(
            infer_extension(b"<html>", Some("text/html")),
            FALLBACK_EXTENSION
        );
    }

    #[test]
    fn test_decodable() {
        assert!(is_decodable("png"));
        assert!(is_decodable("jpg"));
        assert!(!is_decodable(FALLBACK_EXTENSION));
    }
}
