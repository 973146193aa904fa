//! Body validation for fetched assets.
//!
//! Some origin misconfigurations answer an attachment download with HTTP 200
//! and an HTML error or login page. Such bodies must never be written to disk
//! as if they were the asset.

/// Leading markers of an HTML document, compared case-insensitively after
/// skipping whitespace and a UTF-8 byte-order mark.
const HTML_MARKERS: &[&str] = &["<!doctype html", "<html", "<head", "<body"];

/// Generic types that tell nothing about the payload.
const GENERIC_TYPES: &[&str] = &["application/octet-stream", "binary/octet-stream", "application/x-download"];

/// Checks that a fetched body is the asset and not a disguised error page.
///
/// Returns the verified content type on success, or the rejection reason.
///
/// # Errors
///
/// Returns a human-readable reason when the body is empty, declared as HTML,
/// declared as JSON for a non-JSON file, or starts with HTML markup.
///
/// # Examples
///
/// ```
/// use exporter_core::assets::validate_body;
///
/// assert!(validate_body(Some("image/png"), b"<html><body>error</body></html>", "a.png").is_err());
/// assert_eq!(validate_body(None, b"\x89PNG\r\n\x1a\nrest", "a.png").unwrap(), "image/png");
/// ```
pub fn validate_body(declared: Option<&str>, body: &[u8], filename: &str) -> Result<String, String> {
    if body.is_empty() {
        return Err("empty body".to_string());
    }

    let declared = declared.map(mime_essence);
    if let Some(mime) = declared.as_deref() {
        if mime.contains("html") {
            return Err(format!("declared content type {mime} is an HTML page"));
        }
        if mime == "application/json" && !filename.to_ascii_lowercase().ends_with(".json") {
            return Err("declared content type application/json is an API error body".to_string());
        }
    }

    if starts_with_html(body) {
        return Err("body starts with HTML markup".to_string());
    }

    let content_type = match declared {
        Some(mime) if !mime.is_empty() && !GENERIC_TYPES.contains(&mime.as_str()) => mime,
        _ => sniff_content_type(body)
            .or_else(|| content_type_from_extension(filename))
            .unwrap_or("application/octet-stream")
            .to_string(),
    };
    Ok(content_type)
}

fn mime_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn starts_with_html(body: &[u8]) -> bool {
    let body = body.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(body);
    let start = body
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(body.len());
    let head: Vec<u8> = body[start..]
        .iter()
        .take(32)
        .map(u8::to_ascii_lowercase)
        .collect();
    HTML_MARKERS
        .iter()
        .any(|marker| head.starts_with(marker.as_bytes()))
}

/// Identifies common asset formats from their magic bytes.
#[must_use]
pub fn sniff_content_type(body: &[u8]) -> Option<&'static str> {
    if body.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if body.starts_with(b"\xFF\xD8\xFF") {
        Some("image/jpeg")
    } else if body.starts_with(b"GIF87a") || body.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if body.len() >= 12 && &body[0..4] == b"RIFF" && &body[8..12] == b"WEBP" {
        Some("image/webp")
    } else if body.starts_with(b"%PDF-") {
        Some("application/pdf")
    } else if body.starts_with(b"PK\x03\x04") {
        Some("application/zip")
    } else {
        let head = String::from_utf8_lossy(&body[..body.len().min(256)]).to_ascii_lowercase();
        let head = head.trim_start();
        if head.starts_with("<svg") || (head.starts_with("<?xml") && head.contains("<svg")) {
            Some("image/svg+xml")
        } else {
            None
        }
    }
}

/// Maps a file extension to a content type.
#[must_use]
pub fn content_type_from_extension(filename: &str) -> Option<&'static str> {
    let extension = filename.rsplit_once('.')?.1.to_ascii_lowercase();
    let mime = match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "json" => "application/json",
        "txt" | "log" => "text/plain",
        "csv" => "text/csv",
        "css" => "text/css",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "mp4" => "video/mp4",
        "mp3" => "audio/mpeg",
        _ => return None,
    };
    Some(mime)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";

    #[test]
    fn test_rejects_png_declared_html_body() {
        let result = validate_body(Some("image/png"), b"<html><head><title>Error</title>", "x.png");
        assert!(result.unwrap_err().contains("HTML"));
    }

    #[test]
    fn test_rejects_doctype_with_leading_whitespace_and_bom() {
        let body = b"\xEF\xBB\xBF\n  <!DOCTYPE HTML PUBLIC>";
        assert!(validate_body(Some("application/octet-stream"), body, "x.pdf").is_err());
    }

    #[test]
    fn test_rejects_declared_html() {
        assert!(validate_body(Some("text/html; charset=UTF-8"), PNG, "x.png").is_err());
    }

    #[test]
    fn test_rejects_json_error_for_binary() {
        let body = br#"{"statusCode":404,"message":"not found"}"#;
        assert!(validate_body(Some("application/json"), body, "x.png").is_err());
        assert!(validate_body(Some("application/json"), body, "data.json").is_ok());
    }

    #[test]
    fn test_rejects_empty_body() {
        assert_eq!(validate_body(Some("image/png"), b"", "x.png").unwrap_err(), "empty body");
    }

    #[test]
    fn test_accepts_declared_type() {
        assert_eq!(validate_body(Some("Image/PNG; q=1"), PNG, "x.png").unwrap(), "image/png");
    }

    #[test]
    fn test_generic_type_is_sniffed_then_guessed() {
        assert_eq!(validate_body(Some("application/octet-stream"), PNG, "x.bin").unwrap(), "image/png");
        assert_eq!(validate_body(None, b"plain words", "notes.txt").unwrap(), "text/plain");
        assert_eq!(validate_body(None, b"\x00\x01", "blob").unwrap(), "application/octet-stream");
    }

    #[test]
    fn test_sniff_svg_and_pdf() {
        assert_eq!(sniff_content_type(b"<?xml version=\"1.0\"?><svg xmlns=\"...\">"), Some("image/svg+xml"));
        assert_eq!(sniff_content_type(b"%PDF-1.7"), Some("application/pdf"));
        assert_eq!(sniff_content_type(b"RIFF\x00\x00\x00\x00WEBPVP8 "), Some("image/webp"));
    }
}
