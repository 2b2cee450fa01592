use anyhow::{anyhow, Result};
use base64::{engine::general_purpose, Engine as _};

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    infer::get(data).map(|kind| kind.mime_type().to_string())
}

/// Splits a `data:<mime>;base64,<payload>` URL into its MIME type and decoded bytes.
///
/// When the header carries no usable MIME type, the bytes are sniffed instead.
pub fn decode_data_url(url: &str) -> Result<(String, Vec<u8>)> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| anyhow!("Image URL is not a data URL"))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| anyhow!("Data URL is missing its payload"))?;
    if !header.ends_with(";base64") {
        return Err(anyhow!("Data URL is not base64 encoded"));
    }

    let bytes = general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|err| anyhow!("Failed to decode base64 image data: {}", err))?;
    if bytes.is_empty() {
        return Err(anyhow!("Data URL payload is empty"));
    }

    let declared = header.trim_end_matches(";base64").trim();
    let mime_type = if declared.starts_with("image/") {
        declared.to_string()
    } else {
        detect_mime_type(&bytes).unwrap_or_else(|| "application/octet-stream".to_string())
    };
    Ok((mime_type, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn decodes_declared_mime_type() {
        let encoded = general_purpose::STANDARD.encode(b"hello");
        let (mime, bytes) = decode_data_url(&format!("data:image/webp;base64,{encoded}")).unwrap();
        assert_eq!(mime, "image/webp");
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn sniffs_mime_type_when_header_is_bare() {
        let encoded = general_purpose::STANDARD.encode(PNG_SIGNATURE);
        let (mime, _) = decode_data_url(&format!("data:;base64,{encoded}")).unwrap();
        assert_eq!(mime, "image/png");
    }

    #[test]
    fn rejects_malformed_urls() {
        assert!(decode_data_url("https://example.com/a.png").is_err());
        assert!(decode_data_url("data:image/png;base64").is_err());
        assert!(decode_data_url("data:image/png,plain").is_err());
        assert!(decode_data_url("data:image/png;base64,!!!").is_err());
        assert!(decode_data_url("data:image/png;base64,").is_err());
    }
}
