//! Raw-bytes to text conversion.

use super::types::{ExtraInfo, ParseError};

/// Converts the raw bytes of a document into plain text.
pub trait DocumentParser: Send + Sync {
    /// Parse `bytes`, using `info` for diagnostics and format hints.
    fn parse(&self, bytes: &[u8], info: &ExtraInfo) -> Result<String, ParseError>;
}

/// Parser for plain-text formats (`txt`, `md`, `csv`, ...).
///
/// Decodes strictly as UTF-8 and strips a leading byte-order mark. Mis-encoded files fail with
/// [`ParseError::InvalidEncoding`]; valid UTF-8 carrying NUL bytes is binary content and fails
/// with [`ParseError::Unsupported`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TextParser;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

impl DocumentParser for TextParser {
    fn parse(&self, bytes: &[u8], info: &ExtraInfo) -> Result<String, ParseError> {
        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        let text = std::str::from_utf8(bytes).map_err(|source| ParseError::InvalidEncoding {
            file_name: info.file_name.clone(),
            source,
        })?;
        if text.contains('\0') {
            return Err(ParseError::Unsupported(info.file_name.clone()));
        }
        tracing::trace!(
            file_name = %info.file_name,
            source = %info.source,
            chars = text.len(),
            "Parsed document"
        );
        Ok(text.replace("\r\n", "\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> ExtraInfo {
        ExtraInfo {
            file_name: "notes.txt".into(),
            source: "folder".into(),
        }
    }

    #[test]
    fn parses_utf8_and_strips_bom() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice("héllo\r\nworld".as_bytes());
        let text = TextParser.parse(&bytes, &info()).expect("text");
        assert_eq!(text, "héllo\nworld");
    }

    #[test]
    fn rejects_invalid_utf8_with_file_name() {
        let error = TextParser.parse(&[0xff, 0xfe, 0x00], &info()).unwrap_err();
        assert!(error.to_string().contains("notes.txt"));
        assert!(matches!(error, ParseError::InvalidEncoding { .. }));
    }

    #[test]
    fn rejects_binary_content_that_happens_to_be_utf8() {
        let error = TextParser.parse(b"PK\x03\x04\0\0payload", &info()).unwrap_err();
        assert!(matches!(error, ParseError::Unsupported(ref name) if name == "notes.txt"));
    }
}
