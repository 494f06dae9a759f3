//! Best-effort text extraction from uploaded files.

use crate::error::{Result, VerbaError};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
/// Bytes inspected for NUL when deciding text vs binary.
const SNIFF_LEN: usize = 8192;
const FALLBACK_NAME: &str = "upload";

/// A file received with a chat turn.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(file_name: impl Into<String>, content_type: Option<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let file_name = match file_name.trim() {
            "" => FALLBACK_NAME.to_string(),
            trimmed => trimmed.to_string(),
        };
        Self {
            file_name,
            content_type: content_type.filter(|c| !c.trim().is_empty()),
            bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Declared content type, or one guessed from the file extension.
    pub fn mime_type(&self) -> String {
        match &self.content_type {
            Some(declared) => declared.clone(),
            None => self.guessed_mime_type(),
        }
    }

    /// The type implied by the file name alone.
    pub fn guessed_mime_type(&self) -> String {
        mime_guess::from_path(&self.file_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    }

    pub fn ensure_within(&self, max_bytes: usize) -> Result<()> {
        if self.len() > max_bytes {
            return Err(VerbaError::InvalidInput(format!(
                "File is too large ({} bytes, limit {max_bytes})",
                self.len()
            )));
        }
        Ok(())
    }

    pub fn extract(&self, max_chars: usize) -> Extracted {
        extract_text(self, max_chars)
    }
}

/// What could be read out of an attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    Text { content: String, truncated: bool },
    Binary { placeholder: String },
}

impl Extracted {
    /// Text suitable for a stored message or a prompt.
    pub fn as_prompt_text(&self) -> String {
        match self {
            Self::Text { content, truncated } => {
                if *truncated {
                    format!("{content}\n[truncated]")
                } else {
                    content.clone()
                }
            }
            Self::Binary { placeholder } => placeholder.clone(),
        }
    }
}

fn looks_binary(bytes: &[u8]) -> bool {
    let prefix = &bytes[..bytes.len().min(SNIFF_LEN)];
    prefix.contains(&0)
}

pub fn extract_text(attachment: &Attachment, max_chars: usize) -> Extracted {
    let bytes = attachment
        .bytes
        .strip_prefix(UTF8_BOM)
        .unwrap_or(&attachment.bytes);

    let text = if looks_binary(bytes) {
        None
    } else {
        std::str::from_utf8(bytes).ok()
    };

    match text {
        Some(text) => match text.char_indices().nth(max_chars) {
            Some((cut, _)) => Extracted::Text {
                content: text[..cut].to_string(),
                truncated: true,
            },
            None => Extracted::Text {
                content: text.to_string(),
                truncated: false,
            },
        },
        None => Extracted::Binary {
            placeholder: format!(
                "[binary file {} ({}, {} bytes); content not extracted]",
                attachment.file_name,
                attachment.mime_type(),
                attachment.len()
            ),
        },
    }
}

/// The stored `user` message recording an upload.
pub fn file_message(file_name: &str, extracted: &Extracted) -> String {
    format!("Uploaded file: {file_name}\n\n{}", extracted.as_prompt_text())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attachment(name: &str, bytes: &[u8]) -> Attachment {
        Attachment::new(name, None, bytes.to_vec())
    }

    #[test]
    fn test_plain_text() {
        let extracted = attachment("notes.txt", b"hello world").extract(100);
        assert_eq!(
            extracted,
            Extracted::Text {
                content: "hello world".into(),
                truncated: false
            }
        );
    }

    #[test]
    fn test_bom_stripped() {
        let extracted = attachment("notes.txt", b"\xEF\xBB\xBFhi").extract(100);
        assert_eq!(extracted.as_prompt_text(), "hi");
    }

    #[test]
    fn test_truncates_on_char_boundary() {
        let extracted = attachment("u.txt", "héllo wörld".as_bytes()).extract(4);
        assert_eq!(
            extracted,
            Extracted::Text {
                content: "héll".into(),
                truncated: true
            }
        );
        assert!(extracted.as_prompt_text().ends_with("[truncated]"));
    }

    #[test]
    fn test_exact_length_not_truncated() {
        let extracted = attachment("u.txt", b"abcd").extract(4);
        assert!(matches!(extracted, Extracted::Text { truncated: false, .. }));
    }

    #[test]
    fn test_invalid_utf8_is_binary() {
        let extracted = attachment("photo.png", &[0x89, b'P', b'N', b'G', 0xff, 0xfe]).extract(100);
        assert_eq!(
            extracted.as_prompt_text(),
            "[binary file photo.png (image/png, 6 bytes); content not extracted]"
        );
        assert!(matches!(extracted, Extracted::Binary { .. }));
    }

    #[test]
    fn test_nul_byte_is_binary() {
        let extracted = attachment("data.bin", b"abc\0def").extract(100);
        assert!(extracted
            .as_prompt_text()
            .contains("application/octet-stream, 7 bytes"));
    }

    #[test]
    fn test_declared_type_wins() {
        let file = Attachment::new("blob", Some("application/pdf".into()), vec![0, 1, 2]);
        assert_eq!(file.mime_type(), "application/pdf");
    }

    #[test]
    fn test_empty_name_falls_back() {
        let file = Attachment::new("  ", Some("".into()), b"x".to_vec());
        assert_eq!(file.file_name, "upload");
        assert!(file.content_type.is_none());
    }

    #[test]
    fn test_ensure_within() {
        let file = attachment("a.txt", b"12345");
        assert!(file.ensure_within(5).is_ok());
        let err = file.ensure_within(4).unwrap_err();
        assert!(matches!(err, VerbaError::InvalidInput(_)));
    }

    #[test]
    fn test_file_message_format() {
        let extracted = attachment("a.txt", b"body").extract(100);
        assert_eq!(file_message("a.txt", &extracted), "Uploaded file: a.txt\n\nbody");
    }

    #[test]
    fn test_empty_file_is_text() {
        let extracted = attachment("empty.txt", b"").extract(100);
        assert_eq!(extracted.as_prompt_text(), "");
    }
}
