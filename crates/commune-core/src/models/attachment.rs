//! Message attachment model

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Kind of content carried by an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    #[default]
    Image,
    File,
}

/// Attachment reference carried inside a message document.
///
/// The object itself lives in remote object storage; only its URL is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Attachment kind.
    #[serde(rename = "type", default)]
    pub kind: AttachmentKind,
    /// Download URL in object storage.
    pub url: String,
    /// Original file name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl Attachment {
    /// Create a validated attachment reference.
    pub fn new(kind: AttachmentKind, url: impl Into<String>) -> Result<Self> {
        let url = url.into().trim().to_string();
        if url.is_empty() {
            return Err(Error::InvalidInput(
                "Attachment url cannot be empty".to_string(),
            ));
        }
        Ok(Self {
            kind,
            url,
            name: None,
            size: None,
        })
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub const fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_new_rejects_empty_url() {
        assert!(Attachment::new(AttachmentKind::Image, "   ").is_err());
    }

    #[test]
    fn test_attachment_wire_shape() {
        let attachment = Attachment::new(AttachmentKind::File, "https://cdn.example.com/a.pdf")
            .unwrap()
            .with_name("a.pdf")
            .with_size(2048);
        let json = serde_json::to_value(&attachment).unwrap();
        assert_eq!(json["type"], "file");
        assert_eq!(json["name"], "a.pdf");
        assert_eq!(json["size"], 2048);

        let minimal: Attachment =
            serde_json::from_str(r#"{"url": "https://cdn.example.com/x.png"}"#).unwrap();
        assert_eq!(minimal.kind, AttachmentKind::Image);
        assert_eq!(minimal.name, None);
    }
}
