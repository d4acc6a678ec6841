//! Content-type validation for multipart parts.

use crate::error::{Result, XopError};
use crate::multipart::HeaderFields;
use tracing::warn;

/// Default prefixes accepted for the XML root part.
pub const DEFAULT_XML_CONTENT_TYPES: &[&str] =
    &["application/soap+xml", "application/xop+xml", "text/xml"];

/// Default prefixes accepted for attachment parts.
pub const DEFAULT_ATTACHMENT_CONTENT_TYPES: &[&str] = &[
    "application/zip",
    "application/octet-stream",
    "image/jpeg",
    "image/png",
    "application/pdf",
];

/// Ordered list of accepted content-type prefixes.
///
/// Matching is a case-sensitive prefix test on the raw header value, so
/// parameters such as `charset` need no special handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentTypeAllowlist {
    prefixes: Vec<String>,
}

impl ContentTypeAllowlist {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn default_xml() -> Self {
        Self::new(DEFAULT_XML_CONTENT_TYPES.iter().copied())
    }

    pub fn default_attachment() -> Self {
        Self::new(DEFAULT_ATTACHMENT_CONTENT_TYPES.iter().copied())
    }

    /// Parse a comma-separated list. Entries are trimmed and may be wrapped
    /// in double quotes; empty entries are skipped.
    pub fn parse(list: &str) -> Self {
        Self::new(
            list.split(',')
                .map(|entry| {
                    let entry = entry.trim();
                    entry
                        .strip_prefix('"')
                        .and_then(|e| e.strip_suffix('"'))
                        .unwrap_or(entry)
                        .trim()
                })
                .filter(|entry| !entry.is_empty()),
        )
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    /// True iff `content_type` starts with one of the listed prefixes.
    pub fn accepts(&self, content_type: &str) -> bool {
        self.prefixes.iter().any(|p| content_type.starts_with(p.as_str()))
    }

    /// Check the Content-Type of part `index` (1-based), returning it.
    pub fn validate_part<'h>(&self, headers: &'h HeaderFields, index: usize) -> Result<&'h str> {
        let content_type = headers.content_type().ok_or_else(|| {
            XopError::structure(format!("no content-type found (part #{})", index))
        })?;
        if !self.accepts(content_type) {
            warn!(
                part = index,
                content_type = %content_type,
                allowed = ?self.prefixes,
                "Unexpected content type"
            );
            return Err(XopError::structure(format!(
                "unexpected content-type for part #{} ({})",
                index, content_type
            )));
        }
        Ok(content_type)
    }
}
