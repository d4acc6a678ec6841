//! Error types for the XOP agent.

use std::fmt::Write as _;
use thiserror::Error;

/// XOP agent errors.
///
/// `Config` and `Structure` carry a message meant for the caller as-is; the
/// remaining variants are unexpected failures and may be reported with a
/// diagnostic trace.
#[derive(Error, Debug)]
pub enum XopError {
    #[error("{0}")]
    Config(String),

    #[error("{0}")]
    Structure(String),

    #[error("XML parsing error: {0}")]
    XmlParse(String),

    #[error("XPath error: {0}")]
    XPath(String),

    #[error("Invalid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl XopError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn structure(message: impl Into<String>) -> Self {
        Self::Structure(message.into())
    }

    /// Configuration and structural errors are expected outcomes of bad
    /// input; everything else is unexpected.
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Structure(_))
    }

    /// Variant name, e.g. `Structure`.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Config(_) => "Config",
            Self::Structure(_) => "Structure",
            Self::XmlParse(_) => "XmlParse",
            Self::XPath(_) => "XPath",
            Self::Encoding(_) => "Encoding",
            Self::Io(_) => "Io",
        }
    }

    /// One-line `Kind: message` form.
    pub fn exception(&self) -> String {
        let message = self.to_string().replace(['\r', '\n'], " ");
        format!("{}: {}", self.kind_name(), message)
    }

    /// Debug rendering followed by the `source()` chain.
    pub fn diagnostic_trace(&self) -> String {
        let mut trace = format!("{:?}", self);
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            let _ = write!(trace, "\ncaused by: {}", cause);
            source = cause.source();
        }
        trace
    }
}

/// The reader reports structural problems through `io::Error` so that part
/// content can be consumed with `std::io::Read`; unwrap them again here.
pub(crate) fn from_io(err: std::io::Error) -> XopError {
    if err.kind() == std::io::ErrorKind::InvalidData {
        let is_structure = err
            .get_ref()
            .map(|inner| inner.is::<StructureMarker>())
            .unwrap_or(false);
        if is_structure {
            return XopError::Structure(err.to_string());
        }
    }
    XopError::Io(err)
}

/// Payload used to tag structural failures raised inside `io::Read`.
#[derive(Debug)]
pub(crate) struct StructureMarker(pub String);

impl std::fmt::Display for StructureMarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for StructureMarker {}

pub(crate) fn structure_io(message: impl Into<String>) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        StructureMarker(message.into()),
    )
}

pub type Result<T> = std::result::Result<T, XopError>;
