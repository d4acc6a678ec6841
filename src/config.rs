//! Configuration types for the XOP agent.
//!
//! Configuration is resolved in two stages: [`XopAgentConfig`] holds the raw
//! option strings, which may contain `{variable}` references; `resolve`
//! interpolates them and parses the result into an [`EngineConfig`].

use crate::error::{Result, XopError};
use crate::interpolate::{resolve_variable_references, VariableLookup};
use crate::validator::ContentTypeAllowlist;
use crate::wsse::UsernameTokenPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The transformation to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XopAction {
    /// Strip the UsernameToken and re-emit the two-part envelope
    #[default]
    Edit1,
    /// Expose the XML root part as text
    ExtractSoap,
    /// Inline every attachment into the XML as base64
    TransformToEmbedded,
}

impl XopAction {
    /// Parse an action name, ignoring case.
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_uppercase().as_str() {
            "EDIT_1" => Ok(Self::Edit1),
            "EXTRACT_SOAP" => Ok(Self::ExtractSoap),
            "TRANSFORM_TO_EMBEDDED" => Ok(Self::TransformToEmbedded),
            _ => Err(XopError::config("specify a valid action.")),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Edit1 => "EDIT_1",
            Self::ExtractSoap => "EXTRACT_SOAP",
            Self::TransformToEmbedded => "TRANSFORM_TO_EMBEDDED",
        }
    }
}

impl fmt::Display for XopAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully resolved settings for one engine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub action: XopAction,
    /// Accepted content types for the XML root part
    pub xml_content_types: ContentTypeAllowlist,
    /// Accepted content types for attachment parts
    pub attachment_content_types: ContentTypeAllowlist,
    /// Handling of duplicate UsernameTokens
    pub username_tokens: UsernameTokenPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            action: XopAction::default(),
            xml_content_types: ContentTypeAllowlist::default_xml(),
            attachment_content_types: ContentTypeAllowlist::default_attachment(),
            username_tokens: UsernameTokenPolicy::default(),
        }
    }
}

/// Agent configuration as written by the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct XopAgentConfig {
    /// Action name (EDIT_1, EXTRACT_SOAP, TRANSFORM_TO_EMBEDDED)
    pub action: Option<String>,

    /// Name of the message to operate on
    pub source: Option<String>,

    /// Comma-separated allowlist for the XML root part
    pub part1_ctypes: Option<String>,

    /// Comma-separated allowlist for attachment parts
    pub part2_ctypes: Option<String>,

    /// remove-all, remove-single or reject
    pub username_tokens: Option<String>,

    /// Prefix for published result variables
    pub variable_prefix: String,

    /// Publish a diagnostic trace for unexpected errors
    pub debug: bool,
}

impl Default for XopAgentConfig {
    fn default() -> Self {
        Self {
            action: None,
            source: None,
            part1_ctypes: None,
            part2_ctypes: None,
            username_tokens: None,
            variable_prefix: "xop_".to_string(),
            debug: false,
        }
    }
}

/// Result of resolving an [`XopAgentConfig`] for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub engine: EngineConfig,
    pub source: String,
}

impl XopAgentConfig {
    /// Interpolate and parse every option.
    pub fn resolve<V: VariableLookup + ?Sized>(&self, vars: &V) -> Result<ResolvedConfig> {
        let action = self.resolve_action(vars)?;

        let xml_content_types =
            resolve_allowlist("part1-ctypes", &self.part1_ctypes, vars)?
                .unwrap_or_else(ContentTypeAllowlist::default_xml);
        let attachment_content_types =
            resolve_allowlist("part2-ctypes", &self.part2_ctypes, vars)?
                .unwrap_or_else(ContentTypeAllowlist::default_attachment);

        let username_tokens = match optional(&self.username_tokens, vars) {
            Some(value) => UsernameTokenPolicy::parse(&value).ok_or_else(|| {
                XopError::config(format!(
                    "configuration error: username-tokens must be one of remove-all, remove-single, reject (got {})",
                    value
                ))
            })?,
            None => UsernameTokenPolicy::default(),
        };

        let source = optional(&self.source, vars).unwrap_or_else(|| "message".to_string());

        Ok(ResolvedConfig {
            engine: EngineConfig {
                action,
                xml_content_types,
                attachment_content_types,
                username_tokens,
            },
            source,
        })
    }

    /// An unset or blank action means the default; a set one must resolve
    /// to a known name.
    fn resolve_action<V: VariableLookup + ?Sized>(&self, vars: &V) -> Result<XopAction> {
        match self.action.as_deref().map(str::trim) {
            None | Some("") => Ok(XopAction::default()),
            Some(raw) => XopAction::parse(resolve_variable_references(raw, vars).trim()),
        }
    }
}

/// Trim, treat blank as unset, interpolate, and treat blank as unset again.
fn optional<V: VariableLookup + ?Sized>(value: &Option<String>, vars: &V) -> Option<String> {
    let raw = value.as_deref().map(str::trim).filter(|v| !v.is_empty())?;
    let resolved = resolve_variable_references(raw, vars);
    let resolved = resolved.trim();
    if resolved.is_empty() {
        None
    } else {
        Some(resolved.to_string())
    }
}

fn resolve_allowlist<V: VariableLookup + ?Sized>(
    name: &str,
    value: &Option<String>,
    vars: &V,
) -> Result<Option<ContentTypeAllowlist>> {
    let Some(resolved) = optional(value, vars) else {
        return Ok(None);
    };
    let list = ContentTypeAllowlist::parse(&resolved);
    if list.is_empty() {
        return Err(XopError::config(format!(
            "configuration error: {} resolves to an empty list",
            name
        )));
    }
    Ok(Some(list))
}
