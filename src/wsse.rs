//! Removal of the WS-Security UsernameToken from a SOAP 1.1 header.

use crate::document::{NodeId, XmlDocument};
use crate::error::{Result, XopError};
use crate::parser::{parse_document, SOAP_11_NS, WSSE_NS};
use crate::xpath::XPathEvaluator;
use tracing::debug;

const USERNAME_TOKEN_XPATH: &str = "/soap:Envelope/soap:Header/wsse:Security/wsse:UsernameToken";

/// What to do when the header carries more than one UsernameToken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UsernameTokenPolicy {
    /// Remove every match
    #[default]
    RemoveAll,
    /// Remove only when there is exactly one match; leave duplicates alone
    RemoveSingle,
    /// Fail when there is more than one match
    Reject,
}

impl UsernameTokenPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "remove-all" => Some(Self::RemoveAll),
            "remove-single" => Some(Self::RemoveSingle),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }
}

/// Parse `xml`, remove its UsernameToken and re-serialize with indentation.
pub fn strip_username_token(xml: &[u8], policy: UsernameTokenPolicy) -> Result<String> {
    let mut doc = parse_document(xml)?;
    let removed = remove_username_tokens(&mut doc, policy)?;
    debug!(removed, ?policy, "UsernameToken removal");
    Ok(doc.to_xml_string(true))
}

/// Remove matching UsernameToken elements in place, returning how many were
/// removed.
pub fn remove_username_tokens(doc: &mut XmlDocument, policy: UsernameTokenPolicy) -> Result<usize> {
    let xpe = XPathEvaluator::new()
        .with_namespace("soap", SOAP_11_NS)
        .with_namespace("wsse", WSSE_NS);
    let nodes = xpe.select(doc, USERNAME_TOKEN_XPATH)?;

    let targets: &[NodeId] = match (nodes.len(), policy) {
        (0, _) => &[],
        (1, _) | (_, UsernameTokenPolicy::RemoveAll) => &nodes,
        (_, UsernameTokenPolicy::RemoveSingle) => &[],
        (n, UsernameTokenPolicy::Reject) => {
            return Err(XopError::structure(format!(
                "found {} UsernameToken elements in the WS-Security header",
                n
            )));
        }
    };

    for &node in targets {
        remove_with_leading_whitespace(doc, node);
    }
    Ok(targets.len())
}

/// Remove `node`, and its previous sibling too when that is whitespace-only
/// text, so no blank line is left behind.
fn remove_with_leading_whitespace(doc: &mut XmlDocument, node: NodeId) {
    if let Some(prev) = doc.previous_sibling(node) {
        if doc.is_whitespace_text(prev) {
            doc.remove(prev);
        }
    }
    doc.remove(node);
}
