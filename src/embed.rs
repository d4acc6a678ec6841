//! Inlining of multipart attachments into `xop:Include` placeholders.
//!
//! Each attachment part is matched by Content-ID to exactly one
//! `<xop:Include href="cid:..."/>`; the Include's parent then gets the
//! base64 of the attachment as its only content.

use crate::document::{NodeId, XmlDocument};
use crate::error::{Result, XopError};
use crate::multipart::{HeaderFields, MultipartReader};
use crate::parser::XOP_NS;
use crate::validator::ContentTypeAllowlist;
use crate::xpath::XPathEvaluator;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use lazy_static::lazy_static;
use regex::Regex;
use std::io::BufRead;
use tracing::debug;

lazy_static! {
    static ref CONTENT_ID: Regex = Regex::new(r"(?s)^[^<]*<([^>]+)>.*$").unwrap();
}

const INCLUDE_XPATH: &str = "//xop:Include";

/// The identifier between the angle brackets of a Content-ID value.
pub fn parse_content_id(value: &str) -> Option<&str> {
    CONTENT_ID
        .captures(value)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn content_id_of(headers: &HeaderFields, index: usize) -> Result<String> {
    let raw = headers.content_id().ok_or_else(|| {
        XopError::structure(format!("no Content-ID found (part #{})", index))
    })?;
    parse_content_id(raw).map(str::to_string).ok_or_else(|| {
        XopError::structure(format!(
            "malformed Content-ID for part #{} ({})",
            index, raw
        ))
    })
}

/// Consume every remaining part of `reader`, splicing each into `doc`, and
/// serialize the result. Any unmatched part or placeholder fails the whole
/// operation.
pub fn embed_attachments<R: BufRead>(
    mut doc: XmlDocument,
    reader: &mut MultipartReader<R>,
    allowlist: &ContentTypeAllowlist,
) -> Result<String> {
    let xpe = XPathEvaluator::new().with_namespace("xop", XOP_NS);

    while let Some(mut part) = reader.next_part()? {
        let index = part.index();
        allowlist.validate_part(part.headers(), index)?;
        let content_id = content_id_of(part.headers(), index)?;

        let include = find_include(&doc, &xpe, &content_id)?;
        let parent = sole_child_parent(&doc, include)?;

        let content = part.read_to_vec()?;
        doc.remove_children(parent);
        doc.append_text(parent, STANDARD.encode(&content));

        debug!(
            part = index,
            content_id = %content_id,
            size = content.len(),
            "Embedded attachment"
        );
    }

    debug!(parts = reader.parts_read(), "Attachment parts consumed");

    let unbound = xpe.select(&doc, INCLUDE_XPATH)?;
    if !unbound.is_empty() {
        let hrefs: Vec<&str> = unbound
            .iter()
            .map(|&n| doc.attribute(n, "href").unwrap_or(""))
            .collect();
        return Err(XopError::structure(format!(
            "no attachment found for xop:Include element(s): {}",
            hrefs.join(", ")
        )));
    }

    Ok(doc.to_xml_string(false))
}

/// Find the single Include referencing `content_id`, trying the literal
/// identifier first and its percent-encoded form second.
fn find_include(doc: &XmlDocument, xpe: &XPathEvaluator, content_id: &str) -> Result<NodeId> {
    let includes = xpe.select(doc, INCLUDE_XPATH)?;

    let mut href = format!("cid:{}", content_id);
    let mut matches = with_href(doc, &includes, &href);
    if matches.is_empty() {
        let encoded = format!("cid:{}", urlencoding::encode(content_id));
        if encoded != href {
            href = encoded;
            matches = with_href(doc, &includes, &href);
        }
    }

    match matches.as_slice() {
        [] => Err(XopError::structure(format!(
            "could not find xop:Include element referencing cid:{}",
            content_id
        ))),
        [single] => Ok(*single),
        _ => Err(XopError::structure(format!(
            "found more than one xop:Include element referencing {}",
            href
        ))),
    }
}

fn with_href(doc: &XmlDocument, includes: &[NodeId], href: &str) -> Vec<NodeId> {
    includes
        .iter()
        .copied()
        .filter(|&n| doc.attribute(n, "href") == Some(href))
        .collect()
}

/// The parent of `include`, provided `include` is its only element child.
fn sole_child_parent(doc: &XmlDocument, include: NodeId) -> Result<NodeId> {
    let parent = doc
        .parent(include)
        .filter(|&p| p != doc.root())
        .ok_or_else(|| XopError::structure("xop:Include cannot be the document element"))?;

    let has_sibling_element = doc
        .children(parent)
        .iter()
        .any(|&c| c != include && doc.element(c).is_some());
    if has_sibling_element {
        return Err(XopError::structure(
            "Include is not the sole child of its parent",
        ));
    }
    Ok(parent)
}
