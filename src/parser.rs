//! XML parsing into an [`XmlDocument`].
//!
//! Uses quick-xml, which never expands entities; DOCTYPE declarations are
//! refused outright. Input must be UTF-8 whatever the XML declaration says.

use crate::document::{Attribute, Element, NodeId, NodeKind, XmlDocument};
use crate::error::{Result, XopError};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;

/// Namespace URIs.
pub const SOAP_11_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SOAP_12_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
pub const WSSE_NS: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
pub const XOP_NS: &str = "http://www.w3.org/2004/08/xop/include";

/// Parse raw bytes as an XML document.
pub fn parse_document(data: &[u8]) -> Result<XmlDocument> {
    let xml = std::str::from_utf8(data)?;

    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut doc = XmlDocument::new();
    let mut stack: Vec<NodeId> = vec![doc.root()];
    let mut seen_root = false;

    loop {
        let (resolved, event) = reader
            .read_resolved_event()
            .map_err(|e| XopError::XmlParse(e.to_string()))?;

        match event {
            Event::Start(ref e) => {
                let element = build_element(&resolved, e)?;
                let parent = current(&stack);
                check_root(&mut seen_root, parent, &doc, &element)?;
                let id = doc.append_child(parent, NodeKind::Element(element));
                stack.push(id);
            }

            Event::Empty(ref e) => {
                let element = build_element(&resolved, e)?;
                let parent = current(&stack);
                check_root(&mut seen_root, parent, &doc, &element)?;
                doc.append_child(parent, NodeKind::Element(element));
            }

            Event::End(_) => {
                if stack.len() <= 1 {
                    return Err(XopError::XmlParse("unexpected end tag".to_string()));
                }
                stack.pop();
            }

            Event::Text(ref e) => {
                let text = e
                    .unescape()
                    .map_err(|err| XopError::XmlParse(err.to_string()))?;
                if stack.len() == 1 {
                    if !text.trim().is_empty() {
                        return Err(XopError::XmlParse(
                            "text content outside of the root element".to_string(),
                        ));
                    }
                    continue;
                }
                doc.append_text(current(&stack), text.into_owned());
            }

            Event::CData(ref e) => {
                if stack.len() == 1 {
                    return Err(XopError::XmlParse(
                        "CDATA section outside of the root element".to_string(),
                    ));
                }
                let text = String::from_utf8_lossy(e).into_owned();
                doc.append_child(current(&stack), NodeKind::CData(text));
            }

            Event::Comment(ref e) => {
                let text = String::from_utf8_lossy(e).into_owned();
                doc.append_child(current(&stack), NodeKind::Comment(text));
            }

            Event::PI(ref e) => {
                let text = String::from_utf8_lossy(e).into_owned();
                doc.append_child(current(&stack), NodeKind::ProcessingInstruction(text));
            }

            Event::DocType(_) => {
                return Err(XopError::XmlParse(
                    "DOCTYPE declarations are not allowed".to_string(),
                ));
            }

            Event::Eof => break,

            // XML declaration; dropped on serialization
            _ => {}
        }
    }

    if stack.len() > 1 {
        return Err(XopError::XmlParse(
            "unexpected end of document: unclosed element".to_string(),
        ));
    }
    if !seen_root {
        return Err(XopError::XmlParse("no root element found".to_string()));
    }

    Ok(doc)
}

fn current(stack: &[NodeId]) -> NodeId {
    stack[stack.len() - 1]
}

fn check_root(
    seen_root: &mut bool,
    parent: NodeId,
    doc: &XmlDocument,
    element: &Element,
) -> Result<()> {
    if parent != doc.root() {
        return Ok(());
    }
    if *seen_root {
        return Err(XopError::XmlParse(format!(
            "second root element <{}>",
            element.name
        )));
    }
    *seen_root = true;
    Ok(())
}

fn build_element(resolved: &ResolveResult, e: &BytesStart) -> Result<Element> {
    let qname = e.name();
    let name = std::str::from_utf8(qname.as_ref())?.to_string();
    let local_name = std::str::from_utf8(e.local_name().as_ref())?.to_string();
    let prefix = match qname.prefix() {
        Some(p) => Some(std::str::from_utf8(p.as_ref())?.to_string()),
        None => None,
    };

    let namespace = match resolved {
        ResolveResult::Bound(ns) => Some(std::str::from_utf8(ns.as_ref())?.to_string()),
        ResolveResult::Unbound => None,
        ResolveResult::Unknown(p) => {
            return Err(XopError::XmlParse(format!(
                "unknown namespace prefix '{}'",
                String::from_utf8_lossy(p)
            )));
        }
    };

    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| XopError::XmlParse(err.to_string()))?;
        let name = std::str::from_utf8(attr.key.as_ref())?.to_string();
        let value = attr
            .unescape_value()
            .map_err(|err| XopError::XmlParse(err.to_string()))?
            .into_owned();
        attributes.push(Attribute { name, value });
    }

    Ok(Element {
        name,
        prefix,
        local_name,
        namespace,
        attributes,
    })
}
