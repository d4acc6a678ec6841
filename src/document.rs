//! Mutable, namespace-aware XML tree.
//!
//! Nodes live in an arena owned by the document and are addressed by
//! [`NodeId`]. Removing a node detaches it from its parent; the slot is not
//! reused.

use quick_xml::escape::{escape, partial_escape};

/// Handle to a node inside one [`XmlDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

/// An attribute as written in the source, value unescaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Qualified name (`prefix:local` or `local`)
    pub name: String,
    pub value: String,
}

/// Element data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Qualified name as written in the source
    pub name: String,
    pub prefix: Option<String>,
    pub local_name: String,
    /// Resolved namespace URI
    pub namespace: Option<String>,
    /// Attributes, including namespace declarations
    pub attributes: Vec<Attribute>,
}

impl Element {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    pub fn is(&self, namespace: &str, local_name: &str) -> bool {
        self.local_name == local_name && self.namespace.as_deref() == Some(namespace)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction(String),
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// An XML document.
#[derive(Debug, Clone)]
pub struct XmlDocument {
    nodes: Vec<NodeData>,
}

impl Default for XmlDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlDocument {
    /// Create an empty document holding only the document node.
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeData {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    /// The document node; parent of the root element.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// The root element, if any.
    pub fn document_element(&self) -> Option<NodeId> {
        self.children(self.root())
            .iter()
            .copied()
            .find(|&id| self.element(id).is_some())
    }

    pub fn kind(&self, node: NodeId) -> &NodeKind {
        &self.nodes[node.0].kind
    }

    pub fn element(&self, node: NodeId) -> Option<&Element> {
        match self.kind(node) {
            NodeKind::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Character data of a text or CDATA node.
    pub fn text(&self, node: NodeId) -> Option<&str> {
        match self.kind(node) {
            NodeKind::Text(t) | NodeKind::CData(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_whitespace_text(&self, node: NodeId) -> bool {
        matches!(self.kind(node), NodeKind::Text(t) if t.trim().is_empty())
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.element(node).and_then(|e| e.attribute(name))
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    pub fn previous_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.parent(node)?;
        let siblings = self.children(parent);
        let pos = siblings.iter().position(|&c| c == node)?;
        pos.checked_sub(1).map(|p| siblings[p])
    }

    /// All nodes below `node` in document order, excluding `node` itself.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(node).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    /// Append a new node as the last child of `parent`.
    pub fn append_child(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            kind,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn append_text(&mut self, parent: NodeId, text: impl Into<String>) -> NodeId {
        self.append_child(parent, NodeKind::Text(text.into()))
    }

    /// Detach `node` from its parent.
    pub fn remove(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != node);
        }
    }

    /// Detach every child of `node`.
    pub fn remove_children(&mut self, node: NodeId) {
        let children = std::mem::take(&mut self.nodes[node.0].children);
        for child in children {
            self.nodes[child.0].parent = None;
        }
    }

    /// Serialize without an XML declaration.
    ///
    /// With `indent`, whitespace-only text between elements is dropped and
    /// the tree is laid out with two-space indentation. Elements holding
    /// character data, alone or mixed with markup, are written verbatim.
    pub fn to_xml_string(&self, indent: bool) -> String {
        let mut out = String::new();
        let mut first = true;
        for &child in self.children(self.root()) {
            if self.is_whitespace_text(child) {
                continue;
            }
            if !first {
                out.push('\n');
            }
            self.write_node(child, 0, indent, &mut out);
            first = false;
        }
        out
    }

    /// True when `node` holds markup and no character data besides
    /// whitespace. Mixed content is written as is.
    fn can_indent(&self, node: NodeId) -> bool {
        let children = self.children(node);
        let markup = children.iter().any(|&c| {
            matches!(
                self.kind(c),
                NodeKind::Element(_) | NodeKind::Comment(_) | NodeKind::ProcessingInstruction(_)
            )
        });
        markup
            && children.iter().all(|&c| match self.kind(c) {
                NodeKind::Text(t) => t.trim().is_empty(),
                NodeKind::CData(_) => false,
                _ => true,
            })
    }

    fn write_node(&self, node: NodeId, depth: usize, indent: bool, out: &mut String) {
        match self.kind(node) {
            NodeKind::Document => {}
            NodeKind::Element(e) => {
                out.push('<');
                out.push_str(&e.name);
                for attr in &e.attributes {
                    out.push(' ');
                    out.push_str(&attr.name);
                    out.push_str("=\"");
                    out.push_str(&escape(attr.value.as_str()));
                    out.push('"');
                }
                let children = self.children(node);
                if children.is_empty() {
                    out.push_str("/>");
                    return;
                }
                out.push('>');
                if indent && self.can_indent(node) {
                    for &child in children {
                        if self.is_whitespace_text(child) {
                            continue;
                        }
                        push_indent(out, depth + 1);
                        self.write_node(child, depth + 1, indent, out);
                    }
                    push_indent(out, depth);
                } else {
                    for &child in children {
                        self.write_node(child, depth, false, out);
                    }
                }
                out.push_str("</");
                out.push_str(&e.name);
                out.push('>');
            }
            NodeKind::Text(t) => out.push_str(&partial_escape(t.as_str())),
            NodeKind::CData(t) => {
                out.push_str("<![CDATA[");
                out.push_str(t);
                out.push_str("]]>");
            }
            NodeKind::Comment(t) => {
                out.push_str("<!--");
                out.push_str(t);
                out.push_str("-->");
            }
            NodeKind::ProcessingInstruction(t) => {
                out.push_str("<?");
                out.push_str(t);
                out.push_str("?>");
            }
        }
    }
}

fn push_indent(out: &mut String, depth: usize) {
    out.push('\n');
    for _ in 0..depth {
        out.push_str("  ");
    }
}
