//! A small XPath subset over [`XmlDocument`].
//!
//! Supported: absolute location paths made of `/` (child) and `//`
//! (descendant) steps, with name tests `prefix:local`, `prefix:*`, `local`,
//! `*`, and the node tests `text()` and `node()`. Prefixes must be
//! registered on the evaluator; unprefixed names match elements in no
//! namespace, as in XPath 1.0.

use crate::document::{NodeId, NodeKind, XmlDocument};
use crate::error::{Result, XopError};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeTest {
    AnyElement,
    Name {
        namespace: Option<String>,
        local: String,
    },
    AnyInNamespace(String),
    Text,
    Node,
}

#[derive(Debug, Clone)]
struct Step {
    axis: Axis,
    test: NodeTest,
}

/// Evaluates location paths with caller-registered namespace bindings.
#[derive(Debug, Clone, Default)]
pub struct XPathEvaluator {
    namespaces: HashMap<String, String>,
}

impl XPathEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_namespace(&mut self, prefix: impl Into<String>, uri: impl Into<String>) {
        self.namespaces.insert(prefix.into(), uri.into());
    }

    pub fn with_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.register_namespace(prefix, uri);
        self
    }

    /// Select the nodes matching `expr`, in document order.
    pub fn select(&self, doc: &XmlDocument, expr: &str) -> Result<Vec<NodeId>> {
        let steps = self.compile(expr)?;

        let order: HashMap<NodeId, usize> = doc
            .descendants(doc.root())
            .into_iter()
            .enumerate()
            .map(|(i, id)| (id, i))
            .collect();

        let mut context = vec![doc.root()];
        for step in &steps {
            let mut next = Vec::new();
            for &node in &context {
                let candidates = match step.axis {
                    Axis::Child => doc.children(node).to_vec(),
                    Axis::Descendant => doc.descendants(node),
                };
                next.extend(
                    candidates
                        .into_iter()
                        .filter(|&c| matches_test(doc, c, &step.test)),
                );
            }
            next.sort_by_key(|id| order.get(id).copied().unwrap_or(usize::MAX));
            next.dedup();
            context = next;
        }
        Ok(context)
    }

    fn compile(&self, expr: &str) -> Result<Vec<Step>> {
        let expr = expr.trim();
        if !expr.starts_with('/') {
            return Err(XopError::XPath(format!(
                "only absolute location paths are supported: {}",
                expr
            )));
        }

        let mut steps = Vec::new();
        let mut rest = expr;
        while !rest.is_empty() {
            let axis = if let Some(r) = rest.strip_prefix("//") {
                rest = r;
                Axis::Descendant
            } else if let Some(r) = rest.strip_prefix('/') {
                rest = r;
                Axis::Child
            } else {
                return Err(XopError::XPath(format!("malformed expression: {}", expr)));
            };

            let end = rest.find('/').unwrap_or(rest.len());
            let token = &rest[..end];
            rest = &rest[end..];

            if token.is_empty() {
                // a lone "/" selects the document node
                if steps.is_empty() && rest.is_empty() && axis == Axis::Child {
                    break;
                }
                return Err(XopError::XPath(format!("empty step in expression: {}", expr)));
            }
            steps.push(Step {
                axis,
                test: self.parse_test(token)?,
            });
        }
        Ok(steps)
    }

    fn parse_test(&self, token: &str) -> Result<NodeTest> {
        match token {
            "*" => return Ok(NodeTest::AnyElement),
            "text()" => return Ok(NodeTest::Text),
            "node()" => return Ok(NodeTest::Node),
            _ => {}
        }
        if token
            .chars()
            .any(|c| matches!(c, '[' | ']' | '@' | '(' | ')' | '=' | '\'' | '"') || c.is_whitespace())
        {
            return Err(XopError::XPath(format!("unsupported step: {}", token)));
        }

        match token.split_once(':') {
            Some((prefix, local)) => {
                let uri = self.namespaces.get(prefix).ok_or_else(|| {
                    XopError::XPath(format!("unbound namespace prefix '{}'", prefix))
                })?;
                if local == "*" {
                    Ok(NodeTest::AnyInNamespace(uri.clone()))
                } else if local.is_empty() || local.contains(':') {
                    Err(XopError::XPath(format!("malformed name test: {}", token)))
                } else {
                    Ok(NodeTest::Name {
                        namespace: Some(uri.clone()),
                        local: local.to_string(),
                    })
                }
            }
            None => Ok(NodeTest::Name {
                namespace: None,
                local: token.to_string(),
            }),
        }
    }
}

fn matches_test(doc: &XmlDocument, node: NodeId, test: &NodeTest) -> bool {
    match (test, doc.kind(node)) {
        (NodeTest::AnyElement, NodeKind::Element(_)) => true,
        (NodeTest::Name { namespace, local }, NodeKind::Element(e)) => {
            e.local_name == *local && e.namespace == *namespace
        }
        (NodeTest::AnyInNamespace(ns), NodeKind::Element(e)) => {
            e.namespace.as_deref() == Some(ns.as_str())
        }
        (NodeTest::Text, NodeKind::Text(_) | NodeKind::CData(_)) => true,
        (NodeTest::Node, kind) => !matches!(kind, NodeKind::Document),
        _ => false,
    }
}
