//! Thin layer over html5ever's reference-counted DOM.
//!
//! The rest of the crate only needs a handful of operations on the parsed tree: parse,
//! serialize, look at an element's name and attributes, and build the bootstrap script.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use html5ever::serialize::{SerializeOpts, serialize};
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::tree_builder::{ElementFlags, NodeOrText, TreeSink};
use html5ever::{Attribute, LocalName, Namespace, ParseOpts, QualName, parse_document};
use markup5ever_rcdom::{Handle, NodeData, RcDom, SerializableHandle};

use crate::error::{OfflineError, Result};

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// Marker attribute carried by every injected bootstrap script.
pub const BOOTSTRAP_MARKER: &str = "x-service-worker";

/// Parse an HTML byte stream into a mutable document tree.
///
/// The HTML5 parser recovers from malformed markup, so the only failure surfaced here is
/// the input stream itself failing.
pub fn parse_html<R: Read>(input: &mut R) -> Result<RcDom> {
  parse_document(RcDom::default(), ParseOpts::default())
    .from_utf8()
    .read_from(input)
    .map_err(OfflineError::Parse)
}

/// Serialize the whole document back to HTML.
pub fn serialize_html<W: Write>(dom: &RcDom, out: W) -> Result<()> {
  let document: SerializableHandle = dom.document.clone().into();
  serialize(out, &document, SerializeOpts::default())
    .map_err(|err| OfflineError::io("failed to serialize HTML", err))
}

/// Local name of an element node, `None` for every other node kind.
pub fn element_name(node: &Handle) -> Option<String> {
  match &node.data {
    NodeData::Element { name, .. } => Some(name.local.to_string()),
    _ => None,
  }
}

/// Attributes of an element keyed by local name; a repeated key keeps its last value.
pub fn attributes(node: &Handle) -> BTreeMap<String, String> {
  let mut map = BTreeMap::new();
  if let NodeData::Element { attrs, .. } = &node.data {
    for attr in attrs.borrow().iter() {
      map.insert(attr.name.local.to_string(), attr.value.to_string());
    }
  }
  map
}

/// True for a `<script>` element carrying the bootstrap marker, whatever its value.
pub fn is_bootstrap_script(node: &Handle) -> bool {
  element_name(node).as_deref() == Some("script")
    && attributes(node).contains_key(BOOTSTRAP_MARKER)
}

/// Snapshot of a node's children, safe to hold while the node is mutated.
pub fn children(node: &Handle) -> Vec<Handle> {
  node.children.borrow().clone()
}

/// Content fragment of a `<template>` element.
///
/// The parser keeps template contents in a separate document fragment rather than among
/// the element's children.
pub fn template_contents(node: &Handle) -> Option<Handle> {
  match &node.data {
    NodeData::Element {
      template_contents, ..
    } => template_contents.borrow().clone(),
    _ => None,
  }
}

/// Build `<script type="text/javascript" x-service-worker="true">` holding `code` as its
/// single text child.
pub fn bootstrap_script(dom: &mut RcDom, code: &str) -> Handle {
  let attrs = vec![
    html_attribute("type", "text/javascript"),
    html_attribute(BOOTSTRAP_MARKER, "true"),
  ];
  let name = QualName::new(
    None,
    Namespace::from(HTML_NAMESPACE),
    LocalName::from("script"),
  );
  let script = dom.create_element(name, attrs, ElementFlags::default());
  dom.append(&script, NodeOrText::AppendText(StrTendril::from(code)));
  script
}

/// Append `child` as the last child of `parent`.
pub fn append_child(dom: &mut RcDom, parent: &Handle, child: Handle) {
  dom.append(parent, NodeOrText::AppendNode(child));
}

/// Detach `node` from its parent.
pub fn detach(dom: &mut RcDom, node: &Handle) {
  dom.remove_from_parent(node);
}

fn html_attribute(name: &str, value: &str) -> Attribute {
  Attribute {
    name: QualName::new(None, Namespace::from(""), LocalName::from(name)),
    value: StrTendril::from(value),
  }
}

/// Depth-first search for the first element with the given local name.
#[cfg(test)]
pub(crate) fn find_element(node: &Handle, local: &str) -> Option<Handle> {
  if element_name(node).as_deref() == Some(local) {
    return Some(node.clone());
  }
  children(node)
    .iter()
    .find_map(|child| find_element(child, local))
}
