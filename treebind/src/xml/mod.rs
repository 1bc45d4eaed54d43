//! Owned XML element tree
//!
//! Documents are parsed into an owned tree that can outlive its input
//! buffer, be cloned into transform outputs and be mutated by chain steps.
//! Parsing and serialization go through quick-xml events.

mod parser;

pub use parser::parse;

use anyhow::Result;

/// Attribute that flags an element as a dynamic binding point.
pub const DEFAULT_MARKER_ATTR: &str = "marker";

/// A child of an element: either a nested element or a run of text.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An owned XML element: name, attributes in document order, children.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Element {
    /// Create an empty element
    pub fn new(name: impl Into<String>) -> Self {
        Element {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value of the named attribute, if present
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute, replacing an existing value for the same key
    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(existing) = self.attributes.iter_mut().find(|(k, _)| *k == key) {
            existing.1 = value;
        } else {
            self.attributes.push((key, value));
        }
    }

    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn push_element(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    pub fn push_text(&mut self, text: impl Into<String>) {
        self.children.push(Node::Text(text.into()));
    }

    /// Builder-style attribute
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    /// Builder-style child element
    pub fn with_child(mut self, child: Element) -> Self {
        self.push_element(child);
        self
    }

    /// Child elements in document order, skipping text nodes
    pub fn child_elements(&self) -> impl DoubleEndedIterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// Concatenated direct text children
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            if let Node::Text(t) = node {
                out.push_str(t);
            }
        }
        out
    }

    /// Pre-order walk over this element and every descendant element
    pub fn walk(&self, f: &mut dyn FnMut(&Element)) {
        f(self);
        for node in &self.children {
            if let Node::Element(e) = node {
                e.walk(f);
            }
        }
    }

    /// Pre-order mutable walk over this element and every descendant
    pub fn walk_mut(&mut self, f: &mut dyn FnMut(&mut Element)) {
        f(self);
        for node in &mut self.children {
            if let Node::Element(e) = node {
                e.walk_mut(f);
            }
        }
    }

    /// Whether any descendant (excluding this element) carries the marker
    /// attribute
    pub fn has_marker_descendant(&self, attr: &str) -> bool {
        self.child_elements()
            .any(|child| child.attr(attr).is_some() || child.has_marker_descendant(attr))
    }

    /// Element reached by indexing into child elements level by level.
    /// An empty path is this element itself.
    pub fn element_at(&self, path: &[usize]) -> Option<&Element> {
        let mut current = self;
        for &index in path {
            current = current.child_elements().nth(index)?;
        }
        Some(current)
    }

    /// Serialize this element back to XML text
    pub fn to_xml(&self) -> Result<String> {
        parser::to_xml(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_attributes_and_nesting() {
        let root = parse(r#"<root kind="page"><a marker="x1"/><a marker="x2">hi</a></root>"#)
            .unwrap();

        assert_eq!(root.name(), "root");
        assert_eq!(root.attr("kind"), Some("page"));

        let children: Vec<&Element> = root.child_elements().collect();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].attr("marker"), Some("x1"));
        assert_eq!(children[1].attr("marker"), Some("x2"));
        assert_eq!(children[1].text(), "hi");
    }

    #[test]
    fn test_whitespace_between_elements_is_dropped() {
        let root = parse("<root>\n  <a/>\n  <b/>\n</root>").unwrap();
        assert_eq!(root.child_elements().count(), 2);
        assert_eq!(root.text(), "");
    }

    #[test]
    fn test_roundtrip() {
        let input = r#"<root kind="page"><a marker="x1"/><b>text</b></root>"#;
        let root = parse(input).unwrap();
        let output = root.to_xml().unwrap();
        assert_eq!(parse(&output).unwrap(), root);
    }

    #[test]
    fn test_escaping_roundtrip() {
        let root = parse(r#"<root note="a&amp;b">1 &lt; 2</root>"#).unwrap();
        assert_eq!(root.attr("note"), Some("a&b"));
        assert_eq!(root.text(), "1 < 2");

        let output = root.to_xml().unwrap();
        assert_eq!(parse(&output).unwrap(), root);
    }

    #[test]
    fn test_mismatched_tags_error() {
        assert!(parse("<a><b></a>").is_err());
    }

    #[test]
    fn test_multiple_roots_error() {
        assert!(parse("<a/><b/>").is_err());
    }

    #[test]
    fn test_empty_input_error() {
        assert!(parse("").is_err());
        assert!(parse("   ").is_err());
    }

    #[test]
    fn test_set_attr_replaces() {
        let mut element = Element::new("a").with_attr("marker", "x1");
        element.set_attr("marker", "x2");
        assert_eq!(element.attr("marker"), Some("x2"));
        assert_eq!(element.attributes().len(), 1);
    }

    #[test]
    fn test_has_marker_descendant_excludes_self() {
        let root = parse(r#"<root marker="self"><a/></root>"#).unwrap();
        assert!(!root.has_marker_descendant("marker"));

        let root = parse(r#"<root><a><b marker="deep"/></a></root>"#).unwrap();
        assert!(root.has_marker_descendant("marker"));
    }

    #[test]
    fn test_element_at() {
        let root = parse("<root><a/><b><c/></b></root>").unwrap();
        assert_eq!(root.element_at(&[]).unwrap().name(), "root");
        assert_eq!(root.element_at(&[1]).unwrap().name(), "b");
        assert_eq!(root.element_at(&[1, 0]).unwrap().name(), "c");
        assert!(root.element_at(&[2]).is_none());
    }
}
