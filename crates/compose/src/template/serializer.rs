//! DOM-to-segment serialization.
//!
//! Walks an html5ever `RcDom` tree depth-first, emitting verbatim HTML into
//! content runs and breaking the runs at fragment placeholders, slots and
//! host-handled tags.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use html5ever::Attribute;
use markup5ever_rcdom::{Handle, NodeData};
use tracing::warn;

use crate::segment::TagInfo;

/// Void elements (self-closing, no end tag)
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source", "track", "wbr",
];

/// Raw text elements (no escaping for content)
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Serializer output before position indices are assigned.
#[derive(Debug)]
pub(super) enum RawSegment {
    Content(String),
    Fragment { attributes: Vec<(String, String)>, asynchronous: bool },
    Handled(TagInfo),
}

pub(super) struct Serializer<'a> {
    fragment_tag: &'a str,
    handled_tags: &'a [String],
    slots: HashMap<String, Vec<Handle>>,
    seen_slots: HashSet<String>,
    segments: Vec<RawSegment>,
    buf: String,
}

impl<'a> Serializer<'a> {
    pub(super) fn new(fragment_tag: &'a str, handled_tags: &'a [String], slots: HashMap<String, Vec<Handle>>) -> Self {
        Self { fragment_tag, handled_tags, slots, seen_slots: HashSet::new(), segments: Vec::new(), buf: String::new() }
    }

    pub(super) fn finish(mut self) -> Vec<RawSegment> {
        self.flush();
        self.segments
    }

    pub(super) fn serialize_children(&mut self, node: &Handle, raw: bool) {
        for child in node.children.borrow().iter() {
            self.serialize_node(child, raw);
        }
    }

    fn serialize_node(&mut self, node: &Handle, raw: bool) {
        match &node.data {
            NodeData::Document => self.serialize_children(node, false),
            NodeData::Doctype { name, .. } => {
                self.buf.push_str("<!DOCTYPE ");
                self.buf.push_str(name);
                self.buf.push('>');
            }
            NodeData::Text { contents } => {
                if raw {
                    self.buf.push_str(&contents.borrow());
                } else {
                    escape_text(&contents.borrow(), &mut self.buf);
                }
            }
            NodeData::Comment { contents } => {
                self.buf.push_str("<!--");
                self.buf.push_str(contents);
                self.buf.push_str("-->");
            }
            NodeData::Element { name, attrs, .. } => self.serialize_element(node, name.local.as_ref(), attrs),
            NodeData::ProcessingInstruction { target, contents } => {
                self.buf.push_str("<?");
                self.buf.push_str(target);
                if !contents.is_empty() {
                    self.buf.push(' ');
                    self.buf.push_str(contents);
                }
                self.buf.push('>');
            }
        }
    }

    fn serialize_element(&mut self, node: &Handle, tag: &str, attrs: &RefCell<Vec<Attribute>>) {
        if tag == self.fragment_tag {
            self.emit_fragment(attributes_of(attrs, None));
            self.flatten_nested_fragments(node);
            return;
        }
        // scripts can carry a fragment declaration to survive template
        // engines that mangle unknown tags
        if tag == "script" && attribute_value(attrs, "type").as_deref() == Some("fragment") {
            self.emit_fragment(attributes_of(attrs, Some("type")));
            self.flatten_nested_fragments(node);
            return;
        }
        if tag == "slot" {
            self.substitute_slot(node, attrs);
            return;
        }
        if self.handled_tags.iter().any(|handled| handled == tag) {
            self.flush();
            self.segments.push(RawSegment::Handled(TagInfo {
                name: tag.to_string(),
                attributes: attributes_of(attrs, None),
            }));
            return;
        }

        let is_void = VOID_ELEMENTS.contains(&tag);
        let is_raw = RAW_TEXT_ELEMENTS.contains(&tag);

        self.buf.push('<');
        self.buf.push_str(tag);
        for attr in attrs.borrow().iter() {
            self.buf.push(' ');
            self.buf.push_str(attr.name.local.as_ref());
            if !attr.value.is_empty() {
                self.buf.push_str("=\"");
                escape_attribute(&attr.value, &mut self.buf);
                self.buf.push('"');
            }
        }
        self.buf.push('>');

        if !is_void {
            self.serialize_children(node, is_raw);
            self.buf.push_str("</");
            self.buf.push_str(tag);
            self.buf.push('>');
        }
    }

    fn emit_fragment(&mut self, attributes: Vec<(String, String)>) {
        self.flush();
        let asynchronous = attributes.iter().any(|(k, _)| k == "async");
        self.segments.push(RawSegment::Fragment { attributes, asynchronous });
    }

    /// Fragment placeholders carry no renderable children, but fragments
    /// nested inside them are still real requests: they are emitted as
    /// siblings following the outer placeholder, in document order.
    fn flatten_nested_fragments(&mut self, node: &Handle) {
        for child in node.children.borrow().iter() {
            if let NodeData::Element { name, attrs, .. } = &child.data {
                let tag = name.local.as_ref();
                if tag == self.fragment_tag {
                    self.emit_fragment(attributes_of(attrs, None));
                } else if tag == "script" && attribute_value(attrs, "type").as_deref() == Some("fragment") {
                    self.emit_fragment(attributes_of(attrs, Some("type")));
                }
            }
            self.flatten_nested_fragments(child);
        }
    }

    fn substitute_slot(&mut self, node: &Handle, attrs: &RefCell<Vec<Attribute>>) {
        let slot_name = attribute_value(attrs, "name").unwrap_or_else(|| "default".to_string());

        if !self.seen_slots.insert(slot_name.clone()) {
            warn!(slot = %slot_name, "duplicate slot in base template, rendering fallback content");
            self.serialize_children(node, false);
            return;
        }

        match self.slots.remove(&slot_name) {
            Some(nodes) => {
                for slotted in &nodes {
                    self.serialize_node(slotted, false);
                }
            }
            // no child content for this slot, fall back to the slot's own
            // children
            None => self.serialize_children(node, false),
        }
    }

    fn flush(&mut self) {
        if !self.buf.is_empty() {
            self.segments.push(RawSegment::Content(std::mem::take(&mut self.buf)));
        }
    }
}

fn attribute_value(attrs: &RefCell<Vec<Attribute>>, name: &str) -> Option<String> {
    attrs.borrow().iter().find(|attr| attr.name.local.as_ref() == name).map(|attr| attr.value.to_string())
}

fn attributes_of(attrs: &RefCell<Vec<Attribute>>, exclude: Option<&str>) -> Vec<(String, String)> {
    attrs
        .borrow()
        .iter()
        .filter(|attr| Some(attr.name.local.as_ref()) != exclude)
        .map(|attr| (attr.name.local.as_ref().to_string(), attr.value.to_string()))
        .collect()
}

/// Escape text content for HTML
fn escape_text(text: &str, output: &mut String) {
    for c in text.chars() {
        match c {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            _ => output.push(c),
        }
    }
}

/// Escape attribute value
fn escape_attribute(text: &str, output: &mut String) {
    for c in text.chars() {
        match c {
            '&' => output.push_str("&amp;"),
            '"' => output.push_str("&quot;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            _ => output.push(c),
        }
    }
}
