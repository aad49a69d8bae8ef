//! Template tree transform.
//!
//! Parses base and child templates with html5ever, merges child content into
//! the base's slots and linearizes the tree into the ordered segment sequence
//! the orchestrator streams from.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use html5ever::tendril::TendrilSink;
use html5ever::{Attribute, ParseOpts, QualName, local_name, ns, parse_document, parse_fragment};
use markup5ever_rcdom::{Handle, NodeData, RcDom};

use super::serializer::{RawSegment, Serializer};
use crate::config::ComposeConfig;
use crate::segment::{FragmentTag, Segment};

pub struct Transform {
    fragment_tag: String,
    handled_tags: Vec<String>,
    max_asset_links: usize,
}

impl Transform {
    pub fn new(config: &ComposeConfig) -> Self {
        Self {
            fragment_tag: config.fragment_tag.clone(),
            handled_tags: config.handled_tags.clone(),
            max_asset_links: config.max_asset_links(),
        }
    }

    /// Linearizes `base` (optionally merged with `child` through its slots)
    /// into segments.
    ///
    /// With `full_rendering` the base is parsed as a complete document, so
    /// doctype, `<html>`, `<head>` and `<body>` survive; without it the base
    /// is parsed in body context and only its own markup is emitted.
    pub fn apply(&self, base: &str, child: Option<&str>, full_rendering: bool) -> Vec<Segment> {
        let slots = child.map(|child| group_slots(&parse_body_fragment(child))).unwrap_or_default();

        let mut serializer = Serializer::new(&self.fragment_tag, &self.handled_tags, slots);
        if full_rendering {
            let dom = parse_document(RcDom::default(), ParseOpts::default()).one(base);
            serializer.serialize_children(&dom.document, false);
        } else {
            serializer.serialize_children(&parse_body_fragment(base), false);
        }

        self.assign_indices(serializer.finish())
    }

    /// Position indices stride by the asset-link cap so every fragment owns a
    /// contiguous block of asset numbers. Synchronous fragments take the low
    /// block in document order; async fragments follow.
    fn assign_indices(&self, raw: Vec<RawSegment>) -> Vec<Segment> {
        let sync_count =
            raw.iter().filter(|s| matches!(s, RawSegment::Fragment { asynchronous: false, .. })).count();

        let mut next_sync = 0usize;
        let mut next_async = sync_count;

        raw.into_iter()
            .map(|segment| match segment {
                RawSegment::Content(text) => Segment::content(text),
                RawSegment::Handled(tag) => Segment::HandledTag(tag),
                RawSegment::Fragment { attributes, asynchronous } => {
                    let position = if asynchronous {
                        let p = next_async;
                        next_async += 1;
                        p
                    } else {
                        let p = next_sync;
                        next_sync += 1;
                        p
                    };
                    Segment::Fragment(FragmentTag { attributes, index: position * self.max_asset_links })
                }
            })
            .collect()
    }
}

/// Parses markup in `<body>` context and returns the synthetic root element
/// the parsed nodes hang off.
fn parse_body_fragment(html: &str) -> Handle {
    let dom = parse_fragment(
        RcDom::default(),
        ParseOpts::default(),
        QualName::new(None, ns!(html), local_name!("body")),
        Vec::new(),
        false,
    )
    .one(html);

    let root = dom.document.children.borrow().first().cloned();
    root.unwrap_or_else(|| Rc::clone(&dom.document))
}

/// Groups a child template's top-level nodes by target slot.
///
/// Elements pick their slot via the `slot` attribute (consumed here) and
/// default to `"default"`. Text and comment nodes travel with the preceding
/// element's slot, so trailing whitespace stays attached.
fn group_slots(root: &Handle) -> HashMap<String, Vec<Handle>> {
    let mut slots: HashMap<String, Vec<Handle>> = HashMap::new();
    let mut last_slot = "default".to_string();

    for child in root.children.borrow().iter() {
        match &child.data {
            NodeData::Element { attrs, .. } => {
                let slot_name = take_attribute(attrs, "slot").unwrap_or_else(|| "default".to_string());
                slots.entry(slot_name.clone()).or_default().push(Rc::clone(child));
                last_slot = slot_name;
            }
            NodeData::Text { .. } | NodeData::Comment { .. } => {
                slots.entry(last_slot.clone()).or_default().push(Rc::clone(child));
            }
            _ => {}
        }
    }

    slots
}

fn take_attribute(attrs: &RefCell<Vec<Attribute>>, name: &str) -> Option<String> {
    let mut attrs = attrs.borrow_mut();
    let position = attrs.iter().position(|attr| attr.name.local.as_ref() == name)?;
    Some(attrs.remove(position).value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transform(max_asset_links: usize) -> Transform {
        Transform::new(&ComposeConfig { max_asset_links, ..Default::default() })
    }

    fn rendered(segments: &[Segment]) -> String {
        segments
            .iter()
            .map(|s| match s {
                Segment::Content(bytes) => std::str::from_utf8(bytes).unwrap().to_string(),
                Segment::Fragment(tag) => format!("[fragment #{}]", tag.index),
                Segment::HandledTag(tag) => format!("[{}]", tag.name),
            })
            .collect()
    }

    #[test]
    fn plain_markup_is_one_content_segment() {
        let segments = transform(1).apply("<div><p>hi &amp; bye</p></div>", None, false);
        assert_eq!(rendered(&segments), "<div><p>hi &amp; bye</p></div>");
    }

    #[test]
    fn fragment_tags_split_the_sequence() {
        let segments = transform(1).apply("<div><fragment src=\"http://a\"></fragment></div>", None, false);

        assert_eq!(segments.len(), 3);
        let Segment::Fragment(tag) = &segments[1] else { panic!("expected fragment segment") };
        assert_eq!(tag.attribute("src"), Some("http://a"));
        assert_eq!(tag.index, 0);
    }

    #[test]
    fn script_fragment_syntax_is_equivalent() {
        let segments = transform(1).apply("<script type=\"fragment\" src=\"http://a\"></script>", None, false);

        let Segment::Fragment(tag) = &segments[0] else { panic!("expected fragment segment") };
        assert_eq!(tag.attribute("src"), Some("http://a"));
        assert!(tag.attribute("type").is_none());
    }

    #[test]
    fn indices_stride_by_asset_cap() {
        let segments = transform(3).apply(
            "<fragment src=\"http://a\"></fragment><fragment src=\"http://b\"></fragment>",
            None,
            false,
        );

        let indices: Vec<_> = segments
            .iter()
            .filter_map(|s| match s {
                Segment::Fragment(tag) => Some(tag.index),
                _ => None,
            })
            .collect();
        assert_eq!(indices, [0, 3]);
    }

    #[test]
    fn async_fragments_are_numbered_after_sync_ones() {
        let segments = transform(1).apply(
            "<fragment async src=\"http://a\"></fragment><fragment src=\"http://b\"></fragment>",
            None,
            false,
        );

        let Segment::Fragment(first) = &segments[0] else { panic!() };
        let Segment::Fragment(second) = &segments[1] else { panic!() };
        assert!(first.has_attribute("async"));
        assert_eq!(first.index, 1);
        assert_eq!(second.index, 0);
    }

    #[test]
    fn nested_fragments_are_flattened_to_siblings() {
        let segments = transform(1).apply(
            "<fragment src=\"http://outer\"><fragment src=\"http://inner\"></fragment></fragment>",
            None,
            false,
        );

        let srcs: Vec<_> = segments
            .iter()
            .filter_map(|s| match s {
                Segment::Fragment(tag) => tag.attribute("src"),
                _ => None,
            })
            .collect();
        assert_eq!(srcs, ["http://outer", "http://inner"]);
    }

    #[test]
    fn child_content_fills_named_slot() {
        let base = "<div><slot name=\"main\"><p>fallback</p></slot></div>";
        let child = "<h1 slot=\"main\">Hello</h1>";

        let segments = transform(1).apply(base, Some(child), false);
        assert_eq!(rendered(&segments), "<div><h1>Hello</h1></div>");
    }

    #[test]
    fn unnamed_child_content_lands_in_default_slot() {
        let base = "<header></header><slot></slot><footer></footer>";
        let child = "<p>body</p> trailing";

        let segments = transform(1).apply(base, Some(child), false);
        assert_eq!(rendered(&segments), "<header></header><p>body</p> trailing<footer></footer>");
    }

    #[test]
    fn empty_slot_renders_fallback_children() {
        let base = "<slot name=\"side\"><aside>none</aside></slot>";
        let segments = transform(1).apply(base, Some("<p>main only</p>"), false);
        assert_eq!(rendered(&segments), "<aside>none</aside>");
    }

    #[test]
    fn duplicate_slot_renders_fallback() {
        let base = "<slot name=\"x\">a</slot><slot name=\"x\">b</slot>";
        let segments = transform(1).apply(base, Some("<p slot=\"x\">child</p>"), false);
        assert_eq!(rendered(&segments), "<p>child</p>b");
    }

    #[test]
    fn handled_tags_become_their_own_segments() {
        let t = Transform::new(&ComposeConfig {
            handled_tags: vec!["x-esi".to_string()],
            ..Default::default()
        });
        let segments = t.apply("<div><x-esi src=\"/inc\"></x-esi></div>", None, false);

        let Segment::HandledTag(tag) = &segments[1] else { panic!("expected handled tag segment") };
        assert_eq!(tag.name, "x-esi");
        assert_eq!(tag.attribute("src"), Some("/inc"));
    }

    #[test]
    fn full_rendering_keeps_document_scaffolding() {
        let base = "<!DOCTYPE html><html><head><title>t</title></head><body><fragment src=\"http://a\"></fragment></body></html>";
        let segments = transform(1).apply(base, None, true);

        let html = rendered(&segments);
        assert!(html.starts_with("<!DOCTYPE html><html>"));
        assert!(html.contains("<title>t</title>"));
        assert!(html.contains("[fragment #0]"));
        assert!(html.ends_with("</body></html>"));
    }

    #[test]
    fn raw_text_elements_are_not_escaped() {
        let segments = transform(1).apply("<script>if (a && b) {}</script>", None, false);
        assert_eq!(rendered(&segments), "<script>if (a && b) {}</script>");
    }

    #[test]
    fn boolean_attributes_render_without_value() {
        let segments = transform(1).apply("<input disabled>", None, false);
        assert_eq!(rendered(&segments), "<input disabled>");
    }
}
