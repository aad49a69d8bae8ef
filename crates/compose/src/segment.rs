//! The transform's output unit.

use bytes::Bytes;

/// One element of the ordered sequence a parsed template turns into.
///
/// `Content` segments are flushed to the client verbatim; `Fragment` and
/// `HandledTag` segments are substituted at request time with a live byte
/// stream (or a literal) produced by the fragment unit or a host tag handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Content(Bytes),
    Fragment(FragmentTag),
    HandledTag(TagInfo),
}

impl Segment {
    pub fn content(text: impl Into<Bytes>) -> Self {
        Self::Content(text.into())
    }
}

/// A fragment placeholder captured from the template.
///
/// Attributes keep their authored order. The position index is assigned by
/// the transform: a shared counter stepping by the configured max asset links,
/// numbering synchronous fragments in document order first and async
/// fragments afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentTag {
    pub attributes: Vec<(String, String)>,
    pub index: usize,
}

impl FragmentTag {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    /// Boolean attributes are true when present, even with an empty value.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|(k, _)| k == name)
    }
}

/// A custom tag delegated to the host's tag handler at request time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagInfo {
    pub name: String,
    pub attributes: Vec<(String, String)>,
}

impl TagInfo {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }
}
