//! Pre-parse region cutting.
//!
//! Templates can wrap regions the HTML5 parser must not touch (ESI markup,
//! server-side includes, vendor comments) between marker comments. Those
//! regions are lifted out before parsing and spliced back byte-for-byte into
//! the parsed segment sequence.

use bytes::Bytes;

use crate::error::ComposeError;
use crate::segment::Segment;

pub const IGNORE_START: &str = "<!-- Quilt: Ignore during parsing START -->";
pub const IGNORE_END: &str = "<!-- Quilt: Ignore during parsing END -->";

const PLACEHOLDER_PREFIX: &str = "<!-- Quilt: Ignored content during parsing #";
const PLACEHOLDER_SUFFIX: &str = " -->";

pub fn placeholder(index: usize) -> String {
    format!("{PLACEHOLDER_PREFIX}{index}{PLACEHOLDER_SUFFIX}")
}

/// Single-use per template: `cut` records the lifted regions, `restore`
/// consumes them.
#[derive(Debug, Default)]
pub struct Cutter {
    cuts: Vec<String>,
}

impl Cutter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces each marked region (markers included) with a numbered
    /// placeholder comment. Regions are numbered in discovery order. A start
    /// marker without a matching end extends to the end of the input.
    pub fn cut(&mut self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find(IGNORE_START) {
            out.push_str(&rest[..start]);

            let span_end = match rest[start..].find(IGNORE_END) {
                Some(end) => start + end + IGNORE_END.len(),
                None => rest.len(),
            };

            out.push_str(&placeholder(self.cuts.len()));
            self.cuts.push(rest[start..span_end].to_string());
            rest = &rest[span_end..];
        }

        out.push_str(rest);
        out
    }

    /// Splices the recorded regions back into the content segments, draining
    /// the record. A placeholder referencing an unknown region is fatal: it
    /// means the cutter was reused across templates or the sequence was
    /// corrupted.
    pub fn restore(&mut self, segments: Vec<Segment>) -> Result<Vec<Segment>, ComposeError> {
        let cuts = std::mem::take(&mut self.cuts);

        segments
            .into_iter()
            .map(|segment| match segment {
                Segment::Content(bytes) => restore_content(&bytes, &cuts).map(Segment::Content),
                other => Ok(other),
            })
            .collect()
    }
}

fn restore_content(bytes: &Bytes, cuts: &[String]) -> Result<Bytes, ComposeError> {
    let text = std::str::from_utf8(bytes).map_err(|_| ComposeError::stream("template content is not valid UTF-8"))?;
    if !text.contains(PLACEHOLDER_PREFIX) {
        return Ok(bytes.clone());
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(PLACEHOLDER_PREFIX) {
        out.push_str(&rest[..start]);
        let after_prefix = &rest[start + PLACEHOLDER_PREFIX.len()..];

        let Some((digits, _)) = after_prefix.split_once(PLACEHOLDER_SUFFIX) else {
            // a truncated placeholder is authored content, not ours
            out.push_str(&rest[start..start + PLACEHOLDER_PREFIX.len()]);
            rest = after_prefix;
            continue;
        };

        match digits.parse::<usize>() {
            Ok(index) => {
                let cut = cuts.get(index).ok_or(ComposeError::Restore { index })?;
                out.push_str(cut);
                rest = &after_prefix[digits.len() + PLACEHOLDER_SUFFIX.len()..];
            }
            Err(_) => {
                out.push_str(&rest[start..start + PLACEHOLDER_PREFIX.len()]);
                rest = after_prefix;
            }
        }
    }

    out.push_str(rest);
    Ok(Bytes::from(out))
}
