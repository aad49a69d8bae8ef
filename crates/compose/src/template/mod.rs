//! Template parsing pipeline: cut, transform, restore, memoize.

pub mod cutter;
mod serializer;
mod transform;

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use tracing::trace;

use crate::config::ComposeConfig;
use crate::error::ComposeError;
use crate::segment::Segment;
use cutter::Cutter;
use transform::Transform;

type TemplateKey = (String, Option<String>, bool);

/// The single template entry point used by the orchestrator and the host's
/// template fetcher.
///
/// Parsing is pure per input, so results are memoized as shared immutable
/// segment slices keyed by the exact (base, child, full-rendering) triple.
/// A cache capacity of 0 turns memoization off.
pub struct TemplateParser {
    transform: Transform,
    cache: Option<Mutex<LruCache<TemplateKey, Arc<[Segment]>>>>,
}

impl TemplateParser {
    pub fn new(config: &ComposeConfig) -> Self {
        let cache = NonZeroUsize::new(config.template_cache_size).map(|capacity| Mutex::new(LruCache::new(capacity)));
        Self { transform: Transform::new(config), cache }
    }

    pub fn parse(
        &self,
        base: &str,
        child: Option<&str>,
        full_rendering: bool,
    ) -> Result<Arc<[Segment]>, ComposeError> {
        let key: TemplateKey = (base.to_string(), child.map(str::to_string), full_rendering);

        if let Some(cache) = &self.cache
            && let Ok(mut cache) = cache.lock()
            && let Some(hit) = cache.get(&key)
        {
            trace!("template cache hit");
            return Ok(Arc::clone(hit));
        }

        let mut cutter = Cutter::new();
        let base = cutter.cut(base);
        let child = child.map(|child| cutter.cut(child));

        let segments = self.transform.apply(&base, child.as_deref(), full_rendering);
        let segments: Arc<[Segment]> = cutter.restore(segments)?.into();

        if let Some(cache) = &self.cache
            && let Ok(mut cache) = cache.lock()
        {
            cache.put(key, Arc::clone(&segments));
        }

        Ok(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser(cache_size: usize) -> TemplateParser {
        TemplateParser::new(&ComposeConfig { template_cache_size: cache_size, ..Default::default() })
    }

    #[test]
    fn parse_is_deterministic() {
        let parser = parser(0);
        let base = "<div><fragment src=\"http://a\"></fragment></div>";
        assert_eq!(*parser.parse(base, None, false).unwrap(), *parser.parse(base, None, false).unwrap());
    }

    #[test]
    fn cached_parse_returns_the_same_slice() {
        let parser = parser(8);
        let base = "<div><fragment src=\"http://a\"></fragment></div>";

        let first = parser.parse(base, None, false).unwrap();
        let second = parser.parse(base, None, false).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn cache_distinguishes_full_rendering() {
        let parser = parser(8);
        let base = "<p>x</p>";

        let fragment_mode = parser.parse(base, None, false).unwrap();
        let document_mode = parser.parse(base, None, true).unwrap();
        assert!(!Arc::ptr_eq(&fragment_mode, &document_mode));
    }

    #[test]
    fn ignored_regions_survive_parsing_verbatim() {
        let parser = parser(0);
        let base = format!(
            "<div>{}<esi:include src=\"/x\"/>{}</div>",
            cutter::IGNORE_START,
            cutter::IGNORE_END
        );

        let segments = parser.parse(&base, None, false).unwrap();
        let Segment::Content(bytes) = &segments[0] else { panic!("expected content") };
        let text = std::str::from_utf8(bytes).unwrap();
        assert!(text.contains("<esi:include src=\"/x\"/>"));
        assert!(text.contains(cutter::IGNORE_START));
    }
}
