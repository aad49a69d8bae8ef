//! Fragment attribute resolution.

use serde_json::{Map, Value};

use crate::config::DEFAULT_FRAGMENT_TIMEOUT_MS;
use crate::segment::FragmentTag;

/// The effective attributes of one fragment after the page context had its
/// say.
///
/// The context object is keyed by fragment id; its entries override the
/// authored template attributes, so a deployment can repoint or re-flag a
/// fragment per request without template changes.
#[derive(Debug, Clone)]
pub struct FragmentAttributes {
    pub id: Option<String>,
    /// Origin URL, from the `src` attribute. Fragments without one are
    /// rejected before any request is made.
    pub src: Option<String>,
    pub asynchronous: bool,
    pub primary: bool,
    /// Public fragments receive none of the inbound request headers.
    pub public: bool,
    pub timeout_ms: u64,
    /// Merge this fragment's (filtered) response headers into the page head.
    pub return_headers: bool,
    /// Append the inbound query string to the fragment URL. Keys already on
    /// the fragment URL win.
    pub forward_querystring: bool,
    pub ignore_invalid_ssl: bool,
    /// Every resolved attribute, authored order first, for host collaborators.
    pub all: Vec<(String, String)>,
}

impl FragmentAttributes {
    pub fn resolve(tag: &FragmentTag, context: &Map<String, Value>) -> Self {
        let mut attributes = tag.attributes.clone();

        // context overrides are looked up by the authored id
        if let Some(id) = value_of(&attributes, "id")
            && let Some(Value::Object(overrides)) = context.get(&id)
        {
            for (key, value) in overrides {
                apply_override(&mut attributes, key, value);
            }
        }

        let timeout_ms = value_of(&attributes, "timeout")
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(DEFAULT_FRAGMENT_TIMEOUT_MS);

        Self {
            id: value_of(&attributes, "id"),
            src: value_of(&attributes, "src"),
            asynchronous: has(&attributes, "async"),
            primary: has(&attributes, "primary"),
            public: has(&attributes, "public"),
            timeout_ms,
            return_headers: has(&attributes, "return-headers"),
            forward_querystring: has(&attributes, "forward-querystring"),
            ignore_invalid_ssl: has(&attributes, "ignore-invalid-ssl"),
            all: attributes,
        }
    }
}

/// A JSON `false` or `null` removes the attribute; `true` asserts presence;
/// strings and numbers replace the value.
fn apply_override(attributes: &mut Vec<(String, String)>, key: &str, value: &Value) {
    let replacement = match value {
        Value::Bool(false) | Value::Null => {
            attributes.retain(|(k, _)| k != key);
            return;
        }
        Value::Bool(true) => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        // arrays and objects have no attribute representation
        _ => return,
    };

    match attributes.iter_mut().find(|(k, _)| k == key) {
        Some((_, v)) => *v = replacement,
        None => attributes.push((key.to_string(), replacement)),
    }
}

fn value_of(attributes: &[(String, String)], name: &str) -> Option<String> {
    attributes.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone())
}

/// Boolean attributes are true by presence, even with an empty value.
fn has(attributes: &[(String, String)], name: &str) -> bool {
    attributes.iter().any(|(k, _)| k == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(attributes: &[(&str, &str)]) -> FragmentTag {
        FragmentTag {
            attributes: attributes.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            index: 0,
        }
    }

    #[test]
    fn defaults_without_context() {
        let resolved = FragmentAttributes::resolve(&tag(&[("src", "http://a")]), &Map::new());

        assert_eq!(resolved.src.as_deref(), Some("http://a"));
        assert!(resolved.id.is_none());
        assert!(!resolved.primary);
        assert_eq!(resolved.timeout_ms, 3000);
    }

    #[test]
    fn presence_makes_booleans_true() {
        let resolved = FragmentAttributes::resolve(&tag(&[("src", "http://a"), ("primary", ""), ("public", "")]), &Map::new());
        assert!(resolved.primary);
        assert!(resolved.public);
    }

    #[test]
    fn invalid_timeout_falls_back_to_default() {
        let resolved = FragmentAttributes::resolve(&tag(&[("src", "http://a"), ("timeout", "soon")]), &Map::new());
        assert_eq!(resolved.timeout_ms, 3000);

        let resolved = FragmentAttributes::resolve(&tag(&[("src", "http://a"), ("timeout", "250")]), &Map::new());
        assert_eq!(resolved.timeout_ms, 250);
    }

    #[test]
    fn context_entry_overrides_by_id() {
        let context: Map<String, Value> = serde_json::from_str(
            r#"{"hello": {"src": "http://b", "timeout": 100, "primary": true}}"#,
        )
        .unwrap();

        let resolved = FragmentAttributes::resolve(&tag(&[("id", "hello"), ("src", "http://a")]), &context);
        assert_eq!(resolved.src.as_deref(), Some("http://b"));
        assert_eq!(resolved.timeout_ms, 100);
        assert!(resolved.primary);
    }

    #[test]
    fn context_false_removes_an_attribute() {
        let context: Map<String, Value> = serde_json::from_str(r#"{"hello": {"primary": false}}"#).unwrap();

        let resolved =
            FragmentAttributes::resolve(&tag(&[("id", "hello"), ("src", "http://a"), ("primary", "")]), &context);
        assert!(!resolved.primary);
    }

    #[test]
    fn context_for_other_ids_is_ignored() {
        let context: Map<String, Value> = serde_json::from_str(r#"{"other": {"src": "http://b"}}"#).unwrap();

        let resolved = FragmentAttributes::resolve(&tag(&[("id", "hello"), ("src", "http://a")]), &context);
        assert_eq!(resolved.src.as_deref(), Some("http://a"));
    }
}
