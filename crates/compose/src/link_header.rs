//! `Link` header parsing.
//!
//! Fragment origins advertise their scripts and stylesheets through `Link`
//! headers (plus a vendor alias some CDNs rewrite into `x-amz-meta-link`);
//! several header instances may arrive joined by commas. Bare URIs without
//! the `<...>` wrapper are accepted for backwards compatibility.

use std::collections::HashMap;

/// One parsed link directive. Records without a `rel` value are dropped
/// during parsing, so `rel` is always non-empty here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRecord {
    pub uri: String,
    pub rel: String,
    pub params: HashMap<String, String>,
}

/// Parses a (possibly concatenated) `Link` header value.
///
/// Splitting happens on commas that introduce a new `<uri>` token, so commas
/// inside parameter values survive. Output order matches input order; URIs
/// are passed through without normalization.
pub fn parse_link_header(value: &str) -> Vec<LinkRecord> {
    split_directives(value)
        .into_iter()
        .filter_map(|directive| parse_directive(&directive))
        .collect()
}

/// Splits on commas that are followed (modulo whitespace) by a `<`, after
/// auto-wrapping bare URIs so legacy senders hit the same split points.
fn split_directives(value: &str) -> Vec<String> {
    let fixed = wrap_bare_uris(value);
    let bytes = fixed.as_bytes();

    let mut parts = Vec::new();
    let mut start = 0;
    for (i, &b) in bytes.iter().enumerate() {
        if b != b',' {
            continue;
        }
        let rest = fixed[i + 1..].trim_start();
        if rest.starts_with('<') {
            parts.push(fixed[start..i].to_string());
            start = i + 1;
        }
    }
    parts.push(fixed[start..].to_string());
    parts
}

/// Rewrites each comma-separated directive so the URI token is wrapped in
/// `<...>` and unquoted parameter values gain quotes, mirroring what strict
/// senders produce.
fn wrap_bare_uris(value: &str) -> String {
    value
        .split(',')
        .map(|directive| {
            directive
                .split(';')
                .enumerate()
                .map(|(i, part)| {
                    let trimmed = part.trim();
                    if i == 0 {
                        if trimmed.is_empty() || trimmed.starts_with('<') {
                            part.to_string()
                        } else {
                            format!("<{trimmed}>")
                        }
                    } else {
                        match trimmed.split_once('=') {
                            Some((key, val)) if !val.is_empty() && !val.trim_start().starts_with('"') => {
                                format!("{key}=\"{val}\"")
                            }
                            _ => part.to_string(),
                        }
                    }
                })
                .collect::<Vec<_>>()
                .join(";")
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_directive(directive: &str) -> Option<LinkRecord> {
    let open = directive.find('<')?;
    let close = directive[open..].find('>')? + open;
    let uri = directive[open + 1..close].to_string();

    let mut params = HashMap::new();
    for part in directive[close + 1..].split(';') {
        let Some((key, value)) = part.split_once('=') else { continue };
        let key = key.trim().to_string();
        let value = value.trim().trim_matches('"').to_string();
        if !key.is_empty() {
            params.insert(key, value);
        }
    }

    let rel = params.get("rel").cloned().filter(|rel| !rel.is_empty())?;
    Some(LinkRecord { uri, rel, params })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_directive() {
        let records = parse_link_header("<http://assets/script.js>; rel=\"fragment-script\"");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].uri, "http://assets/script.js");
        assert_eq!(records[0].rel, "fragment-script");
    }

    #[test]
    fn parses_multiple_directives_in_order() {
        let records = parse_link_header(
            "<http://a/1.css>; rel=\"stylesheet\", <http://a/1.js>; rel=\"fragment-script\", <http://a/2.js>; rel=\"fragment-script\"",
        );
        let uris: Vec<_> = records.iter().map(|r| r.uri.as_str()).collect();
        assert_eq!(uris, ["http://a/1.css", "http://a/1.js", "http://a/2.js"]);
    }

    #[test]
    fn wraps_bare_uris() {
        let records = parse_link_header("http://assets/script.js; rel=fragment-script");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].uri, "http://assets/script.js");
        assert_eq!(records[0].rel, "fragment-script");
    }

    #[test]
    fn drops_records_without_rel() {
        let records = parse_link_header("<http://a/1.js>, <http://a/2.js>; rel=\"fragment-script\", <http://a/3.js>; rel=\"\"");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].uri, "http://a/2.js");
    }

    #[test]
    fn keeps_extra_params_unquoted_and_case_sensitive() {
        let records = parse_link_header("<http://a/1.js>; rel=\"preload\"; as=\"script\"; NoPush=1");
        assert_eq!(records[0].params.get("as").map(String::as_str), Some("script"));
        assert_eq!(records[0].params.get("NoPush").map(String::as_str), Some("1"));
        assert!(!records[0].params.contains_key("nopush"));
    }

    #[test]
    fn parsing_is_deterministic() {
        let value = "<http://a/1.css>; rel=\"stylesheet\", http://a/1.js; rel=fragment-script";
        assert_eq!(parse_link_header(value), parse_link_header(value));
    }

    #[test]
    fn empty_header_yields_nothing() {
        assert!(parse_link_header("").is_empty());
        assert!(parse_link_header(",").is_empty());
    }
}
