use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// scrapers never agree on a response shape, so this just goes looking for anything that smells
/// like an m3u8 url. Known fields are searched first, then the whole tree.
static M3U8_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"https?://[^\s"']+\.m3u8[^\s"']*"#).expect("m3u8 url regex should compile")
});

/// tokens that show up in demo/fallback urls scrapers sometimes echo back
const PLACEHOLDER_TOKENS: [&str; 2] = ["example", "placeholder"];

pub fn is_valid_manifest_url(candidate: &str) -> bool {
    (candidate.starts_with("http://") || candidate.starts_with("https://"))
        && candidate.contains(".m3u8")
        && !PLACEHOLDER_TOKENS.iter().any(|t| candidate.contains(t))
}

/// every valid manifest url in the payload, deduplicated, in search order:
/// `requests[].url`, then the `data` text, then the `html` text, then a walk over everything
pub fn extract_candidates(payload: &Value) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();

    if let Some(requests) = payload.get("requests").and_then(Value::as_array) {
        found.extend(
            requests
                .iter()
                .filter_map(|r| r.get("url").and_then(Value::as_str))
                .map(str::to_string),
        );
    }

    for field in ["data", "html"] {
        if let Some(text) = payload.get(field).and_then(Value::as_str) {
            found.extend(match_urls(text));
        }
    }

    walk(payload, &mut found);

    let mut seen = HashSet::new();
    found
        .into_iter()
        .filter(|url| is_valid_manifest_url(url))
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

fn match_urls(text: &str) -> impl Iterator<Item = String> + '_ {
    M3U8_URL.find_iter(text).map(|m| m.as_str().to_string())
}

fn walk(value: &Value, found: &mut Vec<String>) {
    match value {
        Value::String(s) if s.contains(".m3u8") => found.extend(match_urls(s)),
        Value::Array(items) => items.iter().for_each(|v| walk(v, found)),
        Value::Object(map) => map.values().for_each(|v| walk(v, found)),
        _ => {}
    }
}
