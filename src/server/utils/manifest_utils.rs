use tracing::{debug, error};
use url::Url;

use super::proxy_url_utils::ProxyUrlBuilder;

pub const HLS_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// rewrites every uri line of an m3u8 so it goes back through the proxy. Tag and blank lines are
/// untouched and the output always has exactly as many lines as the input, players get very
/// confused when the media sequence and the uris stop lining up
#[derive(Debug, Clone)]
pub struct ManifestRewriter {
    proxy: ProxyUrlBuilder,
}

impl ManifestRewriter {
    pub fn new(proxy: ProxyUrlBuilder) -> Self {
        Self { proxy }
    }

    pub fn rewrite(&self, manifest: &str, source: &Url) -> String {
        let base = Self::base_directory(source);

        manifest
            .split('\n')
            .map(|line| {
                // keep \r\n manifests as \r\n
                let (content, ending) = match line.strip_suffix('\r') {
                    Some(stripped) => (stripped, "\r"),
                    None => (line, ""),
                };

                match self.rewrite_line(content, &base) {
                    Some(rewritten) => format!("{}{}", rewritten, ending),
                    None => line.to_string(),
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// None means pass the line through as is
    fn rewrite_line(&self, line: &str, base: &Url) -> Option<String> {
        let trimmed = line.trim();

        if trimmed.is_empty() || trimmed.starts_with('#') {
            return None;
        }

        // already one of ours, wrap the inner url once instead of nesting
        if let Some(inner) = self.proxy.unwrap(trimmed) {
            return Some(self.proxy.wrap(&inner));
        }

        let full_url = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else {
            match base.join(trimmed) {
                Ok(resolved) => resolved.to_string(),
                Err(e) => {
                    error!("Failed to resolve: {} - {}", trimmed, e);
                    return None;
                }
            }
        };

        debug!("rewrote manifest line {} -> {}", trimmed, full_url);
        Some(self.proxy.wrap(&full_url))
    }

    /// scheme + host + directory of the manifest path, query and fragment dropped
    fn base_directory(source: &Url) -> Url {
        let mut base = source.clone();
        base.set_query(None);
        base.set_fragment(None);

        let dir_end = base.path().rfind('/').map(|i| i + 1).unwrap_or(0);
        let dir = base.path()[..dir_end].to_string();
        base.set_path(if dir.is_empty() { "/" } else { &dir });
        base
    }
}

/// manifest vs binary segment, decided by declared content type first and url suffix second
pub fn is_manifest(content_type: Option<&str>, url: &Url) -> bool {
    if let Some(ct) = content_type {
        let ct = ct.to_ascii_lowercase();
        if ct.contains("mpegurl") || ct.contains("m3u") {
            return true;
        }
    }

    url.path().to_ascii_lowercase().ends_with(".m3u8")
}

/// some origins serve playlists as text/plain from token urls with no suffix
pub fn looks_like_manifest(body: &[u8]) -> bool {
    let start = body
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(body.len());
    // utf-8 bom
    let body = &body[start..];
    let body = body.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(body);
    body.starts_with(b"#EXTM3U")
}
