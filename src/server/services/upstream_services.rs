use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use reqwest::{StatusCode, header};
use tracing::{debug, error};
use url::Url;

use crate::server::{
    error::{AppResult, Error},
    services::resolver_services::BROWSER_USER_AGENT,
    utils::{
        encoding_utils::{ContentEncoding, UPSTREAM_ACCEPT_ENCODING},
        manifest_utils::{ManifestRewriter, is_manifest, looks_like_manifest},
    },
};

pub type DynUpstreamService = Arc<dyn UpstreamServiceTrait + Send + Sync>;

/// player origins refuse manifests and segments unless they see their own Origin/Referer
pub struct UpstreamFamily {
    pub name: &'static str,
    pub host_markers: &'static [&'static str],
    pub origin: &'static str,
    pub referer: &'static str,
}

pub static UPSTREAM_FAMILIES: [UpstreamFamily; 3] = [
    UpstreamFamily {
        name: "vidfast",
        host_markers: &["spectraflux", "vidfast"],
        origin: "https://vidfast.pro",
        referer: "https://vidfast.pro/",
    },
    UpstreamFamily {
        name: "vidlink",
        host_markers: &["vidlink"],
        origin: "https://vidlink.pro",
        referer: "https://vidlink.pro/",
    },
    UpstreamFamily {
        name: "videasy",
        host_markers: &["videasy"],
        origin: "https://player.videasy.net",
        referer: "https://player.videasy.net/",
    },
];

pub fn family_for(url: &Url) -> Option<&'static UpstreamFamily> {
    let host = url.host_str()?.to_ascii_lowercase();
    UPSTREAM_FAMILIES
        .iter()
        .find(|family| family.host_markers.iter().any(|m| host.contains(m)))
}

pub enum ProxiedAsset {
    /// playlist already rewritten to point back at us
    Manifest { body: String },
    /// anything else, passed through untouched
    Segment {
        status: StatusCode,
        content_type: String,
        content_length: Option<u64>,
        content_range: Option<String>,
        content_encoding: Option<String>,
        body: Body,
    },
}

#[async_trait]
pub trait UpstreamServiceTrait {
    /// fetch `target`, forwarding `range` when the client asked for part of a segment
    async fn fetch(&self, target: &Url, range: Option<&str>) -> AppResult<ProxiedAsset>;
}

pub struct UpstreamService {
    http: reqwest::Client,
    rewriter: ManifestRewriter,
    timeout: Duration,
}

impl UpstreamService {
    pub fn new(http: reqwest::Client, rewriter: ManifestRewriter, timeout: Duration) -> Self {
        Self {
            http,
            rewriter,
            timeout,
        }
    }

    fn apply_family_headers(
        mut request_builder: reqwest::RequestBuilder,
        target: &Url,
    ) -> reqwest::RequestBuilder {
        request_builder = request_builder
            .header(header::USER_AGENT, BROWSER_USER_AGENT)
            .header(header::ACCEPT, "*/*")
            .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .header(header::CACHE_CONTROL, "no-cache")
            .header(header::PRAGMA, "no-cache");

        match family_for(target) {
            Some(family) => {
                debug!("using {} headers for {}", family.name, target);
                request_builder
                    .header(header::ORIGIN, family.origin)
                    .header(header::REFERER, family.referer)
            }
            None => request_builder,
        }
    }

    fn header_string(response: &reqwest::Response, name: header::HeaderName) -> Option<String> {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    }

    async fn read_manifest(&self, response: reqwest::Response, target: &Url) -> AppResult<String> {
        let encoding = ContentEncoding::from_content_encoding(
            response
                .headers()
                .get(header::CONTENT_ENCODING)
                .and_then(|v| v.to_str().ok()),
        );

        let bytes = tokio::time::timeout(self.timeout, response.bytes())
            .await
            .map_err(|_| Error::Upstream("Timed out reading manifest".to_string()))?
            .map_err(|e| {
                error!("Failed to read response: {}", e);
                Error::Upstream(format!("Failed to read response: {}", e))
            })?;

        let decompressed = encoding.decompress(&bytes).map_err(|e| {
            error!("Failed to decompress manifest: {}", e);
            Error::Upstream("Failed to decompress response".to_string())
        })?;

        let text = String::from_utf8(decompressed).map_err(|e| {
            error!("Failed to parse m3u8 as UTF-8: {}", e);
            Error::Upstream("Invalid m3u8 encoding".to_string())
        })?;

        Ok(self.rewriter.rewrite(&text, target))
    }
}

#[async_trait]
impl UpstreamServiceTrait for UpstreamService {
    async fn fetch(&self, target: &Url, range: Option<&str>) -> AppResult<ProxiedAsset> {
        let expects_manifest = is_manifest(None, target);

        let mut request_builder = Self::apply_family_headers(self.http.get(target.clone()), target);

        // segments go through as opaque bytes so don't let upstream compress them on us
        request_builder = request_builder.header(
            header::ACCEPT_ENCODING,
            if expects_manifest {
                UPSTREAM_ACCEPT_ENCODING
            } else {
                "identity"
            },
        );

        if let Some(range) = range {
            request_builder = request_builder.header(header::RANGE, range);
        }

        let response = tokio::time::timeout(self.timeout, request_builder.send())
            .await
            .map_err(|_| {
                error!("Upstream timed out: {}", target);
                Error::Upstream(format!(
                    "Upstream timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                error!("Request failed: {}", e);
                Error::Upstream(format!("Request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            error!("Response from upstream not successful: {} ({})", status, target);
            return Err(match status {
                StatusCode::NOT_FOUND | StatusCode::GONE => {
                    Error::NotFound(format!("Upstream returned {}", status))
                }
                _ => Error::Upstream(format!("Failed to fetch stream: {}", status)),
            });
        }

        let content_type = Self::header_string(&response, header::CONTENT_TYPE);

        if is_manifest(content_type.as_deref(), target) {
            let body = self.read_manifest(response, target).await?;
            return Ok(ProxiedAsset::Manifest { body });
        }

        let content_encoding = Self::header_string(&response, header::CONTENT_ENCODING);
        let content_range = Self::header_string(&response, header::CONTENT_RANGE);
        let content_type = content_type.unwrap_or_else(|| "application/octet-stream".to_string());

        // text bodies get a peek in case it's a playlist behind a token url
        if content_type.starts_with("text/") && content_encoding.is_none() {
            let bytes = tokio::time::timeout(self.timeout, response.bytes())
                .await
                .map_err(|_| Error::Upstream("Timed out reading response".to_string()))?
                .map_err(|e| Error::Upstream(format!("Failed to read response: {}", e)))?;

            if looks_like_manifest(&bytes) {
                let text = String::from_utf8_lossy(&bytes);
                return Ok(ProxiedAsset::Manifest {
                    body: self.rewriter.rewrite(&text, target),
                });
            }

            return Ok(ProxiedAsset::Segment {
                status,
                content_type,
                content_length: Some(bytes.len() as u64),
                content_range,
                content_encoding: None,
                body: Body::from(bytes),
            });
        }

        debug!("streaming {} ({}) through", target, content_type);

        Ok(ProxiedAsset::Segment {
            status,
            content_type,
            content_length: response.content_length(),
            content_range,
            content_encoding,
            body: Body::from_stream(response.bytes_stream()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_hosts_get_their_family() {
        let url = Url::parse("https://cdn.spectraflux.xyz/a/index.m3u8").unwrap();
        assert_eq!(family_for(&url).map(|f| f.origin), Some("https://vidfast.pro"));

        let url = Url::parse("https://storm.vidlink.pro/seg.ts").unwrap();
        assert_eq!(family_for(&url).map(|f| f.name), Some("vidlink"));
    }

    #[test]
    fn unknown_hosts_get_no_origin_override() {
        let url = Url::parse("https://cdn.somewhere.net/vidlink/seg.ts").unwrap();
        assert!(family_for(&url).is_none());
    }
}
