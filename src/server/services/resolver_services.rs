// the stream resolution pipeline. attempts run one after another in profile order, first url
// wins, a failed or timed out attempt just moves us on to the next one
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mockall::automock;
use nanoid::nanoid;
use reqwest::header;
use serde_json::Value;
use tracing::{Instrument, debug, info, info_span, warn};
use url::Url;

use crate::{
    models::{ResolvedStream, ServerId, StreamRequest},
    server::{
        error::{AppResult, Error},
        services::server_profile_services::{AttemptSpec, ServerProfile, ServerTable},
        utils::{
            encoding_utils::{ContentEncoding, UPSTREAM_ACCEPT_ENCODING},
            extraction_utils::extract_candidates,
            proxy_url_utils::ProxyUrlBuilder,
        },
    },
};

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub type DynStreamResolver = Arc<dyn StreamResolverTrait + Send + Sync>;

/// why a single attempt or probe didn't produce a url
#[derive(thiserror::Error, Debug)]
pub enum AttemptError {
    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("invalid response: {0}")]
    Malformed(String),

    #[error("no valid m3u8 URL in response")]
    NoCandidate,
}

#[derive(Debug, Clone)]
pub struct AttemptFailure {
    pub attempt: String,
    pub reason: String,
}

#[automock]
#[async_trait]
pub trait StreamResolverTrait {
    async fn resolve_stream(&self, request: &StreamRequest) -> AppResult<ResolvedStream>;

    /// every server id the active table knows, in table order
    fn server_ids(&self) -> Vec<ServerId>;

    /// the server an unknown id resolves on
    fn default_server(&self) -> ServerId;
}

pub struct StreamResolver {
    http: reqwest::Client,
    table: Arc<ServerTable>,
    proxy: ProxyUrlBuilder,
    probe_timeout: Duration,
}

impl StreamResolver {
    pub fn new(
        http: reqwest::Client,
        table: Arc<ServerTable>,
        proxy: ProxyUrlBuilder,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            http,
            table,
            proxy,
            probe_timeout,
        }
    }

    async fn run_attempt(&self, attempt: &AttemptSpec) -> Result<Url, AttemptError> {
        let fut = async {
            let response = self
                .http
                .get(&attempt.scrape_request_url)
                .header(header::USER_AGENT, BROWSER_USER_AGENT)
                .header(
                    header::ACCEPT,
                    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
                )
                .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.5")
                .header(header::ACCEPT_ENCODING, UPSTREAM_ACCEPT_ENCODING)
                .header(header::CACHE_CONTROL, "no-cache")
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(AttemptError::Status(status));
            }

            let encoding = ContentEncoding::from_content_encoding(
                response
                    .headers()
                    .get(header::CONTENT_ENCODING)
                    .and_then(|v| v.to_str().ok()),
            );
            let bytes = response.bytes().await?;
            let body = encoding
                .decompress(&bytes)
                .map_err(|e| AttemptError::Malformed(format!("failed to decompress: {}", e)))?;

            Self::pick_candidate(&body)
        };

        match tokio::time::timeout(attempt.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(AttemptError::Timeout(attempt.timeout)),
        }
    }

    /// scrapers answer with json, but a body that isn't json is still a failed attempt. the first
    /// candidate that parses as a url wins
    fn pick_candidate(body: &[u8]) -> Result<Url, AttemptError> {
        let payload: Value = serde_json::from_slice(body).map_err(|e| {
            debug!("scrape body is not json ({} bytes)", body.len());
            AttemptError::Malformed(format!("not JSON: {}", e))
        })?;

        extract_candidates(&payload)
            .into_iter()
            .find_map(|candidate| match Url::parse(&candidate) {
                Ok(url) => Some(url),
                Err(e) => {
                    debug!("skipping unparseable candidate {}: {}", candidate, e);
                    None
                }
            })
            .ok_or(AttemptError::NoCandidate)
    }

    /// HEAD only, the body of a playlist guess is never downloaded
    async fn probe(&self, url: &str) -> Result<Url, AttemptError> {
        let target = Url::parse(url).map_err(|e| AttemptError::Malformed(e.to_string()))?;

        let fut = self
            .http
            .head(target.clone())
            .header(header::USER_AGENT, BROWSER_USER_AGENT)
            .send();

        let response = tokio::time::timeout(self.probe_timeout, fut)
            .await
            .map_err(|_| AttemptError::Timeout(self.probe_timeout))??;

        if !response.status().is_success() {
            return Err(AttemptError::Status(response.status()));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if content_type.to_ascii_lowercase().contains("mpegurl") {
            Ok(target)
        } else {
            Err(AttemptError::Malformed(format!(
                "not an HLS content type: '{}'",
                content_type
            )))
        }
    }

    async fn resolve_with_profile(
        &self,
        profile: &ServerProfile,
        request: &StreamRequest,
    ) -> AppResult<ResolvedStream> {
        let mut failures: Vec<AttemptFailure> = Vec::new();

        for attempt in profile.attempts_for(request) {
            info!("trying {}", attempt.name);
            debug!("scrape url: {}", attempt.scrape_request_url);

            match self.run_attempt(&attempt).await {
                Ok(manifest_url) => {
                    metrics::counter!("scrape_attempts_total", "server" => profile.id.to_string(), "outcome" => "success")
                        .increment(1);
                    info!("found m3u8 from {}: {}", attempt.name, manifest_url);
                    return Ok(self.resolved(profile, request, manifest_url, attempt.name));
                }
                Err(e) => {
                    metrics::counter!("scrape_attempts_total", "server" => profile.id.to_string(), "outcome" => "failure")
                        .increment(1);
                    warn!("{} failed: {}", attempt.name, e);
                    failures.push(AttemptFailure {
                        attempt: attempt.name,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let scrape_failures = failures.len();
        info!("scrape attempts exhausted, probing direct urls");

        for url in profile.probe_urls(request) {
            match self.probe(&url).await {
                Ok(manifest_url) => {
                    info!("found direct m3u8: {}", manifest_url);
                    return Ok(self.resolved(profile, request, manifest_url, "direct-probe".to_string()));
                }
                Err(e) => {
                    debug!("direct url {} failed: {}", url, e);
                    failures.push(AttemptFailure {
                        attempt: format!("probe {}", url),
                        reason: e.to_string(),
                    });
                }
            }
        }

        // the last scrape error says more than "not an HLS content type" from a probe
        let last_error = failures[..scrape_failures]
            .last()
            .or(failures.last())
            .map(|f| format!("{}: {}", f.attempt, f.reason))
            .unwrap_or_else(|| "All attempts failed".to_string());

        metrics::counter!("stream_resolutions_total", "server" => profile.id.to_string(), "outcome" => "exhausted")
            .increment(1);

        Err(Error::NoStreamFound {
            server: profile.id.to_string(),
            last_error,
            attempts: failures.len(),
        })
    }

    fn resolved(
        &self,
        profile: &ServerProfile,
        request: &StreamRequest,
        manifest_url: Url,
        source: String,
    ) -> ResolvedStream {
        metrics::counter!("stream_resolutions_total", "server" => profile.id.to_string(), "outcome" => "success")
            .increment(1);

        ResolvedStream {
            stream_url: self.proxy.wrap(manifest_url.as_str()),
            manifest_url,
            server: profile.id.clone(),
            source,
            meta: request.meta(),
        }
    }
}

#[async_trait]
impl StreamResolverTrait for StreamResolver {
    async fn resolve_stream(&self, request: &StreamRequest) -> AppResult<ResolvedStream> {
        let profile = self.table.get(&request.server);
        if profile.id != request.server {
            info!(
                "unknown server '{}', using default '{}'",
                request.server, profile.id
            );
        }

        let span = info_span!(
            "resolve",
            id = %nanoid!(8),
            server = %profile.id,
            media = %request.target_path()
        );

        self.resolve_with_profile(profile, request)
            .instrument(span)
            .await
    }

    fn server_ids(&self) -> Vec<ServerId> {
        self.table.ids()
    }

    fn default_server(&self) -> ServerId {
        self.table.default_profile().id.clone()
    }
}

#[derive(Debug, Clone)]
pub struct FailoverPolicy {
    /// extra rounds over every server after the first one
    pub max_retries: u32,
    pub retry_delay: Duration,
}

/// caller side retry loop: requested server first, then the rest of the table, then wait and do
/// it all again a few times. The resolver never does this on its own.
pub async fn resolve_with_failover(
    resolver: &(dyn StreamResolverTrait + Send + Sync),
    request: &StreamRequest,
    policy: &FailoverPolicy,
) -> AppResult<ResolvedStream> {
    let known = resolver.server_ids();

    // an unknown id would land on the default anyway, so each server runs once per round
    let first = if known.contains(&request.server) {
        request.server.clone()
    } else {
        resolver.default_server()
    };

    let mut order = vec![first.clone()];
    order.extend(known.into_iter().filter(|id| id != &first));

    let mut last_error: Option<Error> = None;
    let mut tried = 0;

    for round in 0..=policy.max_retries {
        if round > 0 {
            info!(
                "all servers failed, retrying in {}ms ({}/{})",
                policy.retry_delay.as_millis(),
                round,
                policy.max_retries
            );
            tokio::time::sleep(policy.retry_delay).await;
        }

        for server in &order {
            tried += 1;
            match resolver.resolve_stream(&request.with_server(server.clone())).await {
                Ok(resolved) => return Ok(resolved),
                // bad input stays bad no matter which server gets it
                Err(e @ Error::BadRequest(_)) => return Err(e),
                Err(e) => {
                    warn!("server {} failed: {}", server, e);
                    last_error = Some(e);
                }
            }
        }
    }

    Err(Error::NoStreamFound {
        server: order
            .iter()
            .map(ServerId::to_string)
            .collect::<Vec<_>>()
            .join(", "),
        last_error: last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "All attempts failed".to_string()),
        attempts: tried,
    })
}
