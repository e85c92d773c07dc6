use std::sync::Arc;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusHandle;
use tracing::info;

use crate::{
    config::AppConfig,
    server::utils::{manifest_utils::ManifestRewriter, proxy_url_utils::ProxyUrlBuilder},
};

use super::{
    resolver_services::{DynStreamResolver, FailoverPolicy, StreamResolver},
    server_profile_services::ServerTable,
    stats_services::{DynStatsService, StatsService},
    subtitle_services::{DynSubtitleService, SubtitleService},
    upstream_services::{DynUpstreamService, UpstreamService},
};

/// everything a handler can reach, injected through an Extension. No database and no shared
/// cache, every request is on its own
#[derive(Clone)]
pub struct EdgeServices {
    pub resolver: DynStreamResolver,
    pub upstream: DynUpstreamService,
    pub subtitles: DynSubtitleService,
    pub stats: DynStatsService,
    pub table: Arc<ServerTable>,
    pub failover: FailoverPolicy,
    pub metrics: Option<PrometheusHandle>,
    pub config: Arc<AppConfig>,
}

impl EdgeServices {
    pub fn new(config: Arc<AppConfig>) -> anyhow::Result<Self> {
        let table = ServerTable::from_config(&config)?;
        Ok(Self::with_table(config, table))
    }

    /// same as `new` with an explicit server table, tests point these at local fixtures
    pub fn with_table(config: Arc<AppConfig>, table: ServerTable) -> Self {
        info!("starting edge services...");

        // idle pooling off, nothing is supposed to carry over between requests
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let table = Arc::new(table);
        let proxy_urls = ProxyUrlBuilder::new(config.public_base_path.clone());

        let resolver = Arc::new(StreamResolver::new(
            http.clone(),
            table.clone(),
            proxy_urls.clone(),
            Duration::from_secs(config.probe_timeout_secs),
        )) as DynStreamResolver;

        let upstream = Arc::new(UpstreamService::new(
            http.clone(),
            ManifestRewriter::new(proxy_urls),
            Duration::from_secs(config.proxy_timeout_secs),
        )) as DynUpstreamService;

        let subtitles = Arc::new(SubtitleService::new(
            http,
            &config.subtitle_provider_url,
            Duration::from_secs(config.proxy_timeout_secs),
        )) as DynSubtitleService;

        let stats = Arc::new(StatsService::new(config.site_domain.as_deref())) as DynStatsService;

        let failover = FailoverPolicy {
            max_retries: config.failover_max_retries,
            retry_delay: Duration::from_millis(config.failover_retry_delay_ms),
        };

        info!("edge services ok");

        Self {
            resolver,
            upstream,
            subtitles,
            stats,
            table,
            failover,
            metrics: None,
            config,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
