use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// fire and forget usage counters, nothing here affects stream resolution. Lives for the whole
/// process and only resets on restart.
pub type DynStatsService = Arc<dyn StatsServiceTrait + Send + Sync>;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;
const LEADERBOARD_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrackEvent {
    ShowLoaded,
    Rainsubs,
    Tmdb,
    Wyzie,
    Bandwidth,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub shows_loaded: u64,
    pub rainsubs_requests: u64,
    pub tmdb_requests: u64,
    pub wyzie_requests: u64,
    pub total_bandwidth_bytes: u64,
}

impl StatsSnapshot {
    pub fn total_bandwidth_gb(&self) -> f64 {
        self.total_bandwidth_bytes as f64 / BYTES_PER_GB
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedderCount {
    pub domain: String,
    pub count: u64,
}

pub trait StatsServiceTrait {
    /// `bandwidth_gb` only matters for bandwidth events
    fn record(&self, event: TrackEvent, bandwidth_gb: Option<f64>, referer: Option<&str>);

    fn snapshot(&self) -> StatsSnapshot;

    /// top embedders by count, highest first
    fn leaderboard(&self) -> Vec<EmbedderCount>;
}

pub struct StatsService {
    shows_loaded: AtomicU64,
    rainsubs_requests: AtomicU64,
    tmdb_requests: AtomicU64,
    wyzie_requests: AtomicU64,
    bandwidth_bytes: AtomicU64,
    embedders: Mutex<HashMap<String, u64>>,
    ignored_domains: Vec<String>,
}

impl StatsService {
    pub fn new(site_domain: Option<&str>) -> Self {
        let mut ignored_domains = vec!["localhost".to_string()];
        if let Some(domain) = site_domain {
            ignored_domains.push(domain.to_ascii_lowercase());
        }

        Self {
            shows_loaded: AtomicU64::new(0),
            rainsubs_requests: AtomicU64::new(0),
            tmdb_requests: AtomicU64::new(0),
            wyzie_requests: AtomicU64::new(0),
            bandwidth_bytes: AtomicU64::new(0),
            embedders: Mutex::new(HashMap::new()),
            ignored_domains,
        }
    }

    fn track_embedder(&self, referer: &str) {
        let Some(domain) = url::Url::parse(referer)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
        else {
            return;
        };

        if self.ignored_domains.contains(&domain) {
            return;
        }

        // a poisoned map only loses leaderboard entries
        if let Ok(mut embedders) = self.embedders.lock() {
            *embedders.entry(domain).or_insert(0) += 1;
        }
    }
}

impl StatsServiceTrait for StatsService {
    fn record(&self, event: TrackEvent, bandwidth_gb: Option<f64>, referer: Option<&str>) {
        let name = match event {
            TrackEvent::ShowLoaded => {
                self.shows_loaded.fetch_add(1, Ordering::Relaxed);
                "show-loaded"
            }
            TrackEvent::Rainsubs => {
                self.rainsubs_requests.fetch_add(1, Ordering::Relaxed);
                "rainsubs"
            }
            TrackEvent::Tmdb => {
                self.tmdb_requests.fetch_add(1, Ordering::Relaxed);
                "tmdb"
            }
            TrackEvent::Wyzie => {
                self.wyzie_requests.fetch_add(1, Ordering::Relaxed);
                "wyzie"
            }
            TrackEvent::Bandwidth => {
                let bytes = bandwidth_gb
                    .filter(|gb| gb.is_finite() && *gb > 0.0)
                    .map(|gb| (gb * BYTES_PER_GB).round() as u64)
                    .unwrap_or(0);
                self.bandwidth_bytes.fetch_add(bytes, Ordering::Relaxed);
                metrics::counter!("bandwidth_bytes_total").increment(bytes);
                "bandwidth"
            }
        };

        metrics::counter!("track_events_total", "type" => name).increment(1);
        debug!("tracked {}", name);

        if let Some(referer) = referer {
            self.track_embedder(referer);
        }
    }

    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            shows_loaded: self.shows_loaded.load(Ordering::Relaxed),
            rainsubs_requests: self.rainsubs_requests.load(Ordering::Relaxed),
            tmdb_requests: self.tmdb_requests.load(Ordering::Relaxed),
            wyzie_requests: self.wyzie_requests.load(Ordering::Relaxed),
            total_bandwidth_bytes: self.bandwidth_bytes.load(Ordering::Relaxed),
        }
    }

    fn leaderboard(&self) -> Vec<EmbedderCount> {
        let mut entries: Vec<EmbedderCount> = match self.embedders.lock() {
            Ok(embedders) => embedders
                .iter()
                .map(|(domain, count)| EmbedderCount {
                    domain: domain.clone(),
                    count: *count,
                })
                .collect(),
            Err(_) => Vec::new(),
        };

        // ties broken by name so the output is stable
        entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.domain.cmp(&b.domain)));
        entries.truncate(LEADERBOARD_SIZE);
        entries
    }
}
