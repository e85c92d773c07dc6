use serde::{Deserialize, Serialize};

use crate::server::services::stats_services::{EmbedderCount, StatsSnapshot, TrackEvent};

#[derive(Debug, Deserialize)]
pub struct TrackRequest {
    #[serde(rename = "type")]
    pub event: TrackEvent,
    pub bandwidth: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct TrackResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsBody {
    pub shows_loaded: u64,
    pub rainsubs_requests: u64,
    pub tmdb_requests: u64,
    pub wyzie_requests: u64,
    /// two decimals, as a string so clients don't reformat it
    #[serde(rename = "totalBandwidthGB")]
    pub total_bandwidth_gb: String,
}

impl From<StatsSnapshot> for StatsBody {
    fn from(snapshot: StatsSnapshot) -> Self {
        Self {
            shows_loaded: snapshot.shows_loaded,
            rainsubs_requests: snapshot.rainsubs_requests,
            tmdb_requests: snapshot.tmdb_requests,
            wyzie_requests: snapshot.wyzie_requests,
            total_bandwidth_gb: format!("{:.2}", snapshot.total_bandwidth_gb()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub stats: StatsBody,
    pub leaderboard: Vec<EmbedderCount>,
}
