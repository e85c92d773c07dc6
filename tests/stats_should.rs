use std::sync::Arc;

use embed_api::server::dtos::stats_dto::StatsBody;
use embed_api::server::services::stats_services::{StatsService, StatsServiceTrait, TrackEvent};

#[test]
fn test_counts_each_event_type() {
    let stats = StatsService::new(None);

    stats.record(TrackEvent::ShowLoaded, None, None);
    stats.record(TrackEvent::ShowLoaded, None, None);
    stats.record(TrackEvent::Rainsubs, None, None);
    stats.record(TrackEvent::Tmdb, None, None);
    stats.record(TrackEvent::Wyzie, None, None);

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.shows_loaded, 2);
    assert_eq!(snapshot.rainsubs_requests, 1);
    assert_eq!(snapshot.tmdb_requests, 1);
    assert_eq!(snapshot.wyzie_requests, 1);
}

#[test]
fn test_bandwidth_is_reported_in_gb_with_two_decimals() {
    let stats = StatsService::new(None);

    stats.record(TrackEvent::Bandwidth, Some(1.0), None);
    stats.record(TrackEvent::Bandwidth, Some(0.5), None);
    // garbage is ignored
    stats.record(TrackEvent::Bandwidth, Some(-3.0), None);
    stats.record(TrackEvent::Bandwidth, None, None);

    let body = StatsBody::from(stats.snapshot());
    assert_eq!(body.total_bandwidth_gb, "1.50");
}

#[test]
fn test_concurrent_increments_are_not_lost() {
    let stats = Arc::new(StatsService::new(None));

    std::thread::scope(|scope| {
        for _ in 0..8 {
            let stats = stats.clone();
            scope.spawn(move || {
                for _ in 0..1000 {
                    stats.record(TrackEvent::ShowLoaded, None, Some("https://fan.site/watch"));
                }
            });
        }
    });

    assert_eq!(stats.snapshot().shows_loaded, 8000);
    assert_eq!(stats.leaderboard()[0].count, 8000);
}

#[test]
fn test_leaderboard_skips_own_domain_and_localhost() {
    let stats = StatsService::new(Some("embed.host"));

    for referer in [
        "https://b.site/x",
        "https://a.site/x",
        "https://a.site/y",
        "https://embed.host/page",
        "http://localhost:3000/",
        "not a url",
    ] {
        stats.record(TrackEvent::ShowLoaded, None, Some(referer));
    }

    let board = stats.leaderboard();
    let domains: Vec<&str> = board.iter().map(|e| e.domain.as_str()).collect();

    assert_eq!(domains, vec!["a.site", "b.site"]);
    assert_eq!(board[0].count, 2);
}
