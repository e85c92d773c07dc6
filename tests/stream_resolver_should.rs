use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::Query,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use embed_api::models::{ServerId, StreamRequest};
use embed_api::server::error::Error;
use embed_api::server::services::resolver_services::{StreamResolver, StreamResolverTrait};
use embed_api::server::services::server_profile_services::{
    PlayerSite, ScrapeParamStyle, ServerTable,
};
use embed_api::server::utils::proxy_url_utils::ProxyUrlBuilder;
use serde_json::json;
use tokio::net::TcpListener;

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    (listener, base)
}

fn serve(listener: TcpListener, router: Router) {
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
}

fn resolver(base: &str, attempt_timeout: Duration) -> StreamResolver {
    let table = ServerTable::hosted(
        &format!("{}/api/scrape", base),
        PlayerSite::new("videasy", &format!("{}/videasy", base), ScrapeParamStyle::Encoded).unwrap(),
        PlayerSite::new("vidlink", &format!("{}/vidlink", base), ScrapeParamStyle::Raw).unwrap(),
        attempt_timeout,
        "veronica",
    )
    .unwrap();

    StreamResolver::new(
        reqwest::Client::new(),
        Arc::new(table),
        ProxyUrlBuilder::new("/api/v1/proxy"),
        Duration::from_secs(2),
    )
}

/// scraper that only finds something when it's given a waitFor without a clickSelector, and
/// puts the media path of the page it was asked about into the manifest url
fn picky_scraper(base: String) -> Router {
    Router::new().route(
        "/api/scrape",
        get(move |Query(params): Query<HashMap<String, String>>| {
            let base = base.clone();
            async move {
                if params.contains_key("clickSelector") || !params.contains_key("waitFor") {
                    return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                }

                let page = params.get("url").cloned().unwrap_or_default();
                let path = page.split_once("/videasy/").map(|(_, p)| p).unwrap_or("none");

                Json(json!({
                    "requests": [
                        {"url": format!("{}/app.js", base)},
                        {"url": "https://cdn.example/fallback.m3u8"},
                        {"url": format!("{}/hls/{}/index.m3u8", base, path)}
                    ]
                }))
                .into_response()
            }
        }),
    )
}

#[tokio::test]
async fn test_moves_past_failed_attempts_to_the_first_candidate() {
    let (listener, base) = bind().await;
    serve(listener, picky_scraper(base.clone()));

    let request = StreamRequest::movie("550", "veronica").unwrap();
    let resolved = resolver(&base, Duration::from_secs(5))
        .resolve_stream(&request)
        .await
        .unwrap();

    let expected = format!("{}/hls/movie/550/index.m3u8", base);
    assert_eq!(resolved.manifest_url.as_str(), expected);
    assert_eq!(resolved.source, "videasy-alt");
    assert_eq!(resolved.server.as_str(), "veronica");
    assert_eq!(
        resolved.stream_url,
        format!("/api/v1/proxy?url={}", urlencoding::encode(&expected))
    );
}

#[tokio::test]
async fn test_builds_tv_target_paths() {
    let (listener, base) = bind().await;
    serve(listener, picky_scraper(base.clone()));

    let request = StreamRequest::tv("1399", "3", "9", "veronica").unwrap();
    let resolved = resolver(&base, Duration::from_secs(5))
        .resolve_stream(&request)
        .await
        .unwrap();

    assert!(resolved.manifest_url.path().ends_with("/hls/tv/1399/3/9/index.m3u8"));
    assert_eq!(resolved.meta.season.as_deref(), Some("3"));
}

#[tokio::test]
async fn test_tv_without_episode_is_rejected_before_any_request() {
    let err = StreamRequest::from_parts(None, "1399", Some("3"), None, "veronica").unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));
}

#[tokio::test]
async fn test_unknown_server_uses_the_default_profile() {
    let (listener, base) = bind().await;
    serve(listener, picky_scraper(base.clone()));

    let request = StreamRequest::movie("550", "nope").unwrap();
    let resolved = resolver(&base, Duration::from_secs(5))
        .resolve_stream(&request)
        .await
        .unwrap();

    assert_eq!(resolved.server, ServerId::new("veronica"));
}

#[tokio::test]
async fn test_slow_attempts_time_out_without_aborting_resolution() {
    let (listener, base) = bind().await;
    let slow_then_ok = {
        let base = base.clone();
        Router::new().route(
            "/api/scrape",
            get(move |Query(params): Query<HashMap<String, String>>| {
                let base = base.clone();
                async move {
                    if params.contains_key("clickSelector") {
                        tokio::time::sleep(Duration::from_secs(3)).await;
                    }
                    Json(json!({"data": format!("found {}/slow/index.m3u8 here", base)}))
                }
            }),
        )
    };
    serve(listener, slow_then_ok);

    let request = StreamRequest::movie("1", "veronica").unwrap();
    let resolved = resolver(&base, Duration::from_millis(300))
        .resolve_stream(&request)
        .await
        .unwrap();

    assert_eq!(resolved.source, "videasy-alt");
}

#[tokio::test]
async fn test_falls_back_to_direct_probes() {
    let (listener, base) = bind().await;
    let router = Router::new()
        .route(
            "/api/scrape",
            get(|| async { Json(json!({"requests": [], "html": "<p>nothing here</p>"})) }),
        )
        .route(
            "/vidlink/movie/7/playlist.m3u8",
            get(|| async {
                (
                    [(header::CONTENT_TYPE, "application/vnd.apple.mpegurl")],
                    "#EXTM3U\n",
                )
            }),
        )
        .route(
            "/videasy/movie/7",
            get(|| async { ([(header::CONTENT_TYPE, "text/html")], "<html></html>") }),
        );
    serve(listener, router);

    let request = StreamRequest::movie("7", "vienna").unwrap();
    let resolved = resolver(&base, Duration::from_secs(5))
        .resolve_stream(&request)
        .await
        .unwrap();

    assert_eq!(resolved.source, "direct-probe");
    assert_eq!(
        resolved.manifest_url.as_str(),
        format!("{}/vidlink/movie/7/playlist.m3u8", base)
    );
}

#[tokio::test]
async fn test_exhaustion_names_the_server_and_last_scrape_error() {
    let (listener, base) = bind().await;
    let router = Router::new().route(
        "/api/scrape",
        get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "busy").into_response() }),
    );
    serve(listener, router);

    let request = StreamRequest::movie("550", "vienna").unwrap();
    let err = resolver(&base, Duration::from_secs(5))
        .resolve_stream(&request)
        .await
        .unwrap_err();

    match &err {
        Error::NoStreamFound {
            server,
            last_error,
            attempts,
        } => {
            assert_eq!(server, "vienna");
            assert!(last_error.starts_with("vidlink-alt: HTTP 503"), "{}", last_error);
            // 2 scrapes + 4 probes
            assert_eq!(*attempts, 6);
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    assert!(err.to_string().starts_with("No HLS stream found from vienna."));
}

#[tokio::test]
async fn test_non_json_scrape_bodies_count_as_failures() {
    let (listener, base) = bind().await;
    let router = Router::new().route(
        "/api/scrape",
        get(|| async { "<html>https://x/looks.m3u8</html>" }),
    );
    serve(listener, router);

    let request = StreamRequest::movie("550", "backup2").unwrap();
    let err = resolver(&base, Duration::from_secs(5))
        .resolve_stream(&request)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("not JSON"), "{}", err);
}

#[tokio::test]
async fn test_concurrent_resolutions_stay_isolated() {
    let (listener, base) = bind().await;
    serve(listener, picky_scraper(base.clone()));

    let resolver = Arc::new(resolver(&base, Duration::from_secs(5)));
    let ids = ["11", "22", "33", "44", "55"];

    let results = futures::future::join_all(ids.iter().map(|id| {
        let resolver = resolver.clone();
        async move {
            let request = StreamRequest::movie(id, "veronica").unwrap();
            resolver.resolve_stream(&request).await
        }
    }))
    .await;

    for (id, result) in ids.iter().zip(results) {
        let resolved = result.unwrap();
        assert_eq!(
            resolved.manifest_url.path(),
            format!("/hls/movie/{}/index.m3u8", id)
        );
        assert_eq!(resolved.meta.tmdb_id, *id);
    }
}
