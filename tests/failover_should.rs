use std::sync::{Arc, Mutex};
use std::time::Duration;

use embed_api::models::{ResolvedStream, ServerId, StreamRequest};
use embed_api::server::error::Error;
use embed_api::server::services::resolver_services::{
    FailoverPolicy, MockStreamResolverTrait, resolve_with_failover,
};
use url::Url;

fn policy(max_retries: u32) -> FailoverPolicy {
    FailoverPolicy {
        max_retries,
        retry_delay: Duration::from_millis(1),
    }
}

fn servers() -> Vec<ServerId> {
    ["veronica", "vienna", "backup1"]
        .into_iter()
        .map(ServerId::new)
        .collect()
}

fn resolved_on(request: &StreamRequest) -> ResolvedStream {
    ResolvedStream {
        manifest_url: Url::parse("https://cdn.host/index.m3u8").unwrap(),
        stream_url: "/api/v1/proxy?url=https%3A%2F%2Fcdn.host%2Findex.m3u8".to_string(),
        server: request.server.clone(),
        source: "test".to_string(),
        meta: request.meta(),
    }
}

fn exhausted(request: &StreamRequest) -> Error {
    Error::NoStreamFound {
        server: request.server.to_string(),
        last_error: format!("{} is down", request.server),
        attempts: 1,
    }
}

#[tokio::test]
async fn test_tries_requested_server_first_then_the_rest() {
    let tried = Arc::new(Mutex::new(Vec::new()));

    let mut resolver = MockStreamResolverTrait::new();
    resolver.expect_server_ids().return_const(servers());
    {
        let tried = tried.clone();
        resolver.expect_resolve_stream().returning(move |request| {
            tried.lock().unwrap().push(request.server.to_string());
            if request.server.as_str() == "veronica" {
                Ok(resolved_on(request))
            } else {
                Err(exhausted(request))
            }
        });
    }

    let request = StreamRequest::movie("550", "vienna").unwrap();
    let resolved = resolve_with_failover(&resolver, &request, &policy(3))
        .await
        .unwrap();

    assert_eq!(resolved.server.as_str(), "veronica");
    assert_eq!(*tried.lock().unwrap(), vec!["vienna", "veronica"]);
}

#[tokio::test]
async fn test_bad_requests_are_not_retried() {
    let mut resolver = MockStreamResolverTrait::new();
    resolver.expect_server_ids().return_const(servers());
    resolver
        .expect_resolve_stream()
        .times(1)
        .returning(|_| Err(Error::BadRequest("bad id".to_string())));

    let request = StreamRequest::movie("550", "veronica").unwrap();
    let err = resolve_with_failover(&resolver, &request, &policy(3))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::BadRequest(_)));
}

#[tokio::test]
async fn test_gives_up_after_the_retry_rounds() {
    let mut resolver = MockStreamResolverTrait::new();
    resolver.expect_server_ids().return_const(servers());
    // first round plus two retries over three servers
    resolver
        .expect_resolve_stream()
        .times(9)
        .returning(|request| Err(exhausted(request)));

    let request = StreamRequest::movie("550", "veronica").unwrap();
    let err = resolve_with_failover(&resolver, &request, &policy(2))
        .await
        .unwrap_err();

    match err {
        Error::NoStreamFound {
            server,
            last_error,
            attempts,
        } => {
            assert_eq!(server, "veronica, vienna, backup1");
            assert!(last_error.contains("backup1 is down"), "{}", last_error);
            assert_eq!(attempts, 9);
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_recovers_on_a_later_round() {
    let calls = Arc::new(Mutex::new(0));

    let mut resolver = MockStreamResolverTrait::new();
    resolver
        .expect_server_ids()
        .return_const(vec![ServerId::new("veronica")]);
    {
        let calls = calls.clone();
        resolver.expect_resolve_stream().returning(move |request| {
            let mut calls = calls.lock().unwrap();
            *calls += 1;
            if *calls < 3 {
                Err(Error::Upstream("flaky".to_string()))
            } else {
                Ok(resolved_on(request))
            }
        });
    }

    let request = StreamRequest::movie("550", "veronica").unwrap();
    let resolved = resolve_with_failover(&resolver, &request, &policy(3))
        .await
        .unwrap();

    assert_eq!(resolved.server.as_str(), "veronica");
    assert_eq!(*calls.lock().unwrap(), 3);
}

#[tokio::test]
async fn test_unknown_server_tries_each_server_once_per_round() {
    let tried = Arc::new(Mutex::new(Vec::new()));

    let mut resolver = MockStreamResolverTrait::new();
    resolver.expect_server_ids().return_const(servers());
    resolver
        .expect_default_server()
        .return_const(ServerId::new("veronica"));
    {
        let tried = tried.clone();
        resolver.expect_resolve_stream().returning(move |request| {
            tried.lock().unwrap().push(request.server.to_string());
            Err(exhausted(request))
        });
    }

    let request = StreamRequest::movie("550", "nope").unwrap();
    let err = resolve_with_failover(&resolver, &request, &policy(1))
        .await
        .unwrap_err();

    assert_eq!(
        *tried.lock().unwrap(),
        vec!["veronica", "vienna", "backup1", "veronica", "vienna", "backup1"]
    );
    match err {
        Error::NoStreamFound {
            server, attempts, ..
        } => {
            assert_eq!(server, "veronica, vienna, backup1");
            assert_eq!(attempts, 6);
        }
        other => panic!("unexpected error {:?}", other),
    }
}
