//! Fetcher behavior against a live mock server

use crate::common::{create_test_config, html, mount_robots};
use autoseo::config::FetcherConfig;
use autoseo::crawler::{FetchErrorKind, Fetcher};
use std::time::Duration;
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

fn fetcher_with(config: FetcherConfig) -> Fetcher {
    let user_agent = create_test_config(1, "./unused.db", "").user_agent;
    Fetcher::new(&user_agent, &config).expect("Failed to build fetcher")
}

fn fetcher() -> Fetcher {
    fetcher_with(FetcherConfig::default())
}

fn url(server: &MockServer, path: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), path)).expect("Failed to parse mock URL")
}

#[tokio::test]
async fn test_fetch_page_with_robots() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nDisallow: /private").await;

    Mock::given(method("GET"))
        .and(path("/"))
        .and(header(
            "user-agent",
            "TestBot/1.0.0 (+https://example.com/contact; test@example.com)",
        ))
        .respond_with(html("<html><head><title>Hi</title></head></html>".to_string()))
        .expect(1)
        .mount(&server)
        .await;

    let page = fetcher().fetch(&url(&server, "/"), TIMEOUT, 5).await.unwrap();

    assert_eq!(page.status_code, 200);
    assert!(page.body.contains("<title>Hi</title>"));
    assert!(page.content_type().is_some_and(|ct| ct.starts_with("text/html")));
    assert!(!page.was_redirected());
    assert!(!page.truncated);
    assert_eq!(
        page.robots_txt.as_deref(),
        Some("User-agent: *\nDisallow: /private")
    );
}

#[tokio::test]
async fn test_follows_redirects() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(html("<html></html>".to_string()))
        .mount(&server)
        .await;

    let page = fetcher().fetch(&url(&server, "/old"), TIMEOUT, 5).await.unwrap();

    assert_eq!(page.url.path(), "/new");
    assert_eq!(page.requested_url.path(), "/old");
    assert_eq!(page.redirect_chain.len(), 1);
    assert_eq!(page.redirect_chain[0].status, 301);
    assert!(page.redirect_chain[0].url.ends_with("/old"));
    assert!(page.was_redirected());
}

#[tokio::test]
async fn test_too_many_redirects() {
    let server = MockServer::start().await;
    for (from, to) in [("/1", "/2"), ("/2", "/3"), ("/3", "/4")] {
        Mock::given(method("GET"))
            .and(path(from))
            .respond_with(ResponseTemplate::new(302).insert_header("location", to))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/4"))
        .respond_with(html("<html></html>".to_string()))
        .mount(&server)
        .await;

    let err = fetcher().fetch(&url(&server, "/1"), TIMEOUT, 2).await.unwrap_err();
    assert_eq!(err.kind, FetchErrorKind::TooManyRedirects);
    assert!(!err.is_retryable());

    // Exactly at the limit is fine
    let page = fetcher().fetch(&url(&server, "/1"), TIMEOUT, 3).await.unwrap();
    assert_eq!(page.redirect_chain.len(), 3);
}

#[tokio::test]
async fn test_redirect_loop() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/b"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/a"))
        .mount(&server)
        .await;

    let err = fetcher().fetch(&url(&server, "/a"), TIMEOUT, 10).await.unwrap_err();
    assert_eq!(err.kind, FetchErrorKind::TooManyRedirects);
}

#[tokio::test]
async fn test_redirect_without_location() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(302))
        .mount(&server)
        .await;

    let err = fetcher().fetch(&url(&server, "/"), TIMEOUT, 5).await.unwrap_err();
    assert_eq!(err.kind, FetchErrorKind::HttpStatus(302));
}

#[tokio::test]
async fn test_http_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let missing = fetcher().fetch(&url(&server, "/missing"), TIMEOUT, 5).await.unwrap_err();
    assert_eq!(missing.kind, FetchErrorKind::HttpStatus(404));
    assert!(!missing.is_retryable());
    assert_eq!(missing.to_job_error().status_code, Some(404));

    let down = fetcher().fetch(&url(&server, "/down"), TIMEOUT, 5).await.unwrap_err();
    assert!(down.is_retryable());

    let busy = fetcher().fetch(&url(&server, "/busy"), TIMEOUT, 5).await.unwrap_err();
    assert!(busy.is_retryable());
}

#[tokio::test]
async fn test_slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(html("<html></html>".to_string()).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let err = fetcher()
        .fetch(&url(&server, "/slow"), Duration::from_millis(100), 5)
        .await
        .unwrap_err();
    assert_eq!(err.kind, FetchErrorKind::Timeout);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    let server = MockServer::start().await;
    let target = url(&server, "/");
    drop(server);

    let err = fetcher().fetch(&target, TIMEOUT, 5).await.unwrap_err();
    assert!(matches!(
        err.kind,
        FetchErrorKind::Network | FetchErrorKind::Timeout
    ));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_body_is_capped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/big"))
        .respond_with(html("x".repeat(10_000)))
        .mount(&server)
        .await;

    let fetcher = fetcher_with(FetcherConfig {
        max_body_bytes: 2048,
        ..FetcherConfig::default()
    });
    let page = fetcher.fetch(&url(&server, "/big"), TIMEOUT, 5).await.unwrap();

    assert!(page.truncated);
    assert_eq!(page.body.len(), 2048);
    assert_eq!(page.body_bytes, 10_000);
}

#[tokio::test]
async fn test_robots_is_cached_per_origin() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nAllow: /"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(html("<html></html>".to_string()))
        .mount(&server)
        .await;

    let fetcher = fetcher();
    fetcher.fetch(&url(&server, "/page"), TIMEOUT, 5).await.unwrap();
    let second = fetcher.fetch(&url(&server, "/page"), TIMEOUT, 5).await.unwrap();

    assert!(second.robots_txt.is_some());
    assert_eq!(fetcher.robots_cache().len(), 1);
}

#[tokio::test]
async fn test_missing_robots_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<html></html>".to_string()))
        .mount(&server)
        .await;

    let page = fetcher().fetch(&url(&server, "/"), TIMEOUT, 5).await.unwrap();
    assert!(page.robots_txt.is_none());
}
