use autoseo::config::{parse_config, Config};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration with short retry and lease timings
///
/// `extra` is appended verbatim, so tests can add sections it does not set.
pub fn create_test_config(workers: usize, db_path: &str, extra: &str) -> Config {
    let content = format!(
        r#"
[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[scheduler]
workers = {workers}
max-attempts = 3
retry-base-delay-ms = 10
retry-max-delay-ms = 50
heartbeat-interval-ms = 50
heartbeat-timeout-ms = 5000
deadline-margin-ms = 1000

[store]
database-path = "{db_path}"
persist-attempts = 3
persist-retry-delay-ms = 5

[[tenant]]
id = "acme"
max-concurrent-jobs = 2
max-queue-depth = 50

[[tenant]]
id = "solo"
max-concurrent-jobs = 1
max-queue-depth = 50

[[tenant]]
id = "other"
max-concurrent-jobs = 1
max-queue-depth = 50
{extra}
"#
    );
    parse_config(&content).expect("test config should be valid")
}

/// A page that passes every default check
pub fn good_page(base_url: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <title>Handmade Oak Furniture for Every Room | Acme</title>
    <meta name="description" content="Acme builds solid oak tables, chairs and shelving by hand in our own workshop and ships them anywhere in the country.">
    <meta name="robots" content="index, follow">
    <link rel="canonical" href="{base_url}/">
    <script type="application/ld+json">
    {{"@context": "https://schema.org", "@type": "Organization", "name": "Acme", "url": "{base_url}/"}}
    </script>
</head>
<body>
    <h1>Handmade oak furniture</h1>
    <img src="/img/table.jpg" alt="Oak dining table">
    <img src="/img/divider.png" alt="">
    <h2>Our workshop</h2>
    <p>{words}</p>
    <h2>Contact</h2>
    <p><a href="/about">About the workshop</a> and <a href="https://example.org/reviews">independent reviews</a>.</p>
</body>
</html>"#,
        words = "Every piece is cut, joined and finished by the same small team. ".repeat(30)
    )
}

/// A page that fails most checks
pub fn poor_page() -> String {
    "<html><head></head><body><h3>hi</h3><img src=\"/x.png\"></body></html>".to_string()
}

pub async fn mount_robots(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

pub fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=utf-8")
}

/// Polls `check` until it holds or `limit` elapses
pub async fn eventually<F: Fn() -> bool>(limit: Duration, check: F) -> bool {
    let started = tokio::time::Instant::now();
    while started.elapsed() < limit {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
