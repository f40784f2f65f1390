use std::time::Duration;

use omni_source::config::HttpConfig;
use omni_source::context::Deadline;
use omni_source::fetch::{FetchError, FetchRequest, HttpFetcher};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings() -> HttpConfig {
    HttpConfig {
        retries: 2,
        backoff_base_ms: 5,
        backoff_max_ms: 20,
        max_redirects: 5,
        timeout_secs: 5,
        ..HttpConfig::default()
    }
}

fn deadline() -> Deadline {
    Deadline::after(Duration::from_secs(30))
}

/// Mount `/hop/0 -> /hop/1 -> ... -> /hop/<hops>`, the last one serving a body
async fn mount_redirect_chain(server: &MockServer, hops: usize) {
    for i in 0..hops {
        Mock::given(method("GET"))
            .and(path(format!("/hop/{i}")))
            .respond_with(
                ResponseTemplate::new(302).insert_header("Location", format!("/hop/{}", i + 1)),
            )
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path(format!("/hop/{hops}")))
        .respond_with(ResponseTemplate::new(200).set_body_string("final body"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn redirects_up_to_the_cap_are_followed() {
    let server = MockServer::start().await;
    mount_redirect_chain(&server, 5).await;

    let fetcher = HttpFetcher::new(&settings()).unwrap();
    let request = FetchRequest::new(format!("{}/hop/0", server.uri()));
    let fetched = fetcher.fetch_text(&request, &deadline()).await;

    let page = fetched.result.unwrap();
    assert_eq!(page.body, "final body");
    assert!(page.url.ends_with("/hop/5"));
    assert_eq!(fetched.attempts, 1);
}

#[tokio::test]
async fn redirects_past_the_cap_fail_without_retrying() {
    let server = MockServer::start().await;
    mount_redirect_chain(&server, 6).await;

    let fetcher = HttpFetcher::new(&settings()).unwrap();
    let request = FetchRequest::new(format!("{}/hop/0", server.uri()));
    let fetched = fetcher.fetch_text(&request, &deadline()).await;

    assert!(matches!(
        fetched.result,
        Err(FetchError::TooManyRedirects { limit: 5, .. })
    ));
    assert_eq!(fetched.attempts, 1);
}

#[tokio::test]
async fn redirect_loops_terminate() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/loop"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/loop"))
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(&settings()).unwrap();
    let result = tokio::time::timeout(
        Duration::from_secs(10),
        fetcher.fetch_text(&FetchRequest::new(format!("{}/loop", server.uri())), &deadline()),
    )
    .await
    .expect("redirect loop must terminate");

    assert!(matches!(result.result, Err(FetchError::TooManyRedirects { .. })));
}

#[tokio::test]
async fn transient_failures_are_retried_with_notes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(&settings()).unwrap();
    let fetched = fetcher
        .fetch_text(&FetchRequest::new(format!("{}/flaky", server.uri())), &deadline())
        .await;

    assert_eq!(fetched.result.unwrap().body, "recovered");
    assert_eq!(fetched.attempts, 3);
    assert_eq!(fetched.notes.len(), 2);
    assert!(fetched.notes[0].starts_with("Attempt 1/3"));
    assert!(fetched.notes[1].contains("HTTP 503"));
}

#[tokio::test]
async fn zero_retries_sends_a_single_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let settings = HttpConfig {
        retries: 0,
        ..settings()
    };
    let fetcher = HttpFetcher::new(&settings).unwrap();
    let fetched = fetcher
        .fetch_text(&FetchRequest::new(format!("{}/down", server.uri())), &deadline())
        .await;

    assert!(matches!(fetched.result, Err(FetchError::Status { status: 503, .. })));
    assert_eq!(fetched.attempts, 1);
    assert!(fetched.notes.is_empty());
}

#[tokio::test]
async fn stub_bodies_count_as_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/stub"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Just a moment..."))
        .expect(3)
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(&settings()).unwrap();
    let request = FetchRequest::new(format!("{}/stub", server.uri())).min_body_chars(200);
    let fetched = fetcher.fetch_text(&request, &deadline()).await;

    assert!(matches!(
        fetched.result,
        Err(FetchError::BodyTooShort { min: 200, .. })
    ));
    assert_eq!(fetched.notes.len(), 2);
}

#[tokio::test]
async fn short_links_resolve_to_their_final_location() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/s/abc"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("Location", "/video/BV1xx411c7mD?share_source=copy"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/video/BV1xx411c7mD"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(&settings()).unwrap();
    let final_url = fetcher
        .resolve_final_url(&format!("{}/s/abc", server.uri()), &deadline())
        .await
        .unwrap();

    assert!(final_url.ends_with("/video/BV1xx411c7mD?share_source=copy"));
}

#[tokio::test]
async fn expired_deadline_stops_before_sending() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("never"))
        .expect(0)
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(&settings()).unwrap();
    let fetched = fetcher
        .fetch_text(
            &FetchRequest::new(format!("{}/late", server.uri())),
            &Deadline::after(Duration::ZERO),
        )
        .await;

    assert!(matches!(fetched.result, Err(FetchError::DeadlineExceeded { .. })));
}
