//! Integration tests for ReqwestTransport using wiremock.

use std::sync::Arc;
use std::time::Duration;

use fetchbox::{
    Client, CorrelationId, FetchOptions, RequestAttempt, RequestTarget, Transport,
    TransportFailure,
};
use fetchbox_core::BODY_EXCERPT_LIMIT;
use fetchbox_reqwest::ReqwestTransport;
use serde_json::json;
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn attempt(timeout: Duration) -> RequestAttempt {
    RequestAttempt::new(CorrelationId::new(), 1, timeout)
}

fn target(server: &MockServer, path: &str) -> RequestTarget {
    RequestTarget::new(format!("{}{}", server.uri(), path))
}

#[tokio::test]
async fn sends_json_get_with_correlation_id() {
    let server = MockServer::start().await;
    let attempt = attempt(Duration::from_secs(5));

    Mock::given(method("GET"))
        .and(path("/data/users.json"))
        .and(header("accept", "application/json"))
        .and(header(
            "x-correlation-id",
            attempt.correlation_id.to_string().as_str(),
        ))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"id": "u1", "fullName": "Alice"}])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let value = ReqwestTransport::new()
        .send(&target(&server, "/data/users.json"), &attempt)
        .await
        .unwrap();

    assert_eq!(value, json!([{"id": "u1", "fullName": "Alice"}]));
}

#[tokio::test]
async fn non_success_status_carries_body_excerpt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing.json"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such dataset"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken.json"))
        .respond_with(ResponseTemplate::new(500).set_body_string("x".repeat(500)))
        .mount(&server)
        .await;

    let transport = ReqwestTransport::new();
    let err = transport
        .send(
            &target(&server, "/missing.json"),
            &attempt(Duration::from_secs(5)),
        )
        .await
        .unwrap_err();
    assert_eq!(err, TransportFailure::http_status(404, "no such dataset"));

    let err = transport
        .send(
            &target(&server, "/broken.json"),
            &attempt(Duration::from_secs(5)),
        )
        .await
        .unwrap_err();
    match err {
        TransportFailure::HttpStatus {
            status,
            body_excerpt,
        } => {
            assert_eq!(status, 500);
            assert_eq!(body_excerpt.len(), BODY_EXCERPT_LIMIT);
        }
        other => panic!("unexpected failure: {other:?}"),
    }
}

#[tokio::test]
async fn invalid_json_is_malformed_payload() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/funds.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = ReqwestTransport::new()
        .send(
            &target(&server, "/funds.json"),
            &attempt(Duration::from_secs(5)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, TransportFailure::MalformedPayload(_)), "{err:?}");
}

#[tokio::test]
async fn slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let err = ReqwestTransport::new()
        .send(
            &target(&server, "/slow.json"),
            &attempt(Duration::from_millis(100)),
        )
        .await
        .unwrap_err();

    assert_eq!(
        err,
        TransportFailure::Timeout {
            after: Duration::from_millis(100)
        }
    );
}

#[tokio::test]
async fn spent_budget_reports_configured_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let attempt = attempt(Duration::from_millis(20));
    tokio::time::sleep(Duration::from_millis(40)).await;

    let err = ReqwestTransport::new()
        .send(&target(&server, "/late.json"), &attempt)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        TransportFailure::Timeout {
            after: Duration::from_millis(20)
        }
    );
    assert_eq!(err.to_string(), "request timed out after 20ms");
}

#[tokio::test]
async fn refused_connection_is_network_failure() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let err = ReqwestTransport::new()
        .send(
            &RequestTarget::new(format!("http://127.0.0.1:{port}/users.json")),
            &attempt(Duration::from_secs(5)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, TransportFailure::Network(_)), "{err:?}");
}

#[tokio::test]
async fn concurrent_fetches_hit_server_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/accounts.json"))
        .and(header_exists("x-correlation-id"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"id": "a1"}]))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::builder(ReqwestTransport::new())
        .base_url(server.uri())
        .build();
    let options = FetchOptions::default();

    let (a, b, c) = tokio::join!(
        client.fetch_json("/data/accounts.json", &options),
        client.fetch_json("/data/accounts.json", &options),
        client.fetch_json("/data/accounts.json", &options),
    );

    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
    assert_eq!(*a, json!([{"id": "a1"}]));
    assert!(Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&b, &c));

    // Served from cache.
    client
        .fetch_json("/data/accounts.json", &options)
        .await
        .unwrap();
}

#[tokio::test]
async fn service_unavailable_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/holdings.json"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data/holdings.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"fundId": "f1"}])))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::builder(ReqwestTransport::new())
        .base_url(server.uri())
        .build();

    let value = client
        .fetch_json("/data/holdings.json", &FetchOptions::default())
        .await
        .unwrap();

    assert_eq!(*value, json!([{"fundId": "f1"}]));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(
        requests[0].headers.get("x-correlation-id"),
        requests[1].headers.get("x-correlation-id")
    );
}

#[tokio::test]
async fn cache_bust_adds_unique_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/funds.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(2)
        .mount(&server)
        .await;

    let client = Client::builder(ReqwestTransport::new())
        .base_url(server.uri())
        .build();
    let options = FetchOptions::default().cache_bust(true);

    client.fetch_json("/data/funds.json", &options).await.unwrap();
    client.clear_cache(None);
    client.fetch_json("/data/funds.json", &options).await.unwrap();

    let nonces: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|request| {
            request
                .url
                .query_pairs()
                .find(|(name, _)| name == "_")
                .map(|(_, value)| value.into_owned())
                .unwrap()
        })
        .collect();
    assert_eq!(nonces.len(), 2);
    assert_ne!(nonces[0], nonces[1]);
}
