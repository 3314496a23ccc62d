//! reqwest-backed transport.

use std::error::Error as _;
use std::time::Duration;

use async_trait::async_trait;
use fetchbox_core::{
    ACCEPT_JSON, CORRELATION_HEADER, RequestAttempt, RequestTarget, Transport, TransportFailure,
};
use http::header::ACCEPT;
use serde_json::Value;
use tracing::debug;

/// Transport issuing GET requests through a [`reqwest::Client`].
///
/// The request timeout is set from the attempt deadline, so a slow server
/// is reported as [`TransportFailure::Timeout`] rather than left hanging.
/// Targets must be absolute URLs; configure a base URL on the fetch client
/// when keys are paths.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Transport with a default reqwest client.
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    /// Transport over an existing client, sharing its connection pool.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        target: &RequestTarget,
        attempt: &RequestAttempt,
    ) -> Result<Value, TransportFailure> {
        let budget = attempt.remaining();
        if budget.is_zero() {
            return Err(TransportFailure::Timeout {
                after: attempt.timeout,
            });
        }

        let response = self
            .client
            .get(target.as_str())
            .header(ACCEPT, ACCEPT_JSON)
            .header(CORRELATION_HEADER, attempt.correlation_id.to_string())
            .timeout(budget)
            .send()
            .await
            .map_err(|err| classify(err, attempt.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(
                %target,
                status = status.as_u16(),
                attempt = attempt.number,
                "non-success response"
            );
            return Err(TransportFailure::http_status(status.as_u16(), &body));
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| classify(err, attempt.timeout))?;
        serde_json::from_slice(&body)
            .map_err(|err| TransportFailure::MalformedPayload(err.to_string()))
    }

    fn name(&self) -> &str {
        "reqwest"
    }
}

fn classify(err: reqwest::Error, timeout: Duration) -> TransportFailure {
    if err.is_timeout() {
        return TransportFailure::Timeout { after: timeout };
    }
    let message = match err.source() {
        Some(source) => format!("{err}: {source}"),
        None => err.to_string(),
    };
    TransportFailure::Network(message)
}
