//! HTTP client submitting position samples to the remote collector.

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use std::sync::Arc;
use std::time::Duration;

use super::error::{classify_status, classify_transport, StatusClass, UploadError};
use super::types::{SamplePayload, SubmitOutcome, TransientReason};
use crate::position::PositionFix;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_LOG_BODY_CHARS: usize = 512;

/// Destination for position samples.
///
/// Implementations issue at most one request per call and never retry internally.
#[async_trait]
pub trait SampleSink: Send + Sync {
    async fn submit(&self, fix: &PositionFix) -> SubmitOutcome;
}

/// Source of the opaque bearer token owned by the session layer.
pub trait TokenProvider: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

/// Reads the token from an environment variable on every call.
#[derive(Debug, Clone)]
pub struct EnvToken {
    var: String,
}

impl EnvToken {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl TokenProvider for EnvToken {
    fn access_token(&self) -> Option<String> {
        std::env::var(&self.var)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct StaticToken(pub Option<String>);

impl TokenProvider for StaticToken {
    fn access_token(&self) -> Option<String> {
        self.0.clone()
    }
}

pub struct UploadClient {
    client: reqwest::Client,
    endpoint: reqwest::Url,
    tokens: Arc<dyn TokenProvider>,
}

impl UploadClient {
    pub fn new(
        endpoint: &str,
        timeout: Duration,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, UploadError> {
        let endpoint = reqwest::Url::parse(endpoint)
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https"))
            .ok_or_else(|| UploadError::InvalidEndpoint(endpoint.to_string()))?;

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint,
            tokens,
        })
    }

    pub fn endpoint(&self) -> &reqwest::Url {
        &self.endpoint
    }

    fn headers(&self, token: &str) -> Result<HeaderMap, UploadError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| UploadError::InvalidToken)?;
        headers.insert(AUTHORIZATION, auth_value);
        Ok(headers)
    }

    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("sink response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("sink response error ({}): {}", status, preview);
    }
}

#[async_trait]
impl SampleSink for UploadClient {
    async fn submit(&self, fix: &PositionFix) -> SubmitOutcome {
        let Some(token) = self.tokens.access_token() else {
            return SubmitOutcome::RejectTransient(TransientReason::MissingToken);
        };
        let headers = match self.headers(&token) {
            Ok(headers) => headers,
            Err(e) => {
                warn!("Not submitting sample: {}", e);
                return SubmitOutcome::RejectTransient(TransientReason::MissingToken);
            }
        };

        let response = match self
            .client
            .post(self.endpoint.clone())
            .headers(headers)
            .json(&SamplePayload::from(fix))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                debug!("sink request failed: {}", e);
                return SubmitOutcome::RejectTransient(classify_transport(&e));
            }
        };

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Self::log_response(status, &body);

        match classify_status(status.as_u16()) {
            StatusClass::Accepted => SubmitOutcome::Ack,
            StatusClass::Permanent => SubmitOutcome::RejectPermanent {
                status: status.as_u16(),
                message: body.chars().take(MAX_LOG_BODY_CHARS).collect(),
            },
            StatusClass::Transient(reason) => SubmitOutcome::RejectTransient(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample() -> PositionFix {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        PositionFix::new(52.37, 4.89, 9.0, at).with_speed(2.0)
    }

    fn client(server: &MockServer, token: Option<&str>) -> UploadClient {
        UploadClient::new(
            &format!("{}/api/v1/locations", server.uri()),
            Duration::from_secs(5),
            Arc::new(StaticToken(token.map(String::from))),
        )
        .unwrap()
    }

    async fn respond_with(status: u16) -> (MockServer, SubmitOutcome) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/locations"))
            .respond_with(ResponseTemplate::new(status).set_body_string("{\"error\":\"x\"}"))
            .expect(1)
            .mount(&server)
            .await;
        let outcome = client(&server, Some("secret")).submit(&sample()).await;
        (server, outcome)
    }

    #[tokio::test]
    async fn sends_payload_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/locations"))
            .and(header("Authorization", "Bearer secret"))
            .and(body_partial_json(serde_json::json!({
                "latitude": 52.37,
                "longitude": 4.89,
                "kind": "tracking",
                "captured_at": "2026-03-01T09:00:00Z",
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = client(&server, Some("secret")).submit(&sample()).await;
        assert_eq!(outcome, SubmitOutcome::Ack);
    }

    #[tokio::test]
    async fn bad_request_is_permanent() {
        let (_server, outcome) = respond_with(422).await;
        assert!(matches!(
            outcome,
            SubmitOutcome::RejectPermanent { status: 422, .. }
        ));
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let (_server, outcome) = respond_with(503).await;
        assert_eq!(
            outcome,
            SubmitOutcome::RejectTransient(TransientReason::Server(503))
        );
    }

    #[tokio::test]
    async fn auth_and_rate_limit_are_transient() {
        let (_server, outcome) = respond_with(401).await;
        assert_eq!(
            outcome,
            SubmitOutcome::RejectTransient(TransientReason::Unauthorized(401))
        );

        let (_server, outcome) = respond_with(429).await;
        assert_eq!(
            outcome,
            SubmitOutcome::RejectTransient(TransientReason::RateLimited)
        );
    }

    #[tokio::test]
    async fn missing_token_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let outcome = client(&server, None).submit(&sample()).await;
        assert_eq!(
            outcome,
            SubmitOutcome::RejectTransient(TransientReason::MissingToken)
        );
    }

    #[tokio::test]
    async fn unreachable_sink_is_transient() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = UploadClient::new(
            &format!("http://{}/api/v1/locations", addr),
            Duration::from_secs(2),
            Arc::new(StaticToken(Some("secret".into()))),
        )
        .unwrap();
        assert!(client.submit(&sample()).await.is_transient());
    }

    #[test]
    fn rejects_non_http_endpoint() {
        let tokens = Arc::new(StaticToken(None));
        assert!(UploadClient::new("ftp://example.com/x", DEFAULT_TIMEOUT, tokens.clone()).is_err());
        assert!(UploadClient::new("not a url", DEFAULT_TIMEOUT, tokens).is_err());
    }
}
