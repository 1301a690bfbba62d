//! # Tessera Evaluation Client
//!
//! HTTP access to a remote evaluation service. The service evaluates a pre-evaluation block
//! and answers with one serialized record per attempted action, in block order. This module
//! only moves those records over the wire; turning them back into chained evaluations is the
//! job of [`crate::chain`].
use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use backoff::ExponentialBackoff;
use chrono::DateTime;
use reqwest::{header, Client, ClientBuilder, Response, StatusCode, Url};
use serde::Serialize;
use tessera_common::{
    dto::{Health, RemoteEvaluationRequest, RemoteEvaluationResponse, SerializedActionEvaluation},
    models::PreEvaluationBlock,
};
use thiserror::Error;
use tokio::{sync::RwLock, time::sleep};
use tracing::{debug, instrument, trace};

use crate::{config::RetryConfiguration, EVALUATION_API_VERSION};

#[derive(Error, Debug)]
pub enum RPCError {
    /// The passed service url failed to parse.
    #[error("Failed to parse URL: {0}. Error: {1}")]
    UrlParsing(String, String),

    /// The request data is not correctly formed.
    #[error("Failed to format request: {0}")]
    FormatRequest(String),

    /// Errors forwarded from the HTTP protocol.
    #[error("Unexpected HTTP client error: {0}")]
    HttpClient(String, #[source] reqwest::Error),

    /// The response from the server could not be parsed correctly.
    #[error("Failed to parse response: {0}")]
    ParseResponse(String),

    /// The service answered, but could not evaluate the block.
    #[error("Evaluation failed with status {0}: {1}")]
    Evaluation(StatusCode, String),

    #[error("Rate limited until {0:?}")]
    RateLimited(Option<SystemTime>),

    #[error("Server unreachable: {0}")]
    ServerUnreachable(String),
}

/// Configuration options for HttpEvaluationClient
#[derive(Debug, Clone, Default)]
pub struct HttpEvaluationClientOptions {
    /// Optional API key for authentication
    pub auth_key: Option<String>,
    /// Timeout of a single attempt; `None` waits for as long as the evaluation takes
    pub timeout: Option<Duration>,
    pub retry: RetryConfiguration,
}

impl HttpEvaluationClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the authentication key
    pub fn with_auth_key(mut self, auth_key: Option<String>) -> Self {
        self.auth_key = auth_key;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfiguration) -> Self {
        self.retry = retry;
        self
    }
}

#[derive(Debug, Clone)]
pub struct HttpEvaluationClient {
    http_client: Client,
    url: Url,
    retry_after: Arc<RwLock<Option<SystemTime>>>,
    backoff_policy: ExponentialBackoff,
    server_restart_duration: Duration,
}

impl HttpEvaluationClient {
    pub fn new(base_uri: &str, options: HttpEvaluationClientOptions) -> Result<Self, RPCError> {
        let uri = base_uri
            .parse::<Url>()
            .map_err(|e| RPCError::UrlParsing(base_uri.to_string(), e.to_string()))?;

        let mut headers = header::HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));
        let user_agent = format!("tessera-client-{version}", version = env!("CARGO_PKG_VERSION"));
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_str(&user_agent)
                .map_err(|e| RPCError::FormatRequest(format!("Invalid user agent format: {e}")))?,
        );

        if let Some(key) = options.auth_key.as_deref() {
            let mut auth_value = header::HeaderValue::from_str(key).map_err(|e| {
                RPCError::FormatRequest(format!("Invalid authorization key format: {e}"))
            })?;
            auth_value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, auth_value);
        }

        let mut builder = ClientBuilder::new().default_headers(headers);
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| RPCError::HttpClient(e.to_string(), e))?;
        Ok(Self {
            http_client: client,
            url: uri,
            retry_after: Arc::new(RwLock::new(None)),
            backoff_policy: options.retry.backoff_policy(),
            server_restart_duration: options.retry.server_restart_duration(),
        })
    }

    #[cfg(test)]
    pub fn with_test_backoff_policy(mut self) -> Self {
        let retry = RetryConfiguration::new(
            Duration::from_millis(1),
            1.1,
            Duration::from_millis(5),
            Some(Duration::from_millis(50)),
            Duration::from_millis(5),
        );
        self.backoff_policy = retry.backoff_policy();
        self.server_restart_duration = retry.server_restart_duration();
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.url
                .to_string()
                .trim_end_matches('/'),
            EVALUATION_API_VERSION,
            path
        )
    }

    /// Converts a error response to a Result.
    ///
    /// Raises an error if the response status code is 429, 502, 503 or 504, or any other
    /// non-success status. In the 429 case it will try to look for a retry-after header and
    /// parse it accordingly.
    async fn error_for_response(
        &self,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, RPCError> {
        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after_raw = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|h| h.to_str().ok())
                    .and_then(parse_retry_value);

                Err(RPCError::RateLimited(retry_after_raw))
            }
            StatusCode::BAD_GATEWAY |
            StatusCode::SERVICE_UNAVAILABLE |
            StatusCode::GATEWAY_TIMEOUT => Err(RPCError::ServerUnreachable(
                response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Server Unreachable".to_string()),
            )),
            status if !status.is_success() => Err(RPCError::Evaluation(
                status,
                response
                    .text()
                    .await
                    .unwrap_or_default(),
            )),
            _ => Ok(response),
        }
    }

    /// Classifies errors into transient or permanent ones.
    ///
    /// Transient errors are retried with a potential backoff, permanent ones are not.
    /// If the error is RateLimited, this method will set the self.retry_after value so
    /// future requests wait until the rate limit has been reset.
    async fn handle_error_for_backoff(&self, e: RPCError) -> backoff::Error<RPCError> {
        match e {
            RPCError::ServerUnreachable(_) => {
                backoff::Error::retry_after(e, self.server_restart_duration)
            }
            RPCError::RateLimited(Some(until)) => {
                let mut retry_after_guard = self.retry_after.write().await;
                *retry_after_guard = Some(
                    retry_after_guard
                        .unwrap_or(until)
                        .max(until),
                );

                if let Ok(duration) = until.duration_since(SystemTime::now()) {
                    backoff::Error::retry_after(e, duration)
                } else {
                    e.into()
                }
            }
            RPCError::RateLimited(None) => e.into(),
            _ => backoff::Error::permanent(e),
        }
    }

    /// Waits until the current rate limit time has passed.
    async fn wait_until_retry_after(&self) {
        if let Some(&until) = self.retry_after.read().await.as_ref() {
            let now = SystemTime::now();
            if until > now {
                if let Ok(duration) = until.duration_since(now) {
                    sleep(duration).await
                }
            }
        }
    }

    /// Makes a post request handling transient failures.
    ///
    /// If a retry-after header is received it will be respected. Else the configured
    /// backoff policy is used to deal with transient network or server errors.
    async fn make_post_request<T: Serialize + ?Sized>(
        &self,
        request: &T,
        uri: &str,
    ) -> Result<Response, RPCError> {
        self.wait_until_retry_after().await;
        let response = backoff::future::retry(self.backoff_policy.clone(), || async {
            let server_response = self
                .http_client
                .post(uri)
                .json(request)
                .send()
                .await
                .map_err(|e| RPCError::HttpClient(e.to_string(), e))?;

            match self
                .error_for_response(server_response)
                .await
            {
                Ok(response) => Ok(response),
                Err(e) => Err(self.handle_error_for_backoff(e).await),
            }
        })
        .await?;
        Ok(response)
    }

    /// Sends `block` to the service and returns the serialized evaluation records.
    ///
    /// The call either yields every record or fails as a whole.
    #[instrument(skip_all, fields(block_index = block.index()))]
    pub async fn evaluate_remote(
        &self,
        block: &PreEvaluationBlock,
    ) -> Result<Vec<SerializedActionEvaluation>, RPCError> {
        let uri = self.endpoint("evaluation");
        debug!(%uri, "Sending evaluation request");
        let request = RemoteEvaluationRequest::new(block.clone());
        let response = self
            .make_post_request(&request, &uri)
            .await?;

        let body = response
            .text()
            .await
            .map_err(|e| RPCError::ParseResponse(e.to_string()))?;
        let response = serde_json::from_str::<RemoteEvaluationResponse>(&body)
            .map_err(|err| RPCError::ParseResponse(format!("Error: {err}, Body: {body}")))?;
        trace!(evaluations = response.evaluations.len(), "Received evaluation response");

        Ok(response.evaluations)
    }

    pub async fn health(&self) -> Result<Health, RPCError> {
        let uri = self.endpoint("health");
        let response = self
            .http_client
            .get(&uri)
            .send()
            .await
            .map_err(|e| RPCError::HttpClient(e.to_string(), e))?;
        let response = self
            .error_for_response(response)
            .await?;
        response
            .json::<Health>()
            .await
            .map_err(|e| RPCError::ParseResponse(e.to_string()))
    }
}

fn parse_retry_value(val: &str) -> Option<SystemTime> {
    if let Ok(secs) = val.parse::<u64>() {
        return Some(SystemTime::now() + Duration::from_secs(secs));
    }
    if let Ok(date) = DateTime::parse_from_rfc2822(val) {
        return Some(date.into());
    }
    None
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tessera_common::{
        action::ActionEvaluator,
        state::MockBlockChainStates,
        testing::{genesis_block, increment, transaction},
    };

    use super::*;

    fn evaluated_response(block: &PreEvaluationBlock) -> String {
        let evaluations = ActionEvaluator::new(Arc::new(MockBlockChainStates::new()))
            .evaluate_block(block)
            .unwrap();
        serde_json::to_string(&RemoteEvaluationResponse::from(evaluations.as_slice())).unwrap()
    }

    #[tokio::test]
    async fn test_evaluate_remote() {
        let mut server = Server::new_async().await;
        let block = genesis_block(vec![transaction(1, vec![increment(0xc0), increment(0xc0)])]);
        let mocked_server = server
            .mock("POST", "/v1/evaluation")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "pre_evaluation_block": { "header": { "index": 0 } }
            })))
            .expect(1)
            .with_body(evaluated_response(&block))
            .create_async()
            .await;

        let client =
            HttpEvaluationClient::new(server.url().as_str(), HttpEvaluationClientOptions::new())
                .expect("create client");

        let evaluations = client
            .evaluate_remote(&block)
            .await
            .expect("evaluate");

        mocked_server.assert();
        assert_eq!(evaluations.len(), 2);
        assert_eq!(evaluations[1].input_context.block_index, 0);
    }

    #[tokio::test]
    async fn test_auth_key_is_sent() {
        let mut server = Server::new_async().await;
        let block = genesis_block(vec![]);
        let mocked_server = server
            .mock("POST", "/v1/evaluation")
            .match_header("authorization", "secret")
            .with_body(r#"{"evaluations":[]}"#)
            .create_async()
            .await;

        let client = HttpEvaluationClient::new(
            server.url().as_str(),
            HttpEvaluationClientOptions::new().with_auth_key(Some("secret".to_string())),
        )
        .unwrap();

        assert!(client
            .evaluate_remote(&block)
            .await
            .unwrap()
            .is_empty());
        mocked_server.assert();
    }

    #[rstest]
    #[case::server_error(500, "boom")]
    #[case::bad_request(400, "bad block")]
    #[tokio::test]
    async fn test_evaluation_failures_are_permanent(#[case] status: usize, #[case] body: &str) {
        let mut server = Server::new_async().await;
        let mocked_server = server
            .mock("POST", "/v1/evaluation")
            .with_status(status)
            .with_body(body)
            .expect(1)
            .create_async()
            .await;
        let client =
            HttpEvaluationClient::new(server.url().as_str(), HttpEvaluationClientOptions::new())
                .unwrap()
                .with_test_backoff_policy();

        let err = client
            .evaluate_remote(&genesis_block(vec![]))
            .await
            .unwrap_err();

        mocked_server.assert();
        match err {
            RPCError::Evaluation(code, message) => {
                assert_eq!(code.as_u16() as usize, status);
                assert_eq!(message, body);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_response_fails_whole_call() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/v1/evaluation")
            .with_body(r#"{"evaluations":[{"action":{"type":"unknown"}}]}"#)
            .create_async()
            .await;
        let client =
            HttpEvaluationClient::new(server.url().as_str(), HttpEvaluationClientOptions::new())
                .unwrap();

        let err = client
            .evaluate_remote(&genesis_block(vec![]))
            .await
            .unwrap_err();

        assert!(matches!(err, RPCError::ParseResponse(_)));
    }

    #[test_log::test(tokio::test)]
    async fn test_unreachable_server_is_retried() {
        let mut server = Server::new_async().await;
        let unavailable = server
            .mock("POST", "/v1/evaluation")
            .with_status(503)
            .expect_at_least(2)
            .create_async()
            .await;
        let client =
            HttpEvaluationClient::new(server.url().as_str(), HttpEvaluationClientOptions::new())
                .unwrap()
                .with_test_backoff_policy();

        let err = client
            .evaluate_remote(&genesis_block(vec![]))
            .await
            .unwrap_err();

        unavailable.assert();
        assert!(matches!(err, RPCError::ServerUnreachable(_)));
    }

    #[tokio::test]
    async fn test_error_for_response_rate_limited() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/test")
            .with_status(429)
            .with_header("Retry-After", "60")
            .create_async()
            .await;

        let response = reqwest::Client::new()
            .get(format!("{}/test", server.url()))
            .send()
            .await
            .unwrap();

        let http_client =
            HttpEvaluationClient::new(server.url().as_str(), HttpEvaluationClientOptions::new())
                .unwrap()
                .with_test_backoff_policy();
        let result = http_client
            .error_for_response(response)
            .await;

        mock.assert();
        assert!(matches!(result, Err(RPCError::RateLimited(Some(_)))));
    }

    #[tokio::test]
    async fn test_health() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/v1/health")
            .with_body(r#"{"status":"ok","version":"0.12.0"}"#)
            .create_async()
            .await;
        let client =
            HttpEvaluationClient::new(server.url().as_str(), HttpEvaluationClientOptions::new())
                .unwrap();

        let health = client.health().await.unwrap();

        assert_eq!(health.status, "ok");
    }

    #[test]
    fn test_parse_retry_value() {
        assert!(parse_retry_value("60").is_some());
        assert!(parse_retry_value("Wed, 21 Oct 2065 07:28:00 GMT").is_some());
        assert!(parse_retry_value("invalid").is_none());
        assert!(parse_retry_value("").is_none());
    }
}
