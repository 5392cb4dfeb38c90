//! Thin JSON-over-HTTP wrapper used by the gateway.
//!
//! One attempt per call, a deadline that cancels the in-flight request, and
//! uniform [`ApiError`] translation for status, transport and decode failures.

use std::time::Duration;

use reqwest::header::{ACCEPT, USER_AGENT};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use url::Url;

use crate::error::ApiError;

/// Default base URL for the CoinGecko public API.
pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// Default request deadline in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Default connection timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default maximum idle connections per host.
pub const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 10;

/// Default idle timeout in seconds.
pub const DEFAULT_POOL_IDLE_TIMEOUT_SECS: u64 = 90;

/// Maximum error body excerpt kept on [`ApiError::Http`].
const MAX_ERROR_BODY_LEN: usize = 500;

/// Configuration for building the underlying HTTP client.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Deadline for a whole request (send plus body).
    pub timeout: Duration,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Maximum idle connections per host.
    pub pool_max_idle_per_host: usize,
    /// Idle connection timeout.
    pub pool_idle_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
            pool_idle_timeout: Duration::from_secs(DEFAULT_POOL_IDLE_TIMEOUT_SECS),
            user_agent: concat!("coinboard/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpClientConfig {
    /// Creates a new configuration with a custom request deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Creates a new configuration with a custom connect timeout.
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    fn build_http(&self) -> Result<reqwest::Client, reqwest::Error> {
        // The request deadline is enforced by `ApiClient`, not by reqwest, so
        // that a trip always surfaces as `ApiError::Timeout`.
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .pool_idle_timeout(self.pool_idle_timeout)
            .build()
    }
}

/// Client for JSON GET requests against a fixed base URL.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
    user_agent: String,
}

impl ApiClient {
    /// Creates a client for the default CoinGecko base URL.
    pub fn new() -> Result<Self, ApiError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, ApiError> {
        Self::with_config(base_url, HttpClientConfig::default())
    }

    pub fn with_config(base_url: &str, config: HttpClientConfig) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url)?;
        let http = config.build_http()?;
        Ok(Self {
            http,
            base_url,
            timeout: config.timeout,
            user_agent: config.user_agent,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Deadline applied when a call does not pass its own.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Builds a URL for the given path, preserving any base path prefix.
    pub fn build_url(&self, path: &str, query: &[(&str, String)]) -> Url {
        let mut url = self.base_url.clone();

        let base_path = url.path().trim_end_matches('/');
        let suffix = path.trim_start_matches('/');

        let merged = if base_path.is_empty() {
            format!("/{}", suffix)
        } else {
            format!("{}/{}", base_path, suffix)
        };
        url.set_path(&merged);

        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        url
    }

    /// Issues a GET and returns the decoded JSON body.
    ///
    /// `timeout` overrides the client deadline for this call.
    pub async fn request(
        &self,
        path: &str,
        query: &[(&str, String)],
        timeout: Option<Duration>,
    ) -> Result<JsonValue, ApiError> {
        let body = self.fetch(path, query, timeout).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Issues a GET and decodes the body into `T`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let body = self.fetch(path, query, None).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn fetch(
        &self,
        path: &str,
        query: &[(&str, String)],
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, ApiError> {
        let url = self.build_url(path, query);
        let deadline = timeout.unwrap_or(self.timeout);
        log::trace!("http.request method=GET url={} timeout_ms={}", url, deadline.as_millis());

        let send = async {
            let response = self
                .http
                .get(url.clone())
                .header(ACCEPT, "application/json")
                .header(USER_AGENT, &self.user_agent)
                .send()
                .await?;
            let response = check_response(response).await?;
            let body = response.bytes().await?;
            Ok::<_, ApiError>(body.to_vec())
        };

        // Dropping the future on expiry aborts the underlying connection.
        match tokio::time::timeout(deadline, send).await {
            Ok(Ok(body)) => {
                log::trace!("http.response url={} bytes={}", url, body.len());
                Ok(body)
            }
            Ok(Err(ApiError::Transport(e))) if e.is_timeout() => Err(ApiError::Timeout(deadline)),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                log::trace!("http.timeout url={} timeout_ms={}", url, deadline.as_millis());
                Err(ApiError::Timeout(deadline))
            }
        }
    }
}

/// Checks if the response is successful and returns an appropriate error if not.
async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    log::trace!("http.status status={}", status);

    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(MAX_ERROR_BODY_LEN)
        .collect::<String>();

    Err(ApiError::Http {
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or("").to_string(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ApiClient {
        ApiClient::with_base_url(&format!("{}/api/v3", server.uri())).unwrap()
    }

    #[test]
    fn test_build_url_preserves_base_path() {
        let client = ApiClient::new().unwrap();
        let url = client.build_url("/coins/markets", &[]);
        assert_eq!(url.as_str(), "https://api.coingecko.com/api/v3/coins/markets");
    }

    #[test]
    fn test_build_url_encodes_query() {
        let client = ApiClient::new().unwrap();
        let url = client.build_url(
            "search",
            &[("query", "shiba inu&co".to_string()), ("ids", "a,b".to_string())],
        );
        assert_eq!(
            url.as_str(),
            "https://api.coingecko.com/api/v3/search?query=shiba+inu%26co&ids=a%2Cb"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let err = ApiClient::with_base_url("not a url").unwrap_err();
        assert!(matches!(err, ApiError::Url(_)));
    }

    #[tokio::test]
    async fn test_request_returns_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/ping"))
            .and(query_param("vs_currency", "usd"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(r#"{"gecko_says":"(V3) To the Moon!"}"#, "application/json"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let body = client_for(&server)
            .request("ping", &[("vs_currency", "usd".to_string())], None)
            .await
            .unwrap();
        assert_eq!(body["gecko_says"], "(V3) To the Moon!");
    }

    #[tokio::test]
    async fn test_request_404_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/coins/nope"))
            .respond_with(ResponseTemplate::new(404).set_body_string(r#"{"error":"coin not found"}"#))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .request("coins/nope", &[], None)
            .await
            .unwrap_err();
        match err {
            ApiError::Http {
                status,
                status_text,
                body,
            } => {
                assert_eq!(status, 404);
                assert_eq!(status_text, "Not Found");
                assert!(body.contains("coin not found"));
            }
            other => panic!("expected Http error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_request_invalid_json_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/coins/markets"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .request("coins/markets", &[], None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_request_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("{}")
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let err = client_for(&server)
            .request("slow", &[], Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(err.is_timeout(), "got {err:?}");
    }

    #[tokio::test]
    async fn test_client_deadline_applies_to_get_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("[]")
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let config = HttpClientConfig::default().with_timeout(Duration::from_millis(50));
        let client =
            ApiClient::with_config(&format!("{}/api/v3", server.uri()), config).unwrap();
        let err = client.get_json::<Vec<u32>>("slow", &[]).await.unwrap_err();
        assert!(matches!(err, ApiError::Timeout(d) if d == Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn test_get_json_shape_mismatch_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/numbers"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"not":"a list"}"#))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .get_json::<Vec<u32>>("numbers", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ApiClient::with_base_url(&format!("http://{addr}")).unwrap();
        let err = client.request("ping", &[], None).await.unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)), "got {err:?}");
    }
}
