//! Error types for the market data client.
//!
//! [`ApiError`] is what the raw HTTP layer reports. [`GatewayError`] wraps it
//! per operation so callers can tell a failed market listing from a failed
//! chart fetch without inspecting messages.

use std::time::Duration;

/// Failure of a single upstream request.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No response arrived before the deadline.
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Upstream answered with a non-2xx status.
    #[error("HTTP {status} {status_text}")]
    Http {
        status: u16,
        status_text: String,
        /// Bounded excerpt of the response body.
        body: String,
    },

    /// Body was not valid JSON or did not match the expected shape.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Connection, DNS or TLS failure before a status was received.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Base URL or path could not be turned into a request URL.
    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),
}

impl ApiError {
    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

/// Failure of a gateway operation.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("failed to fetch market data: {0}")]
    MarketFetch(#[source] ApiError),

    #[error("coin not found: {id}")]
    CoinNotFound { id: String },

    #[error("failed to fetch coin details: {0}")]
    DetailFetch(#[source] ApiError),

    #[error("failed to fetch chart data: {0}")]
    ChartFetch(#[source] ApiError),

    #[error("failed to search coins: {0}")]
    SearchFetch(#[source] ApiError),

    #[error("failed to fetch trending coins: {0}")]
    TrendingFetch(#[source] ApiError),
}

impl GatewayError {
    /// The underlying request failure, absent for [`GatewayError::CoinNotFound`].
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::MarketFetch(e)
            | Self::DetailFetch(e)
            | Self::ChartFetch(e)
            | Self::SearchFetch(e)
            | Self::TrendingFetch(e) => Some(e),
            Self::CoinNotFound { .. } => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::CoinNotFound { .. } => Some(404),
            other => other.api_error().and_then(ApiError::status),
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.api_error().is_some_and(ApiError::is_timeout)
    }
}

/// A specialized Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16) -> ApiError {
        ApiError::Http {
            status,
            status_text: "Not Found".to_string(),
            body: String::new(),
        }
    }

    #[test]
    fn test_display_timeout() {
        let err = ApiError::Timeout(Duration::from_millis(10_000));
        assert_eq!(err.to_string(), "request timed out after 10000ms");
        assert!(err.is_timeout());
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_display_http() {
        let err = http(404);
        assert_eq!(err.to_string(), "HTTP 404 Not Found");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_from_serde_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: ApiError = json_err.into();
        assert!(matches!(err, ApiError::Decode(_)));
        assert!(err.to_string().starts_with("decode error"));
    }

    #[test]
    fn test_from_url_parse_error() {
        let url_err = url::Url::parse("not a url").unwrap_err();
        let err: ApiError = url_err.into();
        assert!(matches!(err, ApiError::Url(_)));
    }

    #[test]
    fn test_gateway_error_status() {
        assert_eq!(GatewayError::MarketFetch(http(503)).status(), Some(503));
        assert_eq!(
            GatewayError::CoinNotFound { id: "nope".into() }.status(),
            Some(404)
        );
        let timeout = GatewayError::ChartFetch(ApiError::Timeout(Duration::from_millis(5)));
        assert_eq!(timeout.status(), None);
        assert!(timeout.is_timeout());
    }

    #[test]
    fn test_gateway_error_display_wraps_source() {
        let err = GatewayError::DetailFetch(http(500));
        assert_eq!(
            err.to_string(),
            "failed to fetch coin details: HTTP 500 Not Found"
        );
    }
}
