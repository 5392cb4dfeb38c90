use std::env;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::gateway::{
    MarketGateway, DEFAULT_CANDIDATE_LIMIT, DEFAULT_PER_PAGE, DEFAULT_VS_CURRENCY, MAX_PER_PAGE,
};
use crate::http::{ApiClient, HttpClientConfig, DEFAULT_BASE_URL, DEFAULT_TIMEOUT_MS};
use crate::model::ChartWindow;

fn get_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn get_env_bool(key: &str, default: bool) -> bool {
    match get_env(key) {
        None => default,
        Some(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "y" | "on"),
    }
}

fn get_env_u64(key: &str, default: u64) -> Result<u64> {
    match get_env(key) {
        None => Ok(default),
        Some(v) => Ok(v
            .parse::<u64>()
            .map_err(|e| anyhow!("{key} invalid int: {e}"))?),
    }
}

fn get_env_usize(key: &str, default: usize) -> Result<usize> {
    match get_env(key) {
        None => Ok(default),
        Some(v) => Ok(v
            .parse::<usize>()
            .map_err(|e| anyhow!("{key} invalid int: {e}"))?),
    }
}

fn get_env_string(key: &str, default: &str) -> String {
    get_env(key).unwrap_or_else(|| default.to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Upstream API
    pub api_base_url: String,
    pub vs_currency: String,
    pub request_timeout_ms: u64,
    pub markets_per_page: u32,
    pub search_result_limit: usize,
    pub default_chart_window: ChartWindow,

    // Watchlist storage
    pub sqlite_path: String,

    // Dashboard
    pub dashboard_host: String,
    pub dashboard_port: u16,
    pub dashboard_open_browser: bool,
    pub market_refresh_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_BASE_URL.to_string(),
            vs_currency: DEFAULT_VS_CURRENCY.to_string(),
            request_timeout_ms: DEFAULT_TIMEOUT_MS,
            markets_per_page: DEFAULT_PER_PAGE,
            search_result_limit: DEFAULT_CANDIDATE_LIMIT,
            default_chart_window: ChartWindow::default(),
            sqlite_path: "./data/coinboard.sqlite".to_string(),
            dashboard_host: "127.0.0.1".to_string(),
            dashboard_port: 8000,
            dashboard_open_browser: false,
            market_refresh_secs: 60,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let d = Self::default();

        let default_chart_days = get_env_u64("DEFAULT_CHART_DAYS", d.default_chart_window.days() as u64)?;
        let default_chart_window = u32::try_from(default_chart_days)
            .map_err(|_| anyhow!("DEFAULT_CHART_DAYS out of range: {default_chart_days}"))
            .and_then(|days| {
                ChartWindow::try_from(days).map_err(|e| anyhow!("DEFAULT_CHART_DAYS {e}"))
            })?;

        let markets_per_page = get_env_u64("MARKETS_PER_PAGE", d.markets_per_page as u64)?;
        let dashboard_port = get_env_u64("DASHBOARD_PORT", d.dashboard_port as u64)?;

        let s = Self {
            api_base_url: get_env_string("COINGECKO_BASE_URL", &d.api_base_url),
            vs_currency: get_env_string("VS_CURRENCY", &d.vs_currency).to_lowercase(),
            request_timeout_ms: get_env_u64("REQUEST_TIMEOUT_MS", d.request_timeout_ms)?,
            markets_per_page: u32::try_from(markets_per_page)
                .map_err(|_| anyhow!("MARKETS_PER_PAGE out of range: {markets_per_page}"))?,
            search_result_limit: get_env_usize("SEARCH_RESULT_LIMIT", d.search_result_limit)?,
            default_chart_window,
            sqlite_path: get_env_string("SQLITE_PATH", &d.sqlite_path),
            dashboard_host: get_env_string("DASHBOARD_HOST", &d.dashboard_host),
            dashboard_port: u16::try_from(dashboard_port)
                .map_err(|_| anyhow!("DASHBOARD_PORT out of range: {dashboard_port}"))?,
            dashboard_open_browser: get_env_bool("DASHBOARD_OPEN_BROWSER", d.dashboard_open_browser),
            market_refresh_secs: get_env_u64("MARKET_REFRESH_SECS", d.market_refresh_secs)?,
        };

        s.validate()?;
        Ok(s)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Gateway wired to the configured upstream, currency and limits.
    pub fn build_gateway(&self) -> Result<MarketGateway> {
        let http = HttpClientConfig::default().with_timeout(self.request_timeout());
        let client = ApiClient::with_config(&self.api_base_url, http)
            .map_err(|e| anyhow!("api client init failed: {e}"))?;
        Ok(MarketGateway::new(client)
            .with_vs_currency(&self.vs_currency)
            .with_per_page(self.markets_per_page)
            .with_candidate_limit(self.search_result_limit))
    }

    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.api_base_url)
            .map_err(|e| anyhow!("COINGECKO_BASE_URL invalid ({}): {e}", self.api_base_url))?;
        if self.vs_currency.is_empty() || !self.vs_currency.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(anyhow!("VS_CURRENCY must be alphanumeric (got {})", self.vs_currency));
        }
        if self.request_timeout_ms < 1 {
            return Err(anyhow!(
                "REQUEST_TIMEOUT_MS must be >= 1 (got {})",
                self.request_timeout_ms
            ));
        }
        if self.markets_per_page < 1 || self.markets_per_page > MAX_PER_PAGE {
            return Err(anyhow!(
                "MARKETS_PER_PAGE must be in 1..={MAX_PER_PAGE} (got {})",
                self.markets_per_page
            ));
        }
        if self.search_result_limit < 1 || self.search_result_limit > 50 {
            return Err(anyhow!(
                "SEARCH_RESULT_LIMIT must be in 1..=50 (got {})",
                self.search_result_limit
            ));
        }
        if self.sqlite_path.trim().is_empty() {
            return Err(anyhow!("SQLITE_PATH must not be empty"));
        }
        if self.market_refresh_secs < 1 {
            return Err(anyhow!(
                "MARKET_REFRESH_SECS must be >= 1 (got {})",
                self.market_refresh_secs
            ));
        }
        Ok(())
    }
}
