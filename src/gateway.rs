//! Typed market data operations over [`ApiClient`].
//!
//! Each operation is a single composition of raw requests; failures are
//! wrapped per operation and never retried here.

use crate::error::{ApiError, GatewayError, Result};
use crate::http::ApiClient;
use crate::model::{
    ChartSeries, ChartWindow, CoinDetail, CoinDetailRecord, MarketEntry, SearchResponse,
    TrendingResponse,
};

/// Quote currency used for every request.
pub const DEFAULT_VS_CURRENCY: &str = "usd";

/// Entries requested by [`MarketGateway::list_markets`].
pub const DEFAULT_PER_PAGE: u32 = 100;

/// Upper bound accepted by `/coins/markets` for `per_page`.
pub const MAX_PER_PAGE: u32 = 250;

/// Candidates kept from search and trending before the batched follow-up.
pub const DEFAULT_CANDIDATE_LIMIT: usize = 10;

#[derive(Debug, Clone)]
pub struct MarketGateway {
    client: ApiClient,
    vs_currency: String,
    per_page: u32,
    candidate_limit: usize,
}

impl MarketGateway {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            vs_currency: DEFAULT_VS_CURRENCY.to_string(),
            per_page: DEFAULT_PER_PAGE,
            candidate_limit: DEFAULT_CANDIDATE_LIMIT,
        }
    }

    pub fn with_vs_currency(mut self, vs_currency: &str) -> Self {
        self.vs_currency = vs_currency.to_lowercase();
        self
    }

    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page.clamp(1, MAX_PER_PAGE);
        self
    }

    pub fn with_candidate_limit(mut self, limit: usize) -> Self {
        self.candidate_limit = limit.max(1);
        self
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn vs_currency(&self) -> &str {
        &self.vs_currency
    }

    /// Top coins by market cap, one page.
    pub async fn list_markets(&self) -> Result<Vec<MarketEntry>> {
        let query = [
            ("vs_currency", self.vs_currency.clone()),
            ("order", "market_cap_desc".to_string()),
            ("per_page", self.per_page.to_string()),
            ("page", "1".to_string()),
            ("sparkline", "false".to_string()),
            ("locale", "en".to_string()),
        ];
        let entries: Vec<MarketEntry> = self
            .client
            .get_json("coins/markets", &query)
            .await
            .map_err(GatewayError::MarketFetch)?;
        log::debug!("gateway.list_markets count={}", entries.len());
        Ok(entries)
    }

    /// Full record for one coin. A 404 means the id is unknown upstream.
    pub async fn get_coin_detail(&self, id: &str) -> Result<CoinDetail> {
        let query = [
            ("localization", "false".to_string()),
            ("tickers", "false".to_string()),
            ("market_data", "true".to_string()),
            ("community_data", "true".to_string()),
            ("developer_data", "true".to_string()),
            ("sparkline", "false".to_string()),
        ];
        let path = format!("coins/{}", encode_segment(id));
        let record: CoinDetailRecord = match self.client.get_json(&path, &query).await {
            Ok(r) => r,
            Err(e) if e.is_not_found() => {
                return Err(GatewayError::CoinNotFound { id: id.to_string() })
            }
            Err(e) => return Err(GatewayError::DetailFetch(e)),
        };
        log::debug!("gateway.get_coin_detail id={}", id);
        Ok(record.into_detail(&self.vs_currency))
    }

    /// Historical price, market-cap and volume samples.
    pub async fn get_market_chart(&self, id: &str, window: ChartWindow) -> Result<ChartSeries> {
        let query = [
            ("vs_currency", self.vs_currency.clone()),
            ("days", window.days().to_string()),
        ];
        let path = format!("coins/{}/market_chart", encode_segment(id));
        let series: ChartSeries = self
            .client
            .get_json(&path, &query)
            .await
            .map_err(GatewayError::ChartFetch)?;
        log::debug!(
            "gateway.get_market_chart id={} days={} prices={}",
            id,
            window.days(),
            series.prices.len()
        );
        Ok(series)
    }

    /// Resolves `query` to candidate ids, then fetches their market entries in
    /// one batched call. A blank query makes no request.
    pub async fn search_coins(&self, query: &str) -> Result<Vec<MarketEntry>> {
        let q = query.trim();
        if q.is_empty() {
            return Ok(Vec::new());
        }
        let resp: SearchResponse = self
            .client
            .get_json("search", &[("query", q.to_string())])
            .await
            .map_err(GatewayError::SearchFetch)?;
        let ids = take_candidates(resp.coins.into_iter().map(|c| c.id), self.candidate_limit);
        log::debug!("gateway.search query={} candidates={}", q, ids.len());

        self.markets_for_ids(&ids)
            .await
            .map_err(GatewayError::SearchFetch)
    }

    /// Trending feed, expanded to market entries with one batched call.
    pub async fn get_trending_coins(&self) -> Result<Vec<MarketEntry>> {
        let resp: TrendingResponse = self
            .client
            .get_json("search/trending", &[])
            .await
            .map_err(GatewayError::TrendingFetch)?;
        let ids = take_candidates(
            resp.coins.into_iter().map(|c| c.item.id),
            self.candidate_limit,
        );
        log::debug!("gateway.trending candidates={}", ids.len());

        self.markets_for_ids(&ids)
            .await
            .map_err(GatewayError::TrendingFetch)
    }

    async fn markets_for_ids(&self, ids: &[String]) -> std::result::Result<Vec<MarketEntry>, ApiError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = [
            ("vs_currency", self.vs_currency.clone()),
            ("ids", ids.join(",")),
            ("order", "market_cap_desc".to_string()),
            ("per_page", ids.len().to_string()),
            ("page", "1".to_string()),
            ("sparkline", "false".to_string()),
        ];
        let entries: Vec<MarketEntry> = self.client.get_json("coins/markets", &query).await?;
        Ok(order_by_ids(entries, ids))
    }
}

/// First `limit` distinct, non-empty ids in feed order.
fn take_candidates(ids: impl Iterator<Item = String>, limit: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for id in ids {
        if out.len() >= limit {
            break;
        }
        if !id.is_empty() && !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

/// Reorders batched results to follow candidate order; ids upstream did not
/// return are skipped.
fn order_by_ids(entries: Vec<MarketEntry>, ids: &[String]) -> Vec<MarketEntry> {
    let mut entries: Vec<Option<MarketEntry>> = entries.into_iter().map(Some).collect();
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(slot) = entries
            .iter_mut()
            .find(|e| e.as_ref().is_some_and(|e| &e.id == id))
        {
            out.extend(slot.take());
        }
    }
    out
}

fn encode_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
