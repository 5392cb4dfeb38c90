//! Market data records as received from the upstream API.
//!
//! Numeric fields stay `Option`: a missing price is not a zero price. Zero
//! substitution only happens when formatting for display.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{de::Error as DeError, Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

/// One coin's market snapshot, as returned by `/coins/markets`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketEntry {
    pub id: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default, deserialize_with = "deserialize_option_f64")]
    pub current_price: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_option_f64")]
    pub market_cap: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_option_u32")]
    pub market_cap_rank: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_option_f64")]
    pub fully_diluted_valuation: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_option_f64")]
    pub total_volume: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_option_f64")]
    pub high_24h: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_option_f64")]
    pub low_24h: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_option_f64")]
    pub price_change_24h: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_option_f64")]
    pub price_change_percentage_24h: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_option_f64")]
    pub market_cap_change_24h: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_option_f64")]
    pub market_cap_change_percentage_24h: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_option_f64")]
    pub circulating_supply: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_option_f64")]
    pub total_supply: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_option_f64")]
    pub max_supply: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_option_f64")]
    pub ath: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_option_f64")]
    pub ath_change_percentage: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_option_datetime")]
    pub ath_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_option_f64")]
    pub atl: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_option_f64")]
    pub atl_change_percentage: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_option_datetime")]
    pub atl_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_option_datetime")]
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommunityData {
    #[serde(default, deserialize_with = "deserialize_option_u64")]
    pub facebook_likes: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_option_u64")]
    pub reddit_subscribers: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_option_u64")]
    pub twitter_followers: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeveloperData {
    #[serde(default, deserialize_with = "deserialize_option_u64")]
    pub forks: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_option_u64")]
    pub stars: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_option_u64")]
    pub subscribers: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_option_u64")]
    pub total_issues: Option<u64>,
}

/// A market snapshot plus community and developer statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoinDetail {
    #[serde(flatten)]
    pub market: MarketEntry,
    pub community_data: CommunityData,
    pub developer_data: DeveloperData,
    pub public_interest_score: Option<f64>,
}

impl From<CoinDetail> for MarketEntry {
    fn from(detail: CoinDetail) -> Self {
        detail.market
    }
}

type CurrencyValues = HashMap<String, Option<f64>>;
type CurrencyDates = HashMap<String, Option<String>>;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageLinks {
    pub thumb: Option<String>,
    pub small: Option<String>,
    pub large: Option<String>,
}

/// Nested `market_data` block of `/coins/{id}`; price-like values are keyed
/// by quote currency.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetailMarketData {
    #[serde(default)]
    pub current_price: CurrencyValues,
    #[serde(default)]
    pub market_cap: CurrencyValues,
    #[serde(default, deserialize_with = "deserialize_option_u32")]
    pub market_cap_rank: Option<u32>,
    #[serde(default)]
    pub fully_diluted_valuation: CurrencyValues,
    #[serde(default)]
    pub total_volume: CurrencyValues,
    #[serde(default)]
    pub high_24h: CurrencyValues,
    #[serde(default)]
    pub low_24h: CurrencyValues,
    #[serde(default, deserialize_with = "deserialize_option_f64")]
    pub price_change_24h: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_option_f64")]
    pub price_change_percentage_24h: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_option_f64")]
    pub market_cap_change_24h: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_option_f64")]
    pub market_cap_change_percentage_24h: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_option_f64")]
    pub circulating_supply: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_option_f64")]
    pub total_supply: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_option_f64")]
    pub max_supply: Option<f64>,
    #[serde(default)]
    pub ath: CurrencyValues,
    #[serde(default)]
    pub ath_change_percentage: CurrencyValues,
    #[serde(default)]
    pub ath_date: CurrencyDates,
    #[serde(default)]
    pub atl: CurrencyValues,
    #[serde(default)]
    pub atl_change_percentage: CurrencyValues,
    #[serde(default)]
    pub atl_date: CurrencyDates,
    #[serde(default)]
    pub last_updated: Option<String>,
}

/// Raw `/coins/{id}` record.
#[derive(Debug, Clone, Deserialize)]
pub struct CoinDetailRecord {
    pub id: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub image: Option<ImageLinks>,
    #[serde(default, deserialize_with = "deserialize_option_u32")]
    pub market_cap_rank: Option<u32>,
    #[serde(default)]
    pub market_data: Option<DetailMarketData>,
    #[serde(default)]
    pub community_data: Option<CommunityData>,
    #[serde(default)]
    pub developer_data: Option<DeveloperData>,
    #[serde(default, deserialize_with = "deserialize_option_f64")]
    pub public_interest_score: Option<f64>,
    #[serde(default)]
    pub last_updated: Option<String>,
}

impl CoinDetailRecord {
    /// Flattens the record for one quote currency (e.g. `usd`).
    pub fn into_detail(self, vs_currency: &str) -> CoinDetail {
        let vs = vs_currency.to_lowercase();
        let md = self.market_data.unwrap_or_default();
        let pick = |m: &CurrencyValues| m.get(&vs).copied().flatten();
        let pick_date = |m: &CurrencyDates| {
            m.get(&vs)
                .and_then(|d| d.as_deref())
                .and_then(parse_datetime)
        };

        let image = self
            .image
            .and_then(|i| i.large.or(i.small).or(i.thumb))
            .unwrap_or_default();
        let last_updated = md
            .last_updated
            .as_deref()
            .or(self.last_updated.as_deref())
            .and_then(parse_datetime);

        let market = MarketEntry {
            id: self.id,
            symbol: self.symbol,
            name: self.name,
            image,
            current_price: pick(&md.current_price),
            market_cap: pick(&md.market_cap),
            market_cap_rank: md.market_cap_rank.or(self.market_cap_rank),
            fully_diluted_valuation: pick(&md.fully_diluted_valuation),
            total_volume: pick(&md.total_volume),
            high_24h: pick(&md.high_24h),
            low_24h: pick(&md.low_24h),
            price_change_24h: md.price_change_24h,
            price_change_percentage_24h: md.price_change_percentage_24h,
            market_cap_change_24h: md.market_cap_change_24h,
            market_cap_change_percentage_24h: md.market_cap_change_percentage_24h,
            circulating_supply: md.circulating_supply,
            total_supply: md.total_supply,
            max_supply: md.max_supply,
            ath: pick(&md.ath),
            ath_change_percentage: pick(&md.ath_change_percentage),
            ath_date: pick_date(&md.ath_date),
            atl: pick(&md.atl),
            atl_change_percentage: pick(&md.atl_change_percentage),
            atl_date: pick_date(&md.atl_date),
            last_updated,
        };

        CoinDetail {
            market,
            community_data: self.community_data.unwrap_or_default(),
            developer_data: self.developer_data.unwrap_or_default(),
            public_interest_score: self.public_interest_score,
        }
    }
}

/// One `(timestamp, value)` sample; upstream sends `[ms, value]` pairs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(i64, f64)")]
pub struct ChartPoint {
    pub timestamp_ms: i64,
    pub value: f64,
}

impl From<(f64, f64)> for ChartPoint {
    fn from((ts, value): (f64, f64)) -> Self {
        Self {
            timestamp_ms: ts as i64,
            value,
        }
    }
}

impl From<ChartPoint> for (i64, f64) {
    fn from(p: ChartPoint) -> Self {
        (p.timestamp_ms, p.value)
    }
}

/// Price, market-cap and volume samples for a trailing window. The three
/// series are each ascending by timestamp but need not be the same length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    #[serde(default)]
    pub prices: Vec<ChartPoint>,
    #[serde(default)]
    pub market_caps: Vec<ChartPoint>,
    #[serde(default)]
    pub total_volumes: Vec<ChartPoint>,
}

impl ChartSeries {
    pub fn is_empty(&self) -> bool {
        self.prices.is_empty() && self.market_caps.is_empty() && self.total_volumes.is_empty()
    }

    /// First and last price of the window.
    pub fn open_close(&self) -> Option<(f64, f64)> {
        Some((self.prices.first()?.value, self.prices.last()?.value))
    }

    /// Lowest and highest finite price of the window.
    pub fn price_range(&self) -> Option<(f64, f64)> {
        self.prices
            .iter()
            .map(|p| p.value)
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

/// Supported trailing chart windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum ChartWindow {
    Day,
    #[default]
    Week,
    Month,
    Quarter,
}

impl ChartWindow {
    pub const ALL: [ChartWindow; 4] = [Self::Day, Self::Week, Self::Month, Self::Quarter];

    pub fn days(self) -> u32 {
        match self {
            Self::Day => 1,
            Self::Week => 7,
            Self::Month => 30,
            Self::Quarter => 90,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Day => "24H",
            Self::Week => "7D",
            Self::Month => "30D",
            Self::Quarter => "90D",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported chart window: {0} (expected 1, 7, 30 or 90 days)")]
pub struct UnsupportedWindow(pub String);

impl TryFrom<u32> for ChartWindow {
    type Error = UnsupportedWindow;

    fn try_from(days: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|w| w.days() == days)
            .ok_or_else(|| UnsupportedWindow(days.to_string()))
    }
}

impl From<ChartWindow> for u32 {
    fn from(w: ChartWindow) -> Self {
        w.days()
    }
}

impl FromStr for ChartWindow {
    type Err = UnsupportedWindow;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        if let Some(w) = Self::ALL.into_iter().find(|w| w.label().eq_ignore_ascii_case(t)) {
            return Ok(w);
        }
        t.parse::<u32>()
            .map_err(|_| UnsupportedWindow(t.to_string()))
            .and_then(Self::try_from)
    }
}

impl fmt::Display for ChartWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// `/search` response; only coin ids are used.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub coins: Vec<SearchCoin>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchCoin {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
}

/// `/search/trending` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrendingResponse {
    #[serde(default)]
    pub coins: Vec<TrendingItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrendingItem {
    pub item: TrendingCoin,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrendingCoin {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub score: Option<u32>,
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Deserializes a field that may be a number, string, or null into `Option<f64>`.
fn deserialize_option_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<JsonValue>::deserialize(deserializer)? {
        Some(JsonValue::Number(num)) => num
            .as_f64()
            .ok_or_else(|| DeError::custom("expected f64-compatible number"))
            .map(Some),
        Some(JsonValue::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                trimmed
                    .parse::<f64>()
                    .map(Some)
                    .map_err(|e| DeError::custom(format!("invalid float string: {}", e)))
            }
        }
        Some(JsonValue::Null) | None => Ok(None),
        other => Err(DeError::custom(format!(
            "expected number or string for float field, got {:?}",
            other
        ))),
    }
}

/// Like [`deserialize_option_f64`] for counters; negative or fractional
/// values become `None` instead of failing the record.
fn deserialize_option_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<JsonValue>::deserialize(deserializer)? {
        Some(JsonValue::Number(num)) => Ok(num.as_u64()),
        Some(JsonValue::String(s)) => Ok(s.trim().parse::<u64>().ok()),
        _ => Ok(None),
    }
}

fn deserialize_option_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserialize_option_u64(deserializer)?.and_then(|v| u32::try_from(v).ok()))
}

/// RFC 3339 timestamps; anything unparseable is treated as missing.
fn deserialize_option_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .as_deref()
        .and_then(parse_datetime))
}
