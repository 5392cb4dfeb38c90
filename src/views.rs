//! Page-level loads that combine several gateway calls, and the guard that
//! keeps slow, superseded responses from overwriting newer ones.

use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::join_all;
use parking_lot::RwLock;
use serde::Serialize;

use crate::error::Result;
use crate::gateway::MarketGateway;
use crate::model::{ChartSeries, ChartWindow, CoinDetail};

/// Everything the coin page shows.
#[derive(Debug, Clone, Serialize)]
pub struct CoinPage {
    pub detail: CoinDetail,
    pub window: ChartWindow,
    pub chart: ChartSeries,
}

/// Fetches detail and chart concurrently. Either failure fails the page;
/// there is no partial result.
pub async fn load_coin_page(
    gateway: &MarketGateway,
    id: &str,
    window: ChartWindow,
) -> Result<CoinPage> {
    let (detail, chart) = tokio::try_join!(
        gateway.get_coin_detail(id),
        gateway.get_market_chart(id, window)
    )?;
    Ok(CoinPage {
        detail,
        window,
        chart,
    })
}

/// Fetches details for every watched id concurrently. Ids that fail are
/// logged and left out; output follows watchlist order.
pub async fn load_watchlist_entries(gateway: &MarketGateway, ids: &[String]) -> Vec<CoinDetail> {
    let results = join_all(ids.iter().map(|id| gateway.get_coin_detail(id))).await;
    ids.iter()
        .zip(results)
        .filter_map(|(id, r)| match r {
            Ok(detail) => Some(detail),
            Err(e) => {
                log::warn!("watchlist.fetch.error id={} {}", id, e);
                None
            }
        })
        .collect()
}

/// Ticket handed out by [`RequestGuard::begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

/// Monotonic generation counter for one display slot.
#[derive(Debug, Default)]
pub struct RequestGuard {
    latest: AtomicU64,
}

impl RequestGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a request; any earlier ticket becomes stale.
    pub fn begin(&self) -> Ticket {
        Ticket(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket.0
    }
}

/// A displayed value that only the newest request may replace.
#[derive(Debug, Default)]
pub struct Latest<T> {
    guard: RequestGuard,
    value: RwLock<Option<(Ticket, T)>>,
}

impl<T: Clone> Latest<T> {
    pub fn new() -> Self {
        Self {
            guard: RequestGuard::new(),
            value: RwLock::new(None),
        }
    }

    pub fn begin(&self) -> Ticket {
        self.guard.begin()
    }

    /// Stores `value` if `ticket` is still the newest; returns whether it was
    /// kept.
    pub fn commit(&self, ticket: Ticket, value: T) -> bool {
        let mut slot = self.value.write();
        if !self.guard.is_current(ticket) {
            log::debug!("request.stale ticket={:?}", ticket);
            return false;
        }
        *slot = Some((ticket, value));
        true
    }

    pub fn get(&self) -> Option<T> {
        self.value.read().as_ref().map(|(_, v)| v.clone())
    }

    pub fn is_loaded(&self) -> bool {
        self.value.read().is_some()
    }
}
