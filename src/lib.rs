pub mod config;
pub mod dashboard;
pub mod error;
pub mod format;
pub mod gateway;
pub mod http;
pub mod model;
pub mod query;
pub mod store;
pub mod utils;
pub mod views;
pub mod watchlist;

pub use config::Settings;
pub use error::{ApiError, GatewayError};
pub use gateway::MarketGateway;
pub use http::ApiClient;
pub use model::{ChartSeries, ChartWindow, CoinDetail, MarketEntry};
pub use query::{SortDirection, SortField, SortSpec};
pub use watchlist::WatchlistStore;
