use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};

use coinboard::{
    config::Settings,
    dashboard::{self, DashboardState},
    format::{format_currency, format_number, format_percentage, format_price, Trend},
    model::{ChartWindow, MarketEntry},
    query::{self, SortDirection, SortField, SortSpec},
    store::open_store,
    utils::normalize_coin_id,
    views,
    watchlist::WatchlistStore,
};

#[derive(Debug, Parser)]
#[command(name = "coinboard", version, about = "Crypto market dashboard")]
struct Cli {
    /// Override VS_CURRENCY
    #[arg(long, global = true)]
    currency: Option<String>,

    /// Override SQLITE_PATH
    #[arg(long, global = true)]
    sqlite: Option<String>,

    /// Override DASHBOARD_PORT
    #[arg(long, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the web dashboard (default)
    Serve,
    /// Top coins by market cap, filtered and sorted locally
    Markets {
        #[arg(long, short)]
        query: Option<String>,
        /// market_cap_rank | price_change_percentage_24h | total_volume
        #[arg(long, default_value = "market_cap_rank")]
        sort: SortField,
        #[arg(long)]
        desc: bool,
        #[arg(long, default_value_t = 25)]
        limit: usize,
    },
    /// Detail and price chart for one coin
    Coin {
        id: String,
        /// 1, 7, 30 or 90 (or 24H/7D/30D/90D)
        #[arg(long)]
        days: Option<ChartWindow>,
    },
    /// Search coins by name or symbol
    Search { query: String },
    /// Coins trending on the upstream API
    Trending,
    /// Manage the watchlist
    Watch {
        #[command(subcommand)]
        action: WatchAction,
    },
}

#[derive(Debug, Subcommand)]
enum WatchAction {
    /// Watched coins with current prices
    List,
    Add { id: String },
    Remove { id: String },
    Toggle { id: String },
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let mut settings = Settings::load()?;
    if let Some(c) = cli.currency {
        settings.vs_currency = c.to_lowercase();
    }
    if let Some(p) = cli.sqlite {
        settings.sqlite_path = p;
    }
    if let Some(p) = cli.port {
        settings.dashboard_port = p;
    }
    settings.validate()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(settings).await,
        Command::Markets {
            query,
            sort,
            desc,
            limit,
        } => {
            let direction = if desc {
                SortDirection::Descending
            } else {
                SortDirection::Ascending
            };
            let gateway = settings.build_gateway()?;
            let entries = gateway.list_markets().await?;
            let shown = query::apply(
                &entries,
                query.as_deref().unwrap_or(""),
                SortSpec::new(sort, direction),
            );
            print_market_table(&shown[..shown.len().min(limit)]);
            Ok(())
        }
        Command::Coin { id, days } => {
            let id = normalize_coin_id(&id).ok_or_else(|| anyhow!("coin id is required"))?;
            let window = days.unwrap_or(settings.default_chart_window);
            let gateway = settings.build_gateway()?;
            let page = views::load_coin_page(&gateway, &id, window).await?;
            let m = &page.detail.market;
            println!("{} ({})", m.name, m.symbol.to_uppercase());
            println!(
                "  price       {}  {} {}",
                format_price(m.current_price),
                Trend::of(m.price_change_percentage_24h).arrow(),
                format_percentage(m.price_change_percentage_24h)
            );
            println!("  market cap  {}", format_currency(m.market_cap));
            println!("  volume 24h  {}", format_currency(m.total_volume));
            println!("  supply      {}", format_number(m.circulating_supply));
            println!(
                "  ath / atl   {} / {}",
                format_price(m.ath),
                format_price(m.atl)
            );
            match (page.chart.price_range(), page.chart.open_close()) {
                (Some((lo, hi)), Some((open, close))) => {
                    println!(
                        "  {} low/high {} .. {} ({} points)",
                        window,
                        format_price(Some(lo)),
                        format_price(Some(hi)),
                        page.chart.prices.len()
                    );
                    println!(
                        "  {} open     {} -> {}",
                        window,
                        format_price(Some(open)),
                        format_price(Some(close))
                    );
                }
                _ => println!("  {} chart    no data", window),
            }
            Ok(())
        }
        Command::Search { query } => {
            let gateway = settings.build_gateway()?;
            print_market_table(&gateway.search_coins(&query).await?);
            Ok(())
        }
        Command::Trending => {
            let gateway = settings.build_gateway()?;
            print_market_table(&gateway.get_trending_coins().await?);
            Ok(())
        }
        Command::Watch { action } => {
            let mut watchlist = WatchlistStore::load(open_store(&settings.sqlite_path)?);
            match action {
                WatchAction::List => {
                    let gateway = settings.build_gateway()?;
                    let details = views::load_watchlist_entries(&gateway, watchlist.ids()).await;
                    let entries: Vec<MarketEntry> = details.into_iter().map(Into::into).collect();
                    print_market_table(&entries);
                }
                WatchAction::Add { id } => {
                    let id = normalize_coin_id(&id).ok_or_else(|| anyhow!("coin id is required"))?;
                    watchlist.add(&id);
                    println!("watching {id}");
                }
                WatchAction::Remove { id } => {
                    let id = normalize_coin_id(&id).ok_or_else(|| anyhow!("coin id is required"))?;
                    watchlist.remove(&id);
                    println!("not watching {id}");
                }
                WatchAction::Toggle { id } => {
                    let id = normalize_coin_id(&id).ok_or_else(|| anyhow!("coin id is required"))?;
                    if watchlist.toggle(&id) {
                        println!("watching {id}");
                    } else {
                        println!("not watching {id}");
                    }
                }
            }
            Ok(())
        }
    }
}

async fn serve(settings: Settings) -> Result<()> {
    let gateway = settings.build_gateway()?;
    let watchlist = WatchlistStore::load(open_store(&settings.sqlite_path)?);

    log::info!(
        "app.start vs_currency={} api={} sqlite={} watchlist={}",
        settings.vs_currency,
        settings.api_base_url,
        settings.sqlite_path,
        watchlist.len()
    );

    if settings.dashboard_open_browser {
        let url = format!(
            "http://{}:{}/",
            settings.dashboard_host, settings.dashboard_port
        );
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(650)).await;
            let _ = std::process::Command::new("xdg-open").arg(&url).spawn();
        });
    }

    let state = DashboardState::new(settings, gateway, watchlist);
    tokio::select! {
        r = dashboard::serve_dashboard(state) => r,
        _ = tokio::signal::ctrl_c() => {
            log::info!("app.shutdown");
            Ok(())
        }
    }
}

fn print_market_table(entries: &[MarketEntry]) {
    if entries.is_empty() {
        println!("no coins");
        return;
    }
    println!(
        "{:>5}  {:<24} {:>14} {:>10} {:>12} {:>12}",
        "#", "coin", "price", "24h", "volume", "market cap"
    );
    for e in entries {
        let rank = e
            .market_cap_rank
            .map(|r| r.to_string())
            .unwrap_or_else(|| "-".to_string());
        let name = format!("{} ({})", e.name, e.symbol.to_uppercase());
        println!(
            "{:>5}  {:<24} {:>14} {:>8} {} {:>12} {:>12}",
            rank,
            truncate(&name, 24),
            format_price(e.current_price),
            format_percentage(e.price_change_percentage_24h),
            Trend::of(e.price_change_percentage_24h).arrow(),
            format_currency(e.total_volume),
            format_currency(e.market_cap)
        );
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}
