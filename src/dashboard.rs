use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::{
    config::Settings,
    error::GatewayError,
    gateway::MarketGateway,
    model::{ChartWindow, MarketEntry},
    query::{self, SortDirection, SortField, SortSpec},
    utils::{normalize_coin_id, now_ts},
    views::{self, Latest},
    watchlist::WatchlistStore,
};

/// Last successful `/coins/markets` listing.
#[derive(Debug, Clone, Serialize)]
pub struct MarketsSnapshot {
    pub ts: f64,
    pub entries: Vec<MarketEntry>,
}

#[derive(Clone)]
pub struct DashboardState {
    pub settings: Settings,
    pub gateway: Arc<MarketGateway>,
    pub watchlist: Arc<Mutex<WatchlistStore>>,
    pub markets: Arc<Latest<MarketsSnapshot>>,
}

impl DashboardState {
    pub fn new(settings: Settings, gateway: MarketGateway, watchlist: WatchlistStore) -> Self {
        Self {
            settings,
            gateway: Arc::new(gateway),
            watchlist: Arc::new(Mutex::new(watchlist)),
            markets: Arc::new(Latest::new()),
        }
    }

    fn watched_ids(&self) -> Vec<String> {
        self.watchlist.lock().ids().to_vec()
    }
}

pub fn router(state: DashboardState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/health", get(api_health))
        .route("/api/markets", get(api_markets))
        .route("/api/markets/refresh", post(api_markets_refresh))
        .route("/api/coins/{id}", get(api_coin))
        .route("/api/search", get(api_search))
        .route("/api/trending", get(api_trending))
        .route("/api/watchlist", get(api_watchlist))
        .route(
            "/api/watchlist/{id}",
            post(api_watchlist_add).delete(api_watchlist_remove),
        )
        .route("/api/watchlist/{id}/toggle", post(api_watchlist_toggle))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve_dashboard(state: DashboardState) -> Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        state.settings.dashboard_host, state.settings.dashboard_port
    )
    .parse()
    .context("dashboard addr parse")?;

    spawn_market_refresh(state.clone());

    log::info!("dashboard.start url=http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Fetches a fresh listing and publishes it unless a newer refresh already
/// started. Returns the number of entries fetched.
pub async fn refresh_markets(st: &DashboardState) -> crate::error::Result<usize> {
    Ok(fetch_markets(st).await?.entries.len())
}

// The fetched snapshot is returned even when a newer refresh wins the slot.
async fn fetch_markets(st: &DashboardState) -> crate::error::Result<MarketsSnapshot> {
    let ticket = st.markets.begin();
    let snapshot = MarketsSnapshot {
        ts: now_ts(),
        entries: st.gateway.list_markets().await?,
    };
    let kept = st.markets.commit(ticket, snapshot.clone());
    log::info!(
        "markets.refresh count={} kept={}",
        snapshot.entries.len(),
        kept
    );
    Ok(snapshot)
}

/// Background loop that keeps the markets snapshot warm.
pub fn spawn_market_refresh(state: DashboardState) -> tokio::task::JoinHandle<()> {
    let refresh_secs = state.settings.market_refresh_secs.max(1);
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(std::time::Duration::from_secs(refresh_secs));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            if let Err(e) = refresh_markets(&state).await {
                log::warn!("markets.refresh.error {}", e);
            }
        }
    })
}

/// 404 for an unknown coin, 504 when upstream timed out, 502 otherwise.
pub fn status_for(e: &GatewayError) -> StatusCode {
    match e {
        GatewayError::CoinNotFound { .. } => StatusCode::NOT_FOUND,
        e if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::BAD_GATEWAY,
    }
}

fn gateway_error(e: GatewayError) -> Response {
    let status = status_for(&e);
    log::warn!("dashboard.upstream.error status={} {}", status.as_u16(), e);
    (
        status,
        Json(serde_json::json!({"ok": false, "error": e.to_string()})),
    )
        .into_response()
}

fn bad_request(msg: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({"ok": false, "error": msg.into()})),
    )
        .into_response()
}

async fn index(State(st): State<DashboardState>) -> impl IntoResponse {
    Html(render_index_html(
        &st.settings.dashboard_host,
        st.settings.dashboard_port,
        &st.settings.vs_currency,
        &st.settings.sqlite_path,
        st.settings.default_chart_window,
    ))
}

fn render_index_html(
    host: &str,
    port: u16,
    vs_currency: &str,
    sqlite_path: &str,
    default_window: ChartWindow,
) -> String {
    let window_buttons = ChartWindow::ALL
        .iter()
        .map(|w| {
            format!(
                r#"<button class="btn win" data-days="{days}">{label}</button>"#,
                days = w.days(),
                label = w.label()
            )
        })
        .collect::<Vec<_>>()
        .join("");

    format!(
        r##"<!doctype html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>Coinboard • Crypto Markets</title>
    <style>
      :root {{
        --bg: #0b1220;
        --panel: rgba(255,255,255,0.06);
        --stroke: rgba(255,255,255,0.12);
        --text: rgba(255,255,255,0.92);
        --muted: rgba(255,255,255,0.65);
        --good: #33d17a;
        --bad: #ff4d4d;
        --brand: #7c5cff;
        --brand2: #3dd6d0;
      }}
      * {{ box-sizing: border-box; }}
      body {{
        margin: 0;
        font-family: ui-sans-serif, system-ui, -apple-system, Segoe UI, Roboto, Helvetica, Arial;
        color: var(--text);
        background: radial-gradient(1200px 900px at 15% 10%, rgba(124,92,255,0.20), transparent 60%),
                    radial-gradient(1100px 800px at 90% 20%, rgba(61,214,208,0.16), transparent 55%),
                    var(--bg);
      }}
      .wrap {{ max-width: 1280px; margin: 0 auto; padding: 22px 18px 42px; }}
      .topbar {{
        display: flex; align-items: center; justify-content: space-between; gap: 12px;
        padding: 16px; border: 1px solid var(--stroke); border-radius: 16px;
        background: linear-gradient(180deg, rgba(255,255,255,0.06), rgba(255,255,255,0.03));
      }}
      .brand {{ display: flex; align-items: center; gap: 12px; }}
      .logo {{
        width: 42px; height: 42px; border-radius: 12px;
        background: conic-gradient(from 180deg, var(--brand), var(--brand2), var(--brand));
      }}
      .title {{ font-weight: 800; }}
      .subtitle {{ color: var(--muted); font-size: 12px; margin-top: 2px; }}
      .chips {{ display: flex; flex-wrap: wrap; gap: 8px; justify-content: flex-end; align-items: center; }}
      .chip {{
        padding: 7px 10px; border-radius: 999px; border: 1px solid var(--stroke);
        background: rgba(255,255,255,0.04); font-size: 12px; color: var(--muted); white-space: nowrap;
      }}
      .chip b {{ color: var(--text); }}
      .grid {{ display: grid; gap: 14px; margin-top: 14px; grid-template-columns: repeat(12, 1fr); }}
      .card {{ border: 1px solid var(--stroke); border-radius: 16px; background: var(--panel); overflow: hidden; }}
      .card .hd {{
        display: flex; align-items: center; justify-content: space-between; gap: 10px;
        padding: 12px 14px; border-bottom: 1px solid rgba(255,255,255,0.08); background: rgba(255,255,255,0.03);
      }}
      .card .hd .h {{ font-weight: 800; }}
      .card .bd {{ padding: 12px 14px; }}
      .good {{ color: var(--good); }}
      .bad {{ color: var(--bad); }}
      table {{ width: 100%; border-collapse: collapse; }}
      th, td {{ padding: 9px 10px; border-bottom: 1px solid rgba(255,255,255,0.07); text-align: left; }}
      th {{ color: var(--muted); font-size: 12px; cursor: pointer; user-select: none; }}
      td {{ font-size: 13px; }}
      tr.row:hover {{ background: rgba(255,255,255,0.04); cursor: pointer; }}
      .mono {{ font-family: ui-monospace, SFMono-Regular, Menlo, Monaco, Consolas, monospace; }}
      .btn {{
        cursor: pointer; padding: 7px 10px; border-radius: 10px; border: 1px solid rgba(255,255,255,0.12);
        background: rgba(255,255,255,0.05); color: var(--text); font-weight: 700; font-size: 12px;
      }}
      .btn.on {{ border-color: var(--brand2); }}
      .star {{ cursor: pointer; font-size: 16px; color: var(--muted); }}
      .star.on {{ color: #ffcc00; }}
      input {{
        padding: 8px 10px; border-radius: 10px; border: 1px solid var(--stroke);
        background: rgba(0,0,0,0.25); color: var(--text); min-width: 240px;
      }}
      .small {{ font-size: 12px; color: var(--muted); }}
      .kv {{ display: grid; grid-template-columns: repeat(4, 1fr); gap: 10px; margin-top: 10px; }}
      .kv div {{ border: 1px solid rgba(255,255,255,0.10); border-radius: 12px; padding: 10px; }}
      .banner {{
        margin-top: 12px; padding: 10px 12px; border-radius: 14px;
        border: 1px solid rgba(255,255,255,0.14); background: rgba(255, 77, 77, 0.10); display: none;
      }}
      .col-8 {{ grid-column: span 8; }}
      .col-4 {{ grid-column: span 4; }}
      .col-12 {{ grid-column: span 12; }}
      @media (max-width: 1100px) {{
        .col-8, .col-4 {{ grid-column: span 12; }}
        .kv {{ grid-template-columns: repeat(2, 1fr); }}
      }}
    </style>
  </head>
  <body>
    <div class="wrap">
      <div class="topbar">
        <div class="brand">
          <div class="logo"></div>
          <div>
            <div class="title">Coinboard • Crypto Markets</div>
            <div class="subtitle">
              Local: <span class="mono">{host}:{port}</span> • quote=<b>{vs_currency}</b>
            </div>
          </div>
        </div>
        <div class="chips">
          <div class="chip">Watchlist: <b class="mono">{sqlite_path}</b></div>
          <div class="chip">Status: <b id="statusText">starting…</b></div>
          <input id="searchBox" placeholder="Filter by name or symbol" />
          <button class="btn" id="refreshBtn">Refresh</button>
        </div>
      </div>

      <div class="banner" id="errBanner">
        <div style="font-weight:850;" id="errBannerMsg">--</div>
      </div>

      <div class="grid">
        <div class="card col-12" id="coinCard" style="display:none;">
          <div class="hd">
            <div class="h" id="coinTitle">--</div>
            <div class="chips">{window_buttons}<button class="btn" id="coinClose">Close</button></div>
          </div>
          <div class="bd">
            <svg id="chart" width="100%" height="180" viewBox="0 0 1000 180" preserveAspectRatio="none"></svg>
            <div class="kv" id="coinStats"></div>
          </div>
        </div>

        <div class="card col-8">
          <div class="hd">
            <div class="h">Markets</div>
            <div class="small" id="marketsMeta">--</div>
          </div>
          <div class="bd">
            <table>
              <thead><tr>
                <th></th>
                <th data-sort="market_cap_rank">#</th>
                <th>Coin</th>
                <th>Price</th>
                <th data-sort="price_change_percentage_24h">24h</th>
                <th data-sort="total_volume">Volume</th>
                <th>Market cap</th>
              </tr></thead>
              <tbody id="marketsBody"></tbody>
            </table>
          </div>
        </div>

        <div class="col-4" style="display:grid; gap:14px; align-content:start;">
          <div class="card">
            <div class="hd"><div class="h">Watchlist</div><div class="small" id="watchMeta">--</div></div>
            <div class="bd"><table><tbody id="watchBody"></tbody></table></div>
          </div>
          <div class="card">
            <div class="hd"><div class="h">Trending</div></div>
            <div class="bd"><table><tbody id="trendBody"></tbody></table></div>
          </div>
        </div>
      </div>
    </div>

    <script>
      const state = {{ sort: "market_cap_rank", dir: "asc", q: "", coin: null, days: {default_days}, watched: new Set() }};
      let coinSeq = 0;

      function fmtCurrency(v) {{
        if (v === null || v === undefined || !isFinite(v)) v = 0;
        const a = Math.abs(v), s = v < 0 ? "-$" : "$";
        if (a >= 1e12) return s + (a / 1e12).toFixed(2) + "T";
        if (a >= 1e9) return s + (a / 1e9).toFixed(2) + "B";
        if (a >= 1e6) return s + (a / 1e6).toFixed(2) + "M";
        if (a >= 1e3) return s + (a / 1e3).toFixed(2) + "K";
        return s + a.toFixed(2);
      }}
      function fmtPrice(v) {{
        if (v === null || v === undefined || !isFinite(v)) v = 0;
        return "$" + (v !== 0 && Math.abs(v) < 0.01 ? v.toFixed(6) : v.toFixed(2));
      }}
      function fmtPct(v) {{
        if (v === null || v === undefined || !isFinite(v)) return "0.00%";
        return (v >= 0 ? "+" : "") + v.toFixed(2) + "%";
      }}
      function cls(v) {{ return v > 0 ? "good" : (v < 0 ? "bad" : ""); }}
      function esc(s) {{ return String(s ?? "").replace(/[&<>"]/g, c => ({{"&":"&amp;","<":"&lt;",">":"&gt;","\"":"&quot;"}})[c]); }}

      function showBanner(msg) {{
        const b = document.getElementById("errBanner");
        document.getElementById("errBannerMsg").textContent = msg;
        b.style.display = msg ? "block" : "none";
      }}
      function setStatus(ok, text) {{
        const el = document.getElementById("statusText");
        el.textContent = text;
        el.className = ok ? "good" : "bad";
      }}
      async function getJson(url, opts) {{
        const r = await fetch(url, opts);
        const body = await r.json().catch(() => ({{}}));
        if (!r.ok) throw new Error(body.error || `${{r.status}} ${{url}}`);
        return body;
      }}

      function star(id) {{
        const on = state.watched.has(id);
        return `<span class="star ${{on ? "on" : ""}}" data-star="${{esc(id)}}">${{on ? "★" : "☆"}}</span>`;
      }}

      function renderMarkets(data) {{
        const rows = data.entries.map(e => `
          <tr class="row" data-coin="${{esc(e.id)}}">
            <td>${{star(e.id)}}</td>
            <td class="mono">${{e.market_cap_rank ?? "-"}}</td>
            <td><b>${{esc(e.name)}}</b> <span class="small">${{esc(e.symbol).toUpperCase()}}</span></td>
            <td class="mono">${{fmtPrice(e.current_price)}}</td>
            <td class="mono ${{cls(e.price_change_percentage_24h)}}">${{fmtPct(e.price_change_percentage_24h)}}</td>
            <td class="mono">${{fmtCurrency(e.total_volume)}}</td>
            <td class="mono">${{fmtCurrency(e.market_cap)}}</td>
          </tr>`).join("");
        document.getElementById("marketsBody").innerHTML = rows || `<tr><td colspan="7" class="small">No coins match.</td></tr>`;
        document.getElementById("marketsMeta").textContent = `${{data.count}} of ${{data.total}} • ${{data.sort}} ${{data.dir}}`;
      }}

      function renderSide(id, entries, empty) {{
        document.getElementById(id).innerHTML = entries.map(e => `
          <tr class="row" data-coin="${{esc(e.id)}}">
            <td>${{star(e.id)}}</td>
            <td><b>${{esc(e.name)}}</b> <span class="small">${{esc(e.symbol).toUpperCase()}}</span></td>
            <td class="mono">${{fmtPrice(e.current_price)}}</td>
            <td class="mono ${{cls(e.price_change_percentage_24h)}}">${{fmtPct(e.price_change_percentage_24h)}}</td>
          </tr>`).join("") || `<tr><td class="small">${{empty}}</td></tr>`;
      }}

      function renderChart(prices) {{
        const svg = document.getElementById("chart");
        if (!prices.length) {{ svg.innerHTML = ""; return; }}
        const xs = prices.map(p => p[0]), ys = prices.map(p => p[1]);
        const x0 = Math.min(...xs), x1 = Math.max(...xs), y0 = Math.min(...ys), y1 = Math.max(...ys);
        const sx = x => x1 === x0 ? 0 : (x - x0) / (x1 - x0) * 1000;
        const sy = y => y1 === y0 ? 90 : 170 - (y - y0) / (y1 - y0) * 160;
        const d = prices.map((p, i) => `${{i ? "L" : "M"}}${{sx(p[0]).toFixed(1)}},${{sy(p[1]).toFixed(1)}}`).join(" ");
        const up = ys[ys.length - 1] >= ys[0];
        svg.innerHTML = `<path d="${{d}}" fill="none" stroke="${{up ? "#33d17a" : "#ff4d4d"}}" stroke-width="2" />`;
      }}

      async function openCoin(id, days) {{
        state.coin = id;
        state.days = days ?? state.days;
        const seq = ++coinSeq;
        try {{
          const body = await getJson(`/api/coins/${{encodeURIComponent(id)}}?days=${{state.days}}`);
          if (seq !== coinSeq) return;
          const c = body.coin.detail;
          document.getElementById("coinCard").style.display = "block";
          document.getElementById("coinTitle").innerHTML = `${{star(c.id)}} ${{esc(c.name)}} <span class="small">${{esc(c.symbol).toUpperCase()}}</span>`;
          document.querySelectorAll(".win").forEach(b => b.classList.toggle("on", Number(b.dataset.days) === state.days));
          renderChart(body.coin.chart.prices);
          const stats = [
            ["Price", fmtPrice(c.current_price)],
            ["24h", fmtPct(c.price_change_percentage_24h)],
            ["Market cap", fmtCurrency(c.market_cap)],
            ["Volume", fmtCurrency(c.total_volume)],
            ["ATH", fmtPrice(c.ath)],
            ["ATL", fmtPrice(c.atl)],
            ["Reddit", (c.community_data.reddit_subscribers ?? 0).toLocaleString()],
            ["GitHub stars", (c.developer_data.stars ?? 0).toLocaleString()],
          ];
          document.getElementById("coinStats").innerHTML = stats.map(([k, v]) => `<div><div class="small">${{k}}</div><b class="mono">${{v}}</b></div>`).join("");
          showBanner("");
        }} catch (e) {{
          if (seq !== coinSeq) return;
          showBanner(`Coin ${{id}}: ${{e.message}}`);
        }}
      }}

      async function loadMarkets() {{
        const qs = new URLSearchParams({{ q: state.q, sort: state.sort, dir: state.dir }});
        renderMarkets(await getJson(`/api/markets?${{qs}}`));
      }}
      async function loadWatchlist() {{
        const w = await getJson("/api/watchlist");
        state.watched = new Set(w.ids);
        document.getElementById("watchMeta").textContent = `${{w.ids.length}} coins`;
        renderSide("watchBody", w.entries, "Star a coin to watch it.");
      }}
      async function loadTrending() {{
        renderSide("trendBody", await getJson("/api/trending"), "Nothing trending.");
      }}

      async function refresh() {{
        try {{
          await loadWatchlist();
          await Promise.all([loadMarkets(), loadTrending()]);
          setStatus(true, "connected");
        }} catch (e) {{
          setStatus(false, "degraded");
          showBanner(e.message);
        }}
      }}

      document.addEventListener("click", async ev => {{
        const s = ev.target.closest("[data-star]");
        if (s) {{
          ev.stopPropagation();
          try {{
            await getJson(`/api/watchlist/${{encodeURIComponent(s.dataset.star)}}/toggle`, {{ method: "POST" }});
            await loadWatchlist();
            await loadMarkets();
          }} catch (e) {{ showBanner(e.message); }}
          return;
        }}
        const th = ev.target.closest("th[data-sort]");
        if (th) {{
          if (state.sort === th.dataset.sort) state.dir = state.dir === "asc" ? "desc" : "asc";
          else {{ state.sort = th.dataset.sort; state.dir = "asc"; }}
          loadMarkets().catch(e => showBanner(e.message));
          return;
        }}
        const w = ev.target.closest(".win");
        if (w && state.coin) {{ openCoin(state.coin, Number(w.dataset.days)); return; }}
        const row = ev.target.closest("[data-coin]");
        if (row) openCoin(row.dataset.coin);
      }});
      document.getElementById("coinClose").addEventListener("click", () => {{
        coinSeq++;
        state.coin = null;
        document.getElementById("coinCard").style.display = "none";
      }});
      document.getElementById("searchBox").addEventListener("input", ev => {{
        state.q = ev.target.value;
        loadMarkets().catch(e => showBanner(e.message));
      }});
      document.getElementById("refreshBtn").addEventListener("click", async () => {{
        try {{ await getJson("/api/markets/refresh", {{ method: "POST" }}); }} catch (e) {{ showBanner(e.message); }}
        await refresh();
      }});
      refresh();
      setInterval(refresh, 30000);
    </script>
  </body>
</html>"##,
        host = host,
        port = port,
        vs_currency = vs_currency,
        sqlite_path = sqlite_path,
        window_buttons = window_buttons,
        default_days = default_window.days()
    )
}

async fn api_health(State(st): State<DashboardState>) -> impl IntoResponse {
    let snapshot_ts = st.markets.get().map(|s| s.ts);
    Json(serde_json::json!({
        "ok": true,
        "ts": now_ts(),
        "vs_currency": st.settings.vs_currency,
        "markets_loaded": snapshot_ts.is_some(),
        "markets_updated_ts": snapshot_ts,
        "watchlist_count": st.watchlist.lock().len(),
    }))
}

#[derive(Deserialize)]
struct MarketsQ {
    q: Option<String>,
    sort: Option<String>,
    dir: Option<String>,
}

#[derive(Serialize)]
struct MarketRow {
    #[serde(flatten)]
    entry: MarketEntry,
    watched: bool,
}

async fn api_markets(State(st): State<DashboardState>, Query(q): Query<MarketsQ>) -> Response {
    let field = match q.sort.as_deref().filter(|s| !s.trim().is_empty()) {
        None => SortField::default(),
        Some(s) => match SortField::from_str(s) {
            Ok(f) => f,
            Err(e) => return bad_request(e),
        },
    };
    let direction = match q.dir.as_deref().filter(|s| !s.trim().is_empty()) {
        None => SortDirection::default(),
        Some(s) => match SortDirection::from_str(s) {
            Ok(d) => d,
            Err(e) => return bad_request(e),
        },
    };

    let snapshot = match st.markets.get() {
        Some(s) => s,
        None => match fetch_markets(&st).await {
            Ok(s) => s,
            Err(e) => return gateway_error(e),
        },
    };

    let spec = SortSpec::new(field, direction);
    let entries = query::apply(&snapshot.entries, q.q.as_deref().unwrap_or(""), spec);
    let watched = st.watched_ids();
    let rows: Vec<MarketRow> = entries
        .into_iter()
        .map(|entry| MarketRow {
            watched: watched.contains(&entry.id),
            entry,
        })
        .collect();

    Json(serde_json::json!({
        "ts": snapshot.ts,
        "total": snapshot.entries.len(),
        "count": rows.len(),
        "sort": field.as_str(),
        "dir": direction.as_str(),
        "entries": rows,
    }))
    .into_response()
}

async fn api_markets_refresh(State(st): State<DashboardState>) -> Response {
    match refresh_markets(&st).await {
        Ok(count) => Json(serde_json::json!({"ok": true, "count": count, "ts": now_ts()})).into_response(),
        Err(e) => gateway_error(e),
    }
}

#[derive(Deserialize)]
struct CoinQ {
    days: Option<String>,
}

async fn api_coin(
    State(st): State<DashboardState>,
    Path(id): Path<String>,
    Query(q): Query<CoinQ>,
) -> Response {
    let Some(id) = normalize_coin_id(&id) else {
        return bad_request("coin id is required");
    };
    let window = match q.days.as_deref().filter(|s| !s.trim().is_empty()) {
        None => st.settings.default_chart_window,
        Some(s) => match ChartWindow::from_str(s) {
            Ok(w) => w,
            Err(e) => return bad_request(e.to_string()),
        },
    };
    match views::load_coin_page(&st.gateway, &id, window).await {
        Ok(page) => {
            let watched = st.watchlist.lock().contains(&id);
            Json(serde_json::json!({"coin": page, "watched": watched})).into_response()
        }
        Err(e) => gateway_error(e),
    }
}

#[derive(Deserialize)]
struct SearchQ {
    q: Option<String>,
}

async fn api_search(State(st): State<DashboardState>, Query(q): Query<SearchQ>) -> Response {
    match st.gateway.search_coins(q.q.as_deref().unwrap_or("")).await {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => gateway_error(e),
    }
}

async fn api_trending(State(st): State<DashboardState>) -> Response {
    match st.gateway.get_trending_coins().await {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => gateway_error(e),
    }
}

async fn api_watchlist(State(st): State<DashboardState>) -> impl IntoResponse {
    let ids = st.watched_ids();
    let entries = views::load_watchlist_entries(&st.gateway, &ids).await;
    Json(serde_json::json!({"ids": ids, "entries": entries}))
}

fn watchlist_reply(st: &DashboardState, id: &str) -> Response {
    let wl = st.watchlist.lock();
    Json(serde_json::json!({
        "ok": true,
        "id": id,
        "watched": wl.contains(id),
        "ids": wl.ids(),
    }))
    .into_response()
}

async fn api_watchlist_add(State(st): State<DashboardState>, Path(id): Path<String>) -> Response {
    let Some(id) = normalize_coin_id(&id) else {
        return bad_request("coin id is required");
    };
    st.watchlist.lock().add(&id);
    log::info!("watchlist.add id={}", id);
    watchlist_reply(&st, &id)
}

async fn api_watchlist_remove(
    State(st): State<DashboardState>,
    Path(id): Path<String>,
) -> Response {
    let Some(id) = normalize_coin_id(&id) else {
        return bad_request("coin id is required");
    };
    st.watchlist.lock().remove(&id);
    log::info!("watchlist.remove id={}", id);
    watchlist_reply(&st, &id)
}

async fn api_watchlist_toggle(
    State(st): State<DashboardState>,
    Path(id): Path<String>,
) -> Response {
    let Some(id) = normalize_coin_id(&id) else {
        return bad_request("coin id is required");
    };
    let watched = st.watchlist.lock().toggle(&id);
    log::info!("watchlist.toggle id={} watched={}", id, watched);
    watchlist_reply(&st, &id)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::ApiError;
    use crate::http::{ApiClient, HttpClientConfig};
    use crate::store::MemoryStore;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn state_for(upstream: &MockServer) -> DashboardState {
        let client = ApiClient::with_config(
            &format!("{}/api/v3", upstream.uri()),
            HttpClientConfig::default().with_timeout(Duration::from_millis(300)),
        )
        .unwrap();
        DashboardState::new(
            Settings::default(),
            MarketGateway::new(client),
            WatchlistStore::load(Box::new(MemoryStore::new())),
        )
    }

    async fn spawn_app(state: DashboardState) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn mount_markets(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/api/v3/coins/markets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "bitcoin", "symbol": "btc", "name": "Bitcoin", "market_cap_rank": 1,
                 "price_change_percentage_24h": 1.5, "total_volume": 30e9},
                {"id": "ethereum", "symbol": "eth", "name": "Ethereum", "market_cap_rank": 2,
                 "price_change_percentage_24h": -2.0, "total_volume": 15e9},
                {"id": "wrapped-bitcoin", "symbol": "wbtc", "name": "Wrapped Bitcoin", "market_cap_rank": 15,
                 "price_change_percentage_24h": null, "total_volume": 2e8}
            ])))
            .expect(1)
            .mount(server)
            .await;
    }

    #[test]
    fn test_status_for_maps_errors() {
        let nf = GatewayError::CoinNotFound { id: "x".into() };
        assert_eq!(status_for(&nf), StatusCode::NOT_FOUND);

        let timeout = GatewayError::ChartFetch(ApiError::Timeout(Duration::from_secs(1)));
        assert_eq!(status_for(&timeout), StatusCode::GATEWAY_TIMEOUT);

        let http = GatewayError::MarketFetch(ApiError::Http {
            status: 429,
            status_text: "Too Many Requests".into(),
            body: String::new(),
        });
        assert_eq!(status_for(&http), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_index_html_lists_windows() {
        let html = render_index_html("127.0.0.1", 8000, "usd", ":memory:", ChartWindow::Month);
        assert!(html.contains("Coinboard"));
        for w in ChartWindow::ALL {
            assert!(html.contains(&format!(r#"data-days="{}""#, w.days())));
        }
        assert!(html.contains("days: 30"));
        // Chart stroke colours are quoted hex literals inside the page script.
        assert!(html.contains(r##"up ? "#33d17a" : "#ff4d4d""##));
        assert!(html.trim_end().ends_with("</html>"));
    }

    #[tokio::test]
    async fn test_markets_filter_and_sort() {
        let upstream = MockServer::start().await;
        mount_markets(&upstream).await;
        let base = spawn_app(state_for(&upstream)).await;
        let http = reqwest::Client::new();

        let body: serde_json::Value = http
            .get(format!("{base}/api/markets?q=BITCOIN&sort=price_change_percentage_24h&dir=desc"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let ids: Vec<&str> = body["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["bitcoin", "wrapped-bitcoin"]);
        assert_eq!(body["total"], 3);
        assert_eq!(body["dir"], "desc");

        // Served from the snapshot; the mock expects a single upstream call.
        let body: serde_json::Value = http
            .get(format!("{base}/api/markets"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["count"], 3);
        assert_eq!(body["entries"][0]["id"], "bitcoin");
    }

    // A newer refresh starting mid-fetch on a cold start must not leave the
    // first caller without data.
    #[tokio::test]
    async fn test_markets_cold_start_serves_own_fetch_when_superseded() {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/coins/markets"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([
                        {"id": "bitcoin", "symbol": "btc", "name": "Bitcoin", "market_cap_rank": 1}
                    ]))
                    .set_delay(Duration::from_millis(150)),
            )
            .mount(&upstream)
            .await;
        let st = state_for(&upstream);
        let base = spawn_app(st.clone()).await;

        let pending = tokio::spawn(async move {
            reqwest::get(format!("{base}/api/markets")).await.unwrap()
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _newer = st.markets.begin();

        let resp = pending.await.unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["count"], 1);
        assert_eq!(body["entries"][0]["id"], "bitcoin");
        assert!(!st.markets.is_loaded());
    }

    #[tokio::test]
    async fn test_markets_rejects_unknown_sort() {
        let upstream = MockServer::start().await;
        let base = spawn_app(state_for(&upstream)).await;
        let resp = reqwest::get(format!("{base}/api/markets?sort=name")).await.unwrap();
        assert_eq!(resp.status().as_u16(), 400);
    }

    #[tokio::test]
    async fn test_markets_upstream_failure_is_bad_gateway() {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/coins/markets"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&upstream)
            .await;
        let base = spawn_app(state_for(&upstream)).await;
        let resp = reqwest::get(format!("{base}/api/markets")).await.unwrap();
        assert_eq!(resp.status().as_u16(), 502);
    }

    #[tokio::test]
    async fn test_coin_unknown_is_404_and_bad_window_is_400() {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/coins/nope"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&upstream)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v3/coins/nope/market_chart"))
            .and(query_param("days", "7"))
            .respond_with(ResponseTemplate::new(404).set_delay(Duration::from_millis(100)))
            .mount(&upstream)
            .await;
        let base = spawn_app(state_for(&upstream)).await;

        let resp = reqwest::get(format!("{base}/api/coins/nope")).await.unwrap();
        assert_eq!(resp.status().as_u16(), 404);

        let resp = reqwest::get(format!("{base}/api/coins/bitcoin?days=14")).await.unwrap();
        assert_eq!(resp.status().as_u16(), 400);
    }

    #[tokio::test]
    async fn test_coin_timeout_is_504() {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/coins/bitcoin"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&upstream)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v3/coins/bitcoin/market_chart"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&upstream)
            .await;
        let base = spawn_app(state_for(&upstream)).await;
        let resp = reqwest::get(format!("{base}/api/coins/bitcoin?days=1")).await.unwrap();
        assert_eq!(resp.status().as_u16(), 504);
    }

    #[tokio::test]
    async fn test_watchlist_routes() {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/coins/bitcoin"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "bitcoin", "symbol": "btc", "name": "Bitcoin",
                "market_data": {"current_price": {"usd": 67000.0}}
            })))
            .mount(&upstream)
            .await;
        let st = state_for(&upstream);
        let base = spawn_app(st.clone()).await;
        let http = reqwest::Client::new();

        let body: serde_json::Value = http
            .post(format!("{base}/api/watchlist/Bitcoin"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["id"], "bitcoin");
        assert_eq!(body["watched"], true);

        let body: serde_json::Value = http
            .post(format!("{base}/api/watchlist/solana/toggle"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["ids"], serde_json::json!(["bitcoin", "solana"]));

        http.delete(format!("{base}/api/watchlist/solana"))
            .send()
            .await
            .unwrap();
        assert_eq!(st.watched_ids(), vec!["bitcoin".to_string()]);

        let body: serde_json::Value = http
            .get(format!("{base}/api/watchlist"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["entries"][0]["id"], "bitcoin");
        assert_eq!(body["entries"][0]["current_price"], 67000.0);
    }

    #[tokio::test]
    async fn test_health_reports_snapshot_state() {
        let upstream = MockServer::start().await;
        mount_markets(&upstream).await;
        let st = state_for(&upstream);
        let base = spawn_app(st.clone()).await;

        let body: serde_json::Value = reqwest::get(format!("{base}/api/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["markets_loaded"], false);

        assert_eq!(refresh_markets(&st).await.unwrap(), 3);
        let body: serde_json::Value = reqwest::get(format!("{base}/api/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["markets_loaded"], true);
    }
}
