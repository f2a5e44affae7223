mod routes;
mod sessions;
mod store;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use chrono::{DateTime, Utc};
use region_nav::matching::{NameMatcher, RecordingObserver, TieBreak};
use region_nav::metrics::{MetricsProvider, NoMetrics, StaticMetrics};
use region_nav::source::parse_dataset;
use region_nav::style::StylePalette;
use region_nav::{BaseLayers, DatasetLayout, RegionIndex};
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use sessions::Sessions;
use store::DataStore;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(30);
    let timeout = Duration::from_secs(timeout_secs);

    let store = DataStore::from_env(timeout);
    let state = match AppState::load(store).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("Failed to load datasets: {e}");
            std::process::exit(1);
        }
    };

    let app = Router::new()
        .merge(routes::router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(timeout))
                .layer(CompressionLayer::new())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state);

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await.unwrap();
    tracing::info!("Listening on {bind_addr}");
    axum::serve(listener, app).await.unwrap();
}

#[derive(Clone)]
pub struct AppState {
    pub store: DataStore,
    pub index: Arc<RegionIndex>,
    pub base: Arc<BaseLayers>,
    pub metrics: Arc<dyn MetricsProvider>,
    pub observer: Arc<RecordingObserver>,
    pub matcher: NameMatcher,
    pub palette: StylePalette,
    pub sessions: Sessions,
    pub loaded_at: DateTime<Utc>,
}

impl AppState {
    /// Read the index and whole-country layers once; sessions share them.
    async fn load(store: DataStore) -> Result<Self, region_nav::NavError> {
        let layout = DatasetLayout::default();
        let index = RegionIndex::load(&store.get_cached(&layout.index).await?)?;
        let base = BaseLayers {
            provinces: parse_dataset(
                &layout.provinces,
                &store.get_cached(&layout.provinces).await?,
            )?,
            regencies: parse_dataset(
                &layout.regencies,
                &store.get_cached(&layout.regencies).await?,
            )?,
        };
        let stats = index.statistics();
        tracing::info!(
            "Loaded {} provinces, {} regencies, {} districts",
            stats.total_provinces,
            stats.total_regencies,
            stats.total_districts
        );

        let metrics: Arc<dyn MetricsProvider> = match std::env::var("METRICS_FILE") {
            Ok(path) => {
                let data = tokio::fs::read(&path).await?;
                Arc::new(StaticMetrics::from_json(&data)?)
            }
            Err(_) => Arc::new(NoMetrics),
        };

        let palette = match std::env::var("PALETTE_FILE") {
            Ok(path) => serde_json::from_slice(&tokio::fs::read(&path).await?)?,
            Err(_) => StylePalette::default(),
        };

        let tie_break = match std::env::var("MATCH_TIE_BREAK").as_deref() {
            Ok("reject") => TieBreak::Reject,
            _ => TieBreak::FirstInOrder,
        };
        let observer = Arc::new(RecordingObserver::default());

        Ok(Self {
            store,
            index: Arc::new(index),
            base: Arc::new(base),
            metrics,
            matcher: NameMatcher::new(tie_break, observer.clone()),
            observer,
            palette,
            sessions: Sessions::default(),
            loaded_at: Utc::now(),
        })
    }
}
