use axum::{
    extract::{Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stockrate_core::domain::rating::RatingPage;
use stockrate_core::domain::recommendation::Recommendation;
use stockrate_core::llm::openai::OpenAiClient;
use stockrate_core::llm::RankingOracle;
use stockrate_core::query::{FilterParams, ListQuery};
use stockrate_core::storage::{RatingsRepository, RecordStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = stockrate_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let ratings = match RecordStore::connect(&settings).await {
        Ok(store) => {
            if settings.run_migrations {
                match stockrate_core::storage::migrate(store.pool()).await {
                    Ok(()) => Some(RatingsRepository::new(store)),
                    Err(e) => {
                        let err = anyhow::Error::new(e);
                        sentry_anyhow::capture_anyhow(&err);
                        tracing::error!(error = %err, "db migrations failed; starting API in degraded mode");
                        None
                    }
                }
            } else {
                Some(RatingsRepository::new(store))
            }
        }
        Err(e) => {
            let err = anyhow::Error::new(e);
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
            None
        }
    };

    let oracle: Option<Arc<dyn RankingOracle>> = match OpenAiClient::from_settings(&settings.openai) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            tracing::warn!(error = %e, "ranking oracle not configured; recommendations disabled");
            None
        }
    };

    let app = router(AppState { ratings, oracle });

    let addr = format!("{}:{}", settings.host, settings.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

#[derive(Clone)]
struct AppState {
    ratings: Option<RatingsRepository>,
    oracle: Option<Arc<dyn RankingOracle>>,
}

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET]);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/api/stocks/list", get(list_stocks))
        .route("/v1/api/stocks/recommendations", get(recommendations))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
struct ListResponse {
    message: &'static str,
    data: RatingPage,
}

async fn list_stocks(
    State(state): State<AppState>,
    Query(raw): Query<HashMap<String, String>>,
) -> Result<Json<ListResponse>, ApiError> {
    let params = FilterParams::from_pairs(raw);
    // Bad paging is reported even when the store is down.
    let query = ListQuery::compile(&params)?;

    let Some(ratings) = &state.ratings else {
        return Err(ApiError::unavailable("record store is not connected"));
    };

    let data = ratings.list(&query).await?;
    Ok(Json(ListResponse {
        message: "Success",
        data,
    }))
}

async fn recommendations(State(state): State<AppState>) -> Result<Json<Recommendation>, ApiError> {
    let Some(ratings) = &state.ratings else {
        return Err(ApiError::unavailable("record store is not connected"));
    };
    let Some(oracle) = &state.oracle else {
        return Err(ApiError::unavailable("ranking oracle is not configured"));
    };

    let candidates = ratings.recommendation_candidates().await?;
    let recommendation = stockrate_core::llm::recommend(oracle.as_ref(), candidates).await?;
    Ok(Json(recommendation))
}

const GENERIC_DETAIL: &str = "Error generating response";

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    detail: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: u16,
    detail: String,
}

impl ApiError {
    fn unavailable(detail: &str) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            detail: detail.to_string(),
        }
    }
}

impl From<stockrate_core::Error> for ApiError {
    fn from(err: stockrate_core::Error) -> Self {
        use stockrate_core::Error;

        let status = match &err {
            Error::StoreTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Error::Oracle { .. } => StatusCode::BAD_GATEWAY,
            Error::Validation { .. }
            | Error::Store { .. }
            | Error::UpstreamFeed { .. }
            | Error::Config { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        // Only caller mistakes are described; everything else stays in logs and Sentry.
        let detail = match &err {
            Error::Validation { .. } => err.to_string(),
            _ => GENERIC_DETAIL.to_string(),
        };

        if let Error::Oracle {
            raw_output: Some(raw),
            ..
        } = &err
        {
            tracing::error!(raw_output = %raw, "ranking oracle returned an unusable answer");
        }

        if !matches!(err, Error::Validation { .. }) {
            let err = anyhow::Error::new(err);
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %err, %status, "request failed");
        }

        Self { status, detail }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.status.as_u16(),
            detail: self.detail,
        };
        (self.status, Json(body)).into_response()
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &stockrate_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
