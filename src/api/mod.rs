mod payload;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::{Json, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tracing::{error, info, warn};

use crate::core::{FieldViolation, ValuationError, run_valuation};
use crate::market::{FetchDefaults, MarketDataError, MarketDataProvider, fetch_input};

pub use payload::{ValuationPayload, input_from_json};

pub const DEFAULT_ALLOWED_ORIGINS: [&str; 4] = [
    "http://localhost:3000",
    "http://127.0.0.1:3000",
    "http://localhost:8000",
    "http://127.0.0.1:8000",
];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub allowed_origins: Vec<String>,
}

#[derive(Clone)]
pub struct AppState {
    provider: Arc<dyn MarketDataProvider + Send + Sync>,
    fetch_defaults: FetchDefaults,
}

impl AppState {
    pub fn new(
        provider: Arc<dyn MarketDataProvider + Send + Sync>,
        fetch_defaults: FetchDefaults,
    ) -> Self {
        Self {
            provider,
            fetch_defaults,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid CORS origin {0:?}")]
    InvalidOrigin(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Serialize)]
struct ErrorResponse<'a> {
    error: String,
    kind: &'static str,
    #[serde(skip_serializing_if = "no_violations")]
    violations: &'a [FieldViolation],
}

fn no_violations(violations: &&[FieldViolation]) -> bool {
    violations.is_empty()
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

pub fn cors_layer(origins: &[String]) -> Result<CorsLayer, ServerError> {
    let origins = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin.trim())
                .map_err(|_| ServerError::InvalidOrigin(origin.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    // Credentials rule out wildcards, so methods and headers are mirrored.
    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request()))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/calculate_dcf", post(calculate_dcf_handler))
        .route("/fetch_financials", post(fetch_financials_handler))
        .route("/health", get(health_handler))
        .fallback(not_found_handler)
        .with_state(state)
}

pub async fn run_http_server(config: ServerConfig, state: AppState) -> Result<(), ServerError> {
    let addr = SocketAddr::new(config.host, config.port);
    let app = build_router(state).layer(cors_layer(&config.allowed_origins)?);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, origins = ?config.allowed_origins, "DCF HTTP API listening");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_handler() -> Response {
    json_response(StatusCode::OK, HealthResponse { status: "ok" })
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "not_found", "Not found", &[])
}

async fn calculate_dcf_handler(body: Bytes) -> Response {
    let input = match input_from_json(&body) {
        Ok(input) => input,
        Err(err) => {
            warn!(%err, "rejected valuation request");
            return valuation_error_response(&ValuationError::from(err));
        }
    };

    match run_valuation(&input) {
        Ok(result) => {
            info!(
                projection_years = input.projection_years,
                implied_share_price = result.implied_share_price,
                wacc = result.wacc,
                "valuation served"
            );
            json_response(StatusCode::OK, result)
        }
        Err(err) => {
            if matches!(err, ValuationError::Unexpected(_)) {
                error!(%err, "valuation failed");
            } else {
                warn!(%err, "rejected valuation request");
            }
            valuation_error_response(&err)
        }
    }
}

async fn fetch_financials_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let ticker = match payload::ticker_from_json(&body) {
        Ok(ticker) => ticker,
        Err(err) => {
            warn!(%err, "rejected fetch request");
            return valuation_error_response(&ValuationError::from(err));
        }
    };

    let provider = Arc::clone(&state.provider);
    let defaults = state.fetch_defaults.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        fetch_input(provider.as_ref(), &ticker, &defaults)
    })
    .await;

    match outcome {
        Ok(Ok(input)) => json_response(StatusCode::OK, input),
        Ok(Err(MarketDataError::EmptyTicker)) => {
            let violation = [FieldViolation::new("ticker", "is required")];
            error_response(StatusCode::BAD_REQUEST, "validation", "invalid input", &violation)
        }
        Ok(Err(err)) => {
            warn!(%err, "market data fetch failed");
            error_response(StatusCode::BAD_GATEWAY, "upstream", &err.to_string(), &[])
        }
        Err(err) => {
            error!(%err, "market data task aborted");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "unexpected",
                "Internal error while fetching market data",
                &[],
            )
        }
    }
}

fn valuation_error_response(err: &ValuationError) -> Response {
    match err {
        ValuationError::Validation(validation) => error_response(
            StatusCode::BAD_REQUEST,
            err.kind(),
            "invalid input",
            &validation.violations,
        ),
        ValuationError::MathematicalDomain(_) => error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            err.kind(),
            &err.to_string(),
            &[],
        ),
        ValuationError::Unexpected(_) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            err.kind(),
            "Internal error during valuation",
            &[],
        ),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

fn error_response(
    status: StatusCode,
    kind: &'static str,
    msg: &str,
    violations: &[FieldViolation],
) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
            kind,
            violations,
        },
    )
}
