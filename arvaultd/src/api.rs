//! HTTP API for the Arvault daemon.
//!
//! Provides REST endpoints for:
//! - Health check
//! - House accounts (list, administrative balance set)
//! - Rates (list, set a pair and its reciprocal)
//! - Transaction log
//! - Exchange
//! - Prometheus metrics

use axum::{
    extract::{rejection::JsonRejection, MatchedPath, Path, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use arvault_domain::{
    Account, BalanceRequest, ExchangeRequest, ExchangeResult, Rate, RateRequest, Transaction,
};
use arvault_engine::{EngineError, LedgerService};
use arvault_exec::TransferPort;
use arvault_store::Store;

use crate::metrics::Metrics;

// =============================================================================
// API State
// =============================================================================

/// Shared state for API handlers.
pub struct ApiState<S: Store, T: TransferPort + 'static> {
    pub service: Arc<LedgerService<S, T>>,
    pub metrics: Arc<Metrics>,
}

impl<S: Store, T: TransferPort + 'static> ApiState<S, T> {
    /// Bundle a service and the metrics it reports into.
    pub fn new(service: LedgerService<S, T>, metrics: Metrics) -> Self {
        Self {
            service: Arc::new(service),
            metrics: Arc::new(metrics),
        }
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

// =============================================================================
// Router
// =============================================================================

/// Create the API router.
pub fn create_router<S, T>(state: Arc<ApiState<S, T>>) -> Router
where
    S: Store,
    T: TransferPort + 'static,
{
    let metrics = Arc::clone(&state.metrics);

    Router::new()
        .route("/health", get(health_handler::<S, T>))
        .route("/accounts", get(accounts_handler::<S, T>))
        .route("/accounts/:id/balance", put(set_balance_handler::<S, T>))
        .route("/rates", get(rates_handler::<S, T>).put(set_rate_handler::<S, T>))
        .route("/log", get(log_handler::<S, T>))
        .route("/exchange", post(exchange_handler::<S, T>))
        .route("/metrics", get(metrics_handler::<S, T>))
        .route_layer(middleware::from_fn_with_state(metrics, track_requests))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint. Reports 503 when the store or transfer rail is down.
async fn health_handler<S, T>(
    State(state): State<Arc<ApiState<S, T>>>,
) -> (StatusCode, Json<HealthResponse>)
where
    S: Store,
    T: TransferPort + 'static,
{
    let (status, label) = match state.service.health().await {
        Ok(()) => (StatusCode::OK, "healthy"),
        Err(e) => {
            warn!(error = %e, "Health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
        },
    };

    (
        status,
        Json(HealthResponse {
            status: label.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// List house accounts.
async fn accounts_handler<S, T>(
    State(state): State<Arc<ApiState<S, T>>>,
) -> Result<Json<Vec<Account>>, ApiError>
where
    S: Store,
    T: TransferPort + 'static,
{
    let accounts = state.service.get_accounts().await.map_err(|e| to_error_response(&e))?;
    Ok(Json(accounts))
}

/// Overwrite one account's balance.
async fn set_balance_handler<S, T>(
    State(state): State<Arc<ApiState<S, T>>>,
    Path(id): Path<String>,
    payload: Result<Json<BalanceRequest>, JsonRejection>,
) -> Result<Json<Account>, ApiError>
where
    S: Store,
    T: TransferPort + 'static,
{
    let Json(request) = parse_body(&state, "balance", payload)?;

    let account = state
        .service
        .set_account_balance(&id, &request)
        .await
        .map_err(|e| reject(&state, "balance", &e))?;

    Ok(Json(account))
}

/// List rates.
async fn rates_handler<S, T>(
    State(state): State<Arc<ApiState<S, T>>>,
) -> Result<Json<Vec<Rate>>, ApiError>
where
    S: Store,
    T: TransferPort + 'static,
{
    let rates = state.service.get_rates().await.map_err(|e| to_error_response(&e))?;
    Ok(Json(rates))
}

/// Set a rate and its reciprocal; answers the full rate list.
async fn set_rate_handler<S, T>(
    State(state): State<Arc<ApiState<S, T>>>,
    payload: Result<Json<RateRequest>, JsonRejection>,
) -> Result<Json<Vec<Rate>>, ApiError>
where
    S: Store,
    T: TransferPort + 'static,
{
    let Json(request) = parse_body(&state, "rates", payload)?;

    state
        .service
        .set_rate(&request)
        .await
        .map_err(|e| reject(&state, "rates", &e))?;

    let rates = state.service.get_rates().await.map_err(|e| to_error_response(&e))?;
    Ok(Json(rates))
}

/// Transaction log, newest first.
async fn log_handler<S, T>(
    State(state): State<Arc<ApiState<S, T>>>,
) -> Result<Json<Vec<Transaction>>, ApiError>
where
    S: Store,
    T: TransferPort + 'static,
{
    let log = state.service.get_log().await.map_err(|e| to_error_response(&e))?;
    Ok(Json(log))
}

/// Execute an exchange.
///
/// 200 with the result when `ok`, 422 with the result when a business rule
/// rejected it. The exchange runs on its own task so a client that hangs up
/// cannot cancel a unit of work half way.
async fn exchange_handler<S, T>(
    State(state): State<Arc<ApiState<S, T>>>,
    payload: Result<Json<ExchangeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ExchangeResult>), ApiError>
where
    S: Store,
    T: TransferPort + 'static,
{
    let Json(request) = parse_body(&state, "exchange", payload)?;

    let service = Arc::clone(&state.service);
    let outcome = tokio::spawn(async move { service.exchange(&request).await })
        .await
        .map_err(|e| {
            error!(error = %e, "Exchange task failed");
            internal_error("Exchange task failed")
        })?;

    match outcome {
        Ok(result) => {
            state.metrics.record_exchange(&result);
            let status = if result.ok {
                StatusCode::OK
            } else {
                StatusCode::UNPROCESSABLE_ENTITY
            };
            Ok((status, Json(result)))
        },
        Err(e) => {
            if !e.is_validation() {
                state.metrics.record_exchange_error(e.kind());
            }
            Err(reject(&state, "exchange", &e))
        },
    }
}

/// Prometheus text exposition. Rate and balance gauges are refreshed first.
async fn metrics_handler<S, T>(
    State(state): State<Arc<ApiState<S, T>>>,
) -> Result<impl IntoResponse, ApiError>
where
    S: Store,
    T: TransferPort + 'static,
{
    match state.service.get_rates().await {
        Ok(rates) => state.metrics.observe_rates(&rates),
        Err(e) => warn!(error = %e, "Could not refresh rate gauges"),
    }
    match state.service.get_accounts().await {
        Ok(accounts) => state.metrics.observe_balances(&accounts),
        Err(e) => warn!(error = %e, "Could not refresh balance gauges"),
    }

    let body = state.metrics.render().map_err(|e| {
        error!(error = %e, "Failed to encode metrics");
        internal_error("Failed to encode metrics")
    })?;

    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}

// =============================================================================
// Middleware
// =============================================================================

async fn track_requests(
    State(metrics): State<Arc<Metrics>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| request.uri().path().to_owned());
    let method = request.method().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    metrics.observe_request(
        &path,
        &method,
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}

// =============================================================================
// Helpers
// =============================================================================

fn parse_body<S, T, B>(
    state: &ApiState<S, T>,
    endpoint: &str,
    payload: Result<Json<B>, JsonRejection>,
) -> Result<Json<B>, ApiError>
where
    S: Store,
    T: TransferPort + 'static,
{
    payload.map_err(|rejection| {
        state.metrics.record_validation_error(endpoint);
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: rejection.body_text(),
            }),
        )
    })
}

fn reject<S, T>(state: &ApiState<S, T>, endpoint: &str, error: &EngineError) -> ApiError
where
    S: Store,
    T: TransferPort + 'static,
{
    if error.is_validation() {
        state.metrics.record_validation_error(endpoint);
    }
    to_error_response(error)
}

fn to_error_response(error: &EngineError) -> ApiError {
    let status = match error {
        e if e.is_validation() => StatusCode::BAD_REQUEST,
        e if e.is_not_found() => StatusCode::NOT_FOUND,
        EngineError::Store(e) if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::ExternalTransfer(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

fn internal_error(message: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
}

// =============================================================================
// Tests
// =============================================================================
