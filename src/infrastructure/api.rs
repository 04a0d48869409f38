//! HTTP control surface.
//!
//! Read endpoints serve snapshots of the shared state; write endpoints go
//! through the same [`AppState`] methods the engine uses, so the API can
//! never bypass trading policy.

use crate::application::engine::{now_ms, AppState, TradeOverrides};
use crate::config::StrategyConfig;
use crate::domain::entities::alert::Side;
use crate::domain::errors::TradeError;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/market", get(market))
        .route("/alerts", get(alerts))
        .route("/positions", get(positions))
        .route("/positions/:id/close", post(close_position))
        .route("/account", get(account))
        .route("/history", get(history))
        .route("/config", get(get_config).put(put_config))
        .route("/trade", post(open_trade))
        .route("/emergency-stop", post(emergency_stop))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

struct ApiError(TradeError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            TradeError::PositionNotFound(_) => StatusCode::NOT_FOUND,
            TradeError::NoMarketPrice(_) => StatusCode::CONFLICT,
            _ => StatusCode::BAD_REQUEST,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

impl From<TradeError> for ApiError {
    fn from(e: TradeError) -> Self {
        ApiError(e)
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn market(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.market_overview())
}

async fn alerts(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let alerts = state.alerts.lock().expect("alerts lock poisoned");
    Json(alerts.iter().cloned().collect::<Vec<_>>())
}

async fn positions(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let trading = state.trading.lock().expect("trading lock poisoned");
    Json(trading.positions().to_vec())
}

async fn account(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.account_overview())
}

async fn history(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let trading = state.trading.lock().expect("trading lock poisoned");
    Json(trading.history().cloned().collect::<Vec<_>>())
}

async fn get_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.strategy_snapshot())
}

async fn put_config(
    State(state): State<Arc<AppState>>,
    Json(updated): Json<StrategyConfig>,
) -> impl IntoResponse {
    {
        let mut strategy = state.strategy.write().expect("strategy lock poisoned");
        *strategy = updated;
    }
    Json(state.strategy_snapshot())
}

#[derive(Debug, Deserialize)]
struct TradeRequest {
    symbol: String,
    side: Side,
    #[serde(flatten)]
    overrides: TradeOverrides,
}

async fn open_trade(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TradeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let position =
        state.manual_trade(&request.symbol, request.side, &request.overrides, now_ms())?;
    Ok((StatusCode::CREATED, Json(position)))
}

async fn close_position(
    State(state): State<Arc<AppState>>,
    Path(position_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let closed = state.manual_close(&position_id, now_ms())?;
    Ok(Json(closed))
}

async fn emergency_stop(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let closed = state.emergency_stop(now_ms());
    Json(json!({
        "closed": closed,
        "auto_trading": false,
    }))
}
