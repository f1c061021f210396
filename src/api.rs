use crate::db::{ArchiveStats, Database, OrderRecord};
use crate::error::XBridgeError;
use crate::exchange::Exchange;
use crate::order::{Order, OrderId, OrderState};
use crate::types::{Asset, AssetAmount, CurrencyPair};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub exchange: Arc<Exchange>,
    pub db: Database,
}

/// Create the API router
pub fn create_router(state: AppState, cors_origins: Vec<String>) -> Router {
    let cors = if cors_origins.contains(&"*".to_string()) {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    };

    Router::new()
        // order endpoints
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/cancel", post(cancel_order))
        // reference data
        .route("/assets", get(list_assets))
        .route("/trades", get(list_trades))
        // health & metrics
        .route("/health", get(health_check))
        .route("/metrics", get(get_metrics))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ===== Request/Response Types =====

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    /// Maker public key, hex encoded.
    pub maker_pubkey: String,
    pub from_currency: String,
    pub from_amount: u64,
    pub to_currency: String,
    pub to_amount: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderResponse {
    pub order: Order,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderStatusResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<Order>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived: Option<OrderRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListOrdersQuery {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AssetInfo {
    pub symbol: String,
    pub precision: u8,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AssetsResponse {
    pub assets: Vec<AssetInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TradeInfo {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xid: Option<String>,
    pub from_currency: String,
    pub to_currency: String,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TradesResponse {
    pub trades: Vec<TradeInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub database: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MetricsResponse {
    pub active_orders: u64,
    pub active_by_state: HashMap<String, u64>,
    pub archive: ArchiveStats,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// ===== Handlers =====

/// Announce a new order
async fn create_order(
    State(state): State<AppState>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let maker_pubkey = hex::decode(&req.maker_pubkey)
        .map_err(|e| ApiError::BadRequest(format!("Invalid maker_pubkey hex: {}", e)))?;

    let order = state
        .exchange
        .submit_order(
            maker_pubkey,
            &req.from_currency,
            req.from_amount,
            &req.to_currency,
            req.to_amount,
        )
        .await
        .map_err(ApiError::from)?;

    Ok(Json(OrderResponse { order }))
}

/// List open and in-progress orders
async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let filter = query.state.and_then(|s| s.parse::<OrderState>().ok());

    let mut orders = state.exchange.list_orders().await;
    if let Some(filter) = filter {
        orders.retain(|o| o.state == filter);
    }
    orders.truncate(query.limit);

    Ok(Json(orders))
}

/// Get one order, active or archived
async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OrderStatusResponse>, ApiError> {
    let order_id: OrderId = id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid order id: {}", id)))?;

    if let Some(order) = state.exchange.get_order(order_id).await {
        return Ok(Json(OrderStatusResponse {
            order: Some(order),
            archived: None,
        }));
    }

    let archived = state
        .db
        .get_order(&id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::NotFound(format!("Order {} not found", id)))?;

    Ok(Json(OrderStatusResponse {
        order: None,
        archived: Some(archived),
    }))
}

/// Withdraw an open order
async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid order id: {}", id)))?;

    let order = state
        .exchange
        .cancel_order(order_id)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(OrderResponse { order }))
}

/// List tradeable assets
async fn list_assets(State(state): State<AppState>) -> Result<Json<AssetsResponse>, ApiError> {
    let mut assets: Vec<AssetInfo> = state
        .exchange
        .assets()
        .await
        .into_iter()
        .map(|a| AssetInfo {
            symbol: a.symbol().to_string(),
            precision: a.precision(),
        })
        .collect();
    assets.sort_by(|a, b| a.symbol.cmp(&b.symbol));

    Ok(Json(AssetsResponse { assets }))
}

/// A completed archive row rendered as a trade; rows missing assets, the
/// funding txid or a parseable timestamp come back as the error variant.
fn record_to_pair(
    record: &OrderRecord,
    from: Option<Arc<Asset>>,
    to: Option<Arc<Asset>>,
) -> CurrencyPair {
    let (from, to) = match (from, to) {
        (Some(from), Some(to)) => (from, to),
        _ => return CurrencyPair::error(format!("unknown asset on trade {}", record.id)),
    };
    let xid = match &record.maker_deposit_txid {
        Some(xid) => xid.clone(),
        None => return CurrencyPair::error(format!("trade {} has no funding txid", record.id)),
    };
    let timestamp = match chrono::DateTime::parse_from_rfc3339(&record.updated_at) {
        Ok(t) => t.with_timezone(&Utc),
        Err(e) => {
            return CurrencyPair::error(format!("bad timestamp on trade {}: {}", record.id, e))
        }
    };
    CurrencyPair::valid(
        xid,
        AssetAmount::new(from, record.from_amount as u64),
        AssetAmount::new(to, record.to_amount as u64),
        timestamp,
    )
}

/// Trade history: completed swaps from the archive
async fn list_trades(State(state): State<AppState>) -> Result<Json<TradesResponse>, ApiError> {
    let records = state
        .db
        .list_orders(Some(OrderState::Finished), 100)
        .await
        .map_err(ApiError::from)?;

    let mut trades = Vec::with_capacity(records.len());
    for record in records {
        let from = state.exchange.asset(&record.from_currency).await;
        let to = state.exchange.asset(&record.to_currency).await;
        let pair = record_to_pair(&record, from, to);
        trades.push(TradeInfo {
            id: record.id.clone(),
            xid: pair.xid().map(str::to_string),
            from_currency: record.from_currency.clone(),
            to_currency: record.to_currency.clone(),
            price: pair.price(),
            error: pair.error_message().map(str::to_string),
        });
    }

    Ok(Json(TradesResponse { trades }))
}

/// Health check
async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let db_status = match state.db.pool().acquire().await {
        Ok(_) => "ok".to_string(),
        Err(e) => format!("error: {}", e),
    };

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now().to_rfc3339(),
        database: db_status,
    }))
}

/// Engine metrics: the active book by state plus archive totals
async fn get_metrics(State(state): State<AppState>) -> Result<Json<MetricsResponse>, ApiError> {
    let orders = state.exchange.list_orders().await;
    let mut active_by_state: HashMap<String, u64> = HashMap::new();
    for order in &orders {
        *active_by_state.entry(order.state.to_string()).or_insert(0) += 1;
    }

    let archive = state
        .db
        .stats()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(MetricsResponse {
        active_orders: orders.len() as u64,
        active_by_state,
        archive,
    }))
}

// ===== Error Handling =====

#[derive(Debug)]
pub enum ApiError {
    Internal(String),
    BadRequest(String),
    NotFound(String),
    Engine(XBridgeError),
}

impl From<XBridgeError> for ApiError {
    fn from(err: XBridgeError) -> Self {
        ApiError::Engine(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::Engine(err) => match err {
                XBridgeError::InvalidOrder(msg) => (StatusCode::BAD_REQUEST, "INVALID_ORDER", msg),
                XBridgeError::OrderNotFound(msg) => (StatusCode::NOT_FOUND, "ORDER_NOT_FOUND", msg),
                XBridgeError::ProtocolViolation(msg) => {
                    (StatusCode::CONFLICT, "PROTOCOL_VIOLATION", msg)
                }
                XBridgeError::UnsupportedCurrency(msg) => {
                    (StatusCode::BAD_REQUEST, "UNSUPPORTED_CURRENCY", msg)
                }
                XBridgeError::InsufficientFunds { .. } => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "INSUFFICIENT_FUNDS",
                    err.to_string(),
                ),
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "ENGINE_ERROR",
                    err.to_string(),
                ),
            },
        };

        let body = Json(ErrorResponse {
            error: message,
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}
