use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use shared::*;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::clock::Clock;
use crate::reports;
use crate::store::StatisticsStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn StatisticsStore>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Any failed report: always a 500 carrying the error message.
#[derive(Debug)]
pub struct ApiError(QueryError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse { error: self.0.to_string() });
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn respond<T>(report: &'static str, result: Result<T, QueryError>) -> ApiResult<T> {
    result.map(Json).map_err(|e| {
        tracing::error!(report, "Failed to compute report: {}", e);
        ApiError(e)
    })
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/statistic", statistic_routes())
        .route("/health", get(health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

fn statistic_routes() -> Router<AppState> {
    Router::new()
        .route("/total-orders", get(total_orders))
        .route("/orders-by-status", get(orders_by_status))
        .route("/total-customers", get(total_customers))
        .route("/sales-today", get(sales_today))
        .route("/monthly-sales", get(monthly_sales))
        .route("/yearly-sales", get(yearly_sales))
        .route("/yearly-sales-data", get(yearly_sales_data))
        .route("/sales-by-category", get(sales_by_category))
}

pub async fn total_orders(State(state): State<AppState>) -> ApiResult<TotalOrders> {
    respond("total orders", reports::total_orders(state.store.as_ref()).await)
}

pub async fn orders_by_status(State(state): State<AppState>) -> ApiResult<Vec<StatusCount>> {
    respond("orders by status", reports::orders_by_status(state.store.as_ref()).await)
}

pub async fn total_customers(State(state): State<AppState>) -> ApiResult<TotalCustomers> {
    respond("total customers", reports::total_customers(state.store.as_ref()).await)
}

pub async fn sales_today(State(state): State<AppState>) -> ApiResult<SalesToday> {
    let now = state.clock.now();
    respond("sales today", reports::sales_today(state.store.as_ref(), now).await)
}

pub async fn monthly_sales(State(state): State<AppState>) -> ApiResult<MonthlySales> {
    let now = state.clock.now();
    respond("monthly sales", reports::monthly_sales(state.store.as_ref(), now).await)
}

pub async fn yearly_sales(State(state): State<AppState>) -> ApiResult<YearlySales> {
    let now = state.clock.now();
    respond("yearly sales", reports::yearly_sales(state.store.as_ref(), now).await)
}

pub async fn yearly_sales_data(State(state): State<AppState>) -> ApiResult<Vec<MonthTotal>> {
    let now = state.clock.now();
    respond(
        "yearly sales by month",
        reports::yearly_sales_by_month(state.store.as_ref(), now).await,
    )
}

pub async fn sales_by_category(State(state): State<AppState>) -> ApiResult<Vec<CategorySales>> {
    respond("sales by category", reports::sales_by_category(state.store.as_ref()).await)
}

pub async fn health_check() -> &'static str {
    "OK"
}
