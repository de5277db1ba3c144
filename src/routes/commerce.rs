//! Store routes — products, orders, stats, CSV export.

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::routes::actor::Actor;
use crate::routes::extract::{Json, Path, Query};
use crate::routes::{ApiError, ApiResult, audit, audit_with};
use crate::services::audit::Severity;
use crate::services::commerce::{
    self, CommerceError, NewOrder, NewProduct, Order, OrderQuery, OrderStatus, Product, ProductPatch, ProductQuery, StoreStats,
};
use crate::services::events::spawn_event;
use crate::services::team::Permission;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/products", get(list_products).post(create_product))
        .route("/api/products/{id}", get(get_product).patch(update_product).delete(delete_product))
        .route("/api/products/{id}/inventory", post(adjust_inventory))
        .route("/api/orders", get(list_orders).post(create_order))
        .route("/api/orders/export.csv", get(export_orders))
        .route("/api/orders/{id}", get(get_order))
        .route("/api/orders/{id}/status", patch(update_order_status))
        .route("/api/store/stats", get(store_stats))
}

pub(crate) fn commerce_error_to_status(err: &CommerceError) -> StatusCode {
    match err {
        CommerceError::ProductNotFound(_) | CommerceError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        CommerceError::DuplicateSku(_) | CommerceError::InsufficientStock { .. } | CommerceError::InvalidTransition { .. } => {
            StatusCode::CONFLICT
        }
        CommerceError::ProductUnavailable(_) | CommerceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CommerceError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<CommerceError> for ApiError {
    fn from(err: CommerceError) -> Self {
        Self::from_service(commerce_error_to_status(&err), &err)
    }
}

#[derive(Deserialize)]
pub struct InventoryBody {
    pub delta: i64,
}

#[derive(Deserialize)]
pub struct StatusBody {
    pub status: OrderStatus,
}

fn order_payload(order: &Order) -> serde_json::Value {
    json!({
        "order_id": order.id,
        "number": order.number,
        "status": order.status,
        "total_cents": order.total_cents,
        "customer": order.customer,
        "item_count": order.items.iter().map(|i| i.quantity).sum::<i64>(),
    })
}

fn product_payload(product: &Product) -> serde_json::Value {
    json!({
        "product_id": product.id,
        "name": product.name,
        "sku": product.sku,
        "price_cents": product.price_cents,
        "inventory": product.inventory,
        "status": product.status,
    })
}

// =============================================================================
// PRODUCTS
// =============================================================================

/// `GET /api/products?search=&category=&status=`
async fn list_products(State(state): State<AppState>, Query(query): Query<ProductQuery>) -> Json<Vec<Product>> {
    Json(commerce::list_products(&state, &query).await)
}

/// `POST /api/products`
async fn create_product(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<NewProduct>,
) -> ApiResult<(StatusCode, Json<Product>)> {
    actor.require(Permission::ProductsManage)?;
    let product = commerce::create_product(&state, body).await?;
    audit(&state, &actor, "product.created", "product", product.id, format!("Created product {} ({})", product.name, product.sku)).await;
    spawn_event(&state, "product.created", product_payload(&product));
    Ok((StatusCode::CREATED, Json(product)))
}

/// `GET /api/products/:id`
async fn get_product(State(state): State<AppState>, Path(product_id): Path<Uuid>) -> ApiResult<Json<Product>> {
    Ok(Json(commerce::get_product(&state, product_id).await?))
}

/// `PATCH /api/products/:id`
async fn update_product(
    State(state): State<AppState>,
    actor: Actor,
    Path(product_id): Path<Uuid>,
    Json(body): Json<ProductPatch>,
) -> ApiResult<Json<Product>> {
    actor.require(Permission::ProductsManage)?;
    let product = commerce::update_product(&state, product_id, body).await?;
    audit(&state, &actor, "product.updated", "product", product.id, format!("Updated product {}", product.name)).await;
    spawn_event(&state, "product.updated", product_payload(&product));
    Ok(Json(product))
}

/// `DELETE /api/products/:id`
async fn delete_product(State(state): State<AppState>, actor: Actor, Path(product_id): Path<Uuid>) -> ApiResult<StatusCode> {
    actor.require(Permission::ProductsManage)?;
    let product = commerce::delete_product(&state, product_id).await?;
    audit_with(&state, &actor, "product.deleted", "product", product.id, format!("Deleted product {}", product.name), Severity::Warning)
        .await;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/products/:id/inventory` with `{"delta": n}`.
async fn adjust_inventory(
    State(state): State<AppState>,
    actor: Actor,
    Path(product_id): Path<Uuid>,
    Json(body): Json<InventoryBody>,
) -> ApiResult<Json<Product>> {
    actor.require(Permission::ProductsManage)?;
    let product = commerce::adjust_inventory(&state, product_id, body.delta).await?;
    audit(
        &state,
        &actor,
        "product.inventory_adjusted",
        "product",
        product.id,
        format!("Inventory {:+} to {}", body.delta, product.inventory),
    )
    .await;
    spawn_event(&state, "product.updated", product_payload(&product));
    Ok(Json(product))
}

// =============================================================================
// ORDERS
// =============================================================================

/// `GET /api/orders?status=&search=`
async fn list_orders(State(state): State<AppState>, Query(query): Query<OrderQuery>) -> Json<Vec<Order>> {
    Json(commerce::list_orders(&state, &query).await)
}

/// `POST /api/orders`
async fn create_order(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<NewOrder>,
) -> ApiResult<(StatusCode, Json<Order>)> {
    actor.require(Permission::OrdersManage)?;
    let order = commerce::create_order(&state, body).await?;
    audit(
        &state,
        &actor,
        "order.created",
        "order",
        order.id,
        format!("Created order {} for {}", order.number, commerce::format_cents(order.total_cents)),
    )
    .await;
    spawn_event(&state, "order.created", order_payload(&order));
    Ok((StatusCode::CREATED, Json(order)))
}

/// `GET /api/orders/:id`
async fn get_order(State(state): State<AppState>, Path(order_id): Path<Uuid>) -> ApiResult<Json<Order>> {
    Ok(Json(commerce::get_order(&state, order_id).await?))
}

/// `PATCH /api/orders/:id/status` with `{"status": "shipped"}`.
async fn update_order_status(
    State(state): State<AppState>,
    actor: Actor,
    Path(order_id): Path<Uuid>,
    Json(body): Json<StatusBody>,
) -> ApiResult<Json<Order>> {
    actor.require(Permission::OrdersManage)?;
    let order = commerce::update_order_status(&state, order_id, body.status).await?;
    let severity = if order.status.is_terminal() { Severity::Warning } else { Severity::Info };
    audit_with(&state, &actor, "order.status_changed", "order", order.id, format!("Order {} is now {}", order.number, order.status), severity)
        .await;
    spawn_event(&state, "order.updated", order_payload(&order));
    Ok(Json(order))
}

/// `GET /api/orders/export.csv?status=&search=`
async fn export_orders(State(state): State<AppState>, Query(query): Query<OrderQuery>) -> ApiResult<Response> {
    let csv = commerce::export_orders_csv(&state, &query).await?;
    Ok((
        [(CONTENT_TYPE, "text/csv; charset=utf-8"), (CONTENT_DISPOSITION, "attachment; filename=\"orders.csv\"")],
        csv,
    )
        .into_response())
}

/// `GET /api/store/stats`
async fn store_stats(State(state): State<AppState>) -> Json<StoreStats> {
    Json(commerce::store_stats(&state).await)
}

#[cfg(test)]
#[path = "commerce_test.rs"]
mod tests;
