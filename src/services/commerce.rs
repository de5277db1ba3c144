//! Commerce service — products, orders, inventory, store stats.
//!
//! DESIGN
//! ======
//! Products and orders share one store behind a single lock so an order can
//! check stock, decrement inventory and record itself atomically. Money is
//! integer cents throughout.
//!
//! Order status moves forward through pending → processing → shipped →
//! delivered. Cancelled and refunded are terminal; a delivered order can
//! only be refunded. Cancelling returns the items to stock.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::ErrorCode;
use crate::state::AppState;
use crate::util::{is_valid_email, now_ms};

const FIRST_ORDER_NUMBER: u64 = 1001;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CommerceError {
    #[error("product not found: {0}")]
    ProductNotFound(Uuid),
    #[error("order not found: {0}")]
    OrderNotFound(Uuid),
    #[error("sku already in use: {0}")]
    DuplicateSku(String),
    #[error("insufficient stock for {product_id}: requested {requested}, available {available}")]
    InsufficientStock { product_id: Uuid, requested: i64, available: i64 },
    #[error("product {0} is not available for sale")]
    ProductUnavailable(Uuid),
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("csv export failed: {0}")]
    Export(String),
}

impl ErrorCode for CommerceError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::ProductNotFound(_) => "E_PRODUCT_NOT_FOUND",
            Self::OrderNotFound(_) => "E_ORDER_NOT_FOUND",
            Self::DuplicateSku(_) => "E_DUPLICATE_SKU",
            Self::InsufficientStock { .. } => "E_INSUFFICIENT_STOCK",
            Self::ProductUnavailable(_) => "E_PRODUCT_UNAVAILABLE",
            Self::InvalidTransition { .. } => "E_INVALID_TRANSITION",
            Self::Validation(_) => "E_VALIDATION",
            Self::Export(_) => "E_EXPORT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Active,
    Draft,
    Archived,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub sku: String,
    pub price_cents: i64,
    pub inventory: i64,
    pub category: String,
    pub status: ProductStatus,
    pub images: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub sku: String,
    pub price_cents: i64,
    #[serde(default)]
    pub inventory: i64,
    #[serde(default)]
    pub category: String,
    #[serde(default = "default_product_status")]
    pub status: ProductStatus,
    #[serde(default)]
    pub images: Vec<String>,
}

fn default_product_status() -> ProductStatus {
    ProductStatus::Draft
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub sku: Option<String>,
    pub price_cents: Option<i64>,
    pub inventory: Option<i64>,
    pub category: Option<String>,
    pub status: Option<ProductStatus>,
    pub images: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub status: Option<ProductStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Refunded)
    }

    /// Whether an order in `self` may be moved to `to`.
    #[must_use]
    pub fn can_transition_to(self, to: Self) -> bool {
        if self == to {
            return false;
        }
        match self {
            Self::Cancelled | Self::Refunded => false,
            Self::Delivered => to == Self::Refunded,
            Self::Pending | Self::Processing | Self::Shipped => true,
        }
    }

    /// Revenue counts every order that was not cancelled or refunded.
    #[must_use]
    pub fn counts_as_revenue(self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
    Failed,
}

impl PaymentStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Refunded => "refunded",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub number: String,
    pub customer: Customer,
    pub items: Vec<OrderItem>,
    pub total_cents: i64,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub shipping_address: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderLine {
    pub product_id: Uuid,
    pub quantity: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewOrder {
    pub customer: Customer,
    pub items: Vec<OrderLine>,
    #[serde(default)]
    pub shipping_address: Option<String>,
    #[serde(default)]
    pub paid: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderQuery {
    pub status: Option<OrderStatus>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub revenue_cents: i64,
    pub order_count: usize,
    pub orders_by_status: BTreeMap<OrderStatus, usize>,
    pub product_count: usize,
    pub active_product_count: usize,
    pub low_stock: Vec<LowStockProduct>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LowStockProduct {
    pub id: Uuid,
    pub name: String,
    pub inventory: i64,
}

/// Products and orders for the workspace store.
pub struct CommerceStore {
    pub products: HashMap<Uuid, Product>,
    pub orders: HashMap<Uuid, Order>,
    next_order_number: u64,
}

impl CommerceStore {
    #[must_use]
    pub fn new() -> Self {
        Self { products: HashMap::new(), orders: HashMap::new(), next_order_number: FIRST_ORDER_NUMBER }
    }

    fn take_order_number(&mut self) -> String {
        let n = self.next_order_number;
        self.next_order_number += 1;
        format!("ORD-{n}")
    }

    fn sku_in_use(&self, sku: &str, except: Option<Uuid>) -> bool {
        self.products
            .values()
            .any(|p| Some(p.id) != except && p.sku.eq_ignore_ascii_case(sku))
    }
}

impl Default for CommerceStore {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// PRODUCTS
// =============================================================================

fn required(field: &str, value: &str) -> Result<String, CommerceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CommerceError::Validation(format!("{field} is required")));
    }
    Ok(trimmed.to_owned())
}

fn non_negative(field: &str, value: i64) -> Result<i64, CommerceError> {
    if value < 0 {
        return Err(CommerceError::Validation(format!("{field} must be >= 0")));
    }
    Ok(value)
}

/// # Errors
///
/// `Validation` for blank name/sku or negative price/inventory,
/// `DuplicateSku` when another product uses the sku.
pub async fn create_product(state: &AppState, input: NewProduct) -> Result<Product, CommerceError> {
    let name = required("name", &input.name)?;
    let sku = required("sku", &input.sku)?;
    let price_cents = non_negative("price_cents", input.price_cents)?;
    let inventory = non_negative("inventory", input.inventory)?;

    let mut store = state.commerce.write().await;
    if store.sku_in_use(&sku, None) {
        return Err(CommerceError::DuplicateSku(sku));
    }

    let now = now_ms();
    let product = Product {
        id: Uuid::new_v4(),
        name,
        description: input.description,
        sku,
        price_cents,
        inventory,
        category: input.category.trim().to_owned(),
        status: input.status,
        images: input.images,
        created_at: now,
        updated_at: now,
    };
    store.products.insert(product.id, product.clone());
    info!(product_id = %product.id, sku = %product.sku, "product created");
    Ok(product)
}

/// Products matching every supplied filter, sorted by name.
pub async fn list_products(state: &AppState, query: &ProductQuery) -> Vec<Product> {
    let needle = query.search.as_deref().map(str::to_lowercase);
    let store = state.commerce.read().await;
    let mut products: Vec<Product> = store
        .products
        .values()
        .filter(|p| query.status.is_none_or(|s| p.status == s))
        .filter(|p| {
            query
                .category
                .as_deref()
                .is_none_or(|c| p.category.eq_ignore_ascii_case(c))
        })
        .filter(|p| {
            needle.as_deref().is_none_or(|n| {
                p.name.to_lowercase().contains(n) || p.sku.to_lowercase().contains(n) || p.description.to_lowercase().contains(n)
            })
        })
        .cloned()
        .collect();
    products.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    products
}

/// # Errors
///
/// `ProductNotFound` if no product has this id.
pub async fn get_product(state: &AppState, product_id: Uuid) -> Result<Product, CommerceError> {
    let store = state.commerce.read().await;
    store
        .products
        .get(&product_id)
        .cloned()
        .ok_or(CommerceError::ProductNotFound(product_id))
}

/// # Errors
///
/// `ProductNotFound`, `Validation`, or `DuplicateSku`.
pub async fn update_product(state: &AppState, product_id: Uuid, patch: ProductPatch) -> Result<Product, CommerceError> {
    let name = patch.name.as_deref().map(|v| required("name", v)).transpose()?;
    let sku = patch.sku.as_deref().map(|v| required("sku", v)).transpose()?;
    let price_cents = patch.price_cents.map(|v| non_negative("price_cents", v)).transpose()?;
    let inventory = patch.inventory.map(|v| non_negative("inventory", v)).transpose()?;

    let mut store = state.commerce.write().await;
    if let Some(sku) = &sku {
        if store.sku_in_use(sku, Some(product_id)) {
            return Err(CommerceError::DuplicateSku(sku.clone()));
        }
    }

    let product = store
        .products
        .get_mut(&product_id)
        .ok_or(CommerceError::ProductNotFound(product_id))?;
    if let Some(name) = name {
        product.name = name;
    }
    if let Some(description) = patch.description {
        product.description = description;
    }
    if let Some(sku) = sku {
        product.sku = sku;
    }
    if let Some(price_cents) = price_cents {
        product.price_cents = price_cents;
    }
    if let Some(inventory) = inventory {
        product.inventory = inventory;
    }
    if let Some(category) = patch.category {
        product.category = category.trim().to_owned();
    }
    if let Some(status) = patch.status {
        product.status = status;
    }
    if let Some(images) = patch.images {
        product.images = images;
    }
    product.updated_at = now_ms();
    info!(%product_id, sku = %product.sku, "product updated");
    Ok(product.clone())
}

/// Remove a product. Existing orders keep their line-item snapshot.
///
/// # Errors
///
/// `ProductNotFound` if no product has this id.
pub async fn delete_product(state: &AppState, product_id: Uuid) -> Result<Product, CommerceError> {
    let mut store = state.commerce.write().await;
    let product = store
        .products
        .remove(&product_id)
        .ok_or(CommerceError::ProductNotFound(product_id))?;
    info!(%product_id, "product deleted");
    Ok(product)
}

/// Add `delta` (possibly negative) to a product's inventory.
///
/// # Errors
///
/// `ProductNotFound`, or `InsufficientStock` if the result would go negative.
pub async fn adjust_inventory(state: &AppState, product_id: Uuid, delta: i64) -> Result<Product, CommerceError> {
    let mut store = state.commerce.write().await;
    let product = store
        .products
        .get_mut(&product_id)
        .ok_or(CommerceError::ProductNotFound(product_id))?;

    let next = product.inventory.saturating_add(delta);
    if next < 0 {
        return Err(CommerceError::InsufficientStock {
            product_id,
            requested: delta.saturating_neg(),
            available: product.inventory,
        });
    }
    product.inventory = next;
    product.updated_at = now_ms();
    info!(%product_id, delta, inventory = next, "inventory adjusted");
    Ok(product.clone())
}

// =============================================================================
// ORDERS
// =============================================================================

/// Place an order: validate lines, check stock for every line, then
/// decrement inventory and record the order in one critical section.
///
/// # Errors
///
/// `Validation`, `ProductNotFound`, `ProductUnavailable` (not active), or
/// `InsufficientStock`. Nothing is modified on error.
pub async fn create_order(state: &AppState, input: NewOrder) -> Result<Order, CommerceError> {
    let customer = Customer {
        name: required("customer.name", &input.customer.name)?,
        email: input.customer.email.trim().to_ascii_lowercase(),
    };
    if !is_valid_email(&customer.email) {
        return Err(CommerceError::Validation(format!("invalid customer email: {}", customer.email)));
    }
    if input.items.is_empty() {
        return Err(CommerceError::Validation("order needs at least one item".into()));
    }

    // Merge repeated lines for the same product so the stock check sees the total.
    let mut quantities: Vec<(Uuid, i64)> = Vec::new();
    for line in &input.items {
        if line.quantity < 1 {
            return Err(CommerceError::Validation(format!("quantity must be >= 1 for {}", line.product_id)));
        }
        match quantities.iter_mut().find(|(id, _)| *id == line.product_id) {
            Some((_, qty)) => {
                *qty = qty
                    .checked_add(line.quantity)
                    .ok_or_else(|| CommerceError::Validation(format!("quantity too large for {}", line.product_id)))?;
            }
            None => quantities.push((line.product_id, line.quantity)),
        }
    }

    let mut store = state.commerce.write().await;
    let mut items = Vec::with_capacity(quantities.len());
    for &(product_id, quantity) in &quantities {
        let product = store
            .products
            .get(&product_id)
            .ok_or(CommerceError::ProductNotFound(product_id))?;
        if product.status != ProductStatus::Active {
            return Err(CommerceError::ProductUnavailable(product_id));
        }
        if product.inventory < quantity {
            return Err(CommerceError::InsufficientStock {
                product_id,
                requested: quantity,
                available: product.inventory,
            });
        }
        items.push(OrderItem { product_id, name: product.name.clone(), quantity, unit_price_cents: product.price_cents });
    }

    let now = now_ms();
    for item in &items {
        if let Some(product) = store.products.get_mut(&item.product_id) {
            product.inventory -= item.quantity;
            product.updated_at = now;
        }
    }

    let total_cents = items
        .iter()
        .map(|i| i.unit_price_cents.saturating_mul(i.quantity))
        .fold(0_i64, i64::saturating_add);
    let order = Order {
        id: Uuid::new_v4(),
        number: store.take_order_number(),
        customer,
        items,
        total_cents,
        status: OrderStatus::Pending,
        payment_status: if input.paid { PaymentStatus::Paid } else { PaymentStatus::Pending },
        shipping_address: input.shipping_address.filter(|a| !a.trim().is_empty()),
        created_at: now,
        updated_at: now,
    };
    store.orders.insert(order.id, order.clone());
    info!(order_id = %order.id, number = %order.number, total_cents, "order created");
    Ok(order)
}

/// Orders matching the filter, newest first.
pub async fn list_orders(state: &AppState, query: &OrderQuery) -> Vec<Order> {
    let needle = query.search.as_deref().map(str::to_lowercase);
    let store = state.commerce.read().await;
    let mut orders: Vec<Order> = store
        .orders
        .values()
        .filter(|o| query.status.is_none_or(|s| o.status == s))
        .filter(|o| {
            needle.as_deref().is_none_or(|n| {
                o.number.to_lowercase().contains(n)
                    || o.customer.name.to_lowercase().contains(n)
                    || o.customer.email.contains(n)
            })
        })
        .cloned()
        .collect();
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.number.cmp(&a.number)));
    orders
}

/// # Errors
///
/// `OrderNotFound` if no order has this id.
pub async fn get_order(state: &AppState, order_id: Uuid) -> Result<Order, CommerceError> {
    let store = state.commerce.read().await;
    store
        .orders
        .get(&order_id)
        .cloned()
        .ok_or(CommerceError::OrderNotFound(order_id))
}

/// Move an order to `status`. Cancelling restocks the items that still
/// exist; refunding marks the payment refunded.
///
/// # Errors
///
/// `OrderNotFound` or `InvalidTransition`.
pub async fn update_order_status(state: &AppState, order_id: Uuid, status: OrderStatus) -> Result<Order, CommerceError> {
    let mut store = state.commerce.write().await;
    let order = store
        .orders
        .get_mut(&order_id)
        .ok_or(CommerceError::OrderNotFound(order_id))?;

    let from = order.status;
    if !from.can_transition_to(status) {
        return Err(CommerceError::InvalidTransition { from, to: status });
    }

    let now = now_ms();
    order.status = status;
    order.updated_at = now;
    if status == OrderStatus::Refunded {
        order.payment_status = PaymentStatus::Refunded;
    }
    let updated = order.clone();

    if status == OrderStatus::Cancelled {
        for item in &updated.items {
            if let Some(product) = store.products.get_mut(&item.product_id) {
                product.inventory = product.inventory.saturating_add(item.quantity);
                product.updated_at = now;
            }
        }
    }

    info!(%order_id, %from, to = %status, "order status changed");
    Ok(updated)
}

// =============================================================================
// STATS / EXPORT
// =============================================================================

pub async fn store_stats(state: &AppState) -> StoreStats {
    let threshold = state.config.low_stock_threshold;
    let store = state.commerce.read().await;

    let mut orders_by_status = BTreeMap::new();
    let mut revenue_cents = 0_i64;
    for order in store.orders.values() {
        *orders_by_status.entry(order.status).or_insert(0) += 1;
        if order.status.counts_as_revenue() {
            revenue_cents = revenue_cents.saturating_add(order.total_cents);
        }
    }

    let mut low_stock: Vec<LowStockProduct> = store
        .products
        .values()
        .filter(|p| p.status == ProductStatus::Active && p.inventory <= threshold)
        .map(|p| LowStockProduct { id: p.id, name: p.name.clone(), inventory: p.inventory })
        .collect();
    low_stock.sort_by(|a, b| a.inventory.cmp(&b.inventory).then(a.name.cmp(&b.name)));

    StoreStats {
        revenue_cents,
        order_count: store.orders.len(),
        orders_by_status,
        product_count: store.products.len(),
        active_product_count: store
            .products
            .values()
            .filter(|p| p.status == ProductStatus::Active)
            .count(),
        low_stock,
    }
}

/// Format cents as a plain decimal amount, e.g. `1999` → `19.99`.
#[must_use]
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

/// Orders matching `query` as CSV, newest first, header row included.
///
/// # Errors
///
/// `Export` if the CSV writer fails.
pub async fn export_orders_csv(state: &AppState, query: &OrderQuery) -> Result<String, CommerceError> {
    let orders = list_orders(state, query).await;
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["number", "created_at", "customer", "email", "items", "total", "status", "payment"])
        .map_err(|e| CommerceError::Export(e.to_string()))?;

    for order in &orders {
        let item_count: i64 = order.items.iter().map(|i| i.quantity).sum();
        let created_at = order.created_at.to_string();
        let items = item_count.to_string();
        let total = format_cents(order.total_cents);
        writer
            .write_record([
                order.number.as_str(),
                created_at.as_str(),
                order.customer.name.as_str(),
                order.customer.email.as_str(),
                items.as_str(),
                total.as_str(),
                order.status.as_str(),
                order.payment_status.as_str(),
            ])
            .map_err(|e| CommerceError::Export(e.to_string()))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| CommerceError::Export(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| CommerceError::Export(e.to_string()))
}

#[cfg(test)]
#[path = "commerce_test.rs"]
mod tests;
