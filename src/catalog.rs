//! Catalog and low-stock replenishment.
//!
//! Products and categories are backend-owned; this module validates intents
//! before the wire and owns the replenishment state machine. A supplier
//! order moves `PENDING_REVIEW -> REVIEWED -> CONFIRMED`: the admin reviews
//! an incoming request, the supplier settles prices and confirms payment.
//! The single state field replaces the scattered per-feature booleans the
//! storefront grew up with.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use tracing::info;

use crate::error::StoreError;
use crate::roles::{has_permission, Permission, Role};
use crate::AppContext;

// ---------------------------------------------------------------------------
// Catalog types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    pub stock: u32,
    /// Replenishment threshold: at or below it the product is low-stock.
    #[serde(default)]
    pub min_stock: u32,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub image: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
}

// ---------------------------------------------------------------------------
// Replenishment types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SupplierOrderState {
    /// Created from the low-stock report, waiting for admin review.
    PendingReview,
    /// Admin accepted; the supplier may settle prices.
    Reviewed,
    /// Supplier confirmed payment. Terminal.
    Confirmed,
}

impl fmt::Display for SupplierOrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SupplierOrderState::PendingReview => "PENDING_REVIEW",
            SupplierOrderState::Reviewed => "REVIEWED",
            SupplierOrderState::Confirmed => "CONFIRMED",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplenishmentLine {
    pub product_ref: String,
    pub name: String,
    pub quantity: u32,
    /// Settled by the supplier during review; absent until then.
    #[serde(default)]
    pub agreed_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplierOrder {
    #[serde(default)]
    pub id: String,
    pub supplier: String,
    pub items: Vec<ReplenishmentLine>,
    pub state: SupplierOrderState,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplierPriceUpdate {
    pub product_ref: String,
    pub agreed_price: f64,
}

// ---------------------------------------------------------------------------
// Pure rules
// ---------------------------------------------------------------------------

/// Products at or below their replenishment threshold.
pub fn low_stock(products: &[Product]) -> Vec<&Product> {
    products.iter().filter(|p| p.stock <= p.min_stock).collect()
}

pub fn validate_product(product: &Product) -> Result<(), StoreError> {
    if product.name.trim().is_empty() {
        return Err(StoreError::InvalidPayload(
            "product name must not be empty".into(),
        ));
    }
    if product.price < 0.0 {
        return Err(StoreError::InvalidPayload(format!(
            "product {} has a negative price",
            product.name
        )));
    }
    Ok(())
}

/// Assemble a replenishment request from chosen low-stock lines.
pub fn build_replenishment_order(
    supplier: &str,
    items: Vec<ReplenishmentLine>,
) -> Result<SupplierOrder, StoreError> {
    if items.is_empty() {
        return Err(StoreError::invalid_state(
            "replenishment",
            "a supplier order needs at least one line",
        ));
    }
    for line in &items {
        if line.quantity == 0 {
            return Err(StoreError::InvalidQuantity {
                product: line.product_ref.clone(),
                quantity: 0,
            });
        }
        if line.agreed_price.is_some_and(|p| p < 0.0) {
            return Err(StoreError::invalid_state(
                format!("product {}", line.product_ref),
                "agreed price must be non-negative",
            ));
        }
    }
    Ok(SupplierOrder {
        id: String::new(),
        supplier: supplier.to_string(),
        items,
        state: SupplierOrderState::PendingReview,
        created_at: Utc::now(),
    })
}

/// Legality of a supplier-order state change for the acting role.
pub fn check_supplier_transition(
    order: &SupplierOrder,
    to: SupplierOrderState,
    role: Role,
) -> Result<(), StoreError> {
    use SupplierOrderState::*;
    let (required_perm, permitted) = match (order.state, to) {
        (PendingReview, Reviewed) => (Permission::ReviewSupplierOrder, true),
        (Reviewed, Confirmed) => (Permission::ConfirmSupplierPayment, true),
        _ => (Permission::ReviewSupplierOrder, false),
    };
    if !permitted {
        return Err(StoreError::invalid_state(
            format!("supplier order {}", order.id),
            format!("cannot move from {} to {to}", order.state),
        ));
    }
    if !has_permission(role, required_perm) {
        return Err(StoreError::forbidden(
            role,
            format!("moving supplier order {} to {to}", order.id),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Async wrappers
// ---------------------------------------------------------------------------

/// The admin's low-stock report: current catalog filtered by threshold.
pub async fn low_stock_report(ctx: &AppContext) -> Result<Vec<Product>, StoreError> {
    let session = ctx.auth.require_session()?;
    let products = ctx.api.fetch_products(Some(&session.token)).await?;
    Ok(low_stock(&products).into_iter().cloned().collect())
}

pub async fn create_replenishment_order(
    ctx: &AppContext,
    supplier: &str,
    items: Vec<ReplenishmentLine>,
) -> Result<SupplierOrder, StoreError> {
    let session = ctx.auth.require_session()?;
    if !has_permission(session.profile.role, Permission::CreateSupplierOrder) {
        return Err(StoreError::forbidden(
            session.profile.role,
            "creating a supplier order",
        ));
    }
    let draft = build_replenishment_order(supplier, items)?;
    let created = ctx.api.create_supplier_order(&session.token, &draft).await?;
    info!(
        supplier_order_id = %created.id,
        supplier = %created.supplier,
        lines = created.items.len(),
        "replenishment order created"
    );
    Ok(created)
}

pub async fn pending_review_orders(ctx: &AppContext) -> Result<Vec<SupplierOrder>, StoreError> {
    let session = ctx.auth.require_session()?;
    ctx.api
        .fetch_pending_review_supplier_orders(&session.token)
        .await
}

pub async fn review_order(
    ctx: &AppContext,
    order: &SupplierOrder,
) -> Result<SupplierOrder, StoreError> {
    let session = ctx.auth.require_session()?;
    check_supplier_transition(order, SupplierOrderState::Reviewed, session.profile.role)?;
    ctx.api.review_supplier_order(&session.token, &order.id).await
}

pub async fn my_supplier_orders(ctx: &AppContext) -> Result<Vec<SupplierOrder>, StoreError> {
    let session = ctx.auth.require_session()?;
    ctx.api.fetch_my_supplier_orders(&session.token).await
}

/// Supplier settles per-line prices before confirming payment.
pub async fn update_agreed_prices(
    ctx: &AppContext,
    order: &SupplierOrder,
    updates: Vec<SupplierPriceUpdate>,
) -> Result<SupplierOrder, StoreError> {
    let session = ctx.auth.require_session()?;
    if session.profile.role != Role::Supplier {
        return Err(StoreError::forbidden(
            session.profile.role,
            "updating supplier prices",
        ));
    }
    if order.state == SupplierOrderState::Confirmed {
        return Err(StoreError::invalid_state(
            format!("supplier order {}", order.id),
            "prices are frozen once payment is confirmed",
        ));
    }
    for update in &updates {
        if update.agreed_price < 0.0 {
            return Err(StoreError::invalid_state(
                format!("product {}", update.product_ref),
                "agreed price must be non-negative",
            ));
        }
    }
    ctx.api
        .update_supplier_prices(&session.token, &order.id, &updates)
        .await
}

pub async fn confirm_payment(
    ctx: &AppContext,
    order: &SupplierOrder,
) -> Result<SupplierOrder, StoreError> {
    let session = ctx.auth.require_session()?;
    check_supplier_transition(order, SupplierOrderState::Confirmed, session.profile.role)?;
    let confirmed = ctx
        .api
        .confirm_supplier_payment(&session.token, &order.id)
        .await?;
    info!(supplier_order_id = %order.id, "supplier payment confirmed");
    Ok(confirmed)
}

// -- product intents --------------------------------------------------------

pub async fn create_product(ctx: &AppContext, product: &Product) -> Result<Product, StoreError> {
    let session = ctx.auth.require_session()?;
    if !has_permission(session.profile.role, Permission::ManageCatalog) {
        return Err(StoreError::forbidden(
            session.profile.role,
            "creating a product",
        ));
    }
    validate_product(product)?;
    ctx.api.create_product(&session.token, product).await
}

pub async fn set_product_visibility(
    ctx: &AppContext,
    product_id: &str,
    visible: bool,
) -> Result<Product, StoreError> {
    let session = manage_catalog_session(ctx)?;
    ctx.api
        .update_product(&session.token, product_id, &json!({ "visible": visible }))
        .await
}

pub async fn set_product_favorite(
    ctx: &AppContext,
    product_id: &str,
    favorite: bool,
) -> Result<Product, StoreError> {
    let session = manage_catalog_session(ctx)?;
    ctx.api
        .update_product(&session.token, product_id, &json!({ "favorite": favorite }))
        .await
}

pub async fn set_product_stock(
    ctx: &AppContext,
    product_id: &str,
    stock: u32,
) -> Result<Product, StoreError> {
    let session = manage_catalog_session(ctx)?;
    ctx.api
        .update_product(&session.token, product_id, &json!({ "stock": stock }))
        .await
}

fn manage_catalog_session(ctx: &AppContext) -> Result<crate::auth::Session, StoreError> {
    let session = ctx.auth.require_session()?;
    if !has_permission(session.profile.role, Permission::ManageCatalog) {
        return Err(StoreError::forbidden(
            session.profile.role,
            "managing the catalog",
        ));
    }
    Ok(session)
}
