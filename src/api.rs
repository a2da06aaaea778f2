//! Storefront backend API client.
//!
//! Thin authenticated HTTP layer: every service module validates locally
//! first, then calls one of the typed helpers here. Transport faults and
//! HTTP statuses are mapped onto the crate error taxonomy in exactly one
//! place so call sites can branch on variants instead of status codes.

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::cart::WireCartLine;
use crate::catalog::{Category, Product, SupplierOrder, SupplierPriceUpdate};
use crate::error::StoreError;
use crate::orders::{Order, OrderState};
use crate::till::TillCloseout;

/// Default timeout for API requests (30 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Normalise the backend base URL:
/// - strip trailing slashes
/// - strip a trailing `/api` segment
/// - ensure a scheme is present (https, or http for localhost)
pub fn normalize_base_url(url: &str) -> String {
    let mut url = url.trim().to_string();

    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }
    if url.ends_with("/api") {
        url.truncate(url.len() - 4);
    }
    while url.ends_with('/') {
        url.pop();
    }

    url
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn friendly_error(url: &str, err: &reqwest::Error) -> StoreError {
    if err.is_connect() {
        return StoreError::NetworkFailure(format!("cannot reach storefront backend at {url}"));
    }
    if err.is_timeout() {
        return StoreError::NetworkFailure(format!("request to {url} timed out"));
    }
    if err.is_builder() {
        return StoreError::InvalidPayload(format!("invalid backend URL: {url}"));
    }
    StoreError::NetworkFailure(format!("network error communicating with {url}: {err}"))
}

/// Pull the human-readable detail out of an error body, if there is one.
fn error_detail(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;
    json.get("error")
        .or_else(|| json.get("message"))
        .and_then(Value::as_str)
        .map(|s| s.to_string())
}

fn status_to_error(status: StatusCode, path: &str, body: &str) -> StoreError {
    let detail = error_detail(body).unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    match status.as_u16() {
        401 | 403 => StoreError::Forbidden {
            role: None,
            action: format!("{path}: {detail}"),
        },
        404 => StoreError::invalid_state(path.to_string(), format!("not found: {detail}")),
        409 => StoreError::Conflict(detail),
        400 | 422 => StoreError::InvalidPayload(detail),
        s if s >= 500 => {
            StoreError::NetworkFailure(format!("backend server error on {path}: {detail}"))
        }
        s => StoreError::NetworkFailure(format!("unexpected response on {path} (HTTP {s})")),
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ApiClient {
    base: String,
    http: Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, StoreError> {
        let base = normalize_base_url(base_url);
        if base.is_empty() {
            return Err(StoreError::InvalidPayload(
                "backend base URL is not configured".into(),
            ));
        }
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| StoreError::NetworkFailure(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { base, http })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    /// Perform a request against `{base}/api{path}`, attaching the bearer
    /// token when present. Returns the JSON body, or `Null` for empty 204s.
    async fn request(
        &self,
        token: Option<&str>,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, StoreError> {
        let url = format!("{}/api{path}", self.base);
        debug!(method = %method, path = %path, "backend request");

        let mut req = self
            .http
            .request(method, &url)
            .header("Content-Type", "application/json");
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| friendly_error(&self.base, &e))?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(status_to_error(status, path, &text));
        }
        if text.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| StoreError::InvalidPayload(format!("invalid JSON from backend: {e}")))
    }

    async fn get<T: DeserializeOwned>(
        &self,
        token: Option<&str>,
        path: &str,
    ) -> Result<T, StoreError> {
        let value = self.request(token, Method::GET, path, None).await?;
        parse(path, value)
    }

    // -- auth ---------------------------------------------------------------

    pub async fn login(&self, email: &str, password: &str) -> Result<Value, StoreError> {
        let body = serde_json::json!({ "email": email, "password": password });
        self.request(None, Method::POST, "/auth/login", Some(&body))
            .await
    }

    /// Best-effort server-side session invalidation.
    pub async fn logout(&self, token: &str) -> Result<(), StoreError> {
        self.request(Some(token), Method::POST, "/auth/logout", None)
            .await?;
        Ok(())
    }

    // -- orders -------------------------------------------------------------

    pub async fn fetch_orders(&self, token: &str, scope: &str) -> Result<Vec<Order>, StoreError> {
        self.get(Some(token), &format!("/orders?scope={scope}"))
            .await
    }

    pub async fn create_order(
        &self,
        token: &str,
        draft: &Order,
        client_request_id: &str,
    ) -> Result<Order, StoreError> {
        let mut body = serde_json::to_value(draft)?;
        if let Some(obj) = body.as_object_mut() {
            // The backend assigns the id; the request id makes the POST
            // safe to retry after a dropped response.
            obj.remove("id");
            obj.insert(
                "clientRequestId".into(),
                Value::String(client_request_id.to_string()),
            );
        }
        let value = self
            .request(Some(token), Method::POST, "/orders", Some(&body))
            .await?;
        parse("/orders", value)
    }

    pub async fn update_order_state(
        &self,
        token: &str,
        order_id: &str,
        state: OrderState,
        handled_by: Option<&str>,
    ) -> Result<Order, StoreError> {
        let mut body = serde_json::json!({ "state": state });
        if let Some(handler) = handled_by {
            body["handledBy"] = Value::String(handler.to_string());
        }
        let path = format!("/orders/{order_id}/state");
        let value = self
            .request(Some(token), Method::PUT, &path, Some(&body))
            .await?;
        parse(&path, value)
    }

    pub async fn submit_till_closeout(
        &self,
        token: &str,
        closeout: &TillCloseout,
    ) -> Result<(), StoreError> {
        let body = serde_json::to_value(closeout)?;
        self.request(
            Some(token),
            Method::PUT,
            "/orders/till-closeout",
            Some(&body),
        )
        .await?;
        Ok(())
    }

    // -- cart ---------------------------------------------------------------

    pub async fn fetch_cart(&self, token: &str) -> Result<Vec<WireCartLine>, StoreError> {
        let value = self.request(Some(token), Method::GET, "/cart", None).await?;
        // The backend answers `{ "items": [...] }`; an absent cart is empty.
        match value {
            Value::Null => Ok(Vec::new()),
            other => parse("/cart", other.get("items").cloned().unwrap_or(other)),
        }
    }

    pub async fn replace_cart(
        &self,
        token: &str,
        lines: &[WireCartLine],
    ) -> Result<(), StoreError> {
        let body = serde_json::json!({ "items": lines });
        self.request(Some(token), Method::POST, "/cart", Some(&body))
            .await?;
        Ok(())
    }

    pub async fn delete_cart(&self, token: &str) -> Result<(), StoreError> {
        self.request(Some(token), Method::DELETE, "/cart", None)
            .await?;
        Ok(())
    }

    // -- catalog ------------------------------------------------------------

    pub async fn fetch_products(&self, token: Option<&str>) -> Result<Vec<Product>, StoreError> {
        self.get(token, "/products").await
    }

    pub async fn fetch_product(
        &self,
        token: Option<&str>,
        product_id: &str,
    ) -> Result<Product, StoreError> {
        self.get(token, &format!("/products/{product_id}")).await
    }

    pub async fn create_product(
        &self,
        token: &str,
        product: &Product,
    ) -> Result<Product, StoreError> {
        let body = serde_json::to_value(product)?;
        let value = self
            .request(Some(token), Method::POST, "/products", Some(&body))
            .await?;
        parse("/products", value)
    }

    /// Partial product update: stock, price, visibility, favorite.
    pub async fn update_product(
        &self,
        token: &str,
        product_id: &str,
        patch: &Value,
    ) -> Result<Product, StoreError> {
        let path = format!("/products/{product_id}");
        let value = self
            .request(Some(token), Method::PUT, &path, Some(patch))
            .await?;
        parse(&path, value)
    }

    pub async fn fetch_categories(&self, token: Option<&str>) -> Result<Vec<Category>, StoreError> {
        self.get(token, "/categories").await
    }

    pub async fn create_category(&self, token: &str, name: &str) -> Result<Category, StoreError> {
        let body = serde_json::json!({ "name": name });
        let value = self
            .request(Some(token), Method::POST, "/categories", Some(&body))
            .await?;
        parse("/categories", value)
    }

    pub async fn rename_category(
        &self,
        token: &str,
        category_id: &str,
        name: &str,
    ) -> Result<Category, StoreError> {
        let path = format!("/categories/{category_id}");
        let body = serde_json::json!({ "name": name });
        let value = self
            .request(Some(token), Method::PUT, &path, Some(&body))
            .await?;
        parse(&path, value)
    }

    pub async fn delete_category(&self, token: &str, category_id: &str) -> Result<(), StoreError> {
        let path = format!("/categories/{category_id}");
        self.request(Some(token), Method::DELETE, &path, None)
            .await?;
        Ok(())
    }

    // -- replenishment ------------------------------------------------------

    pub async fn fetch_pending_review_supplier_orders(
        &self,
        token: &str,
    ) -> Result<Vec<SupplierOrder>, StoreError> {
        self.get(Some(token), "/supplier-orders/pending-review")
            .await
    }

    pub async fn fetch_my_supplier_orders(
        &self,
        token: &str,
    ) -> Result<Vec<SupplierOrder>, StoreError> {
        self.get(Some(token), "/supplier-orders/mine").await
    }

    pub async fn create_supplier_order(
        &self,
        token: &str,
        order: &SupplierOrder,
    ) -> Result<SupplierOrder, StoreError> {
        let mut body = serde_json::to_value(order)?;
        if let Some(obj) = body.as_object_mut() {
            obj.remove("id");
        }
        let value = self
            .request(Some(token), Method::POST, "/supplier-orders", Some(&body))
            .await?;
        parse("/supplier-orders", value)
    }

    pub async fn review_supplier_order(
        &self,
        token: &str,
        order_id: &str,
    ) -> Result<SupplierOrder, StoreError> {
        let path = format!("/supplier-orders/{order_id}/review");
        let value = self.request(Some(token), Method::PUT, &path, None).await?;
        parse(&path, value)
    }

    pub async fn confirm_supplier_payment(
        &self,
        token: &str,
        order_id: &str,
    ) -> Result<SupplierOrder, StoreError> {
        let path = format!("/supplier-orders/{order_id}/confirm-payment");
        let value = self.request(Some(token), Method::PUT, &path, None).await?;
        parse(&path, value)
    }

    pub async fn update_supplier_prices(
        &self,
        token: &str,
        order_id: &str,
        updates: &[SupplierPriceUpdate],
    ) -> Result<SupplierOrder, StoreError> {
        let path = format!("/supplier-orders/{order_id}/prices");
        let body = serde_json::json!({ "updates": updates });
        let value = self
            .request(Some(token), Method::PUT, &path, Some(&body))
            .await?;
        parse(&path, value)
    }
}

fn parse<T: DeserializeOwned>(path: &str, value: Value) -> Result<T, StoreError> {
    serde_json::from_value(value)
        .map_err(|e| StoreError::InvalidPayload(format!("unexpected shape from {path}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_base_urls() {
        assert_eq!(
            normalize_base_url("shop.example.com"),
            "https://shop.example.com"
        );
        assert_eq!(
            normalize_base_url("https://shop.example.com/api/"),
            "https://shop.example.com"
        );
        assert_eq!(
            normalize_base_url("localhost:4000/"),
            "http://localhost:4000"
        );
        assert_eq!(
            normalize_base_url("  https://shop.example.com///  "),
            "https://shop.example.com"
        );
    }

    #[test]
    fn maps_statuses_onto_the_taxonomy() {
        let conflict = status_to_error(
            StatusCode::CONFLICT,
            "/orders/till-closeout",
            r#"{"error":"closeout already exists"}"#,
        );
        assert!(matches!(conflict, StoreError::Conflict(ref d) if d.contains("already exists")));

        let forbidden = status_to_error(StatusCode::UNAUTHORIZED, "/orders", "");
        assert!(matches!(forbidden, StoreError::Forbidden { role: None, .. }));

        let server = status_to_error(StatusCode::BAD_GATEWAY, "/cart", "");
        assert!(server.is_retryable());

        let invalid = status_to_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "/orders",
            r#"{"message":"quantity must be positive"}"#,
        );
        assert!(matches!(invalid, StoreError::InvalidPayload(ref d) if d.contains("quantity")));
    }

    #[test]
    fn order_draft_body_carries_the_request_id_not_the_id() {
        // Serialization contract check without a live backend.
        let draft = crate::testutil::order(
            "local-id",
            OrderState::PickupReady,
            crate::orders::DeliveryType::Pickup,
        );
        let mut body = serde_json::to_value(&draft).unwrap();
        let obj = body.as_object_mut().unwrap();
        obj.remove("id");
        obj.insert("clientRequestId".into(), Value::String("req-1".into()));
        assert!(obj.get("id").is_none());
        assert_eq!(obj["state"], "PICKUP_READY");
        assert_eq!(obj["deliveryType"], "PICKUP");
        assert_eq!(obj["clientRequestId"], "req-1");
    }
}
