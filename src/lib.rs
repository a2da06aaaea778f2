//! La Tiendita storefront terminal core.
//!
//! Client-side service layer for the multi-role storefront (customers,
//! cashiers, couriers, suppliers, admins). The backend owns all business
//! truth (pricing, stock, payment capture, order state); this crate owns
//! the client's share of the contract: local validation before the
//! wire, role-scoped views, the cart synchronization protocol, the till
//! closeout journal, and session persistence. Embedding UI shells call the
//! service functions with an explicit [`AppContext`]; there is no global
//! state.

use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod api;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod db;
pub mod error;
pub mod orders;
pub mod poll;
pub mod roles;
pub mod storage;
pub mod till;
pub mod views;

#[cfg(test)]
pub(crate) mod testutil;

pub use auth::UserProfile;
pub use cart::{Cart, CartState};
pub use error::StoreError;
pub use orders::{
    CheckoutDetails, DeliveryDetails, DeliveryType, LineItem, Order, OrderState, PaymentMethod,
};
pub use roles::{Permission, Role};
pub use till::TillCloseout;
pub use views::{OrderView, ViewFilter};

/// Everything a service call needs, created at startup and passed
/// explicitly. Torn down with the process; the session inside it comes and
/// goes with login/logout.
pub struct AppContext {
    pub db: db::DbState,
    pub api: api::ApiClient,
    pub auth: auth::AuthState,
    pub cart: cart::CartState,
    /// Stop handle for the per-session cart write queue.
    pub(crate) cart_queue: Mutex<Option<CancellationToken>>,
}

impl AppContext {
    /// Bring the terminal up: resolve the backend URL (argument wins over
    /// the stored one), open the local database, and restore the cart
    /// snapshot. Call [`auth::rehydrate`] afterwards to resume a session.
    pub fn initialize(data_dir: &Path, base_url: Option<&str>) -> Result<Arc<Self>, StoreError> {
        let base_url = match base_url {
            Some(url) => {
                let normalized = api::normalize_base_url(url);
                storage::set_credential(storage::KEY_BASE_URL, &normalized)
                    .map_err(StoreError::Storage)?;
                normalized
            }
            None => storage::get_credential(storage::KEY_BASE_URL).ok_or_else(|| {
                StoreError::InvalidPayload("terminal not configured: no backend URL stored".into())
            })?,
        };

        let db = db::init(data_dir).map_err(StoreError::Storage)?;
        let cart = cart::CartState::restore(&db)?;
        let api = api::ApiClient::new(&base_url)?;

        info!(base_url = %api.base_url(), "terminal context initialized");

        Ok(Arc::new(Self {
            db,
            api,
            auth: auth::AuthState::new(),
            cart,
            cart_queue: Mutex::new(None),
        }))
    }
}

/// Initialize structured logging (console + daily rolling file).
///
/// Call once at startup, before the first service call.
pub fn init_telemetry(log_dir: &Path) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tiendita_terminal=debug"));

    std::fs::create_dir_all(log_dir).ok();
    let file_appender = tracing_appender::rolling::daily(log_dir, "terminal");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    // Keep the guard alive for the lifetime of the process; dropping it
    // flushes logs. Leaked intentionally since the terminal runs until exit.
    std::mem::forget(guard);

    info!("Starting tiendita-terminal v{}", env!("CARGO_PKG_VERSION"));
}
