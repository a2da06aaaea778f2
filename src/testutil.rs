//! Shared fixtures for in-module tests.

use chrono::Utc;
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::api::ApiClient;
use crate::auth::AuthState;
use crate::cart::CartState;
use crate::db::{self, DbState};
use crate::orders::{DeliveryDetails, DeliveryType, Order, OrderState, PaymentMethod};
use crate::AppContext;

/// In-memory database with the full migration chain applied.
pub(crate) fn db_state() -> DbState {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    db::run_migrations_for_test(&conn);
    DbState {
        conn: Mutex::new(conn),
        db_path: PathBuf::from(":memory:"),
    }
}

/// An `AppContext` whose API client points at a closed local port; tests
/// exercising network paths must not reach a live backend.
pub(crate) fn test_ctx() -> AppContext {
    AppContext {
        db: db_state(),
        api: ApiClient::new("http://127.0.0.1:9").expect("test api client"),
        auth: AuthState::new(),
        cart: CartState::new(),
        cart_queue: Mutex::new(None),
    }
}

/// Minimal order fixture with a consistent total (one line, price 0).
pub(crate) fn order(id: &str, state: OrderState, delivery: DeliveryType) -> Order {
    Order {
        id: id.to_string(),
        customer: None,
        line_items: Vec::new(),
        total: 0.0,
        delivery_type: delivery,
        delivery_details: DeliveryDetails::default(),
        payment_method: PaymentMethod::Cash,
        state,
        till_reconciled: false,
        created_at: Utc::now(),
        handled_by: None,
    }
}
