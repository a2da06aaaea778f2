//! Error taxonomy for the storefront terminal core.
//!
//! Validation errors (`InvalidTransition`, `Forbidden`, `InvalidState`,
//! `InvalidQuantity`) are raised locally before any network call and are
//! never retried. `NetworkFailure` is the only retryable variant, and only
//! the cart write queue retries it; financial operations (order creation,
//! transitions, till closeouts) surface it directly. `Conflict` on a till
//! closeout routes through the idempotent healing path in `till`.

use thiserror::Error;

use crate::orders::OrderState;
use crate::roles::Role;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The requested state change is not in the transition table, or a
    /// guard (delivery type, terminal source state) rejected it.
    #[error("order cannot move from {from} to {to}{}", required_hint(.required))]
    InvalidTransition {
        from: OrderState,
        to: OrderState,
        /// Role that could perform the transition, when one exists.
        required: Option<Role>,
    },

    /// The transition (or operation) exists but the acting role may not
    /// perform it. `role` is `None` when the backend rejected our token.
    #[error("{action} is not permitted{}", role_hint(.role))]
    Forbidden { role: Option<Role>, action: String },

    /// A precondition on entity state was violated, e.g. a non-terminal
    /// order offered to a till closeout.
    #[error("{entity}: {reason}")]
    InvalidState { entity: String, reason: String },

    /// Cart quantities must be >= 1; zero is only reachable via `remove`.
    #[error("invalid quantity {quantity} for product {product}: quantities must be at least 1 (use remove to drop the line)")]
    InvalidQuantity { product: String, quantity: i64 },

    /// Transient transport or 5xx failure. Retryable.
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// A stale write lost a race, or the backend already holds this record.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Local SQLite or OS keyring fault.
    #[error("local storage error: {0}")]
    Storage(String),

    /// The backend answered with a body this client cannot interpret, or
    /// caller input failed structural validation.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

impl StoreError {
    /// Only network failures may be retried; everything else is either a
    /// local validation error or must go through an explicit healing path.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::NetworkFailure(_))
    }

    pub fn forbidden(role: Role, action: impl Into<String>) -> Self {
        StoreError::Forbidden {
            role: Some(role),
            action: action.into(),
        }
    }

    pub fn invalid_state(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::InvalidState {
            entity: entity.into(),
            reason: reason.into(),
        }
    }
}

fn required_hint(required: &Option<Role>) -> String {
    match required {
        Some(role) => format!(" (requires role {role})"),
        None => " (no such transition)".to_string(),
    }
}

fn role_hint(role: &Option<Role>) -> String {
    match role {
        Some(role) => format!(" for role {role}"),
        None => " (backend rejected credentials)".to_string(),
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::InvalidPayload(e.to_string())
    }
}

// The embedding UI shells expect plain string errors at the boundary.
impl From<StoreError> for String {
    fn from(e: StoreError) -> Self {
        e.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_names_source_target_and_role() {
        let err = StoreError::InvalidTransition {
            from: OrderState::PickupReady,
            to: OrderState::Completed,
            required: Some(Role::Cashier),
        };
        let msg = err.to_string();
        assert!(msg.contains("PICKUP_READY"), "message was: {msg}");
        assert!(msg.contains("COMPLETED"), "message was: {msg}");
        assert!(msg.contains("cashier"), "message was: {msg}");
    }

    #[test]
    fn only_network_failures_are_retryable() {
        assert!(StoreError::NetworkFailure("timeout".into()).is_retryable());
        assert!(!StoreError::Conflict("dup".into()).is_retryable());
        assert!(!StoreError::InvalidQuantity {
            product: "p1".into(),
            quantity: 0,
        }
        .is_retryable());
    }
}
