//! Order model, lifecycle state machine, and transition intents.
//!
//! The backend owns order truth; this module owns the *rules*: which state
//! an order starts in, which transitions exist, and which role may request
//! each one. Every screen goes through `check_transition` /
//! `request_transition` instead of re-deriving legality, so the rules exist
//! exactly once on the client.
//!
//! Transitions are validated locally before any network call. A validation
//! failure never reaches the wire; a wire failure is surfaced directly and
//! never retried here (financial operations must not be silently
//! duplicated).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::roles::Role;
use crate::AppContext;

/// Half a cent: tolerance for comparing f64 currency totals.
pub(crate) const TOTAL_TOLERANCE: f64 = 0.005;

// ---------------------------------------------------------------------------
// Wire enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
    Pending,
    PendingPayment,
    Paid,
    PickupReady,
    InTransit,
    Completed,
    Cancelled,
}

impl OrderState {
    /// Terminal states have no outgoing transitions, not even cancellation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderState::Completed | OrderState::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::Pending => "PENDING",
            OrderState::PendingPayment => "PENDING_PAYMENT",
            OrderState::Paid => "PAID",
            OrderState::PickupReady => "PICKUP_READY",
            OrderState::InTransit => "IN_TRANSIT",
            OrderState::Completed => "COMPLETED",
            OrderState::Cancelled => "CANCELLED",
        }
    }

    pub const ALL: [OrderState; 7] = [
        OrderState::Pending,
        OrderState::PendingPayment,
        OrderState::Paid,
        OrderState::PickupReady,
        OrderState::InTransit,
        OrderState::Completed,
        OrderState::Cancelled,
    ];
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryType {
    Pickup,
    HomeDelivery,
}

impl fmt::Display for DeliveryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeliveryType::Pickup => "PICKUP",
            DeliveryType::HomeDelivery => "HOME_DELIVERY",
        })
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    Transfer,
    Card,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PaymentMethod::Cash => "CASH",
            PaymentMethod::Transfer => "TRANSFER",
            PaymentMethod::Card => "CARD",
        })
    }
}

// ---------------------------------------------------------------------------
// Order model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_ref: String,
    pub name: String,
    pub unit_price: f64,
    pub quantity: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryDetails {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    /// `None` for walk-in cashier sales.
    #[serde(default)]
    pub customer: Option<String>,
    pub line_items: Vec<LineItem>,
    pub total: f64,
    pub delivery_type: DeliveryType,
    #[serde(default)]
    pub delivery_details: DeliveryDetails,
    pub payment_method: PaymentMethod,
    pub state: OrderState,
    #[serde(default)]
    pub till_reconciled: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub handled_by: Option<String>,
}

impl Order {
    pub fn computed_total(&self) -> f64 {
        self.line_items
            .iter()
            .map(|li| li.unit_price * f64::from(li.quantity))
            .sum()
    }

    /// The stored total must equal the line-item sum at all times.
    pub fn validate_total(&self) -> Result<(), StoreError> {
        let computed = self.computed_total();
        if (computed - self.total).abs() > TOTAL_TOLERANCE {
            return Err(StoreError::invalid_state(
                format!("order {}", self.id),
                format!(
                    "stored total {:.2} does not match line items ({:.2})",
                    self.total, computed
                ),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Initial state
// ---------------------------------------------------------------------------

/// State a freshly-created order starts in.
///
/// Card and transfer payments must be confirmed by the gateway before the
/// store acts on them. Cash pickups are ready as soon as they are rung up;
/// cash home deliveries wait for a courier.
pub fn initial_state(payment: PaymentMethod, delivery: DeliveryType) -> OrderState {
    match (payment, delivery) {
        (PaymentMethod::Transfer | PaymentMethod::Card, _) => OrderState::PendingPayment,
        (PaymentMethod::Cash, DeliveryType::Pickup) => OrderState::PickupReady,
        (PaymentMethod::Cash, DeliveryType::HomeDelivery) => OrderState::Pending,
    }
}

// ---------------------------------------------------------------------------
// Transition table
// ---------------------------------------------------------------------------

struct TransitionRule {
    from: OrderState,
    to: OrderState,
    roles: &'static [Role],
    /// When set, the order's delivery type must match.
    delivery: Option<DeliveryType>,
}

/// Cancellation is handled separately: any non-terminal state -> CANCELLED,
/// admin only.
const TRANSITION_TABLE: &[TransitionRule] = &[
    TransitionRule {
        from: OrderState::PendingPayment,
        to: OrderState::Paid,
        roles: &[Role::System],
        delivery: None,
    },
    TransitionRule {
        from: OrderState::Paid,
        to: OrderState::InTransit,
        roles: &[Role::Admin, Role::Courier],
        delivery: Some(DeliveryType::HomeDelivery),
    },
    TransitionRule {
        from: OrderState::Paid,
        to: OrderState::Completed,
        roles: &[Role::Cashier],
        delivery: Some(DeliveryType::Pickup),
    },
    TransitionRule {
        from: OrderState::PickupReady,
        to: OrderState::Completed,
        roles: &[Role::Cashier],
        delivery: None,
    },
    TransitionRule {
        from: OrderState::Pending,
        to: OrderState::InTransit,
        roles: &[Role::Courier],
        delivery: None,
    },
    TransitionRule {
        from: OrderState::InTransit,
        to: OrderState::Completed,
        roles: &[Role::Courier],
        delivery: None,
    },
];

/// Validate a state change request against the transition table.
///
/// Failure modes, in precedence order:
/// - source terminal, or (from, to) not in the table, or a delivery guard
///   mismatch -> `InvalidTransition` naming source, target, and the role
///   that could have performed it (when one exists);
/// - (from, to) listed but the acting role not permitted -> `Forbidden`.
pub fn check_transition(order: &Order, to: OrderState, role: Role) -> Result<(), StoreError> {
    let from = order.state;

    if from.is_terminal() {
        return Err(StoreError::InvalidTransition {
            from,
            to,
            required: None,
        });
    }

    if to == OrderState::Cancelled {
        if role == Role::Admin {
            return Ok(());
        }
        return Err(StoreError::forbidden(
            role,
            format!("cancelling order {}", order.id),
        ));
    }

    let rule = match TRANSITION_TABLE
        .iter()
        .find(|r| r.from == from && r.to == to)
    {
        Some(rule) => rule,
        None => {
            return Err(StoreError::InvalidTransition {
                from,
                to,
                required: None,
            });
        }
    };

    if let Some(required_delivery) = rule.delivery {
        if order.delivery_type != required_delivery {
            return Err(StoreError::InvalidTransition {
                from,
                to,
                required: rule.roles.first().copied(),
            });
        }
    }

    if !rule.roles.contains(&role) {
        return Err(StoreError::forbidden(
            role,
            format!("moving order {} from {from} to {to}", order.id),
        ));
    }

    Ok(())
}

/// Every target state the given role could legally request for this order.
/// Used by the view builder so screens never re-derive legality.
pub fn allowed_transitions(order: &Order, role: Role) -> Vec<OrderState> {
    let mut targets: Vec<OrderState> = TRANSITION_TABLE
        .iter()
        .filter(|r| r.from == order.state)
        .filter(|r| r.roles.contains(&role))
        .filter(|r| r.delivery.map_or(true, |d| d == order.delivery_type))
        .map(|r| r.to)
        .collect();

    if role == Role::Admin && !order.state.is_terminal() {
        targets.push(OrderState::Cancelled);
    }
    targets
}

// ---------------------------------------------------------------------------
// Checkout
// ---------------------------------------------------------------------------

/// What the checkout screen collects beyond the cart itself.
#[derive(Debug, Clone)]
pub struct CheckoutDetails {
    pub delivery_type: DeliveryType,
    pub delivery_details: DeliveryDetails,
    pub payment_method: PaymentMethod,
}

/// Build an order draft from cart lines, enforcing the structural
/// invariants before it ever reaches the wire.
pub fn build_order_draft(
    customer: Option<String>,
    lines: Vec<LineItem>,
    details: &CheckoutDetails,
) -> Result<Order, StoreError> {
    if lines.is_empty() {
        return Err(StoreError::invalid_state(
            "checkout",
            "cannot place an order with an empty cart",
        ));
    }
    for line in &lines {
        if line.quantity == 0 {
            return Err(StoreError::InvalidQuantity {
                product: line.product_ref.clone(),
                quantity: 0,
            });
        }
        if line.unit_price < 0.0 {
            return Err(StoreError::InvalidPayload(format!(
                "product {} has negative unit price",
                line.product_ref
            )));
        }
    }

    let delivery_details = match details.delivery_type {
        DeliveryType::HomeDelivery => {
            let d = &details.delivery_details;
            if d.address.trim().is_empty() || d.phone.trim().is_empty() {
                return Err(StoreError::invalid_state(
                    "checkout",
                    "home delivery requires an address and a phone number",
                ));
            }
            d.clone()
        }
        // Pickup orders carry no delivery details.
        DeliveryType::Pickup => DeliveryDetails::default(),
    };

    let total = lines
        .iter()
        .map(|li| li.unit_price * f64::from(li.quantity))
        .sum();

    Ok(Order {
        id: String::new(),
        customer,
        line_items: lines,
        total,
        delivery_type: details.delivery_type,
        delivery_details,
        payment_method: details.payment_method,
        state: initial_state(details.payment_method, details.delivery_type),
        till_reconciled: false,
        created_at: Utc::now(),
        handled_by: None,
    })
}

// ---------------------------------------------------------------------------
// Async wrappers (mutation intents)
// ---------------------------------------------------------------------------

/// Place the current cart as an order and clear the cart on success.
///
/// The draft carries a client request id so a retried POST after a dropped
/// response cannot create a duplicate order on the backend.
pub async fn create_order(
    ctx: &AppContext,
    details: &CheckoutDetails,
) -> Result<Order, StoreError> {
    let session = ctx.auth.require_session()?;
    if !crate::roles::has_permission(session.profile.role, crate::roles::Permission::PlaceOrder) {
        return Err(StoreError::forbidden(session.profile.role, "placing an order"));
    }
    let cart = ctx.cart.snapshot();
    let lines = cart.to_line_items();

    // Walk-in sales rung up at the counter have no customer account; the
    // cashier is recorded as the handler instead.
    let customer =
        (session.profile.role == Role::Customer).then(|| session.profile.id.clone());
    let mut draft = build_order_draft(customer, lines, details)?;
    if session.profile.role == Role::Cashier {
        draft.handled_by = Some(session.profile.id.clone());
    }
    draft.validate_total()?;

    let client_request_id = Uuid::new_v4().to_string();
    let created = ctx
        .api
        .create_order(&session.token, &draft, &client_request_id)
        .await?;
    created.validate_total()?;

    info!(
        order_id = %created.id,
        state = %created.state,
        total = created.total,
        "order placed"
    );

    // Successful checkout empties the cart, locally and server-side.
    if let Err(e) = ctx.cart.clear(&ctx.db) {
        warn!(error = %e, "order placed but cart clear failed");
    }

    Ok(created)
}

/// Request a state transition for an order on behalf of the current session.
///
/// The session role is authoritative; callers cannot widen their own
/// permissions by passing a role.
pub async fn request_transition(
    ctx: &AppContext,
    order: &Order,
    to: OrderState,
) -> Result<Order, StoreError> {
    let session = ctx.auth.require_session()?;
    check_transition(order, to, session.profile.role)?;

    let updated = ctx
        .api
        .update_order_state(&session.token, &order.id, to, None)
        .await?;
    updated.validate_total()?;

    info!(order_id = %order.id, from = %order.state, to = %to, "order transition applied");
    Ok(updated)
}

/// Admin-triggered courier assignment: submits the courier-role
/// `PENDING -> IN_TRANSIT` transition on the courier's behalf and pins
/// `handled_by` to the courier.
pub async fn assign_courier(
    ctx: &AppContext,
    order: &Order,
    courier_id: &str,
) -> Result<Order, StoreError> {
    let session = ctx.auth.require_session()?;
    if session.profile.role != Role::Admin {
        return Err(StoreError::forbidden(
            session.profile.role,
            format!("assigning a courier to order {}", order.id),
        ));
    }
    check_transition(order, OrderState::InTransit, Role::Courier)?;

    let updated = ctx
        .api
        .update_order_state(
            &session.token,
            &order.id,
            OrderState::InTransit,
            Some(courier_id),
        )
        .await?;

    info!(order_id = %order.id, courier = %courier_id, "courier assigned");
    Ok(updated)
}

// ---------------------------------------------------------------------------
// Optimistic status overlay
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayPhase {
    /// Shown optimistically; the backend has not confirmed yet.
    Pending,
    /// Confirmed; kept until the canonical view catches up.
    Applied,
    /// Rejected; held so the screen can roll back explicitly.
    Failed,
}

#[derive(Debug, Clone)]
pub struct PendingTransition {
    pub target: OrderState,
    pub phase: OverlayPhase,
}

/// Per-screen overlay of in-flight transitions over the canonical order
/// list. The overlay never mutates orders: it projects a display state and
/// is reconciled against each server refresh.
#[derive(Debug, Default)]
pub struct StatusOverlay {
    entries: HashMap<String, PendingTransition>,
}

impl StatusOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, order_id: &str, target: OrderState) {
        self.entries.insert(
            order_id.to_string(),
            PendingTransition {
                target,
                phase: OverlayPhase::Pending,
            },
        );
    }

    pub fn confirm(&mut self, order_id: &str) {
        if let Some(entry) = self.entries.get_mut(order_id) {
            entry.phase = OverlayPhase::Applied;
        }
    }

    pub fn fail(&mut self, order_id: &str) {
        if let Some(entry) = self.entries.get_mut(order_id) {
            entry.phase = OverlayPhase::Failed;
        }
    }

    /// Explicit rollback after the screen has surfaced the failure.
    pub fn rollback(&mut self, order_id: &str) -> Option<PendingTransition> {
        self.entries.remove(order_id)
    }

    pub fn get(&self, order_id: &str) -> Option<&PendingTransition> {
        self.entries.get(order_id)
    }

    /// Display state for an order: a pending or applied target wins over
    /// the canonical state; a failed entry falls back to canonical.
    pub fn project(&self, order_id: &str, canonical: OrderState) -> OrderState {
        match self.entries.get(order_id) {
            Some(e) if e.phase != OverlayPhase::Failed => e.target,
            _ => canonical,
        }
    }

    /// Reconcile against a fresh canonical list: applied entries whose
    /// target the server now reports are dropped; pending and failed
    /// entries stay until confirmed or rolled back.
    pub fn absorb(&mut self, canonical: &[Order]) {
        let states: HashMap<&str, OrderState> = canonical
            .iter()
            .map(|o| (o.id.as_str(), o.state))
            .collect();
        self.entries.retain(|id, entry| {
            !(entry.phase == OverlayPhase::Applied
                && states.get(id.as_str()) == Some(&entry.target))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::order;

    #[test]
    fn initial_state_follows_payment_and_delivery() {
        assert_eq!(
            initial_state(PaymentMethod::Transfer, DeliveryType::Pickup),
            OrderState::PendingPayment
        );
        assert_eq!(
            initial_state(PaymentMethod::Card, DeliveryType::HomeDelivery),
            OrderState::PendingPayment
        );
        assert_eq!(
            initial_state(PaymentMethod::Cash, DeliveryType::Pickup),
            OrderState::PickupReady
        );
        assert_eq!(
            initial_state(PaymentMethod::Cash, DeliveryType::HomeDelivery),
            OrderState::Pending
        );
    }

    #[test]
    fn cash_home_delivery_cannot_jump_to_completed() {
        let o = order("o1", OrderState::Pending, DeliveryType::HomeDelivery);
        for role in [Role::Admin, Role::Cashier, Role::Courier, Role::System] {
            let err = check_transition(&o, OrderState::Completed, role).unwrap_err();
            assert!(
                matches!(err, StoreError::InvalidTransition { .. }),
                "{role} got {err:?}"
            );
        }
    }

    #[test]
    fn courier_flow_pending_to_delivered() {
        let mut o = order("o1", OrderState::Pending, DeliveryType::HomeDelivery);
        check_transition(&o, OrderState::InTransit, Role::Courier).unwrap();
        o.state = OrderState::InTransit;
        check_transition(&o, OrderState::Completed, Role::Courier).unwrap();
    }

    #[test]
    fn paid_in_transit_requires_home_delivery() {
        let pickup = order("o1", OrderState::Paid, DeliveryType::Pickup);
        let err = check_transition(&pickup, OrderState::InTransit, Role::Courier).unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));

        let home = order("o2", OrderState::Paid, DeliveryType::HomeDelivery);
        check_transition(&home, OrderState::InTransit, Role::Courier).unwrap();
        check_transition(&home, OrderState::InTransit, Role::Admin).unwrap();
    }

    #[test]
    fn cashier_completes_pickups_not_deliveries() {
        let pickup = order("o1", OrderState::Paid, DeliveryType::Pickup);
        check_transition(&pickup, OrderState::Completed, Role::Cashier).unwrap();

        let ready = order("o2", OrderState::PickupReady, DeliveryType::Pickup);
        check_transition(&ready, OrderState::Completed, Role::Cashier).unwrap();

        let home = order("o3", OrderState::Paid, DeliveryType::HomeDelivery);
        let err = check_transition(&home, OrderState::Completed, Role::Cashier).unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[test]
    fn only_admin_cancels_and_never_from_terminal() {
        let o = order("o1", OrderState::Paid, DeliveryType::Pickup);
        check_transition(&o, OrderState::Cancelled, Role::Admin).unwrap();
        let err = check_transition(&o, OrderState::Cancelled, Role::Cashier).unwrap_err();
        assert!(matches!(err, StoreError::Forbidden { .. }));

        for terminal in [OrderState::Completed, OrderState::Cancelled] {
            let done = order("o2", terminal, DeliveryType::Pickup);
            let err = check_transition(&done, OrderState::Cancelled, Role::Admin).unwrap_err();
            assert!(matches!(err, StoreError::InvalidTransition { .. }));
        }
    }

    /// Exhaustive sweep: every (state, target, role) triple outside the
    /// table must fail with InvalidTransition or Forbidden, never pass.
    #[test]
    fn transitions_outside_the_table_always_fail() {
        let roles = [
            Role::Admin,
            Role::Cashier,
            Role::Courier,
            Role::Supplier,
            Role::Customer,
            Role::System,
        ];
        for from in OrderState::ALL {
            for to in OrderState::ALL {
                for role in roles {
                    for delivery in [DeliveryType::Pickup, DeliveryType::HomeDelivery] {
                        let o = order("sweep", from, delivery);
                        let legal_cancel = to == OrderState::Cancelled
                            && role == Role::Admin
                            && !from.is_terminal();
                        let legal_rule = TRANSITION_TABLE.iter().any(|r| {
                            r.from == from
                                && r.to == to
                                && r.roles.contains(&role)
                                && r.delivery.map_or(true, |d| d == delivery)
                                && !from.is_terminal()
                        });
                        let result = check_transition(&o, to, role);
                        if legal_cancel || legal_rule {
                            assert!(result.is_ok(), "{from}->{to} by {role} should pass");
                        } else {
                            assert!(
                                matches!(
                                    result,
                                    Err(StoreError::InvalidTransition { .. })
                                        | Err(StoreError::Forbidden { .. })
                                ),
                                "{from}->{to} by {role} ({delivery}) must fail, got {result:?}"
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn draft_totals_match_line_items() {
        let details = CheckoutDetails {
            delivery_type: DeliveryType::Pickup,
            delivery_details: DeliveryDetails::default(),
            payment_method: PaymentMethod::Cash,
        };
        let lines = vec![
            LineItem {
                product_ref: "p1".into(),
                name: "Beans".into(),
                unit_price: 2.50,
                quantity: 3,
            },
            LineItem {
                product_ref: "p2".into(),
                name: "Rice".into(),
                unit_price: 1.25,
                quantity: 2,
            },
        ];
        let draft = build_order_draft(Some("u1".into()), lines, &details).unwrap();
        assert!((draft.total - 10.0).abs() < TOTAL_TOLERANCE);
        draft.validate_total().unwrap();
        assert_eq!(draft.state, OrderState::PickupReady);
    }

    #[test]
    fn home_delivery_draft_requires_address_and_phone() {
        let details = CheckoutDetails {
            delivery_type: DeliveryType::HomeDelivery,
            delivery_details: DeliveryDetails {
                address: "".into(),
                reference: "blue gate".into(),
                phone: "555-0100".into(),
            },
            payment_method: PaymentMethod::Cash,
        };
        let lines = vec![LineItem {
            product_ref: "p1".into(),
            name: "Beans".into(),
            unit_price: 2.0,
            quantity: 1,
        }];
        let err = build_order_draft(None, lines, &details).unwrap_err();
        assert!(matches!(err, StoreError::InvalidState { .. }));
    }

    #[test]
    fn pickup_draft_strips_delivery_details() {
        let details = CheckoutDetails {
            delivery_type: DeliveryType::Pickup,
            delivery_details: DeliveryDetails {
                address: "should be dropped".into(),
                reference: "".into(),
                phone: "123".into(),
            },
            payment_method: PaymentMethod::Card,
        };
        let lines = vec![LineItem {
            product_ref: "p1".into(),
            name: "Beans".into(),
            unit_price: 2.0,
            quantity: 1,
        }];
        let draft = build_order_draft(None, lines, &details).unwrap();
        assert_eq!(draft.delivery_details, DeliveryDetails::default());
        assert_eq!(draft.state, OrderState::PendingPayment);
    }

    #[test]
    fn overlay_projects_pending_and_absorbs_applied() {
        let mut overlay = StatusOverlay::new();
        overlay.begin("o1", OrderState::Completed);
        assert_eq!(
            overlay.project("o1", OrderState::PickupReady),
            OrderState::Completed
        );

        // Failure falls back to canonical until rolled back.
        overlay.fail("o1");
        assert_eq!(
            overlay.project("o1", OrderState::PickupReady),
            OrderState::PickupReady
        );
        assert!(overlay.rollback("o1").is_some());
        assert!(overlay.get("o1").is_none());

        // Applied entries are dropped once the canonical list agrees.
        overlay.begin("o2", OrderState::Completed);
        overlay.confirm("o2");
        let o = order("o2", OrderState::Completed, DeliveryType::Pickup);
        overlay.absorb(std::slice::from_ref(&o));
        assert!(overlay.get("o2").is_none());
    }
}
