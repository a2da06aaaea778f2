//! Role-scoped order views.
//!
//! Every screen renders the output of `build_view` instead of filtering raw
//! order lists itself. Scope is enforced here, not in the UI: a filter can
//! narrow what a viewer sees but can never widen it past their role's
//! scope, no matter what value the caller injects.

use serde::Serialize;

use crate::orders::{allowed_transitions, Order, OrderState, StatusOverlay};
use crate::roles::Role;

/// One row of a role-scoped order list, annotated so the screen never has
/// to consult the transition table itself.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    /// Derived for courier screens; a delivered order offers no actions.
    pub is_delivered: bool,
    /// Targets the viewing role may legally request for this order.
    pub allowed_transitions: Vec<OrderState>,
}

/// Caller-supplied narrowing. Applied strictly inside the viewer's scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewFilter {
    /// Only orders in the given state.
    State(OrderState),
    /// Admin lens on another role's work queue: `Cashier` shows the
    /// pickup counter queue, `Courier` shows unassigned deliveries.
    Queue(Role),
}

/// Build the order list a viewer is entitled to see.
///
/// - admin: everything, newest first;
/// - cashier: the pending-pickup counter queue (`PICKUP_READY`, not yet
///   absorbed by a till closeout);
/// - courier: own assigned orders, with `is_delivered` derived;
/// - customer: own orders, newest first;
/// - supplier/system: no order scope.
pub fn build_view(
    orders: &[Order],
    role: Role,
    viewer_id: &str,
    filter: Option<&ViewFilter>,
) -> Vec<OrderView> {
    let mut scoped: Vec<&Order> = orders
        .iter()
        .filter(|o| in_scope(o, role, viewer_id))
        .filter(|o| matches_filter(o, role, filter))
        .collect();

    sort_by_recency(&mut scoped);

    scoped
        .into_iter()
        .map(|o| annotate(o, role))
        .collect()
}

/// The cashier's "my sales" list: everything they handled that has not yet
/// been absorbed by a till closeout. Feeds the reconciliation engine.
pub fn cashier_sales(orders: &[Order], cashier_id: &str) -> Vec<OrderView> {
    let mut scoped: Vec<&Order> = orders
        .iter()
        .filter(|o| o.handled_by.as_deref() == Some(cashier_id) && !o.till_reconciled)
        .collect();
    sort_by_recency(&mut scoped);
    scoped
        .into_iter()
        .map(|o| annotate(o, Role::Cashier))
        .collect()
}

/// Project an optimistic overlay onto a built view. Rows with an in-flight
/// transition show the target state and offer no further actions.
pub fn apply_overlay(views: &mut [OrderView], overlay: &StatusOverlay) {
    for view in views.iter_mut() {
        let projected = overlay.project(&view.order.id, view.order.state);
        if projected != view.order.state {
            view.order.state = projected;
            view.is_delivered = projected == OrderState::Completed;
            view.allowed_transitions.clear();
        }
    }
}

fn in_scope(order: &Order, role: Role, viewer_id: &str) -> bool {
    match role {
        Role::Admin => true,
        Role::Cashier => order.state == OrderState::PickupReady && !order.till_reconciled,
        Role::Courier => order.handled_by.as_deref() == Some(viewer_id),
        Role::Customer => order.customer.as_deref() == Some(viewer_id),
        // Suppliers work the replenishment queue, not customer orders.
        Role::Supplier | Role::System => false,
    }
}

fn matches_filter(order: &Order, role: Role, filter: Option<&ViewFilter>) -> bool {
    let Some(filter) = filter else {
        return true;
    };
    match filter {
        ViewFilter::State(state) => order.state == *state,
        // Queue lenses are an admin affordance; for any other viewer they
        // can only narrow to nothing outside their own scope.
        ViewFilter::Queue(Role::Cashier) => {
            order.state == OrderState::PickupReady && !order.till_reconciled
        }
        ViewFilter::Queue(Role::Courier) => {
            order.state == OrderState::Pending && order.handled_by.is_none()
        }
        ViewFilter::Queue(_) => false,
    }
}

/// Descending `created_at`, ties broken by id so the ordering is total.
fn sort_by_recency(orders: &mut [&Order]) {
    orders.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

fn annotate(order: &Order, role: Role) -> OrderView {
    let is_delivered = order.state == OrderState::Completed;
    // Delivered orders are immutable from the courier's seat.
    let allowed = if role == Role::Courier && is_delivered {
        Vec::new()
    } else {
        allowed_transitions(order, role)
    };
    OrderView {
        order: order.clone(),
        is_delivered,
        allowed_transitions: allowed,
    }
}
