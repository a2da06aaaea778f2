//! Cash-drawer (till) reconciliation.
//!
//! `close_till` folds a cashier's settled, unreconciled sales into a single
//! closeout record: totals per payment method, with the cash subtotal being
//! the figure the cashier counts against the physical drawer.
//!
//! The closeout and the tagging of its orders must land as one atomic unit.
//! The backend applies both under the closeout id as idempotency key; on
//! this side every closeout is journaled locally *before* submission, and a
//! partial failure is healed by re-submitting the same journaled record:
//! its order set is authoritative and never recomputed. The journal also
//! enforces that no order is ever absorbed by two closeouts.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::DbState;
use crate::error::StoreError;
use crate::orders::{Order, OrderState, PaymentMethod};
use crate::roles::{has_permission, Permission};
use crate::AppContext;

// ---------------------------------------------------------------------------
// Closeout record
// ---------------------------------------------------------------------------

/// Immutable till closeout. The id doubles as the idempotency key for the
/// backend submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TillCloseout {
    pub id: String,
    pub cashier_ref: String,
    pub closed_at: DateTime<Utc>,
    pub orders_included: BTreeSet<String>,
    pub totals_by_payment_method: BTreeMap<PaymentMethod, f64>,
}

impl TillCloseout {
    /// Physical currency the cashier must count against the drawer.
    pub fn cash_total(&self) -> f64 {
        self.totals_by_payment_method
            .get(&PaymentMethod::Cash)
            .copied()
            .unwrap_or(0.0)
    }

    pub fn grand_total(&self) -> f64 {
        self.totals_by_payment_method.values().sum()
    }
}

// ---------------------------------------------------------------------------
// Reconciliation engine (pure)
// ---------------------------------------------------------------------------

/// Fold a cashier's unreconciled sales into a closeout record.
///
/// Preconditions, checked per order and failing with `InvalidState` naming
/// the first offender: handled by this cashier, not already reconciled,
/// settled (COMPLETED; a cancelled sale has no proceeds to reconcile and a
/// pending one must never be absorbed), and an intact stored total.
pub fn close_till(
    cashier_id: &str,
    unreconciled_sales: &[Order],
) -> Result<TillCloseout, StoreError> {
    for order in unreconciled_sales {
        let entity = format!("order {}", order.id);
        if order.handled_by.as_deref() != Some(cashier_id) {
            return Err(StoreError::invalid_state(
                entity,
                format!("not handled by cashier {cashier_id}"),
            ));
        }
        if order.till_reconciled {
            return Err(StoreError::invalid_state(
                entity,
                "already absorbed by a previous till closeout",
            ));
        }
        if order.state != OrderState::Completed {
            return Err(StoreError::invalid_state(
                entity,
                format!("state {} is not settled", order.state),
            ));
        }
        order.validate_total()?;
    }

    let mut totals: BTreeMap<PaymentMethod, f64> = BTreeMap::new();
    let mut included = BTreeSet::new();
    for order in unreconciled_sales {
        *totals.entry(order.payment_method).or_insert(0.0) += order.total;
        included.insert(order.id.clone());
    }

    Ok(TillCloseout {
        id: Uuid::new_v4().to_string(),
        cashier_ref: cashier_id.to_string(),
        closed_at: Utc::now(),
        orders_included: included,
        totals_by_payment_method: totals,
    })
}

// ---------------------------------------------------------------------------
// Local journal
// ---------------------------------------------------------------------------

/// Journal a closeout as `pending` before submission.
///
/// The unique index on journaled order ids is the local guard against
/// double-closing: a second closeout touching any already-journaled order
/// fails with `Conflict` and nothing is written.
pub fn journal_closeout(db: &DbState, closeout: &TillCloseout) -> Result<(), StoreError> {
    let conn = db.conn.lock().map_err(|e| StoreError::Storage(e.to_string()))?;

    let existing: Option<String> = conn
        .query_row(
            "SELECT sync_state FROM till_closeouts WHERE id = ?1",
            params![closeout.id],
            |row| row.get(0),
        )
        .optional()?;
    if existing.is_some() {
        // Re-entry with the same record is the healing path, not an error.
        return Ok(());
    }

    let totals_json = serde_json::to_string(&closeout.totals_by_payment_method)?;

    conn.execute_batch("BEGIN IMMEDIATE")?;
    let result = (|| -> Result<(), StoreError> {
        conn.execute(
            "INSERT INTO till_closeouts (id, cashier_ref, closed_at, totals_json, sync_state)
             VALUES (?1, ?2, ?3, ?4, 'pending')",
            params![
                closeout.id,
                closeout.cashier_ref,
                closeout.closed_at.to_rfc3339(),
                totals_json,
            ],
        )?;
        for order_id in &closeout.orders_included {
            conn.execute(
                "INSERT INTO till_closeout_orders (closeout_id, order_id) VALUES (?1, ?2)",
                params![closeout.id, order_id],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    StoreError::Conflict(format!(
                        "order {order_id} is already part of a till closeout"
                    ))
                }
                other => StoreError::from(other),
            })?;
        }
        Ok(())
    })();

    match result {
        Ok(()) => {
            conn.execute_batch("COMMIT")?;
            Ok(())
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(e)
        }
    }
}

fn mark_committed(db: &DbState, closeout_id: &str) -> Result<(), StoreError> {
    let conn = db.conn.lock().map_err(|e| StoreError::Storage(e.to_string()))?;
    conn.execute(
        "UPDATE till_closeouts
         SET sync_state = 'committed', committed_at = ?2
         WHERE id = ?1",
        params![closeout_id, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

fn journal_state(db: &DbState, closeout_id: &str) -> Result<Option<String>, StoreError> {
    let conn = db.conn.lock().map_err(|e| StoreError::Storage(e.to_string()))?;
    Ok(conn
        .query_row(
            "SELECT sync_state FROM till_closeouts WHERE id = ?1",
            params![closeout_id],
            |row| row.get(0),
        )
        .optional()?)
}

/// Closeouts journaled but never confirmed by the backend.
pub fn load_pending(db: &DbState) -> Result<Vec<TillCloseout>, StoreError> {
    let conn = db.conn.lock().map_err(|e| StoreError::Storage(e.to_string()))?;

    let mut stmt = conn.prepare(
        "SELECT id, cashier_ref, closed_at, totals_json
         FROM till_closeouts WHERE sync_state = 'pending'
         ORDER BY closed_at ASC",
    )?;
    let rows: Vec<(String, String, String, String)> = stmt
        .query_map([], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?
        .collect::<Result<_, _>>()?;

    let mut order_stmt = conn.prepare(
        "SELECT order_id FROM till_closeout_orders WHERE closeout_id = ?1 ORDER BY order_id",
    )?;

    let mut pending = Vec::with_capacity(rows.len());
    for (id, cashier_ref, closed_at, totals_json) in rows {
        let orders_included: BTreeSet<String> = order_stmt
            .query_map(params![id], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        let closed_at = DateTime::parse_from_rfc3339(&closed_at)
            .map_err(|e| StoreError::Storage(format!("journal timestamp: {e}")))?
            .with_timezone(&Utc);
        pending.push(TillCloseout {
            id,
            cashier_ref,
            closed_at,
            orders_included,
            totals_by_payment_method: serde_json::from_str(&totals_json)?,
        });
    }
    Ok(pending)
}

// ---------------------------------------------------------------------------
// Submission + healing
// ---------------------------------------------------------------------------

/// Journal a closeout and submit it to the backend.
///
/// The closeout id is the idempotency key: the backend applies record
/// creation and order tagging atomically under it, and answers a replay of
/// the same id with `Conflict`, which this side treats as "already
/// applied". A `NetworkFailure` leaves the journal row `pending` for
/// `resume_pending_closeouts` to heal later; the journaled order set is
/// re-submitted verbatim, so the same sale can never be counted twice.
pub async fn submit_closeout(
    ctx: &AppContext,
    closeout: &TillCloseout,
) -> Result<TillCloseout, StoreError> {
    let session = ctx.auth.require_session()?;

    if journal_state(&ctx.db, &closeout.id)?.as_deref() == Some("committed") {
        info!(closeout_id = %closeout.id, "closeout already committed, nothing to do");
        return Ok(closeout.clone());
    }
    journal_closeout(&ctx.db, closeout)?;

    match ctx.api.submit_till_closeout(&session.token, closeout).await {
        Ok(()) => {
            mark_committed(&ctx.db, &closeout.id)?;
            info!(
                closeout_id = %closeout.id,
                cashier = %closeout.cashier_ref,
                orders = closeout.orders_included.len(),
                cash_total = closeout.cash_total(),
                "till closeout committed"
            );
            Ok(closeout.clone())
        }
        Err(StoreError::Conflict(detail)) => {
            // The backend already holds this closeout id: a previous
            // submission landed but our confirmation was lost.
            mark_committed(&ctx.db, &closeout.id)?;
            info!(closeout_id = %closeout.id, detail = %detail, "closeout healed after conflict");
            Ok(closeout.clone())
        }
        Err(e) => {
            warn!(closeout_id = %closeout.id, error = %e, "closeout submission failed, journal kept pending");
            Err(e)
        }
    }
}

/// Validate, build, journal, and submit a closeout for the current cashier
/// session in one call. This is what the till screen invokes.
pub async fn close_current_till(
    ctx: &AppContext,
    unreconciled_sales: &[Order],
) -> Result<TillCloseout, StoreError> {
    let session = ctx.auth.require_session()?;
    if !has_permission(session.profile.role, Permission::CloseTill) {
        return Err(StoreError::forbidden(
            session.profile.role,
            "closing the till",
        ));
    }
    let closeout = close_till(&session.profile.id, unreconciled_sales)?;
    submit_closeout(ctx, &closeout).await
}

/// Re-submit every journaled-but-unconfirmed closeout. Called at startup
/// and whenever connectivity returns. Returns how many were healed.
pub async fn resume_pending_closeouts(ctx: &AppContext) -> Result<usize, StoreError> {
    let pending = load_pending(&ctx.db)?;
    if pending.is_empty() {
        return Ok(0);
    }
    info!(count = pending.len(), "resuming pending till closeouts");

    let mut healed = 0;
    for closeout in &pending {
        match submit_closeout(ctx, closeout).await {
            Ok(_) => healed += 1,
            // Still unreachable; keep the rest pending and stop early,
            // the next resume pass will pick them up in order.
            Err(e) if e.is_retryable() => {
                warn!(closeout_id = %closeout.id, error = %e, "backend still unreachable");
                break;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(healed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::{DeliveryType, LineItem};
    use crate::testutil::{db_state, order};

    fn sale(id: &str, cashier: &str, method: PaymentMethod, amount: f64) -> Order {
        let mut o = order(id, OrderState::Completed, DeliveryType::Pickup);
        o.handled_by = Some(cashier.to_string());
        o.payment_method = method;
        o.line_items = vec![LineItem {
            product_ref: format!("p-{id}"),
            name: format!("item {id}"),
            unit_price: amount,
            quantity: 1,
        }];
        o.total = amount;
        o
    }

    #[test]
    fn partitions_totals_by_payment_method() {
        let sales = vec![
            sale("s1", "cash-1", PaymentMethod::Cash, 6.0),
            sale("s2", "cash-1", PaymentMethod::Cash, 4.0),
            sale("s3", "cash-1", PaymentMethod::Card, 5.0),
        ];
        let closeout = close_till("cash-1", &sales).unwrap();

        assert_eq!(closeout.orders_included.len(), 3);
        assert!((closeout.cash_total() - 10.0).abs() < 1e-9);
        assert!(
            (closeout.totals_by_payment_method[&PaymentMethod::Card] - 5.0).abs() < 1e-9
        );
        assert!((closeout.grand_total() - 15.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_unsettled_orders_naming_the_offender() {
        let mut sales = vec![sale("good", "cash-1", PaymentMethod::Cash, 3.0)];
        let mut bad = sale("bad", "cash-1", PaymentMethod::Cash, 2.0);
        bad.state = OrderState::InTransit;
        sales.push(bad);

        let err = close_till("cash-1", &sales).unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, StoreError::InvalidState { .. }));
        assert!(msg.contains("bad"), "message must name the order: {msg}");
        assert!(msg.contains("IN_TRANSIT"), "message was: {msg}");
    }

    #[test]
    fn rejects_foreign_and_already_reconciled_orders() {
        let foreign = vec![sale("s1", "someone-else", PaymentMethod::Cash, 3.0)];
        assert!(matches!(
            close_till("cash-1", &foreign),
            Err(StoreError::InvalidState { .. })
        ));

        let mut done = sale("s2", "cash-1", PaymentMethod::Cash, 3.0);
        done.till_reconciled = true;
        assert!(matches!(
            close_till("cash-1", &[done]),
            Err(StoreError::InvalidState { .. })
        ));
    }

    #[test]
    fn rejects_orders_with_broken_totals() {
        let mut crooked = sale("s1", "cash-1", PaymentMethod::Cash, 3.0);
        crooked.total = 30.0;
        assert!(matches!(
            close_till("cash-1", &[crooked]),
            Err(StoreError::InvalidState { .. })
        ));
    }

    #[test]
    fn journal_blocks_double_closing_the_same_order() {
        let db = db_state();
        let sales = vec![
            sale("s1", "cash-1", PaymentMethod::Cash, 6.0),
            sale("s2", "cash-1", PaymentMethod::Card, 5.0),
        ];
        let first = close_till("cash-1", &sales).unwrap();
        journal_closeout(&db, &first).unwrap();

        // A different closeout over an overlapping set must be refused and
        // leave no partial rows behind.
        let second = close_till("cash-1", &sales[..1]).unwrap();
        let err = journal_closeout(&db, &second).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)), "got {err:?}");
        assert!(err.to_string().contains("s1"));

        let pending = load_pending(&db).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, first.id);
    }

    #[test]
    fn journal_round_trips_the_closeout() {
        let db = db_state();
        let sales = vec![
            sale("s1", "cash-1", PaymentMethod::Cash, 6.0),
            sale("s2", "cash-1", PaymentMethod::Transfer, 2.5),
        ];
        let closeout = close_till("cash-1", &sales).unwrap();
        journal_closeout(&db, &closeout).unwrap();

        // Journaling the same record again is a no-op (healing re-entry).
        journal_closeout(&db, &closeout).unwrap();

        let pending = load_pending(&db).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0], closeout);

        mark_committed(&db, &closeout.id).unwrap();
        assert!(load_pending(&db).unwrap().is_empty());
        assert_eq!(
            journal_state(&db, &closeout.id).unwrap().as_deref(),
            Some("committed")
        );
    }

    #[test]
    fn empty_till_produces_an_empty_closeout() {
        let closeout = close_till("cash-1", &[]).unwrap();
        assert!(closeout.orders_included.is_empty());
        assert_eq!(closeout.cash_total(), 0.0);
    }
}
