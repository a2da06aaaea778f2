//! Cart state and server synchronization.
//!
//! The cart is the only shared mutable resource in the terminal, so it is
//! owned by exactly one place: `CartState`. Screens never read-modify-write
//! cart data themselves; they call the mutation methods here, which update
//! the local snapshot (memory + SQLite) and enqueue a full-replace write to
//! the backend.
//!
//! Server writes are serialized through a single-flight queue per session:
//! snapshots apply in issue order, a superseded snapshot is skipped
//! (last-write-wins), transient failures retry with doubling backoff, and
//! `flush` drains the queue on logout. `clear` issues a server-side DELETE
//! rather than an empty replace so no stale snapshot can survive a dropped
//! write.

use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::db::DbState;
use crate::error::StoreError;
use crate::orders::LineItem;
use crate::AppContext;

/// First retry after 5s, doubling up to 5 minutes.
const DEFAULT_RETRY_DELAY_MS: u64 = 5_000;
const MAX_RETRY_DELAY_MS: u64 = 300_000;

// ---------------------------------------------------------------------------
// Cart data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub name: String,
    pub quantity: u32,
    pub unit_price_snapshot: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    /// Product id -> line. Quantities are always >= 1; a zero-quantity
    /// entry is never stored.
    pub items: BTreeMap<String, CartLine>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.items
            .values()
            .map(|l| l.unit_price_snapshot * f64::from(l.quantity))
            .sum()
    }

    pub fn to_line_items(&self) -> Vec<LineItem> {
        self.items
            .iter()
            .map(|(id, line)| LineItem {
                product_ref: id.clone(),
                name: line.name.clone(),
                unit_price: line.unit_price_snapshot,
                quantity: line.quantity,
            })
            .collect()
    }

    pub fn to_wire_lines(&self) -> Vec<WireCartLine> {
        self.items
            .iter()
            .map(|(id, line)| WireCartLine {
                product: id.clone(),
                name: line.name.clone(),
                quantity: line.quantity,
                unit_price: line.unit_price_snapshot,
            })
            .collect()
    }
}

/// Shape of one cart line on the wire (`POST /cart { items: [...] }`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireCartLine {
    pub product: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: f64,
}

impl WireCartLine {
    fn into_entry(self) -> (String, CartLine) {
        (
            self.product,
            CartLine {
                name: self.name,
                quantity: self.quantity,
                unit_price_snapshot: self.unit_price,
            },
        )
    }
}

pub fn cart_from_wire(lines: Vec<WireCartLine>) -> Cart {
    Cart {
        // Defensive: a zero-quantity line from the wire is dropped, never stored.
        items: lines
            .into_iter()
            .filter(|l| l.quantity > 0)
            .map(WireCartLine::into_entry)
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Reconcile protocol
// ---------------------------------------------------------------------------

/// Merge the device-local cart with the server copy at authentication.
///
/// A non-empty local cart reflects the last active device intent and wins
/// wholesale; an empty local cart adopts the server copy.
pub fn reconcile(local: &Cart, server: &Cart) -> Cart {
    if local.is_empty() {
        server.clone()
    } else {
        local.clone()
    }
}

// ---------------------------------------------------------------------------
// Owning state
// ---------------------------------------------------------------------------

enum WriteCmd {
    Replace { generation: u64, lines: Vec<WireCartLine> },
    Delete { generation: u64 },
    Flush(oneshot::Sender<()>),
}

impl WriteCmd {
    fn generation(&self) -> u64 {
        match self {
            WriteCmd::Replace { generation, .. } | WriteCmd::Delete { generation } => *generation,
            WriteCmd::Flush(_) => 0,
        }
    }
}

/// The single owner of the mutable cart. Mutations update memory and the
/// local SQLite snapshot synchronously, then enqueue the server write.
pub struct CartState {
    cart: Mutex<Cart>,
    writer: Mutex<Option<mpsc::UnboundedSender<WriteCmd>>>,
    generation: Arc<AtomicU64>,
}

impl Default for CartState {
    fn default() -> Self {
        Self::new()
    }
}

impl CartState {
    pub fn new() -> Self {
        Self {
            cart: Mutex::new(Cart::new()),
            writer: Mutex::new(None),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Rebuild the cart from the local snapshot table at startup.
    pub fn restore(db: &DbState) -> Result<Self, StoreError> {
        let state = Self::new();
        let snapshot = load_snapshot(db)?;
        *state.cart.lock().expect("cart lock") = snapshot;
        Ok(state)
    }

    pub fn snapshot(&self) -> Cart {
        self.cart.lock().expect("cart lock").clone()
    }

    pub fn add(
        &self,
        db: &DbState,
        product_id: &str,
        name: &str,
        unit_price: f64,
    ) -> Result<Cart, StoreError> {
        let snapshot = {
            let mut cart = self.cart.lock().expect("cart lock");
            let line = cart
                .items
                .entry(product_id.to_string())
                .or_insert(CartLine {
                    name: name.to_string(),
                    quantity: 0,
                    unit_price_snapshot: unit_price,
                });
            line.quantity += 1;
            cart.clone()
        };
        self.after_mutation(db, &snapshot, false)?;
        Ok(snapshot)
    }

    /// The only sanctioned path to a zero-quantity product.
    pub fn remove(&self, db: &DbState, product_id: &str) -> Result<Cart, StoreError> {
        let snapshot = {
            let mut cart = self.cart.lock().expect("cart lock");
            cart.items.remove(product_id);
            cart.clone()
        };
        self.after_mutation(db, &snapshot, false)?;
        Ok(snapshot)
    }

    /// Set the quantity of a product already in the cart. Quantities below
    /// one are rejected, never clamped.
    pub fn set_quantity(
        &self,
        db: &DbState,
        product_id: &str,
        quantity: i64,
    ) -> Result<Cart, StoreError> {
        if quantity <= 0 {
            return Err(StoreError::InvalidQuantity {
                product: product_id.to_string(),
                quantity,
            });
        }
        let snapshot = {
            let mut cart = self.cart.lock().expect("cart lock");
            let line = cart.items.get_mut(product_id).ok_or_else(|| {
                StoreError::invalid_state(
                    "cart",
                    format!("product {product_id} is not in the cart"),
                )
            })?;
            line.quantity = quantity as u32;
            cart.clone()
        };
        self.after_mutation(db, &snapshot, false)?;
        Ok(snapshot)
    }

    /// Empty the cart and delete the server copy.
    pub fn clear(&self, db: &DbState) -> Result<Cart, StoreError> {
        let snapshot = {
            let mut cart = self.cart.lock().expect("cart lock");
            cart.items.clear();
            cart.clone()
        };
        self.after_mutation(db, &snapshot, true)?;
        Ok(snapshot)
    }

    /// Empty the cart locally only. Used on logout, where the server copy
    /// must survive for the next login on another device.
    pub fn clear_local(&self, db: &DbState) -> Result<(), StoreError> {
        {
            let mut cart = self.cart.lock().expect("cart lock");
            cart.items.clear();
        }
        persist_snapshot(db, &Cart::new())
    }

    /// Replace the cart contents without issuing a server write. Used by
    /// the login reconcile, which decides separately whether to push.
    pub fn adopt(&self, db: &DbState, merged: &Cart) -> Result<(), StoreError> {
        {
            let mut cart = self.cart.lock().expect("cart lock");
            *cart = merged.clone();
        }
        persist_snapshot(db, merged)
    }

    fn after_mutation(
        &self,
        db: &DbState,
        snapshot: &Cart,
        is_clear: bool,
    ) -> Result<(), StoreError> {
        persist_snapshot(db, snapshot)?;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cmd = if is_clear {
            WriteCmd::Delete { generation }
        } else {
            WriteCmd::Replace {
                generation,
                lines: snapshot.to_wire_lines(),
            }
        };
        self.enqueue(cmd);
        Ok(())
    }

    fn enqueue(&self, cmd: WriteCmd) {
        let writer = self.writer.lock().expect("writer lock");
        match writer.as_ref() {
            Some(tx) => {
                if tx.send(cmd).is_err() {
                    warn!("cart write queue is gone; server copy will lag until next login");
                }
            }
            // Anonymous/offline session: local persistence only.
            None => debug!("no cart writer attached, keeping mutation local"),
        }
    }

    fn attach_writer(&self, tx: mpsc::UnboundedSender<WriteCmd>) {
        *self.writer.lock().expect("writer lock") = Some(tx);
    }

    pub(crate) fn detach_writer(&self) {
        *self.writer.lock().expect("writer lock") = None;
    }

    /// Wait until every write issued so far has been applied or dropped.
    /// Called before logout so a committed customer action is never lost.
    pub async fn flush(&self) {
        let rx = {
            let writer = self.writer.lock().expect("writer lock");
            match writer.as_ref() {
                Some(tx) => {
                    let (ack, rx) = oneshot::channel();
                    if tx.send(WriteCmd::Flush(ack)).is_err() {
                        return;
                    }
                    rx
                }
                None => return,
            }
        };
        // A dropped ack means the queue stopped; nothing left to wait for.
        let _ = rx.await;
    }
}

// ---------------------------------------------------------------------------
// Local snapshot persistence
// ---------------------------------------------------------------------------

fn persist_snapshot(db: &DbState, cart: &Cart) -> Result<(), StoreError> {
    let conn = db.conn.lock().map_err(|e| StoreError::Storage(e.to_string()))?;
    conn.execute_batch("BEGIN IMMEDIATE")?;
    let result = (|| -> Result<(), StoreError> {
        conn.execute("DELETE FROM cart_items", [])?;
        for (product_id, line) in &cart.items {
            conn.execute(
                "INSERT INTO cart_items (product_id, name, quantity, unit_price)
                 VALUES (?1, ?2, ?3, ?4)",
                params![product_id, line.name, line.quantity, line.unit_price_snapshot],
            )?;
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

fn load_snapshot(db: &DbState) -> Result<Cart, StoreError> {
    let conn = db.conn.lock().map_err(|e| StoreError::Storage(e.to_string()))?;
    let mut stmt =
        conn.prepare("SELECT product_id, name, quantity, unit_price FROM cart_items")?;
    let items = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                CartLine {
                    name: row.get(1)?,
                    quantity: row.get(2)?,
                    unit_price_snapshot: row.get(3)?,
                },
            ))
        })?
        .collect::<Result<BTreeMap<_, _>, _>>()?;
    Ok(Cart { items })
}

// ---------------------------------------------------------------------------
// Login reconcile
// ---------------------------------------------------------------------------

/// Run the reconcile protocol against the server copy at authentication.
/// When the local cart wins, its snapshot is pushed through the write queue
/// so both sides converge.
pub async fn sync_on_login(ctx: &AppContext) -> Result<Cart, StoreError> {
    let session = ctx.auth.require_session()?;
    let server = cart_from_wire(ctx.api.fetch_cart(&session.token).await?);
    let local = ctx.cart.snapshot();
    let merged = reconcile(&local, &server);
    ctx.cart.adopt(&ctx.db, &merged)?;

    if !local.is_empty() && merged != server {
        ctx.cart.after_mutation(&ctx.db, &merged, false)?;
    }
    info!(
        lines = merged.items.len(),
        source = if local.is_empty() { "server" } else { "local" },
        "cart reconciled at login"
    );
    Ok(merged)
}

// ---------------------------------------------------------------------------
// Write queue
// ---------------------------------------------------------------------------

/// Transport the queue writes through; factored out so the queue logic can
/// be exercised without a live backend.
pub(crate) trait CartTransport: Send + Sync + 'static {
    fn replace(
        &self,
        lines: Vec<WireCartLine>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
    fn delete(&self) -> impl Future<Output = Result<(), StoreError>> + Send;
}

struct ApiTransport {
    ctx: Arc<AppContext>,
}

impl CartTransport for ApiTransport {
    fn replace(
        &self,
        lines: Vec<WireCartLine>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        async move {
            let session = self.ctx.auth.require_session()?;
            self.ctx.api.replace_cart(&session.token, &lines).await
        }
    }

    fn delete(&self) -> impl Future<Output = Result<(), StoreError>> + Send {
        async move {
            let session = self.ctx.auth.require_session()?;
            self.ctx.api.delete_cart(&session.token).await
        }
    }
}

/// Start the per-session write queue worker. Returns the token that stops
/// it; cancel only after `flush` so no committed mutation is lost.
pub fn start_write_queue(ctx: &Arc<AppContext>) -> CancellationToken {
    let (tx, rx) = mpsc::unbounded_channel();
    ctx.cart.attach_writer(tx);
    let cancel = CancellationToken::new();
    let transport = ApiTransport { ctx: ctx.clone() };
    tokio::spawn(run_write_queue(
        rx,
        ctx.cart.generation.clone(),
        transport,
        cancel.clone(),
    ));
    cancel
}

async fn apply<T: CartTransport>(transport: &T, cmd: &WriteCmd) -> Result<(), StoreError> {
    match cmd {
        WriteCmd::Replace { lines, .. } => transport.replace(lines.clone()).await,
        WriteCmd::Delete { .. } => transport.delete().await,
        WriteCmd::Flush(_) => Ok(()),
    }
}

async fn run_write_queue<T: CartTransport>(
    mut rx: mpsc::UnboundedReceiver<WriteCmd>,
    latest: Arc<AtomicU64>,
    transport: T,
    cancel: CancellationToken,
) {
    info!("cart write queue started");
    let mut pending_acks: Vec<oneshot::Sender<()>> = Vec::new();

    'outer: loop {
        let cmd = tokio::select! {
            _ = cancel.cancelled() => break,
            cmd = rx.recv() => match cmd {
                Some(c) => c,
                None => break,
            },
        };
        let mut write = match cmd {
            WriteCmd::Flush(ack) => {
                let _ = ack.send(());
                continue;
            }
            w => w,
        };

        let mut delay = Duration::from_millis(DEFAULT_RETRY_DELAY_MS);
        loop {
            // Coalesce: of everything queued right now, only the newest
            // snapshot matters (full-replace, last-write-wins).
            while let Ok(next) = rx.try_recv() {
                match next {
                    WriteCmd::Flush(ack) => pending_acks.push(ack),
                    w => {
                        if w.generation() >= write.generation() {
                            write = w;
                        }
                    }
                }
            }
            // A newer mutation is recorded but its snapshot has not arrived
            // yet; wait for it rather than sending a stale one.
            if write.generation() < latest.load(Ordering::SeqCst) {
                continue 'outer;
            }

            match apply(&transport, &write).await {
                Ok(()) => {
                    debug!(
                        generation = write.generation(),
                        "cart snapshot applied to server"
                    );
                    for ack in pending_acks.drain(..) {
                        let _ = ack.send(());
                    }
                    continue 'outer;
                }
                Err(e) if e.is_retryable() => {
                    warn!(
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "cart write failed, will retry"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => break 'outer,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    delay = (delay * 2).min(Duration::from_millis(MAX_RETRY_DELAY_MS));
                }
                Err(e) => {
                    // Validation/auth rejections cannot succeed on retry.
                    warn!(error = %e, "cart write rejected by backend, dropping snapshot");
                    for ack in pending_acks.drain(..) {
                        let _ = ack.send(());
                    }
                    continue 'outer;
                }
            }
        }
    }
    info!("cart write queue stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::db_state;
    use std::sync::atomic::AtomicUsize;

    fn line(name: &str, qty: u32, price: f64) -> CartLine {
        CartLine {
            name: name.into(),
            quantity: qty,
            unit_price_snapshot: price,
        }
    }

    fn cart_of(entries: &[(&str, u32, f64)]) -> Cart {
        Cart {
            items: entries
                .iter()
                .map(|(id, qty, price)| (id.to_string(), line(id, *qty, *price)))
                .collect(),
        }
    }

    // -- reconcile protocol -------------------------------------------------

    #[test]
    fn empty_local_adopts_server() {
        let server = cart_of(&[("p1", 2, 3.0)]);
        assert_eq!(reconcile(&Cart::new(), &server), server);
    }

    #[test]
    fn non_empty_local_wins_over_any_server_cart() {
        let local = cart_of(&[("p1", 1, 2.0)]);
        let server = cart_of(&[("p2", 5, 9.0)]);
        assert_eq!(reconcile(&local, &server), local);
        assert_eq!(reconcile(&local, &Cart::new()), local);
    }

    // -- mutations ----------------------------------------------------------

    #[test]
    fn zero_quantity_is_rejected_not_clamped() {
        let db = db_state();
        let state = CartState::new();
        state.add(&db, "p1", "Beans", 2.0).unwrap();

        for bad in [0, -3] {
            let err = state.set_quantity(&db, "p1", bad).unwrap_err();
            assert!(
                matches!(err, StoreError::InvalidQuantity { quantity, .. } if quantity == bad)
            );
        }
        // The failed mutation must not have touched the cart.
        assert_eq!(state.snapshot().items["p1"].quantity, 1);

        state.remove(&db, "p1").unwrap();
        assert!(state.snapshot().is_empty());
    }

    #[test]
    fn set_quantity_requires_the_product_in_cart() {
        let db = db_state();
        let state = CartState::new();
        let err = state.set_quantity(&db, "ghost", 2).unwrap_err();
        assert!(matches!(err, StoreError::InvalidState { .. }));
    }

    #[test]
    fn add_accumulates_and_total_follows() {
        let db = db_state();
        let state = CartState::new();
        state.add(&db, "p1", "Beans", 2.5).unwrap();
        state.add(&db, "p1", "Beans", 2.5).unwrap();
        state.add(&db, "p2", "Rice", 1.0).unwrap();
        let cart = state.snapshot();
        assert_eq!(cart.items["p1"].quantity, 2);
        assert!((cart.total() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn snapshot_survives_restart() {
        let db = db_state();
        let state = CartState::new();
        state.add(&db, "p1", "Beans", 2.5).unwrap();
        state.set_quantity(&db, "p1", 4).unwrap();

        let restored = CartState::restore(&db).unwrap();
        assert_eq!(restored.snapshot(), state.snapshot());
    }

    #[test]
    fn wire_round_trip_drops_zero_quantity_lines() {
        let cart = cart_of(&[("p1", 2, 3.0)]);
        let mut wire = cart.to_wire_lines();
        wire.push(WireCartLine {
            product: "ghost".into(),
            name: "ghost".into(),
            quantity: 0,
            unit_price: 1.0,
        });
        assert_eq!(cart_from_wire(wire), cart);
    }

    // -- write queue --------------------------------------------------------

    #[derive(Debug, Clone, PartialEq)]
    enum Applied {
        Replace(Vec<WireCartLine>),
        Delete,
    }

    struct MockTransport {
        log: Arc<Mutex<Vec<Applied>>>,
        fail_first: Arc<AtomicUsize>,
    }

    impl CartTransport for MockTransport {
        fn replace(
            &self,
            lines: Vec<WireCartLine>,
        ) -> impl Future<Output = Result<(), StoreError>> + Send {
            let log = self.log.clone();
            let fail_first = self.fail_first.clone();
            async move {
                if fail_first
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
                {
                    return Err(StoreError::NetworkFailure("mock outage".into()));
                }
                log.lock().expect("log lock").push(Applied::Replace(lines));
                Ok(())
            }
        }

        fn delete(&self) -> impl Future<Output = Result<(), StoreError>> + Send {
            let log = self.log.clone();
            async move {
                log.lock().expect("log lock").push(Applied::Delete);
                Ok(())
            }
        }
    }

    fn spawn_mock_queue(
        state: &CartState,
        failures: usize,
    ) -> (Arc<Mutex<Vec<Applied>>>, CancellationToken) {
        let (tx, rx) = mpsc::unbounded_channel();
        state.attach_writer(tx);
        let log = Arc::new(Mutex::new(Vec::new()));
        let transport = MockTransport {
            log: log.clone(),
            fail_first: Arc::new(AtomicUsize::new(failures)),
        };
        let cancel = CancellationToken::new();
        tokio::spawn(run_write_queue(
            rx,
            state.generation.clone(),
            transport,
            cancel.clone(),
        ));
        (log, cancel)
    }

    #[tokio::test]
    async fn queue_applies_the_final_snapshot_in_order() {
        let db = db_state();
        let state = CartState::new();
        let (log, cancel) = spawn_mock_queue(&state, 0);

        state.add(&db, "p1", "Beans", 2.0).unwrap();
        state.add(&db, "p2", "Rice", 1.0).unwrap();
        state.set_quantity(&db, "p2", 7).unwrap();
        state.flush().await;

        let applied = log.lock().expect("log lock").clone();
        assert!(!applied.is_empty());
        // Coalescing may skip intermediate snapshots but the last applied
        // write must be the final cart.
        let expected = state.snapshot().to_wire_lines();
        assert_eq!(applied.last(), Some(&Applied::Replace(expected)));
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn queue_retries_transient_failures_with_backoff() {
        let db = db_state();
        let state = CartState::new();
        let (log, cancel) = spawn_mock_queue(&state, 2);

        state.add(&db, "p1", "Beans", 2.0).unwrap();
        state.flush().await;

        let applied = log.lock().expect("log lock").clone();
        assert_eq!(
            applied,
            vec![Applied::Replace(state.snapshot().to_wire_lines())],
            "write must land after the outage clears"
        );
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn slow_earlier_write_cannot_clobber_a_later_one() {
        let db = db_state();
        let state = CartState::new();
        // First attempt fails; while the queue is backing off, a newer
        // mutation arrives. Only the newer snapshot may reach the server.
        let (log, cancel) = spawn_mock_queue(&state, 1);

        state.add(&db, "p1", "Beans", 2.0).unwrap();
        state.add(&db, "p2", "Rice", 1.0).unwrap();
        state.flush().await;

        let applied = log.lock().expect("log lock").clone();
        let expected = state.snapshot().to_wire_lines();
        assert_eq!(applied, vec![Applied::Replace(expected)]);
        cancel.cancel();
    }

    #[tokio::test]
    async fn clear_reaches_the_server_as_a_delete() {
        let db = db_state();
        let state = CartState::new();
        let (log, cancel) = spawn_mock_queue(&state, 0);

        state.add(&db, "p1", "Beans", 2.0).unwrap();
        state.clear(&db).unwrap();
        state.flush().await;

        let applied = log.lock().expect("log lock").clone();
        assert_eq!(applied.last(), Some(&Applied::Delete));
        assert!(state.snapshot().is_empty());
        cancel.cancel();
    }

    #[test]
    fn clear_local_keeps_no_writer_requirement() {
        let db = db_state();
        let state = CartState::new();
        state.add(&db, "p1", "Beans", 2.0).unwrap();
        state.clear_local(&db).unwrap();
        assert!(state.snapshot().is_empty());
        assert!(load_snapshot(&db).unwrap().is_empty());
    }
}
