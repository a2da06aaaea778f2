//! Cancellation-aware order view polling.
//!
//! A screen that shows live orders spawns a poll for its scope and cancels
//! the returned token when it unmounts. Cancelling stops future refreshes
//! only; mutations in flight elsewhere (cart saves, till closeouts) run on
//! their own tasks and always complete. Refreshes are idempotent re-reads;
//! one that interleaves with a mutation may show stale data for at most one
//! cycle.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::roles::Role;
use crate::views::{build_view, OrderView, ViewFilter};
use crate::AppContext;

/// A live, cancellable order feed for one screen.
pub struct OrderFeed {
    /// Latest built view; `borrow()` is always the freshest successful read.
    pub views: watch::Receiver<Vec<OrderView>>,
    /// Cancel on unmount; pending refreshes stop, in-flight mutations don't.
    pub cancel: CancellationToken,
    pub task: JoinHandle<()>,
}

/// The backend scope parameter matching each role's view.
fn scope_param(role: Role) -> &'static str {
    match role {
        Role::Admin => "all",
        Role::Cashier => "pickup-ready",
        Role::Courier => "assigned",
        Role::Customer => "mine",
        Role::Supplier | Role::System => "none",
    }
}

/// Spawn a poll that refreshes the session's order view every `interval`.
///
/// The view is rebuilt through `build_view` on every refresh even though
/// the backend already scopes the response; scope enforcement on this side
/// must not depend on the server honoring the query parameter.
pub fn spawn_order_poll(
    ctx: Arc<AppContext>,
    filter: Option<ViewFilter>,
    interval: Duration,
) -> OrderFeed {
    let (tx, rx) = watch::channel(Vec::new());
    let cancel = CancellationToken::new();
    let loop_cancel = cancel.clone();

    let task = tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "order poll started");
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = loop_cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let Ok(session) = ctx.auth.require_session() else {
                debug!("order poll idle: no session");
                continue;
            };
            let profile = &session.profile;

            match ctx
                .api
                .fetch_orders(&session.token, scope_param(profile.role))
                .await
            {
                Ok(orders) => {
                    let views = build_view(&orders, profile.role, &profile.id, filter.as_ref());
                    // Receivers may all be gone while the screen rebuilds;
                    // keep polling, the next borrow sees fresh data.
                    let _ = tx.send(views);
                }
                // Keep the last good view; the next tick retries.
                Err(e) => warn!(error = %e, "order refresh failed, keeping last view"),
            }
        }
        info!("order poll stopped");
    });

    OrderFeed {
        views: rx,
        cancel,
        task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_ctx;

    #[tokio::test]
    async fn cancelling_the_feed_stops_the_poll() {
        let ctx = Arc::new(test_ctx());
        let feed = spawn_order_poll(ctx, None, Duration::from_millis(10));

        // No session: ticks are idle no-ops, the task must still honor
        // cancellation promptly.
        tokio::time::sleep(Duration::from_millis(30)).await;
        feed.cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), feed.task)
            .await
            .expect("poll task must stop after cancel")
            .expect("poll task must not panic");
    }

    #[test]
    fn every_role_maps_to_a_scope() {
        assert_eq!(scope_param(Role::Admin), "all");
        assert_eq!(scope_param(Role::Cashier), "pickup-ready");
        assert_eq!(scope_param(Role::Courier), "assigned");
        assert_eq!(scope_param(Role::Customer), "mine");
    }
}
