//! Session lifecycle: login, logout, and startup rehydration.
//!
//! Authentication itself is backend-owned; this module keeps the issued
//! bearer token in the OS credential store and the user profile in the
//! local settings table, so a restarted terminal resumes its session
//! without asking the user again. Token claims are decoded locally only to
//! detect expiry early; the backend remains authoritative.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use zeroize::Zeroize;

use crate::error::StoreError;
use crate::roles::Role;
use crate::{cart, db, storage, till, AppContext};

const SETTING_CATEGORY: &str = "session";
const SETTING_PROFILE: &str = "profile";

/// Upper bound on waiting for queued cart writes during logout. A backend
/// outage must not pin the user to the session screen.
const LOGOUT_FLUSH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub profile: UserProfile,
    pub logged_in_at: DateTime<Utc>,
}

/// The current session, if any. One per `AppContext`.
pub struct AuthState {
    session: Mutex<Option<Session>>,
}

impl Default for AuthState {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthState {
    pub fn new() -> Self {
        Self {
            session: Mutex::new(None),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.lock().expect("session lock").is_some()
    }

    pub fn current_profile(&self) -> Option<UserProfile> {
        self.session
            .lock()
            .expect("session lock")
            .as_ref()
            .map(|s| s.profile.clone())
    }

    pub fn current_role(&self) -> Option<Role> {
        self.current_profile().map(|p| p.role)
    }

    /// The session, or `Forbidden` for callers that require one.
    pub fn require_session(&self) -> Result<Session, StoreError> {
        self.session
            .lock()
            .expect("session lock")
            .clone()
            .ok_or(StoreError::Forbidden {
                role: None,
                action: "this operation requires an authenticated session".into(),
            })
    }

    fn set_session(&self, session: Session) {
        *self.session.lock().expect("session lock") = Some(session);
    }

    fn take_session(&self) -> Option<Session> {
        self.session.lock().expect("session lock").take()
    }
}

// ---------------------------------------------------------------------------
// Token claims
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TokenClaims {
    /// Expiry as unix seconds.
    pub exp: Option<i64>,
    /// Role claim; advisory, the stored profile wins.
    pub rol: Option<String>,
}

/// Decode the payload segment of a JWT without verifying the signature.
/// Verification is the backend's job; this side only wants `exp` and `rol`.
pub(crate) fn decode_token_claims(token: &str) -> Option<TokenClaims> {
    let payload = token.split('.').nth(1)?;
    let decoded = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&decoded).ok()
}

pub(crate) fn token_expired(claims: &TokenClaims, now: DateTime<Utc>) -> bool {
    match claims.exp.and_then(|s| Utc.timestamp_opt(s, 0).single()) {
        Some(expires_at) => expires_at <= now,
        // No expiry claim: trust the backend to reject a dead token.
        None => false,
    }
}

// ---------------------------------------------------------------------------
// Login / logout / rehydrate
// ---------------------------------------------------------------------------

fn parse_login_response(value: &Value) -> Result<(String, UserProfile), StoreError> {
    let token = value
        .get("token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| StoreError::InvalidPayload("login response carried no token".into()))?;
    let profile: UserProfile = serde_json::from_value(
        value
            .get("user")
            .cloned()
            .ok_or_else(|| StoreError::InvalidPayload("login response carried no user".into()))?,
    )
    .map_err(|e| StoreError::InvalidPayload(format!("unexpected user shape: {e}")))?;
    Ok((token.to_string(), profile))
}

/// Authenticate against the backend and bring the session up: persist the
/// token and profile, start the cart write queue, reconcile the cart, and
/// resume any till closeouts left pending by a previous crash.
pub async fn login(
    ctx: &Arc<AppContext>,
    email: &str,
    password: &str,
) -> Result<UserProfile, StoreError> {
    let response = ctx.api.login(email, password).await?;
    let (token, profile) = parse_login_response(&response)?;

    if let Some(claims) = decode_token_claims(&token) {
        if let Some(claim_role) = claims.rol.as_deref() {
            if Role::from_str(claim_role).ok() != Some(profile.role) {
                warn!(
                    claim_role,
                    profile_role = %profile.role,
                    "token role claim disagrees with profile, keeping profile"
                );
            }
        }
    }

    storage::set_token(&token).map_err(StoreError::Storage)?;
    {
        let conn = ctx.db.conn.lock().map_err(|e| StoreError::Storage(e.to_string()))?;
        db::set_setting(
            &conn,
            SETTING_CATEGORY,
            SETTING_PROFILE,
            &serde_json::to_string(&profile)?,
        )
        .map_err(StoreError::Storage)?;
    }
    ctx.auth.set_session(Session {
        token,
        profile: profile.clone(),
        logged_in_at: Utc::now(),
    });

    start_session_services(ctx).await;

    info!(user = %profile.id, role = %profile.role, "login complete");
    Ok(profile)
}

/// Start the per-session background pieces and run the login-time sync
/// steps. Failures here are logged, not fatal: the session is already up
/// and every path retries or surfaces on next use.
async fn start_session_services(ctx: &Arc<AppContext>) {
    let queue = cart::start_write_queue(ctx);
    if let Some(old) = ctx
        .cart_queue
        .lock()
        .expect("cart queue lock")
        .replace(queue)
    {
        old.cancel();
    }

    if let Err(e) = cart::sync_on_login(ctx).await {
        warn!(error = %e, "cart reconcile failed, keeping local copy");
    }

    if ctx.auth.current_role() == Some(Role::Cashier) {
        match till::resume_pending_closeouts(ctx).await {
            Ok(0) => {}
            Ok(healed) => info!(healed, "pending till closeouts healed at login"),
            Err(e) => warn!(error = %e, "could not resume pending till closeouts"),
        }
    }
}

/// Tear the session down: flush the cart queue, invalidate server-side
/// (best effort), and scrub every client-side trace of the credentials.
pub async fn logout(ctx: &Arc<AppContext>) -> Result<(), StoreError> {
    // An in-flight cart save must complete before the writer goes away.
    if tokio::time::timeout(LOGOUT_FLUSH_TIMEOUT, ctx.cart.flush())
        .await
        .is_err()
    {
        warn!("cart flush timed out at logout; server copy may lag behind");
    }
    if let Some(queue) = ctx.cart_queue.lock().expect("cart queue lock").take() {
        queue.cancel();
    }
    ctx.cart.detach_writer();

    let session = ctx.auth.take_session();
    if let Some(session) = &session {
        if let Err(e) = ctx.api.logout(&session.token).await {
            // Local teardown proceeds regardless; the token expires anyway.
            warn!(error = %e, "server-side logout failed");
        }
    }

    ctx.cart.clear_local(&ctx.db)?;
    {
        let conn = ctx.db.conn.lock().map_err(|e| StoreError::Storage(e.to_string()))?;
        db::delete_setting(&conn, SETTING_CATEGORY, SETTING_PROFILE)
            .map_err(StoreError::Storage)?;
    }
    storage::delete_token().map_err(StoreError::Storage)?;
    if let Some(mut session) = session {
        session.token.zeroize();
    }

    info!("logout complete");
    Ok(())
}

/// Restore the persisted session at startup. Returns `None` (after
/// scrubbing) when nothing is stored or the token has expired.
pub fn rehydrate(ctx: &AppContext) -> Result<Option<UserProfile>, StoreError> {
    let Some(mut token) = storage::get_token() else {
        return Ok(None);
    };

    let profile_json = {
        let conn = ctx.db.conn.lock().map_err(|e| StoreError::Storage(e.to_string()))?;
        db::get_setting(&conn, SETTING_CATEGORY, SETTING_PROFILE)
    };
    let Some(profile_json) = profile_json else {
        // Token without profile is half a session; scrub it.
        storage::delete_token().map_err(StoreError::Storage)?;
        token.zeroize();
        return Ok(None);
    };

    if let Some(claims) = decode_token_claims(&token) {
        if token_expired(&claims, Utc::now()) {
            info!("stored token expired, clearing session");
            storage::delete_token().map_err(StoreError::Storage)?;
            let conn = ctx.db.conn.lock().map_err(|e| StoreError::Storage(e.to_string()))?;
            db::delete_setting(&conn, SETTING_CATEGORY, SETTING_PROFILE)
                .map_err(StoreError::Storage)?;
            token.zeroize();
            return Ok(None);
        }
    }

    let profile: UserProfile = serde_json::from_str(&profile_json)?;
    ctx.auth.set_session(Session {
        token,
        profile: profile.clone(),
        logged_in_at: Utc::now(),
    });
    info!(user = %profile.id, role = %profile.role, "session rehydrated");
    Ok(Some(profile))
}
