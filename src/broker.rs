use chrono::{DateTime, Duration, Utc};

use crate::api::session as session_api;
use crate::db::DbPool;
use crate::models::kv::{self, Kv};
use crate::models::lead::LeadContext;
use crate::models::session::GenerationSession;
use crate::models::settings::Setting;

/// What a lookup by email rehydrated into.
#[derive(Debug, Clone, PartialEq)]
pub enum RestoredSession {
    /// A generated result exists; re-enter `Result` without regenerating.
    Full(LeadContext),
    /// Only upload data was stored; re-enter `Preview`.
    UploadOnly(LeadContext),
    /// Nothing stored; start fresh.
    None,
}

/// Build the upsert context from the open flow. The preview data URI stands
/// in as the uploaded-image reference; it round-trips through the session
/// store unchanged.
pub fn snapshot(session: &GenerationSession, now: DateTime<Utc>) -> LeadContext {
    let mut ctx = LeadContext {
        uploaded_image_url: session.preview_data_uri.clone(),
        gender: session.gender.clone(),
        pet_name: session.pet_name.clone(),
        timestamp: Some(now),
        ..LeadContext::default()
    };
    if let Some(result) = &session.result {
        ctx.image_id = Some(result.image_id.clone());
        ctx.preview_url = Some(result.preview_url.clone());
        ctx.quote = result.quote.clone();
    }
    ctx
}

/// Upsert the visitor's context against their email and refresh the local
/// resume pointer. Last write wins; concurrent tabs are not coordinated.
pub fn save_snapshot(
    pool: &DbPool,
    email: &str,
    session: &GenerationSession,
    now: DateTime<Utc>,
) -> Result<(), String> {
    let ctx = snapshot(session, now);
    session_api::upsert_lead(pool, email, &ctx).map_err(|e| e.to_string())?;
    Kv::set(pool, kv::LAST_SESSION_EMAIL, email)?;
    log::info!("[broker] session snapshot saved for {}", email);
    Ok(())
}

/// Look up a stored session. Result data older than the freshness window is
/// downgraded to upload-only: the derived display fields can no longer be
/// trusted, but the visitor's upload and options still can.
pub fn restore(pool: &DbPool, email: &str, now: DateTime<Utc>) -> RestoredSession {
    let lookup = match session_api::lookup(pool, email) {
        Ok(l) => l,
        Err(e) => {
            log::warn!("[broker] session lookup failed for {}: {}", email, e);
            return RestoredSession::None;
        }
    };

    if !lookup.has_session {
        return RestoredSession::None;
    }
    let ctx = match lookup.session {
        Some(c) => c,
        None => return RestoredSession::None,
    };

    let _ = Kv::set(pool, kv::LAST_SESSION_EMAIL, email);

    if ctx.has_result() {
        if is_fresh(pool, &ctx, now) {
            RestoredSession::Full(ctx)
        } else {
            log::info!("[broker] stored result for {} is stale, keeping upload only", email);
            RestoredSession::UploadOnly(ctx)
        }
    } else if ctx.uploaded_image_url.is_some() || ctx.pet_name.is_some() {
        RestoredSession::UploadOnly(ctx)
    } else {
        RestoredSession::None
    }
}

pub fn is_fresh(pool: &DbPool, ctx: &LeadContext, now: DateTime<Utc>) -> bool {
    let window = Duration::minutes(Setting::get_i64_or(pool, "broker_freshness_mins", 60));
    match ctx.timestamp {
        Some(ts) => now.signed_duration_since(ts) <= window,
        // Records written before timestamps existed are taken at face value.
        None => true,
    }
}

/// Email behind the "pick up where you left off" affordance, if any.
pub fn last_session_email(pool: &DbPool) -> Option<String> {
    Kv::get(pool, kv::LAST_SESSION_EMAIL)
}
