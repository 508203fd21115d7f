use std::sync::mpsc;
use std::thread;

use chrono::{DateTime, Duration, Utc};

use crate::api::generation::{self, GenerationRequest, GenerationResponse};
use crate::api::{checkout, ApiError};
use crate::broker::{self, RestoredSession};
use crate::compositor::Compositor;
use crate::db::DbPool;
use crate::images;
use crate::ledger::{self, PromoClickTracker};
use crate::models::creation::Creation;
use crate::models::kv::{self, Kv};
use crate::models::lead::{is_valid_email, LeadContext};
use crate::models::session::{GenerationOutcome, GenerationSession, Stage};
use crate::models::settings::Setting;

/// Shown while the portrait is being painted; rotated every five seconds.
pub const GENERATING_PHRASES: [&str; 8] = [
    "Studying the photo…",
    "Sketching those ears…",
    "Mixing the paints…",
    "Capturing that look…",
    "Working on the fur…",
    "Getting the eyes just right…",
    "Adding the final touches…",
    "Framing the portrait…",
];

/// Synthetic progress is a UX heuristic: the generation service exposes no
/// real progress events, so the value is a pure function of elapsed
/// wall-clock time. It never reaches 100 on its own; only the actual
/// success response does that.
pub fn synthetic_progress(elapsed_secs: f64) -> u8 {
    let pct = if elapsed_secs <= 0.0 {
        0.0
    } else if elapsed_secs < 5.0 {
        20.0 * elapsed_secs / 5.0
    } else if elapsed_secs < 40.0 {
        20.0 + 50.0 * (elapsed_secs - 5.0) / 35.0
    } else if elapsed_secs < 55.0 {
        70.0 + 20.0 * (elapsed_secs - 40.0) / 15.0
    } else if elapsed_secs < 75.0 {
        90.0 + 5.0 * (elapsed_secs - 55.0) / 20.0
    } else {
        95.0
    };
    pct.floor() as u8
}

/// One frame of the rotating-phrase display: the outgoing and incoming
/// strings plus the cross-fade position (1.0 = fully settled).
#[derive(Debug, Clone, PartialEq)]
pub struct PhraseFrame {
    pub previous: &'static str,
    pub current: &'static str,
    pub fade: f32,
}

pub fn phrase_frame(elapsed_secs: f64, rotation_secs: f64, fade_secs: f64) -> PhraseFrame {
    let n = GENERATING_PHRASES.len();
    let slot = (elapsed_secs / rotation_secs).floor().max(0.0) as usize;
    let current = GENERATING_PHRASES[slot % n];
    if slot == 0 {
        return PhraseFrame {
            previous: current,
            current,
            fade: 1.0,
        };
    }
    let previous = GENERATING_PHRASES[(slot - 1) % n];
    let within = elapsed_secs - slot as f64 * rotation_secs;
    let fade = if fade_secs > 0.0 {
        (within / fade_secs).clamp(0.0, 1.0) as f32
    } else {
        1.0
    };
    PhraseFrame {
        previous,
        current,
        fade,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Progress { pct: u8 },
    Phrase(PhraseFrame),
    Countdown { remaining_secs: i64 },
    GenerationSucceeded,
    GenerationFailed { message: String },
    SessionExpired,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutKind {
    /// One unwatermarked high-resolution image.
    Single,
    /// A bundle of watermarked-generation credits ("1-pack", "5-pack", …).
    Pack(String),
}

/// The generation flow state machine. All timers derive from the `now`
/// passed into [`Engine::tick`]; exiting a stage ends its timers with it.
pub struct Engine {
    pool: DbPool,
    session: GenerationSession,
    promo_clicks: PromoClickTracker,
    compositor: Option<Compositor>,
    pending: Option<mpsc::Receiver<Result<GenerationResponse, ApiError>>>,
    pending_request_id: Option<uuid::Uuid>,
    pending_uses_pack: bool,
    pending_is_retry: bool,
    last_countdown: Option<i64>,
}

impl Engine {
    pub fn new(pool: DbPool) -> Self {
        let compositor = match Compositor::from_settings(&pool) {
            Ok(c) => Some(c),
            Err(e) => {
                log::warn!("[engine] tribute compositor unavailable: {}", e);
                None
            }
        };
        Self {
            pool,
            session: GenerationSession::default(),
            promo_clicks: PromoClickTracker::default(),
            compositor,
            pending: None,
            pending_request_id: None,
            pending_uses_pack: false,
            pending_is_retry: false,
            last_countdown: None,
        }
    }

    /// Open the flow from an emailed resume link.
    pub fn open_with_email(pool: DbPool, email: &str, now: DateTime<Utc>) -> Self {
        let mut engine = Self::new(pool);
        engine.restore(email, now);
        engine
    }

    pub fn session(&self) -> &GenerationSession {
        &self.session
    }

    pub fn stage(&self) -> &Stage {
        &self.session.stage
    }

    // ── Photo selection & options ──────────────────────

    /// Validate and ingest a photo. Validation failures are inline and
    /// non-fatal: the session does not transition.
    pub fn select_photo(&mut self, file_bytes: &[u8], filename: &str) -> Result<(), String> {
        if matches!(self.session.stage, Stage::Generating { .. }) {
            return Err("A portrait is already being generated.".to_string());
        }
        if !images::is_allowed_type(&self.pool, filename) {
            return Err("That file type isn't supported — please choose a photo.".to_string());
        }
        if !images::check_file_size(&self.pool, file_bytes.len()) {
            return Err("That file is too large — please choose a smaller photo.".to_string());
        }

        let photo = images::process_upload(&self.pool, file_bytes)?;
        let preview = images::to_data_uri(&photo.bytes, photo.content_type);

        // A new photo starts a new flow; the captured email survives it.
        let email = self.session.email.take();
        self.session = GenerationSession {
            email,
            preview_data_uri: Some(preview),
            source: Some(photo),
            ..GenerationSession::default()
        };
        self.promo_clicks.reset();
        Ok(())
    }

    pub fn set_pet_name(&mut self, name: &str) {
        let name = name.trim();
        self.session.pet_name = (!name.is_empty()).then(|| name.to_string());
    }

    pub fn set_gender(&mut self, gender: &str) {
        self.session.gender = Some(gender.to_string());
    }

    pub fn set_style(&mut self, style: &str) {
        self.session.style = Some(style.to_string());
    }

    pub fn dismiss_error(&mut self) {
        self.session.error = None;
    }

    /// The hidden bonus gesture. Returns credits granted (usually zero).
    pub fn promo_click(&mut self) -> Result<i64, String> {
        self.promo_clicks.register_click(&self.pool)
    }

    // ── Generation ─────────────────────────────────────

    /// Gate-check the ledger and start a generation, or divert to email
    /// capture first on that product variant.
    pub fn submit(&mut self, now: DateTime<Utc>) -> Result<(), String> {
        match self.session.stage {
            Stage::Preview | Stage::EmailCapture => {}
            _ => return Err("Nothing to submit from this stage.".to_string()),
        }
        if self.pending.is_some() {
            return Err("A portrait is already being generated.".to_string());
        }
        if self.session.source.is_none() {
            return Err("Please choose a photo first.".to_string());
        }

        let verdict = ledger::can_generate(&self.pool);
        if !verdict.allowed {
            return Err(verdict
                .reason
                .unwrap_or_else(|| "No generations left.".to_string()));
        }

        if Setting::get_bool(&self.pool, "flow_email_before_generation")
            && self.session.email.is_none()
        {
            self.session.stage = Stage::EmailCapture;
            return Ok(());
        }

        self.begin_generation(now, verdict.has_pack_credits, false)
    }

    /// Capture an email address. From `EmailCapture` this resumes the
    /// pending submission; from `Email` it leaves the caller on that stage
    /// ready to check out.
    pub fn capture_email(&mut self, email: &str, now: DateTime<Utc>) -> Result<(), String> {
        if !is_valid_email(email) {
            return Err("That doesn't look like a valid email address.".to_string());
        }
        self.session.email = Some(email.trim().to_string());
        if let Err(e) = broker::save_snapshot(&self.pool, email.trim(), &self.session, now) {
            log::warn!("[engine] lead save failed: {}", e);
        }
        if self.session.stage == Stage::EmailCapture {
            let verdict = ledger::can_generate(&self.pool);
            if !verdict.allowed {
                self.session.stage = Stage::Preview;
                return Err(verdict
                    .reason
                    .unwrap_or_else(|| "No generations left.".to_string()));
            }
            return self.begin_generation(now, verdict.has_pack_credits, false);
        }
        Ok(())
    }

    /// The single complimentary retry: free allowance must not be exhausted
    /// and the retry flag unspent. Consumes one credit on success.
    pub fn retry(&mut self, now: DateTime<Utc>) -> Result<(), String> {
        if !matches!(self.session.stage, Stage::Result { .. }) {
            return Err("There is no result to retry.".to_string());
        }
        let state = crate::models::entitlement::EntitlementState::load(&self.pool);
        if state.free_retry_used {
            return Err("The complimentary retry has already been used.".to_string());
        }
        let verdict = ledger::can_generate(&self.pool);
        if !verdict.allowed {
            return Err(verdict
                .reason
                .unwrap_or_else(|| "No generations left.".to_string()));
        }
        self.begin_generation(now, verdict.has_pack_credits, true)
    }

    fn begin_generation(
        &mut self,
        now: DateTime<Utc>,
        use_pack: bool,
        is_retry: bool,
    ) -> Result<(), String> {
        let photo = self
            .session
            .source
            .clone()
            .ok_or_else(|| "Please choose a photo first.".to_string())?;

        let req = GenerationRequest {
            photo,
            gender: self.session.gender.clone(),
            pet_name: self.session.pet_name.clone(),
            style: self.session.style.clone(),
            use_pack_credit: use_pack,
            use_secret_credit: !use_pack && ledger::draws_on_bonus(&self.pool),
        };

        let (tx, rx) = mpsc::channel();
        let pool = self.pool.clone();
        thread::spawn(move || {
            let _ = tx.send(generation::generate(&pool, &req));
        });

        let request_id = uuid::Uuid::new_v4();
        self.pending = Some(rx);
        self.pending_request_id = Some(request_id);
        self.pending_uses_pack = use_pack;
        self.pending_is_retry = is_retry;
        self.session.error = None;
        self.session.result = None;
        self.session.stage = Stage::Generating { started_at: now };
        log::info!(
            "[engine] generation {} started (pack={}, retry={})",
            request_id,
            use_pack,
            is_retry
        );
        Ok(())
    }

    // ── Timers ─────────────────────────────────────────

    /// Advance every active timer to `now`. During `Generating` this polls
    /// the worker and reports progress/phrase frames; during `Result` it
    /// drives the countdown. Expiry fires exactly once: the transition to
    /// `Expired` removes the timer with the stage.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<EngineEvent> {
        match self.session.stage.clone() {
            Stage::Generating { started_at } => self.tick_generating(started_at, now),
            Stage::Result { expires_at } => self.tick_result(expires_at, now),
            _ => Vec::new(),
        }
    }

    fn tick_generating(&mut self, started_at: DateTime<Utc>, now: DateTime<Utc>) -> Vec<EngineEvent> {
        let polled = self.pending.as_ref().map(|rx| rx.try_recv());
        match polled {
            Some(Ok(Ok(resp))) => {
                self.pending = None;
                if let Some(id) = self.pending_request_id.take() {
                    log::info!("[engine] generation {} delivered {}", id, resp.image_id);
                }
                self.finish_generation(resp, now);
                return vec![EngineEvent::GenerationSucceeded];
            }
            Some(Ok(Err(e))) => {
                self.pending = None;
                let request_id = self.pending_request_id.take();
                let message = e.to_string();
                // No credit is consumed for a failed generation.
                self.session.stage = Stage::Preview;
                self.session.error = Some(message.clone());
                log::warn!(
                    "[engine] generation {:?} failed: {}",
                    request_id,
                    message
                );
                return vec![EngineEvent::GenerationFailed { message }];
            }
            Some(Err(mpsc::TryRecvError::Empty)) => {}
            Some(Err(mpsc::TryRecvError::Disconnected)) | None => {
                self.pending = None;
                self.pending_request_id = None;
                let message = "The generation worker went away.".to_string();
                self.session.stage = Stage::Preview;
                self.session.error = Some(message.clone());
                return vec![EngineEvent::GenerationFailed { message }];
            }
        }

        let elapsed = (now - started_at).num_milliseconds() as f64 / 1000.0;
        let rotation = Setting::get_i64_or(&self.pool, "flow_phrase_rotation_secs", 5) as f64;
        let fade = Setting::get_i64_or(&self.pool, "flow_phrase_fade_secs", 1) as f64;
        vec![
            EngineEvent::Progress {
                pct: synthetic_progress(elapsed),
            },
            EngineEvent::Phrase(phrase_frame(elapsed, rotation, fade)),
        ]
    }

    fn tick_result(&mut self, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Vec<EngineEvent> {
        let remaining = (expires_at - now).num_seconds();
        if remaining <= 0 {
            self.session.stage = Stage::Expired;
            self.last_countdown = None;
            log::info!("[engine] result window expired");
            return vec![EngineEvent::SessionExpired];
        }
        if self.last_countdown != Some(remaining) {
            self.last_countdown = Some(remaining);
            return vec![EngineEvent::Countdown {
                remaining_secs: remaining,
            }];
        }
        Vec::new()
    }

    fn result_window(&self) -> Duration {
        Duration::minutes(Setting::get_i64_or(&self.pool, "flow_result_window_mins", 15))
    }

    fn finish_generation(&mut self, resp: GenerationResponse, now: DateTime<Utc>) {
        // The credit is only consumed once the service actually delivered.
        let spend = if self.pending_uses_pack {
            ledger::use_pack_credit(&self.pool)
        } else {
            ledger::increment_generation(&self.pool, self.pending_is_retry)
        };
        if let Err(e) = spend {
            log::error!("[engine] failed to record credit spend: {}", e);
        }

        if let Err(e) = Creation::record(&self.pool, &resp.image_id, &resp.preview_url) {
            log::warn!("[engine] creation log write failed: {}", e);
        }

        let outcome = GenerationOutcome {
            image_id: resp.image_id.clone(),
            preview_url: resp.preview_url.clone(),
            hd_url: resp.hd_url.clone(),
            quote: resp.quote.clone(),
            pet_name: self.session.pet_name.clone(),
        };

        if self.session.pet_name.is_some() {
            self.composite_tribute(&outcome);
        }

        self.session.result = Some(outcome);
        self.session.stage = Stage::Result {
            expires_at: now + self.result_window(),
        };
        self.last_countdown = None;

        if let Some(email) = self.session.email.clone() {
            if let Err(e) = broker::save_snapshot(&self.pool, &email, &self.session, now) {
                log::warn!("[engine] session snapshot failed: {}", e);
            }
        }
    }

    /// Best effort: render the tribute overlay against the preview and HD
    /// assets and cache both. Any failure falls back to the plain image.
    fn composite_tribute(&mut self, outcome: &GenerationOutcome) {
        let compositor = match self.compositor.as_mut() {
            Some(c) => c,
            None => return,
        };
        let pet_name = match &outcome.pet_name {
            Some(n) => n.clone(),
            None => return,
        };
        let quote = outcome
            .quote
            .clone()
            .unwrap_or_else(|| "Forever in our hearts.".to_string());

        let mut variants = vec![("preview", outcome.preview_url.clone())];
        if let Some(hd) = &outcome.hd_url {
            variants.push(("hd", hd.clone()));
        }

        for (variant, url) in variants {
            let bytes = match crate::api::download::fetch_url(&self.pool, &url) {
                Ok(b) => b,
                Err(e) => {
                    log::warn!("[compositor] {} asset fetch failed: {}", variant, e);
                    continue;
                }
            };
            match compositor.render_tribute(&bytes, &pet_name, &quote) {
                Ok(composed) => {
                    if let Err(e) =
                        crate::compositor::cache_render(&self.pool, &outcome.image_id, variant, &composed.png)
                    {
                        log::warn!("[compositor] {} render cache failed: {}", variant, e);
                    }
                }
                Err(e) => {
                    // Fall back to the un-composited image; not surfaced.
                    log::warn!("[compositor] {} render failed: {}", variant, e);
                }
            }
        }
    }

    // ── Purchase ───────────────────────────────────────

    /// Move to the email-entry step of the purchase path.
    pub fn request_email_entry(&mut self) -> Result<(), String> {
        if !matches!(self.session.stage, Stage::Result { .. }) {
            return Err("There is no result to purchase.".to_string());
        }
        self.session.stage = Stage::Email;
        Ok(())
    }

    /// Create the checkout session and hand back the redirect URL. The
    /// result is stashed in the pending-image buffer so it survives the
    /// round-trip through the payment processor.
    pub fn purchase(
        &mut self,
        kind: CheckoutKind,
        cancel_url: &str,
        utm_data: Option<serde_json::Value>,
    ) -> Result<String, String> {
        match self.session.stage {
            Stage::Result { .. } | Stage::Email => {}
            _ => return Err("There is no result to purchase.".to_string()),
        }
        if url::Url::parse(cancel_url).is_err() {
            return Err("Invalid cancel URL.".to_string());
        }

        if let Some(result) = &self.session.result {
            let raw = serde_json::to_string(result).map_err(|e| e.to_string())?;
            Kv::set(&self.pool, kv::PENDING_IMAGE, &raw)?;
        }

        let (kind_str, pack_type) = match &kind {
            CheckoutKind::Single => ("single".to_string(), None),
            CheckoutKind::Pack(pack) => ("pack".to_string(), Some(pack.clone())),
        };

        let req = checkout::CheckoutRequest {
            image_id: self.session.result.as_ref().map(|r| r.image_id.clone()),
            email: self.session.email.clone(),
            kind: kind_str,
            pack_type,
            cancel_url: cancel_url.to_string(),
            utm_data,
        };

        match checkout::create_session(&self.pool, &req) {
            Ok(resp) => {
                self.session.stage = Stage::Checkout;
                Ok(resp.checkout_url)
            }
            Err(e) => {
                // Stay on the current stage so the visitor can retry without
                // losing the generated image.
                self.session.error = Some(e.to_string());
                Err(e.to_string())
            }
        }
    }

    /// Called from the post-payment success path: apply the entitlement and
    /// mark the creation, then clear the redirect buffer.
    pub fn confirm_purchase(&mut self, kind: CheckoutKind) -> Result<(), String> {
        match kind {
            CheckoutKind::Single => ledger::add_purchase(&self.pool)?,
            CheckoutKind::Pack(pack) => {
                ledger::add_pack_purchase(&self.pool, &pack)?;
            }
        }
        let image_id = self
            .session
            .result
            .as_ref()
            .map(|r| r.image_id.clone())
            .or_else(|| self.pending_image().map(|r| r.image_id));
        if let Some(id) = image_id {
            Creation::mark_purchased(&self.pool, &id)?;
        }
        Kv::delete(&self.pool, kv::PENDING_IMAGE)?;
        Ok(())
    }

    fn pending_image(&self) -> Option<GenerationOutcome> {
        let raw = Kv::get(&self.pool, kv::PENDING_IMAGE)?;
        serde_json::from_str(&raw).ok()
    }

    /// Re-enter `Result` from the checkout cancel URL using the pending
    /// image buffer, with a fresh countdown window.
    pub fn resume_from_checkout(&mut self, now: DateTime<Utc>) {
        match self.pending_image() {
            Some(result) => {
                self.session.result = Some(result);
                self.session.stage = Stage::Result {
                    expires_at: now + self.result_window(),
                };
                self.last_countdown = None;
            }
            None => {
                self.session.stage = Stage::Preview;
            }
        }
    }

    // ── Restore & reset ────────────────────────────────

    /// Rehydrate from the session collaborator. A stored result re-enters
    /// `Result` with a fresh window and no regeneration; upload-only data
    /// re-enters `Preview`; nothing found falls back to a fresh `Preview`.
    pub fn restore(&mut self, email: &str, now: DateTime<Utc>) {
        self.session = GenerationSession {
            stage: Stage::Restoring,
            email: Some(email.to_string()),
            ..GenerationSession::default()
        };

        match broker::restore(&self.pool, email, now) {
            RestoredSession::Full(ctx) => {
                self.apply_context(&ctx);
                self.session.result = Some(GenerationOutcome {
                    image_id: ctx.image_id.clone().unwrap_or_default(),
                    preview_url: ctx.preview_url.clone().unwrap_or_default(),
                    hd_url: None,
                    quote: ctx.quote.clone(),
                    pet_name: ctx.pet_name.clone(),
                });
                self.session.stage = Stage::Result {
                    expires_at: now + self.result_window(),
                };
                self.last_countdown = None;
                log::info!("[engine] restored full session for {}", email);
            }
            RestoredSession::UploadOnly(ctx) => {
                self.apply_context(&ctx);
                self.session.stage = Stage::Preview;
                log::info!("[engine] restored upload-only session for {}", email);
            }
            RestoredSession::None => {
                self.session.stage = Stage::Preview;
            }
        }
    }

    fn apply_context(&mut self, ctx: &LeadContext) {
        self.session.preview_data_uri = ctx.uploaded_image_url.clone();
        self.session.pet_name = ctx.pet_name.clone();
        self.session.gender = ctx.gender.clone();
    }

    /// Full reset back to a fresh `Preview` with a new upload. The only way
    /// out of `Expired`.
    pub fn reset(&mut self) {
        self.pending = None;
        self.pending_request_id = None;
        self.last_countdown = None;
        self.session = GenerationSession::default();
    }
}
