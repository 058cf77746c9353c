// API HTTP - Surface de présentation du noyau
//
// RÔLE :
// Exposer l'état réconcilié en snapshots lecture seule, recalculés à chaque
// requête, plus les opérations d'édition/commit de la configuration et la
// session. Aucune logique de réconciliation ici : la couche de présentation
// est un collaborateur externe du cœur.
//
// FONCTIONNEMENT :
// - Serveur Axum, routes /live, /alerts, /timing, /session, /system/health
// - Middleware session : tout est protégé sauf /health et /session/*
// - Gestion erreurs HTTP standardisée (401, 409, 422, 502)

use crate::engine::{self, CommitError};
use crate::health::HealthTracker;
use crate::models::{ConfigRecord, LightColor, Sample};
use crate::session::SessionContext;
use crate::signals::DerivedSignals;
use crate::state::DashboardState;
use crate::store::TrafficStore;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub struct AppState<S> {
    pub state: DashboardState,
    pub store: Arc<S>,
    pub session: SessionContext,
    pub health: HealthTracker,
}

// Clone manuel : S n'a pas besoin d'être Clone, seul l'Arc l'est
impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            store: self.store.clone(),
            session: self.session.clone(),
            health: self.health.clone(),
        }
    }
}

#[derive(serde::Serialize)]
struct LiveView {
    sample: Option<Sample>,
    healthy: bool,
    stale_for_seconds: Option<i64>,
    light: LightColor,
    congested: bool,
    tilt: bool,
}

fn to_live_view(state: &DashboardState) -> LiveView {
    let now = OffsetDateTime::now_utc();
    let live = state.live.lock();
    let signals = DerivedSignals::compute(live.current(), now);
    LiveView {
        healthy: signals.healthy,
        light: signals.light,
        congested: signals.congested,
        tilt: signals.tilt,
        stale_for_seconds: live
            .current()
            .map(|s| (now - s.created_at).whole_seconds().max(0)),
        sample: live.snapshot(),
    }
}

#[derive(serde::Serialize)]
struct TimingView {
    /// Valeurs d'affichage : éditions locales si présentes, sinon le distant
    green_ms: u32,
    yellow_ms: u32,
    dirty: bool,
    saving: bool,
    saved_at: Option<String>,
    /// Enregistrement actif résolu ("updated_at maximal gagne")
    active: Option<ConfigRecord>,
    /// Durées effectivement appliquées par l'installation (peuvent traîner
    /// derrière la configuration résolue)
    in_effect_green_ms: Option<u32>,
    in_effect_yellow_ms: Option<u32>,
}

fn to_timing_view(state: &DashboardState) -> TimingView {
    // ordre d'acquisition : live avant timing (voir state.rs)
    let (in_effect_green_ms, in_effect_yellow_ms) = {
        let live = state.live.lock();
        match live.current() {
            Some(s) => (s.cfg_green_ms, s.cfg_yellow_ms),
            None => (None, None),
        }
    };
    let timing = state.timing.lock();
    TimingView {
        green_ms: timing.green_ms(),
        yellow_ms: timing.yellow_ms(),
        dirty: timing.dirty(),
        saving: timing.saving(),
        saved_at: timing
            .saved_at()
            .and_then(|t| t.format(&Rfc3339).ok()),
        active: timing.active().cloned(),
        in_effect_green_ms,
        in_effect_yellow_ms,
    }
}

async fn require_session<S: TrafficStore>(
    State(app): State<AppState<S>>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let path = req.uri().path();

    // Health check et session toujours accessibles
    if path.starts_with("/health") || path.starts_with("/session") {
        return Ok(next.run(req).await);
    }

    if !app.session.signed_in() {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

pub fn build_router<S: TrafficStore>(app_state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health::<S>))
        .route("/live", get(get_live::<S>))
        .route("/alerts", get(get_alerts::<S>))
        .route("/timing", get(get_timing::<S>).post(edit_timing::<S>))
        .route("/timing/save", post(save_timing::<S>))
        .route("/session", get(get_session::<S>))
        .route("/session/login", post(login::<S>))
        .route("/session/logout", post(logout::<S>))
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            require_session::<S>,
        ))
        .with_state(app_state)
}

// GET /system/health (état infrastructure)
async fn get_system_health<S: TrafficStore>(
    State(app): State<AppState<S>>,
) -> Json<crate::health::KernelHealth> {
    Json(app.health.get_health(&app.state, OffsetDateTime::now_utc()))
}

// GET /live (échantillon courant + signaux dérivés)
async fn get_live<S: TrafficStore>(State(app): State<AppState<S>>) -> Json<LiveView> {
    Json(to_live_view(&app.state))
}

// GET /alerts (journal borné, du plus récent au plus ancien)
async fn get_alerts<S: TrafficStore>(State(app): State<AppState<S>>) -> Json<Vec<Sample>> {
    Json(app.state.alerts.lock().snapshot())
}

// GET /timing (configuration active + état d'édition)
async fn get_timing<S: TrafficStore>(State(app): State<AppState<S>>) -> Json<TimingView> {
    Json(to_timing_view(&app.state))
}

#[derive(Debug, Deserialize)]
struct TimingEdit {
    green_ms: Option<u32>,
    yellow_ms: Option<u32>,
}

// POST /timing (édition locale, validée aux bornes ; 422 si violation)
async fn edit_timing<S: TrafficStore>(
    State(app): State<AppState<S>>,
    Json(edit): Json<TimingEdit>,
) -> Result<Json<TimingView>, (StatusCode, Json<serde_json::Value>)> {
    {
        let mut timing = app.state.timing.lock();
        if let Some(green) = edit.green_ms {
            if let Err(e) = timing.set_green(green) {
                return Err((
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({ "error": e.to_string() })),
                ));
            }
        }
        if let Some(yellow) = edit.yellow_ms {
            if let Err(e) = timing.set_yellow(yellow) {
                return Err((
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({ "error": e.to_string() })),
                ));
            }
        }
    }
    Ok(Json(to_timing_view(&app.state)))
}

// POST /timing/save (commit append-only ; 409 si un commit est en vol)
async fn save_timing<S: TrafficStore>(
    State(app): State<AppState<S>>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    match engine::commit_timing(app.store.as_ref(), &app.state).await {
        Ok(record) => Ok(Json(json!({
            "ok": true,
            "id": record.id,
            "saved_at": record.updated_at.format(&Rfc3339).ok(),
        }))),
        Err(CommitError::SavingInProgress) => Err((
            StatusCode::CONFLICT,
            Json(json!({ "error": "a save is already in flight" })),
        )),
        Err(CommitError::Store(e)) => Err((
            StatusCode::BAD_GATEWAY,
            Json(json!({ "error": e.to_string() })),
        )),
    }
}

#[derive(Debug, Deserialize)]
struct LoginBody {
    username: String,
    password: String,
}

// POST /session/login
async fn login<S: TrafficStore>(
    State(app): State<AppState<S>>,
    Json(body): Json<LoginBody>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let username = body.username.trim();
    if username.is_empty() || body.password.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Username and password are required." })),
        ));
    }
    if !app.session.login(username, &body.password) {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Invalid credentials." })),
        ));
    }
    Ok(Json(json!({ "ok": true, "username": username })))
}

// POST /session/logout
async fn logout<S: TrafficStore>(State(app): State<AppState<S>>) -> Json<serde_json::Value> {
    app.session.logout();
    Json(json!({ "ok": true }))
}

// GET /session
async fn get_session<S: TrafficStore>(State(app): State<AppState<S>>) -> Json<serde_json::Value> {
    match app.session.current_user() {
        Some(user) => Json(json!({ "signed_in": true, "username": user.username })),
        None => Json(json!({ "signed_in": false })),
    }
}
