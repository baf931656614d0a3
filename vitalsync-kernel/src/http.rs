/**
 * API REST VITALSYNC - Présentation HTTP d'une surface
 *
 * RÔLE :
 * Expose l'état local de la surface (montre ou compagnon) et chaque intention
 * utilisateur : sommeil, anomalie, annulation d'urgence, analyse, contacts.
 *
 * FONCTIONNEMENT :
 * - Serveur Axum, réponses JSON
 * - Erreurs surface -> 409 (mauvais mode / analyse en cours), 422 (historique court)
 * - Contacts : 400 si nom ou numéro vide ou absent, 404 à la suppression d'un id inconnu
 * - Toute erreur : corps { "error": "..." }
 *
 * SÉCURITÉ :
 * - Si VITALSYNC_API_KEY est défini, header x-api-key obligatoire sauf /health
 */

use crate::analysis::AnalysisGateway;
use crate::contacts::NewContact;
use crate::health::{HealthTracker, KernelHealth};
use crate::models::{EmergencyContact, HealthAnalysis, VitalsReading};
use crate::state::SurfaceSnapshot;
use crate::surface::{SharedSurface, SurfaceError};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const API_KEY_ENV: &str = "VITALSYNC_API_KEY";

#[derive(Clone)]
pub struct AppState {
    pub surface: SharedSurface,
    pub gateway: Arc<AnalysisGateway>,
    pub health_tracker: HealthTracker,
    pub api_key: Option<String>,
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }
}

impl From<SurfaceError> for ApiError {
    fn from(e: SurfaceError) -> Self {
        let status = match e {
            SurfaceError::NotEnoughHistory { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            SurfaceError::AnalysisInFlight | SurfaceError::NotWearable => StatusCode::CONFLICT,
        };
        Self::new(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

async fn require_api_key(State(app): State<AppState>, req: Request, next: Next) -> Result<Response, ApiError> {
    let Some(expected) = app.api_key.as_deref() else {
        return Ok(next.run(req).await);
    };
    if req.uri().path() == "/health" {
        return Ok(next.run(req).await);
    }

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false);

    if !ok {
        tracing::warn!(path = %req.uri().path(), "[http] unauthorized request");
        return Err(ApiError::new(StatusCode::UNAUTHORIZED, "missing or invalid x-api-key"));
    }
    Ok(next.run(req).await)
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/surface", get(get_surface))
        .route("/vitals", get(get_vitals))
        .route("/vitals/history", get(get_history))
        .route("/emergency", get(get_emergency))
        .route("/emergency/cancel", post(cancel_emergency))
        .route("/wearable/sleep", post(toggle_sleep))
        .route("/wearable/anomaly", post(force_anomaly))
        .route("/analysis", get(get_analysis).post(trigger_analysis))
        .route("/contacts", get(list_contacts).post(add_contact))
        .route("/contacts/{id}", delete(remove_contact))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_api_key))
        .with_state(app_state)
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health_tracker.get_health(&app.surface))
}

// GET /surface (vue complète)
async fn get_surface(State(app): State<AppState>) -> Json<SurfaceSnapshot> {
    Json(app.surface.snapshot())
}

async fn get_vitals(State(app): State<AppState>) -> Json<VitalsReading> {
    Json(app.surface.current())
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    limit: Option<usize>,
}

// GET /vitals/history?limit=50 (les plus récents, ordre chronologique)
async fn get_history(
    State(app): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Json<Vec<VitalsReading>> {
    match params.limit {
        Some(n) => Json(app.surface.recent_history(n)),
        None => Json(app.surface.history()),
    }
}

#[derive(Debug, Serialize)]
struct EmergencyView {
    active: bool,
}

async fn get_emergency(State(app): State<AppState>) -> Json<EmergencyView> {
    Json(EmergencyView { active: app.surface.emergency_active() })
}

async fn cancel_emergency(State(app): State<AppState>) -> ApiResult<VitalsReading> {
    Ok(Json(app.surface.cancel_emergency()?))
}

async fn toggle_sleep(State(app): State<AppState>) -> ApiResult<VitalsReading> {
    Ok(Json(app.surface.toggle_sleep()?))
}

async fn force_anomaly(State(app): State<AppState>) -> ApiResult<VitalsReading> {
    Ok(Json(app.surface.force_anomaly()?))
}

async fn get_analysis(State(app): State<AppState>) -> ApiResult<HealthAnalysis> {
    app.surface
        .analysis()
        .map(Json)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "no analysis yet"))
}

// POST /analysis : attend la réponse du service (ou le placeholder)
async fn trigger_analysis(State(app): State<AppState>) -> ApiResult<HealthAnalysis> {
    Ok(Json(app.surface.trigger_analysis(&app.gateway).await?))
}

async fn list_contacts(State(app): State<AppState>) -> Json<Vec<EmergencyContact>> {
    Json(app.surface.contacts())
}

async fn add_contact(
    State(app): State<AppState>,
    body: Result<Json<NewContact>, JsonRejection>,
) -> Result<(StatusCode, Json<EmergencyContact>), ApiError> {
    // corps illisible ou champ manquant : même 400 qu'un champ vide
    let Json(new) = body.map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.body_text()))?;
    if new.display_name.trim().is_empty() || new.phone_number.trim().is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "displayName and phoneNumber are required"));
    }
    match app.surface.add_contact(new) {
        Some(contact) => Ok((StatusCode::CREATED, Json(contact))),
        None => Err(ApiError::new(StatusCode::CONFLICT, "contact id already exists")),
    }
}

async fn remove_contact(State(app): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    if app.surface.remove_contact(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::new(StatusCode::NOT_FOUND, format!("unknown contact {id}")))
    }
}
