use axum::{
    extract::{Path, Query, State},
    response::Json,
    Extension,
};
use tracing::info;
use uuid::Uuid;

use shared_models::auth::{User, ROLE_ADMIN, ROLE_DOCTOR, ROLE_SERVICE};
use shared_models::error::AppError;
use shared_utils::extractor::{require_any_role, require_role};

use crate::models::{
    Appointment, BusinessDate, CompletionOutcome, DateQuery, SetCurrentRequest, TokenCounterView, TokenDisplay,
};
use crate::state::TokenQueueState;

fn resolve_date(state: &TokenQueueState, query: &DateQuery) -> Result<BusinessDate, AppError> {
    match query.date.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        Some(raw) => Ok(BusinessDate::parse(raw)?),
        None => Ok(state.board.today()),
    }
}

fn caller_id(user: &User) -> Result<Uuid, AppError> {
    Uuid::parse_str(&user.id).map_err(|_| AppError::BadRequest("Invalid user ID format".to_string()))
}

// ==============================================================================
// DISPLAY
// ==============================================================================

/// "Now serving" board for patients and kiosks.
pub async fn get_token_display(
    State(state): State<TokenQueueState>,
    Extension(_user): Extension<User>,
    Query(query): Query<DateQuery>,
) -> Result<Json<TokenDisplay>, AppError> {
    let date = resolve_date(&state, &query)?;
    Ok(Json(state.board.display(date).await?))
}

// ==============================================================================
// APPOINTMENT LIFECYCLE
// ==============================================================================

/// Called by the payment collaborator once the gateway signature checks out.
pub async fn confirm_payment(
    State(state): State<TokenQueueState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Appointment>, AppError> {
    require_any_role(&user, &[ROLE_ADMIN, ROLE_SERVICE])?;
    info!("Payment confirmation for appointment {} from {}", appointment_id, user.id);

    Ok(Json(state.issuer.confirm_payment(appointment_id).await?))
}

pub async fn cancel_appointment(
    State(state): State<TokenQueueState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Appointment>, AppError> {
    Ok(Json(state.lifecycle.cancel(&user, appointment_id).await?))
}

// ==============================================================================
// DOCTOR PORTAL
// ==============================================================================

pub async fn get_doctor_current_token(
    State(state): State<TokenQueueState>,
    Extension(user): Extension<User>,
    Query(query): Query<DateQuery>,
) -> Result<Json<TokenCounterView>, AppError> {
    require_role(&user, ROLE_DOCTOR)?;
    let date = resolve_date(&state, &query)?;

    Ok(Json(state.board.read_current(date).await?.view()))
}

pub async fn get_doctor_token(
    State(state): State<TokenQueueState>,
    Extension(user): Extension<User>,
    Path(token): Path<String>,
) -> Result<Json<Appointment>, AppError> {
    require_role(&user, ROLE_DOCTOR)?;
    let doctor_id = caller_id(&user)?;

    let appointment = state
        .ledger
        .find_by_token(&token)
        .await?
        .filter(|a| a.doctor_id == doctor_id)
        .ok_or_else(|| AppError::NotFound("Token not found".to_string()))?;

    Ok(Json(appointment))
}

pub async fn complete_by_token(
    State(state): State<TokenQueueState>,
    Extension(user): Extension<User>,
    Path(token): Path<String>,
) -> Result<Json<CompletionOutcome>, AppError> {
    require_role(&user, ROLE_DOCTOR)?;
    let doctor_id = caller_id(&user)?;

    Ok(Json(state.advancer.complete_token(doctor_id, &token).await?))
}

pub async fn complete_by_appointment(
    State(state): State<TokenQueueState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<CompletionOutcome>, AppError> {
    require_role(&user, ROLE_DOCTOR)?;
    let doctor_id = caller_id(&user)?;

    Ok(Json(state.advancer.complete_appointment(doctor_id, appointment_id).await?))
}

// ==============================================================================
// ADMIN TOKEN CONTROL
// ==============================================================================

pub async fn get_admin_current_token(
    State(state): State<TokenQueueState>,
    Extension(user): Extension<User>,
    Query(query): Query<DateQuery>,
) -> Result<Json<TokenCounterView>, AppError> {
    require_role(&user, ROLE_ADMIN)?;
    let date = resolve_date(&state, &query)?;

    Ok(Json(state.board.read_current(date).await?.view()))
}

pub async fn set_admin_current_token(
    State(state): State<TokenQueueState>,
    Extension(user): Extension<User>,
    Json(request): Json<SetCurrentRequest>,
) -> Result<Json<TokenCounterView>, AppError> {
    require_role(&user, ROLE_ADMIN)?;
    let date = BusinessDate::parse(&request.date)?;
    info!("Admin {} setting now serving for {} to {}", user.id, date, request.current);

    Ok(Json(state.board.set_current(date, request.current).await?.view()))
}
