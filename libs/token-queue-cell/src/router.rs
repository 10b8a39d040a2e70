use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers::{
    cancel_appointment, complete_by_appointment, complete_by_token, confirm_payment, get_admin_current_token,
    get_doctor_current_token, get_doctor_token, get_token_display, set_admin_current_token,
};
use crate::state::TokenQueueState;

pub fn create_token_queue_router(state: TokenQueueState) -> Router {
    let protected_routes = Router::new()
        .route("/tokens/current", get(get_token_display))
        .route("/appointments/{appointment_id}/payment-confirmed", post(confirm_payment))
        .route("/appointments/{appointment_id}/cancel", post(cancel_appointment))
        // Doctor portal
        .route("/doctor/current-token", get(get_doctor_current_token))
        .route("/doctor/token/{token}", get(get_doctor_token))
        .route("/doctor/token/{token}/complete", post(complete_by_token))
        .route("/doctor/appointments/{appointment_id}/complete", post(complete_by_appointment))
        // Admin token control
        .route("/admin/token/current", get(get_admin_current_token).put(set_admin_current_token))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
