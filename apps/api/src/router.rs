use axum::{routing::get, Router};

use token_queue_cell::{create_token_queue_router, TokenQueueState};

pub fn create_router(state: TokenQueueState) -> Router {
    Router::new()
        .route("/", get(|| async { "OPD token queue API is running!" }))
        .merge(create_token_queue_router(state))
}
