use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use crate::api::state::AppState;

use super::handlers;
use super::middleware::{concurrency_limit_middleware, v1_auth_middleware};

pub fn v1_router(state: AppState) -> Router<AppState> {
    let history = Router::new()
        .route(
            "/",
            get(handlers::history::list_history)
                .post(handlers::history::add_history)
                .delete(handlers::history::clear_history),
        )
        .route("/{id}", delete(handlers::history::delete_history_entry));

    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/openapi.json", get(super::openapi::openapi_json))
        .merge(super::openapi::redoc_router());

    // Layers run outermost-last: auth is checked before a request slot is taken.
    let protected_routes = Router::new()
        .route("/ocr", post(handlers::ocr::process_ocr))
        .route("/ocr/{provider}", post(handlers::ocr::process_ocr_with_backend))
        .nest("/history", history)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            concurrency_limit_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(state, v1_auth_middleware));

    Router::new().merge(public_routes).merge(protected_routes)
}
