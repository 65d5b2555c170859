pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn setup_admin_router(state: AppState) -> Router {
    Router::new()
        .route("/control/status", get(get_status))
        .route("/control/rewrite/list", get(list_rewrites))
        .route("/control/rewrite/add", post(add_rewrite))
        .route("/control/rewrite/delete", post(delete_rewrite))
        .route("/control/rewrite/check", get(check_host))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
