use axum::{middleware, routing::patch, Router};

use crate::state::AppState;

pub mod dto;
pub mod extractors;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod repo;
pub mod reset;

pub fn router(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/updateMyPassword", patch(handlers::update_my_password))
        .route_layer(middleware::from_fn_with_state(state, extractors::protect));

    Router::new().merge(handlers::public_routes()).merge(protected)
}
