use axum::{
    extract::Request,
    middleware::{self, Next},
    routing::{delete, get, patch},
    Router,
};

use crate::{
    auth::extractors::{protect, require_role},
    auth::repo::Role,
    state::AppState,
};

pub mod handlers;

pub fn router(state: AppState) -> Router<AppState> {
    let admin_only = Router::new()
        .route("/users", get(handlers::list_users))
        .route(
            "/users/:id",
            get(handlers::get_user)
                .patch(handlers::update_user)
                .delete(handlers::delete_user),
        )
        .route_layer(middleware::from_fn(|req: Request, next: Next| {
            require_role(&[Role::Admin], req, next)
        }));

    // protect is added last so it wraps (and therefore precedes) the role
    // check; require_role on its own cannot authenticate anyone.
    Router::new()
        .route("/me", get(handlers::get_me))
        .route("/updateMe", patch(handlers::update_me))
        .route("/deleteMe", delete(handlers::delete_me))
        .merge(admin_only)
        .route_layer(middleware::from_fn_with_state(state, protect))
}
