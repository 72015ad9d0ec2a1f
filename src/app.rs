use crate::handlers;
use crate::state::AppState;
use axum::{
    Router, middleware,
    routing::{get, patch, post},
};

pub fn router(state: AppState) -> Router {
    let gated = Router::new()
        .route("/", get(handlers::home))
        .route("/calendar/:id", get(handlers::calendar_detail))
        .route(
            "/api/calendars",
            get(handlers::list_calendars).post(handlers::create_calendar),
        )
        .route(
            "/api/calendars/:id",
            get(handlers::get_calendar)
                .patch(handlers::update_calendar)
                .delete(handlers::delete_calendar),
        )
        .route(
            "/api/calendars/:id/records",
            get(handlers::list_records).post(handlers::check_in),
        )
        .route(
            "/api/calendars/:id/records/:date",
            get(handlers::record_by_date),
        )
        .route("/api/calendars/:id/stats", get(handlers::calendar_stats))
        .route(
            "/api/records/:id",
            patch(handlers::update_record).delete(handlers::delete_record),
        )
        .route(
            "/api/settings",
            get(handlers::get_settings).patch(handlers::update_settings),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            handlers::require_session,
        ));

    Router::new()
        .route("/login", get(handlers::login))
        .route("/auth/signup", post(handlers::sign_up))
        .route("/auth/login", post(handlers::sign_in))
        .route("/auth/logout", post(handlers::sign_out))
        .route("/auth/session", get(handlers::session))
        .merge(gated)
        .with_state(state)
}
