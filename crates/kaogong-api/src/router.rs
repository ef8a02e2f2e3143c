use axum::{
    middleware,
    routing::{delete, get, patch, post},
    Json, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use utoipa::OpenApi;

use crate::{
    config::Config,
    handlers::{chat_stream, quiz_stream},
    middleware::{auth::require_auth, logging},
    routes::{auth, health, me, membership, notebook, payment, sessions},
    state::AppState,
};

#[derive(OpenApi)]
#[openapi(
    info(title = "kaogong API", description = "Civil-service exam tutor backend"),
    paths(
        health::health_check,
        auth::send_code,
        auth::register,
        auth::login,
        auth::login_with_code,
        auth::reset_password,
        me::get_me,
        sessions::list_sessions,
        sessions::create_session,
        sessions::get_session,
        sessions::rename_session,
        sessions::delete_session,
        chat_stream::send_message_stream,
        quiz_stream::generate_quiz_stream,
        notebook::list_categories,
        notebook::create_category,
        notebook::delete_category,
        notebook::list_notes,
        notebook::add_note,
        notebook::update_note,
        notebook::delete_note,
        membership::list_plans,
        membership::create_order,
        membership::get_order,
        payment::notify,
    ),
    tags(
        (name = "health"), (name = "auth"), (name = "account"), (name = "sessions"),
        (name = "quiz"), (name = "notebook"), (name = "membership"), (name = "payment")
    )
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub fn build_router(state: Arc<AppState>) -> Router {
    // Routes callable without a token
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/api-docs/openapi.json", get(openapi_json))
        .route("/auth/code", post(auth::send_code))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/login/code", post(auth::login_with_code))
        .route("/auth/password/reset", post(auth::reset_password))
        .route("/membership/plans", get(membership::list_plans))
        .route("/payment/notify", post(payment::notify).get(payment::notify_query));

    let protected_routes = Router::new()
        .route("/me", get(me::get_me))
        // Sessions
        .route("/sessions", get(sessions::list_sessions).post(sessions::create_session))
        .route(
            "/sessions/:session_id",
            get(sessions::get_session)
                .patch(sessions::rename_session)
                .delete(sessions::delete_session),
        )
        .route("/sessions/:session_id/messages", post(chat_stream::send_message_stream))
        // Quiz
        .route("/quiz", post(quiz_stream::generate_quiz_stream))
        // Notebook
        .route(
            "/notebook/categories",
            get(notebook::list_categories).post(notebook::create_category),
        )
        .route("/notebook/categories/:category_id", delete(notebook::delete_category))
        .route("/notebook/notes", get(notebook::list_notes).post(notebook::add_note))
        .route(
            "/notebook/notes/:note_id",
            patch(notebook::update_note).delete(notebook::delete_note),
        )
        // Membership
        .route("/membership/orders", post(membership::create_order))
        .route("/membership/orders/:out_trade_no", get(membership::get_order))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(middleware::from_fn(logging::log_request))
        .layer(TimeoutLayer::new(Duration::from_secs(300))) // 5 min for streaming
        .layer(CompressionLayer::new())
        .layer(build_cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn build_cors_layer(config: &Config) -> CorsLayer {
    if config.cors.enabled {
        let mut cors = CorsLayer::new()
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::PATCH,
                axum::http::Method::DELETE,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers(Any);

        if config.cors.origins.iter().any(|o| o == "*") {
            cors = cors.allow_origin(Any);
        } else {
            let origins: Vec<axum::http::HeaderValue> = config
                .cors
                .origins
                .iter()
                .filter_map(|origin| origin.parse().ok())
                .collect();
            cors = cors.allow_origin(AllowOrigin::list(origins));
        }

        cors
    } else {
        CorsLayer::permissive()
    }
}
