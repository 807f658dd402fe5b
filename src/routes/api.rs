use crate::{
    docs::ApiDoc,
    handlers::{diagnostics, health_check, ready_check, session_participants, session_snapshot},
    routes::auth_middleware::auth_middleware,
    websocket::handler::websocket_handler,
    AppState,
};
use axum::{http::HeaderValue, middleware, routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Create API routes
pub fn create_api_routes(state: AppState) -> Router {
    Router::<AppState>::new()
        .route("/v1/diagnostics", get(diagnostics))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware)) // Applies to all routes added above
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .route("/v1/sessions/:session_id", get(session_snapshot))
        .route("/v1/sessions/:session_id/participants", get(session_participants))
        .with_state(state)
}

fn cors_layer(state: &AppState) -> CorsLayer {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_origin_list()
        .into_iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        if !state.config.is_development() {
            warn!("CORS_ORIGINS not set, allowing any origin");
        }
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(origins)
    }
}

/// Full application: API, websocket endpoint and Swagger UI
pub fn create_app(state: AppState) -> Router {
    let cors = cors_layer(&state);
    Router::new()
        // Mount the websocket endpoint
        .route("/ws", get(websocket_handler))
        .with_state(state.clone())
        // Mount API routes
        .nest("/api", create_api_routes(state))
        // Mount Swagger UI
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        // Add tracing layer
        .layer(TraceLayer::new_for_http())
}
