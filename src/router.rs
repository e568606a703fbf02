use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::db::UserStore;
use crate::handlers::{ai, auth, users};
use crate::service::auth::AuthService;
use crate::service::gateway::AiGateway;

/// Shared, read-only components handed to every handler.
#[derive(Clone)]
pub struct NexusState {
    pub store: UserStore,
    pub auth: Arc<AuthService>,
    pub gateway: Arc<AiGateway>,
    pub max_upload_bytes: usize,
}

impl NexusState {
    pub fn new(
        store: UserStore,
        auth: AuthService,
        gateway: AiGateway,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            store,
            auth: Arc::new(auth),
            gateway: Arc::new(gateway),
            max_upload_bytes,
        }
    }
}

pub fn nexus_router(state: NexusState) -> Router {
    let upload_limit = DefaultBodyLimit::max(state.max_upload_bytes);

    let api = Router::new()
        .route("/generate-todo", post(ai::generate_todo))
        .route("/analyze-mental-health", post(ai::analyze_mental_health))
        .route(
            "/analyze-resume",
            post(ai::analyze_resume).layer(upload_limit),
        )
        .route("/chat", post(ai::chat))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/users/me", get(users::me))
        .route("/users/conversation", post(users::save_conversation))
        .route(
            "/users/conversation/{category}",
            get(users::get_conversation),
        )
        .route(
            "/users/results",
            post(users::create_result).get(users::list_results),
        );

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
