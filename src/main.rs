//! Roster Membership Registry Backend
//!
//! A REST backend where members submit profile change requests and admins
//! review, approve, or reject them.

mod api;
mod auth;
mod config;
mod db;
mod errors;
mod models;
mod notify;
mod services;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use db::Repository;
use notify::{NoopMailer, Notifier, RelayMailer};
use services::{
    MemberExportService, MemberQueryService, MemberService, ReviewService, SubmissionService,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Arc<Config>,
    pub submission: Arc<SubmissionService>,
    pub review: Arc<ReviewService>,
    pub members: Arc<MemberService>,
    pub query: Arc<MemberQueryService>,
    pub export: Arc<MemberExportService>,
}

impl AppState {
    /// Wire the service layer over a repository and notifier.
    pub fn build(repo: Arc<Repository>, config: Arc<Config>, notifier: Arc<dyn Notifier>) -> Self {
        let login_url = format!("{}/login", config.base_url);
        Self {
            submission: Arc::new(SubmissionService::new(repo.clone(), notifier.clone())),
            review: Arc::new(ReviewService::new(repo.clone(), notifier.clone())),
            members: Arc::new(MemberService::new(repo.clone(), notifier, login_url)),
            query: Arc::new(MemberQueryService::new(repo.clone())),
            export: Arc::new(MemberExportService::new(repo.clone())),
            repo,
            config,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Roster Membership Registry Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    if config.setup_key.is_none() {
        tracing::warn!("No setup key configured (ROSTER_SETUP_KEY). Admin bootstrap is disabled.");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool));

    let config = Arc::new(config);
    let notifier = build_notifier(&config);
    let state = AppState::build(repo, config.clone(), notifier);

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Pick the notification transport from configuration.
fn build_notifier(config: &Config) -> Arc<dyn Notifier> {
    match &config.mail_relay_url {
        Some(url) => Arc::new(RelayMailer::new(
            url.clone(),
            config.mail_relay_token.clone(),
            config.mail_from.clone(),
            config.admin_email.clone(),
            config.base_url.clone(),
        )),
        None => {
            tracing::warn!(
                "No mail relay configured (ROSTER_MAIL_RELAY_URL). Notifications are logged only."
            );
            Arc::new(NoopMailer)
        }
    }
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Clone the secret for the auth layer
    let secret = state.config.jwt_secret.clone();

    // Routes requiring a bearer token
    let protected_routes = Router::new()
        .route("/auth/password", post(api::change_password))
        // Member self-service
        .route("/me", get(api::get_me))
        .route("/me", put(api::submit_profile_update))
        .route("/me", delete(api::submit_delete_request))
        // Admin member management
        .route("/admin/members", get(api::search_members))
        .route("/admin/members", post(api::create_member))
        .route("/admin/members/export", get(api::export_members))
        .route("/admin/members/{id}", get(api::get_member))
        .route("/admin/members/{id}", put(api::update_member))
        .route("/admin/members/{id}", delete(api::delete_member))
        // Admin change-request review
        .route("/admin/requests", get(api::list_pending_requests))
        .route("/admin/requests/{id}/approve", post(api::approve_request))
        .route("/admin/requests/{id}/reject", post(api::reject_request))
        .layer(middleware::from_fn(move |req, next| {
            auth::jwt_auth_layer(secret.clone(), req, next)
        }));

    // Routes with their own access control
    let public_routes = Router::new()
        .route("/auth/login", post(api::login))
        .route("/admin/users", post(api::create_admin));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", public_routes.merge(protected_routes))
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
