use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    http::{HeaderValue, Method},
    middleware as axum_middleware,
    routing::{delete, get, patch, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use yukyu_backend::{
    config::Config,
    db::connection::create_pool,
    handlers,
    middleware::{auth as auth_middleware, csrf, deprecation, logging, rate_limit, request_id},
    repositories::UserRepository,
    state::AppState,
};

fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "<empty>".into();
    }
    let prefix = s.chars().take(4).collect::<String>();
    format!("{}*** (len={})", prefix, s.len())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "yukyu_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()?;
    tracing::info!(
        database_url = %config.database_url,
        jwt_secret = %mask_secret(&config.jwt_secret),
        jwt_key_id = %config.jwt_key_id,
        jwt_expiration_hours = config.jwt_expiration_hours,
        time_zone = %config.time_zone,
        production_mode = config.production_mode,
        "Loaded configuration from environment/.env"
    );

    // Initialize database
    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    // Production refuses to serve while any stored credential predates the
    // modern hash format.
    let users = UserRepository::new();
    if config.production_mode {
        let legacy = users.count_legacy_credentials(&pool).await?;
        if legacy > 0 {
            anyhow::bail!(
                "{} stored credentials are not modern hashes; migrate them first",
                legacy
            );
        }
    } else if users.count(&pool).await? == 0 {
        bootstrap_admin(&users, &pool).await?;
    }

    let state = AppState::new(pool, config);
    let app = build_app(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Development convenience: an empty user directory gets a seeded admin so
/// the API is reachable on first boot.
async fn bootstrap_admin(
    users: &UserRepository,
    pool: &yukyu_backend::db::connection::DbPool,
) -> anyhow::Result<()> {
    use yukyu_backend::models::user::{User, UserRole};
    use yukyu_backend::utils::password::hash_password;

    let password =
        std::env::var("ADMIN_BOOTSTRAP_PASSWORD").unwrap_or_else(|_| "admin-dev-password".into());
    let now = chrono::Utc::now();
    let admin = User {
        id: uuid::Uuid::new_v4().to_string(),
        username: "admin".into(),
        password_hash: hash_password(&password)
            .map_err(|err| anyhow::anyhow!("cannot hash bootstrap password: {err}"))?,
        full_name: "Administrator".into(),
        role: UserRole::Admin,
        employee_num: None,
        created_at: now,
        updated_at: now,
    };
    users
        .create(pool, &admin)
        .await
        .map_err(|err| anyhow::anyhow!("cannot seed admin user: {err}"))?;
    tracing::warn!("seeded development admin user 'admin'");
    Ok(())
}

fn build_app(state: AppState) -> Router {
    let request_timeout = Duration::from_secs(state.config.request_timeout_secs);
    let ingestion_timeout = Duration::from_secs(state.config.ingestion_timeout_secs);

    // Public routes. The login path is never exempt from its bucket.
    let public_routes = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_auth,
        ))
        .route("/health", get(handlers::health::health))
        .layer(TimeoutLayer::new(request_timeout));

    // Authenticated routes
    let user_routes = Router::new()
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/employees", get(handlers::employees::list_employees))
        .route(
            "/employees/search",
            get(handlers::employees::search_employees),
        )
        .route("/employees/{num}", get(handlers::employees::employee_detail))
        .route(
            "/employees/{num}/leave-info",
            get(handlers::employees::leave_info),
        )
        .route(
            "/leave-requests",
            post(handlers::leave_requests::create_leave_request)
                .get(handlers::leave_requests::list_leave_requests),
        )
        .route(
            "/leave-requests/me",
            get(handlers::leave_requests::list_my_leave_requests),
        )
        .route(
            "/leave-requests/{id}",
            delete(handlers::leave_requests::cancel_leave_request),
        )
        .route("/fiscal/balance/{num}", get(handlers::fiscal::balance))
        .route(
            "/compliance/five-day/{year}",
            get(handlers::compliance::five_day),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware::auth,
        ))
        .layer(TimeoutLayer::new(request_timeout));

    // Approver routes (auth + approver scope)
    let approver_routes = Router::new()
        .route(
            "/leave-requests/{id}/approve",
            patch(handlers::leave_requests::approve_leave_request),
        )
        .route(
            "/leave-requests/{id}/reject",
            patch(handlers::leave_requests::reject_leave_request),
        )
        .route(
            "/leave-requests/{id}/revert",
            patch(handlers::leave_requests::revert_leave_request),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware::auth_approver,
        ))
        .layer(TimeoutLayer::new(request_timeout));

    // Admin routes; ingestion carries its own longer deadline.
    let admin_sync_routes = Router::new()
        .route("/sync/vacation", post(handlers::sync::sync_vacation))
        .route("/sync/register", post(handlers::sync::sync_register))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_sync,
        ))
        .layer(TimeoutLayer::new(ingestion_timeout));

    let export_routes = Router::new()
        .route(
            "/audit/export",
            get(handlers::audit_logs::export_audit_logs),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_export,
        ))
        .layer(TimeoutLayer::new(request_timeout));

    let admin_routes = Router::new()
        .merge(admin_sync_routes)
        .merge(export_routes)
        .route("/sync/reports", get(handlers::sync::list_sync_reports))
        .route("/fiscal/carry-over", post(handlers::fiscal::carry_over))
        .route("/audit", get(handlers::audit_logs::list_audit_logs))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware::auth_admin,
        ));

    let api = Router::new()
        .merge(public_routes)
        .merge(user_routes)
        .merge(approver_routes)
        .merge(admin_routes);

    // Canonical /v1 prefix plus the unversioned legacy alias, which carries
    // Deprecation/Sunset headers during its deprecation window.
    Router::new()
        .nest("/v1", api.clone())
        .merge(api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&state))
                .layer(axum_middleware::from_fn(request_id::request_id))
                .layer(axum_middleware::from_fn(logging::request_logging))
                .layer(axum_middleware::from_fn_with_state(
                    state.clone(),
                    deprecation::deprecation,
                ))
                .layer(axum_middleware::from_fn(csrf::csrf))
                .layer(axum_middleware::from_fn_with_state(
                    state.clone(),
                    rate_limit::rate_limit_default,
                )),
        )
        .with_state(state)
}

fn cors_layer(state: &AppState) -> CorsLayer {
    let origins = &state.config.cors_allow_origins;
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|origin| HeaderValue::from_str(origin).ok()),
        )
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .max_age(Duration::from_secs(24 * 60 * 60))
}
