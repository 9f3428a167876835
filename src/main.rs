use std::{net::SocketAddr, sync::Arc};

use amora_backend::{
    config::Config,
    db::{
        memory_user_repository::InMemoryUserRepository,
        postgres_user_repository::PostgresUserRepository, user_repository::UserRepository,
    },
    responses::JsonResponse,
    routes::{self, root},
    services::{
        account_service::AccountService,
        smtp_mailer::{SmtpMailer, SmtpSettings},
    },
    state::AppState,
    utils::clock::SystemClock,
};
use anyhow::Context;
use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "tls")]
use axum_server::tls_rustls::RustlsConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = Config::from_env().context("invalid configuration")?;

    let auth_governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(config.auth_rate_limit.per_seconds)
            .burst_size(config.auth_rate_limit.burst)
            .use_headers()
            .error_handler(|_err| {
                JsonResponse::too_many_requests(
                    "Too many requests. Please wait a moment and try again.",
                )
                .into_response()
            })
            .finish()
            .context("invalid rate limiter settings")?,
    );

    // Background cleanup of stale client keys
    let governor_limiter = auth_governor_conf.limiter().clone();
    std::thread::spawn(move || {
        let interval = std::time::Duration::from_secs(60);
        loop {
            std::thread::sleep(interval);
            governor_limiter.retain_recent();
        }
    });

    let db: Arc<dyn UserRepository> = match &config.database_url {
        Some(url) => Arc::new(PostgresUserRepository {
            pool: establish_connection(url).await?,
        }),
        None => {
            warn!("DATABASE_URL is not set; using the in-memory store, accounts will not survive a restart");
            Arc::new(InMemoryUserRepository::new())
        }
    };

    let smtp = SmtpSettings::from_env().context("SMTP configuration")?;
    let mailer = Arc::new(
        SmtpMailer::new(&smtp, config.email_links.clone()).context("failed to initialize mailer")?,
    );

    let jwt = Arc::new(config.jwt.clone());
    let accounts = AccountService::new(db, mailer, Arc::new(SystemClock), jwt.clone());
    let state = AppState::new(accounts, jwt);

    let cors = CorsLayer::new()
        .allow_origin(
            config
                .frontend_origin
                .parse::<HeaderValue>()
                .context("FRONTEND_ORIGIN is not a valid header value")?,
        )
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true);

    let api_routes = routes::auth::router().layer(GovernorLayer {
        config: auth_governor_conf,
    });

    let app = Router::new()
        .route("/", get(root))
        .nest("/api", api_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    let addr = config.bind_addr;

    #[cfg(feature = "tls")]
    {
        // TLS: Only run this block when `--features tls` is used
        let tls_config = RustlsConfig::from_pem_file(
            std::env::var("DEV_CERT_LOCATION").context("DEV_CERT_LOCATION must be set")?,
            std::env::var("DEV_KEY_LOCATION").context("DEV_KEY_LOCATION must be set")?,
        )
        .await
        .context("failed to load TLS certs")?;

        info!("running with TLS at https://{}", addr);
        axum_server::bind_rustls(addr, tls_config)
            .serve(make_service)
            .await?;

        return Ok(()); // Skip the fallback if TLS was used
    }

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("running without TLS at http://{}", addr);
    axum::serve(listener, make_service).await?;
    Ok(())
}

/// `RUST_LOG` filters (default `info`); `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn establish_connection(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPool::connect(database_url)
        .await
        .context("failed to connect to the database")?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .context("failed to verify database connection")?;

    info!("connected to the database");
    Ok(pool)
}
