use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use duty_gateway::api::{self, AppState};
use duty_gateway::config::Config;
use duty_gateway::credentials::{default_cache_path, load_client_secret, CredentialStore};
use duty_gateway::dispatcher::{Dispatcher, DispatcherConfig};
use duty_gateway::duty::DutyLookup;
use duty_gateway::google::{GmailMailbox, GoogleCalendar};
use duty_gateway::provider::{CalendarProvider, MailProvider};

#[derive(Parser)]
#[command(name = "duty-gateway", about = "On-call lookup and mailbox drain")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "DUTY_GATEWAY_CONFIG", default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "duty_gateway=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Another crate may already have installed one
    let _ = rustls::crypto::ring::default_provider().install_default();

    let args = Args::parse();
    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    let secret = load_client_secret(&config.client_secret_path).await?;
    let cache_path = match &config.token_cache_path {
        Some(path) => path.clone(),
        None => default_cache_path()?,
    };
    let transport = CredentialStore::new(secret, cache_path)
        .obtain()
        .await
        .context("Unable to obtain OAuth credential")?;

    let mail: Arc<dyn MailProvider> = Arc::new(GmailMailbox::connect(&transport)?);
    let calendar: Arc<dyn CalendarProvider> = Arc::new(GoogleCalendar::connect(&transport)?);
    let lookup = Arc::new(DutyLookup::new(calendar));

    let started = Instant::now();
    match lookup.get_duty(&config.calendar_id).await {
        Ok(duty) => tracing::info!("{} is on duty today.", duty),
        Err(e) => tracing::warn!("Unable to determine who is on duty: {}", e),
    }
    tracing::info!("Spent {:?}.", started.elapsed());

    let dispatcher = Dispatcher::new(mail, DispatcherConfig::from(&config.mail)).start();

    let app = api::router(AppState {
        lookup,
        calendar_id: Arc::from(config.calendar_id.as_str()),
    });

    let bind = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    tracing::info!("listening on: {}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown signal received, stopping...");
    dispatcher.shutdown();
    dispatcher.join().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
