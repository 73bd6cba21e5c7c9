use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use maintwatch_engine::{
    alerts::{AlertCalculator, AlertDispatcher, AlertScheduler},
    config::Config,
    metrics,
    notify::{BroadcastBus, EmailNotifier, Notifier, StdoutNotifier},
    server::Server,
    store::create_repositories,
};

/// Deadline alert engine for preventive-maintenance tasks.
#[derive(Debug, Parser)]
#[command(name = "maintwatch", version, about)]
struct Args {
    /// Run a single alert tick and exit.
    #[arg(long)]
    once: bool,

    /// Do not start the admin HTTP server.
    #[arg(long)]
    no_server: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;
    info!(
        database = ?config.database.db_type,
        poll_interval_secs = config.alerts.poll_interval_secs,
        smtp = config.smtp.is_some(),
        "Loaded configuration"
    );
    metrics::register_metrics();

    // Initialize store
    let repos = create_repositories(&config.database)
        .await
        .context("failed to open database")?;
    repos.store.init().await.context("failed to run migrations")?;

    let notifier: Arc<dyn Notifier> = match &config.smtp {
        Some(smtp) => {
            let credentials = smtp.username.clone().zip(smtp.password.clone());
            Arc::new(
                EmailNotifier::from_config(&smtp.host, smtp.port, smtp.tls, &smtp.from, credentials)
                    .context("invalid SMTP configuration")?,
            )
        }
        None => Arc::new(StdoutNotifier::new(config.notify.stdout_format()?)),
    };
    info!("Delivering alerts via {}", notifier.channel_name());

    let bus = BroadcastBus::default();
    let dispatcher = Arc::new(AlertDispatcher::new(
        repos.contacts.clone(),
        repos.alert_events.clone(),
        notifier,
        Arc::new(bus.clone()),
        config.notify.signature.clone(),
    ));
    let scheduler = Arc::new(AlertScheduler::new(
        repos.tasks.clone(),
        repos.alert_events.clone(),
        AlertCalculator::new(config.alerts.windows()),
        dispatcher,
        config.alerts.scheduler_settings(),
    ));

    if args.once {
        let report = scheduler.tick(Utc::now()).await.context("alert tick failed")?;
        info!(
            evaluated = report.evaluated,
            dispatched = report.dispatched,
            skipped = report.skipped,
            failed = report.failed,
            "Single tick complete"
        );
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_handle = tokio::spawn({
        let scheduler = scheduler.clone();
        async move { scheduler.run(shutdown_rx).await }
    });

    if args.no_server {
        tokio::signal::ctrl_c().await?;
    } else {
        let app = Server::new(&config, repos.clone(), scheduler.clone(), bus).build_router();
        let listener = tokio::net::TcpListener::bind(&config.server.addr)
            .await
            .with_context(|| format!("failed to bind {}", config.server.addr))?;

        info!("Starting server on {}", config.server.addr);
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Failed to listen for shutdown signal: {}", e);
                }
            })
            .await?;
    }

    info!("Shutting down");
    let _ = shutdown_tx.send(true);
    scheduler_handle.await?;
    Ok(())
}
