use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use notesync::config::{ServiceConfig, SettingsHandle, SettingsStore};
use notesync::engine::BatchProcessor;
use notesync::notice::{NotificationSink, SettingsErrorSink, TracingSink};
use notesync::server::{AppState, build_router};
use notesync::source::SpoolSource;
use notesync::subscription::SubscriptionManager;
use notesync::vault::LocalVault;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "notesync=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServiceConfig::from_env().context("reading configuration")?;

    std::fs::create_dir_all(&config.vault_dir)
        .with_context(|| format!("creating vault directory {}", config.vault_dir.display()))?;
    std::fs::create_dir_all(&config.spool_dir)
        .with_context(|| format!("creating spool directory {}", config.spool_dir.display()))?;

    let settings = SettingsHandle::load(SettingsStore::new(&config.settings_path))
        .context("loading settings")?;

    let source = Arc::new(SpoolSource::new(config.spool_source()));
    source.recover().context("recovering spool")?;

    let vault = Arc::new(LocalVault::new(&config.vault_dir));
    let sink: Arc<dyn NotificationSink> =
        Arc::new(SettingsErrorSink::spawn(Arc::new(TracingSink), settings.clone()));

    let processor = Arc::new(BatchProcessor::new(
        vault,
        Arc::clone(&source),
        Arc::clone(&sink),
        settings.subscribe(),
    ));
    let manager = Arc::new(SubscriptionManager::new(source, processor, sink));

    let shutdown = CancellationToken::new();
    let follower = tokio::spawn({
        let manager = Arc::clone(&manager);
        let settings = settings.subscribe();
        let shutdown = shutdown.clone();
        async move { manager.follow_identity(settings, shutdown).await }
    });

    let app = build_router(AppState::new(
        &config.spool_dir,
        config.webhook_secret.clone(),
        settings,
    ));

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!(
        addr = %config.bind_addr,
        vault = %config.vault_dir.display(),
        spool = %config.spool_dir.display(),
        "listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move {
                let _ = tokio::signal::ctrl_c().await;
                info!("Shutdown signal received");
                shutdown.cancel();
            }
        })
        .await
        .context("serving HTTP")?;

    shutdown.cancel();
    follower.await.context("joining subscription task")?;
    info!("Stopped");
    Ok(())
}
