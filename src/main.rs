use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use light_merge::config::Config;
use light_merge::gitlab::GitLabClient;
use light_merge::server::{AppState, Dispatcher, build_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "light_merge=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("failed to load configuration")?;
    tracing::info!(?config, "starting light-merge");

    std::fs::create_dir_all(&config.repo_dir).with_context(|| {
        format!("failed to create repo directory {}", config.repo_dir.display())
    })?;

    let gitlab = GitLabClient::new(&config.gitlab_url, config.gitlab_token.clone())
        .context("failed to create GitLab client")?;

    let shutdown = CancellationToken::new();
    let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();

    let webhook_secret = config.webhook_secret.as_ref().map(|s| s.as_bytes().to_vec());
    if webhook_secret.is_none() {
        tracing::warn!("LM_WEBHOOK_SECRET is not set; webhook deliveries are not authenticated");
    }
    let addr = SocketAddr::from(([0, 0, 0, 0], config.listen_port));

    let dispatcher = Dispatcher::new(Arc::new(config), gitlab);
    let dispatcher_task = tokio::spawn(dispatcher.run(jobs_rx, shutdown.child_token()));

    let app = build_router(AppState::new(webhook_secret, jobs_tx));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("listening on {}", addr);

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            tracing::info!("shutdown requested");
            server_shutdown.cancel();
        })
        .await
        .context("server error")?;

    shutdown.cancel();
    dispatcher_task.await.context("dispatcher task failed")?;
    tracing::info!("stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
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
