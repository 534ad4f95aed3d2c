use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info, warn};

use reelcache::cache::{StoreRegistry, persist};
use reelcache::config::Settings;
use reelcache::fetch::HttpFetcher;
use reelcache::manager::CacheManager;
use reelcache::server::{Gateway, Server};
use reelcache::telemetry;

#[tokio::main]
async fn main() -> ExitCode {
    let (_cli, settings) = match reelcache::config::load_with_cli() {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("reelcache: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = telemetry::init(&settings.logging) {
        eprintln!("reelcache: {err}");
        return ExitCode::FAILURE;
    }

    match run(settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "reelcache exited with error");
            ExitCode::FAILURE
        }
    }
}

async fn run(settings: Settings) -> Result<(), Box<dyn Error>> {
    let registry = match settings.snapshot.as_deref() {
        Some(path) if path.exists() => {
            let restored = persist::load(path)?;
            info!(path = %path.display(), stores = restored.names().len(), "restored cache snapshot");
            restored
        }
        _ => StoreRegistry::new(),
    };
    let registry = Arc::new(registry);

    let fetcher = Arc::new(HttpFetcher::new()?);
    let manager = Arc::new(CacheManager::new(
        settings.cache.clone(),
        Arc::clone(&registry),
        fetcher,
    ));

    match manager.install().await {
        Ok(_) if settings.cache.skip_waiting => {
            manager.activate();
        }
        Ok(_) => info!("installed; waiting for SKIP_WAITING before serving from cache"),
        Err(err) => {
            warn!(error = %err, "install failed; forwarding uncached until SKIP_WAITING");
        }
    }

    let server = Server::bind(settings.listen.to_string()).await?;
    let gateway = Gateway::new(Arc::clone(&manager));
    server
        .run_until(
            move |request| {
                let gateway = gateway.clone();
                async move { gateway.handle(request).await }
            },
            shutdown_signal(),
        )
        .await?;

    if let Some(path) = settings.snapshot.as_deref() {
        match persist::save(&registry, path) {
            Ok(entries) => info!(path = %path.display(), entries, "saved cache snapshot"),
            Err(err) => error!(error = %err, "failed to save cache snapshot"),
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
