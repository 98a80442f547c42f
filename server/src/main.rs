use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use pwa_offline_server::cache_store::sqlite::SqliteCacheStorage;
use pwa_offline_server::host::Host;
use pwa_offline_server::install_prompt::InstallPromptController;
use pwa_offline_server::{
    CacheManager, CacheStorage, HttpNetwork, Network, ProxyConfig, ProxyState, Registration, server,
};
use std::io;
use std::sync::{Arc, Mutex};
use tower::Service;
use tracing::{debug, error, info, warn};

/// Script path the hosted registration is made for
const SCRIPT_URL: &str = "./service-worker.js";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,pwa_offline_server=debug".into()),
        )
        .init();

    let config = ProxyConfig::from_env()?;

    // STORAGE_DIR holds cache_storage.db, one row set per named cache store
    std::fs::create_dir_all(&config.storage_dir)?;
    let db_path = config.storage_dir.join("cache_storage.db");
    let storage: Arc<dyn CacheStorage> = Arc::new(SqliteCacheStorage::new(&db_path)?);
    let network: Arc<dyn Network> = Arc::new(HttpNetwork::new(&config.origin, config.fetch_timeout)?);
    let host = Arc::new(Host::new());

    let registration = Registration::register(&config.origin, SCRIPT_URL, None)?;
    let manager = CacheManager::new(
        config.worker_config(),
        Arc::clone(&storage),
        Arc::clone(&network),
        Arc::clone(&host),
    )?;
    match registration.update(manager).await {
        Ok(state) => info!("✅ Cache {} is {:?}", config.cache_version, state),
        Err(e) => match registration.active() {
            Some(active) => warn!(
                "⚠️  Install failed, serving stored cache {}: {}",
                active.cache_version(),
                e
            ),
            None => warn!("⚠️  No cache manager active, passing requests through: {}", e),
        },
    }

    let state = Arc::new(ProxyState {
        origin: config.origin.clone(),
        registration,
        storage,
        network,
        host,
        install_prompt: Mutex::new(InstallPromptController::new()),
    });

    // Create and run the server
    let app = server::create_app(state);

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    info!(
        "PWA offline proxy listening on http://{} for {} (HTTP/1.1 + HTTP/2)",
        config.bind, config.origin
    );
    info!("Storage directory: {}", config.storage_dir.display());

    // Use hyper's auto-negotiating server to support both HTTP/1.1 and HTTP/2
    let conn_builder = ConnBuilder::new(hyper_util::rt::TokioExecutor::new());

    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("Failed to accept connection: {}", e);
                continue;
            }
        };
        debug!("New connection from: {}", addr);
        let io = TokioIo::new(stream);
        let app_clone = app.clone();
        let conn_builder = conn_builder.clone();

        tokio::spawn(async move {
            if let Err(err) = conn_builder
                .serve_connection(
                    io,
                    hyper::service::service_fn(move |req| app_clone.clone().call(req)),
                )
                .await
            {
                // Check if the error is an io::Error indicating a normal close
                let is_normal_close = err
                    .source()
                    .and_then(|e| e.downcast_ref::<io::Error>())
                    .map(|io_err| {
                        matches!(
                            io_err.kind(),
                            io::ErrorKind::ConnectionReset
                                | io::ErrorKind::BrokenPipe
                                | io::ErrorKind::UnexpectedEof
                        )
                    })
                    .unwrap_or(false);

                if is_normal_close {
                    debug!("Connection from {} closed normally", addr);
                } else {
                    error!("Error serving connection from {}: {}", addr, err);
                }
            } else {
                debug!("Connection from {} completed successfully", addr);
            }
        });
    }
}
