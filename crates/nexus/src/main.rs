//! Process wiring for Nexus: config → store → registry → container
//! adapter → orchestrator → delegator → run. No RPC surface of its own;
//! the original's CLI/daemon glue is out of scope here.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use bollard::Docker;
use tracing::{info, warn};

use delegator::{build_router, DelegatorConfig, DelegatorState};
use orchestrator::container::live::LiveContainerAdapter;
use orchestrator::port_pool::PortPool;
use orchestrator::store::PostgresNetworkStore;
use orchestrator::{NodeRegistry, Orchestrator, OrchestratorConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Phase 1: basic tracing so we can log during config loading.
    let _basic_tracing = init_tracing_basic();

    info!("Starting Nexus v{}", env!("CARGO_PKG_VERSION"));

    let orchestrator_config = OrchestratorConfig::load().context("failed to load orchestrator configuration")?;
    orchestrator_config.validate().context("orchestrator configuration validation failed")?;

    let delegator_config = DelegatorConfig::load().context("failed to load delegator configuration")?;
    delegator_config.validate().context("delegator configuration validation failed")?;

    // Phase 2: re-initialize tracing with the loaded configuration.
    drop(_basic_tracing);
    init_tracing_from_config(&delegator_config);

    info!("Connecting to Docker daemon...");
    let docker = Docker::connect_with_local_defaults().context("failed to connect to Docker daemon")?;
    let perm_mode = u32::from_str_radix(orchestrator_config.ipfs.perm_mode.trim_start_matches('0'), 8)
        .context("invalid ipfs.perm_mode")?;
    let adapter = Arc::new(LiveContainerAdapter::new(
        docker,
        orchestrator_config.ipfs.data_dir.clone(),
        perm_mode,
        orchestrator_config.ipfs.version.clone(),
    ));

    info!("Connecting to network store...");
    let store = Arc::new(
        PostgresNetworkStore::connect(&orchestrator_config.postgres.connection_string())
            .await
            .context("failed to connect to network store")?,
    );
    store.migrate().await.context("failed to run network store migration")?;

    let registry = Arc::new(NodeRegistry::new(
        PortPool::new("0.0.0.0", &orchestrator_config.ipfs.ports.swarm),
        PortPool::new("127.0.0.1", &orchestrator_config.ipfs.ports.api),
        PortPool::new("127.0.0.1", &orchestrator_config.ipfs.ports.gateway),
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        orchestrator_config,
        adapter,
        store.clone(),
        registry.clone(),
    ));

    info!("Reconciling declared networks...");
    if let Err(e) = orchestrator.reconcile().await {
        warn!(error = %e, "boot reconciliation failed");
    }

    let watcher = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.run().await })
    };

    let delegator_state = DelegatorState::new(delegator_config.clone(), registry, store);
    let app = build_router(delegator_state.clone());

    let addr: SocketAddr = delegator_config.bind_address().parse().context("invalid delegator bind address")?;
    info!("Delegator listening on {}", addr);

    if delegator_config.tls.cert.is_some() && delegator_config.tls.key.is_some() {
        serve_tls(app, addr, &delegator_config).await.context("TLS server error")?;
    } else {
        let listener = tokio::net::TcpListener::bind(addr).await.context("failed to bind delegator listener")?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("delegator server error")?;
    }

    delegator_state.shutdown();
    orchestrator.shutdown();
    let _ = watcher.await;

    info!("Nexus shut down gracefully");
    Ok(())
}

/// Accepts TLS connections directly, since `axum::serve` only speaks
/// plaintext TCP: each accepted stream is handshaked with rustls, then
/// served with the same hyper auto (HTTP/1.1 or h2) connection builder
/// `axum::serve` uses internally.
async fn serve_tls(app: axum::Router, addr: SocketAddr, config: &DelegatorConfig) -> Result<()> {
    use hyper_util::rt::{TokioExecutor, TokioIo};
    use hyper_util::server::conn::auto::Builder;
    use tokio_rustls::TlsAcceptor;
    use tower::Service;

    let rustls_config = delegator::tls::build_rustls_config(&config.tls)?;
    let acceptor = TlsAcceptor::from(rustls_config);
    let listener = tokio::net::TcpListener::bind(addr).await.context("failed to bind TLS listener")?;
    let mut shutdown = std::pin::pin!(shutdown_signal());

    loop {
        let (stream, _peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => { warn!(error = %e, "TCP accept error"); continue; }
            },
            _ = &mut shutdown => break,
        };

        let acceptor = acceptor.clone();
        let app = app.clone();
        tokio::spawn(async move {
            let tls_stream = match acceptor.accept(stream).await {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, "TLS handshake failed");
                    return;
                }
            };
            let service = hyper::service::service_fn(move |req| {
                let mut app = app.clone();
                async move { app.call(req).await }
            });
            if let Err(e) = Builder::new(TokioExecutor::new())
                .serve_connection(TokioIo::new(tls_stream), service)
                .await
            {
                warn!(error = %e, "connection error");
            }
        });
    }

    Ok(())
}

fn init_tracing_basic() -> tracing::subscriber::DefaultGuard {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,nexus=debug"));
    let subscriber = fmt().with_env_filter(filter).with_target(true).finish();
    tracing::subscriber::set_default(subscriber)
}

fn init_tracing_from_config(config: &DelegatorConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,nexus=debug"));

    if config.log_path.is_empty() {
        let layer = fmt::layer().with_target(true);
        tracing_subscriber::registry().with(filter).with(layer).init();
    } else {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.log_path)
            .unwrap_or_else(|e| panic!("failed to open log file '{}': {}", config.log_path, e));
        let layer = fmt::layer().with_target(true).with_ansi(false).with_writer(Arc::new(file));
        tracing_subscriber::registry().with(filter).with(layer).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
