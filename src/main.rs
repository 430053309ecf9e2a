use ledgerd::api::{self, AppState};
use ledgerd::config::Config;
use ledgerd::db::init_db;
use ledgerd::import::ImportService;
use ledgerd::ingest::{connect, Consumer};
use ledgerd::Repository;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let pool = match init_db(&config.database_path).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };
    let repo = Arc::new(Repository::new(pool));
    let import = Arc::new(ImportService::new(repo.clone()));

    // The consumer is optional so read replicas can run API-only.
    let mut nats = None;
    let mut consumer_task = None;
    if config.consumer_enabled {
        let client = match connect(&config.nats_url).await {
            Ok(client) => client,
            Err(e) => {
                eprintln!("Failed to connect to NATS: {}", e);
                std::process::exit(1);
            }
        };
        info!(url = %config.nats_url, "connected to NATS");

        let consumer = Consumer::new(
            client.clone(),
            repo.clone(),
            config.nats_subject_prefix.clone(),
        );
        consumer_task = Some(tokio::spawn(async move {
            if let Err(e) = consumer.run().await {
                tracing::error!(error = %e, "trade consumer error");
            }
        }));
        nats = Some(client);
    }

    let app = api::create_router(AppState {
        repo: repo.clone(),
        import,
        nats,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    info!("server listening on {}", addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }

    // In-flight HTTP requests have drained; stop pulling messages and let
    // unacked deliveries redeliver after ack-wait.
    if let Some(task) = consumer_task {
        task.abort();
    }
    repo.close().await;
    info!("shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
