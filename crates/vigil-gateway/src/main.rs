use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;
use vigil_core::config::SpeechBackend;
use vigil_scheduler::{OccurrenceGuard, ScheduleStore, SchedulerEngine};
use vigil_speech::{CommandSpeech, DeliveryQueue, NullSpeech, SpeechEngine};

mod app;
mod http;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "vigil_gateway=info,vigil_scheduler=info,vigil_speech=info,tower_http=info".into()
            }),
        )
        .init();

    // load config: explicit path via VIGIL_CONFIG > ~/.vigil/vigil.toml
    let config_path = std::env::var("VIGIL_CONFIG").ok();
    let config = vigil_core::VigilConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        vigil_core::VigilConfig::default()
    });

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;

    // initialize SQLite database: single file, one connection per subsystem
    let db_path = config.database.path.clone();
    ensure_parent_dir(&db_path);
    info!(path = %db_path, "opening SQLite database");

    let setup = open_conn(&db_path)?;
    vigil_scheduler::init_db(&setup)?;
    drop(setup);
    info!("database migrations complete");

    // store for the HTTP layer + engine, guard for claims and the worker sink
    let store = Arc::new(ScheduleStore::new(open_conn(&db_path)?)?);
    let guard = Arc::new(OccurrenceGuard::new(open_conn(&db_path)?)?);

    // delivery pipeline: unbounded queue drained by a single worker
    let (queue, delivery_rx, stats) = DeliveryQueue::new();
    let speech: Box<dyn SpeechEngine> = match config.speech.backend {
        SpeechBackend::Command => Box::new(CommandSpeech::new(
            config.speech.program.clone(),
            config.speech.args.clone(),
        )),
        SpeechBackend::Null => Box::new(NullSpeech),
    };
    let backend = speech.name();

    // scheduling engine: command loop + handle for the HTTP layer
    let (engine, scheduler) = SchedulerEngine::new(
        Arc::clone(&store),
        Arc::clone(&guard),
        queue.clone(),
        config.scheduler.misfire_grace_secs,
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let worker_task = tokio::spawn(vigil_speech::run_worker(
        delivery_rx,
        Arc::clone(&stats),
        speech,
        guard,
        shutdown_rx.clone(),
    ));
    let engine_task = tokio::spawn(engine.run(shutdown_rx));

    let state = Arc::new(app::AppState::new(
        config, store, scheduler, queue, stats, backend,
    ));
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("Vigil gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    // signal scheduler + delivery worker, then wait for both so an in-flight
    // synthesis call finishes before the process exits
    let _ = shutdown_tx.send(true);
    let _ = engine_task.await;
    let _ = worker_task.await;
    info!("shutdown complete");
    Ok(())
}

/// Open a connection with the pragmas every subsystem needs: WAL for
/// concurrent readers, foreign keys for the log cascade.
fn open_conn(path: &str) -> anyhow::Result<rusqlite::Connection> {
    let conn = rusqlite::Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }
}
