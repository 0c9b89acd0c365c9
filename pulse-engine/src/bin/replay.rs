use pulse_engine::{
    AccumulationEngine, EngineError, ExportFormat, FileStore, JsonLinesFeed, KeyValueStore,
    MemoryStore, Pacing, Scheduler, TickReport, config::env_var_or,
};
use std::{path::PathBuf, sync::Arc};
use tokio::{
    io::{AsyncBufRead, BufReader},
    sync::mpsc,
};
use tracing::{error, info, warn};

/// Replays a JSON-lines feed through the detector, printing one report per tick.
///
/// Environment:
/// - `PULSE_INPUT`: feed file, stdin when unset
/// - `PULSE_STATE_DIR`: directory for persisted weights, history and config (in-memory when unset)
/// - `PULSE_EXPORT`: directory the signal history is exported to at the end
/// - `PULSE_LIVE`: pace ticks at the configured interval instead of replaying back to back
/// - `PULSE_LOG_JSON`: emit logs as JSON
#[tokio::main]
async fn main() {
    init_logging();

    if let Err(error) = run().await {
        error!(%error, "replay failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), EngineError> {
    let store: Arc<dyn KeyValueStore> = match std::env::var("PULSE_STATE_DIR") {
        Ok(dir) => Arc::new(FileStore::open(dir)?),
        Err(_) => Arc::new(MemoryStore::new()),
    };
    let engine = AccumulationEngine::from_store(store.as_ref());
    let config = engine.config().clone();
    info!(
        scalping = config.scalping_mode,
        capacity = config.history_capacity(),
        signals = engine.learner().history().len(),
        "detector initialised"
    );

    let pacing = if env_var_or("PULSE_LIVE", false) {
        Pacing::Interval(config.tick_interval())
    } else {
        Pacing::Unpaced
    };

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match std::env::var("PULSE_INPUT") {
        Ok(path) => Box::new(BufReader::new(tokio::fs::File::open(path).await?)),
        Err(_) => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<TickReport>();
    let printer = tokio::spawn(async move {
        while let Some(report) = rx.recv().await {
            match serde_json::to_string(&report) {
                Ok(line) => println!("{line}"),
                Err(error) => warn!(%error, "failed to serialise tick report"),
            }
        }
    });

    let engine = Scheduler::new(engine, JsonLinesFeed::new(reader), store)
        .with_pacing(pacing)
        .with_reports(tx)
        .run()
        .await?;

    if let Err(error) = printer.await {
        warn!(%error, "report printer stopped");
    }

    let stats = engine.stats();
    info!(
        ticks = stats.ticks,
        skipped = stats.skipped_ticks,
        confirmed = stats.confirmed_signals,
        successful = stats.successful_signals,
        pending = stats.pending_signals,
        success_rate = ?stats.ml_success_rate,
        best_condition = ?stats.best_condition.map(|(c, accuracy)| (c.as_str(), accuracy)),
        "replay finished"
    );

    if let Ok(dir) = std::env::var("PULSE_EXPORT") {
        export(&engine, config.export_history_format, PathBuf::from(dir)).await?;
    }

    Ok(())
}

async fn export(
    engine: &AccumulationEngine,
    format: ExportFormat,
    dir: PathBuf,
) -> Result<(), EngineError> {
    let path = dir.join(format.file_name());
    tokio::fs::create_dir_all(&dir).await?;
    tokio::fs::write(&path, engine.export(format)?).await?;
    info!(path = %path.display(), format = format.extension(), "signal history exported");
    Ok(())
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // Reports go to stdout, so logs stay on stderr
    if env_var_or("PULSE_LOG_JSON", false) {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}
