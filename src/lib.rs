pub mod coach;
pub mod config;
pub mod db;
pub mod engine;
pub mod ipc;
pub mod models;
pub mod parser;
pub mod presets;
pub mod rules;
pub mod sync;
pub mod tailer;
pub mod window;

use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, watch};

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Route tracing to a daily-rolling file under `<data_dir>/logs/` and log
/// panics through it. stdout is reserved for relay output.
pub fn init_logging(data_dir: &Path) -> Result<PathBuf> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "coach.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Lives as long as the process; dropping it would stop the flush thread
    std::mem::forget(guard);

    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("take_care_lib=debug".parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Logging init failed: {}", e))?;

    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown location".to_string());
        let message = if let Some(s) = info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        tracing::error!("PANIC at {}: {}", location, message);
    }));

    Ok(log_dir)
}

// ---------------------------------------------------------------------------
// run: the live coach pipeline
// ---------------------------------------------------------------------------

pub struct RunOptions {
    pub data_dir: PathBuf,
    /// Sync messages from the paired device. None = operator input only.
    pub inbox:    Option<PathBuf>,
    /// Where outbound sync messages are appended. None = discard.
    pub outbox:   Option<PathBuf>,
}

/// Pipeline:
///   inbox tailer -> sync decoder -+
///   stdin reader -> cmd parser   -+-> coach -+-> relay (stdout)
///   interval tick ---------------+           +-> outbox writer
pub async fn run_coach(opts: RunOptions) -> Result<()> {
    let cfg = config::load_or_default(&opts.data_dir)?;
    let db_writer = db::spawn_db_writer(&opts.data_dir.join(db::DB_FILE))?;

    let (sync_tx,   sync_rx)    = mpsc::channel::<sync::SyncMessage>(256);
    let (line_tx,   line_rx)    = mpsc::channel::<String>(256);
    let (action_tx, action_rx)  = mpsc::channel::<parser::LocalAction>(64);
    let (notify_tx, notify_rx)  = mpsc::channel::<ipc::Notification>(128);
    let (snap_tx,   snap_rx)    = mpsc::channel::<ipc::StateSnapshot>(128);
    let (outbox_tx, outbox_rx)  = mpsc::channel::<sync::SyncMessage>(128);
    let (enabled_tx, enabled_rx) = watch::channel(cfg.user.notifications_enabled);

    match opts.inbox.clone() {
        Some(inbox) => {
            let (raw_tx, raw_rx) = mpsc::channel::<String>(2048);
            std::thread::spawn(move || {
                if let Err(e) = tailer::run(inbox, raw_tx) {
                    tracing::error!("Inbox tailer stopped: {}", e);
                }
            });
            tokio::spawn(sync::run(raw_rx, sync_tx));
        }
        None => {
            tracing::info!("No inbox configured, sync input disabled");
            drop(sync_tx);
        }
    }

    std::thread::spawn(move || {
        if let Err(e) = parser::read_lines(std::io::stdin().lock(), line_tx) {
            tracing::warn!("stdin reader stopped: {}", e);
        }
    });
    tokio::spawn(parser::run(line_rx, action_tx));

    let ring  = ipc::NotificationLog::default();
    let relay = tokio::spawn(ipc::run(notify_rx, snap_rx, enabled_rx, ring.clone(), std::io::stdout()));
    let outbox = tokio::spawn(ipc::run_outbox(outbox_rx, opts.outbox.clone()));

    tracing::info!(
        "Coach running: sensitivity={} inbox={:?} outbox={:?}",
        cfg.user.sensitivity_mode.as_str(), opts.inbox, opts.outbox
    );

    let coach = coach::Coach::new(cfg, Some(opts.data_dir.clone()), db_writer.clone());
    let channels = coach::CoachChannels { sync_rx, action_rx, notify_tx, snap_tx, outbox_tx, enabled_tx };

    tokio::select! {
        result = coach::run(coach, channels) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted, shutting down"),
    }

    // Coach dropped its senders; let the sinks drain
    relay.await??;
    outbox.await??;
    db_writer.shutdown();

    tracing::info!(
        "Coach stopped after {} notifications ({} in memory)",
        ring.total(), ring.recent().len()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// evaluate: one-shot replay of the pacing engine
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ReplayInput {
    pub events:            Vec<window::ConsumptionEvent>,
    #[serde(default)]
    pub settings:          engine::EvaluationSettings,
    pub now_ms:            u64,
    #[serde(default)]
    pub recent_advisories: Vec<engine::AdvisoryEvent>,
}

pub fn replay_evaluate(raw: &str) -> Result<engine::EvaluationResult> {
    let input: ReplayInput = serde_json::from_str(raw)
        .map_err(|e| anyhow::anyhow!("Replay input parse error: {}", e))?;
    Ok(engine::evaluate(&input.events, &input.settings, input.now_ms, &input.recent_advisories))
}

// ---------------------------------------------------------------------------
// history: read-only journal report
// ---------------------------------------------------------------------------

pub fn session_history(data_dir: &Path, limit: usize) -> Result<Vec<db::SessionHistoryRow>> {
    db::session_history(&data_dir.join(db::DB_FILE), limit)
}
