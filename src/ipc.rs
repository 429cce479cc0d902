/// Relay: delivers coach output to the outside world.
///
/// Two sinks:
///   • stdout: one JSON object per line, tagged by `"kind"`, for whatever UI
///     or notifier is reading this process.
///   • outbox: outbound `SyncMessage`s appended as JSON lines for the paired
///     device to pick up.
///
/// Notifications are only printed while the user has notifications enabled;
/// they are journaled and ring-buffered regardless.
use crate::{
    engine::{AdvisoryCode, EventToEmit, EventType, PaceStatus},
    sync::{self, SyncMessage},
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc::Receiver, watch};
use uuid::Uuid;

/// How many notifications the relay remembers.
pub const NOTIFICATION_RING_CAP: usize = 50;

// ---------------------------------------------------------------------------
// Payload types (serialised as JSON lines)
// ---------------------------------------------------------------------------

/// One advisory the user should see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub session_id:   Uuid,
    pub timestamp_ms: u64,
    pub event_type:   EventType,
    pub code:         AdvisoryCode,
    pub message:      String,
    pub severity:     u8,
}

impl Notification {
    pub fn from_advisory(session_id: Uuid, timestamp_ms: u64, event: &EventToEmit) -> Self {
        Self {
            session_id,
            timestamp_ms,
            event_type: event.event_type,
            code:       event.code,
            message:    event.message.clone(),
            severity:   event.severity,
        }
    }
}

/// Current state of the coached night, sent after every input the coach
/// processes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Active session, or None between sessions.
    pub session_id:                   Option<Uuid>,
    pub pace_status:                  PaceStatus,
    pub alcoholic_count:              usize,
    pub standard_units:               f64,
    pub minutes_since_last_alcoholic: Option<u64>,
    pub last_message:                 Option<String>,
    pub next_check_interval_seconds:  Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum RelayLine<'a> {
    Notification(&'a Notification),
    State(&'a StateSnapshot),
}

// ---------------------------------------------------------------------------
// Ring buffer
// ---------------------------------------------------------------------------

/// Last `NOTIFICATION_RING_CAP` notifications, oldest first, plus a running
/// total of everything ever pushed.
#[derive(Clone, Default)]
pub struct NotificationLog {
    inner: Arc<Mutex<VecDeque<Notification>>>,
    total: Arc<AtomicUsize>,
}

impl NotificationLog {
    pub fn push(&self, notification: Notification) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut q) = self.inner.lock() {
            q.push_back(notification);
            if q.len() > NOTIFICATION_RING_CAP {
                q.pop_front();
            }
        }
    }

    pub fn recent(&self) -> Vec<Notification> {
        self.inner
            .lock()
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Relay task
// ---------------------------------------------------------------------------

/// Drains notifications and snapshots, writing each as a JSON line to `out`.
pub async fn run<W: Write + Send>(
    mut notify_rx: Receiver<Notification>,
    mut snap_rx:   Receiver<StateSnapshot>,
    enabled:       watch::Receiver<bool>,
    ring:          NotificationLog,
    mut out:       W,
) -> Result<()> {
    loop {
        tokio::select! {
            Some(notification) = notify_rx.recv() => {
                if *enabled.borrow() {
                    write_line(&mut out, &RelayLine::Notification(&notification))?;
                } else {
                    tracing::debug!("Notifications off, suppressed {}", notification.code.as_str());
                }
                ring.push(notification);
            }
            Some(snap) = snap_rx.recv() => {
                write_line(&mut out, &RelayLine::State(&snap))?;
            }
            else => break,
        }
    }
    Ok(())
}

fn write_line<W: Write>(out: &mut W, line: &RelayLine<'_>) -> Result<()> {
    serde_json::to_writer(&mut *out, line)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

/// Appends outbound sync messages to the outbox file, one per line.
/// With no outbox configured the messages are dropped.
pub async fn run_outbox(mut rx: Receiver<SyncMessage>, outbox_path: Option<PathBuf>) -> Result<()> {
    if let Some(parent) = outbox_path.as_ref().and_then(|p| p.parent()) {
        std::fs::create_dir_all(parent)?;
    }

    while let Some(msg) = rx.recv().await {
        let Some(path) = outbox_path.as_ref() else {
            tracing::debug!("No outbox configured, dropping {}", msg.kind());
            continue;
        };
        let raw = match sync::encode(&msg) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Outbox encode error: {}", e);
                continue;
            }
        };
        let appended = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut f| writeln!(f, "{}", raw));
        if let Err(e) = appended {
            tracing::warn!("Outbox write error for {:?}: {}", path, e);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::water_check;
    use tokio::sync::mpsc;

    fn note(ts: u64) -> Notification {
        Notification::from_advisory(Uuid::nil(), ts, &water_check())
    }

    #[test]
    fn ring_keeps_last_fifty() {
        let ring = NotificationLog::default();
        for ts in 0..60 {
            ring.push(note(ts));
        }
        let recent = ring.recent();
        assert_eq!(recent.len(), NOTIFICATION_RING_CAP);
        assert_eq!(recent[0].timestamp_ms, 10);
        assert_eq!(recent.last().unwrap().timestamp_ms, 59);
        assert_eq!(ring.total(), 60);
    }

    #[tokio::test]
    async fn writes_tagged_json_lines() {
        let (n_tx, n_rx) = mpsc::channel(4);
        let (s_tx, s_rx) = mpsc::channel(4);
        let (_en_tx, en_rx) = watch::channel(true);
        let ring = NotificationLog::default();

        n_tx.send(note(7)).await.unwrap();
        s_tx.send(StateSnapshot::default()).await.unwrap();
        drop(n_tx);
        drop(s_tx);

        let mut out = Vec::new();
        run(n_rx, s_rx, en_rx, ring.clone(), &mut out).await.unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().any(|l| l.contains(r#""kind":"notification""#) && l.contains("Water check")));
        assert!(lines.iter().any(|l| l.contains(r#""kind":"state""#) && l.contains(r#""pace_status":"good""#)));
        assert_eq!(ring.recent().len(), 1);
    }

    #[tokio::test]
    async fn suppresses_output_when_disabled() {
        let (n_tx, n_rx) = mpsc::channel(4);
        let (_s_tx, s_rx) = mpsc::channel::<StateSnapshot>(4);
        let (_en_tx, en_rx) = watch::channel(false);
        let ring = NotificationLog::default();

        n_tx.send(note(1)).await.unwrap();
        drop(n_tx);
        drop(_s_tx);

        let mut out = Vec::new();
        run(n_rx, s_rx, en_rx, ring.clone(), &mut out).await.unwrap();
        assert!(out.is_empty());
        assert_eq!(ring.recent().len(), 1);
    }

    #[tokio::test]
    async fn outbox_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("outbox.jsonl");
        let (tx, rx) = mpsc::channel(4);

        let id = Uuid::new_v4();
        tx.send(SyncMessage::SessionEnded { session_id: id, ended_at_ms: 9 }).await.unwrap();
        tx.send(SyncMessage::SessionEnded { session_id: id, ended_at_ms: 10 }).await.unwrap();
        drop(tx);
        run_outbox(rx, Some(path.clone())).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let decoded: Vec<SyncMessage> = raw.lines().map(|l| sync::decode(l).unwrap()).collect();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[1], SyncMessage::SessionEnded { session_id: id, ended_at_ms: 10 });
    }
}
