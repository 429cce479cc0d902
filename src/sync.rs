/// Sync boundary: line-delimited JSON messages exchanged with the paired
/// device.
///
/// Every message is a single JSON object with a `"type"` discriminator:
///
///   {"type":"session_started","session":{...}}
///   {"type":"drink_logged","log":{...}}
///   {"type":"session_ended","session_id":"...","ended_at_ms":1700000000000}
///   {"type":"settings_changed","settings":{...}}
///   {"type":"drink_types_changed","drink_types":[...]}
///
/// Inbound lines arrive through the inbox tailer; outbound messages are
/// written to the outbox by the relay.
use crate::models::{DrinkLog, DrinkTypeConfig, Session, UserSettings};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::{Receiver, Sender};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncMessage {
    SessionStarted    { session: Session },
    DrinkLogged       { log: DrinkLog },
    SessionEnded      { session_id: Uuid, ended_at_ms: u64 },
    SettingsChanged   { settings: UserSettings },
    DrinkTypesChanged { drink_types: Vec<DrinkTypeConfig> },
}

impl SyncMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionStarted    { .. } => "session_started",
            Self::DrinkLogged       { .. } => "drink_logged",
            Self::SessionEnded      { .. } => "session_ended",
            Self::SettingsChanged   { .. } => "settings_changed",
            Self::DrinkTypesChanged { .. } => "drink_types_changed",
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("empty sync line")]
    Empty,
    #[error("malformed sync message: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub fn decode(line: &str) -> Result<SyncMessage, SyncError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(SyncError::Empty);
    }
    Ok(serde_json::from_str(trimmed)?)
}

pub fn encode(msg: &SyncMessage) -> Result<String, SyncError> {
    Ok(serde_json::to_string(msg)?)
}

/// Async task: decode inbox lines and forward the messages to the coach.
pub async fn run(mut rx: Receiver<String>, tx: Sender<SyncMessage>) -> anyhow::Result<()> {
    while let Some(line) = rx.recv().await {
        match decode(&line) {
            Ok(msg) => {
                tracing::debug!("Sync inbound: {}", msg.kind());
                if tx.send(msg).await.is_err() {
                    break;
                }
            }
            Err(SyncError::Empty) => {}
            Err(e) => tracing::warn!("Dropping inbox line: {}", e),
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
    use crate::{
        models::{default_drink_types, SourceDevice},
        presets::SensitivityMode,
    };
    use tokio::sync::mpsc;

    #[test]
    fn decodes_session_ended() {
        let id = Uuid::new_v4();
        let line = format!(
            r#"{{"type":"session_ended","session_id":"{}","ended_at_ms":5000}}"#,
            id
        );
        match decode(&line).unwrap() {
            SyncMessage::SessionEnded { session_id, ended_at_ms } => {
                assert_eq!(session_id, id);
                assert_eq!(ended_at_ms, 5_000);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn decodes_drink_log_from_watch() {
        let line = r#"{"type":"drink_logged","log":{
            "id":"6f1c1f5e-8a55-4c8e-9a57-3f4f0c3c1b2a",
            "session_id":"0b6d7c1e-2a1f-4e3b-8a6c-5d4e3f2a1b0c",
            "timestamp_ms":1000,"drink_type_id":"shot","standard_units":1.0,
            "is_alcoholic":true,"source_device":"watch"}}"#;
        match decode(line).unwrap() {
            SyncMessage::DrinkLogged { log } => {
                assert_eq!(log.drink_type_id, "shot");
                assert_eq!(log.source_device, SourceDevice::Watch);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn settings_message_tolerates_partial_payload() {
        let line = r#"{"type":"settings_changed","settings":{"sensitivity_mode":"strict"}}"#;
        match decode(line).unwrap() {
            SyncMessage::SettingsChanged { settings } => {
                assert_eq!(settings.sensitivity_mode, SensitivityMode::Strict);
                assert_eq!(settings.hydration_cadence, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn encode_carries_type_tag() {
        let msg = SyncMessage::DrinkTypesChanged { drink_types: default_drink_types() };
        let raw = encode(&msg).unwrap();
        assert!(raw.starts_with(r#"{"type":"drink_types_changed""#));
        assert_eq!(decode(&raw).unwrap(), msg);
    }

    #[test]
    fn rejects_blank_and_unknown() {
        assert!(matches!(decode("   "), Err(SyncError::Empty)));
        assert!(matches!(decode(r#"{"type":"mystery"}"#), Err(SyncError::Malformed(_))));
        assert!(matches!(decode("not json"), Err(SyncError::Malformed(_))));
    }

    #[tokio::test]
    async fn run_skips_bad_lines() {
        let (raw_tx, raw_rx) = mpsc::channel(8);
        let (msg_tx, mut msg_rx) = mpsc::channel(8);
        let task = tokio::spawn(run(raw_rx, msg_tx));

        let id = Uuid::new_v4();
        raw_tx.send("garbage".to_owned()).await.unwrap();
        raw_tx.send(String::new()).await.unwrap();
        raw_tx
            .send(format!(r#"{{"type":"session_ended","session_id":"{}","ended_at_ms":1}}"#, id))
            .await
            .unwrap();
        drop(raw_tx);

        let msg = msg_rx.recv().await.unwrap();
        assert_eq!(msg.kind(), "session_ended");
        assert!(msg_rx.recv().await.is_none());
        task.await.unwrap().unwrap();
    }
}
