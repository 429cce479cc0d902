/// Coach actor. Owns every session, drink log and advisory history and is
/// the only task that calls the pacing engine.
///
/// Inputs arrive on three channels (sync messages from the paired device,
/// operator actions from stdin, and a periodic tick). Each input is applied
/// to `Coach` with a wall-clock timestamp and produces a `CoachOutput` that
/// the run loop fans out to the relay and the outbox.
///
/// Advisories are journaled before they join the in-memory history, so a
/// restart never forgets a cooldown that was already announced.
use crate::{
    config::{self, AppConfig},
    db::DbWriter,
    engine::{self, AdvisoryEvent, EvaluationResult, PaceStatus},
    ipc::{Notification, StateSnapshot},
    models::{upsert_drink_types, DrinkLog, Session},
    parser::LocalAction,
    sync::SyncMessage,
    window::{self, ConsumptionEvent},
};
use anyhow::Result;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc::{Receiver, Sender}, watch};
use uuid::Uuid;

const MS_PER_MINUTE: u64 = 60_000;

// ---------------------------------------------------------------------------
// Per-session state
// ---------------------------------------------------------------------------

struct SessionState {
    session:      Session,
    logs:         Vec<DrinkLog>,
    history:      VecDeque<AdvisoryEvent>,
    pace:         PaceStatus,
    last_message: Option<String>,
}

impl SessionState {
    fn new(session: Session, history: Vec<AdvisoryEvent>) -> Self {
        Self {
            session,
            logs:         Vec::new(),
            history:      history.into(),
            pace:         PaceStatus::Good,
            last_message: None,
        }
    }

    fn consumption_events(&self) -> Vec<ConsumptionEvent> {
        self.logs.iter().map(DrinkLog::to_consumption_event).collect()
    }

    fn has_log(&self, id: Uuid) -> bool {
        self.logs.iter().any(|l| l.id == id)
    }

    fn push_history(&mut self, event: AdvisoryEvent, cap: usize) {
        self.history.push_back(event);
        while self.history.len() > cap {
            self.history.pop_front();
        }
    }
}

/// Everything one input produced, in emission order.
#[derive(Debug, Default)]
pub struct CoachOutput {
    pub notifications: Vec<Notification>,
    pub outbound:      Vec<SyncMessage>,
    pub snapshot:      Option<StateSnapshot>,
}

// ---------------------------------------------------------------------------
// Coach
// ---------------------------------------------------------------------------

pub struct Coach {
    config:     AppConfig,
    /// Where settings pushed by the paired device are saved. None = memory only.
    config_dir: Option<PathBuf>,
    db:         DbWriter,
    sessions:   HashMap<Uuid, SessionState>,
    active:     Option<Uuid>,
}

impl Coach {
    pub fn new(config: AppConfig, config_dir: Option<PathBuf>, db: DbWriter) -> Self {
        Self {
            config,
            config_dir,
            db,
            sessions: HashMap::new(),
            active:   None,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn active_session(&self) -> Option<&Session> {
        self.active
            .and_then(|id| self.sessions.get(&id))
            .map(|s| &s.session)
    }

    pub fn logs(&self, session_id: Uuid) -> &[DrinkLog] {
        self.sessions
            .get(&session_id)
            .map(|s| s.logs.as_slice())
            .unwrap_or(&[])
    }

    pub fn history(&self, session_id: Uuid) -> Vec<AdvisoryEvent> {
        self.sessions
            .get(&session_id)
            .map(|s| s.history.iter().cloned().collect())
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Local actions
    // -----------------------------------------------------------------------

    pub async fn handle_action(&mut self, action: LocalAction, now_ms: u64) -> Result<CoachOutput> {
        let mut out = CoachOutput::default();
        match action {
            LocalAction::Start => {
                if self.active.is_some() {
                    tracing::info!("Session already active, ignoring start");
                } else {
                    self.start_local_session(now_ms, &mut out);
                }
            }

            LocalAction::Log { drink_type_id } => {
                let Some(drink_type) = self
                    .config
                    .drink_types
                    .iter()
                    .find(|t| t.id == drink_type_id && t.is_enabled)
                    .cloned()
                else {
                    tracing::warn!("Unknown or disabled drink type '{}'", drink_type_id);
                    out.snapshot = Some(self.snapshot(now_ms));
                    return Ok(out);
                };

                let session_id = match self.active {
                    Some(id) => id,
                    None => self.start_local_session(now_ms, &mut out),
                };

                let log = DrinkLog::from_config(session_id, &drink_type, now_ms, self.config.source_device);
                tracing::info!("Logged {} ({} units)", log.drink_type_id, log.standard_units);
                if let Some(state) = self.sessions.get_mut(&session_id) {
                    state.logs.push(log.clone());
                }
                out.outbound.push(SyncMessage::DrinkLogged { log });
                self.evaluate_and_persist(session_id, now_ms, &mut out).await?;
            }

            LocalAction::Undo => {
                if let Some(id) = self.active {
                    if let Some(state) = self.sessions.get_mut(&id) {
                        let latest = state
                            .logs
                            .iter()
                            .enumerate()
                            .max_by_key(|(_, l)| l.timestamp_ms)
                            .map(|(i, _)| i);
                        match latest {
                            Some(i) => {
                                let removed = state.logs.remove(i);
                                tracing::info!("Undid {} logged at {}", removed.drink_type_id, removed.timestamp_ms);
                            }
                            None => tracing::info!("Nothing to undo"),
                        }
                    }
                    self.refresh_pace(id, now_ms);
                }
            }

            LocalAction::End => match self.active {
                Some(id) => self.end_session(id, now_ms, &mut out),
                None => tracing::info!("No active session to end"),
            },

            LocalAction::Tick => return self.tick(now_ms).await,
        }

        out.snapshot = Some(self.snapshot(now_ms));
        Ok(out)
    }

    /// Periodic re-evaluation. Ends the active session once its last
    /// alcoholic drink is older than the session's auto-end timeout.
    pub async fn tick(&mut self, now_ms: u64) -> Result<CoachOutput> {
        let mut out = CoachOutput::default();

        if let Some(id) = self.active {
            if self.should_auto_end(id, now_ms) {
                tracing::info!("Auto-ending session {} after inactivity", id);
                self.end_session(id, now_ms, &mut out);
            } else {
                self.evaluate_and_persist(id, now_ms, &mut out).await?;
            }
        }

        out.snapshot = Some(self.snapshot(now_ms));
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Sync messages
    // -----------------------------------------------------------------------

    pub async fn handle_sync(&mut self, msg: SyncMessage, now_ms: u64) -> Result<CoachOutput> {
        let mut out = CoachOutput::default();
        match msg {
            SyncMessage::SessionStarted { session } => {
                if self.sessions.contains_key(&session.id) {
                    tracing::debug!("Duplicate session {} ignored", session.id);
                } else {
                    self.adopt_session(session, false).await?;
                }
            }

            SyncMessage::DrinkLogged { log } => {
                if self.sessions.values().any(|s| s.has_log(log.id)) {
                    tracing::debug!("Duplicate drink log {} ignored", log.id);
                    out.snapshot = Some(self.snapshot(now_ms));
                    return Ok(out);
                }
                if !self.sessions.contains_key(&log.session_id) {
                    tracing::info!("Log for unknown session {}, creating it", log.session_id);
                    let session = Session::implicit(log.session_id, log.timestamp_ms);
                    self.adopt_session(session, true).await?;
                }
                let session_id = log.session_id;
                if let Some(state) = self.sessions.get_mut(&session_id) {
                    state.logs.push(log);
                }
                if self.active == Some(session_id) {
                    self.evaluate_and_persist(session_id, now_ms, &mut out).await?;
                }
            }

            SyncMessage::SessionEnded { session_id, ended_at_ms } => {
                let known_active = self
                    .sessions
                    .get(&session_id)
                    .map(|s| s.session.is_active());
                match known_active {
                    Some(true) => {
                        if let Some(state) = self.sessions.get_mut(&session_id) {
                            state.session.ended_at_ms = Some(ended_at_ms);
                        }
                        self.db.end_session(session_id, ended_at_ms);
                        if self.active == Some(session_id) {
                            self.active = None;
                        }
                        tracing::info!("Session {} ended by paired device", session_id);
                    }
                    Some(false) => {}
                    None => tracing::debug!("End for unknown session {} ignored", session_id),
                }
            }

            SyncMessage::SettingsChanged { settings } => {
                tracing::info!(
                    "Settings updated: sensitivity={} hydration={} cadence={}",
                    settings.sensitivity_mode.as_str(),
                    settings.hydration_reminders_enabled,
                    settings.hydration_cadence
                );
                self.config.user = settings;
                self.persist_config();
            }

            SyncMessage::DrinkTypesChanged { drink_types } => {
                upsert_drink_types(&mut self.config.drink_types, drink_types);
                self.persist_config();
            }
        }

        out.snapshot = Some(self.snapshot(now_ms));
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn start_local_session(&mut self, now_ms: u64, out: &mut CoachOutput) -> Uuid {
        let session = Session::start(&self.config.user, now_ms);
        let id = session.id;
        tracing::info!("Session {} started ({})", id, session.sensitivity_mode.as_str());
        self.db.upsert_session(&session);
        out.outbound.push(SyncMessage::SessionStarted { session: session.clone() });
        self.sessions.insert(id, SessionState::new(session, Vec::new()));
        self.active = Some(id);
        id
    }

    /// Register a session first seen through sync. Advisory history is
    /// reloaded from the journal in case an earlier run already coached it.
    /// An `implicit` placeholder never overwrites a journaled session row.
    async fn adopt_session(&mut self, session: Session, implicit: bool) -> Result<()> {
        let id = session.id;
        if implicit {
            self.db.insert_session_if_absent(&session);
        } else {
            self.db.upsert_session(&session);
        }
        let history = self
            .db
            .recent_advisories(id, self.config.recent_advisory_cap)
            .await?;
        if !history.is_empty() {
            tracing::info!("Reloaded {} advisories for session {}", history.len(), id);
        }
        if session.is_active() && self.active.is_none() {
            self.active = Some(id);
        }
        self.sessions.insert(id, SessionState::new(session, history));
        Ok(())
    }

    fn end_session(&mut self, id: Uuid, now_ms: u64, out: &mut CoachOutput) {
        if let Some(state) = self.sessions.get_mut(&id) {
            state.session.ended_at_ms = Some(now_ms);
        }
        self.db.end_session(id, now_ms);
        out.outbound.push(SyncMessage::SessionEnded { session_id: id, ended_at_ms: now_ms });
        if self.active == Some(id) {
            self.active = None;
        }
        tracing::info!("Session {} ended", id);
    }

    fn should_auto_end(&self, id: Uuid, now_ms: u64) -> bool {
        let Some(state) = self.sessions.get(&id) else {
            return false;
        };
        let events = state.consumption_events();
        match window::time_since_last_alcoholic(now_ms, &events) {
            Some(idle_ms) => idle_ms >= state.session.auto_end_timeout_minutes as u64 * MS_PER_MINUTE,
            None => false,
        }
    }

    fn run_engine(&self, id: Uuid, now_ms: u64) -> Option<EvaluationResult> {
        let state = self.sessions.get(&id)?;
        let events   = state.consumption_events();
        let history: Vec<AdvisoryEvent> = state.history.iter().cloned().collect();
        let settings = self.config.user.evaluation_settings();
        Some(engine::evaluate(&events, &settings, now_ms, &history))
    }

    async fn evaluate_and_persist(&mut self, id: Uuid, now_ms: u64, out: &mut CoachOutput) -> Result<()> {
        let Some(result) = self.run_engine(id, now_ms) else {
            return Ok(());
        };

        for event in &result.events_to_emit {
            if let Err(e) = self.db.insert_advisory(id, now_ms, event.clone()).await {
                tracing::error!("Failed to journal {}: {}", event.code.as_str(), e);
            }
            let cap = self.config.recent_advisory_cap;
            if let Some(state) = self.sessions.get_mut(&id) {
                state.push_history(event.to_advisory(now_ms), cap);
                state.last_message = Some(event.message.clone());
            }
            out.notifications.push(Notification::from_advisory(id, now_ms, event));
        }

        if let Some(state) = self.sessions.get_mut(&id) {
            state.pace = result.pace_status;
        }
        Ok(())
    }

    /// Re-evaluate for pace only. Anything the engine wants to emit is dropped.
    fn refresh_pace(&mut self, id: Uuid, now_ms: u64) {
        if let Some(result) = self.run_engine(id, now_ms) {
            if let Some(state) = self.sessions.get_mut(&id) {
                state.pace = result.pace_status;
            }
        }
    }

    fn persist_config(&self) {
        if let Some(dir) = &self.config_dir {
            if let Err(e) = config::save(&self.config, dir) {
                tracing::warn!("Failed to save config: {}", e);
            }
        }
    }

    pub fn snapshot(&self, now_ms: u64) -> StateSnapshot {
        let Some(state) = self.active.and_then(|id| self.sessions.get(&id)) else {
            return StateSnapshot::default();
        };
        let events = state.consumption_events();
        StateSnapshot {
            session_id:                   Some(state.session.id),
            pace_status:                  state.pace,
            alcoholic_count:              window::total_alcoholic_count(now_ms, &events),
            standard_units:               events
                .iter()
                .filter(|e| e.is_alcoholic && e.timestamp_ms <= now_ms)
                .map(|e| e.standard_units)
                .sum(),
            minutes_since_last_alcoholic: window::time_since_last_alcoholic(now_ms, &events)
                .map(|ms| ms / MS_PER_MINUTE),
            last_message:                 state.last_message.clone(),
            next_check_interval_seconds:  Some(engine::NEXT_CHECK_INTERVAL_SECONDS),
        }
    }
}

// ---------------------------------------------------------------------------
// Main coach task
// ---------------------------------------------------------------------------

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub struct CoachChannels {
    pub sync_rx:     Receiver<SyncMessage>,
    pub action_rx:   Receiver<LocalAction>,
    pub notify_tx:   Sender<Notification>,
    pub snap_tx:     Sender<StateSnapshot>,
    pub outbox_tx:   Sender<SyncMessage>,
    /// Mirrors `notifications_enabled` for the relay.
    pub enabled_tx:  watch::Sender<bool>,
}

pub async fn run(mut coach: Coach, channels: CoachChannels) -> Result<()> {
    let CoachChannels { mut sync_rx, mut action_rx, notify_tx, snap_tx, outbox_tx, enabled_tx } = channels;

    let tick_secs = coach
        .config()
        .tick_interval_seconds
        .unwrap_or(engine::NEXT_CHECK_INTERVAL_SECONDS as u64)
        .max(1);
    let mut ticker = tokio::time::interval(Duration::from_secs(tick_secs));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    enabled_tx.send_replace(coach.config().user.notifications_enabled);

    let mut sync_open    = true;
    let mut actions_open = true;
    while sync_open || actions_open {
        let output = tokio::select! {
            maybe = sync_rx.recv(), if sync_open => match maybe {
                Some(msg) => coach.handle_sync(msg, now_ms()).await?,
                None => {
                    sync_open = false;
                    continue;
                }
            },
            maybe = action_rx.recv(), if actions_open => match maybe {
                Some(action) => coach.handle_action(action, now_ms()).await?,
                None => {
                    tracing::debug!("Command channel closed");
                    actions_open = false;
                    continue;
                }
            },
            _ = ticker.tick() => coach.tick(now_ms()).await?,
        };

        enabled_tx.send_if_modified(|enabled| {
            let wanted = coach.config().user.notifications_enabled;
            let changed = *enabled != wanted;
            *enabled = wanted;
            changed
        });

        for msg in output.outbound {
            if outbox_tx.send(msg).await.is_err() {
                return Ok(());
            }
        }
        for notification in output.notifications {
            if notify_tx.send(notification).await.is_err() {
                return Ok(());
            }
        }
        if let Some(snap) = output.snapshot {
            let _ = snap_tx.try_send(snap); // Drop if the relay is slow
        }
    }
    Ok(())
}
