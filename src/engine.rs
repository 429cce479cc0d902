/// Pacing evaluator, the "brain" of the coach.
///
/// `evaluate` is a pure function of (consumption log, settings, now, advisory
/// history). It resolves the sensitivity preset, runs the six pacing rules in
/// a fixed order, dedupes each rule through its own cooldown window, and
/// classifies the current pace. Nothing is cached between calls: cooldown
/// state is rebuilt from the supplied history every time, so re-running with
/// the same inputs yields the same result.
///
/// Per-rule cooldowns:
///   warnings               → 15 min
///   hydrate                → 20 min
///   positive_reinforcement → 60 min
use crate::{
    presets::SensitivityMode,
    rules::{
        escalation, fast_pace, hydration, positive_reinforcement, rapid_repeat, shot_stacking,
        RuleContext, RuleOutput,
    },
    window::ConsumptionEvent,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Poll cadence hint handed back to the caller's scheduler on every path.
pub const NEXT_CHECK_INTERVAL_SECONDS: f64 = 60.0;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvisoryCode {
    RapidRepeat,
    FastPace,
    Escalation,
    ShotStacking,
    Hydrate,
    PositiveReinforcement,
}

impl AdvisoryCode {
    pub const WARNINGS: [AdvisoryCode; 4] = [
        AdvisoryCode::RapidRepeat,
        AdvisoryCode::FastPace,
        AdvisoryCode::Escalation,
        AdvisoryCode::ShotStacking,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RapidRepeat           => "rapid_repeat",
            Self::FastPace              => "fast_pace",
            Self::Escalation            => "escalation",
            Self::ShotStacking          => "shot_stacking",
            Self::Hydrate               => "hydrate",
            Self::PositiveReinforcement => "positive_reinforcement",
        }
    }

    pub fn from_str_opt(raw: &str) -> Option<Self> {
        match raw {
            "rapid_repeat"           => Some(Self::RapidRepeat),
            "fast_pace"              => Some(Self::FastPace),
            "escalation"             => Some(Self::Escalation),
            "shot_stacking"          => Some(Self::ShotStacking),
            "hydrate"                => Some(Self::Hydrate),
            "positive_reinforcement" => Some(Self::PositiveReinforcement),
            _ => None,
        }
    }

    pub fn is_warning(&self) -> bool {
        Self::WARNINGS.contains(self)
    }

    /// Lowest pace status implied by this code firing.
    pub fn pace_floor(&self) -> PaceStatus {
        match self {
            Self::RapidRepeat | Self::ShotStacking => PaceStatus::Caution,
            Self::FastPace | Self::Escalation      => PaceStatus::SlowDown,
            Self::Hydrate | Self::PositiveReinforcement => PaceStatus::Good,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Warning,
    Reminder,
    PositiveReinforcement,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warning               => "warning",
            Self::Reminder              => "reminder",
            Self::PositiveReinforcement => "positive_reinforcement",
        }
    }
}

/// Session pace classification. Ordered: good < caution < slowDown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PaceStatus {
    #[default]
    Good,
    Caution,
    SlowDown,
}

/// A previously emitted advisory. Only used for cooldown dedupe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryEvent {
    pub timestamp_ms: u64,
    pub code:         AdvisoryCode,
    pub severity:     u8,
}

/// An advisory the caller should persist and deliver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventToEmit {
    pub event_type: EventType,
    pub code:       AdvisoryCode,
    pub message:    String,
    pub severity:   u8,
}

impl EventToEmit {
    /// History record for this advisory, stamped at `timestamp_ms`.
    pub fn to_advisory(&self, timestamp_ms: u64) -> AdvisoryEvent {
        AdvisoryEvent { timestamp_ms, code: self.code, severity: self.severity }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSettings {
    #[serde(default)]
    pub sensitivity_mode:            SensitivityMode,
    #[serde(default)]
    pub hydration_reminders_enabled: bool,
    /// Every N alcoholic drinks; 0 or negative disables the cadence reminder.
    #[serde(default)]
    pub hydration_cadence:           i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub events_to_emit:             Vec<EventToEmit>,
    pub pace_status:                PaceStatus,
    pub next_check_interval_seconds: Option<f64>,
}

// ---------------------------------------------------------------------------
// Advice dedup / cooldown
// ---------------------------------------------------------------------------

/// Latest firing time per code, seeded from the history and extended as
/// rules fire within the current call.
pub struct CooldownLedger {
    last_fired_ms: HashMap<AdvisoryCode, u64>,
}

impl CooldownLedger {
    pub fn from_history(history: &[AdvisoryEvent]) -> Self {
        let mut last_fired_ms = HashMap::new();
        for a in history {
            let slot = last_fired_ms.entry(a.code).or_insert(a.timestamp_ms);
            if a.timestamp_ms > *slot {
                *slot = a.timestamp_ms;
            }
        }
        Self { last_fired_ms }
    }

    /// `code` fired at or after `now_ms - cooldown_minutes`.
    pub fn recently_fired(&self, code: AdvisoryCode, cooldown_minutes: u64, now_ms: u64) -> bool {
        let cutoff = now_ms.saturating_sub(cooldown_minutes.saturating_mul(60_000));
        self.last_fired_ms
            .get(&code)
            .map(|&t| t >= cutoff)
            .unwrap_or(false)
    }

    pub fn mark_fired(&mut self, code: AdvisoryCode, now_ms: u64) {
        let slot = self.last_fired_ms.entry(code).or_insert(now_ms);
        if now_ms > *slot {
            *slot = now_ms;
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

type Rule = fn(&RuleContext) -> RuleOutput;

/// Evaluation order matters: escalation's hydration reminder precedes the
/// cadence reminder, and at most one `hydrate` goes out per call.
const RULES: [Rule; 6] = [
    rapid_repeat::evaluate,
    fast_pace::evaluate,
    escalation::evaluate,
    shot_stacking::evaluate,
    hydration::evaluate,
    positive_reinforcement::evaluate,
];

pub fn evaluate(
    events:   &[ConsumptionEvent],
    settings: &EvaluationSettings,
    now_ms:   u64,
    history:  &[AdvisoryEvent],
) -> EvaluationResult {
    let preset     = settings.sensitivity_mode.preset();
    let mut ledger = CooldownLedger::from_history(history);
    let mut pace   = PaceStatus::Good;
    let mut out    = Vec::new();

    for rule in RULES {
        let fired = {
            let ctx = RuleContext { events, settings, preset, history, cooldowns: &ledger, now_ms };
            rule(&ctx)
        };
        for advice in fired {
            tracing::debug!(
                "Rule fired: {} (severity {}) at {}",
                advice.code.as_str(), advice.severity, now_ms
            );
            ledger.mark_fired(advice.code, now_ms);
            pace = pace.max(advice.code.pace_floor());
            out.push(advice);
        }
    }

    EvaluationResult {
        events_to_emit:              out,
        pace_status:                 pace,
        next_check_interval_seconds: Some(NEXT_CHECK_INTERVAL_SECONDS),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 50_000_000;
    const MIN: u64 = 60_000;

    fn log(mins_ago: u64, type_id: &str, units: f64, alcoholic: bool) -> ConsumptionEvent {
        ConsumptionEvent::new(NOW - mins_ago * MIN, type_id, units, alcoholic)
    }

    fn past(mins_ago: u64, code: AdvisoryCode) -> AdvisoryEvent {
        AdvisoryEvent { timestamp_ms: NOW - mins_ago * MIN, code, severity: 1 }
    }

    fn settings(mode: SensitivityMode, hydration: bool, cadence: i32) -> EvaluationSettings {
        EvaluationSettings {
            sensitivity_mode:            mode,
            hydration_reminders_enabled: hydration,
            hydration_cadence:           cadence,
        }
    }

    fn balanced() -> EvaluationSettings {
        settings(SensitivityMode::Balanced, true, 2)
    }

    fn codes(r: &EvaluationResult) -> Vec<AdvisoryCode> {
        r.events_to_emit.iter().map(|e| e.code).collect()
    }

    #[test]
    fn two_shots_close_together_is_caution() {
        let logs = vec![log(8, "shot", 1.0, true), log(1, "shot", 1.0, true)];
        let r = evaluate(&logs, &balanced(), NOW, &[]);
        assert!(codes(&r).contains(&AdvisoryCode::ShotStacking));
        assert_eq!(r.pace_status, PaceStatus::Caution);
    }

    #[test]
    fn four_units_in_ninety_minutes_escalates() {
        let logs = vec![
            log(80, "beer", 1.0, true),
            log(50, "beer", 1.0, true),
            log(30, "wine", 1.0, true),
            log(5,  "beer", 1.0, true),
        ];
        let r = evaluate(&logs, &balanced(), NOW, &[]);
        assert!(codes(&r).contains(&AdvisoryCode::Escalation));
        assert_eq!(r.pace_status, PaceStatus::SlowDown);
    }

    #[test]
    fn hydration_reminder_every_second_drink() {
        let logs = vec![log(60, "beer", 1.0, true), log(30, "beer", 1.0, true)];
        let r = evaluate(&logs, &balanced(), NOW, &[]);
        assert!(codes(&r).contains(&AdvisoryCode::Hydrate));
    }

    #[test]
    fn cooldown_suppresses_repeat_warning() {
        let logs = vec![log(8, "shot", 1.0, true), log(1, "shot", 1.0, true)];
        let history = vec![past(10, AdvisoryCode::ShotStacking)];
        let r = evaluate(&logs, &balanced(), NOW, &history);
        assert!(!codes(&r).contains(&AdvisoryCode::ShotStacking));
    }

    #[test]
    fn empty_log_is_good_and_silent() {
        for mode in [SensitivityMode::Relaxed, SensitivityMode::Balanced, SensitivityMode::Strict] {
            let r = evaluate(&[], &settings(mode, true, 1), NOW, &[]);
            assert_eq!(r.pace_status, PaceStatus::Good);
            assert!(r.events_to_emit.is_empty());
        }
    }

    #[test]
    fn next_check_is_always_sixty_seconds() {
        let quiet = evaluate(&[], &balanced(), NOW, &[]);
        let busy  = evaluate(&[log(1, "shot", 3.0, true), log(0, "shot", 3.0, true)], &balanced(), NOW, &[]);
        assert_eq!(quiet.next_check_interval_seconds, Some(60.0));
        assert_eq!(busy.next_check_interval_seconds, Some(60.0));
    }

    #[test]
    fn rerun_with_same_history_is_idempotent() {
        let logs = vec![
            log(9, "shot", 1.5, true),
            log(4, "shot", 1.5, true),
            log(2, "beer", 1.0, true),
        ];
        let history = vec![past(40, AdvisoryCode::FastPace)];
        let first  = evaluate(&logs, &balanced(), NOW, &history);
        let second = evaluate(&logs, &balanced(), NOW, &history);
        assert_eq!(first, second);
        assert!(!first.events_to_emit.is_empty());
    }

    #[test]
    fn fast_pace_forces_slow_down_even_after_caution() {
        // 2 drinks in 10 min (rapid repeat) and 2.5 units in 60 min (fast pace)
        let logs = vec![log(6, "beer", 1.0, true), log(2, "cocktail", 1.5, true)];
        let r = evaluate(&logs, &balanced(), NOW, &[]);
        let c = codes(&r);
        assert_eq!(c[0], AdvisoryCode::RapidRepeat);
        assert_eq!(c[1], AdvisoryCode::FastPace);
        assert_eq!(r.pace_status, PaceStatus::SlowDown);
    }

    #[test]
    fn pace_never_drops_below_fired_rules() {
        // Escalation is cooled down but rapid repeat still fires → caution
        let logs = vec![
            log(80, "beer", 1.0, true),
            log(70, "beer", 1.0, true),
            log(9,  "beer", 1.0, true),
            log(3,  "beer", 1.0, true),
        ];
        let history = vec![past(5, AdvisoryCode::Escalation), past(5, AdvisoryCode::FastPace)];
        let r = evaluate(&logs, &balanced(), NOW, &history);
        assert_eq!(codes(&r), vec![AdvisoryCode::RapidRepeat, AdvisoryCode::Hydrate]);
        assert_eq!(r.pace_status, PaceStatus::Caution);
    }

    #[test]
    fn at_most_one_hydrate_per_call() {
        // Escalation fires (4 units in 90 min) and 4 drinks is divisible by cadence 2
        let logs = vec![
            log(85, "beer", 1.0, true),
            log(60, "beer", 1.0, true),
            log(40, "beer", 1.0, true),
            log(25, "beer", 1.0, true),
        ];
        let r = evaluate(&logs, &balanced(), NOW, &[]);
        let hydrates = r.events_to_emit.iter().filter(|e| e.code == AdvisoryCode::Hydrate).count();
        assert_eq!(hydrates, 1);
        // Escalation's reminder comes straight after the escalation warning
        let c = codes(&r);
        let esc = c.iter().position(|x| *x == AdvisoryCode::Escalation).unwrap();
        assert_eq!(c[esc + 1], AdvisoryCode::Hydrate);
    }

    #[test]
    fn unknown_mode_in_settings_uses_balanced() {
        let s: EvaluationSettings = serde_json::from_str(
            r#"{"sensitivity_mode":"wild","hydration_reminders_enabled":false,"hydration_cadence":0}"#,
        )
        .unwrap();
        assert_eq!(s.sensitivity_mode, SensitivityMode::Balanced);
        // 2 shots 14 min apart: inside balanced (15) but outside relaxed (12)
        let logs = vec![log(14, "shot", 0.5, true), log(0, "shot", 0.5, true)];
        let r = evaluate(&logs, &s, NOW, &[]);
        assert!(codes(&r).contains(&AdvisoryCode::ShotStacking));
    }

    #[test]
    fn serializes_wire_names() {
        let r = evaluate(&[log(8, "shot", 1.0, true), log(1, "shot", 1.0, true)], &balanced(), NOW, &[]);
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"shot_stacking\""));
        assert!(json.contains("\"caution\""));
        assert_eq!(serde_json::to_string(&PaceStatus::SlowDown).unwrap(), "\"slowDown\"");
        assert_eq!(
            serde_json::to_string(&EventType::PositiveReinforcement).unwrap(),
            "\"positive_reinforcement\""
        );
    }

    #[test]
    fn ledger_counts_same_call_firings() {
        let mut ledger = CooldownLedger::from_history(&[past(30, AdvisoryCode::Hydrate)]);
        assert!(!ledger.recently_fired(AdvisoryCode::Hydrate, 20, NOW));
        ledger.mark_fired(AdvisoryCode::Hydrate, NOW);
        assert!(ledger.recently_fired(AdvisoryCode::Hydrate, 20, NOW));
    }
}
