pub mod escalation;
pub mod fast_pace;
pub mod hydration;
pub mod positive_reinforcement;
pub mod rapid_repeat;
pub mod shot_stacking;

use crate::{
    engine::{AdvisoryCode, AdvisoryEvent, CooldownLedger, EvaluationSettings, EventToEmit, EventType},
    presets::SensitivityPreset,
    window::ConsumptionEvent,
};

/// Cooldown shared by the four pace warnings.
pub const WARNING_COOLDOWN_MINUTES: u64 = 15;
/// Cooldown for `hydrate`, whichever rule emits it.
pub const HYDRATION_COOLDOWN_MINUTES: u64 = 20;

/// Read-only context passed to every rule evaluator.
pub struct RuleContext<'a> {
    pub events:    &'a [ConsumptionEvent],
    pub settings:  &'a EvaluationSettings,
    pub preset:    &'static SensitivityPreset,
    /// Advisory history exactly as supplied by the caller.
    pub history:   &'a [AdvisoryEvent],
    /// History plus anything already emitted earlier in this call.
    pub cooldowns: &'a CooldownLedger,
    pub now_ms:    u64,
}

impl RuleContext<'_> {
    pub fn recently_fired(&self, code: AdvisoryCode, cooldown_minutes: u64) -> bool {
        self.cooldowns.recently_fired(code, cooldown_minutes, self.now_ms)
    }
}

/// Rules return zero or more advisories.
/// Zero means the rule did not fire for this evaluation.
pub type RuleOutput = Vec<EventToEmit>;

// ---------------------------------------------------------------------------
// Convenience constructors so rules don't repeat boilerplate
// ---------------------------------------------------------------------------

pub fn advice(event_type: EventType, code: AdvisoryCode, message: &str, severity: u8) -> EventToEmit {
    EventToEmit {
        event_type,
        code,
        message: message.to_owned(),
        severity,
    }
}

pub const WATER_CHECK_MESSAGE: &str = "Water check 💧";

pub fn water_check() -> EventToEmit {
    advice(EventType::Reminder, AdvisoryCode::Hydrate, WATER_CHECK_MESSAGE, 1)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::presets::SensitivityMode;

    pub const NOW: u64 = 20_000_000;
    pub const MIN: u64 = 60_000;

    pub fn drink(mins_ago: u64, type_id: &str, units: f64) -> ConsumptionEvent {
        let alcoholic = type_id != "water";
        ConsumptionEvent::new(NOW - mins_ago * MIN, type_id, units, alcoholic)
    }

    pub fn fired(mins_ago: u64, code: AdvisoryCode) -> AdvisoryEvent {
        AdvisoryEvent { timestamp_ms: NOW - mins_ago * MIN, code, severity: 1 }
    }

    pub fn settings(mode: SensitivityMode) -> EvaluationSettings {
        EvaluationSettings {
            sensitivity_mode:            mode,
            hydration_reminders_enabled: true,
            hydration_cadence:           2,
        }
    }

    /// Run a single rule against the given inputs.
    pub fn run(
        rule:     fn(&RuleContext) -> RuleOutput,
        events:   &[ConsumptionEvent],
        settings: &EvaluationSettings,
        history:  &[AdvisoryEvent],
    ) -> RuleOutput {
        let ledger = CooldownLedger::from_history(history);
        let ctx = RuleContext {
            events,
            settings,
            preset: settings.sensitivity_mode.preset(),
            history,
            cooldowns: &ledger,
            now_ms: NOW,
        };
        rule(&ctx)
    }
}
