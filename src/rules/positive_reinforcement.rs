/// Fires when the user has eased off after being warned.
///
/// Conditions, all required:
///   - one of the four pace warnings is in the supplied history within the
///     last 60 minutes
///   - the last alcoholic drink was at least 20 minutes ago; with no
///     alcoholic drink logged at all the elapsed time counts as zero
///   - positive_reinforcement itself has not fired in the last 60 minutes
///
/// Never changes pace status.
use super::{advice, RuleContext, RuleOutput};
use crate::{
    engine::{AdvisoryCode, EventType},
    window,
};

pub const KEY: AdvisoryCode = AdvisoryCode::PositiveReinforcement;
const COOLDOWN_MINUTES:       u64 = 60;
const WARNING_LOOKBACK_MS:    u64 = 60 * 60_000;
const MIN_QUIET_MS:           u64 = 20 * 60_000;

pub fn evaluate(ctx: &RuleContext) -> RuleOutput {
    let lookback = ctx.now_ms.saturating_sub(WARNING_LOOKBACK_MS);
    let warned_recently = ctx
        .history
        .iter()
        .any(|a| a.code.is_warning() && a.timestamp_ms >= lookback);
    if !warned_recently {
        return vec![];
    }

    let quiet_ms = window::time_since_last_alcoholic(ctx.now_ms, ctx.events).unwrap_or(0);
    if quiet_ms < MIN_QUIET_MS {
        return vec![];
    }

    if ctx.recently_fired(KEY, COOLDOWN_MINUTES) {
        return vec![];
    }

    vec![advice(
        EventType::PositiveReinforcement,
        KEY,
        "Nice reset. You've slowed the pace.",
        1,
    )]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presets::SensitivityMode;
    use crate::rules::fixtures::*;

    #[test]
    fn fires_after_warning_and_quiet_spell() {
        let logs = vec![drink(45, "beer", 1.0), drink(25, "beer", 1.0)];
        let history = vec![fired(30, AdvisoryCode::RapidRepeat)];
        let out = run(evaluate, &logs, &settings(SensitivityMode::Balanced), &history);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].event_type, EventType::PositiveReinforcement);
    }

    #[test]
    fn quiet_boundary_is_twenty_minutes() {
        let history = vec![fired(30, AdvisoryCode::FastPace)];
        let s = settings(SensitivityMode::Balanced);
        assert_eq!(run(evaluate, &[drink(20, "beer", 1.0)], &s, &history).len(), 1);
        assert!(run(evaluate, &[drink(19, "beer", 1.0)], &s, &history).is_empty());
    }

    #[test]
    fn needs_a_warning_in_the_last_hour() {
        let logs = vec![drink(30, "beer", 1.0)];
        let s = settings(SensitivityMode::Balanced);
        assert!(run(evaluate, &logs, &s, &[]).is_empty());
        assert!(run(evaluate, &logs, &s, &[fired(61, AdvisoryCode::Escalation)]).is_empty());
        // Reminders do not count as warnings
        assert!(run(evaluate, &logs, &s, &[fired(10, AdvisoryCode::Hydrate)]).is_empty());
    }

    #[test]
    fn no_alcoholic_drink_counts_as_not_quiet() {
        let history = vec![fired(30, AdvisoryCode::ShotStacking)];
        let s = settings(SensitivityMode::Balanced);
        assert!(run(evaluate, &[], &s, &history).is_empty());
        assert!(run(evaluate, &[drink(40, "water", 0.0)], &s, &history).is_empty());
    }

    #[test]
    fn own_cooldown_is_an_hour() {
        let logs = vec![drink(30, "beer", 1.0)];
        let s = settings(SensitivityMode::Balanced);
        let blocked = vec![fired(10, AdvisoryCode::RapidRepeat), fired(59, KEY)];
        assert!(run(evaluate, &logs, &s, &blocked).is_empty());
        let open = vec![fired(10, AdvisoryCode::RapidRepeat), fired(61, KEY)];
        assert_eq!(run(evaluate, &logs, &s, &open).len(), 1);
    }
}
