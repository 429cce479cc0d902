/// Fires a water check every N alcoholic drinks, where N is the user's
/// hydration cadence.
///
/// Shares the 20-minute `hydrate` cooldown with the escalation rule, which
/// runs first; if escalation already sent a water check in this evaluation,
/// this rule stays quiet. A cadence of 0 or below switches the rule off.
use super::{water_check, RuleContext, RuleOutput, HYDRATION_COOLDOWN_MINUTES};
use crate::{engine::AdvisoryCode, window};

pub const KEY: AdvisoryCode = AdvisoryCode::Hydrate;

pub fn evaluate(ctx: &RuleContext) -> RuleOutput {
    if !ctx.settings.hydration_reminders_enabled {
        return vec![];
    }

    if ctx.recently_fired(KEY, HYDRATION_COOLDOWN_MINUTES) {
        return vec![];
    }

    let cadence = ctx.settings.hydration_cadence;
    if cadence <= 0 {
        return vec![];
    }

    let total = window::total_alcoholic_count(ctx.now_ms, ctx.events);
    if total == 0 || total % cadence as usize != 0 {
        return vec![];
    }

    vec![water_check()]
}
