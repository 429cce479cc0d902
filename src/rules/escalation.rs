/// Fires when the units logged in the last 90 minutes reach the preset's
/// escalation threshold (greater than or equal).
///
/// Forces pace to slowDown. With hydration reminders on, a water check rides
/// along unless one already went out in the last 20 minutes.
use super::{advice, water_check, RuleContext, RuleOutput, HYDRATION_COOLDOWN_MINUTES, WARNING_COOLDOWN_MINUTES};
use crate::{
    engine::{AdvisoryCode, EventType},
    window,
};

pub const KEY: AdvisoryCode = AdvisoryCode::Escalation;
const WINDOW_MINUTES: u64 = 90;

pub fn evaluate(ctx: &RuleContext) -> RuleOutput {
    let units = window::sum_units(WINDOW_MINUTES, ctx.now_ms, ctx.events);
    if units < ctx.preset.escalation_units_per_90_min {
        return vec![];
    }

    if ctx.recently_fired(KEY, WARNING_COOLDOWN_MINUTES) {
        return vec![];
    }

    let mut out = vec![advice(
        EventType::Warning,
        KEY,
        "Slow down and drink some water.",
        3,
    )];

    if ctx.settings.hydration_reminders_enabled
        && !ctx.recently_fired(AdvisoryCode::Hydrate, HYDRATION_COOLDOWN_MINUTES)
    {
        out.push(water_check());
    }
    out
}
