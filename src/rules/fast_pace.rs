/// Fires when the units logged in the last 60 minutes exceed the preset's
/// fast-pace threshold (strictly greater than).
///
/// Forces pace to slowDown.
use super::{advice, RuleContext, RuleOutput, WARNING_COOLDOWN_MINUTES};
use crate::{
    engine::{AdvisoryCode, EventType},
    window,
};

pub const KEY: AdvisoryCode = AdvisoryCode::FastPace;
const WINDOW_MINUTES: u64 = 60;

pub fn evaluate(ctx: &RuleContext) -> RuleOutput {
    let units = window::sum_units(WINDOW_MINUTES, ctx.now_ms, ctx.events);
    if units <= ctx.preset.fast_pace_units_per_60_min {
        return vec![];
    }

    if ctx.recently_fired(KEY, WARNING_COOLDOWN_MINUTES) {
        return vec![];
    }

    vec![advice(
        EventType::Warning,
        KEY,
        "You're pacing fast. Take a 20 min break.",
        2,
    )]
}
