/// Fires when two or more alcoholic drinks land inside the preset's
/// rapid-repeat window (8 / 10 / 12 min for relaxed / balanced / strict).
///
/// Raises pace to at least caution.
use super::{advice, RuleContext, RuleOutput, WARNING_COOLDOWN_MINUTES};
use crate::{
    engine::{AdvisoryCode, EventType},
    window,
};

pub const KEY: AdvisoryCode = AdvisoryCode::RapidRepeat;
const MIN_DRINKS: usize = 2;

pub fn evaluate(ctx: &RuleContext) -> RuleOutput {
    let count = window::count_alcoholic(ctx.preset.rapid_repeat_window_minutes, ctx.now_ms, ctx.events);
    if count < MIN_DRINKS {
        return vec![];
    }

    if ctx.recently_fired(KEY, WARNING_COOLDOWN_MINUTES) {
        return vec![];
    }

    vec![advice(
        EventType::Warning,
        KEY,
        "Two drinks close together. Slow it down.",
        1,
    )]
}
