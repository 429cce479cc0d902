/// Fires when two or more shots land inside the preset's shot-stack window
/// (12 / 15 / 20 min for relaxed / balanced / strict).
///
/// Raises pace to at least caution.
use super::{advice, RuleContext, RuleOutput, WARNING_COOLDOWN_MINUTES};
use crate::{
    engine::{AdvisoryCode, EventType},
    window::{self, SHOT_DRINK_TYPE},
};

pub const KEY: AdvisoryCode = AdvisoryCode::ShotStacking;
const MIN_SHOTS: usize = 2;

pub fn evaluate(ctx: &RuleContext) -> RuleOutput {
    let shots = window::count_by_type(
        SHOT_DRINK_TYPE,
        ctx.preset.shot_stack_window_minutes,
        ctx.now_ms,
        ctx.events,
    );
    if shots < MIN_SHOTS {
        return vec![];
    }

    if ctx.recently_fired(KEY, WARNING_COOLDOWN_MINUTES) {
        return vec![];
    }

    vec![advice(
        EventType::Warning,
        KEY,
        "Two shots close together. Take a break for 20 min.",
        2,
    )]
}
