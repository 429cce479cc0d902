/// Rolling-window queries over a session's consumption log.
///
/// Every function is a pure read over a caller-supplied slice anchored at
/// `as_of`. A window of `w` minutes covers `[as_of - w*60s, as_of]`, both
/// bounds inclusive. Events stamped after `as_of` are always ignored, so a
/// clock-skewed entry from the other device can never inflate a count.
/// The slice does not need to be sorted.
use serde::{Deserialize, Serialize};

/// Drink type id that the shot-stacking rule counts.
pub const SHOT_DRINK_TYPE: &str = "shot";

/// One logged beverage, as seen by the pacing engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionEvent {
    pub timestamp_ms:   u64,
    pub drink_type_id:  String,
    pub standard_units: f64,
    pub is_alcoholic:   bool,
}

impl ConsumptionEvent {
    pub fn new(timestamp_ms: u64, drink_type_id: &str, standard_units: f64, is_alcoholic: bool) -> Self {
        Self {
            timestamp_ms,
            drink_type_id: drink_type_id.to_owned(),
            standard_units,
            is_alcoholic,
        }
    }
}

#[inline]
fn minutes_to_ms(minutes: u64) -> u64 {
    minutes.saturating_mul(60_000)
}

/// True when `ts` falls inside the trailing window ending at `as_of`.
#[inline]
fn in_window(ts: u64, window_minutes: u64, as_of: u64) -> bool {
    let cutoff = as_of.saturating_sub(minutes_to_ms(window_minutes));
    ts >= cutoff && ts <= as_of
}

/// Alcoholic drinks inside the window.
pub fn count_alcoholic(window_minutes: u64, as_of: u64, events: &[ConsumptionEvent]) -> usize {
    events
        .iter()
        .filter(|e| e.is_alcoholic && in_window(e.timestamp_ms, window_minutes, as_of))
        .count()
}

/// Standard units inside the window, alcoholic or not.
pub fn sum_units(window_minutes: u64, as_of: u64, events: &[ConsumptionEvent]) -> f64 {
    events
        .iter()
        .filter(|e| in_window(e.timestamp_ms, window_minutes, as_of))
        .map(|e| e.standard_units)
        .sum()
}

pub fn count_by_type(
    drink_type_id:  &str,
    window_minutes: u64,
    as_of:          u64,
    events:         &[ConsumptionEvent],
) -> usize {
    events
        .iter()
        .filter(|e| e.drink_type_id == drink_type_id && in_window(e.timestamp_ms, window_minutes, as_of))
        .count()
}

/// Milliseconds since the newest alcoholic drink at or before `as_of`.
/// None = no alcoholic drink logged yet.
pub fn time_since_last_alcoholic(as_of: u64, events: &[ConsumptionEvent]) -> Option<u64> {
    events
        .iter()
        .filter(|e| e.is_alcoholic && e.timestamp_ms <= as_of)
        .map(|e| e.timestamp_ms)
        .max()
        .map(|last| as_of - last)
}

/// Whole-session alcoholic total up to `as_of`.
pub fn total_alcoholic_count(as_of: u64, events: &[ConsumptionEvent]) -> usize {
    events
        .iter()
        .filter(|e| e.is_alcoholic && e.timestamp_ms <= as_of)
        .count()
}
