/// Sensitivity presets: the threshold bundles behind relaxed / balanced / strict.
///
/// The mode is a closed enum and each variant maps to one immutable constant,
/// so there is no way to select a preset that does not exist. Strings coming
/// from config or from the other device go through `SensitivityMode::parse`,
/// which falls back to `Balanced` for anything it does not recognise.
use serde::{Deserialize, Serialize};

/// Thresholds for the pacing rules. All windows are in minutes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensitivityPreset {
    /// Fast pace: more than this many units in 60 min.
    pub fast_pace_units_per_60_min:   f64,
    /// Escalation: at least this many units in 90 min.
    pub escalation_units_per_90_min:  f64,
    /// Rapid repeat: 2+ alcoholic drinks within this window.
    pub rapid_repeat_window_minutes:  u64,
    /// Shot stacking: 2+ shots within this window.
    pub shot_stack_window_minutes:    u64,
}

pub const RELAXED: SensitivityPreset = SensitivityPreset {
    fast_pace_units_per_60_min:  3.0,
    escalation_units_per_90_min: 5.0,
    rapid_repeat_window_minutes: 8,
    shot_stack_window_minutes:   12,
};

pub const BALANCED: SensitivityPreset = SensitivityPreset {
    fast_pace_units_per_60_min:  2.0,
    escalation_units_per_90_min: 4.0,
    rapid_repeat_window_minutes: 10,
    shot_stack_window_minutes:   15,
};

pub const STRICT: SensitivityPreset = SensitivityPreset {
    fast_pace_units_per_60_min:  1.5,
    escalation_units_per_90_min: 3.0,
    rapid_repeat_window_minutes: 12,
    shot_stack_window_minutes:   20,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum SensitivityMode {
    Relaxed,
    #[default]
    Balanced,
    Strict,
}

impl SensitivityMode {
    /// Lenient lookup: unknown or empty input resolves to `Balanced`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "relaxed" => Self::Relaxed,
            "strict"  => Self::Strict,
            "balanced" => Self::Balanced,
            other => {
                tracing::debug!("Unknown sensitivity mode '{}', using balanced", other);
                Self::Balanced
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Relaxed  => "relaxed",
            Self::Balanced => "balanced",
            Self::Strict   => "strict",
        }
    }

    pub fn preset(&self) -> &'static SensitivityPreset {
        match self {
            Self::Relaxed  => &RELAXED,
            Self::Balanced => &BALANCED,
            Self::Strict   => &STRICT,
        }
    }
}

impl From<String> for SensitivityMode {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}
