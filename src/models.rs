/// Session-level records owned by the coach: sessions, drink logs, drink type
/// defaults and user settings.
///
/// The pacing engine never sees these directly; the coach converts them into
/// `ConsumptionEvent` / `EvaluationSettings` snapshots before each evaluation.
use crate::{engine::EvaluationSettings, presets::SensitivityMode, window::ConsumptionEvent};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_HYDRATION_CADENCE:        i32 = 2;
pub const DEFAULT_AUTO_END_TIMEOUT_MINUTES: u32 = 180;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceDevice {
    Watch,
    #[default]
    Phone,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id:                       Uuid,
    pub started_at_ms:            u64,
    pub ended_at_ms:              Option<u64>,
    pub sensitivity_mode:         SensitivityMode,
    pub hydration_cadence:        i32,
    pub auto_end_timeout_minutes: u32,
}

impl Session {
    /// New session stamped with the user's current preferences.
    pub fn start(settings: &UserSettings, started_at_ms: u64) -> Self {
        Self {
            id:                       Uuid::new_v4(),
            started_at_ms,
            ended_at_ms:              None,
            sensitivity_mode:         settings.sensitivity_mode,
            hydration_cadence:        settings.hydration_cadence,
            auto_end_timeout_minutes: settings.auto_end_timeout_minutes,
        }
    }

    /// Placeholder for a session first seen through one of its drink logs.
    pub fn implicit(id: Uuid, started_at_ms: u64) -> Self {
        Self {
            id,
            started_at_ms,
            ended_at_ms:              None,
            sensitivity_mode:         SensitivityMode::Balanced,
            hydration_cadence:        DEFAULT_HYDRATION_CADENCE,
            auto_end_timeout_minutes: DEFAULT_AUTO_END_TIMEOUT_MINUTES,
        }
    }

    pub fn is_active(&self) -> bool {
        self.ended_at_ms.is_none()
    }
}

// ---------------------------------------------------------------------------
// Drink log
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrinkLog {
    pub id:             Uuid,
    pub session_id:     Uuid,
    pub timestamp_ms:   u64,
    pub drink_type_id:  String,
    pub standard_units: f64,
    pub is_alcoholic:   bool,
    pub source_device:  SourceDevice,
}

impl DrinkLog {
    /// Log one drink of `config`'s type with its default units.
    pub fn from_config(
        session_id:    Uuid,
        config:        &DrinkTypeConfig,
        timestamp_ms:  u64,
        source_device: SourceDevice,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            timestamp_ms,
            drink_type_id:  config.id.clone(),
            standard_units: config.default_standard_units.max(0.0),
            is_alcoholic:   config.is_alcoholic,
            source_device,
        }
    }

    pub fn to_consumption_event(&self) -> ConsumptionEvent {
        ConsumptionEvent {
            timestamp_ms:   self.timestamp_ms,
            drink_type_id:  self.drink_type_id.clone(),
            standard_units: self.standard_units,
            is_alcoholic:   self.is_alcoholic,
        }
    }
}

// ---------------------------------------------------------------------------
// Drink type defaults
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrinkTypeConfig {
    pub id:                     String,
    pub display_name:           String,
    pub default_standard_units: f64,
    pub is_alcoholic:           bool,
    #[serde(default = "default_true")]
    pub is_enabled:             bool,
    #[serde(default)]
    pub sort_order:             i32,
}

fn default_true() -> bool { true }

impl DrinkTypeConfig {
    fn seed(id: &str, name: &str, units: f64, alcoholic: bool, order: i32) -> Self {
        Self {
            id:                     id.to_owned(),
            display_name:           name.to_owned(),
            default_standard_units: units,
            is_alcoholic:           alcoholic,
            is_enabled:             true,
            sort_order:             order,
        }
    }
}

/// Built-in drink types, in menu order.
pub fn default_drink_types() -> Vec<DrinkTypeConfig> {
    vec![
        DrinkTypeConfig::seed("shot",     "Shot",     1.0, true,  0),
        DrinkTypeConfig::seed("beer",     "Beer",     1.0, true,  1),
        DrinkTypeConfig::seed("cocktail", "Cocktail", 1.5, true,  2),
        DrinkTypeConfig::seed("wine",     "Wine",     1.0, true,  3),
        DrinkTypeConfig::seed("water",    "Water",    0.0, false, 4),
    ]
}

/// Insert or replace drink types by id, keeping the list sorted by sort_order.
pub fn upsert_drink_types(existing: &mut Vec<DrinkTypeConfig>, incoming: Vec<DrinkTypeConfig>) {
    for item in incoming {
        match existing.iter_mut().find(|c| c.id == item.id) {
            Some(slot) => *slot = item,
            None => existing.push(item),
        }
    }
    existing.sort_by_key(|c| c.sort_order);
}

// ---------------------------------------------------------------------------
// User settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    #[serde(default)]
    pub display_name:                Option<String>,
    #[serde(default)]
    pub sensitivity_mode:            SensitivityMode,
    #[serde(default = "default_true")]
    pub hydration_reminders_enabled: bool,
    #[serde(default = "default_hydration_cadence")]
    pub hydration_cadence:           i32,
    /// Off = evaluate and journal as usual, but print nothing.
    #[serde(default = "default_true")]
    pub notifications_enabled:       bool,
    #[serde(default = "default_auto_end_timeout")]
    pub auto_end_timeout_minutes:    u32,
}

fn default_hydration_cadence() -> i32 { DEFAULT_HYDRATION_CADENCE }
fn default_auto_end_timeout() -> u32 { DEFAULT_AUTO_END_TIMEOUT_MINUTES }

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            display_name:                None,
            sensitivity_mode:            SensitivityMode::Balanced,
            hydration_reminders_enabled: true,
            hydration_cadence:           DEFAULT_HYDRATION_CADENCE,
            notifications_enabled:       true,
            auto_end_timeout_minutes:    DEFAULT_AUTO_END_TIMEOUT_MINUTES,
        }
    }
}

impl UserSettings {
    pub fn evaluation_settings(&self) -> EvaluationSettings {
        EvaluationSettings {
            sensitivity_mode:            self.sensitivity_mode,
            hydration_reminders_enabled: self.hydration_reminders_enabled,
            hydration_cadence:           self.hydration_cadence,
        }
    }
}
