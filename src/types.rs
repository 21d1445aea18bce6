use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::pillars::Pillar;

/// A raw record as fetched from one pillar collection.
///
/// The payload is kept as loose JSON because two historical storage shapes
/// coexist: "flat" (fields at top level) and "nested" (the same fields under
/// a `log` sub-object). Normalization collapses both into a
/// [`CanonicalRecord`]; nothing downstream of `normalize` touches raw rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRecord {
    pub id: String,
    pub pillar: Pillar,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Which schema shape a raw record was fetched under.
///
/// Flat-shape copies win on conflict when the same id comes back under both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchShape {
    Flat,
    Nested,
}

/// One logical event after normalization: exactly one per id, with the
/// canonical occurs-at instant and a display title derived per pillar.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalRecord {
    pub id: String,
    pub pillar: Pillar,
    pub occurs_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,
    pub title: String,
    pub fields: Map<String, Value>,
}

impl CanonicalRecord {
    /// Fetch a string field from the normalized payload.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Fetch a numeric field from the normalized payload.
    pub fn num_field(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(Value::as_f64)
    }

    /// Fetch a boolean field from the normalized payload.
    pub fn bool_field(&self, key: &str) -> Option<bool> {
        self.fields.get(key).and_then(Value::as_bool)
    }
}

/// A nutrient total with its display unit preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NutrientAmount {
    pub value: f64,
    pub unit: String,
}

/// Derived per-day aggregate, persisted as a cache keyed by (client, date).
///
/// Scalar totals are display-grade integers; the nutrient map keeps full
/// precision with units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySummary {
    pub date: NaiveDate,
    pub calories: i64,
    pub upf_percentage: f64,
    pub hydration_amount: i64,
    pub sleep_hours: i64,
    pub activity_minutes: i64,
    #[serde(default)]
    pub nutrients: HashMap<String, NutrientAmount>,
}

impl DailySummary {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            calories: 0,
            upf_percentage: 0.0,
            hydration_amount: 0,
            sleep_hours: 0,
            activity_minutes: 0,
            nutrients: HashMap::new(),
        }
    }
}

/// Client profile fields owned by the external CRUD layer and copied through
/// into the rolling summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_years: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sex: Option<String>,
    #[serde(default = "default_unit_system")]
    pub unit_system: String,
}

impl ClientProfile {
    pub fn new() -> Self {
        Self {
            age_years: None,
            sex: None,
            unit_system: default_unit_system(),
        }
    }
}

fn default_unit_system() -> String {
    "imperial".to_string()
}

/// Derived rolling-N-day aggregate, recomputed on each trigger and persisted
/// as a cache keyed by client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSummary {
    pub generated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_years: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sex: Option<String>,
    pub unit_system: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_weight_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_waist_to_height_ratio: Option<f64>,
    pub avg_sleep: f64,
    pub avg_activity: f64,
    pub avg_hydration: f64,
    pub cravings_count: u32,
    pub binges_count: u32,
    pub stress_events_count: u32,
    pub avg_upf: f64,
    #[serde(default)]
    pub avg_nutrients: HashMap<String, f64>,
    /// Whether a binge was logged in the 24 hours before `generated_at`.
    /// Consumed by streak tracking, not by this crate.
    pub recent_binge_detected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_binge_at: Option<DateTime<Utc>>,
}

/// Layout output: one conflict-free rectangle per record on the 24-hour
/// timeline. All values are percentages of the day column.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionedRecord {
    pub record_id: String,
    pub top: f64,
    pub height: f64,
    pub left: f64,
    pub width: f64,
}
