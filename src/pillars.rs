//! The pillar table.
//!
//! Every stage of the pipeline (fetch, normalize, aggregate, layout) reads
//! pillar-specific behavior from this one table instead of scattering
//! per-pillar literals. Adding a pillar is a one-row change here.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A named category of loggable activity, plus the two event-like
/// categories (coach appointments and client-scheduled events).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Pillar {
    Nutrition,
    Hydration,
    Activity,
    Sleep,
    Stress,
    Measurements,
    Protocol,
    Planner,
    Cravings,
    Appointment,
    ScheduledEvent,
}

/// The fixed set of pillar collections a day query fans out across.
pub const ALL_PILLARS: [Pillar; 11] = [
    Pillar::Nutrition,
    Pillar::Hydration,
    Pillar::Activity,
    Pillar::Sleep,
    Pillar::Stress,
    Pillar::Measurements,
    Pillar::Protocol,
    Pillar::Planner,
    Pillar::Cravings,
    Pillar::Appointment,
    Pillar::ScheduledEvent,
];

/// How a record's on-timeline duration is derived for layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DurationRule {
    /// `duration` field holds hours from the start instant (sleep).
    HoursField,
    /// `duration` field holds minutes; missing falls back to the default
    /// (activity).
    MinutesField { default_minutes: i64 },
    /// The record carries an explicit end instant (appointments, events).
    ExplicitEnd,
    /// Fixed block length in minutes (planner 15, everything else 30).
    FixedMinutes(i64),
}

/// Per-pillar behavior consumed by every pipeline stage.
#[derive(Debug, Clone, Copy)]
pub struct PillarSpec {
    /// Canonical date key in the flat storage shape.
    pub date_field: &'static str,
    /// Store collection the pillar's records live in.
    pub collection: &'static str,
    pub duration: DurationRule,
}

impl Pillar {
    pub fn spec(self) -> PillarSpec {
        match self {
            Pillar::Nutrition => PillarSpec {
                date_field: "entryDate",
                collection: "nutrition",
                duration: DurationRule::FixedMinutes(30),
            },
            Pillar::Hydration => PillarSpec {
                date_field: "entryDate",
                collection: "hydration",
                duration: DurationRule::FixedMinutes(30),
            },
            Pillar::Activity => PillarSpec {
                date_field: "entryDate",
                collection: "activity",
                duration: DurationRule::MinutesField {
                    default_minutes: 15,
                },
            },
            Pillar::Sleep => PillarSpec {
                date_field: "entryDate",
                collection: "sleep",
                duration: DurationRule::HoursField,
            },
            Pillar::Stress => PillarSpec {
                date_field: "entryDate",
                collection: "stress",
                duration: DurationRule::FixedMinutes(30),
            },
            Pillar::Measurements => PillarSpec {
                date_field: "entryDate",
                collection: "measurements",
                duration: DurationRule::FixedMinutes(30),
            },
            Pillar::Protocol => PillarSpec {
                date_field: "entryDate",
                collection: "protocol",
                duration: DurationRule::FixedMinutes(30),
            },
            Pillar::Planner => PillarSpec {
                date_field: "indulgenceDate",
                collection: "planner",
                duration: DurationRule::FixedMinutes(15),
            },
            Pillar::Cravings => PillarSpec {
                date_field: "entryDate",
                collection: "cravings",
                duration: DurationRule::FixedMinutes(30),
            },
            Pillar::Appointment => PillarSpec {
                date_field: "start",
                collection: "appointments",
                duration: DurationRule::ExplicitEnd,
            },
            Pillar::ScheduledEvent => PillarSpec {
                date_field: "startTime",
                collection: "events",
                duration: DurationRule::ExplicitEnd,
            },
        }
    }

    /// Date key under the nested legacy shape (`log.<dateField>`).
    pub fn nested_date_field(self) -> String {
        format!("log.{}", self.spec().date_field)
    }

    /// End-instant key for pillars with `DurationRule::ExplicitEnd`.
    pub fn end_field(self) -> Option<&'static str> {
        match self {
            Pillar::Appointment => Some("end"),
            Pillar::ScheduledEvent => Some("endTime"),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        self.spec().collection
    }
}

/// Derive a display title when the record stores none.
///
/// The pillar label table: hydration interpolates amount/unit, sleep
/// distinguishes naps, everything else falls back to the record's `name`
/// field and then to a fixed per-pillar default.
pub fn derive_title(pillar: Pillar, fields: &Map<String, Value>) -> String {
    if let Some(title) = fields.get("title").and_then(Value::as_str) {
        if !title.trim().is_empty() {
            return title.to_string();
        }
    }

    match pillar {
        Pillar::Hydration => {
            let amount = fields.get("amount").and_then(Value::as_f64).unwrap_or(0.0);
            let unit = fields
                .get("unit")
                .and_then(Value::as_str)
                .unwrap_or("oz");
            format!("Hydration: {}{}", amount, unit)
        }
        Pillar::Sleep => {
            if fields.get("isNap").and_then(Value::as_bool).unwrap_or(false) {
                "Nap".to_string()
            } else {
                "Sleep".to_string()
            }
        }
        _ => fields
            .get("name")
            .and_then(Value::as_str)
            .filter(|n| !n.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| default_label(pillar).to_string()),
    }
}

fn default_label(pillar: Pillar) -> &'static str {
    match pillar {
        Pillar::Nutrition => "Meal",
        Pillar::Hydration => "Hydration",
        Pillar::Activity => "Activity",
        Pillar::Sleep => "Sleep",
        Pillar::Stress => "Stress check-in",
        Pillar::Measurements => "Measurement",
        Pillar::Protocol => "Protocol",
        Pillar::Planner => "Planned indulgence",
        Pillar::Cravings => "Craving",
        Pillar::Appointment => "Appointment",
        Pillar::ScheduledEvent => "Event",
    }
}
