//! Record normalization.
//!
//! Collapses the raw fetch output into exactly one canonical record per
//! logical event: unwraps the nested legacy `log` payload (top-level fields
//! win on collision), derives the canonical occurs-at instant per the pillar
//! table, applies the authoritative day-membership filter, derives display
//! titles, and establishes the final ordering. Pure function — the same raw
//! input always yields the same canonical output.
//!
//! Day attribution exceptions:
//! - sleep entries are attributed by `wakeUpDay` (a session recorded at
//!   bedtime belongs to the morning it ends), except naps, which stay on
//!   their own `entryDate`;
//! - planner entries are attributed by `indulgenceDate`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::pillars::{derive_title, Pillar};
use crate::types::{CanonicalRecord, RawRecord};
use crate::window::TemporalWindow;

/// Parse an instant field. Payloads carry either RFC 3339 strings or epoch
/// milliseconds; anything else reads as absent.
pub fn field_instant(fields: &Map<String, Value>, key: &str) -> Option<DateTime<Utc>> {
    match fields.get(key)? {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => {
            let millis = n.as_i64()?;
            DateTime::<Utc>::from_timestamp_millis(millis)
        }
        _ => None,
    }
}

/// Lift a nested `log` payload to the top level, top-level fields taking
/// precedence on key collision.
fn unwrap_legacy_shape(mut fields: Map<String, Value>) -> Map<String, Value> {
    let Some(Value::Object(log)) = fields.remove("log") else {
        return fields;
    };
    let mut merged = log;
    for (key, value) in fields {
        merged.insert(key, value);
    }
    merged
}

/// Canonical occurs-at instant for a normalized payload.
fn occurs_at(pillar: Pillar, fields: &Map<String, Value>) -> Option<DateTime<Utc>> {
    if pillar == Pillar::Sleep {
        let is_nap = fields.get("isNap").and_then(Value::as_bool).unwrap_or(false);
        if !is_nap {
            if let Some(wake) = field_instant(fields, "wakeUpDay") {
                return Some(wake);
            }
        }
    }
    field_instant(fields, pillar.spec().date_field)
}

/// Normalize a raw fetch result into the ordered canonical record list for
/// the window's day(s).
pub fn normalize_records(raw: Vec<RawRecord>, window: &TemporalWindow) -> Vec<CanonicalRecord> {
    // The fetcher already unions by id, but raw input from other callers may
    // still carry both shape copies of one event. Collapse duplicates before
    // normalizing, preferring the flat copy (no `log` sub-object) so the
    // survivor does not depend on input order.
    let mut kept: Vec<RawRecord> = Vec::new();
    let mut index: HashMap<(Pillar, String), usize> = HashMap::new();
    for record in raw {
        match index.get(&(record.pillar, record.id.clone())) {
            Some(&at) => {
                if kept[at].fields.contains_key("log") && !record.fields.contains_key("log") {
                    kept[at] = record;
                }
            }
            None => {
                index.insert((record.pillar, record.id.clone()), kept.len());
                kept.push(record);
            }
        }
    }

    let mut canonical: Vec<CanonicalRecord> = Vec::new();
    for record in kept {
        let fields = unwrap_legacy_shape(record.fields);

        let Some(occurs_at) = occurs_at(record.pillar, &fields) else {
            log::debug!(
                "dropping {} record {} with no parseable date",
                record.pillar.as_str(),
                record.id
            );
            continue;
        };

        // Authoritative day filter — the wider fetch window exists only to
        // make the right raw data available.
        if !window.contains(occurs_at) {
            continue;
        }

        let ends_at = record
            .pillar
            .end_field()
            .and_then(|key| field_instant(&fields, key));

        let title = derive_title(record.pillar, &fields);

        canonical.push(CanonicalRecord {
            id: record.id,
            pillar: record.pillar,
            occurs_at,
            ends_at,
            title,
            fields,
        });
    }

    // Stable: ties keep insertion order.
    canonical.sort_by_key(|r| r.occurs_at);
    canonical
}
