//! Single-day aggregation.
//!
//! Folds one day's canonical records into a [`DailySummary`] with a
//! pillar-keyed table of pure reducers, and wraps the full pipeline
//! (window, fetch, normalize, aggregate, layout) behind [`DayService`].
//! The fold itself never touches I/O and never fails: malformed or
//! missing payload fields read as zero.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::Value;

use crate::error::EngineError;
use crate::fetch::fetch_records;
use crate::layout::layout_day;
use crate::normalize::normalize_records;
use crate::pillars::Pillar;
use crate::store::RecordStore;
use crate::types::{CanonicalRecord, DailySummary, NutrientAmount, PositionedRecord};
use crate::window::TemporalWindow;

/// Everything the day screen renders: the ordered record list, the scalar
/// summary, and the timeline rectangles.
#[derive(Debug, Clone)]
pub struct DayView {
    pub date: NaiveDate,
    pub records: Vec<CanonicalRecord>,
    pub summary: DailySummary,
    pub timeline: Vec<PositionedRecord>,
}

#[derive(Debug, Default)]
struct DayAccumulator {
    calories: f64,
    upf_calories: f64,
    hydration: f64,
    sleep_hours: f64,
    activity_minutes: f64,
    nutrients: HashMap<String, NutrientAmount>,
}

type Reducer = fn(DayAccumulator, &CanonicalRecord) -> DayAccumulator;

/// Pillar-keyed reducer table. Pillars without a row contribute nothing to
/// the daily summary (they still appear on the timeline).
fn reducer_for(pillar: Pillar) -> Option<Reducer> {
    match pillar {
        Pillar::Nutrition => Some(reduce_nutrition),
        Pillar::Hydration => Some(reduce_hydration),
        Pillar::Sleep => Some(reduce_sleep),
        Pillar::Activity => Some(reduce_activity),
        _ => None,
    }
}

/// Numeric field under the record's precomputed `summary` sub-object.
fn meal_summary_num(record: &CanonicalRecord, key: &str) -> f64 {
    record
        .fields
        .get("summary")
        .and_then(|s| s.get(key))
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
}

fn reduce_nutrition(mut acc: DayAccumulator, record: &CanonicalRecord) -> DayAccumulator {
    acc.calories += meal_summary_num(record, "totalMealCalories");
    acc.upf_calories += meal_summary_num(record, "totalMealUpfCalories");

    if let Some(Value::Object(nutrients)) = record
        .fields
        .get("summary")
        .and_then(|s| s.get("nutrients"))
    {
        for (name, entry) in nutrients {
            let value = entry.get("value").and_then(Value::as_f64).unwrap_or(0.0);
            let unit = entry
                .get("unit")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            acc.nutrients
                .entry(name.clone())
                .or_insert(NutrientAmount { value: 0.0, unit })
                .value += value;
        }
    }
    acc
}

fn reduce_hydration(mut acc: DayAccumulator, record: &CanonicalRecord) -> DayAccumulator {
    acc.hydration += record.num_field("amount").unwrap_or(0.0);
    acc
}

fn reduce_sleep(mut acc: DayAccumulator, record: &CanonicalRecord) -> DayAccumulator {
    // Naps stay out of the daily sleep total.
    if !record.bool_field("isNap").unwrap_or(false) {
        acc.sleep_hours += record.num_field("duration").unwrap_or(0.0);
    }
    acc
}

fn reduce_activity(mut acc: DayAccumulator, record: &CanonicalRecord) -> DayAccumulator {
    acc.activity_minutes += record.num_field("duration").unwrap_or(0.0);
    acc
}

/// Fold one day's canonical records into its summary. Pure.
pub fn aggregate_day(records: &[CanonicalRecord], date: NaiveDate) -> DailySummary {
    let acc = records.iter().fold(DayAccumulator::default(), |acc, record| {
        match reducer_for(record.pillar) {
            Some(reduce) => reduce(acc, record),
            None => acc,
        }
    });

    let upf_percentage = if acc.calories > 0.0 {
        (100.0 * acc.upf_calories / acc.calories).clamp(0.0, 100.0)
    } else {
        0.0
    };

    DailySummary {
        date,
        calories: acc.calories.round() as i64,
        upf_percentage,
        hydration_amount: acc.hydration.round() as i64,
        sleep_hours: acc.sleep_hours.round() as i64,
        activity_minutes: acc.activity_minutes.round() as i64,
        nutrients: acc.nutrients,
    }
}

/// Day-view pipeline over a [`RecordStore`].
#[derive(Clone)]
pub struct DayService {
    store: Arc<dyn RecordStore>,
}

impl DayService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Fetch and normalize one local day's records.
    pub async fn day_records(
        &self,
        client_id: &str,
        window: &TemporalWindow,
    ) -> Vec<CanonicalRecord> {
        let raw = fetch_records(Arc::clone(&self.store), client_id, window).await;
        normalize_records(raw, window)
    }

    /// The full day view: records, summary, timeline.
    pub async fn day_view(
        &self,
        client_id: &str,
        date: NaiveDate,
        timezone_name: &str,
        offset_minutes: i32,
    ) -> Result<DayView, EngineError> {
        let window = TemporalWindow::for_local_day(date, timezone_name, offset_minutes)?;
        let records = self.day_records(client_id, &window).await;
        let summary = aggregate_day(&records, date);
        let timeline = layout_day(&records, &window);
        Ok(DayView {
            date,
            records,
            summary,
            timeline,
        })
    }

    /// Recompute the day's summary from the records and persist it to the
    /// cache. This is the recompute-queue entry point.
    pub async fn recompute_summary(
        &self,
        client_id: &str,
        date: NaiveDate,
        timezone_name: &str,
        offset_minutes: i32,
    ) -> Result<DailySummary, EngineError> {
        let window = TemporalWindow::for_local_day(date, timezone_name, offset_minutes)?;
        let records = self.day_records(client_id, &window).await;
        let summary = aggregate_day(&records, date);
        self.store
            .put_daily_summary(client_id, date, &summary)
            .await?;
        log::debug!(
            "daily summary recomputed for {} on {}: {} records",
            client_id,
            date,
            records.len()
        );
        Ok(summary)
    }

    /// Read the cached summary without recomputing.
    pub async fn cached_summary(
        &self,
        client_id: &str,
        date: NaiveDate,
    ) -> Result<Option<DailySummary>, EngineError> {
        Ok(self.store.get_daily_summary(client_id, date).await?)
    }
}
