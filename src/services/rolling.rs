//! Rolling N-day aggregation.
//!
//! Reuses the fetch/normalize pipeline over a multi-day window and folds the
//! result into a [`ClientSummary`] with the same pure-reducer shape as the
//! day fold. Divisor rules differ by metric: sleep, hydration and UPF
//! average over the days (or meals) that actually have data; activity and
//! nutrients average over the full window, treating missing days as zero.
//!
//! Weight and waist trend fields are the exception to the window: they read
//! the client's whole measurements history (first/last entries by date), so
//! `startWeight` stays anchored to the first weigh-in ever and
//! `currentWeight` survives weeks without one.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::error::EngineError;
use crate::fetch::fetch_records;
use crate::normalize::normalize_records;
use crate::pillars::Pillar;
use crate::store::RecordStore;
use crate::types::{CanonicalRecord, ClientProfile, ClientSummary};
use crate::window::TemporalWindow;

/// Default rolling window length in days.
pub const DEFAULT_WINDOW_DAYS: u32 = 7;

/// How far back a binge still counts as "recent", in hours.
const BINGE_RECENCY_HOURS: i64 = 24;

#[derive(Debug, Default)]
struct PeriodAccumulator {
    sleep_hours: f64,
    sleep_days: HashSet<NaiveDate>,
    hydration: f64,
    hydration_days: HashSet<NaiveDate>,
    activity_minutes: f64,
    meal_upf_percentages: Vec<f64>,
    nutrient_sums: HashMap<String, f64>,
    cravings: u32,
    binges: u32,
    stress_events: u32,
    last_binge_at: Option<DateTime<Utc>>,
}

fn reduce_period(
    mut acc: PeriodAccumulator,
    record: &CanonicalRecord,
    offset_minutes: i32,
) -> PeriodAccumulator {
    // Day keys are local calendar dates (UTC = local + offset).
    let local_day = (record.occurs_at - Duration::minutes(i64::from(offset_minutes))).date_naive();

    match record.pillar {
        Pillar::Sleep => {
            if !record.bool_field("isNap").unwrap_or(false) {
                acc.sleep_hours += record.num_field("duration").unwrap_or(0.0);
                acc.sleep_days.insert(local_day);
            }
        }
        Pillar::Hydration => {
            acc.hydration += record.num_field("amount").unwrap_or(0.0);
            acc.hydration_days.insert(local_day);
        }
        Pillar::Activity => {
            acc.activity_minutes += record.num_field("duration").unwrap_or(0.0);
        }
        Pillar::Nutrition => {
            let calories = meal_summary_num(record, "totalMealCalories");
            let upf_calories = meal_summary_num(record, "totalMealUpfCalories");
            if calories > 0.0 {
                acc.meal_upf_percentages
                    .push((100.0 * upf_calories / calories).clamp(0.0, 100.0));
            }
            if let Some(serde_json::Value::Object(nutrients)) = record
                .fields
                .get("summary")
                .and_then(|s| s.get("nutrients"))
            {
                for (name, entry) in nutrients {
                    let value = entry
                        .get("value")
                        .and_then(serde_json::Value::as_f64)
                        .unwrap_or(0.0);
                    *acc.nutrient_sums.entry(name.clone()).or_insert(0.0) += value;
                }
            }
        }
        Pillar::Cravings => match record.str_field("type") {
            Some("binge") => {
                acc.binges += 1;
                acc.last_binge_at = Some(match acc.last_binge_at {
                    Some(prev) => prev.max(record.occurs_at),
                    None => record.occurs_at,
                });
            }
            _ => acc.cravings += 1,
        },
        Pillar::Stress => match record.str_field("type") {
            // Untyped stress rows predate the discriminator and still count.
            Some("stress") | None => acc.stress_events += 1,
            Some(_) => {}
        },
        _ => {}
    }
    acc
}

/// Trend fields folded from the full measurements history, not the rolling
/// window.
#[derive(Debug, Default)]
struct MeasurementTrend {
    weights: Vec<(DateTime<Utc>, f64)>,
    waist_to_height: Option<f64>,
}

fn measurement_trend(history: &[CanonicalRecord]) -> MeasurementTrend {
    let mut trend = MeasurementTrend::default();
    for record in history.iter().filter(|r| r.pillar == Pillar::Measurements) {
        if let Some(weight) = record.num_field("weight").filter(|w| *w > 0.0) {
            trend.weights.push((record.occurs_at, weight));
        }
        if let (Some(waist), Some(height)) = (
            record.num_field("waist").filter(|v| *v > 0.0),
            record.num_field("height").filter(|v| *v > 0.0),
        ) {
            trend.waist_to_height = Some(waist / height);
        }
    }
    trend
}

fn meal_summary_num(record: &CanonicalRecord, key: &str) -> f64 {
    record
        .fields
        .get("summary")
        .and_then(|s| s.get(key))
        .and_then(serde_json::Value::as_f64)
        .unwrap_or(0.0)
}

fn average(sum: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Fold a window's canonical records into the rolling summary. Pure; both
/// slices must already be sorted ascending (the normalizer's output order),
/// so first/last measurement lookups are positional.
///
/// `measurement_history` spans the client's entire record, not just the
/// window; the weight/waist trend fields come from it.
pub fn aggregate_period(
    records: &[CanonicalRecord],
    measurement_history: &[CanonicalRecord],
    window_days: u32,
    offset_minutes: i32,
    profile: &ClientProfile,
    now: DateTime<Utc>,
) -> ClientSummary {
    let acc = records.iter().fold(PeriodAccumulator::default(), |acc, r| {
        reduce_period(acc, r, offset_minutes)
    });
    let trend = measurement_trend(measurement_history);

    let days = window_days.max(1) as usize;
    let recent_binge = acc
        .last_binge_at
        .map(|at| now - at <= Duration::hours(BINGE_RECENCY_HOURS))
        .unwrap_or(false);

    ClientSummary {
        generated_at: now,
        age_years: profile.age_years,
        sex: profile.sex.clone(),
        unit_system: profile.unit_system.clone(),
        start_weight: trend.weights.first().map(|(_, w)| *w),
        current_weight: trend.weights.last().map(|(_, w)| *w),
        last_weight_date: trend.weights.last().map(|(at, _)| *at),
        current_waist_to_height_ratio: trend.waist_to_height,
        avg_sleep: average(acc.sleep_hours, acc.sleep_days.len()),
        avg_activity: average(acc.activity_minutes, days),
        avg_hydration: average(acc.hydration, acc.hydration_days.len()),
        cravings_count: acc.cravings,
        binges_count: acc.binges,
        stress_events_count: acc.stress_events,
        avg_upf: average(
            acc.meal_upf_percentages.iter().sum(),
            acc.meal_upf_percentages.len(),
        ),
        avg_nutrients: acc
            .nutrient_sums
            .into_iter()
            .map(|(name, sum)| (name, sum / days as f64))
            .collect(),
        recent_binge_detected: recent_binge,
        last_binge_at: acc.last_binge_at,
    }
}

/// Rolling-window pipeline over a [`RecordStore`].
#[derive(Clone)]
pub struct RollingService {
    store: Arc<dyn RecordStore>,
    window_days: u32,
}

impl RollingService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self::with_window(store, DEFAULT_WINDOW_DAYS)
    }

    pub fn with_window(store: Arc<dyn RecordStore>, window_days: u32) -> Self {
        Self {
            store,
            window_days: window_days.max(1),
        }
    }

    /// Recompute the rolling summary ending on `today` (inclusive) and
    /// persist it to the cache. `now` is injected so recency checks are
    /// deterministic under test.
    pub async fn recompute_client_summary(
        &self,
        client_id: &str,
        profile: &ClientProfile,
        today: NaiveDate,
        timezone_name: &str,
        offset_minutes: i32,
        now: DateTime<Utc>,
    ) -> Result<ClientSummary, EngineError> {
        let start = today - Duration::days(i64::from(self.window_days) - 1);
        let window =
            TemporalWindow::for_local_days(start, today, timezone_name, offset_minutes)?;
        let history_window = TemporalWindow::for_local_days(
            DateTime::<Utc>::UNIX_EPOCH.date_naive(),
            today,
            timezone_name,
            offset_minutes,
        )?;

        let raw = fetch_records(Arc::clone(&self.store), client_id, &window).await;
        let records = normalize_records(raw, &window);
        let history = self.measurement_history(client_id, &history_window).await;
        let summary = aggregate_period(
            &records,
            &history,
            self.window_days,
            offset_minutes,
            profile,
            now,
        );

        self.store.put_client_summary(client_id, &summary).await?;
        log::debug!(
            "rolling summary recomputed for {} over {} days ending {}: {} records",
            client_id,
            self.window_days,
            today,
            records.len()
        );
        Ok(summary)
    }

    pub async fn cached_summary(
        &self,
        client_id: &str,
    ) -> Result<Option<ClientSummary>, EngineError> {
        Ok(self.store.get_client_summary(client_id).await?)
    }

    /// Fetch the client's entire measurements record, both storage shapes,
    /// normalized and date-ordered. Failures degrade to empty like the
    /// windowed fan-out: a missing trend beats a failed rollup.
    async fn measurement_history(
        &self,
        client_id: &str,
        window: &TemporalWindow,
    ) -> Vec<CanonicalRecord> {
        let flat_field = Pillar::Measurements.spec().date_field.to_string();
        let nested_field = Pillar::Measurements.nested_date_field();

        let mut raw = Vec::new();
        for date_field in [flat_field, nested_field] {
            match self
                .store
                .query(
                    Pillar::Measurements,
                    client_id,
                    &date_field,
                    window.query_start,
                    window.query_end,
                )
                .await
            {
                Ok(records) => raw.extend(records),
                Err(e) => log::warn!(
                    "measurements history query failed on {}, treating as empty: {}",
                    date_field,
                    e
                ),
            }
        }
        normalize_records(raw, window)
    }
}
