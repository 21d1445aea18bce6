//! 24-hour timeline layout.
//!
//! Assigns each of a day's canonical records a conflict-free rectangle:
//! vertical position/extent from its minute interval (0–1440 mapped to
//! 0–100%), horizontal position from overlap resolution — temporally
//! intersecting records are grouped into clusters and packed into columns,
//! each cluster's width split evenly across its columns.
//!
//! The cluster pass is a greedy single forward walk over start-sorted
//! intervals: a record joins the first existing cluster containing any
//! intersecting member, and clusters are never re-merged after growing.
//! `test_greedy_clusters_match_transitive_closure` pins this against a
//! reference closure so any divergence surfaces in tests rather than as a
//! silent layout glitch.

use serde_json::Value;

use crate::pillars::DurationRule;
use crate::types::{CanonicalRecord, PositionedRecord};
use crate::window::TemporalWindow;

const DAY_MINUTES: i64 = 1440;

/// Minimum rectangle height (% of the day column) — keeps short events
/// legible at roughly a 30-minute visual equivalent.
pub const MIN_HEIGHT_PCT: f64 = 2.0833;

/// Fallback block length when an event-like record is missing its explicit
/// end instant.
const FALLBACK_EVENT_MINUTES: i64 = 30;

/// Hour labels for the timeline ruler the rendering layer paints.
pub fn hour_ruler() -> Vec<u32> {
    (0..24).collect()
}

#[derive(Debug, Clone)]
struct MinuteInterval {
    record_id: String,
    start: i64,
    end: i64,
}

fn intersects(a: &MinuteInterval, b: &MinuteInterval) -> bool {
    a.start <= b.end && a.end >= b.start
}

/// Compute a record's `[start, end]` minutes relative to local day start,
/// per the pillar table's duration rule. Returns `None` for degenerate
/// intervals (end ≤ start after clamping).
fn minute_interval(record: &CanonicalRecord, window: &TemporalWindow) -> Option<MinuteInterval> {
    let start = window.minutes_into_day(record.occurs_at);

    let end = match record.pillar.spec().duration {
        DurationRule::HoursField => {
            let hours = record.num_field("duration").unwrap_or(0.0);
            start + (hours * 60.0).round() as i64
        }
        DurationRule::MinutesField { default_minutes } => {
            let minutes = record
                .fields
                .get("duration")
                .and_then(Value::as_f64)
                .map(|m| m.round() as i64)
                .unwrap_or(default_minutes);
            start + minutes
        }
        DurationRule::ExplicitEnd => match record.ends_at {
            Some(ends_at) => window.minutes_into_day(ends_at),
            None => start + FALLBACK_EVENT_MINUTES,
        },
        DurationRule::FixedMinutes(minutes) => start + minutes,
    };

    let start = start.clamp(0, DAY_MINUTES);
    let end = end.clamp(0, DAY_MINUTES);
    if end <= start {
        return None;
    }

    Some(MinuteInterval {
        record_id: record.id.clone(),
        start,
        end,
    })
}

/// Greedy single-pass clustering over start-sorted intervals.
fn cluster_intervals(intervals: Vec<MinuteInterval>) -> Vec<Vec<MinuteInterval>> {
    let mut clusters: Vec<Vec<MinuteInterval>> = Vec::new();
    for interval in intervals {
        let joined = clusters
            .iter_mut()
            .find(|cluster| cluster.iter().any(|member| intersects(member, &interval)));
        match joined {
            Some(cluster) => cluster.push(interval),
            None => clusters.push(vec![interval]),
        }
    }
    clusters
}

/// Pack one cluster into columns: each record takes the first column whose
/// most recently added record has ended by this record's start.
fn pack_columns(cluster: Vec<MinuteInterval>) -> Vec<(MinuteInterval, usize, usize)> {
    let mut columns: Vec<Vec<MinuteInterval>> = Vec::new();
    let mut placed: Vec<(MinuteInterval, usize)> = Vec::new();

    for interval in cluster {
        let slot = columns
            .iter()
            .position(|col| col.last().map(|last| last.end <= interval.start).unwrap_or(true));
        let index = match slot {
            Some(index) => index,
            None => {
                columns.push(Vec::new());
                columns.len() - 1
            }
        };
        columns[index].push(interval.clone());
        placed.push((interval, index));
    }

    let column_count = columns.len().max(1);
    placed
        .into_iter()
        .map(|(interval, index)| (interval, index, column_count))
        .collect()
}

/// Lay out one day's canonical records. Empty input yields empty output;
/// there are no error states.
pub fn layout_day(records: &[CanonicalRecord], window: &TemporalWindow) -> Vec<PositionedRecord> {
    let mut intervals: Vec<MinuteInterval> = records
        .iter()
        .filter_map(|record| minute_interval(record, window))
        .collect();

    // Start ascending; longer events first among same-start ties so they
    // claim the leftmost column.
    intervals.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));

    let mut positioned = Vec::with_capacity(intervals.len());
    for cluster in cluster_intervals(intervals) {
        for (interval, column, column_count) in pack_columns(cluster) {
            let width = 100.0 / column_count as f64;
            let raw_height =
                (interval.end - interval.start) as f64 / DAY_MINUTES as f64 * 100.0;
            positioned.push(PositionedRecord {
                record_id: interval.record_id,
                top: interval.start as f64 / DAY_MINUTES as f64 * 100.0,
                height: raw_height.max(MIN_HEIGHT_PCT),
                left: column as f64 * width,
                width,
            });
        }
    }
    positioned
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use serde_json::Map;

    use crate::pillars::Pillar;

    fn window() -> TemporalWindow {
        TemporalWindow::for_local_day(
            NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
            "UTC",
            0,
        )
        .unwrap()
    }

    fn record_at(
        id: &str,
        pillar: Pillar,
        start_minutes: i64,
        fields: Map<String, Value>,
    ) -> CanonicalRecord {
        let w = window();
        CanonicalRecord {
            id: id.into(),
            pillar,
            occurs_at: w.filter_start + Duration::minutes(start_minutes),
            ends_at: None,
            title: id.into(),
            fields,
        }
    }

    fn activity(id: &str, start_minutes: i64, duration_minutes: f64) -> CanonicalRecord {
        let mut fields = Map::new();
        fields.insert("duration".into(), duration_minutes.into());
        record_at(id, Pillar::Activity, start_minutes, fields)
    }

    fn rect<'a>(out: &'a [PositionedRecord], id: &str) -> &'a PositionedRecord {
        out.iter().find(|p| p.record_id == id).expect("positioned")
    }

    #[test]
    fn test_empty_input_yields_empty_output() {
        assert!(layout_day(&[], &window()).is_empty());
    }

    #[test]
    fn test_hour_ruler_covers_the_day() {
        let ruler = hour_ruler();
        assert_eq!(ruler.len(), 24);
        assert_eq!(ruler.first(), Some(&0));
        assert_eq!(ruler.last(), Some(&23));
    }

    #[test]
    fn test_same_start_activities_split_into_two_half_width_columns() {
        // Both start at minute 60, durations 30 and 45.
        let records = vec![activity("short", 60, 30.0), activity("long", 60, 45.0)];
        let out = layout_day(&records, &window());
        assert_eq!(out.len(), 2);

        let long = rect(&out, "long");
        let short = rect(&out, "short");
        assert_eq!(long.width, 50.0);
        assert_eq!(short.width, 50.0);
        // Longer event sorts first and claims the left column.
        assert_eq!(long.left, 0.0);
        assert_eq!(short.left, 50.0);
    }

    #[test]
    fn test_non_overlapping_records_keep_full_width() {
        let records = vec![activity("a", 60, 30.0), activity("b", 300, 30.0)];
        let out = layout_day(&records, &window());
        assert_eq!(rect(&out, "a").width, 100.0);
        assert_eq!(rect(&out, "b").width, 100.0);
        assert_eq!(rect(&out, "a").left, 0.0);
    }

    #[test]
    fn test_vertical_position_maps_minutes_to_percent() {
        // 06:00 = minute 360 = 25% down the day.
        let out = layout_day(&[activity("a", 360, 72.0)], &window());
        let a = rect(&out, "a");
        assert!((a.top - 25.0).abs() < 1e-9);
        assert!((a.height - 5.0).abs() < 1e-9); // 72 min / 1440 * 100
    }

    #[test]
    fn test_minimum_height_floor_applies_to_short_blocks() {
        // Planner blocks are 15 minutes — below the visual floor.
        let planned = record_at("p", Pillar::Planner, 600, Map::new());
        let out = layout_day(&[planned], &window());
        assert_eq!(rect(&out, "p").height, MIN_HEIGHT_PCT);
    }

    #[test]
    fn test_sleep_duration_is_hours_from_start() {
        let mut fields = Map::new();
        fields.insert("duration".into(), 2.0.into());
        let sleep = record_at("s", Pillar::Sleep, 0, fields);
        let out = layout_day(&[sleep], &window());
        let s = rect(&out, "s");
        assert!((s.height - (120.0 / 1440.0 * 100.0)).abs() < 1e-9);
    }

    #[test]
    fn test_appointment_uses_explicit_end_instant() {
        let w = window();
        let mut appt = record_at("appt", Pillar::Appointment, 540, Map::new());
        appt.ends_at = Some(w.filter_start + Duration::minutes(630));
        let out = layout_day(&[appt], &w);
        let a = rect(&out, "appt");
        assert!((a.height - (90.0 / 1440.0 * 100.0)).abs() < 1e-9);
    }

    #[test]
    fn test_intervals_clamped_to_day_bounds() {
        // Sleep starting 23:00 for 8h clamps at midnight.
        let mut fields = Map::new();
        fields.insert("duration".into(), 8.0.into());
        let sleep = record_at("s", Pillar::Sleep, 1380, fields);
        let out = layout_day(&[sleep], &window());
        let s = rect(&out, "s");
        let expected_height = 60.0 / 1440.0 * 100.0; // 23:00–24:00
        assert!((s.height - expected_height).abs() < 1e-9);
        assert!(s.top + s.height <= 100.0 + 1e-9);
    }

    #[test]
    fn test_degenerate_intervals_discarded() {
        // Activity with zero duration collapses to end == start.
        let out = layout_day(&[activity("z", 60, 0.0)], &window());
        assert!(out.is_empty());
    }

    #[test]
    fn test_no_two_records_in_one_column_overlap() {
        let records = vec![
            activity("a", 0, 120.0),
            activity("b", 30, 30.0),
            activity("c", 45, 90.0),
            activity("d", 70, 20.0),
            activity("e", 130, 45.0),
            activity("f", 200, 15.0),
        ];
        let out = layout_day(&records, &window());

        // Reconstruct columns from left offsets and check pairwise.
        for p1 in &out {
            for p2 in &out {
                if p1.record_id == p2.record_id || (p1.left - p2.left).abs() > 1e-9 {
                    continue;
                }
                let i1 = out_interval(&records, &p1.record_id);
                let i2 = out_interval(&records, &p2.record_id);
                let overlap = i1.0 < i2.1 && i2.0 < i1.1;
                assert!(
                    !overlap,
                    "{} and {} share a column but overlap",
                    p1.record_id, p2.record_id
                );
            }
        }
    }

    fn out_interval(records: &[CanonicalRecord], id: &str) -> (i64, i64) {
        let w = window();
        let r = records.iter().find(|r| r.id == id).unwrap();
        let start = w.minutes_into_day(r.occurs_at);
        let minutes = r.num_field("duration").unwrap_or(15.0) as i64;
        (start, start + minutes)
    }

    /// Reference clustering: full transitive closure over the intersects
    /// relation, order-independent.
    fn closure_clusters(intervals: &[(i64, i64)]) -> Vec<Vec<usize>> {
        let n = intervals.len();
        let mut parent: Vec<usize> = (0..n).collect();
        fn find(parent: &mut Vec<usize>, mut i: usize) -> usize {
            while parent[i] != i {
                let grandparent = parent[parent[i]];
                parent[i] = grandparent;
                i = grandparent;
            }
            i
        }
        for i in 0..n {
            for j in (i + 1)..n {
                let (s1, e1) = intervals[i];
                let (s2, e2) = intervals[j];
                if s1 <= e2 && e1 >= s2 {
                    let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                    if ri != rj {
                        parent[ri] = rj;
                    }
                }
            }
        }
        let mut groups: std::collections::HashMap<usize, Vec<usize>> =
            std::collections::HashMap::new();
        for i in 0..n {
            let root = find(&mut parent, i);
            groups.entry(root).or_default().push(i);
        }
        let mut out: Vec<Vec<usize>> = groups.into_values().collect();
        for g in &mut out {
            g.sort_unstable();
        }
        out.sort();
        out
    }

    #[test]
    fn test_greedy_clusters_match_transitive_closure() {
        // Adversarial sets: chained bridges, containment, repeated starts,
        // and intervals that touch exactly at their endpoints.
        let cases: Vec<Vec<(i64, i64)>> = vec![
            vec![(0, 100), (90, 200), (190, 300), (400, 500)],
            vec![(0, 500), (50, 60), (70, 80), (450, 700), (600, 650)],
            vec![(0, 30), (30, 60), (60, 90), (200, 230)],
            vec![(0, 100), (0, 50), (0, 25), (100, 150), (160, 170)],
            vec![(10, 20), (15, 400), (30, 40), (50, 60), (390, 410)],
        ];

        for case in cases {
            let mut intervals: Vec<MinuteInterval> = case
                .iter()
                .enumerate()
                .map(|(i, &(start, end))| MinuteInterval {
                    record_id: i.to_string(),
                    start,
                    end,
                })
                .collect();
            intervals.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));

            let greedy: Vec<Vec<usize>> = {
                let mut clusters: Vec<Vec<usize>> = cluster_intervals(intervals)
                    .into_iter()
                    .map(|cluster| {
                        let mut ids: Vec<usize> = cluster
                            .iter()
                            .map(|i| i.record_id.parse().unwrap())
                            .collect();
                        ids.sort_unstable();
                        ids
                    })
                    .collect();
                clusters.sort();
                clusters
            };

            assert_eq!(greedy, closure_clusters(&case), "case {:?}", case);
        }
    }
}
