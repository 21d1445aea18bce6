//! Record fetch fan-out.
//!
//! One day view touches eleven pillar collections, each queried twice: once
//! against the flat date key and once against the nested legacy
//! `log.<dateKey>` shape. All 22 queries run concurrently and are awaited to
//! completion; a failing query is logged and degrades to an empty result for
//! that pillar/shape so one unavailable collection never blocks the day.
//! Result arrival order is meaningless — normalization re-sorts.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinSet;

use crate::pillars::{Pillar, ALL_PILLARS};
use crate::store::RecordStore;
use crate::types::{FetchShape, RawRecord};
use crate::window::TemporalWindow;

/// Fetch all raw records for a client over the window's widened query range,
/// unioned across both storage shapes. Duplicate ids (the same record
/// fetched under both shapes) collapse to one row, flat-shape copy winning.
pub async fn fetch_records(
    store: Arc<dyn RecordStore>,
    client_id: &str,
    window: &TemporalWindow,
) -> Vec<RawRecord> {
    let mut tasks: JoinSet<(Pillar, FetchShape, Vec<RawRecord>)> = JoinSet::new();

    for pillar in ALL_PILLARS {
        for shape in [FetchShape::Flat, FetchShape::Nested] {
            let store = Arc::clone(&store);
            let client_id = client_id.to_string();
            let date_field = match shape {
                FetchShape::Flat => pillar.spec().date_field.to_string(),
                FetchShape::Nested => pillar.nested_date_field(),
            };
            let (start, end) = (window.query_start, window.query_end);

            tasks.spawn(async move {
                match store
                    .query(pillar, &client_id, &date_field, start, end)
                    .await
                {
                    Ok(records) => (pillar, shape, records),
                    Err(e) => {
                        log::warn!(
                            "pillar {} query failed on {} shape, treating as empty: {}",
                            pillar.as_str(),
                            match shape {
                                FetchShape::Flat => "flat",
                                FetchShape::Nested => "nested",
                            },
                            e
                        );
                        (pillar, shape, Vec::new())
                    }
                }
            });
        }
    }

    let mut flat: Vec<RawRecord> = Vec::new();
    let mut nested: Vec<RawRecord> = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, FetchShape::Flat, records)) => flat.extend(records),
            Ok((_, FetchShape::Nested, records)) => nested.extend(records),
            Err(e) => log::warn!("fetch task panicked, treating as empty: {}", e),
        }
    }

    // Union keyed by (pillar, id). Nested copies land first so flat copies
    // overwrite them on conflict.
    let mut by_id: HashMap<(Pillar, String), RawRecord> = HashMap::new();
    for record in nested.into_iter().chain(flat) {
        by_id.insert((record.pillar, record.id.clone()), record);
    }
    by_id.into_values().collect()
}
