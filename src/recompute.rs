//! Debounced daily-summary recomputation.
//!
//! Every record write (create, edit, delete) enqueues a recompute request
//! for the affected client/day. Requests are deduplicated by (client, date)
//! and debounced: rapid writes within the window coalesce into one request
//! that fires after the last write settles. A background worker drains the
//! queue and re-runs both the day aggregation and the client's rolling
//! summary; callers of the write path never wait on it, so the summary
//! caches are eventually consistent.
//!
//! The queue and the worker's [`RecomputeWorker::run_once`] are separated so
//! tests drive time explicitly instead of sleeping on the poll loop.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::services::daily::DayService;
use crate::services::rolling::RollingService;
use crate::types::ClientProfile;

/// How long after the last triggering write a recompute fires.
const DEBOUNCE: Duration = Duration::from_millis(1500);

/// How often the background worker checks for ready work.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A pending recompute for one client's local day.
#[derive(Debug, Clone)]
pub struct RecomputeRequest {
    pub client_id: String,
    pub date: NaiveDate,
    pub timezone_name: String,
    pub offset_minutes: i32,
    /// Profile fields the write collaborator owns, copied through into the
    /// rolling summary.
    pub profile: ClientProfile,
    ready_at: Instant,
}

impl RecomputeRequest {
    fn key(&self) -> (&str, NaiveDate) {
        (self.client_id.as_str(), self.date)
    }
}

/// Thread-safe recompute queue with per-(client, date) deduplication and
/// write-settling debounce.
pub struct RecomputeQueue {
    queue: Mutex<VecDeque<RecomputeRequest>>,
    debounce: Duration,
}

impl Default for RecomputeQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl RecomputeQueue {
    pub fn new() -> Self {
        Self::with_debounce(DEBOUNCE)
    }

    pub fn with_debounce(debounce: Duration) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            debounce,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::with_debounce(Duration::from_millis(config.recompute_debounce_ms))
    }

    /// Enqueue a recompute after a record write. Fire-and-forget: never
    /// blocks, never fails. A request already pending for the same client
    /// and date has its debounce window restarted instead of queueing twice.
    pub fn enqueue(
        &self,
        client_id: &str,
        date: NaiveDate,
        timezone_name: &str,
        offset_minutes: i32,
        profile: &ClientProfile,
    ) {
        let ready_at = Instant::now() + self.debounce;
        let mut queue = self.queue.lock();

        if let Some(existing) = queue
            .iter_mut()
            .find(|r| r.key() == (client_id, date))
        {
            existing.ready_at = ready_at;
            existing.timezone_name = timezone_name.to_string();
            existing.offset_minutes = offset_minutes;
            existing.profile = profile.clone();
            log::debug!("recompute coalesced for {} on {}", client_id, date);
            return;
        }

        log::debug!("recompute enqueued for {} on {}", client_id, date);
        queue.push_back(RecomputeRequest {
            client_id: client_id.to_string(),
            date,
            timezone_name: timezone_name.to_string(),
            offset_minutes,
            profile: profile.clone(),
            ready_at,
        });
    }

    /// Pop the first request whose debounce window has elapsed at `now`.
    fn dequeue_ready(&self, now: Instant) -> Option<RecomputeRequest> {
        let mut queue = self.queue.lock();
        let index = queue.iter().position(|r| r.ready_at <= now)?;
        queue.remove(index)
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Background worker draining the recompute queue. Each request refreshes
/// the day's [`DailySummary`] and the client's rolling summary.
pub struct RecomputeWorker {
    queue: Arc<RecomputeQueue>,
    days: DayService,
    rolling: RollingService,
}

impl RecomputeWorker {
    pub fn new(queue: Arc<RecomputeQueue>, days: DayService, rolling: RollingService) -> Self {
        Self {
            queue,
            days,
            rolling,
        }
    }

    /// Drain every request ready at `now`, returning how many were
    /// processed. A failed recompute is logged and dropped; the next write
    /// to that day enqueues a fresh request.
    pub async fn run_once(&self, now: Instant) -> usize {
        let mut processed = 0;
        while let Some(request) = self.queue.dequeue_ready(now) {
            match self.recompute(&request).await {
                Ok(()) => processed += 1,
                Err(e) => log::warn!(
                    "recompute failed for {} on {}: {}",
                    request.client_id,
                    request.date,
                    e
                ),
            }
        }
        processed
    }

    async fn recompute(&self, request: &RecomputeRequest) -> Result<(), EngineError> {
        self.days
            .recompute_summary(
                &request.client_id,
                request.date,
                &request.timezone_name,
                request.offset_minutes,
            )
            .await?;
        self.rolling
            .recompute_client_summary(
                &request.client_id,
                &request.profile,
                request.date,
                &request.timezone_name,
                request.offset_minutes,
                Utc::now(),
            )
            .await?;
        Ok(())
    }

    /// Spawn the poll loop. Runs until the handle is dropped or aborted.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            log::info!("recompute worker started");
            loop {
                tokio::time::sleep(POLL_INTERVAL).await;
                self.run_once(Instant::now()).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::pillars::Pillar;
    use crate::store::{store_instant, SqliteRecordStore};

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
    }

    fn profile() -> ClientProfile {
        ClientProfile::new()
    }

    fn settled() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    #[test]
    fn test_debounce_comes_from_config() {
        let mut config = EngineConfig::default();
        config.recompute_debounce_ms = 0;
        let queue = RecomputeQueue::from_config(&config);
        queue.enqueue("c1", day(), "UTC", 0, &profile());
        assert!(queue.dequeue_ready(Instant::now()).is_some());
    }

    #[test]
    fn test_enqueue_coalesces_same_client_and_date() {
        let queue = RecomputeQueue::new();
        queue.enqueue("c1", day(), "UTC", 0, &profile());
        queue.enqueue("c1", day(), "UTC", 0, &profile());
        queue.enqueue("c1", day(), "UTC", 0, &profile());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_enqueue_keeps_distinct_days_and_clients() {
        let queue = RecomputeQueue::new();
        queue.enqueue("c1", day(), "UTC", 0, &profile());
        queue.enqueue("c1", day().succ_opt().unwrap(), "UTC", 0, &profile());
        queue.enqueue("c2", day(), "UTC", 0, &profile());
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_requests_not_ready_inside_debounce_window() {
        let queue = RecomputeQueue::new();
        queue.enqueue("c1", day(), "UTC", 0, &profile());
        assert!(queue.dequeue_ready(Instant::now()).is_none());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_requests_ready_after_debounce_window() {
        let queue = RecomputeQueue::new();
        queue.enqueue("c1", day(), "UTC", 0, &profile());
        let request = queue.dequeue_ready(settled()).expect("ready");
        assert_eq!(request.client_id, "c1");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_coalescing_restarts_the_debounce_window() {
        let queue = RecomputeQueue::with_debounce(Duration::from_secs(60));
        queue.enqueue("c1", day(), "UTC", 0, &profile());
        let first_deadline = Instant::now() + Duration::from_secs(30);

        // A second write lands; the pending request must not fire at the
        // first deadline anymore.
        queue.enqueue("c1", day(), "UTC", 0, &profile());
        assert!(queue.dequeue_ready(first_deadline).is_none());
        assert!(queue.dequeue_ready(settled() + Duration::from_secs(60)).is_some());
    }

    #[test]
    fn test_zero_debounce_is_immediately_ready() {
        let queue = RecomputeQueue::with_debounce(Duration::ZERO);
        queue.enqueue("c1", day(), "UTC", 0, &profile());
        assert!(queue.dequeue_ready(Instant::now()).is_some());
    }

    #[tokio::test]
    async fn test_worker_recomputes_and_persists_ready_requests() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            Arc::new(SqliteRecordStore::open_at(dir.path().join("t.db")).unwrap());

        let noon = day().and_hms_opt(12, 0, 0).unwrap().and_utc();
        let payload = match json!({ "entryDate": store_instant(noon), "amount": 32.0 }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        store
            .upsert_record("c1", Pillar::Hydration, "h1", &payload)
            .unwrap();

        let queue = Arc::new(RecomputeQueue::with_debounce(Duration::ZERO));
        queue.enqueue("c1", day(), "UTC", 0, &profile());

        let service = DayService::new(store.clone());
        let rolling = RollingService::new(store.clone());
        let worker =
            RecomputeWorker::new(Arc::clone(&queue), service.clone(), rolling.clone());
        assert_eq!(worker.run_once(settled()).await, 1);
        assert!(queue.is_empty());

        let cached = service.cached_summary("c1", day()).await.unwrap().unwrap();
        assert_eq!(cached.hydration_amount, 32);
    }

    #[tokio::test]
    async fn test_worker_refreshes_the_rolling_summary_cache() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            Arc::new(SqliteRecordStore::open_at(dir.path().join("t.db")).unwrap());

        let noon = day().and_hms_opt(12, 0, 0).unwrap().and_utc();
        let payload = match json!({ "entryDate": store_instant(noon), "amount": 70.0 }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        store
            .upsert_record("c1", Pillar::Hydration, "h1", &payload)
            .unwrap();

        let queue = Arc::new(RecomputeQueue::with_debounce(Duration::ZERO));
        queue.enqueue("c1", day(), "UTC", 0, &profile());

        let rolling = RollingService::new(store.clone());
        let worker = RecomputeWorker::new(
            Arc::clone(&queue),
            DayService::new(store.clone()),
            rolling.clone(),
        );
        assert!(rolling.cached_summary("c1").await.unwrap().is_none());
        assert_eq!(worker.run_once(settled()).await, 1);

        // One logged day in the window, so the average is the day's total.
        let cached = rolling.cached_summary("c1").await.unwrap().unwrap();
        assert_eq!(cached.avg_hydration, 70.0);
    }

    #[tokio::test]
    async fn test_failed_recompute_is_dropped_without_stopping_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            Arc::new(SqliteRecordStore::open_at(dir.path().join("t.db")).unwrap());

        let queue = Arc::new(RecomputeQueue::with_debounce(Duration::ZERO));
        queue.enqueue("c1", day(), "Nowhere/Void", 0, &profile());
        queue.enqueue("c2", day(), "UTC", 0, &profile());

        let worker = RecomputeWorker::new(
            Arc::clone(&queue),
            DayService::new(store.clone()),
            RollingService::new(store),
        );
        // Only the valid request counts as processed; both leave the queue.
        assert_eq!(worker.run_once(settled()).await, 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_ready_requests_drain_in_enqueue_order() {
        let queue = RecomputeQueue::with_debounce(Duration::ZERO);
        queue.enqueue("c1", day(), "UTC", 0, &profile());
        queue.enqueue("c2", day(), "UTC", 0, &profile());
        assert_eq!(queue.dequeue_ready(settled()).unwrap().client_id, "c1");
        assert_eq!(queue.dequeue_ready(settled()).unwrap().client_id, "c2");
    }
}
