//! Live import progress tracking and publication.
//!
//! One [`ImportProgress`] instance exists per run, owned by the active run
//! and discarded when it ends; durable outcomes live in the sync history
//! instead. Publication is fire-and-forget: a failing channel is logged and
//! never fails the import.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;

/// Event name used for all import progress publications.
pub const PROGRESS_EVENT: &str = "import:progress";

/// Minimum number of newly processed records between two in-loop emissions.
const RECORDS_PER_EMIT: u64 = 5_000;

/// Run-level status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Initializing,
    InProgress,
    Completed,
    Failed,
}

/// Per-collection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// Progress of one collection within a run.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionProgress {
    /// Source collection name
    pub name: String,
    /// Current status
    pub status: CollectionStatus,
    /// Total applicable documents, once counted
    pub total_records: Option<u64>,
    /// Documents handled so far (successes and failures)
    pub processed_records: u64,
    /// Documents counted as failed
    pub failed_records: u64,
}

/// Live state of one import run.
///
/// Owned exclusively by the active run; a new engine instance per run keeps
/// two concurrent runs from ever sharing one of these.
#[derive(Debug, Clone, Serialize)]
pub struct ImportProgress {
    /// Data source being imported
    pub data_source_id: i64,
    /// Owning user, when the run was started by one
    pub user_id: Option<i64>,
    /// Run status
    pub status: RunStatus,
    /// Per-collection progress, in source-enumeration order
    pub collections: Vec<CollectionProgress>,
    /// Records handled across all collections
    pub processed_records: u64,
    /// Records counted as failed across all collections
    pub failed_records: u64,
    /// Completion percentage, monotonically non-decreasing
    pub percentage: f64,
    /// Wall-clock start of the run
    pub started_at: DateTime<Utc>,
    /// Error message once the run has failed
    pub error_message: Option<String>,
    #[serde(skip)]
    started: Instant,
}

impl ImportProgress {
    /// Create the progress state for a fresh run.
    pub fn new(data_source_id: i64, user_id: Option<i64>) -> Self {
        Self {
            data_source_id,
            user_id,
            status: RunStatus::Initializing,
            collections: Vec::new(),
            processed_records: 0,
            failed_records: 0,
            percentage: 0.0,
            started_at: Utc::now(),
            error_message: None,
            started: Instant::now(),
        }
    }

    /// Mark the run as actively importing.
    pub fn start_run(&mut self) {
        self.status = RunStatus::InProgress;
    }

    /// Seed a pending entry for an enumerated collection.
    pub fn register_collection(&mut self, name: &str) {
        self.collections.push(CollectionProgress {
            name: name.to_string(),
            status: CollectionStatus::Pending,
            total_records: None,
            processed_records: 0,
            failed_records: 0,
        });
    }

    /// Mark a collection as in progress.
    pub fn start_collection(&mut self, name: &str) {
        if let Some(c) = self.collection_mut(name) {
            c.status = CollectionStatus::InProgress;
        }
    }

    /// Record the counted total for a collection.
    pub fn set_collection_total(&mut self, name: &str, total: u64) {
        if let Some(c) = self.collection_mut(name) {
            c.total_records = Some(total);
        }
        self.recompute_percentage();
    }

    /// Fold one batch outcome into the running counters.
    pub fn record_batch(&mut self, name: &str, succeeded: u64, failed: u64) {
        if let Some(c) = self.collection_mut(name) {
            c.processed_records += succeeded + failed;
            c.failed_records += failed;
        }
        self.processed_records += succeeded + failed;
        self.failed_records += failed;
        self.recompute_percentage();
    }

    /// Mark a collection as completed.
    pub fn complete_collection(&mut self, name: &str) {
        if let Some(c) = self.collection_mut(name) {
            c.status = CollectionStatus::Completed;
        }
        self.recompute_percentage();
    }

    /// Mark a collection as failed.
    pub fn fail_collection(&mut self, name: &str) {
        if let Some(c) = self.collection_mut(name) {
            c.status = CollectionStatus::Failed;
        }
    }

    /// Mark the run as completed; the percentage pins to exactly 100.
    pub fn complete_run(&mut self) {
        self.status = RunStatus::Completed;
        self.percentage = 100.0;
    }

    /// Mark the run as failed, keeping whatever progress was made.
    pub fn fail_run(&mut self, error: impl Into<String>) {
        self.status = RunStatus::Failed;
        self.error_message = Some(error.into());
    }

    /// Sum of the known per-collection totals.
    pub fn total_records(&self) -> Option<u64> {
        let known: Vec<u64> = self
            .collections
            .iter()
            .filter_map(|c| c.total_records)
            .collect();
        if known.is_empty() {
            None
        } else {
            Some(known.iter().sum())
        }
    }

    /// Records handled per second, once any work has been observed.
    pub fn processing_rate(&self) -> Option<f64> {
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed > 0.0 && self.processed_records > 0 {
            Some(self.processed_records as f64 / elapsed)
        } else {
            None
        }
    }

    /// Estimated milliseconds to completion, when a rate and remaining
    /// records are both known.
    pub fn eta_ms(&self) -> Option<u64> {
        let rate = self.processing_rate()?;
        let remaining = self
            .total_records()?
            .saturating_sub(self.processed_records);
        if rate > 0.0 && remaining > 0 {
            Some((remaining as f64 / rate * 1000.0) as u64)
        } else {
            None
        }
    }

    /// Payload published on the progress channel.
    pub fn to_event_payload(&self) -> serde_json::Value {
        let mut payload = match serde_json::to_value(self) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Failed to serialize progress state: {e}");
                serde_json::json!({})
            }
        };
        if let serde_json::Value::Object(map) = &mut payload {
            map.insert(
                "processing_rate".to_string(),
                serde_json::json!(self.processing_rate()),
            );
            map.insert("eta_ms".to_string(), serde_json::json!(self.eta_ms()));
        }
        payload
    }

    fn collection_mut(&mut self, name: &str) -> Option<&mut CollectionProgress> {
        self.collections.iter_mut().find(|c| c.name == name)
    }

    /// Recompute the completion percentage.
    ///
    /// Uses the record ratio once totals are known, falling back to the
    /// coarser collection ratio. Clamped so the published percentage never
    /// decreases within a run, even as newly counted collections grow the
    /// denominator.
    fn recompute_percentage(&mut self) {
        let candidate = match self.total_records() {
            Some(total) if total > 0 => {
                (self.processed_records as f64 / total as f64) * 100.0
            }
            _ => {
                if self.collections.is_empty() {
                    0.0
                } else {
                    let done = self
                        .collections
                        .iter()
                        .filter(|c| c.status == CollectionStatus::Completed)
                        .count();
                    (done as f64 / self.collections.len() as f64) * 100.0
                }
            }
        };
        self.percentage = self.percentage.max(candidate.min(100.0));
    }
}

/// Where a progress event is routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressTarget {
    /// Routed to one user's listeners
    User(i64),
    /// Broadcast to all listeners
    Broadcast,
}

/// Fire-and-forget progress publication.
#[async_trait]
pub trait ProgressChannel: Send + Sync {
    /// Publish one event. Errors are captured by the caller and logged,
    /// never propagated into the import path.
    async fn publish(
        &self,
        target: ProgressTarget,
        event: &str,
        payload: serde_json::Value,
    ) -> anyhow::Result<()>;
}

/// One published progress event.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub target: ProgressTarget,
    pub event: String,
    pub payload: serde_json::Value,
}

/// In-process broadcast channel; the delivery layer (websockets etc.)
/// subscribes and forwards.
pub struct BroadcastProgressChannel {
    sender: broadcast::Sender<ProgressEvent>,
}

impl BroadcastProgressChannel {
    /// Create a channel retaining up to `capacity` undelivered events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to published events.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl ProgressChannel for BroadcastProgressChannel {
    async fn publish(
        &self,
        target: ProgressTarget,
        event: &str,
        payload: serde_json::Value,
    ) -> anyhow::Result<()> {
        // A send error only means nobody is subscribed right now.
        let _ = self.sender.send(ProgressEvent {
            target,
            event: event.to_string(),
            payload,
        });
        Ok(())
    }
}

/// Throttled emitter bound to one run.
///
/// Emits on every collection-boundary transition and, inside a batch loop,
/// only after [`RECORDS_PER_EMIT`] newly processed records, bounding event
/// volume on large imports.
pub struct ProgressReporter {
    channel: Arc<dyn ProgressChannel>,
    last_emitted_records: u64,
}

impl ProgressReporter {
    /// Create a reporter publishing on `channel`.
    pub fn new(channel: Arc<dyn ProgressChannel>) -> Self {
        Self {
            channel,
            last_emitted_records: 0,
        }
    }

    /// Publish the current state unconditionally.
    pub async fn emit(&mut self, progress: &ImportProgress) {
        self.last_emitted_records = progress.processed_records;
        let target = match progress.user_id {
            Some(user_id) => ProgressTarget::User(user_id),
            None => ProgressTarget::Broadcast,
        };
        if let Err(e) = self
            .channel
            .publish(target, PROGRESS_EVENT, progress.to_event_payload())
            .await
        {
            tracing::warn!("Failed to publish import progress: {e}");
        }
    }

    /// Publish only when enough records have accumulated since the last
    /// emission. Used inside the batch loop.
    pub async fn emit_throttled(&mut self, progress: &ImportProgress) {
        if progress
            .processed_records
            .saturating_sub(self.last_emitted_records)
            >= RECORDS_PER_EMIT
        {
            self.emit(progress).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_uses_record_ratio_when_totals_known() {
        let mut p = ImportProgress::new(1, None);
        p.register_collection("orders");
        p.start_collection("orders");
        p.set_collection_total("orders", 200);
        p.record_batch("orders", 50, 0);
        assert!((p.percentage - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_percentage_falls_back_to_collection_ratio() {
        let mut p = ImportProgress::new(1, None);
        p.register_collection("a");
        p.register_collection("b");
        p.complete_collection("a");
        assert!((p.percentage - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_percentage_is_monotonic() {
        let mut p = ImportProgress::new(1, None);
        p.register_collection("a");
        p.register_collection("b");
        p.start_collection("a");
        p.set_collection_total("a", 100);
        p.record_batch("a", 100, 0);
        let before = p.percentage;

        // Counting a much larger second collection grows the denominator,
        // but the published percentage must not move backwards.
        p.set_collection_total("b", 1_000_000);
        assert!(p.percentage >= before);
    }

    #[test]
    fn test_percentage_is_exactly_100_at_completion() {
        let mut p = ImportProgress::new(1, None);
        p.register_collection("a");
        p.set_collection_total("a", 3);
        p.record_batch("a", 3, 0);
        p.complete_collection("a");
        p.complete_run();
        assert_eq!(p.percentage, 100.0);
        assert_eq!(p.status, RunStatus::Completed);
    }

    #[test]
    fn test_eta_requires_rate_and_remaining_records() {
        let p = ImportProgress::new(1, None);
        assert!(p.eta_ms().is_none());

        let mut p = ImportProgress::new(1, None);
        p.register_collection("a");
        p.set_collection_total("a", 10);
        p.record_batch("a", 10, 0);
        // Nothing remains, so no ETA even though a rate exists.
        assert!(p.eta_ms().is_none());
    }

    #[test]
    fn test_record_batch_counts_failures_as_processed() {
        let mut p = ImportProgress::new(1, None);
        p.register_collection("a");
        p.set_collection_total("a", 10);
        p.record_batch("a", 7, 3);
        assert_eq!(p.processed_records, 10);
        assert_eq!(p.failed_records, 3);
    }

    #[test]
    fn test_event_payload_carries_rate_and_eta_fields() {
        let p = ImportProgress::new(9, Some(4));
        let payload = p.to_event_payload();
        assert_eq!(payload["data_source_id"], 9);
        assert_eq!(payload["user_id"], 4);
        assert!(payload.get("processing_rate").is_some());
        assert!(payload.get("eta_ms").is_some());
    }

    #[tokio::test]
    async fn test_broadcast_channel_delivers_to_subscribers() {
        let channel = BroadcastProgressChannel::new(8);
        let mut rx = channel.subscribe();
        channel
            .publish(ProgressTarget::Broadcast, PROGRESS_EVENT, serde_json::json!({"x": 1}))
            .await
            .unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event, PROGRESS_EVENT);
        assert_eq!(event.payload["x"], 1);
    }

    #[tokio::test]
    async fn test_broadcast_channel_without_subscribers_is_ok() {
        let channel = BroadcastProgressChannel::new(8);
        assert!(channel
            .publish(ProgressTarget::Broadcast, PROGRESS_EVENT, serde_json::json!({}))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_reporter_swallows_channel_failures() {
        struct FailingChannel;

        #[async_trait]
        impl ProgressChannel for FailingChannel {
            async fn publish(
                &self,
                _target: ProgressTarget,
                _event: &str,
                _payload: serde_json::Value,
            ) -> anyhow::Result<()> {
                Err(anyhow::anyhow!("channel down"))
            }
        }

        let mut reporter = ProgressReporter::new(Arc::new(FailingChannel));
        let progress = ImportProgress::new(1, None);
        // Must not panic or propagate.
        reporter.emit(&progress).await;
    }

    #[tokio::test]
    async fn test_reporter_throttles_inside_batch_loop() {
        let channel = Arc::new(BroadcastProgressChannel::new(64));
        let mut rx = channel.subscribe();
        let mut reporter = ProgressReporter::new(channel.clone());

        let mut p = ImportProgress::new(1, None);
        p.register_collection("a");
        p.set_collection_total("a", 100_000);

        p.record_batch("a", 1_000, 0);
        reporter.emit_throttled(&p).await;
        assert!(rx.try_recv().is_err());

        p.record_batch("a", 6_000, 0);
        reporter.emit_throttled(&p).await;
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_reporter_routes_to_owning_user() {
        let channel = Arc::new(BroadcastProgressChannel::new(8));
        let mut rx = channel.subscribe();
        let mut reporter = ProgressReporter::new(channel.clone());

        let owned = ImportProgress::new(1, Some(42));
        reporter.emit(&owned).await;
        assert_eq!(rx.recv().await.unwrap().target, ProgressTarget::User(42));

        let unowned = ImportProgress::new(1, None);
        reporter.emit(&unowned).await;
        assert_eq!(rx.recv().await.unwrap().target, ProgressTarget::Broadcast);
    }
}
