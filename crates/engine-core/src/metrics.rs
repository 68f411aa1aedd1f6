use chrono::{DateTime, Utc};
use model::core::anchor::BinlogAnchor;
use model::events::ChangeKind;
use serde::Serialize;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Where the process currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Initializing,
    FullLoad,
    CdcRunning,
    Error,
}

impl Status {
    fn from_u8(v: u8) -> Status {
        match v {
            1 => Status::FullLoad,
            2 => Status::CdcRunning,
            3 => Status::Error,
            _ => Status::Initializing,
        }
    }
}

#[derive(Debug)]
struct InnerMetrics {
    events_processed: AtomicU64,
    inserts: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
    rows_loaded: AtomicU64,
    error_count: AtomicU64,
    status: AtomicU8,
    start_time: DateTime<Utc>,
    last_event_time: Mutex<Option<DateTime<Utc>>>,
    last_checkpoint: Mutex<Option<BinlogAnchor>>,
    last_error: Mutex<Option<String>>,
}

/// Process-wide counters, shared by every component and read by the
/// external health endpoint. Numeric counters are atomic; the few string
/// fields sit behind a mutex. Passed explicitly, never a singleton.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<InnerMetrics>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub events_processed: u64,
    pub inserts: u64,
    pub updates: u64,
    pub deletes: u64,
    pub rows_loaded: u64,
    pub error_count: u64,
    pub status: Status,
    pub start_time: DateTime<Utc>,
    pub last_event_time: Option<DateTime<Utc>>,
    pub last_checkpoint: Option<String>,
    pub last_error: Option<String>,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            inner: Arc::new(InnerMetrics {
                events_processed: AtomicU64::new(0),
                inserts: AtomicU64::new(0),
                updates: AtomicU64::new(0),
                deletes: AtomicU64::new(0),
                rows_loaded: AtomicU64::new(0),
                error_count: AtomicU64::new(0),
                status: AtomicU8::new(0),
                start_time: Utc::now(),
                last_event_time: Mutex::new(None),
                last_checkpoint: Mutex::new(None),
                last_error: Mutex::new(None),
            }),
        }
    }

    pub fn record_event(&self, kind: ChangeKind) {
        self.inner.events_processed.fetch_add(1, Ordering::Relaxed);
        let counter = match kind {
            ChangeKind::Insert => &self.inner.inserts,
            ChangeKind::Update => &self.inner.updates,
            ChangeKind::Delete => &self.inner.deletes,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut at) = self.inner.last_event_time.lock() {
            *at = Some(Utc::now());
        }
    }

    pub fn add_rows_loaded(&self, count: u64) {
        self.inner.rows_loaded.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_error(&self, message: impl Into<String>) {
        self.inner.error_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.inner.last_error.lock() {
            *last = Some(message.into());
        }
    }

    pub fn record_checkpoint(&self, anchor: &BinlogAnchor) {
        if let Ok(mut last) = self.inner.last_checkpoint.lock() {
            *last = Some(anchor.clone());
        }
    }

    pub fn set_status(&self, status: Status) {
        self.inner.status.store(status as u8, Ordering::Relaxed);
    }

    pub fn status(&self) -> Status {
        Status::from_u8(self.inner.status.load(Ordering::Relaxed))
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_processed: self.inner.events_processed.load(Ordering::Relaxed),
            inserts: self.inner.inserts.load(Ordering::Relaxed),
            updates: self.inner.updates.load(Ordering::Relaxed),
            deletes: self.inner.deletes.load(Ordering::Relaxed),
            rows_loaded: self.inner.rows_loaded.load(Ordering::Relaxed),
            error_count: self.inner.error_count.load(Ordering::Relaxed),
            status: self.status(),
            start_time: self.inner.start_time,
            last_event_time: self
                .inner
                .last_event_time
                .lock()
                .map(|g| *g)
                .unwrap_or(None),
            last_checkpoint: self
                .inner
                .last_checkpoint
                .lock()
                .map(|g| g.as_ref().map(ToString::to_string))
                .unwrap_or(None),
            last_error: self
                .inner
                .last_error
                .lock()
                .map(|g| g.clone())
                .unwrap_or(None),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_per_kind() {
        let metrics = Metrics::new();
        metrics.record_event(ChangeKind::Insert);
        metrics.record_event(ChangeKind::Insert);
        metrics.record_event(ChangeKind::Update);
        metrics.record_event(ChangeKind::Delete);

        let snap = metrics.snapshot();
        assert_eq!(snap.events_processed, 4);
        assert_eq!(snap.inserts, 2);
        assert_eq!(snap.updates, 1);
        assert_eq!(snap.deletes, 1);
        assert!(snap.last_event_time.is_some());
    }

    #[test]
    fn status_transitions_are_visible() {
        let metrics = Metrics::new();
        assert_eq!(metrics.status(), Status::Initializing);
        metrics.set_status(Status::FullLoad);
        assert_eq!(metrics.status(), Status::FullLoad);
        metrics.set_status(Status::CdcRunning);
        assert_eq!(metrics.snapshot().status, Status::CdcRunning);
    }

    #[test]
    fn errors_keep_the_latest_message() {
        let metrics = Metrics::new();
        metrics.record_error("first");
        metrics.record_error("second");
        let snap = metrics.snapshot();
        assert_eq!(snap.error_count, 2);
        assert_eq!(snap.last_error.as_deref(), Some("second"));
    }

    #[test]
    fn checkpoint_is_exported_as_display_string() {
        let metrics = Metrics::new();
        metrics.record_checkpoint(&BinlogAnchor::new("mysql-bin.000002", 99));
        assert_eq!(
            metrics.snapshot().last_checkpoint.as_deref(),
            Some("mysql-bin.000002:99")
        );
    }

    #[test]
    fn snapshot_serializes_for_the_health_reader() {
        let metrics = Metrics::new();
        metrics.set_status(Status::CdcRunning);
        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["status"], "cdc_running");
        assert_eq!(json["events_processed"], 0);
    }
}
