//! Counter and status store
//!
//! Atomic counters mirrored to the `metrics` facade, the latest position of
//! each vehicle, the most recent error, and a bounded debug log that readers
//! drain.

use chrono::{DateTime, Utc};
use mavtak_core::VehicleId;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

/// Entries kept in the debug log before the oldest is evicted
pub const DEBUG_LOG_CAPACITY: usize = 100;

/// Latest valid position of a vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehiclePosition {
    pub vehicle_id: VehicleId,
    pub uid: String,
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
    pub heading: f64,
    pub speed: f64,
    pub updated_at: DateTime<Utc>,
}

/// Most recent error text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// One line of the debug log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// Counter values at one instant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub messages_received: u64,
    pub messages_sent: u64,
    pub malformed_dropped: u64,
    pub send_errors: u64,
    pub ignored_messages: u64,
    pub invalid_fixes: u64,
    pub encode_errors: u64,
    pub events_emitted: u64,
}

/// Owned view of the status store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
    pub counters: Counters,
    pub last_error: Option<ErrorRecord>,
    pub positions: Vec<VehiclePosition>,
}

/// Shared, concurrency-safe status
#[derive(Debug)]
pub struct StatusStore {
    messages_received: AtomicU64,
    messages_sent: AtomicU64,
    malformed_dropped: AtomicU64,
    send_errors: AtomicU64,
    ignored_messages: AtomicU64,
    invalid_fixes: AtomicU64,
    encode_errors: AtomicU64,
    events_emitted: AtomicU64,
    running: AtomicBool,
    started_at: DateTime<Utc>,
    start_instant: Instant,
    positions: RwLock<BTreeMap<VehicleId, VehiclePosition>>,
    last_error: RwLock<Option<ErrorRecord>>,
    debug_log: Mutex<VecDeque<LogEntry>>,
}

impl StatusStore {
    pub fn new() -> Self {
        describe_counter!(
            "mavtak_messages_received_total",
            "MAVLink messages decoded from the supported subset"
        );
        describe_counter!(
            "mavtak_messages_sent_total",
            "CoT datagrams delivered, counted per destination"
        );
        describe_counter!(
            "mavtak_malformed_dropped_total",
            "Datagrams truncated by a malformed MAVLink frame"
        );
        describe_counter!("mavtak_send_errors_total", "Failed CoT sends");
        describe_counter!(
            "mavtak_ignored_messages_total",
            "Valid frames with unsupported message ids"
        );
        describe_counter!(
            "mavtak_invalid_fixes_total",
            "Telemetry updates rejected by the range check"
        );
        describe_counter!("mavtak_encode_errors_total", "Vehicles that could not be encoded");
        describe_counter!("mavtak_events_emitted_total", "CoT events built and dispatched");
        describe_gauge!("mavtak_tracked_vehicles", "Vehicles with an emitted position");

        Self {
            messages_received: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            malformed_dropped: AtomicU64::new(0),
            send_errors: AtomicU64::new(0),
            ignored_messages: AtomicU64::new(0),
            invalid_fixes: AtomicU64::new(0),
            encode_errors: AtomicU64::new(0),
            events_emitted: AtomicU64::new(0),
            running: AtomicBool::new(false),
            started_at: Utc::now(),
            start_instant: Instant::now(),
            positions: RwLock::new(BTreeMap::new()),
            last_error: RwLock::new(None),
            debug_log: Mutex::new(VecDeque::with_capacity(DEBUG_LOG_CAPACITY)),
        }
    }

    pub fn record_message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        counter!("mavtak_messages_received_total").increment(1);
    }

    pub fn record_message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        counter!("mavtak_messages_sent_total").increment(1);
    }

    pub fn record_ignored(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.ignored_messages.fetch_add(count, Ordering::Relaxed);
        counter!("mavtak_ignored_messages_total").increment(count);
    }

    pub fn record_event_emitted(&self) {
        self.events_emitted.fetch_add(1, Ordering::Relaxed);
        counter!("mavtak_events_emitted_total").increment(1);
    }

    pub fn record_malformed(&self, reason: &str) {
        self.malformed_dropped.fetch_add(1, Ordering::Relaxed);
        counter!("mavtak_malformed_dropped_total").increment(1);
        self.log(LogLevel::Warn, format!("Dropped malformed datagram: {reason}"));
    }

    pub fn record_send_error(&self, destination: &str, reason: &str) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
        counter!("mavtak_send_errors_total").increment(1);
        self.record_error(format!("Error sending CoT to {destination}: {reason}"));
    }

    pub fn record_invalid_fix(&self, vehicle_id: VehicleId, reason: &str) {
        self.invalid_fixes.fetch_add(1, Ordering::Relaxed);
        counter!("mavtak_invalid_fixes_total").increment(1);
        self.record_error(format!("Invalid data from vehicle {vehicle_id}: {reason}"));
    }

    pub fn record_encode_error(&self, reason: &str) {
        self.encode_errors.fetch_add(1, Ordering::Relaxed);
        counter!("mavtak_encode_errors_total").increment(1);
        self.record_error(format!("Error building CoT event: {reason}"));
    }

    /// Sets the last error and appends it to the debug log
    pub fn record_error(&self, message: String) {
        let at = Utc::now();
        *self.last_error.write() = Some(ErrorRecord {
            message: message.clone(),
            at,
        });
        self.push_log(LogEntry {
            at,
            level: LogLevel::Error,
            message,
        });
    }

    pub fn update_position(&self, position: VehiclePosition) {
        let mut positions = self.positions.write();
        positions.insert(position.vehicle_id, position);
        gauge!("mavtak_tracked_vehicles").set(positions.len() as f64);
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.push_log(LogEntry {
            at: Utc::now(),
            level,
            message: message.into(),
        });
    }

    fn push_log(&self, entry: LogEntry) {
        let mut log = self.debug_log.lock();
        if log.len() == DEBUG_LOG_CAPACITY {
            log.pop_front();
        }
        log.push_back(entry);
    }

    /// Removes and returns every buffered log entry, oldest first
    pub fn drain_log(&self) -> Vec<LogEntry> {
        self.debug_log.lock().drain(..).collect()
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn counters(&self) -> Counters {
        Counters {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            malformed_dropped: self.malformed_dropped.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            ignored_messages: self.ignored_messages.load(Ordering::Relaxed),
            invalid_fixes: self.invalid_fixes.load(Ordering::Relaxed),
            encode_errors: self.encode_errors.load(Ordering::Relaxed),
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
        }
    }

    pub fn last_error(&self) -> Option<ErrorRecord> {
        self.last_error.read().clone()
    }

    pub fn position(&self, vehicle_id: VehicleId) -> Option<VehiclePosition> {
        self.positions.read().get(&vehicle_id).cloned()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            running: self.is_running(),
            started_at: self.started_at,
            uptime_secs: self.start_instant.elapsed().as_secs(),
            counters: self.counters(),
            last_error: self.last_error(),
            positions: self.positions.read().values().cloned().collect(),
        }
    }
}

impl Default for StatusStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(id: VehicleId) -> VehiclePosition {
        VehiclePosition {
            vehicle_id: id,
            uid: format!("DEFAULT_UAV-{id}"),
            lat: 47.3977418,
            lon: 8.5455938,
            alt: 500.0,
            heading: 0.0,
            speed: 0.0,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_counters() {
        let status = StatusStore::new();
        status.record_message_received();
        status.record_message_received();
        status.record_message_sent();
        status.record_ignored(3);
        status.record_ignored(0);
        status.record_malformed("Invalid start marker 0x55");
        status.record_event_emitted();

        let counters = status.counters();
        assert_eq!(counters.messages_received, 2);
        assert_eq!(counters.messages_sent, 1);
        assert_eq!(counters.ignored_messages, 3);
        assert_eq!(counters.malformed_dropped, 1);
        assert_eq!(counters.events_emitted, 1);
        assert_eq!(counters.send_errors, 0);
    }

    #[test]
    fn test_errors_update_last_error() {
        let status = StatusStore::new();
        assert!(status.last_error().is_none());

        status.record_send_error("primary (multicast 239.2.3.1:6969)", "network unreachable");
        let err = status.last_error().unwrap();
        assert!(err.message.contains("network unreachable"));
        assert_eq!(status.counters().send_errors, 1);

        status.record_invalid_fix(7, "latitude 91 outside [-90, 90]");
        assert!(status.last_error().unwrap().message.contains("vehicle 7"));
        assert_eq!(status.counters().invalid_fixes, 1);

        status.record_encode_error("non-finite hae");
        assert_eq!(status.counters().encode_errors, 1);
    }

    #[test]
    fn test_debug_log_is_bounded_and_drained() {
        let status = StatusStore::new();
        for i in 0..(DEBUG_LOG_CAPACITY + 5) {
            status.log(LogLevel::Info, format!("line {i}"));
        }

        let drained = status.drain_log();
        assert_eq!(drained.len(), DEBUG_LOG_CAPACITY);
        assert_eq!(drained[0].message, "line 5");
        assert_eq!(
            drained.last().map(|e| e.message.as_str()),
            Some(format!("line {}", DEBUG_LOG_CAPACITY + 4).as_str())
        );
        assert!(status.drain_log().is_empty());
    }

    #[test]
    fn test_snapshot() {
        let status = StatusStore::new();
        status.set_running(true);
        status.update_position(position(2));
        status.update_position(position(1));
        status.update_position(position(2));

        let snapshot = status.snapshot();
        assert!(snapshot.running);
        let ids: Vec<_> = snapshot.positions.iter().map(|p| p.vehicle_id).collect();
        assert_eq!(ids, [1, 2]);
        assert_eq!(status.position(2).unwrap().uid, "DEFAULT_UAV-2");

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"messages_received\":0"));
    }
}
