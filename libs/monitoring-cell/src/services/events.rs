// =====================================================================================
// MONITORING EVENT LOG
// =====================================================================================

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use chrono::Utc;
use tokio::sync::RwLock;

use crate::models::{EventKind, EventLevel, MonitoringEvent};

/// Bounded in-memory log of notable monitoring events, newest last.
#[derive(Debug)]
pub struct EventLog {
    events: RwLock<VecDeque<MonitoringEvent>>,
    next_seq: AtomicU64,
    capacity: AtomicUsize,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            next_seq: AtomicU64::new(1),
            capacity: AtomicUsize::new(capacity.max(1)),
        }
    }

    pub async fn record(&self, level: EventLevel, kind: EventKind, message: impl Into<String>) -> u64 {
        let mut events = self.events.write().await;
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        events.push_back(MonitoringEvent {
            seq,
            timestamp: Utc::now(),
            level,
            kind,
            message: message.into(),
        });
        let capacity = self.capacity.load(Ordering::Relaxed);
        while events.len() > capacity {
            events.pop_front();
        }
        seq
    }

    /// The newest `limit` events, oldest first.
    pub async fn recent(&self, limit: usize) -> Vec<MonitoringEvent> {
        let events = self.events.read().await;
        let skip = events.len().saturating_sub(limit);
        events.iter().skip(skip).cloned().collect()
    }

    /// Events with a sequence number greater than `seq`, for follow mode.
    pub async fn after(&self, seq: u64, limit: usize) -> Vec<MonitoringEvent> {
        let events = self.events.read().await;
        events.iter().filter(|e| e.seq > seq).take(limit).cloned().collect()
    }

    pub async fn set_capacity(&self, capacity: usize) {
        let capacity = capacity.max(1);
        self.capacity.store(capacity, Ordering::Relaxed);
        let mut events = self.events.write().await;
        while events.len() > capacity {
            events.pop_front();
        }
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keeps_newest_events_within_capacity() {
        let log = EventLog::new(3);
        for i in 0..5 {
            log.record(EventLevel::Info, EventKind::Tick, format!("tick {}", i)).await;
        }
        let recent = log.recent(10).await;
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].message, "tick 2");
        assert_eq!(recent[2].seq, 5);

        let followed = log.after(4, 10).await;
        assert_eq!(followed.len(), 1);
        assert_eq!(followed[0].message, "tick 4");

        log.set_capacity(1).await;
        assert_eq!(log.len().await, 1);
    }
}
