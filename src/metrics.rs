//! Process-wide counters exposed at `/api/metrics`.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    pub connections_accepted: AtomicU64,
    pub connections_active: AtomicU64,
    pub commands_handled: AtomicU64,
    pub pushes_sent: AtomicU64,
    pub pushes_dropped: AtomicU64,
    pub sweeps: AtomicU64,
    pub rooms_expired: AtomicU64,
    pub auto_submits: AtomicU64,
    /// Sweeper store writes that failed; nothing else reports these
    pub sweeper_failures: AtomicU64,
    pub storage_errors: AtomicU64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_accepted: u64,
    pub connections_active: u64,
    pub commands_handled: u64,
    pub pushes_sent: u64,
    pub pushes_dropped: u64,
    pub sweeps: u64,
    pub rooms_expired: u64,
    pub auto_submits: u64,
    pub sweeper_failures: u64,
    pub storage_errors: u64,
}

impl Metrics {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn decr(counter: &AtomicU64) {
        // Saturating: a stray double-decrement must not wrap
        let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
            Some(v.saturating_sub(1))
        });
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            connections_accepted: get(&self.connections_accepted),
            connections_active: get(&self.connections_active),
            commands_handled: get(&self.commands_handled),
            pushes_sent: get(&self.pushes_sent),
            pushes_dropped: get(&self.pushes_dropped),
            sweeps: get(&self.sweeps),
            rooms_expired: get(&self.rooms_expired),
            auto_submits: get(&self.auto_submits),
            sweeper_failures: get(&self.sweeper_failures),
            storage_errors: get(&self.storage_errors),
        }
    }
}
