//! Cycle timing and outcome counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Counters updated by the scheduler after every cycle.
#[derive(Debug)]
pub struct CycleStats {
    /// Start time for uptime calculation.
    start_time: Instant,
    cycles_total: AtomicU64,
    cycles_ok: AtomicU64,
    cycles_failed: AtomicU64,
    /// Tick slots that passed while a cycle overran.
    ticks_skipped: AtomicU64,
    reconnect_attempts: AtomicU64,
    points_dispatched: AtomicU64,
    last_cycle_us: AtomicU64,
    max_cycle_us: AtomicU64,
    /// Lateness of the last tick relative to its schedule.
    last_drift_us: AtomicU64,
}

/// Serializable view of [`CycleStats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubStats {
    pub uptime_secs: u64,
    pub cycles_total: u64,
    pub cycles_ok: u64,
    pub cycles_failed: u64,
    pub ticks_skipped: u64,
    pub reconnect_attempts: u64,
    pub points_dispatched: u64,
    pub last_cycle_us: u64,
    pub max_cycle_us: u64,
    pub last_drift_us: u64,
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            cycles_total: AtomicU64::new(0),
            cycles_ok: AtomicU64::new(0),
            cycles_failed: AtomicU64::new(0),
            ticks_skipped: AtomicU64::new(0),
            reconnect_attempts: AtomicU64::new(0),
            points_dispatched: AtomicU64::new(0),
            last_cycle_us: AtomicU64::new(0),
            max_cycle_us: AtomicU64::new(0),
            last_drift_us: AtomicU64::new(0),
        }
    }

    /// Record how late a tick fired. Whole periods of lateness count as
    /// skipped ticks.
    pub fn record_tick(&self, drift: Duration, period: Duration) {
        self.last_drift_us
            .store(drift.as_micros() as u64, Ordering::Relaxed);

        if !period.is_zero() {
            let skipped = (drift.as_nanos() / period.as_nanos()) as u64;
            if skipped > 0 {
                self.ticks_skipped.fetch_add(skipped, Ordering::Relaxed);
            }
        }
    }

    /// Record a successful cycle.
    pub fn record_success(&self, duration: Duration, dispatched: usize) {
        self.cycles_total.fetch_add(1, Ordering::Relaxed);
        self.cycles_ok.fetch_add(1, Ordering::Relaxed);
        self.points_dispatched
            .fetch_add(dispatched as u64, Ordering::Relaxed);
        self.record_duration(duration);
    }

    /// Record a failed cycle.
    pub fn record_failure(&self, duration: Duration) {
        self.cycles_total.fetch_add(1, Ordering::Relaxed);
        self.cycles_failed.fetch_add(1, Ordering::Relaxed);
        self.record_duration(duration);
    }

    pub fn record_reconnect_attempt(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    fn record_duration(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.last_cycle_us.store(us, Ordering::Relaxed);
        self.max_cycle_us.fetch_max(us, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HubStats {
        HubStats {
            uptime_secs: self.start_time.elapsed().as_secs(),
            cycles_total: self.cycles_total.load(Ordering::Relaxed),
            cycles_ok: self.cycles_ok.load(Ordering::Relaxed),
            cycles_failed: self.cycles_failed.load(Ordering::Relaxed),
            ticks_skipped: self.ticks_skipped.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            points_dispatched: self.points_dispatched.load(Ordering::Relaxed),
            last_cycle_us: self.last_cycle_us.load(Ordering::Relaxed),
            max_cycle_us: self.max_cycle_us.load(Ordering::Relaxed),
            last_drift_us: self.last_drift_us.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_counters() {
        let stats = CycleStats::new();
        stats.record_success(Duration::from_micros(300), 4);
        stats.record_failure(Duration::from_micros(900));
        stats.record_success(Duration::from_micros(200), 0);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.cycles_total, 3);
        assert_eq!(snapshot.cycles_ok, 2);
        assert_eq!(snapshot.cycles_failed, 1);
        assert_eq!(snapshot.points_dispatched, 4);
        assert_eq!(snapshot.last_cycle_us, 200);
        assert_eq!(snapshot.max_cycle_us, 900);
    }

    #[test]
    fn test_skipped_ticks_from_drift() {
        let stats = CycleStats::new();
        let period = Duration::from_millis(5);

        stats.record_tick(Duration::from_millis(2), period);
        assert_eq!(stats.snapshot().ticks_skipped, 0);

        stats.record_tick(Duration::from_millis(12), period);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.ticks_skipped, 2);
        assert_eq!(snapshot.last_drift_us, 12_000);
    }
}
