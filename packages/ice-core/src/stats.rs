//! Update statistics (C8, spec.md §4.5 "Statistics").
//!
//! A rolling window of the most recent update durations backs percentile and
//! throughput reporting, guarded by `parking_lot::Mutex` since the updater may be
//! driven from multiple tasks concurrently.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;

const WINDOW_CAP: usize = 1000;
const WINDOW_TRIM_TO: usize = 500;

#[derive(Debug, Default)]
struct Inner {
    total_updates: u64,
    successful_updates: u64,
    failed_updates: u64,
    total_processed_files: u64,
    cache_hits: u64,
    cache_checks: u64,
    durations: VecDeque<Duration>,
}

#[derive(Debug, Clone, Default)]
pub struct StatsSnapshot {
    pub total_updates: u64,
    pub successful_updates: u64,
    pub failed_updates: u64,
    pub total_processed_files: u64,
    pub average_update_time: Duration,
    pub cache_hit_rate: f64,
    pub p50: Duration,
    pub p95: Duration,
    pub p99: Duration,
    pub throughput_updates_per_sec: f64,
    pub files_per_sec: f64,
}

#[derive(Default)]
pub struct UpdateStats {
    inner: Mutex<Inner>,
}

impl UpdateStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_update(
        &self,
        success: bool,
        processed_files: usize,
        cache_hit: bool,
        duration: Duration,
    ) {
        let mut inner = self.inner.lock();
        inner.total_updates += 1;
        if success {
            inner.successful_updates += 1;
        } else {
            inner.failed_updates += 1;
        }
        inner.total_processed_files += processed_files as u64;
        inner.cache_checks += 1;
        if cache_hit {
            inner.cache_hits += 1;
        }

        inner.durations.push_back(duration);
        if inner.durations.len() > WINDOW_CAP {
            while inner.durations.len() > WINDOW_TRIM_TO {
                inner.durations.pop_front();
            }
        }
    }

    pub fn clear(&self) {
        *self.inner.lock() = Inner::default();
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let inner = self.inner.lock();
        let mut sorted: Vec<Duration> = inner.durations.iter().copied().collect();
        sorted.sort();

        let average_update_time = if sorted.is_empty() {
            Duration::ZERO
        } else {
            sorted.iter().sum::<Duration>() / sorted.len() as u32
        };

        let percentile = |p: f64| -> Duration {
            if sorted.is_empty() {
                return Duration::ZERO;
            }
            let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
            sorted[idx.min(sorted.len() - 1)]
        };

        let cache_hit_rate = if inner.cache_checks == 0 {
            0.0
        } else {
            inner.cache_hits as f64 / inner.cache_checks as f64
        };

        let throughput_updates_per_sec = if average_update_time.as_secs_f64() == 0.0 {
            0.0
        } else {
            1.0 / average_update_time.as_secs_f64()
        };

        let total_time: Duration = sorted.iter().sum();
        let files_per_sec = if total_time.as_secs_f64() == 0.0 {
            0.0
        } else {
            inner.total_processed_files as f64 / total_time.as_secs_f64()
        };

        StatsSnapshot {
            total_updates: inner.total_updates,
            successful_updates: inner.successful_updates,
            failed_updates: inner.failed_updates,
            total_processed_files: inner.total_processed_files,
            average_update_time,
            cache_hit_rate,
            p50: percentile(0.50),
            p95: percentile(0.95),
            p99: percentile(0.99),
            throughput_updates_per_sec,
            files_per_sec,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_success_and_failure_counts() {
        let stats = UpdateStats::new();
        stats.record_update(true, 2, true, Duration::from_millis(10));
        stats.record_update(false, 0, false, Duration::from_millis(20));

        let snap = stats.snapshot();
        assert_eq!(snap.total_updates, 2);
        assert_eq!(snap.successful_updates, 1);
        assert_eq!(snap.failed_updates, 1);
        assert_eq!(snap.total_processed_files, 2);
        assert_eq!(snap.cache_hit_rate, 0.5);
    }

    #[test]
    fn window_trims_to_500_once_it_exceeds_1000() {
        let stats = UpdateStats::new();
        for _ in 0..1001 {
            stats.record_update(true, 1, false, Duration::from_millis(1));
        }
        assert_eq!(stats.inner.lock().durations.len(), WINDOW_TRIM_TO);
    }

    #[test]
    fn clear_resets_everything() {
        let stats = UpdateStats::new();
        stats.record_update(true, 1, true, Duration::from_millis(5));
        stats.clear();
        let snap = stats.snapshot();
        assert_eq!(snap.total_updates, 0);
        assert_eq!(snap.average_update_time, Duration::ZERO);
    }
}
