// MIT License - Copyright (c) 2026 The codeless-dsps developers
// CodeLess / DSPS protocol engine

use std::time::{Duration, Instant};

/// One throughput sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSample {
    pub bytes: u64,
    /// Bytes per second since the previous sample.
    pub current_speed: u64,
    /// Bytes per second since the operation started.
    pub average_speed: u64,
}

/// Byte counters and timestamps of a transfer.
#[derive(Debug, Clone, Default)]
pub struct TransferStats {
    start: Option<Instant>,
    end: Option<Instant>,
    bytes: u64,
    interval_bytes: u64,
    last_sample: Option<Instant>,
}

fn speed(bytes: u64, elapsed: Duration) -> u64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        0
    } else {
        (bytes as f64 / secs) as u64
    }
}

impl TransferStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin (or resume) counting. The original start time is kept.
    pub fn start(&mut self, now: Instant) {
        self.start.get_or_insert(now);
        self.end = None;
        self.last_sample = Some(now);
        self.interval_bytes = 0;
    }

    pub fn stop(&mut self, now: Instant) {
        if self.start.is_some() {
            self.end = Some(now);
        }
    }

    pub fn record(&mut self, bytes: u64) {
        self.bytes += bytes;
        self.interval_bytes += bytes;
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn start_time(&self) -> Option<Instant> {
        self.start
    }

    pub fn end_time(&self) -> Option<Instant> {
        self.end
    }

    pub fn is_running(&self) -> bool {
        self.start.is_some() && self.end.is_none()
    }

    /// Average over the whole operation, up to its end or `now`.
    pub fn average_speed(&self, now: Instant) -> u64 {
        match self.start {
            Some(start) => speed(self.bytes, self.end.unwrap_or(now).saturating_duration_since(start)),
            None => 0,
        }
    }

    /// Produce a sample once `interval` has elapsed since the previous one.
    pub fn sample(&mut self, now: Instant, interval: Duration) -> Option<StatsSample> {
        if !self.is_running() {
            return None;
        }
        let last = *self.last_sample.get_or_insert(now);
        let elapsed = now.saturating_duration_since(last);
        if elapsed < interval || elapsed.is_zero() {
            return None;
        }
        let sample = StatsSample {
            bytes: self.bytes,
            current_speed: speed(self.interval_bytes, elapsed),
            average_speed: self.average_speed(now),
        };
        self.interval_bytes = 0;
        self.last_sample = Some(now);
        Some(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_every_interval() {
        let t0 = Instant::now();
        let mut stats = TransferStats::new();
        stats.start(t0);
        stats.record(500);
        let interval = Duration::from_secs(1);
        assert_eq!(stats.sample(t0 + Duration::from_millis(500), interval), None);

        let sample = stats.sample(t0 + interval, interval).unwrap();
        assert_eq!(sample.bytes, 500);
        assert_eq!(sample.current_speed, 500);

        stats.record(2000);
        let sample = stats.sample(t0 + 2 * interval, interval).unwrap();
        assert_eq!(sample.current_speed, 2000);
        assert_eq!(sample.average_speed, 1250);
    }

    #[test]
    fn test_stopped_stats_are_frozen() {
        let t0 = Instant::now();
        let mut stats = TransferStats::new();
        assert_eq!(stats.average_speed(t0), 0);
        stats.start(t0);
        stats.record(100);
        stats.stop(t0 + Duration::from_secs(2));
        assert!(!stats.is_running());
        assert_eq!(stats.average_speed(t0 + Duration::from_secs(10)), 50);
        assert_eq!(stats.sample(t0 + Duration::from_secs(10), Duration::from_secs(1)), None);
    }
}
