use serde::Serialize;
use std::sync::Mutex;

/// Counters for one tour session.
pub struct MetricsRecorder {
    inner: Mutex<MetricsSnapshot>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub arrivals: usize,
    pub route_computations: usize,
    pub route_failures: usize,
    pub poll_cycles: usize,
    pub poll_failures: usize,
    pub follow_ups: usize,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsSnapshot::default()),
        }
    }

    fn update(&self, apply: impl FnOnce(&mut MetricsSnapshot)) {
        if let Ok(mut metrics) = self.inner.lock() {
            apply(&mut metrics);
        }
    }

    pub fn record_arrival(&self) {
        self.update(|m| m.arrivals += 1);
    }

    pub fn record_route(&self, succeeded: bool) {
        self.update(|m| {
            m.route_computations += 1;
            if !succeeded {
                m.route_failures += 1;
            }
        });
    }

    pub fn record_poll(&self, succeeded: bool) {
        self.update(|m| {
            m.poll_cycles += 1;
            if !succeeded {
                m.poll_failures += 1;
            }
        });
    }

    pub fn record_follow_up(&self) {
        self.update(|m| m.follow_ups += 1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().map(|m| *m).unwrap_or_default()
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_also_count_as_attempts() {
        let metrics = MetricsRecorder::new();
        metrics.record_route(true);
        metrics.record_route(false);
        metrics.record_poll(false);
        metrics.record_arrival();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.route_computations, 2);
        assert_eq!(snapshot.route_failures, 1);
        assert_eq!(snapshot.poll_cycles, 1);
        assert_eq!(snapshot.poll_failures, 1);
        assert_eq!(snapshot.arrivals, 1);
    }
}
