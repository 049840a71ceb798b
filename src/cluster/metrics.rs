use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use sysinfo::System;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct RequestSample {
    at: Instant,
    duration: Duration,
    failed: bool,
}

/// Resource usage of the host, in percent
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SystemUsage {
    pub cpu_percent: f32,
    pub memory_percent: f32,
}

/// Per-instance load bookkeeping feeding the heartbeat: live viewer
/// connections, request outcomes over a sliding window, and host usage.
pub struct LoadTracker {
    window: Duration,
    samples: Mutex<VecDeque<RequestSample>>,
    connections: AtomicUsize,
    system: Mutex<System>,
}

impl LoadTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: Mutex::new(VecDeque::new()),
            connections: AtomicUsize::new(0),
            system: Mutex::new(System::new()),
        }
    }

    /// `failed` marks server-side failures only; rejected input is not an error here.
    pub async fn record(&self, duration: Duration, failed: bool) {
        let now = Instant::now();
        let mut samples = self.samples.lock().await;
        samples.push_back(RequestSample { at: now, duration, failed });
        Self::evict(&mut samples, now, self.window);
    }

    pub async fn error_rate(&self) -> f64 {
        let now = Instant::now();
        let mut samples = self.samples.lock().await;
        Self::evict(&mut samples, now, self.window);
        if samples.is_empty() {
            return 0.0;
        }
        let failed = samples.iter().filter(|sample| sample.failed).count();
        failed as f64 / samples.len() as f64
    }

    pub async fn avg_response_time_ms(&self) -> f64 {
        let now = Instant::now();
        let mut samples = self.samples.lock().await;
        Self::evict(&mut samples, now, self.window);
        if samples.is_empty() {
            return 0.0;
        }
        let total: f64 = samples
            .iter()
            .map(|sample| sample.duration.as_secs_f64() * 1000.0)
            .sum();
        total / samples.len() as f64
    }

    pub fn connection_opened(&self) {
        self.connections.fetch_add(1, Ordering::SeqCst);
    }

    pub fn connection_closed(&self) {
        let _ = self
            .connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| current.checked_sub(1));
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub async fn system_usage(&self) -> SystemUsage {
        let mut system = self.system.lock().await;
        system.refresh_cpu();
        system.refresh_memory();

        let total_memory = system.total_memory();
        let memory_percent = if total_memory == 0 {
            0.0
        } else {
            (system.used_memory() as f64 / total_memory as f64 * 100.0) as f32
        };

        SystemUsage {
            cpu_percent: system.global_cpu_info().cpu_usage(),
            memory_percent,
        }
    }

    fn evict(samples: &mut VecDeque<RequestSample>, now: Instant, window: Duration) {
        while samples
            .front()
            .is_some_and(|sample| now.duration_since(sample.at) > window)
        {
            samples.pop_front();
        }
    }
}
