// Metrics module - Prometheus-compatible counters for watermark rendering
// Thread-safe via atomic operations

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of all counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub renders_started: u64,
    pub renders_succeeded: u64,
    pub renders_failed: u64,
    pub renders_timed_out: u64,
    pub renders_restarted: u64,
    pub renders_superseded: u64,
    pub reconfigurations: u64,
    pub scans: u64,
}

/// Counters for the orchestrator's render lifecycle
#[derive(Debug, Default)]
pub struct Metrics {
    renders_started: AtomicU64,
    renders_succeeded: AtomicU64,
    renders_failed: AtomicU64,
    // Advisory: a timed-out render may still succeed later
    renders_timed_out: AtomicU64,
    // Results discarded because options changed mid-flight
    renders_restarted: AtomicU64,
    // Results discarded because a newer run owns the image
    renders_superseded: AtomicU64,
    reconfigurations: AtomicU64,
    scans: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_started(&self) {
        self.renders_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_succeeded(&self) {
        self.renders_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failed(&self) {
        self.renders_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_timed_out(&self) {
        self.renders_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_restarted(&self) {
        self.renders_restarted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_superseded(&self) {
        self.renders_superseded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_reconfigurations(&self) {
        self.reconfigurations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_scans(&self) {
        self.scans.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            renders_started: self.renders_started.load(Ordering::Relaxed),
            renders_succeeded: self.renders_succeeded.load(Ordering::Relaxed),
            renders_failed: self.renders_failed.load(Ordering::Relaxed),
            renders_timed_out: self.renders_timed_out.load(Ordering::Relaxed),
            renders_restarted: self.renders_restarted.load(Ordering::Relaxed),
            renders_superseded: self.renders_superseded.load(Ordering::Relaxed),
            reconfigurations: self.reconfigurations.load(Ordering::Relaxed),
            scans: self.scans.load(Ordering::Relaxed),
        }
    }

    /// Export all counters in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let counters = [
            (
                "watermark_renders_started_total",
                "Renders dispatched to the renderer",
                snapshot.renders_started,
            ),
            (
                "watermark_renders_succeeded_total",
                "Renders whose result was applied",
                snapshot.renders_succeeded,
            ),
            (
                "watermark_renders_failed_total",
                "Renders that failed",
                snapshot.renders_failed,
            ),
            (
                "watermark_renders_timed_out_total",
                "Renders still running past the timeout budget",
                snapshot.renders_timed_out,
            ),
            (
                "watermark_renders_restarted_total",
                "Renders discarded and restarted after an options change",
                snapshot.renders_restarted,
            ),
            (
                "watermark_renders_superseded_total",
                "Renders discarded because a newer run owns the image",
                snapshot.renders_superseded,
            ),
            (
                "watermark_reconfigurations_total",
                "Options replacements",
                snapshot.reconfigurations,
            ),
            (
                "watermark_scans_total",
                "Container scans",
                snapshot.scans,
            ),
        ];

        let mut output = String::new();
        for (name, help, value) in counters {
            output.push_str(&format!("# HELP {} {}\n", name, help));
            output.push_str(&format!("# TYPE {} counter\n", name));
            output.push_str(&format!("{} {}\n", name, value));
        }
        output
    }
}
