//! Metrics and tracking for stream consumption

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Counters accumulated across every session sharing a tracker
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamMetrics {
    /// Raw body bytes read from transports
    pub bytes_received: u64,
    /// Complete frames produced by the framer
    pub frames: u64,
    /// `chunk` messages appended to the text
    pub chunks_applied: u64,
    /// Characters appended to the text
    pub chars_applied: u64,
    /// `status` messages seen
    pub status_messages: u64,
    /// Frames dropped because they could not be decoded
    pub decode_faults: u64,
    /// Frames dropped because their session had been superseded
    pub stale_frames: u64,
    pub sessions_started: u64,
    pub sessions_done: u64,
    pub sessions_failed: u64,
    pub sessions_cancelled: u64,
}

impl StreamMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fraction of non-blank frames that failed to decode
    pub fn decode_fault_rate(&self) -> f64 {
        let decoded = self.chunks_applied + self.status_messages + self.decode_faults;
        if decoded == 0 {
            return 0.0;
        }
        self.decode_faults as f64 / decoded as f64
    }
}

/// Thread-safe metrics tracker
#[derive(Clone)]
pub struct MetricsTracker {
    inner: Arc<Mutex<StreamMetrics>>,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StreamMetrics::new())),
        }
    }

    fn update(&self, f: impl FnOnce(&mut StreamMetrics)) {
        if let Ok(mut metrics) = self.inner.lock() {
            f(&mut metrics);
        }
    }

    pub fn record_bytes(&self, len: usize) {
        self.update(|m| m.bytes_received += len as u64);
    }

    pub fn record_frames(&self, count: usize) {
        self.update(|m| m.frames += count as u64);
    }

    pub fn record_chunk(&self, chars: usize) {
        self.update(|m| {
            m.chunks_applied += 1;
            m.chars_applied += chars as u64;
        });
    }

    pub fn record_status(&self) {
        self.update(|m| m.status_messages += 1);
    }

    pub fn record_decode_fault(&self) {
        self.update(|m| m.decode_faults += 1);
    }

    pub fn record_stale_frame(&self) {
        self.update(|m| m.stale_frames += 1);
    }

    pub fn record_started(&self) {
        self.update(|m| m.sessions_started += 1);
    }

    pub fn record_done(&self) {
        self.update(|m| m.sessions_done += 1);
    }

    pub fn record_failed(&self) {
        self.update(|m| m.sessions_failed += 1);
    }

    pub fn record_cancelled(&self) {
        self.update(|m| m.sessions_cancelled += 1);
    }

    pub fn get_metrics(&self) -> StreamMetrics {
        self.inner
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub fn summary(&self) -> MetricsSummary {
        let metrics = self.get_metrics();
        MetricsSummary {
            bytes_received: metrics.bytes_received,
            chunks_applied: metrics.chunks_applied,
            chars_applied: metrics.chars_applied,
            status_messages: metrics.status_messages,
            decode_faults: metrics.decode_faults,
            decode_fault_rate: metrics.decode_fault_rate(),
            sessions_started: metrics.sessions_started,
        }
    }
}

impl Default for MetricsTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub bytes_received: u64,
    pub chunks_applied: u64,
    pub chars_applied: u64,
    pub status_messages: u64,
    pub decode_faults: u64,
    pub decode_fault_rate: f64,
    pub sessions_started: u64,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} bytes, {} chunks, {} chars, {} status",
            self.bytes_received, self.chunks_applied, self.chars_applied, self.status_messages
        )?;
        if self.decode_faults > 0 {
            write!(
                f,
                ", {} decode faults ({:.1}%)",
                self.decode_faults,
                self.decode_fault_rate * 100.0
            )?;
        }
        Ok(())
    }
}
