//! Periodic host telemetry on the `system_stats` topic
//!
//! The broadcaster runs for the lifetime of a session and never interacts
//! with the orchestrator. A failed sample or publish is logged and the tick
//! is skipped.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sysinfo::System;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::room::{Room, TELEMETRY_TOPIC};
use crate::{Error, Result};

/// One reading of host load
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    #[serde(rename = "cpu")]
    pub cpu_pct: f32,
    #[serde(rename = "memory")]
    pub memory_pct: f32,
    #[serde(rename = "gpu")]
    pub gpu_pct: f32,
    pub timestamp: DateTime<Utc>,
}

impl TelemetrySample {
    /// Spoken-style status summary
    #[must_use]
    pub fn summary(&self) -> String {
        let gpu = if self.gpu_pct > 0.0 {
            format!("{:.1}%", self.gpu_pct)
        } else {
            "No GPU Detected".to_string()
        };
        format!(
            "System Status: ONLINE\nCPU Usage: {:.1}%\nMemory Usage: {:.1}%\nGPU: {gpu}",
            self.cpu_pct, self.memory_pct
        )
    }
}

/// Source of host metrics
pub trait MetricsSampler: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be read
    fn sample(&self) -> Result<TelemetrySample>;
}

/// Host metrics from `sysinfo`
///
/// GPU load is not available through `sysinfo` and is reported as zero.
pub struct SysinfoSampler {
    system: Mutex<System>,
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoSampler {
    #[must_use]
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_memory();
        Self {
            system: Mutex::new(system),
        }
    }
}

impl MetricsSampler for SysinfoSampler {
    fn sample(&self) -> Result<TelemetrySample> {
        let mut system = self
            .system
            .lock()
            .map_err(|_| Error::Session("metrics sampler lock poisoned".to_string()))?;

        // CPU usage is measured against the previous refresh
        system.refresh_cpu();
        system.refresh_memory();

        let total = system.total_memory();
        #[allow(clippy::cast_precision_loss)]
        let memory_pct = if total == 0 {
            0.0
        } else {
            (system.used_memory() as f64 / total as f64 * 100.0) as f32
        };

        Ok(TelemetrySample {
            cpu_pct: system.global_cpu_info().cpu_usage(),
            memory_pct,
            gpu_pct: 0.0,
            timestamp: Utc::now(),
        })
    }
}

/// Publishes a [`TelemetrySample`] every `interval` until cancelled
pub struct TelemetryBroadcaster {
    sampler: Arc<dyn MetricsSampler>,
    room: Arc<dyn Room>,
    interval: Duration,
}

impl TelemetryBroadcaster {
    #[must_use]
    pub fn new(sampler: Arc<dyn MetricsSampler>, room: Arc<dyn Room>, interval: Duration) -> Self {
        Self {
            sampler,
            room,
            interval,
        }
    }

    /// Run the loop; returns the number of samples published
    pub async fn run(self, shutdown: CancellationToken) -> usize {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately
        ticker.tick().await;

        let mut published = 0;
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(()) => published += 1,
                        Err(e) => tracing::warn!(error = %e, "telemetry tick skipped"),
                    }
                }
            }
        }

        tracing::debug!(published, "telemetry broadcaster stopped");
        published
    }

    async fn tick(&self) -> Result<()> {
        let sample = self.sampler.sample()?;
        let payload = serde_json::to_vec(&sample)?;
        self.room.publish_data(TELEMETRY_TOPIC, payload).await?;
        tracing::trace!(cpu = sample.cpu_pct, memory = sample.memory_pct, "telemetry published");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_serializes_with_short_keys() {
        let sample = TelemetrySample {
            cpu_pct: 12.5,
            memory_pct: 40.0,
            gpu_pct: 0.0,
            timestamp: Utc::now(),
        };
        let json: serde_json::Value = serde_json::to_value(sample).unwrap();
        assert_eq!(json["cpu"], 12.5);
        assert_eq!(json["memory"], 40.0);
        assert_eq!(json["gpu"], 0.0);
    }

    #[test]
    fn summary_mentions_missing_gpu() {
        let sample = TelemetrySample {
            cpu_pct: 3.0,
            memory_pct: 50.0,
            gpu_pct: 0.0,
            timestamp: Utc::now(),
        };
        let summary = sample.summary();
        assert!(summary.starts_with("System Status: ONLINE"));
        assert!(summary.contains("CPU Usage: 3.0%"));
        assert!(summary.ends_with("GPU: No GPU Detected"));
    }

    #[test]
    fn sysinfo_reports_percentages() {
        let sample = SysinfoSampler::new().sample().unwrap();
        assert!((0.0..=100.0).contains(&sample.memory_pct));
    }
}
