//! Tools every session registers

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::calendar::Calendar;
use super::registry::{ToolRegistry, from_fn};
use super::schema::{ParamKind, ToolSchema};
use super::todo::TodoList;
use crate::orchestrator::{OrchestratorHandle, Trigger};
use crate::telemetry::MetricsSampler;
use crate::timer::TimerService;
use crate::{Error, Result};

/// Longest timer the assistant will set
pub const MAX_TIMER_SECS: u64 = 24 * 60 * 60;

/// Session services the built-in tools act through
#[derive(Clone)]
pub struct BuiltinTools {
    pub orchestrator: OrchestratorHandle,
    pub timers: Arc<TimerService>,
    pub sampler: Arc<dyn MetricsSampler>,
    /// Directory holding `todo.json` and `calendar.json`
    pub data_dir: PathBuf,
}

impl BuiltinTools {
    /// Register `get_system_info`, `set_timer` and the to-do and calendar tools
    ///
    /// # Errors
    ///
    /// Returns an error if any of the names is already registered
    pub fn register(self, registry: &mut ToolRegistry) -> Result<()> {
        let sampler = Arc::clone(&self.sampler);
        registry.register(
            "get_system_info",
            from_fn(move |_| {
                let sampler = Arc::clone(&sampler);
                async move { Ok(sampler.sample()?.summary()) }
            }),
            ToolSchema::new("Get the current system information (CPU, memory and GPU load)"),
        )?;

        let timers = Arc::clone(&self.timers);
        let orchestrator = self.orchestrator.clone();
        registry.register(
            "set_timer",
            from_fn(move |args: Value| {
                let timers = Arc::clone(&timers);
                let orchestrator = orchestrator.clone();
                async move {
                    let seconds = seconds_arg(&args)?;
                    set_timer(&timers, orchestrator, seconds)?;
                    Ok(format!("Timer set for {seconds} seconds."))
                }
            }),
            ToolSchema::new("Set a timer; you will announce when it is up").param(
                "seconds",
                ParamKind::Integer,
                "Duration in seconds",
            ),
        )?;

        Arc::new(TodoList::new(&self.data_dir)).register(registry)?;
        Arc::new(Calendar::new(&self.data_dir)).register(registry)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn seconds_arg(args: &Value) -> Result<u64> {
    let value = args.get("seconds");
    value
        .and_then(Value::as_u64)
        .or_else(|| {
            value
                .and_then(Value::as_f64)
                .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        })
        .ok_or_else(|| Error::Timer("seconds must be a non-negative whole number".to_string()))
        .and_then(|seconds| {
            if seconds > MAX_TIMER_SECS {
                Err(Error::Timer(format!(
                    "{seconds} seconds is too long; timers are limited to {MAX_TIMER_SECS} seconds"
                )))
            } else {
                Ok(seconds)
            }
        })
}

/// Schedule an interruptible announcement turn
fn set_timer(timers: &TimerService, orchestrator: OrchestratorHandle, seconds: u64) -> Result<()> {
    let handle = timers.schedule(Duration::from_secs(seconds), async move {
        let announcement = format!("Timer for {seconds} seconds is up!");
        if let Err(e) = orchestrator.start_turn(Trigger::timer(announcement)) {
            tracing::warn!(error = %e, seconds, "timer fired after session ended");
        }
    })?;
    tracing::info!(timer = handle.id(), seconds, "timer set");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn seconds_accepts_whole_numbers_only() {
        assert_eq!(seconds_arg(&json!({ "seconds": 30 })).unwrap(), 30);
        assert_eq!(seconds_arg(&json!({ "seconds": 5.0 })).unwrap(), 5);
        assert!(seconds_arg(&json!({ "seconds": -1 })).is_err());
        assert!(seconds_arg(&json!({ "seconds": 2.5 })).is_err());
    }

    #[test]
    fn seconds_beyond_a_day_are_rejected() {
        assert_eq!(seconds_arg(&json!({ "seconds": MAX_TIMER_SECS })).unwrap(), MAX_TIMER_SECS);
        assert!(seconds_arg(&json!({ "seconds": MAX_TIMER_SECS + 1 })).is_err());
        assert!(seconds_arg(&json!({ "seconds": u64::MAX })).is_err());
        assert!(seconds_arg(&json!({ "seconds": 1e300 })).is_err());
    }
}
