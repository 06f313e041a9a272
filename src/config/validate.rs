// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{EngineConfig, MonitorSection, RawEngineConfig, ToolConfig, ToolSection};
use crate::errors::{EngineError, Result};
use crate::monitor::MonitorSettings;

impl TryFrom<RawEngineConfig> for EngineConfig {
    type Error = EngineError;

    fn try_from(raw: RawEngineConfig) -> std::result::Result<Self, Self::Error> {
        validate_tool(&raw.tool)?;
        let monitor = validate_monitor(&raw.monitor)?;
        validate_engine(&raw)?;

        let log_dir = raw.monitor.log_dir.clone();
        Ok(EngineConfig::new_unchecked(
            ToolConfig::from(raw.tool),
            log_dir,
            monitor,
            raw.engine,
        ))
    }
}

fn validate_tool(tool: &ToolSection) -> Result<()> {
    if tool.program.trim().is_empty() {
        return Err(EngineError::ConfigError(
            "[tool].program must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_monitor(monitor: &MonitorSection) -> Result<MonitorSettings> {
    let poll_interval = parse_nonzero_duration("poll_interval", &monitor.poll_interval)?;
    let cancel_grace = parse_nonzero_duration("cancel_grace", &monitor.cancel_grace)?;

    if monitor.idle_polls == 0 {
        return Err(EngineError::ConfigError(
            "[monitor].idle_polls must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(MonitorSettings {
        poll_interval,
        idle_polls: monitor.idle_polls,
        cancel_grace,
    })
}

fn validate_engine(cfg: &RawEngineConfig) -> Result<()> {
    if cfg.engine.history_limit == Some(0) {
        return Err(EngineError::ConfigError(
            "[engine].history_limit must be >= 1 when set (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn parse_nonzero_duration(field: &str, value: &str) -> Result<Duration> {
    let duration = parse_duration(value)
        .map_err(|e| EngineError::ConfigError(format!("[monitor].{field}: {e}")))?;
    if duration.is_zero() {
        return Err(EngineError::ConfigError(format!(
            "[monitor].{field} must be greater than zero"
        )));
    }
    Ok(duration)
}

/// Parse durations like `250ms`, `5s`, `2m`, `1h`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' is missing a unit suffix"))?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let secs_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ));
        }
    };
    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{s}' is too large"))
}
