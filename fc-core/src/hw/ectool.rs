//! Framework embedded controller backend
//!
//! Talks to the EC through the `ectool` binary:
//! - `ectool temps all` / `ectool temps <id>` - readings as `... (= 45 C)`
//! - `ectool tempsinfo all` - sensor ids and types, to skip battery sensors
//! - `ectool battery` - `AC_PRESENT` in the flags line when plugged in
//! - `ectool fanduty <n>` / `ectool autofanctrl`

use std::process::Command;
use std::sync::Arc;

use regex::Regex;
use tracing::{debug, info};

use fc_error::{FanctlError, Result};

use super::HardwareSensor;
use crate::constants::{duty, ectool};

/// Runs `ectool` with the given arguments and returns its stdout
pub trait CommandRunner: Send + Sync {
    fn run(&self, args: &[&str]) -> Result<String>;
}

/// Spawns the real `ectool` from PATH
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new(ectool::BINARY)
            .args(args)
            .output()
            .map_err(|e| FanctlError::hardware("ectool", format!("failed to run {}: {}", ectool::BINARY, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FanctlError::hardware(
                "ectool",
                format!("`{} {}` exited with {}: {}", ectool::BINARY, args.join(" "), output.status, stderr.trim()),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

struct Patterns {
    temperature: Regex,
    battery_sensor: Regex,
    sensor_id: Regex,
    ac_present: Regex,
}

impl Patterns {
    fn compile() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| FanctlError::generic(format!("invalid pattern {}: {}", pattern, e)))
        };
        Ok(Self {
            temperature: compile(r"\(= (\d+) C\)")?,
            battery_sensor: compile(r"(\d+) Battery")?,
            sensor_id: compile(r"(?m)^(\d+)")?,
            ac_present: compile(r"Flags.*AC_PRESENT")?,
        })
    }
}

/// `HardwareSensor` backed by `ectool`
pub struct EctoolSensor {
    runner: Arc<dyn CommandRunner>,
    /// Sensor ids to query when battery sensors are excluded
    sensors: Option<Vec<String>>,
    patterns: Patterns,
}

impl EctoolSensor {
    pub fn new(runner: Arc<dyn CommandRunner>, no_battery_sensors: bool) -> Result<Self> {
        let patterns = Patterns::compile()?;
        let sensors = if no_battery_sensors {
            let info = runner.run(&["tempsinfo", "all"])?;
            let sensors = non_battery_sensors(&patterns, &info);
            info!(sensors = ?sensors, "Battery sensors excluded");
            Some(sensors)
        } else {
            None
        };
        Ok(Self {
            runner,
            sensors,
            patterns,
        })
    }

    fn parse_temperatures(&self, output: &str) -> Vec<f64> {
        self.patterns
            .temperature
            .captures_iter(output)
            .filter_map(|c| c[1].parse::<u32>().ok())
            .filter(|t| *t > 0)
            .map(f64::from)
            .collect()
    }
}

fn non_battery_sensors(patterns: &Patterns, info: &str) -> Vec<String> {
    let battery: Vec<&str> = patterns
        .battery_sensor
        .captures_iter(info)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    patterns
        .sensor_id
        .captures_iter(info)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .filter(|id| !battery.contains(id))
        .map(str::to_string)
        .collect()
}

impl HardwareSensor for EctoolSensor {
    fn name(&self) -> &'static str {
        "ectool"
    }

    fn read_temperatures(&self) -> Result<Vec<f64>> {
        let output = match &self.sensors {
            Some(sensors) => {
                let mut combined = String::new();
                for id in sensors {
                    combined.push_str(&self.runner.run(&["temps", id])?);
                }
                combined
            }
            None => self.runner.run(&["temps", "all"])?,
        };
        Ok(self.parse_temperatures(&output))
    }

    fn is_on_external_power(&self) -> Result<bool> {
        let output = self.runner.run(&["battery"])?;
        Ok(self.patterns.ac_present.is_match(&output))
    }

    fn set_fan_duty(&self, percent: u8) -> Result<()> {
        let percent = percent.min(duty::MAX_PERCENT).to_string();
        self.runner.run(&["fanduty", &percent])?;
        debug!(duty = %percent, "Fan duty written");
        Ok(())
    }

    fn enable_auto_control(&self) -> Result<()> {
        self.runner.run(&["autofanctrl"])?;
        Ok(())
    }

    fn resume_manual_control(&self) -> Result<()> {
        // the next fanduty command takes the fan over from the EC
        Ok(())
    }
}
