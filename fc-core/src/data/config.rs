//! Configuration model
//!
//! The on-disk document is [`ConfigData`] (camelCase JSON). A document is only
//! ever handed to the runtime after [`ConfigData::validate`] succeeded, and the
//! runtime works on [`Strategy`] values built from it with every default
//! filled in.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use fc_error::{FanctlError, Result};

use crate::constants::{duty, strategy as strategy_const};

/// Built-in configuration written when no configuration file exists
pub const DEFAULT_CONFIG_JSON: &str = include_str!("../../resources/default_config.json");

/// A single point on a speed curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    /// Temperature in degrees Celsius
    pub temp: f64,
    /// Fan duty in percent (0-100)
    pub speed: u8,
}

impl CurvePoint {
    pub fn new(temp: f64, speed: u8) -> Self {
        Self { temp, speed }
    }
}

/// Per-update limits on how far the duty may move
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RampLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_increase: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_decrease: Option<u8>,
}

impl RampLimits {
    /// Clamp `target` so it stays within the allowed step from `previous`
    pub fn limit(&self, previous: u8, target: u8) -> u8 {
        if target > previous {
            match self.max_increase {
                Some(step) => target.min(previous.saturating_add(step)),
                None => target,
            }
        } else {
            match self.max_decrease {
                Some(step) => target.max(previous.saturating_sub(step)),
                None => target,
            }
        }
    }
}

/// One strategy as written in the configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyParams {
    pub speed_curve: Vec<CurvePoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fan_speed_update_frequency: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moving_average_interval: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical_temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ramp: Option<RampLimits>,
}

impl StrategyParams {
    fn validate(&self, name: &str) -> Result<()> {
        if self.speed_curve.is_empty() {
            return Err(FanctlError::config(format!(
                "strategies.{}.speedCurve must contain at least one point",
                name
            )));
        }

        let mut previous: Option<f64> = None;
        for (index, point) in self.speed_curve.iter().enumerate() {
            if !point.temp.is_finite() {
                return Err(FanctlError::config(format!(
                    "strategies.{}.speedCurve[{}].temp must be a finite number",
                    name, index
                )));
            }
            if point.speed > duty::MAX_PERCENT {
                return Err(FanctlError::config(format!(
                    "strategies.{}.speedCurve[{}].speed must be within 0..=100, got {}",
                    name, index, point.speed
                )));
            }
            if let Some(prev) = previous {
                if point.temp < prev {
                    return Err(FanctlError::config(format!(
                        "strategies.{}.speedCurve must be sorted by temperature ({} follows {})",
                        name, point.temp, prev
                    )));
                }
            }
            previous = Some(point.temp);
        }

        if self.fan_speed_update_frequency == Some(0) {
            return Err(FanctlError::config(format!(
                "strategies.{}.fanSpeedUpdateFrequency must be greater than 0",
                name
            )));
        }
        if self.moving_average_interval == Some(0) {
            return Err(FanctlError::config(format!(
                "strategies.{}.movingAverageInterval must be greater than 0",
                name
            )));
        }
        if let Some(critical) = self.critical_temperature {
            if !critical.is_finite() {
                return Err(FanctlError::config(format!(
                    "strategies.{}.criticalTemperature must be a finite number",
                    name
                )));
            }
        }
        if let Some(ramp) = &self.ramp {
            for (key, step) in [("maxIncrease", ramp.max_increase), ("maxDecrease", ramp.max_decrease)] {
                if let Some(step) = step {
                    if step == 0 || step > duty::MAX_PERCENT {
                        return Err(FanctlError::config(format!(
                            "strategies.{}.ramp.{} must be within 1..=100, got {}",
                            name, key, step
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// The persisted configuration document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigData {
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub default_strategy: String,
    /// Strategy used on battery; empty means "same as the default"
    #[serde(default)]
    pub strategy_on_discharging: String,
    pub strategies: BTreeMap<String, StrategyParams>,
}

impl ConfigData {
    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let data: ConfigData =
            serde_json::from_str(json).map_err(|e| FanctlError::config(e.to_string()))?;
        data.validate()?;
        Ok(data)
    }

    /// The bundled default configuration
    pub fn builtin() -> Result<Self> {
        Self::from_json(DEFAULT_CONFIG_JSON)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Check every rule a configuration must satisfy before it is used
    pub fn validate(&self) -> Result<()> {
        if self.strategies.is_empty() {
            return Err(FanctlError::config("strategies must define at least one strategy"));
        }
        if !self.strategies.contains_key(&self.default_strategy) {
            return Err(FanctlError::config(format!(
                "defaultStrategy '{}' is not defined in strategies",
                self.default_strategy
            )));
        }
        if let Some(name) = self.discharging_strategy_name() {
            if !self.strategies.contains_key(name) {
                return Err(FanctlError::config(format!(
                    "strategyOnDischarging '{}' is not defined in strategies",
                    name
                )));
            }
        }
        for (name, params) in &self.strategies {
            params.validate(name)?;
        }
        Ok(())
    }

    /// Discharging strategy name, if one is configured
    pub fn discharging_strategy_name(&self) -> Option<&str> {
        let name = self.strategy_on_discharging.as_str();
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }

    /// Strategy names in sorted order
    pub fn strategy_names(&self) -> Vec<String> {
        self.strategies.keys().cloned().collect()
    }
}

/// A strategy with every default resolved, ready for the control loop
#[derive(Debug, Clone, PartialEq)]
pub struct Strategy {
    pub name: String,
    pub curve: Vec<CurvePoint>,
    /// Ticks between fan updates
    pub fan_update_period: u32,
    /// Moving-average window in seconds
    pub moving_average_window: u32,
    pub critical_temperature: Option<f64>,
    pub ramp: Option<RampLimits>,
}

impl Strategy {
    pub fn from_params(name: &str, params: &StrategyParams) -> Self {
        Self {
            name: name.to_string(),
            curve: params.speed_curve.clone(),
            fan_update_period: params
                .fan_speed_update_frequency
                .unwrap_or(strategy_const::DEFAULT_FAN_UPDATE_PERIOD),
            moving_average_window: params
                .moving_average_interval
                .unwrap_or(strategy_const::DEFAULT_MOVING_AVERAGE_WINDOW),
            critical_temperature: params.critical_temperature,
            ramp: params.ramp,
        }
    }

    /// Whether `temperature` has reached this strategy's critical threshold
    pub fn is_critical(&self, temperature: f64) -> bool {
        matches!(self.critical_temperature, Some(critical) if temperature >= critical)
    }
}
