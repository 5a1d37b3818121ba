//! Hardware access
//!
//! The control loop only sees [`HardwareSensor`]. Two backends exist:
//! - `ectool` - Framework embedded controller through the `ectool` binary
//! - `hwmon` - Linux sysfs hwmon sensors and a PWM control file

mod ectool;
mod hwmon;

use std::sync::Arc;

use fc_error::{FanctlError, Result};
use fc_protocol::{HardwareBackend, RunOptions};

pub use ectool::{CommandRunner, EctoolSensor, SystemRunner};
pub use hwmon::HwmonSensor;

/// Temperature, power and fan access for one machine
///
/// Calls may block (process spawn, sysfs I/O); the daemon runs them off the
/// async runtime and never while holding the runtime state lock.
pub trait HardwareSensor: Send + Sync {
    /// Short backend name, used in logs
    fn name(&self) -> &'static str;

    /// Every valid temperature reading, in degrees Celsius
    fn read_temperatures(&self) -> Result<Vec<f64>>;

    /// Whether the machine runs on external (AC) power
    fn is_on_external_power(&self) -> Result<bool>;

    /// Set the fan duty, in percent (0-100)
    fn set_fan_duty(&self, percent: u8) -> Result<()>;

    /// Hand the fan back to the hardware's own automatic control
    fn enable_auto_control(&self) -> Result<()>;

    /// Take the fan back from automatic control after a pause
    fn resume_manual_control(&self) -> Result<()>;
}

/// Hottest valid reading
///
/// Fails with `SafetyFallback` when no reading is usable.
pub fn hottest(readings: &[f64]) -> Result<f64> {
    readings
        .iter()
        .copied()
        .filter(|t| t.is_finite() && *t > 0.0)
        .fold(None, |max: Option<f64>, t| Some(max.map_or(t, |m| m.max(t))))
        .ok_or_else(|| FanctlError::SafetyFallback("no sensor returned a valid temperature".into()))
}

/// Build the backend selected on the command line
pub fn open_sensor(options: &RunOptions) -> Result<Arc<dyn HardwareSensor>> {
    match options.hardware {
        HardwareBackend::Ectool => {
            let sensor = EctoolSensor::new(Arc::new(SystemRunner), options.no_battery_sensors)?;
            Ok(Arc::new(sensor))
        }
        HardwareBackend::Hwmon => {
            let pwm_path = options.pwm_path.clone().ok_or_else(|| {
                FanctlError::generic("the hwmon controller requires --pwm-path")
            })?;
            Ok(Arc::new(HwmonSensor::new(pwm_path)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hottest_ignores_invalid_readings() {
        assert_eq!(hottest(&[41.0, 0.0, 67.5, -3.0, f64::NAN]).unwrap(), 67.5);
    }

    #[test]
    fn test_hottest_without_readings_is_safety_fallback() {
        assert!(matches!(hottest(&[]), Err(FanctlError::SafetyFallback(_))));
        assert!(matches!(hottest(&[0.0, 0.0]), Err(FanctlError::SafetyFallback(_))));
    }

    #[test]
    fn test_hwmon_requires_pwm_path() {
        let options = RunOptions {
            hardware: HardwareBackend::Hwmon,
            ..RunOptions::default()
        };
        assert!(open_sensor(&options).is_err());
    }
}
