//! Linux hwmon backend
//!
//! Temperatures come from every `temp*_input` file under the hwmon class
//! directory (millidegrees Celsius). External power is detected through
//! `power_supply` entries of type `Mains`. The fan is driven through one PWM
//! file whose `_enable` sibling selects the mode:
//! - 1 = manual (software control)
//! - 2 = automatic (hardware thermal control)

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use fc_error::{FanctlError, Result};

use super::HardwareSensor;
use crate::constants::{paths, pwm, temperature};

/// `HardwareSensor` backed by sysfs
#[derive(Debug, Clone)]
pub struct HwmonSensor {
    hwmon_base: PathBuf,
    power_supply_base: PathBuf,
    pwm_path: PathBuf,
}

impl HwmonSensor {
    pub fn new(pwm_path: impl Into<PathBuf>) -> Self {
        Self::with_roots(paths::HWMON_BASE, paths::POWER_SUPPLY_BASE, pwm_path)
    }

    /// Use alternative sysfs roots
    pub fn with_roots(
        hwmon_base: impl Into<PathBuf>,
        power_supply_base: impl Into<PathBuf>,
        pwm_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            hwmon_base: hwmon_base.into(),
            power_supply_base: power_supply_base.into(),
            pwm_path: pwm_path.into(),
        }
    }

    fn enable_path(&self) -> PathBuf {
        let mut name = self.pwm_path.as_os_str().to_os_string();
        name.push("_enable");
        PathBuf::from(name)
    }

    fn write_enable(&self, mode: u8) -> Result<()> {
        let enable_path = self.enable_path();
        if !enable_path.exists() {
            // No enable file means manual control is always active
            return Ok(());
        }
        fs::write(&enable_path, mode.to_string()).map_err(|e| {
            FanctlError::hardware(
                "pwm_enable",
                format!("failed to write {} to {}: {}", mode, enable_path.display(), e),
            )
        })
    }
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

fn is_temperature_input(name: &str) -> bool {
    name.strip_prefix("temp")
        .and_then(|rest| rest.strip_suffix("_input"))
        .map_or(false, |index| !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()))
}

impl HardwareSensor for HwmonSensor {
    fn name(&self) -> &'static str {
        "hwmon"
    }

    fn read_temperatures(&self) -> Result<Vec<f64>> {
        let chips = fs::read_dir(&self.hwmon_base).map_err(|e| {
            FanctlError::hardware(
                "temperature",
                format!("cannot list {}: {}", self.hwmon_base.display(), e),
            )
        })?;

        let mut readings = Vec::new();
        for chip in chips.flatten() {
            let Ok(entries) = fs::read_dir(chip.path()) else {
                continue;
            };
            for entry in entries.flatten() {
                let file_name = entry.file_name();
                if !is_temperature_input(&file_name.to_string_lossy()) {
                    continue;
                }
                match read_trimmed(&entry.path()).and_then(|raw| raw.parse::<i64>().ok()) {
                    Some(millidegrees) => {
                        readings.push(millidegrees as f64 / temperature::MILLIDEGREE_DIVISOR)
                    }
                    None => trace!(path = %entry.path().display(), "Unreadable temperature input"),
                }
            }
        }
        Ok(readings)
    }

    fn is_on_external_power(&self) -> Result<bool> {
        let supplies = fs::read_dir(&self.power_supply_base).map_err(|e| {
            FanctlError::hardware(
                "power_supply",
                format!("cannot list {}: {}", self.power_supply_base.display(), e),
            )
        })?;

        let mut found_mains = false;
        for supply in supplies.flatten() {
            let path = supply.path();
            if read_trimmed(&path.join("type")).as_deref() != Some("Mains") {
                continue;
            }
            found_mains = true;
            if read_trimmed(&path.join("online")).as_deref() == Some("1") {
                return Ok(true);
            }
        }
        // A machine without any mains supply entry is treated as plugged in
        Ok(!found_mains)
    }

    fn set_fan_duty(&self, percent: u8) -> Result<()> {
        self.write_enable(pwm::enable::MANUAL)?;
        let value = pwm::from_percent(percent);
        fs::write(&self.pwm_path, value.to_string()).map_err(|e| {
            FanctlError::hardware(
                "pwm",
                format!("failed to write {} to {}: {}", value, self.pwm_path.display(), e),
            )
        })?;
        debug!(duty = percent, pwm = value, "PWM written");
        Ok(())
    }

    fn enable_auto_control(&self) -> Result<()> {
        self.write_enable(pwm::enable::AUTOMATIC)
    }

    fn resume_manual_control(&self) -> Result<()> {
        self.write_enable(pwm::enable::MANUAL)?;
        debug!("PWM switched back to manual");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Sysfs {
        _dir: TempDir,
        sensor: HwmonSensor,
        pwm: PathBuf,
        power: PathBuf,
    }

    fn sysfs() -> Sysfs {
        let dir = TempDir::new().unwrap();
        let hwmon = dir.path().join("hwmon");
        let power = dir.path().join("power_supply");

        let chip0 = hwmon.join("hwmon0");
        let chip1 = hwmon.join("hwmon1");
        fs::create_dir_all(&chip0).unwrap();
        fs::create_dir_all(&chip1).unwrap();
        fs::write(chip0.join("temp1_input"), "45000\n").unwrap();
        fs::write(chip0.join("temp1_label"), "Package\n").unwrap();
        fs::write(chip1.join("temp2_input"), "61500\n").unwrap();
        fs::write(chip1.join("temp3_input"), "garbage\n").unwrap();

        let pwm = chip1.join("pwm1");
        fs::write(&pwm, "0\n").unwrap();
        fs::write(chip1.join("pwm1_enable"), "2\n").unwrap();

        fs::create_dir_all(power.join("ACAD")).unwrap();
        fs::write(power.join("ACAD").join("type"), "Mains\n").unwrap();
        fs::write(power.join("ACAD").join("online"), "1\n").unwrap();
        fs::create_dir_all(power.join("BAT1")).unwrap();
        fs::write(power.join("BAT1").join("type"), "Battery\n").unwrap();

        let sensor = HwmonSensor::with_roots(&hwmon, &power, &pwm);
        Sysfs {
            _dir: dir,
            sensor,
            pwm,
            power,
        }
    }

    #[test]
    fn test_reads_millidegrees() {
        let fs_root = sysfs();
        let mut temps = fs_root.sensor.read_temperatures().unwrap();
        temps.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(temps, vec![45.0, 61.5]);
    }

    #[test]
    fn test_mains_online() {
        let fs_root = sysfs();
        assert!(fs_root.sensor.is_on_external_power().unwrap());
        fs::write(fs_root.power.join("ACAD").join("online"), "0\n").unwrap();
        assert!(!fs_root.sensor.is_on_external_power().unwrap());
    }

    #[test]
    fn test_duty_switches_to_manual() {
        let fs_root = sysfs();
        fs_root.sensor.set_fan_duty(50).unwrap();
        assert_eq!(fs::read_to_string(&fs_root.pwm).unwrap(), "128");
        assert_eq!(fs::read_to_string(fs_root.sensor.enable_path()).unwrap(), "1");

        fs_root.sensor.enable_auto_control().unwrap();
        assert_eq!(fs::read_to_string(fs_root.sensor.enable_path()).unwrap(), "2");
    }

    #[test]
    fn test_resume_switches_back_to_manual() {
        let fs_root = sysfs();
        fs_root.sensor.enable_auto_control().unwrap();
        fs_root.sensor.resume_manual_control().unwrap();
        assert_eq!(fs::read_to_string(fs_root.sensor.enable_path()).unwrap(), "1");
        assert_eq!(fs::read_to_string(&fs_root.pwm).unwrap(), "0\n");
    }

    #[test]
    fn test_temperature_input_names() {
        assert!(is_temperature_input("temp1_input"));
        assert!(is_temperature_input("temp12_input"));
        assert!(!is_temperature_input("temp1_label"));
        assert!(!is_temperature_input("temp_input"));
        assert!(!is_temperature_input("fan1_input"));
    }
}
