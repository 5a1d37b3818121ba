//! Constants and configuration values for fanctl
//!
//! Centralizes timing, defaults and hardware scaling so the engine, the
//! backends and the daemon agree on them.

use std::time::Duration;

/// Control loop timing
pub mod timing {
    use super::Duration;

    /// Nominal period between two ticks while active
    pub const TICK_PERIOD: Duration = Duration::from_secs(1);

    /// Polling period while paused (hardware is in automatic mode)
    pub const PAUSED_POLL_PERIOD: Duration = Duration::from_secs(5);

    /// Read timeout for one request on the control channel
    pub const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(10);

    /// Timeout used by the CLI when waiting for the daemon's reply
    pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(15);
}

/// Temperature history
pub mod history {
    /// Samples kept by the smoother (one per tick)
    pub const CAPACITY: usize = 100;

    /// Decimal places kept on averaged/effective temperatures
    pub const DECIMALS: i32 = 2;
}

/// Strategy defaults applied when a key is omitted from the configuration
pub mod strategy {
    /// Ticks between two fan updates
    pub const DEFAULT_FAN_UPDATE_PERIOD: u32 = 5;

    /// Moving-average window, in seconds (one sample per second)
    pub const DEFAULT_MOVING_AVERAGE_WINDOW: u32 = 20;
}

/// Fan duty limits
pub mod duty {
    /// Upper bound of a duty value, in percent
    pub const MAX_PERCENT: u8 = 100;

    /// Duty applied when no valid temperature is available
    pub const SAFETY_FALLBACK: u8 = 100;

    /// Duty returned by the evaluator for an empty curve
    pub const EMPTY_CURVE_FALLBACK: u8 = 100;

    /// Consecutive failed duty writes tolerated before the loop gives up
    pub const MAX_CONSECUTIVE_APPLY_ERRORS: u32 = 30;
}

/// PWM value constants (hwmon backend)
pub mod pwm {
    /// Maximum PWM value
    pub const MAX_VALUE: u8 = 255;

    /// PWM enable modes
    pub mod enable {
        /// Manual (software) control
        pub const MANUAL: u8 = 1;
        /// Automatic (hardware thermal) control
        pub const AUTOMATIC: u8 = 2;
    }

    /// Convert a duty percentage to a PWM value
    #[inline]
    pub fn from_percent(percent: u8) -> u8 {
        let percent = u32::from(percent.min(super::duty::MAX_PERCENT));
        ((percent * u32::from(MAX_VALUE) + 50) / 100) as u8
    }
}

/// Sysfs locations (hwmon backend)
pub mod paths {
    /// Base path for hwmon devices
    pub const HWMON_BASE: &str = "/sys/class/hwmon";

    /// Base path for power supplies
    pub const POWER_SUPPLY_BASE: &str = "/sys/class/power_supply";
}

/// Temperature scaling
pub mod temperature {
    /// Linux hwmon reports temperatures in millidegrees
    pub const MILLIDEGREE_DIVISOR: f64 = 1000.0;
}

/// ectool invocation (ectool backend)
pub mod ectool {
    /// Binary name, resolved through PATH
    pub const BINARY: &str = "ectool";
}
