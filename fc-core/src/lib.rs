//! fanctl Core Library
//!
//! Strategy-driven fan control for laptops whose fan is reachable through the
//! embedded controller (`ectool`) or a hwmon PWM file.
//!
//! # Module Structure
//!
//! - `engine/` - curve evaluation, smoothing, strategy selection, runtime state
//! - `data/` - configuration document, validation, persistence
//! - `hw/` - hardware backends behind the `HardwareSensor` capability
//! - `daemon_client` - blocking client for the daemon's control channel
//!
//! # Example
//!
//! ```
//! use fc_core::{evaluate, CurvePoint};
//!
//! let curve = [CurvePoint::new(40.0, 10), CurvePoint::new(80.0, 90)];
//! assert_eq!(evaluate(&curve, 60.0), 50);
//! ```

// Grouped modules
pub mod data;
pub mod engine;
pub mod hw;

// Standalone modules
pub mod constants;
pub mod daemon_client;

pub use data::{
    ConfigData, ConfigStore, CurvePoint, JsonFileStore, MemoryConfigStore, RampLimits, Strategy,
    StrategyParams, DEFAULT_CONFIG_JSON,
};

pub use engine::{
    evaluate, round_temperature, FanUpdate, PowerSource, RuntimeState, StrategyStore,
    TemperatureHistory, TemperatureReport, TickPlan,
};

pub use hw::{hottest, open_sensor, CommandRunner, EctoolSensor, HardwareSensor, HwmonSensor, SystemRunner};

pub use daemon_client::{DaemonClient, MAX_REPLY_SIZE};

pub use fc_error::{FanctlError, Result};
