//! Fan control engine
//!
//! Curve evaluation, temperature smoothing, strategy selection and the
//! runtime state that ties them together.

mod curve;
mod smoothing;
mod state;
mod strategy;

pub use curve::evaluate;
pub use smoothing::{round as round_temperature, TemperatureHistory};
pub use state::{FanUpdate, RuntimeState, TemperatureReport, TickPlan};
pub use strategy::{PowerSource, StrategyStore};
