//! Configuration data and persistence
//!
//! - `config` - configuration document, validation, resolved strategies
//! - `store` - where the document lives (file or memory)

mod config;
mod store;

pub use config::{
    ConfigData, CurvePoint, RampLimits, Strategy, StrategyParams, DEFAULT_CONFIG_JSON,
};
pub use store::{ConfigStore, JsonFileStore, MemoryConfigStore};

#[cfg(test)]
pub use store::MockConfigStore;
