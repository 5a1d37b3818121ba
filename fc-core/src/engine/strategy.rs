//! Strategy lookup and selection
//!
//! [`StrategyStore`] wraps a validated [`ConfigData`] and keeps one shared
//! [`Strategy`] per name, so resolving the active strategy on every tick is a
//! map lookup and a reference-count bump.

use std::collections::BTreeMap;
use std::sync::Arc;

use fc_error::{FanctlError, Result};

use crate::data::{ConfigData, Strategy};

/// Where the machine currently draws power from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PowerSource {
    /// AC adapter connected
    #[default]
    External,
    Battery,
}

impl PowerSource {
    pub fn from_external_power(on_external_power: bool) -> Self {
        if on_external_power {
            PowerSource::External
        } else {
            PowerSource::Battery
        }
    }
}

/// Validated configuration plus its resolved strategies
#[derive(Debug, Clone)]
pub struct StrategyStore {
    data: ConfigData,
    strategies: BTreeMap<String, Arc<Strategy>>,
}

impl StrategyStore {
    pub fn new(data: ConfigData) -> Result<Self> {
        data.validate()?;
        let strategies = data
            .strategies
            .iter()
            .map(|(name, params)| (name.clone(), Arc::new(Strategy::from_params(name, params))))
            .collect();
        Ok(Self { data, strategies })
    }

    pub fn data(&self) -> &ConfigData {
        &self.data
    }

    pub fn contains(&self, name: &str) -> bool {
        self.strategies.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<Arc<Strategy>> {
        self.strategies
            .get(name)
            .cloned()
            .ok_or_else(|| FanctlError::InvalidStrategy(name.to_string()))
    }

    pub fn default_strategy(&self) -> Result<Arc<Strategy>> {
        self.get(&self.data.default_strategy)
    }

    /// Strategy used on battery, the default one when none is configured
    pub fn discharging_strategy(&self) -> Result<Arc<Strategy>> {
        match self.data.discharging_strategy_name() {
            Some(name) => self.get(name),
            None => self.default_strategy(),
        }
    }

    /// Strategy names in sorted order
    pub fn names(&self) -> Vec<String> {
        self.strategies.keys().cloned().collect()
    }

    /// The strategy that should drive the fan right now
    ///
    /// A manual override always wins; otherwise the power source picks
    /// between the default and the discharging strategy.
    pub fn resolve(&self, overridden: Option<&Arc<Strategy>>, power: PowerSource) -> Result<Arc<Strategy>> {
        if let Some(strategy) = overridden {
            return Ok(Arc::clone(strategy));
        }
        match power {
            PowerSource::External => self.default_strategy(),
            PowerSource::Battery => self.discharging_strategy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(discharging: &str) -> StrategyStore {
        let json = format!(
            r#"{{"defaultStrategy": "lazy", "strategyOnDischarging": "{}",
                "strategies": {{
                    "lazy": {{"speedCurve": [{{"temp": 50, "speed": 15}}]}},
                    "laziest": {{"speedCurve": [{{"temp": 50, "speed": 0}}]}},
                    "agile": {{"speedCurve": [{{"temp": 50, "speed": 40}}], "fanSpeedUpdateFrequency": 2}}
                }}}}"#,
            discharging
        );
        StrategyStore::new(ConfigData::from_json(&json).unwrap()).unwrap()
    }

    #[test]
    fn test_override_wins_over_power_source() {
        let store = store("laziest");
        let agile = store.get("agile").unwrap();
        for power in [PowerSource::External, PowerSource::Battery] {
            assert_eq!(store.resolve(Some(&agile), power).unwrap().name, "agile");
        }
    }

    #[test]
    fn test_power_source_selects_strategy() {
        let store = store("laziest");
        assert_eq!(store.resolve(None, PowerSource::External).unwrap().name, "lazy");
        assert_eq!(store.resolve(None, PowerSource::Battery).unwrap().name, "laziest");
    }

    #[test]
    fn test_battery_without_discharging_strategy_uses_default() {
        let store = store("");
        assert_eq!(store.resolve(None, PowerSource::Battery).unwrap().name, "lazy");
    }

    #[test]
    fn test_unknown_name_is_invalid_strategy() {
        let store = store("");
        match store.get("turbo") {
            Err(FanctlError::InvalidStrategy(name)) => assert_eq!(name, "turbo"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_names_are_sorted() {
        assert_eq!(store("").names(), vec!["agile", "laziest", "lazy"]);
    }
}
