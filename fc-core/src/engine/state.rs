//! Runtime state of the controller
//!
//! Everything the control loop and the command dispatcher share lives in one
//! [`RuntimeState`]. The daemon keeps it behind a single mutex; every method
//! here is one complete transition, so a caller holding the lock never leaves
//! the state half-updated (for example an override set without its tick
//! counter reset).
//!
//! Hardware I/O is deliberately absent: a tick is split into
//! [`RuntimeState::plan_tick`] (decide, under the lock) and
//! [`RuntimeState::record_applied`] (commit, under the lock), with the actual
//! duty write happening in between without the lock held.

use std::sync::Arc;

use tracing::{debug, info};

use fc_error::{FanctlError, Result};
use fc_protocol::DEFAULT_STRATEGY_TOKEN;

use crate::constants::duty;
use crate::data::{ConfigData, ConfigStore, Strategy};

use super::curve::evaluate;
use super::smoothing::TemperatureHistory;
use super::strategy::{PowerSource, StrategyStore};

/// What the control loop must do after a tick was planned
#[derive(Debug, Clone, PartialEq)]
pub enum TickPlan {
    /// Control is paused; the hardware runs its own curve
    Paused,
    /// Sample recorded, no fan update due on this tick
    Hold,
    /// Write a new duty
    Update(FanUpdate),
    /// No usable temperature; write the safety duty
    Fallback { speed: u8, reason: String },
}

/// A fan update computed from the current strategy
#[derive(Debug, Clone, PartialEq)]
pub struct FanUpdate {
    pub strategy: String,
    pub temperature: f64,
    pub moving_average: f64,
    pub effective: f64,
    /// Duty read off the curve before ramp limiting
    pub target: u8,
    /// Duty to write
    pub speed: u8,
    /// Critical temperature reached; smoothing and ramp were bypassed
    pub critical: bool,
}

/// Temperatures reported by `print all`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TemperatureReport {
    pub temperature: Option<f64>,
    pub moving_average: Option<f64>,
    pub effective: Option<f64>,
}

/// Shared controller state
#[derive(Debug)]
pub struct RuntimeState {
    store: StrategyStore,
    overridden: Option<Arc<Strategy>>,
    active: bool,
    current_speed: u8,
    /// Whether `current_speed` is what the hardware runs at (ramp origin)
    speed_applied: bool,
    history: TemperatureHistory,
    tick_counter: u64,
    power: PowerSource,
    last_temperature: Option<f64>,
}

impl RuntimeState {
    pub fn new(store: StrategyStore) -> Self {
        Self {
            store,
            overridden: None,
            active: true,
            current_speed: 0,
            speed_applied: false,
            history: TemperatureHistory::new(),
            tick_counter: 0,
            power: PowerSource::default(),
            last_temperature: None,
        }
    }

    pub fn store(&self) -> &StrategyStore {
        &self.store
    }

    pub fn configuration(&self) -> &ConfigData {
        self.store.data()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn current_speed(&self) -> u8 {
        self.current_speed
    }

    pub fn power(&self) -> PowerSource {
        self.power
    }

    pub fn tick_counter(&self) -> u64 {
        self.tick_counter
    }

    pub fn overridden(&self) -> Option<&Arc<Strategy>> {
        self.overridden.as_ref()
    }

    /// True when no override is set (automatic AC/battery selection)
    pub fn is_default(&self) -> bool {
        self.overridden.is_none()
    }

    pub fn current_strategy(&self) -> Result<Arc<Strategy>> {
        self.store.resolve(self.overridden.as_ref(), self.power)
    }

    /// Force `name` as the active strategy
    ///
    /// The reserved `defaultStrategy` token clears the override instead.
    pub fn set_override(&mut self, name: &str) -> Result<Arc<Strategy>> {
        if name == DEFAULT_STRATEGY_TOKEN {
            return self.clear_override();
        }
        let strategy = self.store.get(name)?;
        self.overridden = Some(Arc::clone(&strategy));
        self.tick_counter = 0;
        info!(strategy = %strategy.name, "Strategy override set");
        Ok(strategy)
    }

    /// Go back to automatic strategy selection
    pub fn clear_override(&mut self) -> Result<Arc<Strategy>> {
        if self.overridden.take().is_some() {
            info!("Strategy override cleared");
        }
        self.tick_counter = 0;
        self.current_strategy()
    }

    /// Stop driving the fan. Returns `false` if already paused.
    pub fn pause(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;
        self.speed_applied = false;
        true
    }

    /// Start driving the fan again. Returns `false` if already active.
    pub fn resume(&mut self) -> bool {
        if self.active {
            return false;
        }
        self.active = true;
        true
    }

    /// Record the power source; returns `true` when it changed
    ///
    /// Without an override a change switches strategy, so the counter is reset
    /// and the new strategy is evaluated right away.
    pub fn observe_power(&mut self, power: PowerSource) -> bool {
        if power == self.power {
            return false;
        }
        debug!(from = ?self.power, to = ?power, "Power source changed");
        self.power = power;
        if self.overridden.is_none() {
            self.tick_counter = 0;
        }
        true
    }

    /// Decide what this tick does
    ///
    /// `reading` is the hottest valid temperature, or the error the sensor
    /// returned. `power` is `None` when the power source could not be read;
    /// the last known source is kept then. An `InvalidStrategy` error here
    /// means the configuration no longer names a usable strategy and is fatal
    /// for the loop.
    pub fn plan_tick(&mut self, reading: Result<f64>, power: Option<PowerSource>) -> Result<TickPlan> {
        if !self.active {
            return Ok(TickPlan::Paused);
        }
        if let Some(power) = power {
            self.observe_power(power);
        }

        let temperature = match reading {
            Ok(t) if t.is_finite() && t > 0.0 => t,
            Ok(t) => {
                return Ok(self.fallback(FanctlError::SafetyFallback(format!(
                    "sensor reported {}",
                    t
                ))))
            }
            Err(e) => return Ok(self.fallback(e)),
        };

        self.history.push(temperature);
        self.last_temperature = Some(temperature);

        let strategy = self.current_strategy()?;
        let period = u64::from(strategy.fan_update_period.max(1));

        let plan = if self.tick_counter % period == 0 {
            self.tick_counter = 0;
            TickPlan::Update(self.compute_update(&strategy, temperature))
        } else {
            TickPlan::Hold
        };

        self.tick_counter += 1;
        Ok(plan)
    }

    fn compute_update(&self, strategy: &Strategy, temperature: f64) -> FanUpdate {
        let window = strategy.moving_average_window as usize;
        let critical = strategy.is_critical(temperature);
        let moving_average = self.history.moving_average(window, temperature);
        let effective =
            self.history
                .effective_temperature(temperature, window, strategy.critical_temperature);
        let target = evaluate(&strategy.curve, effective);

        let speed = match (&strategy.ramp, critical, self.speed_applied) {
            (Some(ramp), false, true) => ramp.limit(self.current_speed, target),
            _ => target,
        };

        FanUpdate {
            strategy: strategy.name.clone(),
            temperature,
            moving_average,
            effective,
            target,
            speed,
            critical,
        }
    }

    fn fallback(&mut self, cause: FanctlError) -> TickPlan {
        // next valid reading is evaluated immediately
        self.tick_counter = 0;
        TickPlan::Fallback {
            speed: duty::SAFETY_FALLBACK,
            reason: cause.to_string(),
        }
    }

    /// Commit a duty that was written to the hardware
    pub fn record_applied(&mut self, speed: u8) {
        self.current_speed = speed;
        self.speed_applied = true;
    }

    /// Make the next tick evaluate the curve again (after a failed write)
    pub fn request_update(&mut self) {
        self.tick_counter = 0;
    }

    /// Temperatures as seen by the active strategy
    pub fn temperature_report(&self, strategy: &Strategy) -> TemperatureReport {
        match self.last_temperature {
            None => TemperatureReport::default(),
            Some(t) => {
                let window = strategy.moving_average_window as usize;
                TemperatureReport {
                    temperature: Some(t),
                    moving_average: Some(self.history.moving_average(window, t)),
                    effective: Some(self.history.effective_temperature(
                        t,
                        window,
                        strategy.critical_temperature,
                    )),
                }
            }
        }
    }

    /// Swap in a reloaded configuration
    ///
    /// An active override is looked up again by name. If it no longer exists
    /// the error is returned and nothing changes. Otherwise the new strategy
    /// is evaluated on the next tick.
    pub fn replace_store(&mut self, store: StrategyStore) -> Result<()> {
        let overridden = match &self.overridden {
            Some(current) => Some(store.get(&current.name)?),
            None => None,
        };
        store.resolve(overridden.as_ref(), self.power)?;
        self.store = store;
        self.overridden = overridden;
        self.tick_counter = 0;
        Ok(())
    }

    /// Swap in a configuration supplied by a client
    ///
    /// An override that no longer exists is dropped; the returned message
    /// says so.
    pub fn apply_store(&mut self, store: StrategyStore) -> Option<String> {
        let mut notice = None;
        let overridden = match self.overridden.take() {
            Some(current) => match store.get(&current.name) {
                Ok(strategy) => Some(strategy),
                Err(_) => {
                    notice = Some(format!(
                        "[Warning] > Strategy '{}' is not part of the new configuration, \
                         the override has been cleared",
                        current.name
                    ));
                    None
                }
            },
            None => None,
        };
        self.store = store;
        self.overridden = overridden;
        self.tick_counter = 0;
        notice
    }

    /// Reload from `source` in one step
    pub fn reload_from(&mut self, source: &dyn ConfigStore) -> Result<Arc<Strategy>> {
        let store = StrategyStore::new(source.load()?)?;
        self.replace_store(store)?;
        info!(location = %source.location(), "Configuration reloaded");
        self.current_strategy()
    }

    /// Validate, persist and apply a client-supplied configuration
    ///
    /// Nothing changes if validation or persistence fails.
    pub fn apply_config(
        &mut self,
        target: &dyn ConfigStore,
        data: ConfigData,
    ) -> Result<(Arc<Strategy>, Option<String>)> {
        let store = StrategyStore::new(data)?;
        target.save(store.data())?;
        let notice = self.apply_store(store);
        info!(location = %target.location(), "Configuration replaced");
        Ok((self.current_strategy()?, notice))
    }
}
