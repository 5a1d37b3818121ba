//! Fan Control Loop
//!
//! One tick per second while active, one poll every five seconds while paused.
//!
//! # Locking
//! - The runtime state lock is held only to plan a tick and to commit its
//!   result, never across a hardware call.
//! - The hardware lock serializes duty writes against `pause`, so a duty
//!   planned before a pause is never written after the fan was handed back.
//!   It is always taken before the runtime state lock.
//!
//! # Safety Features
//! - **Fallback duty**: 100% whenever no valid temperature is available
//! - **Fatal strategy errors**: a configuration without a usable strategy
//!   stops the loop; the caller hands the fan back and exits
//! - **Write retries**: a failed duty write is retried on the next tick, and
//!   too many in a row stop the loop

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use fc_core::constants::{duty, timing};
use fc_core::{hottest, ConfigStore, FanUpdate, HardwareSensor, PowerSource, RuntimeState, TickPlan};
use fc_error::{FanctlError, Result};

/// Result of one tick
#[derive(Debug)]
pub enum TickOutcome {
    Paused,
    /// Sample recorded, no update due
    Held,
    Applied { speed: u8 },
    FallbackApplied { speed: u8 },
    /// Pause won the race for the hardware; nothing was written
    Skipped,
    /// The duty could not be written
    ApplyFailed(FanctlError),
}

/// State shared by the control loop and the command server
pub struct FanControlState {
    runtime: Mutex<RuntimeState>,
    hardware: Arc<dyn HardwareSensor>,
    hardware_lock: Mutex<()>,
    config_store: Arc<dyn ConfigStore>,
    /// Log per-update status at debug instead of info
    silent: bool,
    shutdown: AtomicBool,
    shutdown_notify: Notify,
}

impl FanControlState {
    pub fn new(
        runtime: RuntimeState,
        hardware: Arc<dyn HardwareSensor>,
        config_store: Arc<dyn ConfigStore>,
        silent: bool,
    ) -> Self {
        Self {
            runtime: Mutex::new(runtime),
            hardware,
            hardware_lock: Mutex::new(()),
            config_store,
            silent,
            shutdown: AtomicBool::new(false),
            shutdown_notify: Notify::new(),
        }
    }

    /// Exclusive access to the runtime state
    pub fn runtime(&self) -> MutexGuard<'_, RuntimeState> {
        self.runtime.lock()
    }

    pub fn hardware(&self) -> &dyn HardwareSensor {
        self.hardware.as_ref()
    }

    pub fn config_store(&self) -> &dyn ConfigStore {
        self.config_store.as_ref()
    }

    /// Ask the control loop and the server to stop
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.shutdown_notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Resolves once [`request_shutdown`](Self::request_shutdown) was called
    pub async fn shutdown_requested(&self) {
        while !self.is_shutting_down() {
            let notified = self.shutdown_notify.notified();
            if self.is_shutting_down() {
                break;
            }
            notified.await;
        }
    }

    /// Run one tick (blocking: talks to the hardware)
    ///
    /// An `Err` is fatal for the loop.
    pub fn tick(&self) -> Result<TickOutcome> {
        if !self.runtime().is_active() {
            return Ok(TickOutcome::Paused);
        }

        let reading = self
            .hardware
            .read_temperatures()
            .and_then(|readings| hottest(&readings));
        let power = match self.hardware.is_on_external_power() {
            Ok(on_external_power) => Some(PowerSource::from_external_power(on_external_power)),
            Err(e) => {
                debug!(error = %e, "Power source unavailable, keeping last known");
                None
            }
        };

        let plan = self.runtime().plan_tick(reading, power)?;

        let outcome = match plan {
            TickPlan::Paused => TickOutcome::Paused,
            TickPlan::Hold => TickOutcome::Held,
            TickPlan::Update(update) => {
                self.log_update(&update);
                match self.apply(update.speed) {
                    Ok(true) => TickOutcome::Applied { speed: update.speed },
                    Ok(false) => TickOutcome::Skipped,
                    Err(e) => TickOutcome::ApplyFailed(e),
                }
            }
            TickPlan::Fallback { speed, reason } => {
                warn!(speed, reason = %reason, "No valid temperature, applying safety duty");
                match self.apply(speed) {
                    Ok(true) => TickOutcome::FallbackApplied { speed },
                    Ok(false) => TickOutcome::Skipped,
                    Err(e) => TickOutcome::ApplyFailed(e),
                }
            }
        };
        Ok(outcome)
    }

    /// Write `speed` unless the loop was paused meanwhile
    fn apply(&self, speed: u8) -> Result<bool> {
        let _hardware = self.hardware_lock.lock();
        if !self.runtime().is_active() {
            return Ok(false);
        }
        match self.hardware.set_fan_duty(speed) {
            Ok(()) => {
                self.runtime().record_applied(speed);
                Ok(true)
            }
            Err(e) => {
                self.runtime().request_update();
                Err(e)
            }
        }
    }

    fn log_update(&self, update: &FanUpdate) {
        if self.silent {
            debug!(
                strategy = %update.strategy,
                speed = update.speed,
                temp = update.temperature,
                moving_average_temp = update.moving_average,
                effective_temp = update.effective,
                "Fan update"
            );
        } else {
            info!(
                strategy = %update.strategy,
                speed = update.speed,
                temp = update.temperature,
                moving_average_temp = update.moving_average,
                effective_temp = update.effective,
                "Fan update"
            );
        }
        if update.critical {
            warn!(temp = update.temperature, "Critical temperature reached, smoothing bypassed");
        }
    }

    /// Stop driving the fan and hand it to the hardware's automatic control
    ///
    /// Returns `false` when already paused. The pause is only committed once
    /// the hardware accepted the hand-back; on failure the loop keeps driving.
    pub fn pause(&self) -> Result<bool> {
        let _hardware = self.hardware_lock.lock();
        if !self.runtime().is_active() {
            return Ok(false);
        }
        self.hardware.enable_auto_control()?;
        self.runtime().pause();
        info!("Service paused, hardware fan control takes over");
        Ok(true)
    }

    /// Take the fan back from the hardware and restart driving it
    ///
    /// Returns `false` when already active.
    pub fn resume(&self) -> Result<bool> {
        let _hardware = self.hardware_lock.lock();
        if self.runtime().is_active() {
            return Ok(false);
        }
        self.hardware.resume_manual_control()?;
        self.runtime().resume();
        info!("Service resumed");
        Ok(true)
    }

    /// Hand the fan back to the hardware on the way out
    pub fn release_hardware(&self) {
        let _hardware = self.hardware_lock.lock();
        self.runtime().pause();
        match self.hardware.enable_auto_control() {
            Ok(()) => info!("Fan handed back to automatic control"),
            Err(e) => error!(error = %e, "Failed to restore automatic fan control"),
        }
    }
}

/// Drive the fan until shutdown or a fatal error
pub async fn run_control_loop(state: Arc<FanControlState>) -> Result<()> {
    info!(hardware = state.hardware().name(), "Fan control loop starting");

    let mut consecutive_apply_errors: u32 = 0;

    loop {
        if state.is_shutting_down() {
            info!("Fan control loop shutting down");
            break;
        }

        let tick_state = Arc::clone(&state);
        let outcome = tokio::task::spawn_blocking(move || tick_state.tick())
            .await
            .map_err(|e| FanctlError::generic(format!("control tick aborted: {}", e)))?;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(kind = e.kind(), error = %e, "Fatal error in the control loop");
                return Err(e);
            }
        };

        let period = match outcome {
            TickOutcome::Paused => timing::PAUSED_POLL_PERIOD,
            TickOutcome::ApplyFailed(e) => {
                consecutive_apply_errors += 1;
                warn!(
                    count = consecutive_apply_errors,
                    error = %e,
                    "Failed to write fan duty, retrying on next tick"
                );
                if consecutive_apply_errors >= duty::MAX_CONSECUTIVE_APPLY_ERRORS {
                    error!("Too many consecutive fan duty failures");
                    return Err(e);
                }
                timing::TICK_PERIOD
            }
            _ => {
                if consecutive_apply_errors > 0 {
                    debug!(errors = consecutive_apply_errors, "Fan duty writes recovered");
                    consecutive_apply_errors = 0;
                }
                timing::TICK_PERIOD
            }
        };

        sleep_or_shutdown(&state, period).await;
    }

    info!("Fan control loop stopped");
    Ok(())
}

async fn sleep_or_shutdown(state: &FanControlState, period: Duration) {
    tokio::select! {
        _ = tokio::time::sleep(period) => {}
        _ = state.shutdown_requested() => {}
    }
}
