//! Command dispatch
//!
//! Turns a parsed [`Command`] into a [`CommandResult`]. Every command works on
//! the runtime state under its lock; `pause` and `resume` additionally go
//! through the hardware lock so they cannot interleave with a duty write.

use fc_core::ConfigData;
use fc_error::{FanctlError, Result};
use fc_protocol::{Command, CommandResult, PrintSelection, DEFAULT_STRATEGY_TOKEN};

use crate::fan_control::FanControlState;

/// A successful dispatch plus any notes for the client
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    pub result: CommandResult,
    pub diagnostics: Vec<String>,
}

impl From<CommandResult> for Dispatched {
    fn from(result: CommandResult) -> Self {
        Self {
            result,
            diagnostics: Vec::new(),
        }
    }
}

/// Execute `command` against the shared state
pub fn dispatch(state: &FanControlState, command: &Command) -> Result<Dispatched> {
    match command {
        Command::Run(_) => Err(FanctlError::UnknownCommand(
            "'run' starts the service and cannot be sent to it".to_string(),
        )),

        Command::Use { strategy } if strategy.as_str() == DEFAULT_STRATEGY_TOKEN => reset(state),

        Command::Use { strategy } => {
            let mut runtime = state.runtime();
            let active = runtime.set_override(strategy)?;
            Ok(CommandResult::StrategyChange {
                strategy: active.name.clone(),
                default: runtime.is_default(),
            }
            .into())
        }

        Command::Reset => reset(state),

        Command::Reload => {
            let mut runtime = state.runtime();
            let active = runtime.reload_from(state.config_store())?;
            Ok(CommandResult::Reload {
                strategy: active.name.clone(),
                default: runtime.is_default(),
            }
            .into())
        }

        Command::Pause => {
            state.pause()?;
            Ok(CommandResult::ServicePause {}.into())
        }

        Command::Resume => {
            state.resume()?;
            let active = state.runtime().current_strategy()?;
            Ok(CommandResult::ServiceResume {
                strategy: active.name.clone(),
            }
            .into())
        }

        Command::Print(selection) => print(state, *selection),

        Command::SetConfig { config } => {
            let data = ConfigData::from_json(config)?;
            let mut runtime = state.runtime();
            let (active, notice) = runtime.apply_config(state.config_store(), data)?;
            Ok(Dispatched {
                result: CommandResult::SetConfiguration {
                    strategy: active.name.clone(),
                    default: runtime.is_default(),
                    configuration: runtime.configuration().to_value(),
                },
                diagnostics: notice.into_iter().collect(),
            })
        }
    }
}

fn reset(state: &FanControlState) -> Result<Dispatched> {
    let mut runtime = state.runtime();
    let active = runtime.clear_override()?;
    Ok(CommandResult::StrategyReset {
        strategy: active.name.clone(),
        default: runtime.is_default(),
    }
    .into())
}

fn print(state: &FanControlState, selection: PrintSelection) -> Result<Dispatched> {
    let runtime = state.runtime();
    let result = match selection {
        PrintSelection::Current => CommandResult::PrintCurrent {
            strategy: runtime.current_strategy()?.name.clone(),
            default: runtime.is_default(),
        },
        PrintSelection::List => CommandResult::PrintList {
            strategies: runtime.store().names(),
        },
        PrintSelection::Speed => CommandResult::PrintSpeed {
            speed: runtime.current_speed(),
        },
        PrintSelection::Active => CommandResult::PrintActive {
            active: runtime.is_active(),
        },
        PrintSelection::All => {
            let active = runtime.current_strategy()?;
            let report = runtime.temperature_report(&active);
            CommandResult::Status {
                strategy: active.name.clone(),
                default: runtime.is_default(),
                speed: runtime.current_speed(),
                temperature: report.temperature,
                moving_average_temperature: report.moving_average,
                effective_temperature: report.effective,
                active: runtime.is_active(),
                configuration: runtime.configuration().to_value(),
            }
        }
    };
    Ok(result.into())
}
