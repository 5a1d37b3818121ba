//! Command line front-ends
//!
//! Two syntaxes are accepted and both produce an [`Invocation`]:
//!
//! - the subcommand syntax (`fanctl use lazy`, `fanctl print list`)
//! - the older flag syntax (`fanctl lazy`, `fanctl --query`, `fanctl --run`)
//!
//! The flag syntax is tried first; anything it does not fully understand
//! falls through to the subcommand parser, whose errors are the ones shown.

use clap::error::ErrorKind;
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

use fc_error::{FanctlError, Result};

use crate::{
    Command, HardwareBackend, Invocation, OutputFormat, PrintSelection, RunOptions,
    TransportKind, DEFAULT_CONFIG_PATH,
};

/// `use` argument that clears the override instead of naming a strategy
pub const DEFAULT_STRATEGY_TOKEN: &str = "defaultStrategy";

const SUBCOMMAND_NAMES: &[&str] = &[
    "run",
    "use",
    "reload",
    "reset",
    "pause",
    "resume",
    "print",
    "set_config",
];

const LEGACY_DEPRECATION_WARNING: &str = "[Warning] > this command is deprecated and will be removed soon, please use the new command format instead ('fanctl -h' for more details).";

#[derive(Parser, Debug)]
#[command(name = "fanctl")]
#[command(version)]
#[command(about = "Control a laptop's fan(s) with a temperature/speed curve")]
#[command(after_help = "Obtain more help about a command using `fanctl <command> -h/--help`")]
struct Cli {
    /// Transport used between the CLI and the service
    #[arg(long = "socket-controller", visible_alias = "sc", value_enum, default_value_t = TransportKind::Unix, global = true)]
    socket_controller: TransportKind,

    /// Socket path (unix) or host:port (tcp) of the service
    #[arg(long, global = true)]
    address: Option<String>,

    /// Output format of the command result
    #[arg(long = "output-format", value_enum, default_value_t = OutputFormat::Natural, global = true)]
    output_format: OutputFormat,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Run the service
    Run(RunArgs),
    /// Change the current strategy
    Use {
        /// Name of the strategy to use, e.g. "lazy" (`print list` shows them)
        strategy: String,
    },
    /// Reset to the default strategy
    Reset,
    /// Reload the configuration file
    Reload,
    /// Pause the service; the hardware takes over fan control
    Pause,
    /// Resume the service
    Resume,
    /// Print the selected information
    Print {
        #[arg(value_enum, default_value_t = PrintSelection::All)]
        selection: PrintSelection,
    },
    /// Replace the service configuration with the provided one
    #[command(name = "set_config")]
    SetConfig {
        /// Must be a valid JSON configuration
        provided_config: String,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Strategy to force at startup, e.g. "lazy"
    strategy: Option<String>,

    /// Configuration file path
    #[arg(long, short = 'c', default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Do not log the speed/temperature status on every tick
    #[arg(long, short = 's')]
    silent: bool,

    /// Backend used to read temperatures and set the fan duty
    #[arg(long = "hardware-controller", visible_alias = "hc", value_enum, default_value_t = HardwareBackend::Ectool)]
    hardware_controller: HardwareBackend,

    /// Ignore battery temperature sensors
    #[arg(long = "no-battery-sensors")]
    no_battery_sensors: bool,

    /// PWM control file driven by the hwmon backend
    #[arg(long = "pwm-path")]
    pwm_path: Option<PathBuf>,
}

#[derive(Parser, Debug)]
#[command(name = "fanctl", disable_help_flag = true, disable_version_flag = true)]
struct LegacyCli {
    #[arg(value_parser = not_a_subcommand)]
    positional_strategy: Option<String>,

    #[arg(long)]
    strategy: Option<String>,

    #[arg(long)]
    run: bool,

    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[arg(long = "no-log")]
    no_log: bool,

    #[arg(long, short = 'q')]
    query: bool,

    #[arg(long = "list-strategies")]
    list_strategies: bool,

    #[arg(long, short = 'r')]
    reload: bool,

    #[arg(long)]
    pause: bool,

    #[arg(long)]
    resume: bool,

    #[arg(long = "hardware-controller", visible_alias = "hc", value_enum, default_value_t = HardwareBackend::Ectool)]
    hardware_controller: HardwareBackend,

    #[arg(long = "socket-controller", visible_alias = "sc", value_enum, default_value_t = TransportKind::Unix)]
    socket_controller: TransportKind,

    #[arg(long)]
    address: Option<String>,
}

fn not_a_subcommand(value: &str) -> std::result::Result<String, String> {
    if SUBCOMMAND_NAMES.contains(&value) {
        return Err(format!("{} is an excluded value", value));
    }
    Ok(value.to_string())
}

impl LegacyCli {
    /// Later flags win, in the order the old tool applied them
    fn into_command(self) -> Option<Command> {
        let strategy = self.strategy.or(self.positional_strategy);

        let mut command = None;
        if self.query {
            command = Some(Command::Print(PrintSelection::Current));
        }
        if self.list_strategies {
            command = Some(Command::Print(PrintSelection::List));
        }
        if self.resume {
            command = Some(Command::Resume);
        }
        if self.pause {
            command = Some(Command::Pause);
        }
        if self.reload {
            command = Some(Command::Reload);
        }
        if self.run {
            command = Some(Command::Run(RunOptions {
                strategy: strategy.clone(),
                config_path: self.config,
                silent: self.no_log,
                hardware: self.hardware_controller,
                ..RunOptions::default()
            }));
        }

        match (command, strategy) {
            (Some(command), _) => Some(command),
            (None, Some(strategy)) => Some(Command::Use { strategy }),
            (None, None) => None,
        }
    }
}

impl CliCommand {
    fn into_command(self) -> Command {
        match self {
            CliCommand::Run(args) => Command::Run(RunOptions {
                strategy: args.strategy,
                config_path: args.config,
                silent: args.silent,
                hardware: args.hardware_controller,
                no_battery_sensors: args.no_battery_sensors,
                pwm_path: args.pwm_path,
            }),
            CliCommand::Use { strategy } => Command::Use { strategy },
            CliCommand::Reset => Command::Reset,
            CliCommand::Reload => Command::Reload,
            CliCommand::Pause => Command::Pause,
            CliCommand::Resume => Command::Resume,
            CliCommand::Print { selection } => Command::Print(selection),
            CliCommand::SetConfig { provided_config } => Command::SetConfig {
                config: provided_config,
            },
        }
    }
}

/// Parses command tokens into an [`Invocation`]
///
/// The remote flavour is used by the daemon for requests coming from the
/// control channel and refuses `run`.
#[derive(Debug, Clone, Copy)]
pub struct CommandParser {
    remote: bool,
}

impl CommandParser {
    /// Parser for the process's own command line
    pub fn local() -> Self {
        Self { remote: false }
    }

    /// Parser for requests received over the control channel
    pub fn remote() -> Self {
        Self { remote: true }
    }

    /// Parse tokens, without the program name
    pub fn parse_args<I, T>(&self, args: I) -> std::result::Result<Invocation, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let tokens: Vec<String> = std::iter::once("fanctl".to_string())
            .chain(args.into_iter().map(Into::into))
            .collect();

        if let Some(invocation) = self.parse_legacy(&tokens) {
            return invocation;
        }

        let cli = Cli::try_parse_from(&tokens)?;
        let command = cli.command.into_command();
        if self.remote && matches!(command, Command::Run(_)) {
            return Err(run_not_available());
        }

        Ok(Invocation {
            command,
            output_format: cli.output_format,
            transport: cli.socket_controller,
            address: cli.address,
            diagnostics: Vec::new(),
        })
    }

    /// Parse one raw request line received over the control channel
    pub fn parse_line(&self, line: &str) -> Result<Invocation> {
        let tokens = shlex::split(line.trim())
            .ok_or_else(|| FanctlError::IpcProtocol("Unbalanced quotes in request".into()))?;

        self.parse_args(tokens).map_err(|e| {
            let rendered = e.render().to_string();
            FanctlError::UnknownCommand(rendered.trim().to_string())
        })
    }

    fn parse_legacy(
        &self,
        tokens: &[String],
    ) -> Option<std::result::Result<Invocation, clap::Error>> {
        let legacy = LegacyCli::try_parse_from(tokens).ok()?;
        let transport = legacy.socket_controller;
        let address = legacy.address.clone();
        let command = legacy.into_command()?;

        let is_run = matches!(command, Command::Run(_));
        if self.remote && is_run {
            return Some(Err(run_not_available()));
        }

        let mut invocation = Invocation::new(command);
        invocation.transport = transport;
        invocation.address = address;
        if self.remote || is_run {
            invocation
                .diagnostics
                .push(LEGACY_DEPRECATION_WARNING.to_string());
        }
        Some(Ok(invocation))
    }
}

fn run_not_available() -> clap::Error {
    Cli::command().error(
        ErrorKind::InvalidSubcommand,
        "the 'run' command can only be used to start the service locally",
    )
}

/// Join a command line into one request line with POSIX shell quoting
pub fn join_request<'a, I>(args: I) -> Result<String>
where
    I: IntoIterator<Item = &'a str>,
{
    shlex::try_join(args)
        .map_err(|e| FanctlError::IpcProtocol(format!("Cannot quote request: {}", e)))
}
