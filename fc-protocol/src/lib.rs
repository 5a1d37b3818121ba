//! Control-channel contract shared by the fanctl CLI and the fanctld daemon.
//!
//! A request is one line of shell-style tokens (`use lazy`, `print all`,
//! `--output-format json pause`). Both the CLI and the daemon turn those
//! tokens into the same [`Invocation`] through [`CommandParser`], so the
//! dispatcher only ever sees a normalized [`Command`]. The reply is a
//! [`Reply`] rendered either as human-readable text or as one JSON object.

mod parser;
mod response;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use parser::{join_request, CommandParser, DEFAULT_STRATEGY_TOKEN};
pub use response::{is_error_payload, CommandResult, Reply, Response, ERROR_MARKER};

/// Maximum size of a single request or response (8KB)
pub const MAX_MESSAGE_SIZE: usize = 8 * 1024;

/// Default location of the persisted configuration
pub const DEFAULT_CONFIG_PATH: &str = "/etc/fanctl/config.json";

/// Default Unix socket path for the command channel
pub const DEFAULT_SOCKET_PATH: &str = "/run/fanctl/fanctl.sock";

/// Default loopback address when the TCP transport is selected
pub const DEFAULT_TCP_ADDRESS: &str = "127.0.0.1:26565";

/// Environment variable overriding the Unix socket path on both ends
pub const SOCKET_PATH_ENV: &str = "FANCTL_SOCKET";

/// How a command result is rendered for the client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    #[value(alias = "NATURAL")]
    Natural,
    #[value(alias = "JSON")]
    Json,
}

/// Transport used between the CLI and the daemon
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    #[default]
    Unix,
    Tcp,
}

impl TransportKind {
    /// Address used when none was given on the command line
    pub fn default_address(&self) -> String {
        match self {
            TransportKind::Unix => {
                std::env::var(SOCKET_PATH_ENV).unwrap_or_else(|_| DEFAULT_SOCKET_PATH.to_string())
            }
            TransportKind::Tcp => DEFAULT_TCP_ADDRESS.to_string(),
        }
    }
}

/// Hardware backend driving temperature reads and fan duty
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum HardwareBackend {
    #[default]
    Ectool,
    Hwmon,
}

/// What `print` reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PrintSelection {
    #[default]
    All,
    Active,
    Current,
    List,
    Speed,
}

/// Options of the `run` command (daemon startup)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Strategy forced at startup (override)
    pub strategy: Option<String>,
    pub config_path: PathBuf,
    /// Log the per-tick status line at debug instead of info
    pub silent: bool,
    pub hardware: HardwareBackend,
    /// Ignore battery temperature sensors (ectool backend)
    pub no_battery_sensors: bool,
    /// PWM control file (hwmon backend)
    pub pwm_path: Option<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            strategy: None,
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            silent: false,
            hardware: HardwareBackend::default(),
            no_battery_sensors: false,
            pwm_path: None,
        }
    }
}

/// A normalized command, independent of the syntax it was written in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run(RunOptions),
    Use { strategy: String },
    Reset,
    Reload,
    Pause,
    Resume,
    Print(PrintSelection),
    SetConfig { config: String },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Run(_) => "run",
            Command::Use { .. } => "use",
            Command::Reset => "reset",
            Command::Reload => "reload",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Print(_) => "print",
            Command::SetConfig { .. } => "set_config",
        }
    }

    /// Whether the command changes daemon state
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Command::Print(_))
    }
}

/// A parsed request: the command plus the global options that came with it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: Command,
    pub output_format: OutputFormat,
    pub transport: TransportKind,
    /// Socket path or `host:port`; `None` means the transport default
    pub address: Option<String>,
    /// Parser warnings to show the user alongside the result
    pub diagnostics: Vec<String>,
}

impl Invocation {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            output_format: OutputFormat::default(),
            transport: TransportKind::default(),
            address: None,
            diagnostics: Vec::new(),
        }
    }

    /// Address to connect to or listen on
    pub fn resolved_address(&self) -> String {
        self.address
            .clone()
            .unwrap_or_else(|| self.transport.default_address())
    }
}
