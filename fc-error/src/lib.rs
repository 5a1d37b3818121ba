//! Unified error handling for fanctl
//!
//! A single error type shared by the protocol, core, daemon and CLI crates.
//! Command-level failures (`InvalidStrategy`, `ConfigParse`, `UnknownCommand`)
//! are rendered back to the client; hardware failures are handled by the
//! control loop itself.

use std::io;
use std::path::PathBuf;

/// Result type alias using FanctlError
pub type Result<T> = std::result::Result<T, FanctlError>;

/// Unified error type for all fanctl operations
#[derive(thiserror::Error, Debug)]
pub enum FanctlError {
    // ============================================================================
    // Strategy and Configuration Errors
    // ============================================================================
    #[error("The specified strategy is invalid: {0}")]
    InvalidStrategy(String),

    #[error("Config could not be parsed: {0}")]
    ConfigParse(String),

    // ============================================================================
    // Command Errors
    // ============================================================================
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    // ============================================================================
    // Hardware Errors
    // ============================================================================
    #[error("Hardware {operation} failed: {reason}")]
    HardwareIo {
        operation: &'static str,
        reason: String,
    },

    #[error("No valid temperature reading: {0}")]
    SafetyFallback(String),

    // ============================================================================
    // I/O and File System Errors
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Control Channel Errors
    // ============================================================================
    #[error("IPC protocol error: {0}")]
    IpcProtocol(String),

    #[error("Message too large: {size} bytes (max {max_size} bytes)")]
    MessageTooLarge {
        size: usize,
        max_size: usize,
    },

    #[error("Daemon connection failed: {0}")]
    DaemonConnection(String),

    #[error("{0}")]
    Generic(String),
}

impl FanctlError {
    /// Create a generic error from a string
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }

    /// Create a configuration parse/validation error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigParse(msg.into())
    }

    /// Create a hardware error for the named collaborator call
    pub fn hardware(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::HardwareIo {
            operation,
            reason: reason.into(),
        }
    }

    /// Short stable name of the error kind, used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidStrategy(_) => "invalid_strategy",
            Self::ConfigParse(_) | Self::JsonParse(_) => "config_parse",
            Self::UnknownCommand(_) => "unknown_command",
            Self::HardwareIo { .. } => "hardware_io",
            Self::SafetyFallback(_) => "safety_fallback",
            Self::Io(_) | Self::FileRead { .. } | Self::FileWrite { .. } => "io",
            Self::IpcProtocol(_) | Self::MessageTooLarge { .. } => "ipc_protocol",
            Self::DaemonConnection(_) => "daemon_connection",
            Self::Generic(_) => "generic",
        }
    }

    /// Whether the error was caused by the request rather than the daemon
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidStrategy(_)
                | Self::ConfigParse(_)
                | Self::JsonParse(_)
                | Self::UnknownCommand(_)
                | Self::IpcProtocol(_)
                | Self::MessageTooLarge { .. }
        )
    }
}

impl From<String> for FanctlError {
    fn from(s: String) -> Self {
        Self::Generic(s)
    }
}

impl From<&str> for FanctlError {
    fn from(s: &str) -> Self {
        Self::Generic(s.to_string())
    }
}
