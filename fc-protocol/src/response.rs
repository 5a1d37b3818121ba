//! Command results and their two renderings
//!
//! The natural rendering is what a person reads in a terminal; the JSON
//! rendering is one object with a `status` field. Errors always start with
//! [`ERROR_MARKER`] in the natural form so a client can detect them without
//! parsing the body.

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::OutputFormat;

/// Prefix of every natural-format error payload
pub const ERROR_MARKER: &str = "[Error] > ";

/// Successful outcome of a dispatched command
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CommandResult {
    StrategyChange {
        strategy: String,
        default: bool,
    },
    StrategyReset {
        strategy: String,
        default: bool,
    },
    Reload {
        strategy: String,
        default: bool,
    },
    ServicePause {},
    ServiceResume {
        strategy: String,
    },
    PrintCurrent {
        strategy: String,
        default: bool,
    },
    PrintList {
        strategies: Vec<String>,
    },
    PrintSpeed {
        speed: u8,
    },
    PrintActive {
        active: bool,
    },
    Status {
        strategy: String,
        default: bool,
        speed: u8,
        temperature: Option<f64>,
        #[serde(rename = "movingAverageTemperature")]
        moving_average_temperature: Option<f64>,
        #[serde(rename = "effectiveTemperature")]
        effective_temperature: Option<f64>,
        active: bool,
        configuration: Value,
    },
    SetConfiguration {
        strategy: String,
        default: bool,
        configuration: Value,
    },
}

impl CommandResult {
    /// Human-readable rendering
    pub fn natural(&self) -> String {
        match self {
            CommandResult::StrategyChange { strategy, default } => {
                format!("Strategy in use: '{}'\nDefault: {}", strategy, default)
            }
            CommandResult::StrategyReset { strategy, .. } => {
                format!("Strategy reset to default! Strategy in use: '{}'", strategy)
            }
            CommandResult::Reload { strategy, .. } => {
                format!("Reloaded with success! Strategy in use: '{}'", strategy)
            }
            CommandResult::ServicePause {} => {
                "Service paused! The hardware fan control will take over".to_string()
            }
            CommandResult::ServiceResume { strategy } => {
                format!("Service resumed! Strategy in use: '{}'", strategy)
            }
            CommandResult::PrintCurrent { strategy, .. } => {
                format!("Strategy in use: '{}'", strategy)
            }
            CommandResult::PrintList { strategies } => {
                let mut out = String::from("Strategy list:");
                for name in strategies {
                    out.push_str("\n- ");
                    out.push_str(name);
                }
                out
            }
            CommandResult::PrintSpeed { speed } => format!("Current fan speed: '{}%'", speed),
            CommandResult::PrintActive { active } => format!("Active: {}", active),
            CommandResult::Status {
                strategy,
                default,
                speed,
                temperature,
                moving_average_temperature,
                effective_temperature,
                active,
                configuration,
            } => {
                let lines = [
                    format!("Strategy: '{}'", strategy),
                    format!("Default: {}", default),
                    format!("Speed: {}%", speed),
                    format!("Temp: {}", format_temperature(*temperature)),
                    format!("MovingAverageTemp: {}", format_temperature(*moving_average_temperature)),
                    format!("EffectiveTemp: {}", format_temperature(*effective_temperature)),
                    format!("Active: {}", active),
                    format!("DefaultStrategy: '{}'", config_str(configuration, "defaultStrategy")),
                    format!(
                        "DischargingStrategy: '{}'",
                        config_str(configuration, "strategyOnDischarging")
                    ),
                ];
                lines.join("\n")
            }
            CommandResult::SetConfiguration {
                strategy,
                default,
                configuration,
            } => format!(
                "Configuration updated with success: {}.\nStrategy in use: {}\nDefault: {}",
                configuration, strategy, default
            ),
        }
    }
}

fn format_temperature(value: Option<f64>) -> String {
    match value {
        Some(t) => format!("{}°C", t),
        None => "n/a".to_string(),
    }
}

fn config_str<'a>(configuration: &'a Value, key: &str) -> &'a str {
    configuration.get(key).and_then(Value::as_str).unwrap_or("")
}

/// Outcome of a request
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Success(CommandResult),
    Error { reason: String },
}

impl Response {
    pub fn error(reason: impl Into<String>) -> Self {
        Response::Error {
            reason: reason.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error { .. })
    }
}

impl From<CommandResult> for Response {
    fn from(result: CommandResult) -> Self {
        Response::Success(result)
    }
}

/// A response plus the diagnostics gathered while handling the request
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub response: Response,
    pub diagnostics: Vec<String>,
}

impl Reply {
    pub fn new(response: Response) -> Self {
        Self {
            response,
            diagnostics: Vec::new(),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Vec<String>) -> Self {
        self.diagnostics.extend(diagnostics);
        self
    }

    pub fn render(&self, format: OutputFormat) -> String {
        match format {
            OutputFormat::Natural => self.render_natural(),
            OutputFormat::Json => self.render_json(),
        }
    }

    fn render_natural(&self) -> String {
        let body = match &self.response {
            Response::Success(result) => result.natural(),
            Response::Error { reason } => {
                format!("{}An error occurred: {}", ERROR_MARKER, reason)
            }
        };

        if self.diagnostics.is_empty() {
            return body;
        }
        // Errors keep the marker at the very start of the payload
        if self.response.is_error() {
            return format!("{}\n{}", body, self.diagnostics.join("\n"));
        }
        format!("{}\n{}", self.diagnostics.join("\n"), body)
    }

    fn render_json(&self) -> String {
        let mut object = match &self.response {
            Response::Success(result) => match serde_json::to_value(result) {
                Ok(Value::Object(map)) => map,
                Ok(_) | Err(_) => Map::new(),
            },
            Response::Error { reason } => {
                let mut map = Map::new();
                map.insert("reason".into(), json!(reason));
                map
            }
        };

        let status = if self.response.is_error() { "error" } else { "success" };
        object.insert("status".into(), json!(status));
        if !self.diagnostics.is_empty() {
            object.insert("info".into(), json!(self.diagnostics.join("\n")));
        }

        serde_json::to_string(&Value::Object(object)).unwrap_or_else(|_| {
            r#"{"status":"error","reason":"Serialization error"}"#.to_string()
        })
    }
}

/// Whether a raw payload received from the daemon reports a failure
pub fn is_error_payload(payload: &str) -> bool {
    let trimmed = payload.trim_start();
    if trimmed.starts_with(ERROR_MARKER) {
        return true;
    }
    if trimmed.starts_with('{') {
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            return value.get("status").and_then(Value::as_str) == Some("error");
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status() -> CommandResult {
        CommandResult::Status {
            strategy: "lazy".into(),
            default: true,
            speed: 42,
            temperature: Some(61.0),
            moving_average_temperature: Some(58.3),
            effective_temperature: Some(58.3),
            active: true,
            configuration: json!({"defaultStrategy": "lazy", "strategyOnDischarging": ""}),
        }
    }

    #[test]
    fn test_status_json_projection() {
        let rendered = Reply::new(status().into()).render(OutputFormat::Json);
        let value: Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["strategy"], "lazy");
        assert_eq!(value["default"], true);
        assert_eq!(value["speed"], 42);
        assert_eq!(value["temperature"], 61.0);
        assert_eq!(value["movingAverageTemperature"], 58.3);
        assert_eq!(value["effectiveTemperature"], 58.3);
        assert_eq!(value["configuration"]["defaultStrategy"], "lazy");
        assert!(value.get("info").is_none());
    }

    #[test]
    fn test_status_natural() {
        let text = status().natural();
        assert!(text.starts_with("Strategy: 'lazy'"));
        assert!(text.contains("Speed: 42%"));
        assert!(text.contains("MovingAverageTemp: 58.3°C"));
        assert!(text.contains("DischargingStrategy: ''"));
    }

    #[test]
    fn test_pause_renders_as_empty_object() {
        let rendered = Reply::new(CommandResult::ServicePause {}.into()).render(OutputFormat::Json);
        assert_eq!(rendered, r#"{"status":"success"}"#);
    }

    #[test]
    fn test_error_payloads_are_detectable() {
        let reply = Reply::new(Response::error("The specified strategy is invalid: turbo"));
        let natural = reply.render(OutputFormat::Natural);
        assert!(natural.starts_with(ERROR_MARKER));
        assert!(is_error_payload(&natural));

        let json = reply.render(OutputFormat::Json);
        assert!(is_error_payload(&json));
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["reason"], "The specified strategy is invalid: turbo");

        assert!(!is_error_payload("Strategy in use: 'lazy'"));
        assert!(!is_error_payload(r#"{"status":"success"}"#));
    }

    #[test]
    fn test_diagnostics_placement() {
        let reply = Reply::new(CommandResult::PrintActive { active: false }.into())
            .with_diagnostics(vec!["[Warning] > deprecated".into()]);
        assert_eq!(
            reply.render(OutputFormat::Natural),
            "[Warning] > deprecated\nActive: false"
        );
        let value: Value = serde_json::from_str(&reply.render(OutputFormat::Json)).unwrap();
        assert_eq!(value["info"], "[Warning] > deprecated");
        assert_eq!(value["active"], false);
    }

    #[test]
    fn test_strategy_list() {
        let result = CommandResult::PrintList {
            strategies: vec!["agile".into(), "lazy".into()],
        };
        assert_eq!(result.natural(), "Strategy list:\n- agile\n- lazy");
    }
}
