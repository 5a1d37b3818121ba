/*
 * Integration tests for fanctl
 *
 * These tests start the service on a temporary Unix socket with a scripted
 * sensor and drive it through the same path the CLI uses.
 */

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use fc_core::HardwareSensor;
use fc_daemon::{prepare_state, serve, ControlListener, FanControlState};
use fc_error::Result;
use fc_protocol::{CommandParser, RunOptions, TransportKind, ERROR_MARKER};
use tempfile::TempDir;

const CONFIG: &str = r#"{
    "defaultStrategy": "quiet",
    "strategyOnDischarging": "",
    "strategies": {
        "quiet": {
            "speedCurve": [{"temp": 40, "speed": 10}, {"temp": 80, "speed": 90}],
            "fanSpeedUpdateFrequency": 5,
            "movingAverageInterval": 10
        }
    }
}"#;

/// Steady 60°C on AC power
struct SteadySensor {
    duties: Mutex<Vec<u8>>,
}

impl HardwareSensor for SteadySensor {
    fn name(&self) -> &'static str {
        "steady"
    }

    fn read_temperatures(&self) -> Result<Vec<f64>> {
        Ok(vec![55.0, 60.0])
    }

    fn is_on_external_power(&self) -> Result<bool> {
        Ok(true)
    }

    fn set_fan_duty(&self, percent: u8) -> Result<()> {
        self.duties.lock().unwrap().push(percent);
        Ok(())
    }

    fn enable_auto_control(&self) -> Result<()> {
        Ok(())
    }

    fn resume_manual_control(&self) -> Result<()> {
        Ok(())
    }
}

struct Service {
    _dir: TempDir,
    socket: PathBuf,
    config_path: PathBuf,
    state: Arc<FanControlState>,
    sensor: Arc<SteadySensor>,
    handle: tokio::task::JoinHandle<anyhow::Result<()>>,
}

impl Service {
    async fn start() -> Self {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.json");
        std::fs::write(&config_path, CONFIG).unwrap();
        let socket = dir.path().join("fanctl.sock");

        let options = RunOptions {
            config_path: config_path.clone(),
            ..RunOptions::default()
        };
        let sensor = Arc::new(SteadySensor {
            duties: Mutex::new(Vec::new()),
        });
        let state = prepare_state(&options, sensor.clone()).unwrap();
        let listener = ControlListener::bind(TransportKind::Unix, &socket.to_string_lossy())
            .await
            .unwrap();
        let handle = tokio::spawn(serve(state.clone(), listener));

        Service {
            _dir: dir,
            socket,
            config_path,
            state,
            sensor,
            handle,
        }
    }

    /// Run a command line the way `fanctl` does
    async fn fanctl(&self, args: &[&str]) -> fanctl::Forwarded {
        let mut args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        args.push("--address".into());
        args.push(self.socket.to_string_lossy().to_string());

        tokio::task::spawn_blocking(move || {
            let invocation = CommandParser::local().parse_args(args.iter().cloned()).unwrap();
            fanctl::forward(&invocation, &args).unwrap()
        })
        .await
        .unwrap()
    }

    async fn stop(self) {
        self.state.request_shutdown();
        self.handle.await.unwrap().unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_set_config_then_print_all() {
    let service = Service::start().await;

    let config = r#"{"defaultStrategy": "calm", "strategyOnDischarging": "calm",
        "strategies": {"calm": {"speedCurve": [{"temp": 30, "speed": 15}, {"temp": 90, "speed": 75}]}}}"#;
    let reply = service.fanctl(&["set_config", config]).await;
    assert!(!reply.is_error, "{}", reply.payload);
    assert!(reply.payload.contains("Configuration updated with success"));

    let reply = service.fanctl(&["print", "all"]).await;
    assert!(reply.payload.contains("DefaultStrategy: 'calm'"));
    assert!(reply.payload.contains("DischargingStrategy: 'calm'"));

    // persisted for the next start
    let saved = std::fs::read_to_string(&service.config_path).unwrap();
    assert!(saved.contains("\"calm\""));

    service.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unknown_strategy_reports_error() {
    let service = Service::start().await;

    let reply = service.fanctl(&["use", "turbo"]).await;
    assert!(reply.is_error);
    assert_eq!(reply.exit_code(), 1);
    assert!(reply.payload.starts_with(ERROR_MARKER));

    let reply = service.fanctl(&["print", "current"]).await;
    assert_eq!(reply.payload, "Strategy in use: 'quiet'");

    service.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_json_output() {
    let service = Service::start().await;

    let reply = service.fanctl(&["--output-format", "json", "use", "quiet"]).await;
    let value: serde_json::Value = serde_json::from_str(&reply.payload).unwrap();
    assert_eq!(value["status"], "success");
    assert_eq!(value["strategy"], "quiet");
    assert_eq!(value["default"], false);

    let reply = service.fanctl(&["--output-format", "json", "use", "turbo"]).await;
    assert!(reply.is_error);
    let value: serde_json::Value = serde_json::from_str(&reply.payload).unwrap();
    assert_eq!(value["status"], "error");

    service.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_legacy_syntax_warns() {
    let service = Service::start().await;

    let reply = service.fanctl(&["--query"]).await;
    assert!(!reply.is_error);
    assert!(reply.payload.starts_with("[Warning] >"));
    assert!(reply.payload.ends_with("Strategy in use: 'quiet'"));

    service.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_first_tick_drives_fan_from_hottest_sensor() {
    let service = Service::start().await;

    // the first tick runs as soon as the loop starts
    for _ in 0..50 {
        if !service.sensor.duties.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(service.sensor.duties.lock().unwrap().first(), Some(&50));

    let reply = service.fanctl(&["print", "speed"]).await;
    assert_eq!(reply.payload, "Current fan speed: '50%'");

    service.stop().await;
}
