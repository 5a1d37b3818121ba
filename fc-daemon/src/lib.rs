//! fanctl service
//!
//! Wires the pieces of a running service together: configuration store,
//! runtime state, hardware backend, the control loop and the control channel.
//! Used by the `fanctld` binary and by `fanctl run`.

pub mod dispatcher;
pub mod fan_control;
pub mod logging;
pub mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use tracing::{error, info, warn};

use fc_core::{open_sensor, ConfigStore, HardwareSensor, JsonFileStore, RuntimeState, StrategyStore};
use fc_protocol::{RunOptions, TransportKind};

pub use dispatcher::{dispatch, Dispatched};
pub use fan_control::{run_control_loop, FanControlState, TickOutcome};
pub use logging::{init_logging, LogTarget};
pub use server::{process_request, run_server, ControlListener};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build the shared state from the configuration file
///
/// A missing configuration file is replaced by the built-in default. A
/// startup strategy that is not part of the configuration fails startup.
pub fn prepare_state(
    options: &RunOptions,
    hardware: Arc<dyn HardwareSensor>,
) -> fc_error::Result<Arc<FanControlState>> {
    let config_store = JsonFileStore::new(&options.config_path);
    if config_store.install_default_if_missing()? {
        warn!(path = %options.config_path.display(), "Configuration file missing, installed the default one");
    }

    let data = config_store.load()?;
    let mut runtime = RuntimeState::new(StrategyStore::new(data)?);
    if let Some(strategy) = &options.strategy {
        runtime.set_override(strategy)?;
        info!(strategy = %strategy, "Startup strategy forced");
    }

    Ok(Arc::new(FanControlState::new(
        runtime,
        hardware,
        Arc::new(config_store),
        options.silent,
    )))
}

/// Run the control loop and the control channel until shutdown
///
/// The fan is handed back to automatic control however the loop ends. A
/// fatal loop error is returned after that.
pub async fn serve(state: Arc<FanControlState>, listener: ControlListener) -> anyhow::Result<()> {
    let control = tokio::spawn(run_control_loop(state.clone()));
    let server = tokio::spawn(run_server(listener, state.clone()));

    let loop_result = match control.await {
        Ok(result) => result.context("fan control stopped"),
        Err(e) => Err(anyhow!("fan control task failed: {}", e)),
    };

    state.request_shutdown();
    let server_result = match server.await {
        Ok(result) => result.context("control channel failed"),
        Err(e) => Err(anyhow!("control channel task failed: {}", e)),
    };

    state.release_hardware();
    loop_result?;
    server_result
}

/// Warn when hardware access will most likely be refused
fn check_privileges() {
    // SAFETY: geteuid only returns the process's effective user ID
    let euid = unsafe { libc::geteuid() };
    if euid != 0 {
        warn!(euid, "Not running as root, fan duty writes will probably fail");
    }
}

/// Start the service with `options`, listening on `address`
pub async fn run(options: RunOptions, transport: TransportKind, address: String) -> anyhow::Result<()> {
    info!("STARTUP: fanctld {} starting", VERSION);
    info!(
        config = %options.config_path.display(),
        hardware = ?options.hardware,
        transport = ?transport,
        address = %address,
        "STARTUP: options"
    );

    check_privileges();

    let hardware = open_sensor(&options).context("cannot open the hardware backend")?;
    let state = prepare_state(&options, hardware).context("cannot load the configuration")?;
    let listener = ControlListener::bind(transport, &address)
        .await
        .with_context(|| format!("cannot listen on {}", address))?;

    let socket_path: Option<PathBuf> = listener.socket_path().map(PathBuf::from);
    let signal_state = state.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("SIGNAL: Received SIGINT/SIGTERM - initiating shutdown");
        signal_state.request_shutdown();
    }) {
        warn!("Failed to set signal handler: {}. Shutdown via signals may not work cleanly.", e);
    }

    let result = serve(state, listener).await;
    if let Some(path) = socket_path {
        server::remove_socket(&path);
    }

    match &result {
        Ok(()) => info!("SHUTDOWN: fanctld terminated gracefully"),
        Err(e) => error!("SHUTDOWN: {:#}", e),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fan_control::tests::{FakeSensor, CONFIG};
    use fc_core::DaemonClient;
    use tempfile::TempDir;

    fn options(dir: &TempDir) -> RunOptions {
        RunOptions {
            config_path: dir.path().join("config.json"),
            ..RunOptions::default()
        }
    }

    #[test]
    fn test_prepare_state_installs_default_config() {
        let dir = TempDir::new().unwrap();
        let options = options(&dir);
        let state = prepare_state(&options, Arc::new(FakeSensor::with_temperature(50.0))).unwrap();

        assert!(options.config_path.exists());
        let runtime = state.runtime();
        assert_eq!(runtime.configuration().default_strategy, "lazy");
        assert!(runtime.is_default());
    }

    #[test]
    fn test_prepare_state_with_startup_strategy() {
        let dir = TempDir::new().unwrap();
        let mut options = options(&dir);
        std::fs::write(&options.config_path, CONFIG).unwrap();

        options.strategy = Some("agile".into());
        let state = prepare_state(&options, Arc::new(FakeSensor::with_temperature(50.0))).unwrap();
        assert_eq!(state.runtime().current_strategy().unwrap().name, "agile");

        options.strategy = Some("turbo".into());
        assert!(matches!(
            prepare_state(&options, Arc::new(FakeSensor::with_temperature(50.0))),
            Err(fc_error::FanctlError::InvalidStrategy(_))
        ));
    }

    #[test]
    fn test_prepare_state_rejects_broken_config() {
        let dir = TempDir::new().unwrap();
        let options = options(&dir);
        std::fs::write(&options.config_path, "{ not json").unwrap();
        assert!(prepare_state(&options, Arc::new(FakeSensor::with_temperature(50.0))).is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_serve_hands_fan_back_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let options = options(&dir);
        let sensor = Arc::new(FakeSensor::with_temperature(60.0));
        let state = prepare_state(&options, sensor.clone()).unwrap();

        let socket = dir.path().join("fanctl.sock");
        let listener = ControlListener::bind(TransportKind::Unix, &socket.to_string_lossy())
            .await
            .unwrap();
        let service = tokio::spawn(serve(state.clone(), listener));

        let address = socket.to_string_lossy().to_string();
        let reply = tokio::task::spawn_blocking(move || {
            DaemonClient::new(TransportKind::Unix, address).send("print current")
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(reply, "Strategy in use: 'lazy'");

        state.request_shutdown();
        service.await.unwrap().unwrap();
        assert_eq!(*sensor.auto_control_calls.lock(), 1);
        assert!(!socket.exists());
    }
}
