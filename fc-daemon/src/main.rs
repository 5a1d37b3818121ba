//! fanctld - fanctl service
//!
//! Takes the same options as `fanctl run`:
//!
//! ```text
//! fanctld [STRATEGY] [--config PATH] [--silent] [--hardware-controller ectool|hwmon]
//!         [--no-battery-sensors] [--pwm-path PATH] [--socket-controller unix|tcp] [--address ADDR]
//! ```

use tracing::{error, info};

use fc_daemon::{init_logging, run};
use fc_protocol::{Command, CommandParser, Invocation, RunOptions, TransportKind};

/// Split a parsed `run` invocation into what the service needs
fn into_run(invocation: Invocation) -> Option<(RunOptions, TransportKind, String)> {
    let address = invocation.resolved_address();
    match invocation.command {
        Command::Run(options) => Some((options, invocation.transport, address)),
        _ => None,
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = std::iter::once("run".to_string()).chain(std::env::args().skip(1));
    let invocation = match CommandParser::local().parse_args(args) {
        Ok(invocation) => invocation,
        Err(e) => e.exit(),
    };

    let Some((options, transport, address)) = into_run(invocation) else {
        eprintln!("fanctld only runs the service; use fanctl to send commands");
        std::process::exit(1);
    };

    let target = init_logging();
    info!("STARTUP: Logging to {}", target.describe());

    if let Err(e) = run(options, transport, address).await {
        error!("{:#}", e);
        eprintln!("fanctld: {:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_arguments_keep_address_and_options() {
        let args = ["run", "lazy", "--silent", "--sc", "tcp", "--address", "127.0.0.1:9000"];
        let invocation = CommandParser::local().parse_args(args).unwrap();

        let (options, transport, address) = into_run(invocation).unwrap();
        assert_eq!(options.strategy.as_deref(), Some("lazy"));
        assert!(options.silent);
        assert_eq!(transport, TransportKind::Tcp);
        assert_eq!(address, "127.0.0.1:9000");
    }

    #[test]
    fn test_other_commands_are_not_run() {
        let invocation = CommandParser::local().parse_args(["pause"]).unwrap();
        assert!(into_run(invocation).is_none());
    }
}
