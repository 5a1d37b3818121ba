/*
 * This file is part of fanctl.
 *
 * Copyright (C) 2025 fanctl contributors
 *
 * fanctl is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * fanctl is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with fanctl. If not, see <https://www.gnu.org/licenses/>.
 */

use fc_protocol::{Command, CommandParser, ERROR_MARKER};

fn main() -> anyhow::Result<()> {
    // Gather args once, without the program name
    let args: Vec<String> = std::env::args().skip(1).collect();

    let invocation = match CommandParser::local().parse_args(args.iter().cloned()) {
        Ok(invocation) => invocation,
        Err(e) => e.exit(),
    };

    if let Command::Run(options) = invocation.command.clone() {
        for diagnostic in &invocation.diagnostics {
            eprintln!("{}", diagnostic);
        }

        let target = fc_daemon::init_logging();
        tracing::info!("STARTUP: Logging to {}", target.describe());

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let address = invocation.resolved_address();
        if let Err(e) = runtime.block_on(fc_daemon::run(options, invocation.transport, address)) {
            eprintln!("fanctl: {:#}", e);
            std::process::exit(1);
        }
        return Ok(());
    }

    match fanctl::forward(&invocation, &args) {
        Ok(forwarded) if forwarded.is_error => {
            eprintln!("{}", forwarded.payload);
            std::process::exit(forwarded.exit_code());
        }
        Ok(forwarded) => {
            println!("{}", forwarded.payload);
            Ok(())
        }
        Err(e) => {
            eprintln!("{}{}", ERROR_MARKER, e);
            std::process::exit(1);
        }
    }
}
