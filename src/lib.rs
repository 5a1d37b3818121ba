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

//! fanctl - command line front-end
//!
//! `fanctl run` starts the service in-process; every other command is
//! forwarded verbatim to a running service over its control channel.

use fc_core::DaemonClient;
use fc_error::Result;
use fc_protocol::{is_error_payload, join_request, Invocation};

/// Outcome of a forwarded command, ready to print
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Forwarded {
    pub payload: String,
    pub is_error: bool,
}

impl Forwarded {
    pub fn exit_code(&self) -> i32 {
        if self.is_error {
            1
        } else {
            0
        }
    }
}

/// Send the command line arguments to the service selected by `invocation`
///
/// The arguments are re-quoted as one request line; the service parses them
/// again with its own parser, so global options travel along.
pub fn forward<S: AsRef<str>>(invocation: &Invocation, args: &[S]) -> Result<Forwarded> {
    let request = join_request(args.iter().map(AsRef::as_ref))?;
    let client = DaemonClient::new(invocation.transport, invocation.resolved_address());
    let payload = client.send(&request)?;
    Ok(Forwarded {
        is_error: is_error_payload(&payload),
        payload,
    })
}
