// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Console input: hex payloads and a few commands typed on stdin.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::error::DecodeError;
use crate::payload::{decode_hex, RawPayload};

pub const HELP: &str = "Type hex bytes (e.g. `de ad be ef`) to send them. \
Commands: /status, /help, /quit";

/// Actions requested from the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleAction {
    Send(RawPayload),
    Status,
    Help,
    Quit,
}

/// Interpret one input line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<ConsoleAction>, DecodeError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    if let Some(command) = line.strip_prefix('/') {
        let action = match command.trim().to_ascii_lowercase().as_str() {
            "quit" | "exit" | "q" => ConsoleAction::Quit,
            "status" | "s" => ConsoleAction::Status,
            _ => ConsoleAction::Help,
        };
        return Ok(Some(action));
    }

    decode_hex(line).map(|bytes| Some(ConsoleAction::Send(bytes)))
}

/// Read stdin on a background task. End of input is reported as `Quit`.
pub fn run_console() -> mpsc::UnboundedReceiver<ConsoleAction> {
    let (action_tx, action_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match parse_line(&line) {
                    Ok(Some(action)) => {
                        if action_tx.send(action).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!("Invalid hex: {}", e),
                },
                Ok(None) => {
                    let _ = action_tx.send(ConsoleAction::Quit);
                    break;
                }
                Err(e) => {
                    error!("Console read error: {}", e);
                    let _ = action_tx.send(ConsoleAction::Quit);
                    break;
                }
            }
        }
    });

    action_rx
}
