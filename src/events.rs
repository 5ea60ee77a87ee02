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

//! Bridge notice processing.

use std::sync::Arc;
use tracing::{error, info};

use crate::bluetooth::BridgeNotice;
use crate::error::BridgeError;
use crate::state::AppState;

/// Turns bridge notices into log lines and state updates.
pub struct NoticeProcessor {
    state: Arc<AppState>,
}

impl NoticeProcessor {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Process a single notice.
    pub fn process(&self, notice: BridgeNotice) {
        match notice {
            BridgeNotice::StateChanged(state) => {
                self.state.set_bridge_state(state);
            }
            BridgeNotice::Connected { device } => {
                info!("Channel open to {}", device);
                self.state.set_connected(device);
            }
            BridgeNotice::DataReceived { length, hex } => {
                info!("Received {} bytes: {}", length, hex);
                self.state.record_received(length);
            }
            BridgeNotice::Status(status) => {
                info!("{}", status);
            }
            BridgeNotice::Error(BridgeError::ServiceNotFound) => {
                info!("Device lacks touch debug profile, ignoring");
            }
            BridgeNotice::Error(e) => {
                error!("Bridge error: {}", e);
            }
        }
    }
}
