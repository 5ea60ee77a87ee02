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

//! Application state management.

use chrono::{DateTime, Local};
use parking_lot::RwLock;
use std::sync::Arc;

use crate::bluetooth::BridgeState;

/// Shared application state.
#[derive(Debug)]
pub struct AppState {
    /// Last reported bridge state.
    pub bridge_state: RwLock<BridgeState>,

    /// Device the channel is open to.
    pub connected_device: RwLock<Option<String>>,

    pub bytes_sent: RwLock<u64>,
    pub bytes_received: RwLock<u64>,

    /// When data last moved in either direction.
    pub last_activity: RwLock<Option<DateTime<Local>>>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            bridge_state: RwLock::new(BridgeState::Idle),
            connected_device: RwLock::new(None),
            bytes_sent: RwLock::new(0),
            bytes_received: RwLock::new(0),
            last_activity: RwLock::new(None),
        }
    }
}

impl AppState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_bridge_state(&self, state: BridgeState) {
        *self.bridge_state.write() = state;
        if state == BridgeState::Idle {
            *self.connected_device.write() = None;
        }
    }

    pub fn get_bridge_state(&self) -> BridgeState {
        *self.bridge_state.read()
    }

    pub fn set_connected(&self, device_name: String) {
        *self.connected_device.write() = Some(device_name);
    }

    pub fn get_device_name(&self) -> Option<String> {
        self.connected_device.read().clone()
    }

    pub fn record_sent(&self, len: usize) {
        *self.bytes_sent.write() += len as u64;
        *self.last_activity.write() = Some(Local::now());
    }

    pub fn record_received(&self, len: usize) {
        *self.bytes_received.write() += len as u64;
        *self.last_activity.write() = Some(Local::now());
    }

    /// One-line summary for the console.
    pub fn summary(&self) -> String {
        let state = self.get_bridge_state();
        let device = self
            .get_device_name()
            .map(|name| format!(" to {}", name))
            .unwrap_or_default();
        let last_activity = *self.last_activity.read();
        let activity = last_activity
            .map(|at| at.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "never".to_string());

        format!(
            "{}{} | sent {} bytes, received {} bytes | last activity {}",
            state.as_str(),
            device,
            *self.bytes_sent.read(),
            *self.bytes_received.read(),
            activity
        )
    }
}
