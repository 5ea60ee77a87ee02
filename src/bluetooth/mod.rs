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

//! Bluetooth communication module.
//!
//! Publishes the debug service record and bridges one RFCOMM channel to the
//! caller.

pub mod advertiser;
pub mod bluez;
pub mod bridge;
pub mod sdp;
pub mod transport;

pub use advertiser::{publish, PublishedService};
pub use bluez::{prepare_adapter, BluezTransport};
pub use bridge::{Bridge, BridgeHandle, BridgeNotice, BridgeState, MAX_WRITE_LEN};
pub use sdp::{ServiceRecord, DEBUG_SERVICE_UUID};
pub use transport::{BoxedLink, DeviceHandle, LinkId, Transport, TransportEvent};
