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

//! Platform seam between the bridge and a Bluetooth stack.

use async_trait::async_trait;
use bluer::Address;
use std::fmt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::sdp::AttributeEntry;
use crate::error::TransportError;

/// Shown when a peer has no name.
pub const UNKNOWN_DEVICE_NAME: &str = "Unknown name or address";

/// A remote peer. The stack owns the device; this is a reference plus a
/// cached name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    pub address: Address,
    pub name: Option<String>,
}

impl DeviceHandle {
    pub fn new(address: Address, name: Option<String>) -> Self {
        Self { address, name }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(UNKNOWN_DEVICE_NAME)
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name(), self.address)
    }
}

/// A bidirectional byte stream for an open RFCOMM channel.
pub trait Link: AsyncRead + AsyncWrite + Send + Sync + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Sync + Unpin> Link for T {}

/// Boxed channel stream handed to the bridge.
pub type BoxedLink = Box<dyn Link>;

/// Identifies one open-attempt or accepted link so late events can be
/// discarded.
pub type LinkId = u64;

/// Events a transport delivers to the bridge.
pub enum TransportEvent {
    /// A device finished connecting at the baseband level.
    Connected(DeviceHandle),
    /// A device disconnected.
    Disconnected(DeviceHandle),
    /// An asynchronous open finished. `Err` carries the stack status code.
    Opened {
        attempt: LinkId,
        result: Result<BoxedLink, i32>,
    },
    /// A peer opened a channel to our published service.
    Incoming {
        device: DeviceHandle,
        channel_id: u8,
        link: BoxedLink,
    },
    /// Bytes read from the open channel.
    DataReceived { link: LinkId, bytes: Vec<u8> },
    /// The open channel reached end of stream or failed.
    Closed { link: LinkId },
    /// Modem control signals changed.
    ControlSignalsChanged,
    /// Flow control state changed.
    FlowControlChanged,
}

impl fmt::Debug for TransportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportEvent::Connected(device) => write!(f, "Connected({device})"),
            TransportEvent::Disconnected(device) => write!(f, "Disconnected({device})"),
            TransportEvent::Opened { attempt, result } => match result {
                Ok(_) => write!(f, "Opened {{ attempt: {attempt}, ok }}"),
                Err(status) => write!(f, "Opened {{ attempt: {attempt}, status: {status} }}"),
            },
            TransportEvent::Incoming {
                device, channel_id, ..
            } => write!(f, "Incoming({device}, channel {channel_id})"),
            TransportEvent::DataReceived { link, bytes } => {
                write!(f, "DataReceived {{ link: {link}, len: {} }}", bytes.len())
            }
            TransportEvent::Closed { link } => write!(f, "Closed {{ link: {link} }}"),
            TransportEvent::ControlSignalsChanged => write!(f, "ControlSignalsChanged"),
            TransportEvent::FlowControlChanged => write!(f, "FlowControlChanged"),
        }
    }
}

/// Operations the bridge needs from a Bluetooth stack.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Start delivering connect and disconnect notifications (and any
    /// inbound channels) on `events`.
    async fn begin_watching(
        &self,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<(), TransportError>;

    /// Look up the peer's service record for `service`.
    ///
    /// `Ok(None)` means the peer does not advertise it.
    async fn find_service(
        &self,
        device: &DeviceHandle,
        service: Uuid,
    ) -> Result<Option<Vec<AttributeEntry>>, TransportError>;

    /// Begin opening an RFCOMM channel. Completion is reported as
    /// [`TransportEvent::Opened`] carrying `attempt`.
    fn open_channel(
        &self,
        device: &DeviceHandle,
        channel_id: u8,
        attempt: LinkId,
        events: mpsc::Sender<TransportEvent>,
    );
}
