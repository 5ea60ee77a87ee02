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

//! RFCOMM channel bridge.
//!
//! One consumer loop owns all bridge state. Transport events, caller commands
//! and the open deadline are the only inputs, so no locking is needed around
//! the tracked channel.

use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::sdp::rfcomm_channel;
use super::transport::{BoxedLink, DeviceHandle, LinkId, Transport, TransportEvent};
use crate::config::{BridgeConfig, ConnectionPolicy};
use crate::error::{BridgeError, TransportError, WriteError};
use crate::payload::{encode_hex, RawPayload};

/// Largest payload accepted by a single write.
pub const MAX_WRITE_LEN: usize = u16::MAX as usize;

const EVENT_QUEUE_LEN: usize = 64;
const COMMAND_QUEUE_LEN: usize = 16;

/// Bridge lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// No device being bridged.
    Idle,
    /// Looking up the connected device's service record.
    AwaitingServiceMatch,
    /// Channel open requested, waiting for completion.
    ChannelNegotiating,
    /// Channel usable for writes.
    Open,
    /// Channel released; passes straight through to `Idle`.
    Closed,
}

impl BridgeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeState::Idle => "Idle",
            BridgeState::AwaitingServiceMatch => "Awaiting service match",
            BridgeState::ChannelNegotiating => "Negotiating channel",
            BridgeState::Open => "Open",
            BridgeState::Closed => "Closed",
        }
    }
}

/// Observations emitted by the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeNotice {
    StateChanged(BridgeState),
    /// Channel opened to a device.
    Connected { device: String },
    /// Bytes received on the open channel.
    DataReceived { length: usize, hex: String },
    /// Informational status line.
    Status(String),
    /// A peer was abandoned.
    Error(BridgeError),
}

enum BridgeCommand {
    Write {
        bytes: RawPayload,
        reply: oneshot::Sender<Result<usize, WriteError>>,
    },
    State {
        reply: oneshot::Sender<BridgeState>,
    },
    Shutdown,
}

/// Caller-facing handle to a running bridge.
#[derive(Clone)]
pub struct BridgeHandle {
    commands: mpsc::Sender<BridgeCommand>,
    events: mpsc::Sender<TransportEvent>,
}

impl BridgeHandle {
    /// Send raw bytes on the open channel.
    ///
    /// Resolves once the transport has accepted every byte.
    pub async fn write(&self, bytes: RawPayload) -> Result<usize, WriteError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(BridgeCommand::Write { bytes, reply })
            .await
            .map_err(|_| WriteError::BridgeStopped)?;
        response.await.map_err(|_| WriteError::BridgeStopped)?
    }

    /// Current state. Reports `Closed` once the bridge has stopped.
    pub async fn state(&self) -> BridgeState {
        let (reply, response) = oneshot::channel();
        if self
            .commands
            .send(BridgeCommand::State { reply })
            .await
            .is_err()
        {
            return BridgeState::Closed;
        }
        response.await.unwrap_or(BridgeState::Closed)
    }

    /// Stop the bridge loop, releasing any open channel.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(BridgeCommand::Shutdown).await;
    }

    /// Sender a transport uses to deliver events.
    pub fn event_sender(&self) -> mpsc::Sender<TransportEvent> {
        self.events.clone()
    }
}

struct PendingOpen {
    attempt: LinkId,
    device: DeviceHandle,
    channel_id: u8,
    deadline: Instant,
}

struct Channel {
    link: LinkId,
    channel_id: u8,
    device: DeviceHandle,
    writer: WriteHalf<BoxedLink>,
    reader: JoinHandle<()>,
}

/// Bridges one RFCOMM channel at a time between a peer and the caller.
pub struct Bridge<T: Transport> {
    transport: Arc<T>,
    service: Uuid,
    config: BridgeConfig,
    state: BridgeState,
    pending: Option<PendingOpen>,
    channel: Option<Channel>,
    next_link: LinkId,
    events_tx: mpsc::Sender<TransportEvent>,
    events_rx: mpsc::Receiver<TransportEvent>,
    commands_rx: mpsc::Receiver<BridgeCommand>,
    notices: mpsc::Sender<BridgeNotice>,
}

impl<T: Transport> Bridge<T> {
    /// Create a bridge for `service`, reporting on `notices`.
    pub fn new(
        transport: Arc<T>,
        service: Uuid,
        config: BridgeConfig,
        notices: mpsc::Sender<BridgeNotice>,
    ) -> (Self, BridgeHandle) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_LEN);
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE_LEN);

        let handle = BridgeHandle {
            commands: commands_tx,
            events: events_tx.clone(),
        };

        let bridge = Self {
            transport,
            service,
            config,
            state: BridgeState::Idle,
            pending: None,
            channel: None,
            next_link: 0,
            events_tx,
            events_rx,
            commands_rx,
            notices,
        };

        (bridge, handle)
    }

    /// Ask the transport to start reporting connectable devices.
    pub async fn begin_watching(&self) -> Result<(), TransportError> {
        info!("Watching for devices offering service {}", self.service);
        self.transport.begin_watching(self.events_tx.clone()).await
    }

    /// Run until shut down or every handle is dropped.
    pub async fn run(mut self) {
        loop {
            let deadline = self.pending.as_ref().map(|p| p.deadline);

            tokio::select! {
                Some(event) = self.events_rx.recv() => {
                    self.handle_event(event).await;
                }
                command = self.commands_rx.recv() => match command {
                    Some(BridgeCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                _ = open_deadline(deadline) => {
                    self.handle_open_timeout().await;
                }
            }
        }

        self.release();
        info!("Bridge stopped");
    }

    async fn handle_command(&mut self, command: BridgeCommand) {
        match command {
            BridgeCommand::Write { bytes, reply } => {
                let result = self.write(&bytes).await;
                let _ = reply.send(result);
            }
            BridgeCommand::State { reply } => {
                let _ = reply.send(self.state);
            }
            BridgeCommand::Shutdown => {}
        }
    }

    async fn handle_event(&mut self, event: TransportEvent) {
        debug!("Transport event: {:?}", event);

        match event {
            TransportEvent::Connected(device) => self.handle_connected(device).await,
            TransportEvent::Disconnected(device) => self.handle_disconnected(device).await,
            TransportEvent::Opened { attempt, result } => self.handle_opened(attempt, result).await,
            TransportEvent::Incoming {
                device,
                channel_id,
                link,
            } => self.handle_incoming(device, channel_id, link).await,
            TransportEvent::DataReceived { link, bytes } => {
                if !self.is_current(link) {
                    debug!("Dropping {} bytes from stale link {}", bytes.len(), link);
                    return;
                }
                let hex = encode_hex(&bytes);
                debug!("Got data with length {}: {}", bytes.len(), hex);
                self.notify(BridgeNotice::DataReceived {
                    length: bytes.len(),
                    hex,
                })
                .await;
            }
            TransportEvent::Closed { link } => {
                if !self.is_current(link) {
                    return;
                }
                info!("Channel closed");
                self.notify(BridgeNotice::Status("Channel closed".to_string()))
                    .await;
                self.teardown().await;
            }
            TransportEvent::ControlSignalsChanged => {
                debug!("Signals changed");
                self.notify(BridgeNotice::Status("Signals changed".to_string()))
                    .await;
            }
            TransportEvent::FlowControlChanged => {
                debug!("Flow control changed");
                self.notify(BridgeNotice::Status("Flow control changed".to_string()))
                    .await;
            }
        }
    }

    async fn handle_connected(&mut self, device: DeviceHandle) {
        info!("Device connected: {}", device);

        if self.state != BridgeState::Idle {
            if self.tracks(&device) {
                debug!("Duplicate connect notification for {}", device);
                return;
            }
            if !self.make_room(&device).await {
                return;
            }
        }

        self.transition(BridgeState::AwaitingServiceMatch).await;

        let lookup = tokio::time::timeout(
            self.config.sdp_timeout(),
            self.transport.find_service(&device, self.service),
        )
        .await;

        let attributes = match lookup {
            Ok(Ok(Some(attributes))) => attributes,
            Ok(Ok(None)) => {
                info!("{} lacks the debug service, ignoring", device);
                self.abandon(BridgeError::ServiceNotFound).await;
                return;
            }
            Ok(Err(e)) => {
                error!("Service lookup on {} failed: {}", device, e);
                self.abandon(BridgeError::Lookup(e.to_string())).await;
                return;
            }
            Err(_) => {
                error!("Service lookup on {} timed out", device);
                self.abandon(BridgeError::Lookup("timed out".to_string()))
                    .await;
                return;
            }
        };

        debug!("Found service record: {:?}", attributes);

        let Some(channel_id) = rfcomm_channel(&attributes) else {
            error!("Failed to determine RFCOMM channel ID for {}", device);
            self.abandon(BridgeError::ChannelIdUnavailable).await;
            return;
        };

        debug!("Allocated RFCOMM channel is {}", channel_id);
        self.transition(BridgeState::ChannelNegotiating).await;

        let attempt = self.next_link_id();
        self.pending = Some(PendingOpen {
            attempt,
            device: device.clone(),
            channel_id,
            deadline: Instant::now() + self.config.open_timeout(),
        });
        self.transport
            .open_channel(&device, channel_id, attempt, self.events_tx.clone());
    }

    async fn handle_opened(&mut self, attempt: LinkId, result: Result<BoxedLink, i32>) {
        let matches = self
            .pending
            .as_ref()
            .is_some_and(|pending| pending.attempt == attempt);
        if !matches {
            debug!("Ignoring completion of abandoned open attempt {}", attempt);
            return;
        }
        let Some(pending) = self.pending.take() else {
            return;
        };

        match result {
            Ok(link) => {
                debug!(
                    "Open of RFCOMM channel {} on {} completed",
                    pending.channel_id, pending.device
                );
                self.install(pending.attempt, pending.device, pending.channel_id, link)
                    .await;
            }
            Err(status) => {
                error!(
                    "Failed to open RFCOMM channel {} on {}: status {}",
                    pending.channel_id, pending.device, status
                );
                self.abandon(BridgeError::OpenFailed(status)).await;
            }
        }
    }

    async fn handle_incoming(&mut self, device: DeviceHandle, channel_id: u8, link: BoxedLink) {
        info!(
            "Incoming RFCOMM connection from {} on channel {}",
            device, channel_id
        );

        let opening_same_peer = self
            .pending
            .as_ref()
            .is_some_and(|p| p.device.address == device.address);

        if opening_same_peer {
            // The peer beat our outbound open; its late completion is dropped.
            debug!("Using inbound channel from {} in place of pending open", device);
            self.pending = None;
        } else if self.state != BridgeState::Idle && !self.make_room(&device).await {
            return;
        }

        let id = self.next_link_id();
        self.install(id, device, channel_id, link).await;
    }

    async fn handle_disconnected(&mut self, device: DeviceHandle) {
        if !self.tracks(&device) {
            debug!("Ignoring disconnect of untracked device {}", device);
            return;
        }

        info!("Device disconnected: {}", device);
        self.notify(BridgeNotice::Status(format!(
            "Device disconnected: {}",
            device.display_name()
        )))
        .await;
        self.teardown().await;
    }

    async fn handle_open_timeout(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };

        let timeout_ms = self.config.open_timeout_ms;
        error!(
            "RFCOMM channel {} on {} did not open within {} ms",
            pending.channel_id, pending.device, timeout_ms
        );
        self.abandon(BridgeError::OpenTimedOut(timeout_ms)).await;
    }

    /// Apply the connection policy for a new peer while busy.
    ///
    /// Returns whether the new peer may proceed.
    async fn make_room(&mut self, device: &DeviceHandle) -> bool {
        match self.config.connection_policy {
            ConnectionPolicy::Reject => {
                warn!(
                    "Ignoring {}: bridge is {}",
                    device,
                    self.state.as_str().to_lowercase()
                );
                self.notify(BridgeNotice::Status(format!(
                    "Rejected {}: already bridging",
                    device.display_name()
                )))
                .await;
                false
            }
            ConnectionPolicy::Supersede => {
                info!("{} supersedes the current peer", device);
                self.notify(BridgeNotice::Status(format!(
                    "Superseded by {}",
                    device.display_name()
                )))
                .await;
                self.teardown().await;
                true
            }
        }
    }

    async fn install(
        &mut self,
        link_id: LinkId,
        device: DeviceHandle,
        channel_id: u8,
        link: BoxedLink,
    ) {
        let (reader, writer) = tokio::io::split(link);
        let reader = tokio::spawn(read_loop(
            reader,
            link_id,
            self.config.read_buffer_size,
            self.events_tx.clone(),
        ));

        info!("RFCOMM channel {} open to {}", channel_id, device);
        let name = device.display_name().to_string();
        self.channel = Some(Channel {
            link: link_id,
            channel_id,
            device,
            writer,
            reader,
        });

        self.transition(BridgeState::Open).await;
        self.notify(BridgeNotice::Connected { device: name }).await;
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<usize, WriteError> {
        if self.state != BridgeState::Open {
            warn!("Cannot write data when channel is not open");
            return Err(WriteError::NotConnected);
        }
        let Some(channel) = self.channel.as_mut() else {
            return Err(WriteError::NotConnected);
        };

        if bytes.len() > MAX_WRITE_LEN {
            return Err(WriteError::PayloadTooLarge {
                len: bytes.len(),
                max: MAX_WRITE_LEN,
            });
        }
        if bytes.is_empty() {
            debug!("Empty payload, nothing to send");
            return Ok(0);
        }

        for chunk in bytes.chunks(self.config.write_chunk_size.max(1)) {
            channel.writer.write_all(chunk).await?;
        }
        channel.writer.flush().await?;

        debug!(
            "Wrote {} bytes on channel {}: {}",
            bytes.len(),
            channel.channel_id,
            encode_hex(bytes)
        );
        Ok(bytes.len())
    }

    /// Give up on the current peer without an open channel.
    async fn abandon(&mut self, reason: BridgeError) {
        self.notify(BridgeNotice::Error(reason)).await;
        self.transition(BridgeState::Idle).await;
    }

    /// Drop the channel and any pending open, then return to idle.
    async fn teardown(&mut self) {
        self.release();
        self.transition(BridgeState::Closed).await;
        self.transition(BridgeState::Idle).await;
    }

    fn release(&mut self) {
        self.pending = None;
        if let Some(channel) = self.channel.take() {
            debug!(
                "Releasing channel {} to {}",
                channel.channel_id, channel.device
            );
            channel.reader.abort();
        }
    }

    async fn transition(&mut self, next: BridgeState) {
        if self.state == next {
            return;
        }
        info!("Bridge state: {} -> {}", self.state.as_str(), next.as_str());
        self.state = next;
        self.notify(BridgeNotice::StateChanged(next)).await;
    }

    async fn notify(&self, notice: BridgeNotice) {
        let _ = self.notices.send(notice).await;
    }

    fn tracks(&self, device: &DeviceHandle) -> bool {
        let open = self
            .channel
            .as_ref()
            .is_some_and(|c| c.device.address == device.address);
        let pending = self
            .pending
            .as_ref()
            .is_some_and(|p| p.device.address == device.address);
        open || pending
    }

    fn is_current(&self, link: LinkId) -> bool {
        self.channel.as_ref().is_some_and(|c| c.link == link)
    }

    fn next_link_id(&mut self) -> LinkId {
        self.next_link += 1;
        self.next_link
    }
}

async fn open_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Forward channel reads into the bridge's event queue.
async fn read_loop(
    mut reader: ReadHalf<BoxedLink>,
    link: LinkId,
    buffer_size: usize,
    events: mpsc::Sender<TransportEvent>,
) {
    let mut buf = vec![0u8; buffer_size.max(1)];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let event = TransportEvent::DataReceived {
                    link,
                    bytes: buf[..n].to_vec(),
                };
                if events.send(event).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                warn!("Channel read error: {}", e);
                break;
            }
        }
    }

    let _ = events.send(TransportEvent::Closed { link }).await;
}
