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

//! BlueZ transport.

use async_trait::async_trait;
use bluer::rfcomm::ProfileHandle;
use bluer::{Adapter, AdapterEvent, Address, AddressType, Device, DeviceEvent, DeviceProperty, Session};
use futures::{pin_mut, Stream, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::sdp::{AttributeEntry, SdpClient, SDP_PSM};
use super::transport::{BoxedLink, DeviceHandle, LinkId, Transport, TransportEvent};
use crate::config::BluetoothConfig;
use crate::error::TransportError;

/// Open the configured adapter and apply power, visibility and alias settings.
pub async fn prepare_adapter(session: &Session, config: &BluetoothConfig) -> bluer::Result<Adapter> {
    let adapter = match &config.adapter {
        Some(name) => session.adapter(name)?,
        None => session.default_adapter().await?,
    };
    info!("Using Bluetooth adapter: {}", adapter.name());

    if config.power_on && !adapter.is_powered().await? {
        info!("Powering on Bluetooth adapter...");
        adapter.set_powered(true).await?;
    }

    if let Some(alias) = &config.alias {
        adapter.set_alias(alias.clone()).await?;
        info!("Bluetooth name set to: {}", alias);
    }

    if config.discoverable {
        adapter.set_discoverable(true).await?;
        adapter.set_pairable(true).await?;
        info!("Adapter is discoverable and pairable");
    }

    Ok(adapter)
}

/// [`Transport`] backed by bluetoothd and kernel Bluetooth sockets.
pub struct BluezTransport {
    adapter: Adapter,
    requests: Mutex<Option<ProfileHandle>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl BluezTransport {
    /// `requests` is the published profile's connection request stream, if
    /// inbound channels should be accepted.
    pub fn new(adapter: Adapter, requests: Option<ProfileHandle>) -> Self {
        Self {
            adapter,
            requests: Mutex::new(requests),
            tasks: Mutex::new(Vec::new()),
        }
    }
}

impl Drop for BluezTransport {
    fn drop(&mut self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

#[async_trait]
impl Transport for BluezTransport {
    async fn begin_watching(
        &self,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<(), TransportError> {
        let adapter_events = self.adapter.events().await?;
        let known = self.adapter.device_addresses().await?;
        debug!("{} known devices", known.len());

        let watcher = tokio::spawn(watch_adapter(
            self.adapter.clone(),
            known,
            Box::pin(adapter_events),
            events.clone(),
        ));

        let mut tasks = self.tasks.lock();
        tasks.push(watcher);

        if let Some(requests) = self.requests.lock().take() {
            tasks.push(tokio::spawn(accept_loop(
                requests,
                self.adapter.clone(),
                events,
            )));
        }

        Ok(())
    }

    async fn find_service(
        &self,
        device: &DeviceHandle,
        service: Uuid,
    ) -> Result<Option<Vec<AttributeEntry>>, TransportError> {
        let addr = bluer::l2cap::SocketAddr::new(device.address, AddressType::BrEdr, SDP_PSM);
        let mut socket = bluer::l2cap::SeqPacket::connect(addr).await?;
        debug!("SDP connection to {} established", device);

        let mut records = SdpClient::new()
            .search_attributes(&mut socket, service)
            .await?;

        if records.len() > 1 {
            debug!("{} advertises {} matching records, using the first", device, records.len());
        }
        Ok(if records.is_empty() {
            None
        } else {
            Some(records.swap_remove(0))
        })
    }

    fn open_channel(
        &self,
        device: &DeviceHandle,
        channel_id: u8,
        attempt: LinkId,
        events: mpsc::Sender<TransportEvent>,
    ) {
        let address = device.address;

        tokio::spawn(async move {
            let addr = bluer::rfcomm::SocketAddr::new(address, channel_id);
            let result = match bluer::rfcomm::Stream::connect(addr).await {
                Ok(stream) => Ok(Box::new(stream) as BoxedLink),
                Err(e) => {
                    warn!("RFCOMM connect to {} channel {}: {}", address, channel_id, e);
                    Err(e.raw_os_error().unwrap_or(-1))
                }
            };

            let _ = events
                .send(TransportEvent::Opened { attempt, result })
                .await;
        });
    }
}

async fn device_handle(device: &Device) -> DeviceHandle {
    DeviceHandle::new(device.address(), device.alias().await.ok())
}

/// Track devices as they appear and watch each for connection changes.
async fn watch_adapter<S>(
    adapter: Adapter,
    known: Vec<Address>,
    mut adapter_events: S,
    events: mpsc::Sender<TransportEvent>,
) where
    S: Stream<Item = AdapterEvent> + Send + Unpin + 'static,
{
    let mut watchers: HashMap<Address, JoinHandle<()>> = HashMap::new();

    for address in known {
        watchers.insert(
            address,
            tokio::spawn(watch_device(adapter.clone(), address, events.clone())),
        );
    }

    while let Some(event) = adapter_events.next().await {
        match event {
            AdapterEvent::DeviceAdded(address) => {
                watchers.entry(address).or_insert_with(|| {
                    debug!("Watching device {}", address);
                    tokio::spawn(watch_device(adapter.clone(), address, events.clone()))
                });
            }
            AdapterEvent::DeviceRemoved(address) => {
                if let Some(watcher) = watchers.remove(&address) {
                    debug!("Device {} removed", address);
                    watcher.abort();
                }
            }
            _ => {}
        }

        if events.is_closed() {
            break;
        }
    }

    for (_, watcher) in watchers {
        watcher.abort();
    }
}

async fn watch_device(adapter: Adapter, address: Address, events: mpsc::Sender<TransportEvent>) {
    if let Err(e) = track_connection(&adapter, address, &events).await {
        debug!("Stopped watching {}: {}", address, e);
    }
}

async fn track_connection(
    adapter: &Adapter,
    address: Address,
    events: &mpsc::Sender<TransportEvent>,
) -> bluer::Result<()> {
    let device = adapter.device(address)?;
    let changes = device.events().await?;
    pin_mut!(changes);

    if device.is_connected().await? {
        let _ = events
            .send(TransportEvent::Connected(device_handle(&device).await))
            .await;
    }

    while let Some(event) = changes.next().await {
        if let DeviceEvent::PropertyChanged(DeviceProperty::Connected(connected)) = event {
            let handle = device_handle(&device).await;
            let event = if connected {
                TransportEvent::Connected(handle)
            } else {
                TransportEvent::Disconnected(handle)
            };
            if events.send(event).await.is_err() {
                break;
            }
        }
    }

    Ok(())
}

/// Accept channels peers open to our published service.
async fn accept_loop(requests: ProfileHandle, adapter: Adapter, events: mpsc::Sender<TransportEvent>) {
    info!("Waiting for inbound RFCOMM connections...");
    pin_mut!(requests);

    while let Some(request) = requests.next().await {
        let address = request.device();

        let stream = match request.accept() {
            Ok(stream) => stream,
            Err(e) => {
                error!("Accept error from {}: {}", address, e);
                continue;
            }
        };

        let channel_id = stream.peer_addr().map(|addr| addr.channel).unwrap_or(0);
        let device = match adapter.device(address) {
            Ok(device) => device_handle(&device).await,
            Err(_) => DeviceHandle::new(address, None),
        };

        let event = TransportEvent::Incoming {
            device,
            channel_id,
            link: Box::new(stream),
        };
        if events.send(event).await.is_err() {
            break;
        }
    }
}
