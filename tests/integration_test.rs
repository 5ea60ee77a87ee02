//! Bridge state machine tests against an in-memory transport.

use async_trait::async_trait;
use bluer::Address;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use uuid::Uuid;

use touch_debug_bridge::bluetooth::sdp::{AttributeEntry, ServiceRecord, DEBUG_SERVICE_UUID};
use touch_debug_bridge::bluetooth::{
    BoxedLink, Bridge, BridgeHandle, BridgeNotice, BridgeState, DeviceHandle, LinkId, Transport,
    TransportEvent, MAX_WRITE_LEN,
};
use touch_debug_bridge::config::{BridgeConfig, ConnectionPolicy};
use touch_debug_bridge::error::{BridgeError, TransportError, WriteError};

const WAIT: Duration = Duration::from_secs(2);

#[derive(Clone, Copy)]
enum OpenBehavior {
    Succeed,
    Fail(i32),
    Hang,
}

struct MockTransport {
    records: Mutex<HashMap<Address, Vec<AttributeEntry>>>,
    behavior: Mutex<OpenBehavior>,
    open_calls: Mutex<usize>,
    peers: Mutex<Vec<DuplexStream>>,
}

impl MockTransport {
    fn new(behavior: OpenBehavior) -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(HashMap::new()),
            behavior: Mutex::new(behavior),
            open_calls: Mutex::new(0),
            peers: Mutex::new(Vec::new()),
        })
    }

    fn advertise(&self, device: &DeviceHandle, channel: u8) {
        let record = ServiceRecord::new(DEBUG_SERVICE_UUID, "Touch Debug Profile").with_channel(channel);
        self.records.lock().insert(device.address, record.attributes());
    }

    fn open_calls(&self) -> usize {
        *self.open_calls.lock()
    }

    /// Remote end of the most recently opened channel.
    fn take_peer(&self) -> DuplexStream {
        self.peers.lock().pop().expect("no channel was opened")
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn begin_watching(
        &self,
        _events: mpsc::Sender<TransportEvent>,
    ) -> Result<(), TransportError> {
        Ok(())
    }

    async fn find_service(
        &self,
        device: &DeviceHandle,
        service: Uuid,
    ) -> Result<Option<Vec<AttributeEntry>>, TransportError> {
        assert_eq!(service, DEBUG_SERVICE_UUID);
        Ok(self.records.lock().get(&device.address).cloned())
    }

    fn open_channel(
        &self,
        _device: &DeviceHandle,
        _channel_id: u8,
        attempt: LinkId,
        events: mpsc::Sender<TransportEvent>,
    ) {
        *self.open_calls.lock() += 1;

        let result: Result<BoxedLink, i32> = match *self.behavior.lock() {
            OpenBehavior::Succeed => {
                let (local, peer) = tokio::io::duplex(4096);
                self.peers.lock().push(peer);
                Ok(Box::new(local))
            }
            OpenBehavior::Fail(status) => Err(status),
            OpenBehavior::Hang => return,
        };

        tokio::spawn(async move {
            let _ = events.send(TransportEvent::Opened { attempt, result }).await;
        });
    }
}

struct Harness {
    handle: BridgeHandle,
    events: mpsc::Sender<TransportEvent>,
    notices: mpsc::Receiver<BridgeNotice>,
}

impl Harness {
    fn start(transport: Arc<MockTransport>, config: BridgeConfig) -> Self {
        let (notice_tx, notices) = mpsc::channel(256);
        let (bridge, handle) = Bridge::new(transport, DEBUG_SERVICE_UUID, config, notice_tx);
        let events = handle.event_sender();
        tokio::spawn(bridge.run());

        Self {
            handle,
            events,
            notices,
        }
    }

    async fn send(&self, event: TransportEvent) {
        self.events.send(event).await.expect("bridge stopped");
    }

    async fn next_notice(&mut self) -> BridgeNotice {
        tokio::time::timeout(WAIT, self.notices.recv())
            .await
            .expect("timed out waiting for a notice")
            .expect("notice channel closed")
    }

    async fn expect_notices(&mut self, expected: &[BridgeNotice]) {
        for notice in expected {
            assert_eq!(&self.next_notice().await, notice);
        }
    }

    /// Notices emitted before the bridge handles a marker event queued now.
    async fn drain(&mut self) -> Vec<BridgeNotice> {
        self.send(TransportEvent::ControlSignalsChanged).await;
        let marker = BridgeNotice::Status("Signals changed".to_string());

        let mut seen = Vec::new();
        loop {
            let notice = self.next_notice().await;
            if notice == marker {
                return seen;
            }
            seen.push(notice);
        }
    }

    /// Connect `device` and wait for the channel to open.
    async fn open(&mut self, device: &DeviceHandle) {
        self.send(TransportEvent::Connected(device.clone())).await;
        self.expect_notices(&[
            state(BridgeState::AwaitingServiceMatch),
            state(BridgeState::ChannelNegotiating),
            state(BridgeState::Open),
            BridgeNotice::Connected {
                device: device.display_name().to_string(),
            },
        ])
        .await;
    }
}

fn device(last: u8, name: &str) -> DeviceHandle {
    DeviceHandle::new(
        Address::new([0x10, 0x20, 0x30, 0x40, 0x50, last]),
        Some(name.to_string()),
    )
}

fn state(state: BridgeState) -> BridgeNotice {
    BridgeNotice::StateChanged(state)
}

#[tokio::test]
async fn test_device_without_service_is_ignored() {
    let transport = MockTransport::new(OpenBehavior::Succeed);
    let mut harness = Harness::start(transport.clone(), BridgeConfig::default());

    harness
        .send(TransportEvent::Connected(device(1, "Keyboard")))
        .await;
    harness
        .expect_notices(&[
            state(BridgeState::AwaitingServiceMatch),
            BridgeNotice::Error(BridgeError::ServiceNotFound),
            state(BridgeState::Idle),
        ])
        .await;

    assert_eq!(harness.handle.state().await, BridgeState::Idle);
    assert_eq!(transport.open_calls(), 0);
}

#[tokio::test]
async fn test_unallocated_channel_is_unavailable() {
    let transport = MockTransport::new(OpenBehavior::Succeed);
    let peer = device(2, "Touch Bar");
    transport.advertise(&peer, 0);
    let mut harness = Harness::start(transport.clone(), BridgeConfig::default());

    harness.send(TransportEvent::Connected(peer)).await;
    harness
        .expect_notices(&[
            state(BridgeState::AwaitingServiceMatch),
            BridgeNotice::Error(BridgeError::ChannelIdUnavailable),
            state(BridgeState::Idle),
        ])
        .await;
    assert_eq!(transport.open_calls(), 0);
}

#[tokio::test]
async fn test_open_failure_returns_to_idle() {
    let transport = MockTransport::new(OpenBehavior::Fail(111));
    let peer = device(3, "Touch Bar");
    transport.advertise(&peer, 5);
    let mut harness = Harness::start(transport.clone(), BridgeConfig::default());

    harness.send(TransportEvent::Connected(peer)).await;
    harness
        .expect_notices(&[
            state(BridgeState::AwaitingServiceMatch),
            state(BridgeState::ChannelNegotiating),
            BridgeNotice::Error(BridgeError::OpenFailed(111)),
            state(BridgeState::Idle),
        ])
        .await;

    assert!(harness.drain().await.is_empty());
    assert_eq!(transport.open_calls(), 1);
    assert!(matches!(
        harness.handle.write(vec![0x01]).await,
        Err(WriteError::NotConnected)
    ));
}

#[tokio::test]
async fn test_open_times_out() {
    let transport = MockTransport::new(OpenBehavior::Hang);
    let peer = device(4, "Touch Bar");
    transport.advertise(&peer, 5);
    let config = BridgeConfig {
        open_timeout_ms: 50,
        ..BridgeConfig::default()
    };
    let mut harness = Harness::start(transport, config);

    harness.send(TransportEvent::Connected(peer)).await;
    harness
        .expect_notices(&[
            state(BridgeState::AwaitingServiceMatch),
            state(BridgeState::ChannelNegotiating),
            BridgeNotice::Error(BridgeError::OpenTimedOut(50)),
            state(BridgeState::Idle),
        ])
        .await;

    // A completion arriving after the deadline is discarded.
    let (late, _remote) = tokio::io::duplex(64);
    harness
        .send(TransportEvent::Opened {
            attempt: 1,
            result: Ok(Box::new(late)),
        })
        .await;
    assert!(harness.drain().await.is_empty());
    assert_eq!(harness.handle.state().await, BridgeState::Idle);
}

#[tokio::test]
async fn test_write_requires_open_channel() {
    let transport = MockTransport::new(OpenBehavior::Succeed);
    let harness = Harness::start(transport, BridgeConfig::default());

    assert!(matches!(
        harness.handle.write(vec![0xde, 0xad]).await,
        Err(WriteError::NotConnected)
    ));
}

#[tokio::test]
async fn test_write_reaches_peer() {
    let transport = MockTransport::new(OpenBehavior::Succeed);
    let peer = device(5, "Touch Bar");
    transport.advertise(&peer, 5);
    let mut harness = Harness::start(transport.clone(), BridgeConfig::default());

    harness.open(&peer).await;
    let mut remote = transport.take_peer();

    let written = harness
        .handle
        .write(vec![0xde, 0xad, 0xbe, 0xef])
        .await
        .unwrap();
    assert_eq!(written, 4);

    let mut buf = [0u8; 4];
    tokio::time::timeout(WAIT, remote.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(buf, [0xde, 0xad, 0xbe, 0xef]);

    assert_eq!(harness.handle.write(Vec::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_write_is_split_into_chunks() {
    let transport = MockTransport::new(OpenBehavior::Succeed);
    let peer = device(6, "Touch Bar");
    transport.advertise(&peer, 5);
    let config = BridgeConfig {
        write_chunk_size: 7,
        ..BridgeConfig::default()
    };
    let mut harness = Harness::start(transport.clone(), config);

    harness.open(&peer).await;
    let mut remote = transport.take_peer();

    let payload: Vec<u8> = (0..100).collect();
    assert_eq!(harness.handle.write(payload.clone()).await.unwrap(), 100);

    let mut buf = vec![0u8; 100];
    tokio::time::timeout(WAIT, remote.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(buf, payload);
}

#[tokio::test]
async fn test_oversized_payload_is_rejected() {
    let transport = MockTransport::new(OpenBehavior::Succeed);
    let peer = device(7, "Touch Bar");
    transport.advertise(&peer, 5);
    let mut harness = Harness::start(transport, BridgeConfig::default());

    harness.open(&peer).await;

    let result = harness.handle.write(vec![0u8; MAX_WRITE_LEN + 1]).await;
    assert!(matches!(
        result,
        Err(WriteError::PayloadTooLarge { len, max }) if len == MAX_WRITE_LEN + 1 && max == MAX_WRITE_LEN
    ));
    assert_eq!(harness.handle.state().await, BridgeState::Open);
}

#[tokio::test]
async fn test_received_bytes_are_reported_as_hex() {
    let transport = MockTransport::new(OpenBehavior::Succeed);
    let peer = device(8, "Touch Bar");
    transport.advertise(&peer, 5);
    let mut harness = Harness::start(transport.clone(), BridgeConfig::default());

    harness.open(&peer).await;
    let mut remote = transport.take_peer();

    remote.write_all(&[0x01, 0x02, 0xff]).await.unwrap();
    harness
        .expect_notices(&[BridgeNotice::DataReceived {
            length: 3,
            hex: "0102ff".to_string(),
        }])
        .await;
}

#[tokio::test]
async fn test_disconnect_closes_channel() {
    let transport = MockTransport::new(OpenBehavior::Succeed);
    let peer = device(9, "Touch Bar");
    transport.advertise(&peer, 5);
    let mut harness = Harness::start(transport, BridgeConfig::default());

    harness.open(&peer).await;

    // Unrelated devices do not affect the channel.
    harness
        .send(TransportEvent::Disconnected(device(99, "Mouse")))
        .await;
    assert!(harness.drain().await.is_empty());

    harness.send(TransportEvent::Disconnected(peer)).await;
    harness
        .expect_notices(&[
            BridgeNotice::Status("Device disconnected: Touch Bar".to_string()),
            state(BridgeState::Closed),
            state(BridgeState::Idle),
        ])
        .await;

    assert!(matches!(
        harness.handle.write(vec![0x01]).await,
        Err(WriteError::NotConnected)
    ));
}

#[tokio::test]
async fn test_remote_close_returns_to_idle() {
    let transport = MockTransport::new(OpenBehavior::Succeed);
    let peer = device(10, "Touch Bar");
    transport.advertise(&peer, 5);
    let mut harness = Harness::start(transport.clone(), BridgeConfig::default());

    harness.open(&peer).await;
    drop(transport.take_peer());

    harness
        .expect_notices(&[
            BridgeNotice::Status("Channel closed".to_string()),
            state(BridgeState::Closed),
            state(BridgeState::Idle),
        ])
        .await;
}

#[tokio::test]
async fn test_duplicate_connect_is_ignored() {
    let transport = MockTransport::new(OpenBehavior::Succeed);
    let peer = device(11, "Touch Bar");
    transport.advertise(&peer, 5);
    let mut harness = Harness::start(transport.clone(), BridgeConfig::default());

    harness.open(&peer).await;
    harness.send(TransportEvent::Connected(peer)).await;

    assert!(harness.drain().await.is_empty());
    assert_eq!(transport.open_calls(), 1);
}

#[tokio::test]
async fn test_second_peer_rejected_by_default() {
    let transport = MockTransport::new(OpenBehavior::Succeed);
    let first = device(12, "Touch Bar");
    let second = device(13, "Other Bar");
    transport.advertise(&first, 5);
    transport.advertise(&second, 6);
    let mut harness = Harness::start(transport.clone(), BridgeConfig::default());

    harness.open(&first).await;
    harness.send(TransportEvent::Connected(second)).await;

    assert_eq!(
        harness.drain().await,
        vec![BridgeNotice::Status(
            "Rejected Other Bar: already bridging".to_string()
        )]
    );
    assert_eq!(harness.handle.state().await, BridgeState::Open);
    assert_eq!(transport.open_calls(), 1);
}

#[tokio::test]
async fn test_incoming_from_other_peer_rejected_while_open() {
    let transport = MockTransport::new(OpenBehavior::Succeed);
    let first = device(20, "Touch Bar");
    transport.advertise(&first, 5);
    let mut harness = Harness::start(transport.clone(), BridgeConfig::default());

    harness.open(&first).await;

    let (local, mut remote) = tokio::io::duplex(64);
    harness
        .send(TransportEvent::Incoming {
            device: device(21, "Other Bar"),
            channel_id: 3,
            link: Box::new(local),
        })
        .await;

    assert_eq!(
        harness.drain().await,
        vec![BridgeNotice::Status(
            "Rejected Other Bar: already bridging".to_string()
        )]
    );
    assert_eq!(harness.handle.state().await, BridgeState::Open);

    // The rejected link is dropped.
    let mut buf = [0u8; 1];
    let read = tokio::time::timeout(WAIT, remote.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(read, 0);
}

#[tokio::test]
async fn test_incoming_from_peer_being_opened_is_used() {
    let transport = MockTransport::new(OpenBehavior::Hang);
    let peer = device(22, "Touch Bar");
    transport.advertise(&peer, 5);
    let mut harness = Harness::start(transport.clone(), BridgeConfig::default());

    harness.send(TransportEvent::Connected(peer.clone())).await;
    harness
        .expect_notices(&[
            state(BridgeState::AwaitingServiceMatch),
            state(BridgeState::ChannelNegotiating),
        ])
        .await;

    let (local, mut remote) = tokio::io::duplex(4096);
    harness
        .send(TransportEvent::Incoming {
            device: peer,
            channel_id: 5,
            link: Box::new(local),
        })
        .await;
    harness
        .expect_notices(&[
            state(BridgeState::Open),
            BridgeNotice::Connected {
                device: "Touch Bar".to_string(),
            },
        ])
        .await;

    // The abandoned outbound attempt completing later changes nothing.
    let (late, _late_remote) = tokio::io::duplex(64);
    harness
        .send(TransportEvent::Opened {
            attempt: 1,
            result: Ok(Box::new(late)),
        })
        .await;
    assert!(harness.drain().await.is_empty());

    assert_eq!(harness.handle.write(vec![0x7f]).await.unwrap(), 1);
    let mut buf = [0u8; 1];
    remote.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, [0x7f]);
    assert_eq!(transport.open_calls(), 1);
}

#[tokio::test]
async fn test_disconnect_while_negotiating_drops_open() {
    let transport = MockTransport::new(OpenBehavior::Hang);
    let peer = device(23, "Touch Bar");
    transport.advertise(&peer, 5);
    let mut harness = Harness::start(transport, BridgeConfig::default());

    harness.send(TransportEvent::Connected(peer.clone())).await;
    harness
        .expect_notices(&[
            state(BridgeState::AwaitingServiceMatch),
            state(BridgeState::ChannelNegotiating),
        ])
        .await;

    harness.send(TransportEvent::Disconnected(peer)).await;
    harness
        .expect_notices(&[
            BridgeNotice::Status("Device disconnected: Touch Bar".to_string()),
            state(BridgeState::Closed),
            state(BridgeState::Idle),
        ])
        .await;

    let (late, _remote) = tokio::io::duplex(64);
    harness
        .send(TransportEvent::Opened {
            attempt: 1,
            result: Ok(Box::new(late)),
        })
        .await;
    assert!(harness.drain().await.is_empty());
    assert_eq!(harness.handle.state().await, BridgeState::Idle);
}

#[tokio::test]
async fn test_second_peer_supersedes_when_configured() {
    let transport = MockTransport::new(OpenBehavior::Succeed);
    let first = device(14, "Touch Bar");
    let second = device(15, "Other Bar");
    transport.advertise(&first, 5);
    transport.advertise(&second, 6);
    let config = BridgeConfig {
        connection_policy: ConnectionPolicy::Supersede,
        ..BridgeConfig::default()
    };
    let mut harness = Harness::start(transport.clone(), config);

    harness.open(&first).await;
    let mut old_remote = transport.take_peer();

    harness
        .send(TransportEvent::Connected(second.clone()))
        .await;
    harness
        .expect_notices(&[
            BridgeNotice::Status("Superseded by Other Bar".to_string()),
            state(BridgeState::Closed),
            state(BridgeState::Idle),
            state(BridgeState::AwaitingServiceMatch),
            state(BridgeState::ChannelNegotiating),
            state(BridgeState::Open),
            BridgeNotice::Connected {
                device: "Other Bar".to_string(),
            },
        ])
        .await;
    assert_eq!(transport.open_calls(), 2);

    // The superseded channel is released.
    let mut buf = [0u8; 1];
    let read = tokio::time::timeout(WAIT, old_remote.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(read, 0);
}

#[tokio::test]
async fn test_incoming_channel_is_accepted() {
    let transport = MockTransport::new(OpenBehavior::Succeed);
    let mut harness = Harness::start(transport.clone(), BridgeConfig::default());

    let (local, mut remote) = tokio::io::duplex(4096);
    harness
        .send(TransportEvent::Incoming {
            device: device(16, "Touch Bar"),
            channel_id: 3,
            link: Box::new(local),
        })
        .await;
    harness
        .expect_notices(&[
            state(BridgeState::Open),
            BridgeNotice::Connected {
                device: "Touch Bar".to_string(),
            },
        ])
        .await;

    assert_eq!(harness.handle.write(vec![0x42]).await.unwrap(), 1);
    let mut buf = [0u8; 1];
    remote.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, [0x42]);
    assert_eq!(transport.open_calls(), 0);
}

#[tokio::test]
async fn test_shutdown_stops_bridge() {
    let transport = MockTransport::new(OpenBehavior::Succeed);
    let harness = Harness::start(transport, BridgeConfig::default());

    harness.handle.shutdown().await;

    assert!(matches!(
        harness.handle.write(vec![0x01]).await,
        Err(WriteError::BridgeStopped)
    ));
    assert_eq!(harness.handle.state().await, BridgeState::Closed);
}
