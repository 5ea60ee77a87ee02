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

//! Error types shared across the bridge.

use thiserror::Error;

use crate::bluetooth::sdp::SdpError;

/// Publishing the service record failed. Fatal at startup.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Bluetooth service unavailable: {0}")]
    Unavailable(#[from] bluer::Error),

    #[error("Invalid service record: {0}")]
    InvalidRecord(String),
}

/// Failures while handling a connected peer.
///
/// None of these are fatal; the bridge logs them and returns to idle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("Device does not advertise the debug service")]
    ServiceNotFound,

    #[error("Service record lacks a usable RFCOMM channel id")]
    ChannelIdUnavailable,

    #[error("RFCOMM channel open failed with status {0}")]
    OpenFailed(i32),

    #[error("RFCOMM channel open timed out after {0} ms")]
    OpenTimedOut(u64),

    #[error("Service lookup failed: {0}")]
    Lookup(String),
}

/// Failures of a caller-initiated write.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("Cannot write data when channel is not open")]
    NotConnected,

    #[error("Payload of {len} bytes exceeds the {max} byte write limit")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Channel write failed: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Bridge has stopped")]
    BridgeStopped,
}

/// Malformed hex input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Odd number of hex digits ({0})")]
    OddLength(usize),

    #[error("Invalid hex digit {character:?} at position {index}")]
    InvalidDigit { character: char, index: usize },
}

/// Platform transport failures.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("BlueZ error: {0}")]
    Bluez(#[from] bluer::Error),

    #[error("SDP error: {0}")]
    Sdp(#[from] SdpError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
