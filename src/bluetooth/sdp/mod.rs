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

//! Service Discovery Protocol support.
//!
//! Data element codec, the debug service record, and a minimal client for
//! looking up a peer's record over L2CAP.

pub mod client;
pub mod element;
pub mod record;

pub use client::SdpClient;
pub use element::DataElement;
pub use record::{
    parse_attribute_lists, rfcomm_channel, AttributeEntry, Protocol, ServiceRecord,
    DEBUG_SERVICE_UUID, DEFAULT_SERVICE_NAME,
};

use thiserror::Error;

/// L2CAP PSM of the SDP server.
pub const SDP_PSM: u16 = 0x0001;

/// Attribute ids used by the debug service record.
pub mod attribute_id {
    pub const SERVICE_CLASS_ID_LIST: u16 = 0x0001;
    pub const PROTOCOL_DESCRIPTOR_LIST: u16 = 0x0004;

    /// Service name, before the language base offset is applied.
    pub const SERVICE_NAME_OFFSET: u16 = 0x0000;

    /// Language base for English. Name attributes are only recognised by
    /// peers when offset by this value.
    pub const ENGLISH_LANGUAGE_BASE: u16 = 0x0100;

    pub const ENGLISH_SERVICE_NAME: u16 = ENGLISH_LANGUAGE_BASE + SERVICE_NAME_OFFSET;
}

/// 16-bit protocol UUIDs.
pub mod protocol_uuid {
    pub const RFCOMM: u16 = 0x0003;
    pub const L2CAP: u16 = 0x0100;
}

/// SDP errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SdpError {
    #[error("Data element truncated")]
    Truncated,

    #[error("Invalid data element descriptor 0x{0:02x}")]
    InvalidDescriptor(u8),

    #[error("Malformed attribute list")]
    InvalidAttributeList,

    #[error("Element too large to encode")]
    TooLarge,

    #[error("Remote SDP server returned error 0x{0:04x}")]
    Remote(u16),

    #[error("Unexpected SDP PDU 0x{0:02x}")]
    UnexpectedPdu(u8),

    #[error("Transaction id mismatch: expected {expected}, got {actual}")]
    TransactionMismatch { expected: u16, actual: u16 },

    #[error("Invalid continuation state")]
    InvalidContinuation,
}
