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

//! Minimal SDP client.
//!
//! Only the ServiceSearchAttribute transaction is implemented: it finds the
//! records matching one UUID and returns all of their attributes in a single
//! exchange (plus continuations).

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use super::element::DataElement;
use super::record::{parse_attribute_lists, AttributeEntry};
use super::SdpError;
use crate::error::TransportError;

/// PDU ids.
pub mod pdu {
    pub const ERROR_RESPONSE: u8 = 0x01;
    pub const SERVICE_SEARCH_ATTRIBUTE_REQUEST: u8 = 0x06;
    pub const SERVICE_SEARCH_ATTRIBUTE_RESPONSE: u8 = 0x07;
}

const HEADER_LEN: usize = 5;

/// Largest attribute byte count requested per response.
const MAX_ATTRIBUTE_BYTES: u16 = 0x0400;

/// Continuation state is at most 16 bytes.
const MAX_CONTINUATION_LEN: usize = 16;

/// Upper bound on continuation round trips for one transaction.
const MAX_CONTINUATIONS: usize = 64;

const RECV_BUFFER_LEN: usize = 2048;

/// A packet-oriented channel to a peer's SDP server.
#[async_trait]
pub trait PduSocket: Send {
    async fn send_pdu(&mut self, pdu: &[u8]) -> std::io::Result<()>;
    async fn recv_pdu(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
}

#[async_trait]
impl PduSocket for bluer::l2cap::SeqPacket {
    async fn send_pdu(&mut self, pdu: &[u8]) -> std::io::Result<()> {
        self.send(pdu).await?;
        Ok(())
    }

    async fn recv_pdu(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.recv(buf).await
    }
}

/// Encode a ServiceSearchAttributeRequest for every attribute of records
/// matching `uuid`.
pub fn encode_search_attribute_request(
    transaction_id: u16,
    uuid: Uuid,
    continuation: &[u8],
) -> Result<Vec<u8>, SdpError> {
    if continuation.len() > MAX_CONTINUATION_LEN {
        return Err(SdpError::InvalidContinuation);
    }

    let mut params = Vec::new();
    DataElement::Sequence(vec![DataElement::Uuid128(uuid)]).encode(&mut params)?;
    params.extend_from_slice(&MAX_ATTRIBUTE_BYTES.to_be_bytes());
    DataElement::Sequence(vec![DataElement::UnsignedInt32(0x0000_FFFF)]).encode(&mut params)?;
    params.push(continuation.len() as u8);
    params.extend_from_slice(continuation);

    let param_len = u16::try_from(params.len()).map_err(|_| SdpError::TooLarge)?;

    let mut pdu = Vec::with_capacity(HEADER_LEN + params.len());
    pdu.push(pdu::SERVICE_SEARCH_ATTRIBUTE_REQUEST);
    pdu.extend_from_slice(&transaction_id.to_be_bytes());
    pdu.extend_from_slice(&param_len.to_be_bytes());
    pdu.extend_from_slice(&params);
    Ok(pdu)
}

/// One ServiceSearchAttributeResponse fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchAttributeResponse {
    pub attribute_lists: Vec<u8>,
    pub continuation: Vec<u8>,
}

/// Decode a response PDU for the given transaction.
pub fn decode_search_attribute_response(
    transaction_id: u16,
    data: &[u8],
) -> Result<SearchAttributeResponse, SdpError> {
    if data.len() < HEADER_LEN {
        return Err(SdpError::Truncated);
    }

    let pdu_id = data[0];
    let actual = u16::from_be_bytes([data[1], data[2]]);
    let param_len = usize::from(u16::from_be_bytes([data[3], data[4]]));
    let params = data
        .get(HEADER_LEN..HEADER_LEN + param_len)
        .ok_or(SdpError::Truncated)?;

    if actual != transaction_id {
        return Err(SdpError::TransactionMismatch {
            expected: transaction_id,
            actual,
        });
    }

    match pdu_id {
        pdu::ERROR_RESPONSE => {
            let code = params.get(..2).ok_or(SdpError::Truncated)?;
            Err(SdpError::Remote(u16::from_be_bytes([code[0], code[1]])))
        }
        pdu::SERVICE_SEARCH_ATTRIBUTE_RESPONSE => {
            let count = params.get(..2).ok_or(SdpError::Truncated)?;
            let count = usize::from(u16::from_be_bytes([count[0], count[1]]));
            let lists = params.get(2..2 + count).ok_or(SdpError::Truncated)?;

            let rest = &params[2 + count..];
            let (&cont_len, cont) = rest.split_first().ok_or(SdpError::Truncated)?;
            let cont_len = usize::from(cont_len);
            if cont_len > MAX_CONTINUATION_LEN {
                return Err(SdpError::InvalidContinuation);
            }
            let continuation = cont.get(..cont_len).ok_or(SdpError::Truncated)?;

            Ok(SearchAttributeResponse {
                attribute_lists: lists.to_vec(),
                continuation: continuation.to_vec(),
            })
        }
        other => Err(SdpError::UnexpectedPdu(other)),
    }
}

/// Drives SDP transactions over a [`PduSocket`].
#[derive(Debug, Default)]
pub struct SdpClient {
    next_transaction: u16,
}

impl SdpClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn transaction_id(&mut self) -> u16 {
        let id = self.next_transaction;
        self.next_transaction = self.next_transaction.wrapping_add(1);
        id
    }

    /// Fetch the attributes of every record matching `uuid`.
    pub async fn search_attributes<S: PduSocket>(
        &mut self,
        socket: &mut S,
        uuid: Uuid,
    ) -> Result<Vec<Vec<AttributeEntry>>, TransportError> {
        let mut collected = Vec::new();
        let mut continuation = Vec::new();
        let mut buf = vec![0u8; RECV_BUFFER_LEN];

        for _ in 0..MAX_CONTINUATIONS {
            let transaction_id = self.transaction_id();
            let request = encode_search_attribute_request(transaction_id, uuid, &continuation)?;
            socket.send_pdu(&request).await?;

            let len = socket.recv_pdu(&mut buf).await?;
            let response = decode_search_attribute_response(transaction_id, &buf[..len])?;
            debug!(
                "SDP response fragment: {} bytes, continuation {} bytes",
                response.attribute_lists.len(),
                response.continuation.len()
            );

            collected.extend_from_slice(&response.attribute_lists);
            if response.continuation.is_empty() {
                return Ok(parse_attribute_lists(&collected)?);
            }
            continuation = response.continuation;
        }

        Err(SdpError::InvalidContinuation.into())
    }
}
