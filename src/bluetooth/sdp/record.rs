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

//! The debug service record and attribute list helpers.

use uuid::Uuid;

use super::element::{expand_uuid, DataElement};
use super::{attribute_id, protocol_uuid, SdpError};

/// Touch debug service, `718b484e-ed00-416a-b19a-e80b32c1b477`.
pub const DEBUG_SERVICE_UUID: Uuid = Uuid::from_bytes([
    0x71, 0x8B, 0x48, 0x4E, 0xED, 0x00, 0x41, 0x6A, 0xB1, 0x9A, 0xE8, 0x0B, 0x32, 0xC1, 0xB4, 0x77,
]);

/// Default human-readable service name.
pub const DEFAULT_SERVICE_NAME: &str = "Touch Debug Profile";

/// Highest RFCOMM server channel.
pub const MAX_RFCOMM_CHANNEL: u8 = 30;

/// A layer of the protocol descriptor list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    L2cap,
    Rfcomm,
}

impl Protocol {
    pub fn uuid16(self) -> u16 {
        match self {
            Protocol::L2cap => protocol_uuid::L2CAP,
            Protocol::Rfcomm => protocol_uuid::RFCOMM,
        }
    }
}

/// An SDP attribute id with its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeEntry {
    pub id: u16,
    pub value: DataElement,
}

impl AttributeEntry {
    pub fn new(id: u16, value: DataElement) -> Self {
        Self { id, value }
    }
}

/// Immutable description of the service we publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    pub uuid: Uuid,
    pub name: String,
    pub protocols: Vec<Protocol>,
    /// 0 lets the stack pick a channel when the service is published.
    pub requested_channel: u8,
}

impl ServiceRecord {
    /// Record for `uuid` carried over L2CAP then RFCOMM on an auto-allocated channel.
    pub fn new(uuid: Uuid, name: impl Into<String>) -> Self {
        Self {
            uuid,
            name: name.into(),
            protocols: vec![Protocol::L2cap, Protocol::Rfcomm],
            requested_channel: 0,
        }
    }

    pub fn with_channel(mut self, channel: u8) -> Self {
        self.requested_channel = channel;
        self
    }

    /// Check the record can be published.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("service name is empty".to_string());
        }
        if self.requested_channel > MAX_RFCOMM_CHANNEL {
            return Err(format!(
                "requested channel {} is outside 0..={}",
                self.requested_channel, MAX_RFCOMM_CHANNEL
            ));
        }
        if self.protocols.last() != Some(&Protocol::Rfcomm) {
            return Err("protocol stack must end with RFCOMM".to_string());
        }
        Ok(())
    }

    /// Attributes in ascending id order.
    pub fn attributes(&self) -> Vec<AttributeEntry> {
        let descriptors = self
            .protocols
            .iter()
            .map(|protocol| {
                let mut layer = vec![DataElement::Uuid16(protocol.uuid16())];
                if *protocol == Protocol::Rfcomm {
                    layer.push(DataElement::UnsignedInt8(self.requested_channel));
                }
                DataElement::Sequence(layer)
            })
            .collect();

        vec![
            AttributeEntry::new(
                attribute_id::SERVICE_CLASS_ID_LIST,
                DataElement::Sequence(vec![DataElement::Uuid128(self.uuid)]),
            ),
            AttributeEntry::new(
                attribute_id::PROTOCOL_DESCRIPTOR_LIST,
                DataElement::Sequence(descriptors),
            ),
            AttributeEntry::new(
                attribute_id::ENGLISH_SERVICE_NAME,
                DataElement::Text(self.name.clone()),
            ),
        ]
    }

    /// Encode as an SDP attribute list: a sequence of id/value pairs.
    pub fn encode(&self) -> Result<Vec<u8>, SdpError> {
        let mut items = Vec::new();
        for entry in self.attributes() {
            items.push(DataElement::UnsignedInt16(entry.id));
            items.push(entry.value);
        }
        DataElement::Sequence(items).to_bytes()
    }
}

/// Split an attribute list element into entries.
pub fn attribute_list(element: &DataElement) -> Result<Vec<AttributeEntry>, SdpError> {
    let DataElement::Sequence(items) = element else {
        return Err(SdpError::InvalidAttributeList);
    };
    if items.len() % 2 != 0 {
        return Err(SdpError::InvalidAttributeList);
    }

    items
        .chunks(2)
        .map(|pair| match &pair[0] {
            DataElement::UnsignedInt16(id) => Ok(AttributeEntry::new(*id, pair[1].clone())),
            _ => Err(SdpError::InvalidAttributeList),
        })
        .collect()
}

/// Decode a ServiceSearchAttribute response body: a sequence of attribute lists.
pub fn parse_attribute_lists(data: &[u8]) -> Result<Vec<Vec<AttributeEntry>>, SdpError> {
    let (element, used) = DataElement::decode(data)?;
    if used != data.len() {
        return Err(SdpError::InvalidAttributeList);
    }
    let DataElement::Sequence(records) = element else {
        return Err(SdpError::InvalidAttributeList);
    };
    records.iter().map(attribute_list).collect()
}

/// Find the RFCOMM server channel in a record's protocol descriptor list.
///
/// Channel ids outside 1..=30, including the unallocated placeholder 0, are
/// treated as absent.
pub fn rfcomm_channel(attributes: &[AttributeEntry]) -> Option<u8> {
    let rfcomm = expand_uuid(u32::from(protocol_uuid::RFCOMM));

    let list = attributes
        .iter()
        .find(|entry| entry.id == attribute_id::PROTOCOL_DESCRIPTOR_LIST)?;

    let mut layers = list.value.as_sequence()?;
    // Alternatives wrap several complete stacks; take the first.
    if let DataElement::Alternative(stacks) = &list.value {
        layers = stacks.first()?.as_sequence()?;
    }

    layers
        .iter()
        .filter_map(DataElement::as_sequence)
        .find(|layer| layer.first().and_then(DataElement::as_uuid) == Some(rfcomm))
        .and_then(|layer| layer.get(1))
        .and_then(DataElement::as_u16)
        .and_then(|channel| u8::try_from(channel).ok())
        .filter(|channel| (1..=MAX_RFCOMM_CHANNEL).contains(channel))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ServiceRecord {
        ServiceRecord::new(DEBUG_SERVICE_UUID, DEFAULT_SERVICE_NAME)
    }

    #[test]
    fn test_service_uuid_bytes() {
        assert_eq!(
            DEBUG_SERVICE_UUID.to_string(),
            "718b484e-ed00-416a-b19a-e80b32c1b477"
        );
    }

    #[test]
    fn test_name_uses_english_language_base() {
        let attributes = record().attributes();
        let name = attributes
            .iter()
            .find(|entry| entry.id == 0x0100)
            .expect("name attribute");
        assert_eq!(name.value, DataElement::Text("Touch Debug Profile".to_string()));
    }

    #[test]
    fn test_protocol_descriptor_requests_auto_channel() {
        let attributes = record().attributes();
        let descriptor = attributes
            .iter()
            .find(|entry| entry.id == attribute_id::PROTOCOL_DESCRIPTOR_LIST)
            .unwrap();

        assert_eq!(
            descriptor.value.to_bytes().unwrap(),
            vec![0x35, 0x0C, 0x35, 0x03, 0x19, 0x01, 0x00, 0x35, 0x05, 0x19, 0x00, 0x03, 0x08, 0x00]
        );
    }

    #[test]
    fn test_encoded_record_parses_back() {
        let bytes = record().with_channel(5).encode().unwrap();
        let (element, _) = DataElement::decode(&bytes).unwrap();
        let attributes = attribute_list(&element).unwrap();

        assert_eq!(attributes, record().with_channel(5).attributes());
        assert_eq!(rfcomm_channel(&attributes), Some(5));
    }

    #[test]
    fn test_placeholder_channel_is_not_usable() {
        assert_eq!(rfcomm_channel(&record().attributes()), None);
    }

    #[test]
    fn test_missing_protocol_list() {
        let attributes = vec![AttributeEntry::new(
            attribute_id::SERVICE_CLASS_ID_LIST,
            DataElement::Sequence(vec![DataElement::Uuid128(DEBUG_SERVICE_UUID)]),
        )];
        assert_eq!(rfcomm_channel(&attributes), None);
    }

    #[test]
    fn test_l2cap_only_stack_has_no_channel() {
        let attributes = vec![AttributeEntry::new(
            attribute_id::PROTOCOL_DESCRIPTOR_LIST,
            DataElement::Sequence(vec![DataElement::Sequence(vec![
                DataElement::Uuid16(protocol_uuid::L2CAP),
                DataElement::UnsignedInt16(0x1001),
            ])]),
        )];
        assert_eq!(rfcomm_channel(&attributes), None);
    }

    #[test]
    fn test_channel_from_alternative_stacks() {
        let stack = DataElement::Sequence(vec![
            DataElement::Sequence(vec![DataElement::Uuid16(protocol_uuid::L2CAP)]),
            DataElement::Sequence(vec![
                DataElement::Uuid128(expand_uuid(u32::from(protocol_uuid::RFCOMM))),
                DataElement::UnsignedInt8(12),
            ]),
        ]);
        let attributes = vec![AttributeEntry::new(
            attribute_id::PROTOCOL_DESCRIPTOR_LIST,
            DataElement::Alternative(vec![stack]),
        )];
        assert_eq!(rfcomm_channel(&attributes), Some(12));
    }

    #[test]
    fn test_validate() {
        assert!(record().validate().is_ok());
        assert!(record().with_channel(30).validate().is_ok());
        assert!(record().with_channel(31).validate().is_err());
        assert!(ServiceRecord::new(DEBUG_SERVICE_UUID, "  ").validate().is_err());

        let mut l2cap_only = record();
        l2cap_only.protocols = vec![Protocol::L2cap];
        assert!(l2cap_only.validate().is_err());
    }

    #[test]
    fn test_attribute_lists_need_u16_ids() {
        let bad = DataElement::Sequence(vec![DataElement::Sequence(vec![
            DataElement::UnsignedInt8(1),
            DataElement::Nil,
        ])])
        .to_bytes()
        .unwrap();
        assert_eq!(parse_attribute_lists(&bad), Err(SdpError::InvalidAttributeList));

        let empty = DataElement::Sequence(vec![]).to_bytes().unwrap();
        assert_eq!(parse_attribute_lists(&empty).unwrap(), Vec::<Vec<AttributeEntry>>::new());
    }
}
