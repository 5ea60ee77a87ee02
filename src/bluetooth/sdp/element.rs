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

//! SDP data element encoding and decoding.
//!
//! Every element starts with a descriptor byte: the element type in the upper
//! five bits and a size index in the lower three. Size indices 0-4 mean a fixed
//! 1/2/4/8/16 byte value; 5-7 mean a u8/u16/u32 big-endian length follows.

use uuid::Uuid;

use super::SdpError;

/// `00000000-0000-1000-8000-00805F9B34FB`
const BLUETOOTH_BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5F9B_34FB;

mod kind {
    pub const NIL: u8 = 0;
    pub const UNSIGNED: u8 = 1;
    pub const SIGNED: u8 = 2;
    pub const UUID: u8 = 3;
    pub const TEXT: u8 = 4;
    pub const BOOLEAN: u8 = 5;
    pub const SEQUENCE: u8 = 6;
    pub const ALTERNATIVE: u8 = 7;
    pub const URL: u8 = 8;
}

/// A single SDP data element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataElement {
    Nil,
    UnsignedInt8(u8),
    UnsignedInt16(u16),
    UnsignedInt32(u32),
    UnsignedInt64(u64),
    SignedInt8(i8),
    SignedInt16(i16),
    SignedInt32(i32),
    SignedInt64(i64),
    Uuid16(u16),
    Uuid32(u32),
    Uuid128(Uuid),
    Text(String),
    Boolean(bool),
    Sequence(Vec<DataElement>),
    Alternative(Vec<DataElement>),
    Url(String),
}

fn descriptor(kind: u8, size_index: u8) -> u8 {
    (kind << 3) | size_index
}

/// Expand a short Bluetooth UUID onto the base UUID.
pub fn expand_uuid(short: u32) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | (u128::from(short) << 96))
}

impl DataElement {
    /// The element as a full 128-bit UUID, if it is any UUID form.
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            DataElement::Uuid16(v) => Some(expand_uuid(u32::from(*v))),
            DataElement::Uuid32(v) => Some(expand_uuid(*v)),
            DataElement::Uuid128(u) => Some(*u),
            _ => None,
        }
    }

    pub fn as_u16(&self) -> Option<u16> {
        match self {
            DataElement::UnsignedInt8(v) => Some(u16::from(*v)),
            DataElement::UnsignedInt16(v) => Some(*v),
            _ => None,
        }
    }

    /// Child elements of a sequence or alternative.
    pub fn as_sequence(&self) -> Option<&[DataElement]> {
        match self {
            DataElement::Sequence(items) | DataElement::Alternative(items) => Some(items),
            _ => None,
        }
    }

    /// Append the encoded element to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) -> Result<(), SdpError> {
        match self {
            DataElement::Nil => out.push(descriptor(kind::NIL, 0)),
            DataElement::UnsignedInt8(v) => {
                out.push(descriptor(kind::UNSIGNED, 0));
                out.push(*v);
            }
            DataElement::UnsignedInt16(v) => {
                out.push(descriptor(kind::UNSIGNED, 1));
                out.extend_from_slice(&v.to_be_bytes());
            }
            DataElement::UnsignedInt32(v) => {
                out.push(descriptor(kind::UNSIGNED, 2));
                out.extend_from_slice(&v.to_be_bytes());
            }
            DataElement::UnsignedInt64(v) => {
                out.push(descriptor(kind::UNSIGNED, 3));
                out.extend_from_slice(&v.to_be_bytes());
            }
            DataElement::SignedInt8(v) => {
                out.push(descriptor(kind::SIGNED, 0));
                out.extend_from_slice(&v.to_be_bytes());
            }
            DataElement::SignedInt16(v) => {
                out.push(descriptor(kind::SIGNED, 1));
                out.extend_from_slice(&v.to_be_bytes());
            }
            DataElement::SignedInt32(v) => {
                out.push(descriptor(kind::SIGNED, 2));
                out.extend_from_slice(&v.to_be_bytes());
            }
            DataElement::SignedInt64(v) => {
                out.push(descriptor(kind::SIGNED, 3));
                out.extend_from_slice(&v.to_be_bytes());
            }
            DataElement::Uuid16(v) => {
                out.push(descriptor(kind::UUID, 1));
                out.extend_from_slice(&v.to_be_bytes());
            }
            DataElement::Uuid32(v) => {
                out.push(descriptor(kind::UUID, 2));
                out.extend_from_slice(&v.to_be_bytes());
            }
            DataElement::Uuid128(u) => {
                out.push(descriptor(kind::UUID, 4));
                out.extend_from_slice(u.as_bytes());
            }
            DataElement::Boolean(v) => {
                out.push(descriptor(kind::BOOLEAN, 0));
                out.push(u8::from(*v));
            }
            DataElement::Text(s) => write_variable(out, kind::TEXT, s.as_bytes())?,
            DataElement::Url(s) => write_variable(out, kind::URL, s.as_bytes())?,
            DataElement::Sequence(items) => {
                write_variable(out, kind::SEQUENCE, &encode_all(items)?)?
            }
            DataElement::Alternative(items) => {
                write_variable(out, kind::ALTERNATIVE, &encode_all(items)?)?
            }
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SdpError> {
        let mut out = Vec::new();
        self.encode(&mut out)?;
        Ok(out)
    }

    /// Decode one element from the front of `data`.
    ///
    /// Returns the element and the number of bytes consumed.
    pub fn decode(data: &[u8]) -> Result<(Self, usize), SdpError> {
        let mut reader = Reader::new(data);
        let element = reader.element()?;
        Ok((element, reader.position))
    }
}

fn encode_all(items: &[DataElement]) -> Result<Vec<u8>, SdpError> {
    let mut body = Vec::new();
    for item in items {
        item.encode(&mut body)?;
    }
    Ok(body)
}

/// Write a length-prefixed element using the smallest length field.
fn write_variable(out: &mut Vec<u8>, kind: u8, body: &[u8]) -> Result<(), SdpError> {
    if let Ok(len) = u8::try_from(body.len()) {
        out.push(descriptor(kind, 5));
        out.push(len);
    } else if let Ok(len) = u16::try_from(body.len()) {
        out.push(descriptor(kind, 6));
        out.extend_from_slice(&len.to_be_bytes());
    } else {
        let len = u32::try_from(body.len()).map_err(|_| SdpError::TooLarge)?;
        out.push(descriptor(kind, 7));
        out.extend_from_slice(&len.to_be_bytes());
    }
    out.extend_from_slice(body);
    Ok(())
}

struct Reader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    fn is_empty(&self) -> bool {
        self.position >= self.data.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], SdpError> {
        let end = self.position.checked_add(n).ok_or(SdpError::Truncated)?;
        let slice = self
            .data
            .get(self.position..end)
            .ok_or(SdpError::Truncated)?;
        self.position = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], SdpError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Body of a variable-length element.
    fn variable(&mut self, descriptor: u8) -> Result<&'a [u8], SdpError> {
        let len = match descriptor & 0x07 {
            5 => usize::from(u8::from_be_bytes(self.array()?)),
            6 => usize::from(u16::from_be_bytes(self.array()?)),
            7 => u32::from_be_bytes(self.array()?) as usize,
            _ => return Err(SdpError::InvalidDescriptor(descriptor)),
        };
        self.take(len)
    }

    fn element(&mut self) -> Result<DataElement, SdpError> {
        let [d] = self.array::<1>()?;

        let element = match (d >> 3, d & 0x07) {
            (kind::NIL, 0) => DataElement::Nil,
            (kind::UNSIGNED, 0) => DataElement::UnsignedInt8(u8::from_be_bytes(self.array()?)),
            (kind::UNSIGNED, 1) => DataElement::UnsignedInt16(u16::from_be_bytes(self.array()?)),
            (kind::UNSIGNED, 2) => DataElement::UnsignedInt32(u32::from_be_bytes(self.array()?)),
            (kind::UNSIGNED, 3) => DataElement::UnsignedInt64(u64::from_be_bytes(self.array()?)),
            (kind::SIGNED, 0) => DataElement::SignedInt8(i8::from_be_bytes(self.array()?)),
            (kind::SIGNED, 1) => DataElement::SignedInt16(i16::from_be_bytes(self.array()?)),
            (kind::SIGNED, 2) => DataElement::SignedInt32(i32::from_be_bytes(self.array()?)),
            (kind::SIGNED, 3) => DataElement::SignedInt64(i64::from_be_bytes(self.array()?)),
            (kind::UUID, 1) => DataElement::Uuid16(u16::from_be_bytes(self.array()?)),
            (kind::UUID, 2) => DataElement::Uuid32(u32::from_be_bytes(self.array()?)),
            (kind::UUID, 4) => DataElement::Uuid128(Uuid::from_bytes(self.array()?)),
            (kind::BOOLEAN, 0) => DataElement::Boolean(self.array::<1>()?[0] != 0),
            (kind::TEXT, 5..=7) => DataElement::Text(text(self.variable(d)?)),
            (kind::URL, 5..=7) => DataElement::Url(text(self.variable(d)?)),
            (kind::SEQUENCE, 5..=7) => DataElement::Sequence(decode_all(self.variable(d)?)?),
            (kind::ALTERNATIVE, 5..=7) => {
                DataElement::Alternative(decode_all(self.variable(d)?)?)
            }
            _ => return Err(SdpError::InvalidDescriptor(d)),
        };

        Ok(element)
    }
}

/// Peers commonly NUL-terminate strings.
fn text(body: &[u8]) -> String {
    String::from_utf8_lossy(body)
        .trim_end_matches('\0')
        .to_string()
}

fn decode_all(body: &[u8]) -> Result<Vec<DataElement>, SdpError> {
    let mut reader = Reader::new(body);
    let mut items = Vec::new();
    while !reader.is_empty() {
        items.push(reader.element()?);
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_size_encoding() {
        assert_eq!(DataElement::UnsignedInt8(0).to_bytes().unwrap(), vec![0x08, 0x00]);
        assert_eq!(
            DataElement::UnsignedInt16(0x0100).to_bytes().unwrap(),
            vec![0x09, 0x01, 0x00]
        );
        assert_eq!(
            DataElement::Uuid16(0x0003).to_bytes().unwrap(),
            vec![0x19, 0x00, 0x03]
        );
        assert_eq!(DataElement::Nil.to_bytes().unwrap(), vec![0x00]);
        assert_eq!(DataElement::Boolean(true).to_bytes().unwrap(), vec![0x28, 0x01]);
    }

    #[test]
    fn test_uuid128_encoding() {
        let uuid = Uuid::from_u128(0x718b484e_ed00_416a_b19a_e80b32c1b477);
        let bytes = DataElement::Uuid128(uuid).to_bytes().unwrap();
        assert_eq!(bytes[0], 0x1C);
        assert_eq!(&bytes[1..], uuid.as_bytes());
    }

    #[test]
    fn test_text_length_prefix_grows() {
        let short = DataElement::Text("ab".to_string()).to_bytes().unwrap();
        assert_eq!(short, vec![0x25, 0x02, b'a', b'b']);

        let long = DataElement::Text("x".repeat(300)).to_bytes().unwrap();
        assert_eq!(&long[..3], &[0x26, 0x01, 0x2C]);
        assert_eq!(long.len(), 303);
    }

    #[test]
    fn test_nested_sequence_decodes() {
        let element = DataElement::Sequence(vec![
            DataElement::Sequence(vec![DataElement::Uuid16(0x0100)]),
            DataElement::Sequence(vec![
                DataElement::Uuid16(0x0003),
                DataElement::UnsignedInt8(4),
            ]),
        ]);
        let bytes = element.to_bytes().unwrap();
        assert_eq!(
            bytes,
            vec![0x35, 0x0C, 0x35, 0x03, 0x19, 0x01, 0x00, 0x35, 0x05, 0x19, 0x00, 0x03, 0x08, 0x04]
        );

        let (decoded, used) = DataElement::decode(&bytes).unwrap();
        assert_eq!(decoded, element);
        assert_eq!(used, bytes.len());
    }

    #[test]
    fn test_decode_reports_consumed_length() {
        let (element, used) = DataElement::decode(&[0x08, 0x07, 0xFF, 0xFF]).unwrap();
        assert_eq!(element, DataElement::UnsignedInt8(7));
        assert_eq!(used, 2);
    }

    #[test]
    fn test_signed_and_wide_values() {
        let (element, _) = DataElement::decode(&[0x10, 0xFF]).unwrap();
        assert_eq!(element, DataElement::SignedInt8(-1));

        let (element, _) =
            DataElement::decode(&[0x0B, 0, 0, 0, 0, 0, 0, 0x01, 0x00]).unwrap();
        assert_eq!(element, DataElement::UnsignedInt64(256));
    }

    #[test]
    fn test_text_strips_nul_terminator() {
        let (element, _) = DataElement::decode(&[0x25, 0x03, b'h', b'i', 0x00]).unwrap();
        assert_eq!(element, DataElement::Text("hi".to_string()));
    }

    #[test]
    fn test_truncated_input() {
        assert_eq!(DataElement::decode(&[]), Err(SdpError::Truncated));
        assert_eq!(DataElement::decode(&[0x09, 0x01]), Err(SdpError::Truncated));
        assert_eq!(DataElement::decode(&[0x25, 0x05, b'a']), Err(SdpError::Truncated));
    }

    #[test]
    fn test_sequence_child_overrunning_parent() {
        // Sequence declares 2 bytes but its child needs 3.
        assert_eq!(
            DataElement::decode(&[0x35, 0x02, 0x19, 0x01, 0x00]),
            Err(SdpError::Truncated)
        );
    }

    #[test]
    fn test_invalid_descriptor() {
        // Unsigned integer with a variable-length size index.
        assert_eq!(DataElement::decode(&[0x0D, 0x01]), Err(SdpError::InvalidDescriptor(0x0D)));
        // Type 9 is reserved.
        assert_eq!(DataElement::decode(&[0x48]), Err(SdpError::InvalidDescriptor(0x48)));
    }

    #[test]
    fn test_short_uuids_expand_onto_base() {
        let rfcomm = DataElement::Uuid16(0x0003).as_uuid().unwrap();
        assert_eq!(rfcomm.to_string(), "00000003-0000-1000-8000-00805f9b34fb");
        assert_eq!(DataElement::Uuid32(0x0003).as_uuid(), Some(rfcomm));
        assert_eq!(DataElement::UnsignedInt8(3).as_uuid(), None);
    }
}
