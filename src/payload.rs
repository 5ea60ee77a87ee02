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

//! Raw payloads and the hex codec used for console input and logging.

use crate::error::DecodeError;

/// Bytes exchanged over the channel. No framing, no checksum.
pub type RawPayload = Vec<u8>;

/// Decode user-typed hex into bytes.
///
/// Whitespace anywhere in the input is ignored. Digits may be either case.
pub fn decode_hex(input: &str) -> Result<RawPayload, DecodeError> {
    let digits: String = input.chars().filter(|c| !c.is_whitespace()).collect();

    if digits.is_empty() {
        return Ok(Vec::new());
    }

    let count = digits.chars().count();
    if count % 2 != 0 {
        return Err(DecodeError::OddLength(count));
    }

    if let Some((index, character)) = digits
        .chars()
        .enumerate()
        .find(|(_, c)| !c.is_ascii_hexdigit())
    {
        return Err(DecodeError::InvalidDigit { character, index });
    }

    // Only ASCII hex digits remain.
    hex::decode(&digits).map_err(|_| DecodeError::OddLength(count))
}

/// Render bytes as lowercase hex pairs with no separators.
pub fn encode_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}
