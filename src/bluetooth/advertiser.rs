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

//! Service record publication.

use bluer::rfcomm::{Profile, ProfileHandle, Role};
use bluer::Session;
use tracing::{debug, info};

use super::sdp::ServiceRecord;
use crate::error::PublishError;
use crate::payload::encode_hex;

/// A published service. Dropping it unpublishes the record.
pub struct PublishedService {
    pub record: ServiceRecord,
    handle: Option<ProfileHandle>,
}

impl PublishedService {
    /// Take the stream of inbound connection requests for the service.
    ///
    /// Can only be taken once; the record stays published while the returned
    /// handle is alive.
    pub fn take_requests(&mut self) -> Option<ProfileHandle> {
        self.handle.take()
    }
}

/// BlueZ profile for a record.
///
/// A requested channel of 0 leaves the channel unset so bluetoothd picks one.
pub fn profile_for(record: &ServiceRecord) -> Profile {
    Profile {
        uuid: record.uuid,
        name: Some(record.name.clone()),
        role: Some(Role::Server),
        channel: match record.requested_channel {
            0 => None,
            channel => Some(u16::from(channel)),
        },
        require_authentication: Some(false),
        require_authorization: Some(false),
        auto_connect: Some(false),
        ..Default::default()
    }
}

/// Publish `record` with the system SDP server.
pub async fn publish(
    session: &Session,
    record: &ServiceRecord,
) -> Result<PublishedService, PublishError> {
    record.validate().map_err(PublishError::InvalidRecord)?;

    if let Ok(encoded) = record.encode() {
        debug!("Service record attributes: {}", encode_hex(&encoded));
    }

    let handle = session.register_profile(profile_for(record)).await?;
    info!(
        "Published service '{}' ({}), channel {}",
        record.name,
        record.uuid,
        match record.requested_channel {
            0 => "auto".to_string(),
            channel => channel.to_string(),
        }
    );

    Ok(PublishedService {
        record: record.clone(),
        handle: Some(handle),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::sdp::{DEBUG_SERVICE_UUID, DEFAULT_SERVICE_NAME};

    #[test]
    fn test_auto_channel_is_left_to_bluez() {
        let record = ServiceRecord::new(DEBUG_SERVICE_UUID, DEFAULT_SERVICE_NAME);
        let profile = profile_for(&record);

        assert_eq!(profile.uuid, DEBUG_SERVICE_UUID);
        assert_eq!(profile.name.as_deref(), Some("Touch Debug Profile"));
        assert_eq!(profile.channel, None);
        assert!(matches!(profile.role, Some(Role::Server)));
    }

    #[test]
    fn test_fixed_channel_is_requested() {
        let record = ServiceRecord::new(DEBUG_SERVICE_UUID, DEFAULT_SERVICE_NAME).with_channel(4);
        assert_eq!(profile_for(&record).channel, Some(4));
    }
}
