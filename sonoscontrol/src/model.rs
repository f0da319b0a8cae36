//! Typed views over the flat SOAP response field maps.
//!
//! The wire protocol is loose: every action answers a bag of text fields.
//! Each view documents the fields its action is expected to populate and
//! fails with a protocol error only where a field is genuinely required.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::{ControlError, Result};
use crate::metadata::TrackMetadata;

fn require<'a>(
    fields: &'a HashMap<String, String>,
    name: &str,
    context: &str,
) -> Result<&'a str> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| ControlError::missing_field(name, context))
}

/// `GetTransportInfo`: CurrentTransportState, CurrentTransportStatus,
/// CurrentSpeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportInfo {
    pub current_transport_state: String,
    pub current_transport_status: String,
    pub current_speed: String,
}

impl TransportInfo {
    pub(crate) fn from_fields(fields: &HashMap<String, String>) -> Result<Self> {
        let context = "GetTransportInfoResponse";
        Ok(Self {
            current_transport_state: require(fields, "CurrentTransportState", context)?
                .to_string(),
            current_transport_status: require(fields, "CurrentTransportStatus", context)?
                .to_string(),
            current_speed: require(fields, "CurrentSpeed", context)?.to_string(),
        })
    }

    pub fn is_playing(&self) -> bool {
        self.current_transport_state == "PLAYING"
    }
}

/// `GetTransportSettings`: PlayMode, RecQualityMode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportSettings {
    pub play_mode: String,
    pub rec_quality_mode: Option<String>,
}

impl TransportSettings {
    pub(crate) fn from_fields(fields: &HashMap<String, String>) -> Result<Self> {
        Ok(Self {
            play_mode: require(fields, "PlayMode", "GetTransportSettingsResponse")?.to_string(),
            rec_quality_mode: fields.get("RecQualityMode").cloned(),
        })
    }
}

/// `GetPositionInfo`: Track, TrackDuration, RelTime, TrackMetaData.
///
/// All fields are optional; sources that expose no queue report blank or
/// `NOT_IMPLEMENTED` values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionInfo {
    /// Queue position of the current track, when resolvable
    pub track: Option<u32>,
    pub track_duration: Option<String>,
    pub rel_time: Option<String>,
    /// Raw DIDL-Lite fragment describing the current track
    pub track_metadata: Option<String>,
}

impl PositionInfo {
    pub(crate) fn from_fields(fields: &HashMap<String, String>) -> Self {
        Self {
            track: fields.get("Track").and_then(|t| t.parse().ok()),
            track_duration: fields.get("TrackDuration").cloned(),
            rel_time: fields.get("RelTime").cloned(),
            track_metadata: fields.get("TrackMetaData").cloned(),
        }
    }
}

/// Current track as shown to a user: decoded metadata plus progress
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub metadata: TrackMetadata,
    pub elapsed: Option<String>,
    pub duration: Option<String>,
}

/// One selectable entry from a `Browse` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowseEntry {
    pub title: String,
    pub uri: String,
    /// Escaped DIDL-Lite fragment to replay verbatim with the URI
    pub metadata: String,
    pub album_art_uri: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn transport_info_from_fields() {
        let map = fields(&[
            ("CurrentTransportState", "PLAYING"),
            ("CurrentTransportStatus", "OK"),
            ("CurrentSpeed", "1"),
        ]);
        let info = TransportInfo::from_fields(&map).unwrap();
        assert!(info.is_playing());
        assert_eq!(info.current_speed, "1");
    }

    #[test]
    fn transport_info_missing_state_is_protocol_error() {
        let map = fields(&[("CurrentTransportStatus", "OK")]);
        assert!(matches!(
            TransportInfo::from_fields(&map),
            Err(ControlError::Protocol(_))
        ));
    }

    #[test]
    fn position_info_tolerates_unparseable_track() {
        let map = fields(&[("Track", "NOT_IMPLEMENTED"), ("RelTime", "0:01:02")]);
        let info = PositionInfo::from_fields(&map);
        assert_eq!(info.track, None);
        assert_eq!(info.rel_time.as_deref(), Some("0:01:02"));
    }

    #[test]
    fn position_info_parses_track_number() {
        let map = fields(&[("Track", "7")]);
        assert_eq!(PositionInfo::from_fields(&map).track, Some(7));
    }
}
