//! Track metadata codec.
//!
//! Decodes the DIDL-Lite fragments the device reports (current track,
//! browse results) into plain records. Decoding is deliberately lenient:
//! devices answer `NOT_IMPLEMENTED`, empty strings, or fragments with
//! missing fields depending on the active source, and none of that is an
//! error worth surfacing to a caller that only wants a title to display.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{ControlError, Result};
use crate::model::BrowseEntry;

/// Metadata of the item currently loaded on the transport
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    /// Live-stream "now playing" line, radio sources only
    pub stream_content: Option<String>,
    pub album_art_uri: Option<String>,
}

/// Rewrite a device-relative album art path to an absolute URL against the
/// connected host; absolute URLs pass through unchanged.
pub(crate) fn absolutize_album_art(uri: &str, host: &str, port: u16) -> String {
    if uri.starts_with("http") {
        uri.to_string()
    } else {
        format!("http://{host}:{port}{uri}")
    }
}

/// Decode a `TrackMetaData` fragment. Missing fields map to `None`;
/// unparseable input yields an empty record with a warning.
pub fn parse_track_metadata(xml: &str, host: &str, port: u16) -> TrackMetadata {
    let trimmed = xml.trim();
    if trimmed.is_empty() || trimmed == "NOT_IMPLEMENTED" {
        return TrackMetadata::default();
    }

    let didl = match sonosdidl::parse(trimmed) {
        Ok(didl) => didl,
        Err(err) => {
            warn!("Failed to parse track metadata: {err}");
            return TrackMetadata::default();
        }
    };

    let Some(item) = didl.items.into_iter().next() else {
        return TrackMetadata::default();
    };

    TrackMetadata {
        title: item.title,
        artist: item.creator,
        stream_content: item.stream_content,
        album_art_uri: item
            .album_art
            .map(|art| absolutize_album_art(&art, host, port)),
    }
}

/// Map a `Browse` result payload into entries the caller can persist and
/// replay through `set_service_uri`.
pub(crate) fn map_browse_entries(xml: &str, host: &str, port: u16) -> Result<Vec<BrowseEntry>> {
    let trimmed = xml.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let didl = sonosdidl::parse(trimmed)
        .map_err(|err| ControlError::Protocol(format!("Failed to parse Browse result: {err}")))?;

    let entries = didl
        .items
        .into_iter()
        .map(|item| BrowseEntry {
            title: item.title.clone().unwrap_or_default(),
            uri: item
                .resources
                .first()
                .map(|res| res.uri.clone())
                .unwrap_or_default(),
            metadata: item.res_md.clone().unwrap_or_default(),
            album_art_uri: item
                .album_art
                .map(|art| absolutize_album_art(&art, host, port)),
        })
        .collect();

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAGMENT: &str = r#"<DIDL-Lite xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:upnp="urn:schemas-upnp-org:metadata-1-0/upnp/" xmlns:r="urn:schemas-rinconnetworks-com:metadata-1-0/" xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/"><item id="-1" parentID="-1" restricted="true"><dc:title>Song</dc:title><dc:creator>Artist</dc:creator><upnp:albumArtURI>/getAA?u=x-sonos-http%3atrack.mp3</upnp:albumArtURI></item></DIDL-Lite>"#;

    #[test]
    fn relative_album_art_is_rewritten_against_connected_host() {
        let metadata = parse_track_metadata(FRAGMENT, "192.168.1.50", 1400);
        assert_eq!(
            metadata.album_art_uri.as_deref(),
            Some("http://192.168.1.50:1400/getAA?u=x-sonos-http%3atrack.mp3")
        );
        assert_eq!(metadata.title.as_deref(), Some("Song"));
        assert_eq!(metadata.artist.as_deref(), Some("Artist"));
        assert!(metadata.stream_content.is_none());
    }

    #[test]
    fn absolute_album_art_passes_through() {
        let xml = r#"<DIDL-Lite xmlns:upnp="urn:schemas-upnp-org:metadata-1-0/upnp/"><item id="-1"><upnp:albumArtURI>https://cdn.example.com/art.jpg</upnp:albumArtURI></item></DIDL-Lite>"#;
        let metadata = parse_track_metadata(xml, "192.168.1.50", 1400);
        assert_eq!(
            metadata.album_art_uri.as_deref(),
            Some("https://cdn.example.com/art.jpg")
        );
    }

    #[test]
    fn not_implemented_and_empty_yield_default() {
        assert_eq!(
            parse_track_metadata("NOT_IMPLEMENTED", "h", 1400),
            TrackMetadata::default()
        );
        assert_eq!(parse_track_metadata("", "h", 1400), TrackMetadata::default());
        assert_eq!(
            parse_track_metadata("  \n ", "h", 1400),
            TrackMetadata::default()
        );
    }

    #[test]
    fn malformed_fragment_yields_default_not_error() {
        assert_eq!(
            parse_track_metadata("<broken", "h", 1400),
            TrackMetadata::default()
        );
    }

    #[test]
    fn browse_entries_carry_uri_and_res_md() {
        let xml = r#"<DIDL-Lite xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:r="urn:schemas-rinconnetworks-com:metadata-1-0/" xmlns:upnp="urn:schemas-upnp-org:metadata-1-0/upnp/"><item id="FV:2/1" parentID="FV:2"><dc:title>Radio One</dc:title><res protocolInfo="x-sonosapi-stream:*:*:*">x-sonosapi-stream:s1234?sid=254</res><r:resMD>&lt;DIDL-Lite&gt;inner&lt;/DIDL-Lite&gt;</r:resMD><upnp:albumArtURI>/getaa?s=1</upnp:albumArtURI></item></DIDL-Lite>"#;
        let entries = map_browse_entries(xml, "192.168.1.50", 1400).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Radio One");
        assert_eq!(entries[0].uri, "x-sonosapi-stream:s1234?sid=254");
        assert_eq!(entries[0].metadata, "<DIDL-Lite>inner</DIDL-Lite>");
        assert_eq!(
            entries[0].album_art_uri.as_deref(),
            Some("http://192.168.1.50:1400/getaa?s=1")
        );
    }

    #[test]
    fn empty_browse_result_is_empty_list() {
        assert!(map_browse_entries("", "h", 1400).unwrap().is_empty());
    }
}
