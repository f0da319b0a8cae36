//! # sonosdidl - DIDL-Lite parser
//!
//! Data model and parser for the DIDL-Lite metadata fragments a Sonos zone
//! player exchanges with its controllers: the `TrackMetaData` field of
//! `GetPositionInfo`, the `Result` payload of `ContentDirectory.Browse`, and
//! the `CurrentURIMetaData`/`EnqueuedURIMetaData` arguments of transport
//! actions.
//!
//! The devices are inconsistent about namespace prefixes (`dc:title` vs
//! `title`, `r:streamContent` vs `streamContent`), so every prefixed field
//! also accepts the unprefixed spelling.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while decoding a DIDL-Lite document
#[derive(Debug, Error)]
pub enum DidlError {
    #[error("DIDL-Lite parse error: {0}")]
    Parse(#[from] quick_xml::DeError),
}

/// Parse a DIDL-Lite document or fragment
pub fn parse(input: &str) -> Result<DidlLite, DidlError> {
    Ok(quick_xml::de::from_str(input)?)
}

/// Root of a DIDL-Lite document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "DIDL-Lite")]
pub struct DidlLite {
    #[serde(rename = "@xmlns", skip_serializing_if = "Option::is_none")]
    pub xmlns: Option<String>,

    #[serde(rename = "@xmlns:dc", skip_serializing_if = "Option::is_none")]
    pub xmlns_dc: Option<String>,

    #[serde(rename = "@xmlns:upnp", skip_serializing_if = "Option::is_none")]
    pub xmlns_upnp: Option<String>,

    #[serde(rename = "@xmlns:r", skip_serializing_if = "Option::is_none")]
    pub xmlns_r: Option<String>,

    #[serde(rename = "container", default)]
    pub containers: Vec<Container>,

    #[serde(rename = "item", default)]
    pub items: Vec<Item>,
}

impl DidlLite {
    /// First item of the document, if any.
    ///
    /// Track metadata fragments carry exactly one item; browse results may
    /// carry many.
    pub fn first_item(&self) -> Option<&Item> {
        self.items.first()
    }
}

/// Container holding browseable children (playlist, album, favorites folder)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
    #[serde(rename = "@id", default)]
    pub id: String,

    #[serde(rename = "@parentID", default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    #[serde(rename = "@restricted", skip_serializing_if = "Option::is_none")]
    pub restricted: Option<String>,

    #[serde(
        rename = "dc:title",
        alias = "title",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub title: Option<String>,

    #[serde(
        rename = "upnp:class",
        alias = "class",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub class: Option<String>,

    #[serde(rename = "item", default)]
    pub items: Vec<Item>,
}

/// Single playable object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    #[serde(rename = "@id", default)]
    pub id: String,

    #[serde(rename = "@parentID", default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    #[serde(rename = "@restricted", skip_serializing_if = "Option::is_none")]
    pub restricted: Option<String>,

    #[serde(
        rename = "dc:title",
        alias = "title",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub title: Option<String>,

    #[serde(
        rename = "dc:creator",
        alias = "creator",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub creator: Option<String>,

    #[serde(
        rename = "upnp:class",
        alias = "class",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub class: Option<String>,

    #[serde(
        rename = "upnp:albumArtURI",
        alias = "albumArtURI",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub album_art: Option<String>,

    /// Live-stream "now playing" line; only radio broadcasts carry it.
    #[serde(
        rename = "r:streamContent",
        alias = "streamContent",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub stream_content: Option<String>,

    /// Escaped DIDL-Lite fragment describing the item to the transport,
    /// returned alongside favorites so callers can replay it verbatim.
    #[serde(
        rename = "r:resMD",
        alias = "resMD",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub res_md: Option<String>,

    #[serde(rename = "res", default)]
    pub resources: Vec<Resource>,
}

impl Item {
    /// The primary (first) resource of the item, if any
    pub fn primary_resource(&self) -> Option<&Resource> {
        self.resources.first()
    }
}

/// Playable resource of an item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "@protocolInfo", default, skip_serializing_if = "Option::is_none")]
    pub protocol_info: Option<String>,

    #[serde(rename = "@duration", skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,

    #[serde(rename = "$text", default)]
    pub uri: String,
}
