//! Music-service share-link resolution.
//!
//! Recognizes public sharing links from streaming providers and converts
//! them into a [`ServiceReference`], which derives both the playable Sonos
//! URI and the DIDL-Lite metadata fragment the device pairs with it. The
//! two are always generated from the same reference because the transport
//! matches them positionally; handing it a URI with somebody else's
//! metadata plays the wrong thing or nothing.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use tracing::debug;

use crate::errors::{ControlError, Result};

/// Kind of item a share link points at, with the addressing constants the
/// device expects for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UriKind {
    Album,
    Episode,
    Track,
    Show,
    Song,
    Playlist,
    Radio,
}

impl UriKind {
    fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "album" => Some(UriKind::Album),
            "episode" => Some(UriKind::Episode),
            "track" => Some(UriKind::Track),
            "show" => Some(UriKind::Show),
            "song" => Some(UriKind::Song),
            "playlist" => Some(UriKind::Playlist),
            "radio" => Some(UriKind::Radio),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            UriKind::Album => "album",
            UriKind::Episode => "episode",
            UriKind::Track => "track",
            UriKind::Show => "show",
            UriKind::Song => "song",
            UriKind::Playlist => "playlist",
            UriKind::Radio => "radio",
        }
    }

    /// Playable URI prefix. Containers get a container reference, radio a
    /// bare streaming prefix, queued items (track/song/episode) none.
    pub fn uri_prefix(self) -> &'static str {
        match self {
            UriKind::Album => "x-rincon-cpcontainer:1004206c",
            UriKind::Show | UriKind::Playlist => "x-rincon-cpcontainer:1006206c",
            UriKind::Radio => "x-sonosapi-stream:",
            UriKind::Episode | UriKind::Track | UriKind::Song => "",
        }
    }

    /// Item-id key prefix inside the metadata fragment
    pub fn metadata_key(self) -> &'static str {
        match self {
            UriKind::Album => "00040000",
            UriKind::Episode | UriKind::Track => "00032020",
            UriKind::Show | UriKind::Playlist => "1006206c",
            UriKind::Song => "10032020",
            UriKind::Radio => "F00092020",
        }
    }

    pub fn upnp_class(self) -> &'static str {
        match self {
            UriKind::Album => "object.container.album.musicAlbum",
            UriKind::Show | UriKind::Playlist => "object.container.playlistContainer",
            UriKind::Radio => "object.item.audioItem.audioBroadcast",
            UriKind::Episode | UriKind::Track | UriKind::Song => {
                "object.item.audioItem.musicTrack"
            }
        }
    }
}

/// A resolved external music-service item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceReference {
    /// Provider id embedded in the SA_RINCON credential token
    pub service_id: u32,
    pub kind: UriKind,
    /// Provider-specific opaque id, not yet percent-encoded
    pub canonical_id: String,
    /// Broadcast/station id for streaming-radio links
    pub broadcast_id: Option<u32>,
}

impl ServiceReference {
    /// The URI to hand to the transport
    pub fn playable_uri(&self) -> String {
        let encoded = urlencoding::encode(&self.canonical_id);
        match self.broadcast_id {
            Some(sid) => format!("{}{}?sid={}", self.kind.uri_prefix(), encoded, sid),
            None => format!("{}{}", self.kind.uri_prefix(), encoded),
        }
    }

    /// The single-item DIDL-Lite fragment paired with [`playable_uri`].
    ///
    /// The `desc` element carries the provider credential token
    /// `SA_RINCON{serviceId}_` which the device uses to pick its stored
    /// account for the provider.
    ///
    /// [`playable_uri`]: ServiceReference::playable_uri
    pub fn didl_metadata(&self, title: &str) -> String {
        let encoded = urlencoding::encode(&self.canonical_id);
        let escaped_title = quick_xml::escape::escape(title);
        format!(
            concat!(
                r#"<DIDL-Lite xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/" "#,
                r#"xmlns:dc="http://purl.org/dc/elements/1.1/" "#,
                r#"xmlns:upnp="urn:schemas-upnp-org:metadata-1-0/upnp/">"#,
                r#"<item id="{key}{id}" restricted="true">"#,
                r#"<dc:title>{title}</dc:title><upnp:class>{class}</upnp:class>"#,
                r#"<desc id="cdudn" nameSpace="urn:schemas-rinconnetworks-com:metadata-1-0/">SA_RINCON{service}_</desc>"#,
                r#"</item></DIDL-Lite>"#
            ),
            key = self.kind.metadata_key(),
            id = encoded,
            title = escaped_title,
            class = self.kind.upnp_class(),
            service = self.service_id,
        )
    }
}

struct ProviderMatcher {
    provider: &'static str,
    service_id: u32,
    pattern: Regex,
    build: fn(u32, &Captures) -> Option<ServiceReference>,
}

fn kind_reference(service_id: u32, caps: &Captures, canonical_id: String) -> Option<ServiceReference> {
    let kind = UriKind::from_keyword(caps.get(1)?.as_str())?;
    Some(ServiceReference {
        service_id,
        kind,
        canonical_id,
        broadcast_id: None,
    })
}

/// Ordered provider matchers; first match wins.
///
/// Order is part of the contract: some share-link shapes could textually
/// overlap, so priority lives here as data rather than being implied by
/// call sites.
fn matchers() -> &'static [ProviderMatcher] {
    static MATCHERS: OnceLock<Vec<ProviderMatcher>> = OnceLock::new();
    MATCHERS.get_or_init(|| {
        vec![
            ProviderMatcher {
                provider: "spotify",
                service_id: 2311,
                pattern: Regex::new(r"spotify.*[:/](album|episode|playlist|show|track)[:/](\w+)")
                    .expect("invalid spotify pattern"),
                build: |service_id, caps| {
                    let canonical = format!("spotify:{}:{}", &caps[1], &caps[2]);
                    kind_reference(service_id, caps, canonical)
                },
            },
            ProviderMatcher {
                provider: "tidal",
                service_id: 44551,
                pattern: Regex::new(r"https://tidal.*[:/](album|track|playlist)[:/]([\w-]+)")
                    .expect("invalid tidal pattern"),
                build: |service_id, caps| {
                    let canonical = format!("{}/{}", &caps[1], &caps[2]);
                    kind_reference(service_id, caps, canonical)
                },
            },
            ProviderMatcher {
                provider: "deezer",
                service_id: 519,
                pattern: Regex::new(r"https://www\.deezer.*[:/](album|track|playlist)[:/]([\w-]+)")
                    .expect("invalid deezer pattern"),
                build: |service_id, caps| {
                    let canonical = format!("{}-{}", &caps[1], &caps[2]);
                    kind_reference(service_id, caps, canonical)
                },
            },
            ProviderMatcher {
                provider: "apple-music",
                service_id: 52231,
                pattern: Regex::new(
                    r"https://music\.apple\.com/\w+/(album|playlist)/[^/]+/(?:pl\.)?([-a-zA-Z0-9]+)(?:\?i=(\d+))?",
                )
                .expect("invalid apple music pattern"),
                build: |service_id, caps| {
                    // A track link is an album link with an ?i= selector.
                    let (kind, id) = match caps.get(3) {
                        Some(track_id) => (UriKind::Song, track_id.as_str()),
                        None => (UriKind::from_keyword(&caps[1])?, caps.get(2)?.as_str()),
                    };
                    Some(ServiceReference {
                        service_id,
                        kind,
                        canonical_id: format!("{}:{}", kind.keyword(), id),
                        broadcast_id: None,
                    })
                },
            },
            ProviderMatcher {
                provider: "tunein",
                service_id: 65031,
                pattern: Regex::new(r"https://tunein\.com/(radio)/.*(s\d+)")
                    .expect("invalid tunein pattern"),
                build: |service_id, caps| {
                    Some(ServiceReference {
                        service_id,
                        kind: UriKind::Radio,
                        canonical_id: caps[2].to_string(),
                        broadcast_id: Some(254),
                    })
                },
            },
        ]
    })
}

/// Resolve an external share link into a [`ServiceReference`].
///
/// Failure means "unsupported or malformed link", never a protocol error.
pub fn resolve_service_uri(link: &str) -> Result<ServiceReference> {
    for matcher in matchers() {
        if let Some(caps) = matcher.pattern.captures(link) {
            if let Some(reference) = (matcher.build)(matcher.service_id, &caps) {
                debug!(provider = matcher.provider, link, "Matched music-service link");
                return Ok(reference);
            }
        }
    }
    Err(ControlError::UnsupportedUri(link.to_string()))
}
