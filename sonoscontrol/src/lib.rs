//! Group-aware control client for Sonos zone players.
//!
//! Talks plain UPnP SOAP to a player's control port: transport commands,
//! volume and mute, content-directory browsing, music-service URI
//! resolution, and zone-group topology. Commands are routed with the
//! group in mind, to the coordinator for ordering-sensitive operations
//! and fanned out to every member for replicated ones.

mod group;

pub mod client;
pub mod errors;
pub mod metadata;
pub mod model;
pub mod music_service;
pub mod soap_client;
pub mod topology;

pub use client::{DEFAULT_CONTROL_PORT, SonosClient};
pub use errors::{ControlError, Result};
pub use metadata::{TrackMetadata, parse_track_metadata};
pub use model::{BrowseEntry, PositionInfo, TrackInfo, TransportInfo, TransportSettings};
pub use music_service::{ServiceReference, UriKind, resolve_service_uri};
pub use soap_client::{Service, invoke_upnp_action};
pub use topology::{GroupMember, ZoneGroup, parse_zone_group_state};
