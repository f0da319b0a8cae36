//! Group-aware control client for a Sonos household.
//!
//! One [`SonosClient`] per configured endpoint. The client holds no locks;
//! callers that share an instance across tasks must serialize their calls
//! (the intended deployment is one client per concern, e.g. a dedicated
//! instance for a transport-state poller).
//!
//! Routing: ordering-sensitive commands (queue edits, seeks, track skips,
//! state reads) go to the group coordinator, which is re-resolved from a
//! fresh topology read on every lookup so group changes are never acted on
//! stale. Replicated commands (play/pause/stop, volume, mute, play mode)
//! fan out to every group member concurrently and succeed when at least one
//! member accepts them.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::future::join_all;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::errors::{ControlError, Result};
use crate::group::settle_group_results;
use crate::metadata::{map_browse_entries, parse_track_metadata};
use crate::model::{BrowseEntry, PositionInfo, TrackInfo, TransportInfo, TransportSettings};
use crate::soap_client::{Service, invoke_upnp_action};
use crate::topology::{ZoneGroup, parse_zone_group_state};

/// Control port of a zone player, unless overridden at connect time
pub const DEFAULT_CONTROL_PORT: u16 = 1400;

/// Per-call HTTP timeout, applied uniformly to every fan-out branch
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// URI prefix of directly playable radio streams
const RADIO_STREAM_PREFIX: &str = "x-sonosapi-stream:";

/// Connection context: which endpoint we talk to and which group we treat
/// as ours. Owns the topology snapshot cache.
#[derive(Debug, Clone)]
struct Connection {
    host: String,
    port: u16,
    /// Coordinator host of the group this client should control; when
    /// unset, the group containing `host` is used.
    target_group: Option<String>,
    topology: Option<Vec<ZoneGroup>>,
}

/// Group-aware UPnP control client for a Sonos zone player
pub struct SonosClient {
    http: Client,
    connection: Option<Connection>,
}

impl SonosClient {
    pub fn new() -> Result<Self> {
        let http = Client::builder().timeout(DEFAULT_HTTP_TIMEOUT).build()?;
        Ok(Self {
            http,
            connection: None,
        })
    }

    /// Bind the client to a zone player. Replaces any previous connection
    /// and invalidates the topology snapshot.
    pub fn connect(&mut self, host: impl Into<String>, port: u16, target_group: Option<String>) {
        let host = host.into();
        info!(host = host.as_str(), port, "Connecting to zone player");
        self.connection = Some(Connection {
            host,
            port,
            target_group: target_group.filter(|t| !t.is_empty()),
            topology: None,
        });
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    fn connection(&self) -> Result<&Connection> {
        self.connection.as_ref().ok_or(ControlError::NotConnected)
    }

    fn connection_mut(&mut self) -> Result<&mut Connection> {
        self.connection.as_mut().ok_or(ControlError::NotConnected)
    }

    // ---- Topology -------------------------------------------------------

    async fn fetch_zone_groups(&self) -> Result<Vec<ZoneGroup>> {
        let conn = self.connection()?;
        let fields = invoke_upnp_action(
            &self.http,
            &conn.host,
            conn.port,
            Service::ZoneGroupTopology,
            "GetZoneGroupState",
            Vec::new(),
        )
        .await?;

        let state = fields.get("ZoneGroupState").ok_or_else(|| {
            ControlError::missing_field("ZoneGroupState", "GetZoneGroupStateResponse")
        })?;
        parse_zone_group_state(state)
    }

    /// Plain topology read: reuses the snapshot from the last read. The
    /// cache exists to avoid repeat fetches within one logical operation,
    /// not across operations; coordinator resolution discards it.
    async fn zone_groups(&mut self) -> Result<Vec<ZoneGroup>> {
        if let Some(groups) = self.connection()?.topology.clone() {
            return Ok(groups);
        }
        let groups = self.fetch_zone_groups().await?;
        self.connection_mut()?.topology = Some(groups.clone());
        Ok(groups)
    }

    /// Current zone groups of the household (for group-selection UIs)
    pub async fn available_groups(&mut self) -> Result<Vec<ZoneGroup>> {
        self.zone_groups().await
    }

    fn select_group<'a>(conn: &Connection, groups: &'a [ZoneGroup]) -> Option<&'a ZoneGroup> {
        match &conn.target_group {
            Some(hint) => groups.iter().find(|g| &g.coordinator == hint),
            None => groups.iter().find(|g| g.contains_host(&conn.host)),
        }
    }

    /// Resolve the host that accepts transport commands for our group.
    ///
    /// Always discards the snapshot first: coordinator resolution defines
    /// the "current truth" boundary, trading one extra round trip for
    /// correctness against group changes. A speaker outside any group is
    /// its own coordinator.
    pub async fn resolve_coordinator(&mut self) -> Result<String> {
        self.connection_mut()?.topology = None;
        let groups = self.zone_groups().await?;
        let conn = self.connection()?;

        match Self::select_group(conn, &groups) {
            Some(group) => {
                debug!(
                    coordinator = group.coordinator.as_str(),
                    members = group.members.len(),
                    "Resolved group coordinator"
                );
                Ok(group.coordinator.clone())
            }
            None => {
                debug!(
                    host = conn.host.as_str(),
                    "No group found, using connected speaker as coordinator"
                );
                Ok(conn.host.clone())
            }
        }
    }

    /// Member hosts of our group; empty means "not grouped", and callers
    /// fall back to coordinator routing.
    async fn group_member_hosts(&mut self) -> Result<Vec<String>> {
        let groups = self.zone_groups().await?;
        let conn = self.connection()?;
        Ok(Self::select_group(conn, &groups)
            .map(|group| group.member_hosts())
            .unwrap_or_default())
    }

    // ---- Command execution ----------------------------------------------

    async fn execute_on_host(
        &self,
        host: &str,
        service: Service,
        action: &str,
        args: Vec<(&str, String)>,
    ) -> Result<HashMap<String, String>> {
        let port = self.connection()?.port;
        invoke_upnp_action(&self.http, host, port, service, action, args).await
    }

    async fn execute_on_coordinator(
        &mut self,
        service: Service,
        action: &str,
        args: Vec<(&str, String)>,
    ) -> Result<HashMap<String, String>> {
        let coordinator = self.resolve_coordinator().await?;
        self.execute_on_host(&coordinator, service, action, args).await
    }

    /// Fan a command out to every group member concurrently; all branches
    /// settle before aggregation, no short-circuit on first success or
    /// failure. An ungrouped speaker takes the coordinator path instead.
    async fn execute_for_group(
        &mut self,
        service: Service,
        action: &str,
        args: Vec<(&str, String)>,
    ) -> Result<()> {
        let members = self.group_member_hosts().await?;
        if members.is_empty() {
            self.execute_on_coordinator(service, action, args).await?;
            return Ok(());
        }

        let port = self.connection()?.port;
        debug!(action, members = members.len(), "Fanning out group command");
        let calls = members
            .iter()
            .map(|member| invoke_upnp_action(&self.http, member, port, service, action, args.clone()));
        let results = join_all(calls).await;

        settle_group_results(action, results)
    }

    // ---- Transport ------------------------------------------------------

    pub async fn play(&mut self) -> Result<()> {
        self.execute_for_group(
            Service::AvTransport,
            "Play",
            vec![("Speed", "1".to_string())],
        )
        .await
    }

    pub async fn pause(&mut self) -> Result<()> {
        self.execute_for_group(Service::AvTransport, "Pause", Vec::new())
            .await
    }

    pub async fn stop(&mut self) -> Result<()> {
        self.execute_for_group(Service::AvTransport, "Stop", Vec::new())
            .await
    }

    /// Pause, falling back to Stop when the source does not support
    /// pausing (live radio). The Stop outcome is what the caller sees.
    pub async fn pause_with_fallback(&mut self) -> Result<()> {
        match self.pause().await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!("Pause failed ({err}), falling back to Stop");
                self.stop().await
            }
        }
    }

    pub async fn next(&mut self) -> Result<()> {
        self.execute_on_coordinator(Service::AvTransport, "Next", Vec::new())
            .await?;
        Ok(())
    }

    pub async fn previous(&mut self) -> Result<()> {
        self.execute_on_coordinator(Service::AvTransport, "Previous", Vec::new())
            .await?;
        Ok(())
    }

    /// Previous, falling back to an explicit queue seek when the source
    /// rejects the Previous action. When the current track number is
    /// resolvable and greater than one, seek to the track before it;
    /// otherwise the original failure is surfaced.
    pub async fn previous_with_fallback(&mut self) -> Result<()> {
        let original = match self.previous().await {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };

        let track = match self.get_position_info().await {
            Ok(position) => position.track,
            Err(err) => {
                warn!("Position read after failed Previous also failed: {err}");
                None
            }
        };

        match track {
            Some(track) if track > 1 => {
                warn!(track, "Previous failed, seeking to preceding queue track");
                self.seek("TRACK_NR", &(track - 1).to_string()).await
            }
            _ => Err(original),
        }
    }

    pub async fn get_transport_info(&mut self) -> Result<TransportInfo> {
        let fields = self
            .execute_on_coordinator(Service::AvTransport, "GetTransportInfo", Vec::new())
            .await?;
        TransportInfo::from_fields(&fields)
    }

    /// Whether the transport is in a state where Pause is meaningful
    pub async fn can_pause(&mut self) -> Result<bool> {
        Ok(self.get_transport_info().await?.is_playing())
    }

    pub async fn get_transport_settings(&mut self) -> Result<TransportSettings> {
        let fields = self
            .execute_on_coordinator(Service::AvTransport, "GetTransportSettings", Vec::new())
            .await?;
        TransportSettings::from_fields(&fields)
    }

    pub async fn get_position_info(&mut self) -> Result<PositionInfo> {
        let fields = self
            .execute_on_coordinator(Service::AvTransport, "GetPositionInfo", Vec::new())
            .await?;
        Ok(PositionInfo::from_fields(&fields))
    }

    /// Current track with decoded metadata and progress. Album art is
    /// absolutized against the connected host.
    pub async fn get_track_info(&mut self) -> Result<TrackInfo> {
        let (host, port) = {
            let conn = self.connection()?;
            (conn.host.clone(), conn.port)
        };
        let position = self.get_position_info().await?;

        let metadata = position
            .track_metadata
            .as_deref()
            .map(|xml| parse_track_metadata(xml, &host, port))
            .unwrap_or_default();

        Ok(TrackInfo {
            metadata,
            elapsed: position.rel_time,
            duration: position.track_duration,
        })
    }

    pub async fn set_play_mode(&mut self, mode: &str) -> Result<()> {
        self.execute_on_coordinator(
            Service::AvTransport,
            "SetPlayMode",
            vec![("NewPlayMode", mode.to_string())],
        )
        .await?;
        Ok(())
    }

    pub async fn set_play_mode_for_group(&mut self, mode: &str) -> Result<()> {
        self.execute_for_group(
            Service::AvTransport,
            "SetPlayMode",
            vec![("NewPlayMode", mode.to_string())],
        )
        .await
    }

    pub async fn seek(&mut self, unit: &str, target: &str) -> Result<()> {
        self.execute_on_coordinator(
            Service::AvTransport,
            "Seek",
            vec![("Unit", unit.to_string()), ("Target", target.to_string())],
        )
        .await?;
        Ok(())
    }

    /// Load a URI on the coordinator's transport. `metadata` must be the
    /// DIDL-Lite fragment generated together with the URI, or empty.
    pub async fn set_av_transport_uri(&mut self, uri: &str, metadata: &str) -> Result<()> {
        self.execute_on_coordinator(
            Service::AvTransport,
            "SetAVTransportURI",
            vec![
                ("CurrentURI", uri.to_string()),
                ("CurrentURIMetaData", metadata.to_string()),
            ],
        )
        .await?;
        Ok(())
    }

    /// Enqueue a URI and return the first track number it was assigned.
    /// A missing or zero track number in the device's answer is an
    /// [`ControlError::Enqueue`] failure.
    pub async fn add_uri_to_queue(
        &mut self,
        uri: &str,
        metadata: &str,
        position: u32,
        as_next: bool,
    ) -> Result<u32> {
        let fields = self
            .execute_on_coordinator(
                Service::AvTransport,
                "AddURIToQueue",
                vec![
                    ("EnqueuedURI", uri.to_string()),
                    ("EnqueuedURIMetaData", metadata.to_string()),
                    ("DesiredFirstTrackNumberEnqueued", position.to_string()),
                    ("EnqueueAsNext", if as_next { "1" } else { "0" }.to_string()),
                ],
            )
            .await?;

        let track = fields
            .get("FirstTrackNumberEnqueued")
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(0);

        if track == 0 {
            return Err(ControlError::Enqueue(uri.to_string()));
        }
        Ok(track)
    }

    /// Switch the active source by addressing the coordinator's own device
    /// id, e.g. `set_local_transport("x-rincon-queue", "#0")` selects the
    /// coordinator's play queue.
    pub async fn set_local_transport(&mut self, prefix: &str, suffix: &str) -> Result<()> {
        let coordinator = self.resolve_coordinator().await?;
        // resolve_coordinator just refreshed the snapshot
        let groups = self.zone_groups().await?;

        let uuid = groups
            .iter()
            .flat_map(|group| group.members.iter())
            .find(|member| member.host == coordinator)
            .map(|member| member.uuid.clone())
            .ok_or_else(|| {
                ControlError::Protocol(format!(
                    "No zone group member found for coordinator {coordinator}"
                ))
            })?;

        self.set_av_transport_uri(&format!("{prefix}:{uuid}{suffix}"), "")
            .await
    }

    /// Start playback of a saved service URI/metadata pair.
    ///
    /// Radio streams load directly; anything else is enqueued, the source
    /// switched to the coordinator's queue, and the transport seeked to the
    /// track the enqueue reported.
    pub async fn set_service_uri(&mut self, uri: &str, metadata: &str) -> Result<()> {
        if uri.starts_with(RADIO_STREAM_PREFIX) {
            return self.set_av_transport_uri(uri, metadata).await;
        }

        let track = self.add_uri_to_queue(uri, metadata, 0, false).await?;
        self.set_local_transport("x-rincon-queue", "#0").await?;
        self.seek("TRACK_NR", &track.to_string()).await
    }

    // ---- Rendering ------------------------------------------------------

    pub async fn get_volume(&mut self) -> Result<u16> {
        let fields = self
            .execute_on_coordinator(
                Service::RenderingControl,
                "GetVolume",
                vec![("Channel", "Master".to_string())],
            )
            .await?;
        let value = fields
            .get("CurrentVolume")
            .ok_or_else(|| ControlError::missing_field("CurrentVolume", "GetVolumeResponse"))?;
        value
            .parse::<u16>()
            .map_err(|_| ControlError::bad_field("CurrentVolume", value))
    }

    pub async fn set_volume(&mut self, volume: u16) -> Result<()> {
        self.execute_for_group(
            Service::RenderingControl,
            "SetVolume",
            vec![
                ("Channel", "Master".to_string()),
                ("DesiredVolume", volume.to_string()),
            ],
        )
        .await
    }

    pub async fn get_mute(&mut self) -> Result<bool> {
        let fields = self
            .execute_on_coordinator(
                Service::RenderingControl,
                "GetMute",
                vec![("Channel", "Master".to_string())],
            )
            .await?;
        let value = fields
            .get("CurrentMute")
            .ok_or_else(|| ControlError::missing_field("CurrentMute", "GetMuteResponse"))?;
        Ok(value == "1")
    }

    pub async fn set_mute(&mut self, mute: bool) -> Result<()> {
        self.execute_for_group(
            Service::RenderingControl,
            "SetMute",
            vec![
                ("Channel", "Master".to_string()),
                ("DesiredMute", if mute { "1" } else { "0" }.to_string()),
            ],
        )
        .await
    }

    // ---- Content directory ----------------------------------------------

    /// Browse a ContentDirectory container on the connected device.
    ///
    /// `container` is a device object id root (e.g. "FV:2" for favorites,
    /// "A:PLAYLISTS" for saved playlists); optional category path segments
    /// and a search term narrow it down.
    pub async fn browse(
        &mut self,
        container: &str,
        term: Option<&str>,
        categories: &[&str],
        start: u32,
        count: u32,
    ) -> Result<Vec<BrowseEntry>> {
        let (host, port) = {
            let conn = self.connection()?;
            (conn.host.clone(), conn.port)
        };

        let mut object_id = container.to_string();
        if !categories.is_empty() {
            let encoded: Vec<String> = categories
                .iter()
                .map(|category| urlencoding::encode(category).into_owned())
                .collect();
            object_id.push('/');
            object_id.push_str(&encoded.join("/"));
        }
        if let Some(term) = term {
            object_id.push(':');
            object_id.push_str(&urlencoding::encode(term));
        }

        let args = vec![
            ("ObjectID", object_id),
            ("BrowseFlag", "BrowseDirectChildren".to_string()),
            ("Filter", "*".to_string()),
            ("StartingIndex", start.to_string()),
            ("RequestedCount", count.to_string()),
            ("SortCriteria", String::new()),
        ];

        let fields = self
            .execute_on_host(&host, Service::ContentDirectory, "Browse", args)
            .await?;
        let result = fields
            .get("Result")
            .ok_or_else(|| ControlError::missing_field("Result", "BrowseResponse"))?;

        map_browse_entries(result, &host, port)
    }
}
