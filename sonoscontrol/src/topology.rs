//! Zone group topology parsing.
//!
//! `ZoneGroupTopology.GetZoneGroupState` returns the household topology as
//! an escaped XML document inside the response field. This module parses
//! that inner document into [`ZoneGroup`] records. Member collection is
//! recursive because satellites and bonded players nest below their visible
//! group member, and a device advertised through two network interfaces can
//! appear twice with the same UUID.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;
use xmltree::{Element, XMLNode};

use crate::errors::Result;

/// One device inside a zone group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    /// Device unique id (RINCON_...)
    pub uuid: String,
    /// Host extracted from the member's advertised location URL
    pub host: String,
    pub zone_name: Option<String>,
}

/// A set of devices currently synchronized to the same audio stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneGroup {
    /// Host of the member that accepts transport commands for the group
    pub coordinator: String,
    /// Display name of the group
    pub name: String,
    /// De-duplicated members, coordinator included
    pub members: Vec<GroupMember>,
}

impl ZoneGroup {
    pub fn member_hosts(&self) -> Vec<String> {
        self.members.iter().map(|m| m.host.clone()).collect()
    }

    pub fn contains_host(&self, host: &str) -> bool {
        self.members.iter().any(|m| m.host == host)
    }

    pub fn member_by_host(&self, host: &str) -> Option<&GroupMember> {
        self.members.iter().find(|m| m.host == host)
    }
}

/// Host part of a member location URL ("http://192.168.1.50:1400/xml/...")
pub fn extract_host_from_location(location: &str) -> Option<String> {
    let rest = location.strip_prefix("http://")?;
    let host = rest.split([':', '/']).next()?;
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

/// Parse the inner ZoneGroupState document into groups.
///
/// Groups without any resolvable member are dropped. When the advertised
/// coordinator UUID is not among a group's members (device inconsistency),
/// the first member acts as coordinator.
pub fn parse_zone_group_state(xml: &str) -> Result<Vec<ZoneGroup>> {
    let root = Element::parse(xml.trim().as_bytes())?;

    let mut group_elems = Vec::new();
    collect_group_elements(&root, &mut group_elems);

    let mut groups = Vec::new();
    for group_elem in group_elems {
        let mut members = Vec::new();
        let mut seen = HashSet::new();
        collect_members(group_elem, &mut members, &mut seen);

        let Some(first) = members.first() else {
            debug!("Skipping zone group without resolvable members");
            continue;
        };

        let coordinator_uuid = group_elem.attributes.get("Coordinator");
        let coordinator_member = coordinator_uuid
            .and_then(|uuid| members.iter().find(|m| &m.uuid == uuid))
            .unwrap_or(first);

        let coordinator = coordinator_member.host.clone();
        let name = group_elem
            .attributes
            .get("ZoneGroupName")
            .filter(|n| !n.is_empty())
            .cloned()
            .or_else(|| coordinator_member.zone_name.clone())
            .unwrap_or_else(|| coordinator.clone());

        groups.push(ZoneGroup {
            coordinator,
            name,
            members,
        });
    }

    debug!(count = groups.len(), "Parsed zone group topology");
    Ok(groups)
}

fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

fn collect_group_elements<'a>(elem: &'a Element, out: &mut Vec<&'a Element>) {
    if local_name(&elem.name) == "ZoneGroup" {
        out.push(elem);
        return;
    }
    for child in &elem.children {
        if let XMLNode::Element(child_elem) = child {
            collect_group_elements(child_elem, out);
        }
    }
}

/// Collect every descendant carrying both UUID and Location attributes,
/// de-duplicated by UUID before host extraction.
fn collect_members(elem: &Element, out: &mut Vec<GroupMember>, seen: &mut HashSet<String>) {
    if let (Some(uuid), Some(location)) =
        (elem.attributes.get("UUID"), elem.attributes.get("Location"))
    {
        if seen.insert(uuid.clone()) {
            if let Some(host) = extract_host_from_location(location) {
                let zone_name = elem
                    .attributes
                    .get("ZoneName")
                    .or_else(|| elem.attributes.get("ZoneGroupName"))
                    .cloned();
                out.push(GroupMember {
                    uuid: uuid.clone(),
                    host,
                    zone_name,
                });
            }
        }
    }

    for child in &elem.children {
        if let XMLNode::Element(child_elem) = child {
            collect_members(child_elem, out, seen);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(uuid: &str, host: &str, zone: &str) -> String {
        format!(
            r#"<ZoneGroupMember UUID="{uuid}" Location="http://{host}:1400/xml/device_description.xml" ZoneName="{zone}"/>"#
        )
    }

    #[test]
    fn extract_host_handles_port_and_path() {
        assert_eq!(
            extract_host_from_location("http://192.168.1.50:1400/xml/device_description.xml"),
            Some("192.168.1.50".to_string())
        );
        assert_eq!(
            extract_host_from_location("http://192.168.1.50/desc.xml"),
            Some("192.168.1.50".to_string())
        );
        assert_eq!(extract_host_from_location("ftp://x"), None);
        assert_eq!(extract_host_from_location("http://"), None);
    }

    #[test]
    fn parse_two_groups() {
        let xml = format!(
            r#"<ZoneGroupState><ZoneGroups>
                <ZoneGroup Coordinator="RINCON_A" ID="RINCON_A:1">{}{}</ZoneGroup>
                <ZoneGroup Coordinator="RINCON_C" ID="RINCON_C:7">{}</ZoneGroup>
            </ZoneGroups></ZoneGroupState>"#,
            member("RINCON_A", "192.168.1.10", "Living Room"),
            member("RINCON_B", "192.168.1.11", "Kitchen"),
            member("RINCON_C", "192.168.1.12", "Bedroom"),
        );

        let groups = parse_zone_group_state(&xml).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].coordinator, "192.168.1.10");
        assert_eq!(groups[0].name, "Living Room");
        assert_eq!(
            groups[0].member_hosts(),
            vec!["192.168.1.10".to_string(), "192.168.1.11".to_string()]
        );
        assert_eq!(groups[1].coordinator, "192.168.1.12");
    }

    #[test]
    fn members_deduplicated_by_uuid() {
        // Same device advertised over two interfaces.
        let xml = format!(
            r#"<ZoneGroupState><ZoneGroups><ZoneGroup Coordinator="RINCON_A">{}{}</ZoneGroup></ZoneGroups></ZoneGroupState>"#,
            member("RINCON_A", "192.168.1.10", "Living Room"),
            member("RINCON_A", "10.0.0.10", "Living Room"),
        );

        let groups = parse_zone_group_state(&xml).unwrap();
        assert_eq!(groups[0].members.len(), 1);
        assert_eq!(groups[0].members[0].host, "192.168.1.10");
    }

    #[test]
    fn missing_coordinator_falls_back_to_first_member() {
        let xml = format!(
            r#"<ZoneGroupState><ZoneGroups><ZoneGroup Coordinator="RINCON_GONE">{}{}</ZoneGroup></ZoneGroups></ZoneGroupState>"#,
            member("RINCON_B", "192.168.1.11", "Kitchen"),
            member("RINCON_C", "192.168.1.12", "Bedroom"),
        );

        let groups = parse_zone_group_state(&xml).unwrap();
        assert_eq!(groups[0].coordinator, "192.168.1.11");
        assert_eq!(groups[0].name, "Kitchen");
    }

    #[test]
    fn satellites_nested_under_members_are_collected() {
        let xml = r#"<ZoneGroupState><ZoneGroups><ZoneGroup Coordinator="RINCON_A">
            <ZoneGroupMember UUID="RINCON_A" Location="http://192.168.1.10:1400/xml/d.xml" ZoneName="TV Room">
                <Satellite UUID="RINCON_SAT" Location="http://192.168.1.20:1400/xml/d.xml" ZoneName="TV Room (RS)"/>
            </ZoneGroupMember>
        </ZoneGroup></ZoneGroups></ZoneGroupState>"#;

        let groups = parse_zone_group_state(xml).unwrap();
        assert_eq!(groups[0].members.len(), 2);
        assert!(groups[0].contains_host("192.168.1.20"));
    }

    #[test]
    fn group_name_prefers_zone_group_name_attribute() {
        let xml = format!(
            r#"<ZoneGroupState><ZoneGroups><ZoneGroup Coordinator="RINCON_A" ZoneGroupName="Downstairs">{}</ZoneGroup></ZoneGroups></ZoneGroupState>"#,
            member("RINCON_A", "192.168.1.10", "Living Room"),
        );

        let groups = parse_zone_group_state(&xml).unwrap();
        assert_eq!(groups[0].name, "Downstairs");
    }

    #[test]
    fn empty_group_is_dropped() {
        let xml = r#"<ZoneGroupState><ZoneGroups><ZoneGroup Coordinator="RINCON_A"/></ZoneGroups></ZoneGroupState>"#;
        assert!(parse_zone_group_state(xml).unwrap().is_empty());
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(parse_zone_group_state("not xml at all").is_err());
    }
}
