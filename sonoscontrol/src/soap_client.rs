//! Generic SOAP/UPnP action invocation against a zone player.
//!
//! Sonos responses contain no nested structures for any action this client
//! issues, so a call returns a flat map of field name to text content
//! instead of per-action response types. Typed views over the map live next
//! to each call site (see `model`).

use std::collections::HashMap;

use reqwest::Client;
use tracing::debug;
use xmltree::{Element, XMLNode};

use crate::errors::{ControlError, Result};

/// UPnP services addressed by this client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    AvTransport,
    RenderingControl,
    ZoneGroupTopology,
    ContentDirectory,
}

impl Service {
    pub fn name(self) -> &'static str {
        match self {
            Service::AvTransport => "AVTransport",
            Service::RenderingControl => "RenderingControl",
            Service::ZoneGroupTopology => "ZoneGroupTopology",
            Service::ContentDirectory => "ContentDirectory",
        }
    }

    /// Service URN, e.g. "urn:schemas-upnp-org:service:AVTransport:1"
    pub fn service_type(self) -> String {
        format!("urn:schemas-upnp-org:service:{}:1", self.name())
    }

    /// Path of the control endpoint on the device.
    ///
    /// AVTransport/RenderingControl hang off the MediaRenderer sub-device,
    /// ContentDirectory off the MediaServer one; ZoneGroupTopology is served
    /// from the device root.
    pub fn control_path(self) -> &'static str {
        match self {
            Service::AvTransport => "MediaRenderer/AVTransport/Control",
            Service::RenderingControl => "MediaRenderer/RenderingControl/Control",
            Service::ZoneGroupTopology => "ZoneGroupTopology/Control",
            Service::ContentDirectory => "MediaServer/ContentDirectory/Control",
        }
    }

    /// Transport and rendering actions all take an InstanceID argument.
    fn requires_instance_id(self) -> bool {
        matches!(self, Service::AvTransport | Service::RenderingControl)
    }
}

/// Build a SOAP 1.1 request envelope for a UPnP action.
///
/// Arguments are serialized as children of the action element in iteration
/// order; the XML writer escapes special characters in values.
pub fn build_soap_request(
    service_urn: &str,
    action: &str,
    args: &[(&str, String)],
) -> Result<String> {
    let request_name = format!("u:{}", action);
    let mut request_elem = Element::new(&request_name);
    request_elem
        .attributes
        .insert("xmlns:u".to_string(), service_urn.to_string());

    for (name, value) in args {
        let mut child = Element::new(name);
        child.children.push(XMLNode::Text(value.clone()));
        request_elem.children.push(XMLNode::Element(child));
    }

    let mut body = Element::new("s:Body");
    body.children.push(XMLNode::Element(request_elem));

    let mut envelope = Element::new("s:Envelope");
    envelope.attributes.insert(
        "xmlns:s".to_string(),
        "http://schemas.xmlsoap.org/soap/envelope/".to_string(),
    );
    envelope.attributes.insert(
        "s:encodingStyle".to_string(),
        "http://schemas.xmlsoap.org/soap/encoding/".to_string(),
    );
    envelope.children.push(XMLNode::Element(body));

    let mut buf = Vec::new();
    let config = xmltree::EmitterConfig::new()
        .write_document_declaration(true)
        .perform_indent(true)
        .indent_string("  ");
    envelope.write_with_config(&mut buf, config)?;

    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Prepend `InstanceID=0` when the action requires one and the caller did
/// not supply it.
pub(crate) fn ensure_instance_id(service: Service, args: &mut Vec<(&str, String)>) {
    if service.requires_instance_id() && !args.iter().any(|(name, _)| *name == "InstanceID") {
        args.insert(0, ("InstanceID", "0".to_string()));
    }
}

/// Invoke a UPnP SOAP action on a device.
///
/// - `host`/`port`: device control endpoint (every call is a fresh request,
///   no connection is kept)
/// - `action`: action name, e.g. "GetTransportInfo"
/// - `args`: ordered list of (name, value) pairs
///
/// On a non-2xx status the call fails with [`ControlError::Transport`]
/// carrying status and body. On success the `{action}Response` element is
/// flattened into a field map.
pub async fn invoke_upnp_action(
    http: &Client,
    host: &str,
    port: u16,
    service: Service,
    action: &str,
    mut args: Vec<(&str, String)>,
) -> Result<HashMap<String, String>> {
    ensure_instance_id(service, &mut args);

    let service_urn = service.service_type();
    let body_xml = build_soap_request(&service_urn, action, &args)?;

    let url = format!("http://{host}:{port}/{}", service.control_path());
    let soap_action_header = format!(r#""{}#{}""#, service_urn, action);

    debug!(host, action, service = service.name(), "Invoking UPnP action");

    let response = http
        .post(&url)
        .header("Content-Type", r#"text/xml; charset="utf-8""#)
        .header("SOAPACTION", &soap_action_header)
        .body(body_xml)
        .send()
        .await?;

    let status = response.status();
    let raw_body = response.text().await?;

    if !status.is_success() {
        return Err(ControlError::transport(action, status.as_u16(), raw_body));
    }

    parse_action_response(&raw_body, action)
}

/// Element name with any namespace prefix stripped (text after the last colon)
fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

fn find_child<'a>(parent: &'a Element, name: &str) -> Option<&'a Element> {
    parent.children.iter().find_map(|node| match node {
        XMLNode::Element(elem) if local_name(&elem.name) == name => Some(elem),
        _ => None,
    })
}

/// Flatten the `{action}Response` body element into a field map.
fn parse_action_response(xml: &str, action: &str) -> Result<HashMap<String, String>> {
    let root = Element::parse(xml.as_bytes())?;
    if local_name(&root.name) != "Envelope" {
        return Err(ControlError::missing_field("Envelope", "SOAP response"));
    }

    let body = find_child(&root, "Body")
        .ok_or_else(|| ControlError::missing_field("Body", "SOAP response"))?;

    let response_name = format!("{action}Response");
    let response = find_child(body, &response_name)
        .ok_or_else(|| ControlError::missing_field(&response_name, "SOAP body"))?;

    let mut fields = HashMap::new();
    for child in &response.children {
        if let XMLNode::Element(elem) = child {
            let text = elem
                .get_text()
                .map(|t| t.into_owned())
                .unwrap_or_default();
            fields.insert(local_name(&elem.name).to_string(), text);
        }
    }

    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_request_wraps_action_and_args() {
        let xml = build_soap_request(
            "urn:schemas-upnp-org:service:AVTransport:1",
            "Play",
            &[("InstanceID", "0".to_string()), ("Speed", "1".to_string())],
        )
        .unwrap();

        assert!(xml.contains("u:Play"));
        assert!(xml.contains("<InstanceID>0</InstanceID>"));
        assert!(xml.contains("<Speed>1</Speed>"));
        assert!(xml.contains(r#"xmlns:s="http://schemas.xmlsoap.org/soap/envelope/""#));
        assert!(xml.contains(r#"xmlns:u="urn:schemas-upnp-org:service:AVTransport:1""#));
    }

    #[test]
    fn build_request_escapes_arg_values_round_trip() {
        let literal = r#"He said "1 < 2" & 'left'"#;
        let xml = build_soap_request(
            "urn:schemas-upnp-org:service:AVTransport:1",
            "SetAVTransportURI",
            &[("CurrentURI", literal.to_string())],
        )
        .unwrap();

        // Raw specials never survive into the serialized body unescaped.
        assert!(!xml.contains(literal));

        let root = Element::parse(xml.as_bytes()).unwrap();
        let body = find_child(&root, "Body").unwrap();
        let action = find_child(body, "SetAVTransportURI").unwrap();
        let value = find_child(action, "CurrentURI")
            .unwrap()
            .get_text()
            .unwrap()
            .into_owned();
        assert_eq!(value, literal);
    }

    #[test]
    fn ensure_instance_id_prepends_default() {
        let mut args = vec![("Speed", "1".to_string())];
        ensure_instance_id(Service::AvTransport, &mut args);
        assert_eq!(args[0], ("InstanceID", "0".to_string()));
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn ensure_instance_id_keeps_explicit_value() {
        let mut args = vec![("InstanceID", "3".to_string())];
        ensure_instance_id(Service::RenderingControl, &mut args);
        assert_eq!(args, vec![("InstanceID", "3".to_string())]);
    }

    #[test]
    fn ensure_instance_id_skips_non_transport_services() {
        let mut args = vec![("ObjectID", "FV:2".to_string())];
        ensure_instance_id(Service::ContentDirectory, &mut args);
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn parse_response_strips_namespace_prefixes() {
        let xml = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <u:GetTransportInfoResponse xmlns:u="urn:schemas-upnp-org:service:AVTransport:1">
      <CurrentTransportState>PLAYING</CurrentTransportState>
      <CurrentTransportStatus>OK</CurrentTransportStatus>
      <CurrentSpeed>1</CurrentSpeed>
    </u:GetTransportInfoResponse>
  </s:Body>
</s:Envelope>"#;

        let fields = parse_action_response(xml, "GetTransportInfo").unwrap();
        assert_eq!(fields.get("CurrentTransportState").unwrap(), "PLAYING");
        assert_eq!(fields.get("CurrentSpeed").unwrap(), "1");
    }

    #[test]
    fn parse_response_unescapes_embedded_documents() {
        let xml = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body><u:GetZoneGroupStateResponse xmlns:u="urn:schemas-upnp-org:service:ZoneGroupTopology:1"><ZoneGroupState>&lt;ZoneGroupState&gt;&lt;/ZoneGroupState&gt;</ZoneGroupState></u:GetZoneGroupStateResponse></s:Body></s:Envelope>"#;

        let fields = parse_action_response(xml, "GetZoneGroupState").unwrap();
        assert_eq!(
            fields.get("ZoneGroupState").unwrap(),
            "<ZoneGroupState></ZoneGroupState>"
        );
    }

    #[test]
    fn parse_response_missing_action_element_is_protocol_error() {
        let xml = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body><u:StopResponse xmlns:u="x"/></s:Body></s:Envelope>"#;
        let err = parse_action_response(xml, "Play").unwrap_err();
        assert!(matches!(err, ControlError::Protocol(_)));
    }

    #[test]
    fn empty_response_fields_map_to_empty_strings() {
        let xml = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body><u:AddURIToQueueResponse xmlns:u="x"><FirstTrackNumberEnqueued></FirstTrackNumberEnqueued></u:AddURIToQueueResponse></s:Body></s:Envelope>"#;
        let fields = parse_action_response(xml, "AddURIToQueue").unwrap();
        assert_eq!(fields.get("FirstTrackNumberEnqueued").unwrap(), "");
    }
}
