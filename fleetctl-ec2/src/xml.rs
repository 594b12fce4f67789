//! Decoding of EC2 Query API XML responses.
//!
//! Responses are small (a handful of instances per cluster), so they are read
//! into a lightweight node tree first and the per-action decoders walk that
//! tree. Namespaces and attributes carry no information we need and are
//! ignored.

use quick_xml::events::Event;
use quick_xml::Reader;

use fleetctl_core::{
    FleetError, Instance, InstanceState, Reachability, Result, SpotRequest, Tag,
};

/// One element: name, concatenated text, child elements in document order
#[derive(Debug, Default)]
pub(crate) struct XmlNode {
    pub name: String,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    /// Parse a full document and return its root element
    pub fn parse(xml: &str) -> Result<XmlNode> {
        let mut reader = Reader::from_str(xml);
        // stack[0] is a synthetic holder for the root
        let mut stack = vec![XmlNode::default()];
        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    stack.push(XmlNode {
                        name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
                        ..XmlNode::default()
                    });
                }
                Ok(Event::Empty(e)) => {
                    let node = XmlNode {
                        name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
                        ..XmlNode::default()
                    };
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(node);
                    }
                }
                Ok(Event::Text(t)) => {
                    let text = t
                        .unescape()
                        .map_err(|e| FleetError::decode(format!("bad XML text: {}", e)))?;
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(text.trim());
                    }
                }
                Ok(Event::End(_)) => {
                    let node = stack.pop().ok_or_else(|| {
                        FleetError::decode("unbalanced closing tag in response")
                    })?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(node),
                        None => return Err(FleetError::decode("unbalanced closing tag in response")),
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {} // declaration, comments, CDATA we don't emit
                Err(e) => return Err(FleetError::decode(format!("malformed XML: {}", e))),
            }
        }
        let holder = stack
            .pop()
            .filter(|_| stack.is_empty())
            .ok_or_else(|| FleetError::decode("unclosed element in response"))?;
        holder
            .children
            .into_iter()
            .next()
            .ok_or_else(|| FleetError::decode("empty response document"))
    }

    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Trimmed text of a direct child, `None` when absent or empty
    pub fn text_of(&self, name: &str) -> Option<&str> {
        self.child(name)
            .map(|c| c.text.as_str())
            .filter(|t| !t.is_empty())
    }
}

fn required<'a>(node: &'a XmlNode, name: &str, context: &str) -> Result<&'a str> {
    node.text_of(name)
        .ok_or_else(|| FleetError::decode(format!("missing <{}> in {}", name, context)))
}

fn instance_from_node(node: &XmlNode) -> Result<Instance> {
    let id = required(node, "instanceId", "instancesSet item")?.to_string();
    let state_name = node
        .child("instanceState")
        .and_then(|s| s.text_of("name"))
        .ok_or_else(|| FleetError::decode(format!("missing instanceState for {}", id)))?;
    let state = InstanceState::from_name(state_name)
        .ok_or_else(|| FleetError::decode(format!("unknown instance state '{}'", state_name)))?;

    let tags = node
        .child("tagSet")
        .map(|set| {
            set.children_named("item")
                .filter_map(|item| {
                    Some(Tag::new(item.text_of("key")?, item.text_of("value").unwrap_or("")))
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(Instance {
        instance_type: node.text_of("instanceType").unwrap_or_default().to_string(),
        state,
        public_dns: node.text_of("dnsName").map(str::to_string),
        public_ip: node.text_of("ipAddress").map(str::to_string),
        availability_zone: node
            .child("placement")
            .and_then(|p| p.text_of("availabilityZone"))
            .map(str::to_string),
        key_name: node.text_of("keyName").map(str::to_string),
        launch_time: node.text_of("launchTime").map(str::to_string),
        tags,
        id,
    })
}

/// DescribeInstancesResponse → instances across all reservations
pub(crate) fn parse_describe_instances(xml: &str) -> Result<Vec<Instance>> {
    let root = XmlNode::parse(xml)?;
    let mut instances = Vec::new();
    if let Some(reservations) = root.child("reservationSet") {
        for reservation in reservations.children_named("item") {
            if let Some(set) = reservation.child("instancesSet") {
                for item in set.children_named("item") {
                    instances.push(instance_from_node(item)?);
                }
            }
        }
    }
    Ok(instances)
}

/// RunInstancesResponse → new instance ids
pub(crate) fn parse_run_instances(xml: &str) -> Result<Vec<String>> {
    let root = XmlNode::parse(xml)?;
    let set = root
        .child("instancesSet")
        .ok_or_else(|| FleetError::decode("RunInstances response without instancesSet"))?;
    set.children_named("item")
        .map(|item| {
            Ok(required(item, "instanceId", "RunInstances instancesSet")?.to_string())
        })
        .collect()
}

/// RequestSpotInstancesResponse / DescribeSpotInstanceRequestsResponse →
/// the spot request set
pub(crate) fn parse_spot_requests(xml: &str) -> Result<Vec<SpotRequest>> {
    let root = XmlNode::parse(xml)?;
    let set = root
        .child("spotInstanceRequestSet")
        .ok_or_else(|| FleetError::decode("response without spotInstanceRequestSet"))?;
    set.children_named("item")
        .map(|item| {
            Ok(SpotRequest {
                id: required(item, "spotInstanceRequestId", "spot request")?.to_string(),
                state: item.text_of("state").unwrap_or_default().to_string(),
                status_code: item
                    .child("status")
                    .and_then(|s| s.text_of("code"))
                    .map(str::to_string),
                instance_id: item.text_of("instanceId").map(str::to_string),
            })
        })
        .collect()
}

/// DescribeInstanceStatusResponse → system reachability of the first (only)
/// instance in the set; an empty set means no data yet
pub(crate) fn parse_reachability(xml: &str) -> Result<Reachability> {
    let root = XmlNode::parse(xml)?;
    let status = root
        .child("instanceStatusSet")
        .and_then(|set| set.child("item"))
        .and_then(|item| item.child("systemStatus"))
        .and_then(|sys| sys.child("details"))
        .and_then(|details| {
            details
                .children_named("item")
                .find(|d| d.text_of("name") == Some("reachability"))
        })
        .and_then(|d| d.text_of("status"));
    Ok(status.map(Reachability::from_status).unwrap_or(Reachability::Unknown))
}

/// `<Response><Errors><Error>` body → (code, message) when present
pub(crate) fn parse_error(xml: &str) -> Option<(String, String)> {
    let root = XmlNode::parse(xml).ok()?;
    let error = root.child("Errors")?.child("Error")?;
    Some((
        error.text_of("Code")?.to_string(),
        error.text_of("Message").unwrap_or("").to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIBE_INSTANCES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<DescribeInstancesResponse xmlns="http://ec2.amazonaws.com/doc/2016-11-15/">
  <requestId>8f7724cf-496f-496e-8fe3-example</requestId>
  <reservationSet>
    <item>
      <reservationId>r-1234567890abcdef0</reservationId>
      <instancesSet>
        <item>
          <instanceId>i-0abc1234def567890</instanceId>
          <instanceState><code>16</code><name>running</name></instanceState>
          <privateDnsName>ip-10-0-0-12.us-west-2.compute.internal</privateDnsName>
          <dnsName>ec2-54-214-0-12.us-west-2.compute.amazonaws.com</dnsName>
          <keyName>ian</keyName>
          <instanceType>t2.medium</instanceType>
          <launchTime>2016-03-15T19:19:39.000Z</launchTime>
          <placement><availabilityZone>us-west-2a</availabilityZone></placement>
          <ipAddress>54.214.0.12</ipAddress>
          <tagSet>
            <item><key>Cluster</key><value>exp-7</value></item>
            <item><key>Name</key><value>exp-7-i-0abc1234def567890</value></item>
          </tagSet>
        </item>
        <item>
          <instanceId>i-0def1234abc567890</instanceId>
          <instanceState><code>80</code><name>stopped</name></instanceState>
          <instanceType>t2.medium</instanceType>
        </item>
      </instancesSet>
    </item>
  </reservationSet>
</DescribeInstancesResponse>"#;

    const RUN_INSTANCES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<RunInstancesResponse xmlns="http://ec2.amazonaws.com/doc/2016-11-15/">
  <requestId>example-request</requestId>
  <reservationId>r-0abcdef01234</reservationId>
  <instancesSet>
    <item><instanceId>i-aaa</instanceId><instanceState><code>0</code><name>pending</name></instanceState></item>
    <item><instanceId>i-bbb</instanceId><instanceState><code>0</code><name>pending</name></instanceState></item>
  </instancesSet>
</RunInstancesResponse>"#;

    const SPOT_REQUESTS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<DescribeSpotInstanceRequestsResponse xmlns="http://ec2.amazonaws.com/doc/2016-11-15/">
  <spotInstanceRequestSet>
    <item>
      <spotInstanceRequestId>sir-abc123</spotInstanceRequestId>
      <state>active</state>
      <status><code>fulfilled</code><message>Your spot request is fulfilled.</message></status>
      <instanceId>i-0abc</instanceId>
    </item>
    <item>
      <spotInstanceRequestId>sir-def456</spotInstanceRequestId>
      <state>open</state>
      <status><code>pending-evaluation</code></status>
    </item>
  </spotInstanceRequestSet>
</DescribeSpotInstanceRequestsResponse>"#;

    const INSTANCE_STATUS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<DescribeInstanceStatusResponse xmlns="http://ec2.amazonaws.com/doc/2016-11-15/">
  <instanceStatusSet>
    <item>
      <instanceId>i-0abc</instanceId>
      <systemStatus>
        <status>ok</status>
        <details>
          <item><name>reachability</name><status>passed</status></item>
        </details>
      </systemStatus>
      <instanceStatus>
        <status>ok</status>
        <details>
          <item><name>reachability</name><status>passed</status></item>
        </details>
      </instanceStatus>
    </item>
  </instanceStatusSet>
</DescribeInstanceStatusResponse>"#;

    const API_ERROR: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Errors>
    <Error>
      <Code>InvalidAMIID.NotFound</Code>
      <Message>The image id '[ami-zzz]' does not exist</Message>
    </Error>
  </Errors>
  <RequestID>8f7724cf-496f-496e-8fe3-example</RequestID>
</Response>"#;

    #[test]
    fn test_parse_describe_instances() {
        let instances = parse_describe_instances(DESCRIBE_INSTANCES).unwrap();
        assert_eq!(instances.len(), 2);

        let first = &instances[0];
        assert_eq!(first.id, "i-0abc1234def567890");
        assert_eq!(first.state, InstanceState::Running);
        assert_eq!(
            first.public_dns.as_deref(),
            Some("ec2-54-214-0-12.us-west-2.compute.amazonaws.com")
        );
        assert_eq!(first.public_ip.as_deref(), Some("54.214.0.12"));
        assert_eq!(first.availability_zone.as_deref(), Some("us-west-2a"));
        assert_eq!(first.cluster(), Some("exp-7"));
        assert_eq!(first.name(), Some("exp-7-i-0abc1234def567890"));

        let second = &instances[1];
        assert_eq!(second.state, InstanceState::Stopped);
        assert!(second.public_dns.is_none());
        assert!(second.tags.is_empty());
    }

    #[test]
    fn test_parse_run_instances() {
        let ids = parse_run_instances(RUN_INSTANCES).unwrap();
        assert_eq!(ids, vec!["i-aaa".to_string(), "i-bbb".to_string()]);
    }

    #[test]
    fn test_parse_spot_requests() {
        let requests = parse_spot_requests(SPOT_REQUESTS).unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].fulfilled());
        assert_eq!(requests[0].instance_id.as_deref(), Some("i-0abc"));
        assert!(!requests[1].fulfilled());
        assert_eq!(requests[1].status_code.as_deref(), Some("pending-evaluation"));
    }

    #[test]
    fn test_parse_reachability() {
        assert_eq!(
            parse_reachability(INSTANCE_STATUS).unwrap(),
            Reachability::Passed
        );

        // empty status set: no data yet
        let empty = r#"<DescribeInstanceStatusResponse><instanceStatusSet/></DescribeInstanceStatusResponse>"#;
        assert_eq!(parse_reachability(empty).unwrap(), Reachability::Unknown);
    }

    #[test]
    fn test_parse_error_body() {
        let (code, message) = parse_error(API_ERROR).unwrap();
        assert_eq!(code, "InvalidAMIID.NotFound");
        assert!(message.contains("does not exist"));
        assert!(parse_error("<Response><RequestID>x</RequestID></Response>").is_none());
    }

    #[test]
    fn test_malformed_xml_is_a_decode_error() {
        let err = parse_describe_instances("<unclosed>").unwrap_err();
        assert!(matches!(err, FleetError::Decode { .. }));
    }

    #[test]
    fn test_unknown_state_is_a_decode_error() {
        let xml = r#"<DescribeInstancesResponse><reservationSet><item><instancesSet>
            <item><instanceId>i-x</instanceId><instanceState><name>warming-up</name></instanceState></item>
        </instancesSet></item></reservationSet></DescribeInstancesResponse>"#;
        let err = parse_describe_instances(xml).unwrap_err();
        assert!(err.to_string().contains("warming-up"));
    }
}
