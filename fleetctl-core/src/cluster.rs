//! Domain model for a cluster of provider instances.
//!
//! A cluster has no storage of its own: it is the set of instances carrying a
//! `Cluster` tag with the cluster's name. Every type here mirrors what the
//! provider reports; nothing is persisted locally.

use serde::Serialize;

/// Tag key that marks an instance as a cluster member
pub const CLUSTER_TAG: &str = "Cluster";

/// Tag key for the per-instance display name
pub const NAME_TAG: &str = "Name";

/// Provider-managed instance lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceState {
    Pending,
    Running,
    ShuttingDown,
    Terminated,
    Stopping,
    Stopped,
}

impl InstanceState {
    /// Parse the provider's wire name for a state
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "shutting-down" => Some(Self::ShuttingDown),
            "terminated" => Some(Self::Terminated),
            "stopping" => Some(Self::Stopping),
            "stopped" => Some(Self::Stopped),
            _ => None,
        }
    }

    /// Wire name of the state
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::ShuttingDown => "shutting-down",
            Self::Terminated => "terminated",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// System reachability as reported by the provider's status checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Reachability {
    Passed,
    Failed,
    Initializing,
    InsufficientData,
    /// No status data available (stopped instances, very fresh launches)
    Unknown,
}

impl Reachability {
    pub fn from_status(status: &str) -> Self {
        match status {
            "passed" => Self::Passed,
            "failed" => Self::Failed,
            "initializing" => Self::Initializing,
            "insufficient-data" => Self::InsufficientData,
            _ => Self::Unknown,
        }
    }

    pub fn passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Initializing => "initializing",
            Self::InsufficientData => "insufficient-data",
            Self::Unknown => "not reachable",
        }
    }
}

impl std::fmt::Display for Reachability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A key/value tag on an instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Provider view of a single instance
#[derive(Debug, Clone, Serialize)]
pub struct Instance {
    pub id: String,
    pub instance_type: String,
    pub state: InstanceState,
    pub public_dns: Option<String>,
    pub public_ip: Option<String>,
    pub availability_zone: Option<String>,
    pub key_name: Option<String>,
    pub launch_time: Option<String>,
    pub tags: Vec<Tag>,
}

impl Instance {
    /// Value of the `Name` tag, if present
    pub fn name(&self) -> Option<&str> {
        self.tag(NAME_TAG)
    }

    /// Value of the `Cluster` tag, if present
    pub fn cluster(&self) -> Option<&str> {
        self.tag(CLUSTER_TAG)
    }

    /// Value of an arbitrary tag
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.key == key)
            .map(|t| t.value.as_str())
    }

    /// Name tag when set, otherwise the raw instance id
    pub fn display_name(&self) -> &str {
        self.name().unwrap_or(&self.id)
    }
}

/// Launch parameters shared by on-demand and spot creation
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub ami: String,
    pub instance_type: String,
    pub key_name: Option<String>,
    pub security_group: Option<String>,
}

/// A spot capacity request as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotRequest {
    pub id: String,
    pub state: String,
    pub status_code: Option<String>,
    pub instance_id: Option<String>,
}

impl SpotRequest {
    /// A request is fulfilled once its status code says so and the backing
    /// instance id is known.
    pub fn fulfilled(&self) -> bool {
        self.status_code.as_deref() == Some("fulfilled") && self.instance_id.is_some()
    }
}

/// The `Name` tag value for a cluster member: `<cluster>-<instance-id>`
pub fn member_name(cluster: &str, instance_id: &str) -> String {
    format!("{}-{}", cluster, instance_id)
}

/// Tags applied to every freshly created member
pub fn member_tags(cluster: &str, instance_id: &str) -> Vec<Tag> {
    vec![
        Tag::new(NAME_TAG, member_name(cluster, instance_id)),
        Tag::new(CLUSTER_TAG, cluster),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(id: &str, state: InstanceState, tags: Vec<Tag>) -> Instance {
        Instance {
            id: id.into(),
            instance_type: "t2.medium".into(),
            state,
            public_dns: None,
            public_ip: None,
            availability_zone: None,
            key_name: None,
            launch_time: None,
            tags,
        }
    }

    #[test]
    fn test_state_round_trip() {
        for name in [
            "pending",
            "running",
            "shutting-down",
            "terminated",
            "stopping",
            "stopped",
        ] {
            let state = InstanceState::from_name(name).expect("known state");
            assert_eq!(state.as_str(), name);
        }
        assert!(InstanceState::from_name("hibernated").is_none());
    }

    #[test]
    fn test_member_tags() {
        let tags = member_tags("exp-7", "i-0abc");
        assert_eq!(tags[0], Tag::new("Name", "exp-7-i-0abc"));
        assert_eq!(tags[1], Tag::new("Cluster", "exp-7"));
    }

    #[test]
    fn test_display_name_falls_back_to_id() {
        let inst = instance("i-0abc", InstanceState::Running, vec![]);
        assert_eq!(inst.display_name(), "i-0abc");

        let inst = instance(
            "i-0abc",
            InstanceState::Running,
            member_tags("exp-7", "i-0abc"),
        );
        assert_eq!(inst.display_name(), "exp-7-i-0abc");
        assert_eq!(inst.cluster(), Some("exp-7"));
    }

    #[test]
    fn test_spot_fulfilled_requires_instance_id() {
        let mut req = SpotRequest {
            id: "sir-1".into(),
            state: "open".into(),
            status_code: Some("fulfilled".into()),
            instance_id: None,
        };
        assert!(!req.fulfilled());
        req.instance_id = Some("i-0abc".into());
        assert!(req.fulfilled());
    }

    #[test]
    fn test_reachability_parsing() {
        assert!(Reachability::from_status("passed").passed());
        assert_eq!(
            Reachability::from_status("insufficient-data"),
            Reachability::InsufficientData
        );
        assert_eq!(Reachability::from_status("??"), Reachability::Unknown);
    }
}
