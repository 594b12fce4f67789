pub mod cluster;
pub mod config;
pub mod error;
pub mod mock;
pub mod ops;
pub mod provider;

pub use cluster::{
    member_name, member_tags, Instance, InstanceState, LaunchSpec, Reachability, SpotRequest, Tag,
    CLUSTER_TAG, NAME_TAG,
};
pub use config::{Credentials, FleetConfig, DEFAULT_REGION, DEFAULT_SSH_USER};
pub use error::{FleetError, Result};
pub use ops::{NullReporter, PollOptions, Reporter};
pub use provider::CloudProvider;
