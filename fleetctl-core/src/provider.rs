//! Provider abstraction over the cloud instance-management API.
//!
//! Command orchestration in [`crate::ops`] only ever talks to this trait, so
//! the whole command surface is testable against [`crate::mock::MockProvider`]
//! without touching the network.

use async_trait::async_trait;

use crate::cluster::{Instance, LaunchSpec, Reachability, SpotRequest, Tag};
use crate::error::Result;

#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// All instances carrying the cluster tag, in every lifecycle state.
    /// Callers are expected to drop terminated members themselves.
    async fn list_cluster_instances(&self, cluster: &str) -> Result<Vec<Instance>>;

    /// Launch `count` on-demand instances. Returns the new instance ids.
    async fn launch_instances(&self, spec: &LaunchSpec, count: u32) -> Result<Vec<String>>;

    /// Place `count` one-time spot requests at `max_price`. Returns request ids.
    async fn request_spot_instances(
        &self,
        spec: &LaunchSpec,
        count: u32,
        max_price: f64,
    ) -> Result<Vec<String>>;

    /// Current state of the given spot requests.
    async fn describe_spot_requests(&self, ids: &[String]) -> Result<Vec<SpotRequest>>;

    /// Cancel the given spot requests.
    async fn cancel_spot_requests(&self, ids: &[String]) -> Result<()>;

    /// Apply tags to a single instance.
    async fn tag_instance(&self, instance_id: &str, tags: &[Tag]) -> Result<()>;

    async fn start_instances(&self, ids: &[String]) -> Result<()>;

    async fn stop_instances(&self, ids: &[String]) -> Result<()>;

    async fn terminate_instances(&self, ids: &[String]) -> Result<()>;

    /// System reachability of one instance per the provider's status checks.
    async fn instance_reachability(&self, instance_id: &str) -> Result<Reachability>;
}
