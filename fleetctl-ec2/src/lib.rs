//! EC2 Query API client for fleetctl.
//!
//! Speaks `Version=2016-11-15` of the Query API directly: every call is a
//! SigV4-signed POST of form-encoded parameters, every response a small XML
//! document. Only the handful of actions the cluster commands need are
//! implemented.

mod sign;
mod xml;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use fleetctl_core::{
    CloudProvider, Credentials, FleetError, Instance, LaunchSpec, Reachability, Result,
    SpotRequest, Tag,
};

const API_VERSION: &str = "2016-11-15";

/// Sorted Query API parameters for one action
struct ActionParams {
    action: &'static str,
    params: BTreeMap<String, String>,
}

impl ActionParams {
    fn new(action: &'static str) -> Self {
        let mut params = BTreeMap::new();
        params.insert("Action".to_string(), action.to_string());
        params.insert("Version".to_string(), API_VERSION.to_string());
        Self { action, params }
    }

    fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    fn set_opt(self, key: impl Into<String>, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.set(key, v),
            None => self,
        }
    }

    /// Numbered list parameter: `prefix.1`, `prefix.2`, …
    fn set_list<S: AsRef<str>>(mut self, prefix: &str, values: &[S]) -> Self {
        for (i, value) in values.iter().enumerate() {
            self.params
                .insert(format!("{}.{}", prefix, i + 1), value.as_ref().to_string());
        }
        self
    }

    /// Form-encoded body, keys in sorted order for deterministic requests
    fn body(&self) -> String {
        self.params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Client for one region of the EC2 API
pub struct Ec2Client {
    http: reqwest::Client,
    credentials: Credentials,
    region: String,
    host: String,
    endpoint: String,
}

impl Ec2Client {
    pub fn new(credentials: Credentials, region: &str) -> Result<Self> {
        let host = format!("ec2.{}.amazonaws.com", region);
        let endpoint = format!("https://{}/", host);
        Self::build(credentials, region, host, endpoint)
    }

    /// Point the client at a non-default endpoint (API-compatible gateways,
    /// local stacks). The signing region stays as given.
    pub fn with_endpoint(credentials: Credentials, region: &str, endpoint: &str) -> Result<Self> {
        let url = reqwest::Url::parse(endpoint)
            .map_err(|e| FleetError::config(format!("invalid endpoint '{}': {}", endpoint, e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| FleetError::config(format!("endpoint '{}' has no host", endpoint)))?
            .to_string();
        Self::build(credentials, region, host, endpoint.to_string())
    }

    fn build(
        credentials: Credentials,
        region: &str,
        host: String,
        endpoint: String,
    ) -> Result<Self> {
        // No overall timeout would let a wedged API call hang a command forever.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(FleetError::transport)?;
        Ok(Self {
            http,
            credentials,
            region: region.to_string(),
            host,
            endpoint,
        })
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    async fn call(&self, params: ActionParams) -> Result<String> {
        let body = params.body();
        let signed = sign::sign_post(&self.credentials, &self.region, &self.host, &body, Utc::now());

        let mut request = self
            .http
            .post(&self.endpoint)
            .header("content-type", sign::FORM_CONTENT_TYPE)
            .header("x-amz-date", &signed.amz_date)
            .header("authorization", &signed.authorization);
        if let Some(token) = &signed.security_token {
            request = request.header("x-amz-security-token", token);
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(FleetError::transport)?;
        let status = response.status();
        let text = response.text().await.map_err(FleetError::transport)?;
        debug!(action = params.action, status = %status, "EC2 call");

        if !status.is_success() {
            return Err(match xml::parse_error(&text) {
                Some((code, message)) => FleetError::api(code, message),
                None => FleetError::api(
                    status.as_str().to_string(),
                    text.chars().take(300).collect::<String>(),
                ),
            });
        }
        Ok(text)
    }
}

#[async_trait]
impl CloudProvider for Ec2Client {
    async fn list_cluster_instances(&self, cluster: &str) -> Result<Vec<Instance>> {
        let params = ActionParams::new("DescribeInstances")
            .set("Filter.1.Name", format!("tag:{}", fleetctl_core::CLUSTER_TAG))
            .set("Filter.1.Value.1", cluster);
        let text = self.call(params).await?;
        xml::parse_describe_instances(&text)
    }

    async fn launch_instances(&self, spec: &LaunchSpec, count: u32) -> Result<Vec<String>> {
        let params = ActionParams::new("RunInstances")
            .set("ImageId", &spec.ami)
            .set("MinCount", count.to_string())
            .set("MaxCount", count.to_string())
            .set("InstanceType", &spec.instance_type)
            .set_opt("KeyName", spec.key_name.as_deref())
            .set_opt("SecurityGroupId.1", spec.security_group.as_deref());
        let text = self.call(params).await?;
        xml::parse_run_instances(&text)
    }

    async fn request_spot_instances(
        &self,
        spec: &LaunchSpec,
        count: u32,
        max_price: f64,
    ) -> Result<Vec<String>> {
        let params = ActionParams::new("RequestSpotInstances")
            .set("SpotPrice", max_price.to_string())
            .set("InstanceCount", count.to_string())
            .set("Type", "one-time")
            .set("LaunchSpecification.ImageId", &spec.ami)
            .set("LaunchSpecification.InstanceType", &spec.instance_type)
            .set_opt("LaunchSpecification.KeyName", spec.key_name.as_deref())
            .set_opt(
                "LaunchSpecification.SecurityGroupId.1",
                spec.security_group.as_deref(),
            );
        let text = self.call(params).await?;
        Ok(xml::parse_spot_requests(&text)?
            .into_iter()
            .map(|r| r.id)
            .collect())
    }

    async fn describe_spot_requests(&self, ids: &[String]) -> Result<Vec<SpotRequest>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let params =
            ActionParams::new("DescribeSpotInstanceRequests").set_list("SpotInstanceRequestId", ids);
        let text = self.call(params).await?;
        xml::parse_spot_requests(&text)
    }

    async fn cancel_spot_requests(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let params =
            ActionParams::new("CancelSpotInstanceRequests").set_list("SpotInstanceRequestId", ids);
        self.call(params).await?;
        Ok(())
    }

    async fn tag_instance(&self, instance_id: &str, tags: &[Tag]) -> Result<()> {
        let mut params = ActionParams::new("CreateTags").set("ResourceId.1", instance_id);
        for (i, tag) in tags.iter().enumerate() {
            params = params
                .set(format!("Tag.{}.Key", i + 1), &tag.key)
                .set(format!("Tag.{}.Value", i + 1), &tag.value);
        }
        self.call(params).await?;
        Ok(())
    }

    async fn start_instances(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let params = ActionParams::new("StartInstances").set_list("InstanceId", ids);
        self.call(params).await?;
        Ok(())
    }

    async fn stop_instances(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let params = ActionParams::new("StopInstances").set_list("InstanceId", ids);
        self.call(params).await?;
        Ok(())
    }

    async fn terminate_instances(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let params = ActionParams::new("TerminateInstances").set_list("InstanceId", ids);
        self.call(params).await?;
        Ok(())
    }

    async fn instance_reachability(&self, instance_id: &str) -> Result<Reachability> {
        let params = ActionParams::new("DescribeInstanceStatus").set("InstanceId.1", instance_id);
        let text = self.call(params).await?;
        xml::parse_reachability(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Credentials {
        Credentials {
            access_key_id: "AKIDEXAMPLE".into(),
            secret_access_key: "secret".into(),
            session_token: None,
        }
    }

    #[test]
    fn test_action_params_body_is_sorted_and_encoded() {
        let body = ActionParams::new("DescribeInstances")
            .set("Filter.1.Name", "tag:Cluster")
            .set("Filter.1.Value.1", "my cluster")
            .body();
        assert_eq!(
            body,
            "Action=DescribeInstances&Filter.1.Name=tag%3ACluster\
             &Filter.1.Value.1=my%20cluster&Version=2016-11-15"
        );
    }

    #[test]
    fn test_set_list_numbers_from_one() {
        let body = ActionParams::new("TerminateInstances")
            .set_list("InstanceId", &["i-aaa".to_string(), "i-bbb".to_string()])
            .body();
        assert!(body.contains("InstanceId.1=i-aaa"));
        assert!(body.contains("InstanceId.2=i-bbb"));
    }

    #[test]
    fn test_client_endpoints() {
        let client = Ec2Client::new(credentials(), "us-west-2").unwrap();
        assert_eq!(client.host, "ec2.us-west-2.amazonaws.com");
        assert_eq!(client.endpoint, "https://ec2.us-west-2.amazonaws.com/");

        let client =
            Ec2Client::with_endpoint(credentials(), "us-west-2", "http://localhost:4566/").unwrap();
        assert_eq!(client.host, "localhost");

        assert!(Ec2Client::with_endpoint(credentials(), "us-west-2", "not a url").is_err());
    }
}
