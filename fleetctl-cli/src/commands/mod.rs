//! Command implementations and the flag → env → config resolution they share.

pub mod cluster;
pub mod remote;

pub use cluster::{
    run_create, run_create_spot, run_describe, run_destroy, run_hosts, run_start, run_stop,
};
pub use remote::{run_copy, run_kill, run_run};

use std::path::PathBuf;

use anyhow::{Context, Result};
use indicatif::ProgressBar;

use fleetctl_core::{
    Credentials, FleetConfig, Instance, LaunchSpec, Reporter, SpotRequest, DEFAULT_REGION,
    DEFAULT_SSH_USER,
};
use fleetctl_ec2::Ec2Client;
use fleetctl_ssh::RemoteShell;

use crate::ui;

/// Region resolution: `--region` flag (which also reads `AWS_REGION`) →
/// config file → built-in default
pub(crate) fn resolve_region(flag: Option<String>, config: &FleetConfig) -> String {
    flag.or_else(|| config.defaults.region.clone())
        .unwrap_or_else(|| DEFAULT_REGION.to_string())
}

/// Build the provider client from environment credentials
pub(crate) fn build_provider(
    region_flag: Option<String>,
    config: &FleetConfig,
) -> Result<Ec2Client> {
    let credentials = Credentials::from_env()?;
    let region = resolve_region(region_flag, config);
    Ok(Ec2Client::new(credentials, &region)?)
}

/// Resolve the launch parameters for create/create-spot
pub(crate) fn resolve_launch_spec(
    config: &FleetConfig,
    ami: Option<String>,
    instance_type: Option<String>,
    key: Option<String>,
    security_group: Option<String>,
) -> Result<LaunchSpec> {
    let defaults = &config.defaults;
    Ok(LaunchSpec {
        ami: ami
            .or_else(|| defaults.ami.clone())
            .context("no AMI configured: pass --ami or set defaults.ami in the config file")?,
        instance_type: instance_type
            .or_else(|| defaults.instance_type.clone())
            .unwrap_or_else(|| "t2.medium".to_string()),
        key_name: key.or_else(|| defaults.key_name.clone()),
        security_group: security_group.or_else(|| defaults.security_group.clone()),
    })
}

/// Resolve the ssh runner for run/kill/copy; the identity file is mandatory
pub(crate) fn resolve_shell(
    config: &FleetConfig,
    identity: Option<PathBuf>,
    user: Option<String>,
) -> Result<RemoteShell> {
    let identity = identity
        .or_else(|| config.defaults.identity_file.clone())
        .context("no identity file (.pem) provided: pass -i or set defaults.identity_file")?;
    let user = user
        .or_else(|| config.defaults.ssh_user.clone())
        .unwrap_or_else(|| DEFAULT_SSH_USER.to_string());
    let shell = RemoteShell::new(identity, user);
    shell.check_available()?;
    Ok(shell)
}

/// Printing [`Reporter`] used by the create flows: progress events go to
/// stdout, with a spinner on stderr while polling (unless quiet)
pub(crate) struct CliReporter {
    spinner: Option<ProgressBar>,
}

impl CliReporter {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            spinner: ui::spinner(msg),
        }
    }

    fn println(&self, line: String) {
        match &self.spinner {
            Some(pb) => pb.println(line),
            None => println!("{}", line),
        }
    }

    pub fn finish(self, msg: impl Into<String>) {
        ui::finish_success(self.spinner, msg);
    }

    pub fn fail(self, msg: impl Into<String>) {
        ui::finish_error(self.spinner, msg);
    }
}

impl Reporter for CliReporter {
    fn spot_fulfilled(&mut self, request: &SpotRequest) {
        let instance = request.instance_id.as_deref().unwrap_or("?");
        self.println(format!(
            "spot request {} fulfilled: {} created",
            request.id, instance
        ));
    }

    fn spot_waiting(&mut self, pending: &[String]) {
        if let Some(pb) = &self.spinner {
            pb.set_message(format!("waiting on {} spot request(s) ...", pending.len()));
        }
    }

    fn instance_active(&mut self, instance: &Instance) {
        self.println(ui::member_line(instance));
    }
}
