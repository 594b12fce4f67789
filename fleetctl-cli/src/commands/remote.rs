//! Remote execution commands: run, kill, copy
//!
//! Each one resolves the cluster membership, then walks the members in order
//! and shells out to scp/ssh. The first failure aborts the command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;

use fleetctl_core::{ops, FleetConfig, FleetError, Instance};
use fleetctl_ec2::Ec2Client;

use super::{build_provider, resolve_shell};

// === Arg Structs ===

/// SSH flags shared by run/kill/copy
#[derive(Parser, Debug)]
pub struct SshFlags {
    /// Identity file (e.g. user.pem)
    #[arg(short = 'i', long = "identity", value_name = "PEM")]
    identity: Option<PathBuf>,

    /// Login user on the instances
    #[arg(long)]
    user: Option<String>,

    /// Region to operate in (e.g. us-west-2)
    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Cluster name
    cluster_name: String,

    /// Script to copy and launch on every member (.py or .sh)
    script: PathBuf,

    #[command(flatten)]
    ssh: SshFlags,
}

#[derive(Parser, Debug)]
pub struct KillArgs {
    /// Cluster name
    cluster_name: String,

    #[command(flatten)]
    ssh: SshFlags,
}

#[derive(Parser, Debug)]
pub struct CopyArgs {
    /// Cluster name
    cluster_name: String,

    /// File to copy to every member's home directory
    file: PathBuf,

    #[command(flatten)]
    ssh: SshFlags,
}

/// Live members paired with the public DNS name ssh needs. A member without
/// one (stopped, still booting) fails the whole command.
async fn members_with_hosts(
    provider: &Ec2Client,
    cluster: &str,
) -> Result<Vec<(Instance, String)>> {
    let members = ops::active_members(provider, cluster).await?;
    if members.is_empty() {
        return Err(FleetError::EmptyCluster {
            cluster: cluster.to_string(),
        }
        .into());
    }
    members
        .into_iter()
        .map(|instance| {
            let host = instance.public_dns.clone().with_context(|| {
                format!(
                    "instance {} has no public DNS (state: {})",
                    instance.display_name(),
                    instance.state
                )
            })?;
            Ok((instance, host))
        })
        .collect()
}

// === Command Implementations ===

pub async fn run_run(args: RunArgs) -> Result<()> {
    let config = FleetConfig::load()?;
    // validate before copying anything anywhere
    let interpreter = fleetctl_ssh::interpreter_for(&args.script)?;
    let shell = resolve_shell(&config, args.ssh.identity, args.ssh.user)?;
    let provider = build_provider(args.ssh.region, &config)?;

    let members = members_with_hosts(&provider, &args.cluster_name).await?;
    let script_name = args
        .script
        .file_name()
        .and_then(|n| n.to_str())
        .context("script path has no file name")?;

    for (_, host) in &members {
        shell.copy(host, &args.script).await?;
        println!(
            "{} {} to {}",
            style("SCP").green().bold(),
            args.script.display(),
            host
        );
        shell
            .launch_detached(
                host,
                &args.cluster_name,
                &format!("{} {}", interpreter, script_name),
            )
            .await?;
        println!("{} {} on {}", style("TMUX").green().bold(), script_name, host);
    }
    Ok(())
}

pub async fn run_kill(args: KillArgs) -> Result<()> {
    let config = FleetConfig::load()?;
    let shell = resolve_shell(&config, args.ssh.identity, args.ssh.user)?;
    let provider = build_provider(args.ssh.region, &config)?;

    let members = members_with_hosts(&provider, &args.cluster_name).await?;
    for (_, host) in &members {
        shell.kill_session(host, &args.cluster_name).await?;
        println!(
            "{} tmux session on {}",
            style("KILLED").red().bold(),
            host
        );
    }
    Ok(())
}

pub async fn run_copy(args: CopyArgs) -> Result<()> {
    let config = FleetConfig::load()?;
    let shell = resolve_shell(&config, args.ssh.identity, args.ssh.user)?;
    let provider = build_provider(args.ssh.region, &config)?;

    let members = members_with_hosts(&provider, &args.cluster_name).await?;
    for (_, host) in &members {
        shell.copy(host, &args.file).await?;
        println!(
            "{} {} to {}",
            style("SCP").green().bold(),
            args.file.display(),
            host
        );
    }
    Ok(())
}
