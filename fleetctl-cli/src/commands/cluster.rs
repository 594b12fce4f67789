//! Cluster lifecycle commands
//!
//! Commands: create, create-spot, destroy, describe, hosts, stop, start

use anyhow::Result;
use clap::Parser;
use console::style;
use serde::Serialize;
use tracing::info;

use fleetctl_core::{ops, FleetConfig, Instance, PollOptions, Reachability};

use super::{build_provider, resolve_launch_spec, CliReporter};
use crate::ui;

// === Arg Structs ===

/// Launch parameters shared by `create` and `create-spot`
#[derive(Parser, Debug)]
pub struct LaunchFlags {
    /// AMI id to launch (e.g. ami-9abea4fb)
    #[arg(long)]
    ami: Option<String>,

    /// Instance type (e.g. t2.medium)
    #[arg(long = "type", value_name = "TYPE")]
    instance_type: Option<String>,

    /// Key pair name registered with the provider
    #[arg(long)]
    key: Option<String>,

    /// Security group id (e.g. sg-56ca3e31)
    #[arg(long = "secgroup", value_name = "SG_ID")]
    security_group: Option<String>,

    /// Number of instances in the cluster
    #[arg(long)]
    num: Option<u32>,

    /// Region to operate in (e.g. us-west-2)
    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,
}

#[derive(Parser, Debug)]
pub struct CreateArgs {
    /// Cluster name (e.g. 'exp-7')
    cluster_name: String,

    #[command(flatten)]
    launch: LaunchFlags,
}

#[derive(Parser, Debug)]
pub struct CreateSpotArgs {
    /// Cluster name (e.g. 'exp-7')
    cluster_name: String,

    /// Max hourly bid price in dollars (e.g. 0.50)
    #[arg(long)]
    price: f64,

    #[command(flatten)]
    launch: LaunchFlags,
}

#[derive(Parser, Debug)]
pub struct ClusterArgs {
    /// Cluster name
    cluster_name: String,

    /// Region to operate in (e.g. us-west-2)
    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,
}

#[derive(Parser, Debug)]
pub struct DescribeArgs {
    /// Cluster name
    cluster_name: String,

    /// Region to operate in (e.g. us-west-2)
    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,

    /// Emit JSON instead of the human-readable listing
    #[arg(long)]
    json: bool,
}

#[derive(Parser, Debug)]
pub struct HostsArgs {
    /// Cluster name
    cluster_name: String,

    /// Region to operate in (e.g. us-west-2)
    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,

    /// Emit a JSON array instead of one host per line
    #[arg(long)]
    json: bool,
}

// === Command Implementations ===

pub async fn run_create(args: CreateArgs) -> Result<()> {
    let config = FleetConfig::load()?;
    let spec = resolve_launch_spec(
        &config,
        args.launch.ami,
        args.launch.instance_type,
        args.launch.key,
        args.launch.security_group,
    )?;
    let count = args.launch.num.or(config.defaults.count).unwrap_or(2);
    let provider = build_provider(args.launch.region, &config)?;

    info!(
        "creating cluster '{}': {} x {} in {}",
        args.cluster_name,
        count,
        spec.instance_type,
        provider.region()
    );
    println!("{}", style("Creating instances ...").yellow());
    let mut reporter = CliReporter::new("waiting for instances to come up ...");
    let result = ops::create_cluster(
        &provider,
        &args.cluster_name,
        &spec,
        count,
        &PollOptions::default(),
        &mut reporter,
    )
    .await;
    match result {
        Ok(members) => {
            reporter.finish(format!(
                "cluster '{}' ready ({} instance(s))",
                args.cluster_name,
                members.len()
            ));
            Ok(())
        }
        Err(err) => {
            reporter.fail(format!("create '{}' failed", args.cluster_name));
            Err(err.into())
        }
    }
}

pub async fn run_create_spot(args: CreateSpotArgs) -> Result<()> {
    let config = FleetConfig::load()?;
    let spec = resolve_launch_spec(
        &config,
        args.launch.ami,
        args.launch.instance_type,
        args.launch.key,
        args.launch.security_group,
    )?;
    let count = args.launch.num.or(config.defaults.count).unwrap_or(2);
    let provider = build_provider(args.launch.region, &config)?;

    info!(
        "creating spot cluster '{}': {} x {} at max ${}/hr in {}",
        args.cluster_name,
        count,
        spec.instance_type,
        args.price,
        provider.region()
    );
    println!("{}", style("Creating spot instances ...").yellow());
    let mut reporter = CliReporter::new("waiting for spot requests to fulfill ...");
    let result = ops::create_spot_cluster(
        &provider,
        &args.cluster_name,
        &spec,
        count,
        args.price,
        &PollOptions::default(),
        &mut reporter,
    )
    .await;
    match result {
        Ok(members) => {
            reporter.finish(format!(
                "cluster '{}' ready ({} instance(s))",
                args.cluster_name,
                members.len()
            ));
            Ok(())
        }
        Err(err) => {
            reporter.fail(format!("create-spot '{}' failed", args.cluster_name));
            Err(err.into())
        }
    }
}

pub async fn run_destroy(args: ClusterArgs) -> Result<()> {
    let config = FleetConfig::load()?;
    let provider = build_provider(args.region, &config)?;

    let remaining = ops::destroy_cluster(&provider, &args.cluster_name).await?;
    println!("{}", style("Terminating instances ...").yellow());
    for instance in &remaining {
        println!("{}", ui::member_line(instance));
    }
    Ok(())
}

pub async fn run_stop(args: ClusterArgs) -> Result<()> {
    let config = FleetConfig::load()?;
    let provider = build_provider(args.region, &config)?;

    let members = ops::stop_cluster(&provider, &args.cluster_name).await?;
    println!("{}", style("Stopping instances ...").yellow());
    for instance in &members {
        println!("{}", ui::member_line(instance));
    }
    Ok(())
}

pub async fn run_start(args: ClusterArgs) -> Result<()> {
    let config = FleetConfig::load()?;
    let provider = build_provider(args.region, &config)?;

    let members = ops::start_cluster(&provider, &args.cluster_name).await?;
    println!("{}", style("Starting instances ...").yellow());
    for instance in &members {
        println!("{}", ui::member_line(instance));
    }
    Ok(())
}

#[derive(Serialize)]
struct DescribedMember<'a> {
    #[serde(flatten)]
    instance: &'a Instance,
    reachability: Reachability,
}

pub async fn run_describe(args: DescribeArgs) -> Result<()> {
    let config = FleetConfig::load()?;
    let provider = build_provider(args.region, &config)?;

    let described = ops::describe_cluster(&provider, &args.cluster_name).await?;
    if args.json {
        let rows: Vec<DescribedMember<'_>> = described
            .iter()
            .map(|(instance, reachability)| DescribedMember {
                instance,
                reachability: *reachability,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for (instance, reachability) in &described {
        println!(
            "{}  reachability: {}",
            ui::member_line(instance),
            reachability
        );
    }
    Ok(())
}

pub async fn run_hosts(args: HostsArgs) -> Result<()> {
    let config = FleetConfig::load()?;
    let provider = build_provider(args.region, &config)?;

    let hosts = ops::cluster_hosts(&provider, &args.cluster_name).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&hosts)?);
        return Ok(());
    }
    for host in &hosts {
        println!("{}", host);
    }
    Ok(())
}
