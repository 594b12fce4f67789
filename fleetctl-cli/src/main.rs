//! fleetctl CLI - tagged clusters of cloud compute instances
//!
//! This is the entry point for the fleetctl command-line tool, which provides:
//! - Cluster creation with on-demand or spot instances (`create`, `create-spot`)
//! - Lifecycle control over all members at once (`stop`, `start`, `destroy`)
//! - Cluster inspection (`describe`, `hosts`)
//! - Script execution and file distribution over ssh/scp (`run`, `kill`, `copy`)
//!
//! The cluster has no local state: membership lives entirely in the provider's
//! `Cluster` tag, so every command starts from a fresh tag query.

use std::io;

use anyhow::{anyhow, Result};
use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "fleetctl",
    author,
    version,
    about = "Manage tagged clusters of EC2 instances",
    long_about = "Create, inspect, and tear down named clusters of cloud instances, and push \
                  scripts or files to every member over ssh. Credentials come from \
                  AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY; launch defaults can live in \
                  ~/.fleetctl/config.toml."
)]
struct Cli {
    /// Suppress progress spinners (for script/LLM consumption)
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create an on-demand cluster and wait until every member is reachable
    Create(commands::cluster::CreateArgs),
    /// Create a spot cluster at a bid price and wait until every member is reachable
    CreateSpot(commands::cluster::CreateSpotArgs),
    /// Terminate every instance in a cluster
    Destroy(commands::cluster::ClusterArgs),
    /// List cluster members with state and reachability
    Describe(commands::cluster::DescribeArgs),
    /// Print member public DNS names, one per line
    Hosts(commands::cluster::HostsArgs),
    /// Stop every instance in a cluster
    Stop(commands::cluster::ClusterArgs),
    /// Start every stopped instance in a cluster
    Start(commands::cluster::ClusterArgs),
    /// Copy a script to every member and launch it in a detached tmux session
    Run(commands::remote::RunArgs),
    /// Kill the cluster's tmux session on every member
    Kill(commands::remote::KillArgs),
    /// Copy a file to every member's home directory
    Copy(commands::remote::CopyArgs),
    /// Generate shell completion scripts
    Completions(CompletionsArgs),
    /// Manage fleetctl configuration (init, path, show)
    Config(config::ConfigArgs),
}

#[derive(Parser, Debug)]
struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    shell: clap_complete::Shell,
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|err| anyhow!(err))
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing().ok();
    let cli = Cli::parse();

    // Initialize UI quiet mode from flag, env var, and TTY detection
    ui::init_quiet_mode(cli.quiet);

    if let Err(err) = dispatch(cli.command).await {
        eprintln!("{} {:#}", console::style("error:").red().bold(), err);
        std::process::exit(1);
    }
}

async fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Create(args) => commands::run_create(args).await,
        Commands::CreateSpot(args) => commands::run_create_spot(args).await,
        Commands::Destroy(args) => commands::run_destroy(args).await,
        Commands::Describe(args) => commands::run_describe(args).await,
        Commands::Hosts(args) => commands::run_hosts(args).await,
        Commands::Stop(args) => commands::run_stop(args).await,
        Commands::Start(args) => commands::run_start(args).await,
        Commands::Run(args) => commands::run_run(args).await,
        Commands::Kill(args) => commands::run_kill(args).await,
        Commands::Copy(args) => commands::run_copy(args).await,
        Commands::Completions(args) => run_completions(args),
        Commands::Config(args) => config::run_config(args),
    }
}

fn run_completions(args: CompletionsArgs) -> Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(args.shell, &mut cmd, "fleetctl", &mut io::stdout());
    Ok(())
}
