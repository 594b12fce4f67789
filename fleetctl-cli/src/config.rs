use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use fleetctl_core::config::{FleetConfig, CONFIG_TEMPLATE};

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Write a commented default config file
    Init(InitArgs),
    /// Show the config file path
    Path,
    /// Print the resolved configuration
    Show,
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Force overwrite existing config
    #[arg(long, short)]
    pub force: bool,
}

pub fn run_config(args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommands::Init(args) => run_init(args),
        ConfigCommands::Path => run_path(),
        ConfigCommands::Show => run_show(),
    }
}

fn run_init(args: InitArgs) -> Result<()> {
    let config_path = FleetConfig::config_path();

    if config_path.exists() && !args.force {
        return Err(anyhow::anyhow!(
            "Config already exists at {:?}\n\nUse --force to overwrite",
            config_path
        ));
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&config_path, CONFIG_TEMPLATE)
        .context(format!("Failed to write config file: {:?}", config_path))?;

    println!("✓ Created config at: {}", config_path.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit the config: $EDITOR {}", config_path.display());
    println!("  2. Set defaults.ami and defaults.key_name for your account");
    Ok(())
}

fn run_path() -> Result<()> {
    println!("{}", FleetConfig::config_path().display());
    Ok(())
}

fn run_show() -> Result<()> {
    let config = FleetConfig::load()?;
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
