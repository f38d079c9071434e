//! The `prism config` command.

use clap::{Args, Subcommand};
use prism_core::Config;

/// Arguments for the `config` command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Subcommands for configuration management.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the active configuration as TOML
    Show {
        /// Also print resolved paths (database, backend roots)
        #[arg(long)]
        resolved: bool,
    },

    /// Print the config file location
    Path,

    /// Write a default config file to the standard location
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Execute the config command.
pub async fn execute(args: ConfigArgs) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Show { resolved } => show(resolved),
        ConfigCommand::Path => {
            let path = Config::default_path();
            let state = if path.exists() { "" } else { " (not created yet)" };
            println!("{}{state}", path.display());
            Ok(())
        }
        ConfigCommand::Init { force } => init(force),
    }
}

fn show(resolved: bool) -> anyhow::Result<()> {
    let config = Config::load()?;
    print!("{}", config.to_toml()?);
    if resolved {
        // Tilde expansion applied, as the running process sees them.
        println!();
        println!("# database = {}", config.database_path().display());
        for (name, backend) in &config.storage.backends {
            println!(
                "# storage.{name} = {} -> {}",
                Config::backend_root(backend).display(),
                backend.base_url
            );
        }
    }
    Ok(())
}

fn init(force: bool) -> anyhow::Result<()> {
    let path = Config::default_path();
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite",
            path.display()
        );
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, Config::default().to_toml()?)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}
