//! Print or initialise the engine configuration.

use std::path::PathBuf;

use clap::Args;
use tessel_config::{EngineConfig, default_config_path};

#[derive(Args)]
pub struct ConfigArgs {
    /// Write the default configuration to the user config file
    #[arg(long)]
    init: bool,

    /// Write to this path instead of the user config file
    #[arg(long, value_name = "FILE", requires = "init")]
    path: Option<PathBuf>,

    /// Overwrite an existing file
    #[arg(long, requires = "init")]
    force: bool,
}

pub fn run(args: ConfigArgs, current: &EngineConfig) -> anyhow::Result<()> {
    if !args.init {
        print!("{}", current.to_toml()?);
        return Ok(());
    }

    let path = args.path.unwrap_or_else(default_config_path);
    if path.exists() && !args.force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    EngineConfig::default().save(&path)?;
    println!("Wrote {}", path.display());
    Ok(())
}
