//! Configuration view and bootstrap commands — `leadcrm config`.

use std::path::Path;

use anyhow::{Context, Result, bail};
use leadcrm::config::CrmConfig;

use super::super::ConfigCommands;

pub fn cmd_config(
    config_path: &Path,
    effective: &CrmConfig,
    command: Option<ConfigCommands>,
) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            if config_path.exists() {
                println!("# Config file: {}", config_path.display());
            } else {
                println!("# No config file at {}, using defaults", config_path.display());
            }
            println!("# Effective values (with env/CLI overrides):");
            println!();
            let rendered =
                toml::to_string_pretty(effective).context("Failed to render configuration")?;
            print!("{}", rendered);
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                bail!("{} already exists", config_path.display());
            }
            CrmConfig::default().save(config_path)?;
            println!("Created {}", config_path.display());
        }
    }
    Ok(())
}
