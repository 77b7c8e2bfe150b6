use clap::{Args, Subcommand};

use crate::config::Config;

#[derive(Debug, Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    command: ConfigSubcommand,
}

#[derive(Debug, Subcommand)]
enum ConfigSubcommand {
    /// Show current configuration values
    Show,

    /// Write a config file scaffold if none exists
    Init,
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show => {
                println!("Configuration");
                println!("=============\n");
                println!(
                    "api_url:       {}",
                    if config.api_url.is_empty() {
                        "(not set)"
                    } else {
                        config.api_url.as_str()
                    }
                );
                println!(
                    "stream_url:    {}",
                    if config.stream_url.is_empty() {
                        "(not set)"
                    } else {
                        config.stream_url.as_str()
                    }
                );
                println!("database_path: {}", config.database_path.display());
                println!();
                println!("Config file: {}", Config::default_config_path().display());
            }
            ConfigSubcommand::Init => {
                let path = Config::default_config_path();
                if path.exists() {
                    println!("Config file already exists: {}", path.display());
                    return Ok(());
                }
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let scaffold = serde_yaml::to_string(&Config::default())?;
                std::fs::write(&path, scaffold)?;
                println!("Wrote {}", path.display());
            }
        }
        Ok(())
    }
}
