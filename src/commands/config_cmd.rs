use clap::{Args, Subcommand};

use super::OutputFormat;
use mintboard::config::{Config, ConfigValue};

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&redacted(config))?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        println!(
                            "database_path: {}",
                            config.database_path.value.display()
                        );
                        println!("  source: {}", config.database_path.source);
                        println!();

                        let sync = &config.sync;
                        print_value("sync.server_url", &sync.server_url, |v| {
                            v.clone().unwrap_or_else(|| "(not set)".to_string())
                        });
                        print_value("sync.api_key", &sync.api_key, |v| match v {
                            Some(_) => "********".to_string(),
                            None => "(not set)".to_string(),
                        });
                        print_value("sync.auto_sync", &sync.auto_sync, bool::to_string);
                        print_value("sync.timeout_secs", &sync.timeout_secs, u64::to_string);
                    }
                }
                Ok(())
            }
        }
    }
}

fn print_value<T>(name: &str, value: &ConfigValue<T>, render: impl Fn(&T) -> String) {
    println!("{}: {}", name, render(&value.value));
    println!("  source: {}", value.source);
    println!();
}

/// Copy of the config with the API key masked.
fn redacted(config: &Config) -> Config {
    let mut config = config.clone();
    if config.sync.api_key.value.is_some() {
        config.sync.api_key.value = Some("********".to_string());
    }
    config
}
