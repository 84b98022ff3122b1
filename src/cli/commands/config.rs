use anyhow::{Context, Result};
use clap::Subcommand;

use crate::cli::output::Formatter;
use crate::models::{Config, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Write a configuration file with default values")]
    Init {
        #[arg(long, short = 'f', help = "Force overwrite existing config")]
        force: bool,
    },
    #[command(about = "Show the effective configuration")]
    Show,
    #[command(about = "Show configuration file paths")]
    Path,
}

pub fn handle_config(cmd: ConfigCommand, config: &Config, format: OutputFormat, formatter: &dyn Formatter) -> Result<()> {
    match cmd {
        ConfigCommand::Init { force } => handle_init(force, formatter),
        ConfigCommand::Show => handle_show(config, format),
        ConfigCommand::Path => handle_path(),
    }
}

fn handle_init(force: bool, formatter: &dyn Formatter) -> Result<()> {
    let path = Config::config_path()
        .ok_or_else(|| anyhow::anyhow!("could not determine config directory"))?;

    if path.exists() && !force {
        anyhow::bail!(
            "Config already exists at: {}\nUse --force to overwrite.",
            path.display()
        );
    }

    Config::default()
        .save_to(&path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    print!(
        "{}",
        formatter.format_message(&format!("Created config at: {}", path.display()))
    );
    Ok(())
}

/// Render with the vector store API key masked.
fn redacted(config: &Config) -> Config {
    let mut shown = config.clone();
    if shown.vector_store.api_key.is_some() {
        shown.vector_store.api_key = Some("********".to_string());
    }
    shown
}

fn handle_show(config: &Config, format: OutputFormat) -> Result<()> {
    let shown = redacted(config);
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&shown)?);
        return Ok(());
    }

    if let Some(path) = Config::config_path().filter(|p| p.exists()) {
        println!("# Loaded from: {}\n", path.display());
    } else {
        println!("# Defaults (no config file found)\n");
    }
    print!("{}", toml::to_string_pretty(&shown)?);
    Ok(())
}

fn handle_path() -> Result<()> {
    println!("Configuration paths:");
    println!();

    match Config::config_path() {
        Some(path) if path.exists() => println!("Config (active): {}", path.display()),
        Some(path) => println!("Config (would be): {}", path.display()),
        None => println!("Config: no config directory available"),
    }

    if let Ok(cwd) = std::env::current_dir() {
        let env_path = cwd.join(".env");
        if env_path.exists() {
            println!(".env file (active): {}", env_path.display());
        } else {
            println!(".env file (would be): {}", env_path.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacted_masks_api_key() {
        let mut config = Config::default();
        assert!(redacted(&config).vector_store.api_key.is_none());

        config.vector_store.api_key = Some("secret".to_string());
        let shown = redacted(&config);
        assert_eq!(shown.vector_store.api_key.as_deref(), Some("********"));
        assert!(!toml::to_string_pretty(&shown).unwrap().contains("secret"));
    }
}
