//! `swarmloop config`: configuration management commands.

use anyhow::Context;

use swarmloop_config::AppConfig;

pub fn show(config: &AppConfig) -> anyhow::Result<()> {
    let toml_str = toml::to_string_pretty(config).context("Failed to render config")?;
    println!("{toml_str}");
    Ok(())
}

pub fn path() {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
}
