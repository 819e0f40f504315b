//! Show or write the configuration file.

use projector_common::config::{config_file_path, AppConfig};

pub fn run(config: &AppConfig, init: bool) -> anyhow::Result<()> {
    if init {
        let path = config.save()?;
        println!("Configuration written to {}", path.display());
        return Ok(());
    }

    let path = config_file_path();
    let source = if path.exists() { "file" } else { "defaults" };
    println!("# {} ({source})", path.display());
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
