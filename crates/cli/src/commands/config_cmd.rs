//! `ember config`: configuration output.

use ember_config::AppConfig;

pub fn run(config: &AppConfig, effective: bool) -> anyhow::Result<()> {
    if effective {
        println!("{}", toml::to_string_pretty(config)?);
    } else {
        println!("{}", AppConfig::default_toml());
    }
    Ok(())
}
