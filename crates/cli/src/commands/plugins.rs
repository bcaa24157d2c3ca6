//! `ember plugins`: load everything that is discoverable and report it.

use ember_config::AppConfig;

use super::bootstrap;

pub async fn run(config: AppConfig, json: bool) -> anyhow::Result<()> {
    let runtime = bootstrap(config).await;
    let plugins = runtime.loader.list_plugins().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&plugins)?);
        return Ok(());
    }

    let stats = runtime.loader.stats().await;
    println!("Ember Plugins");
    println!("=============");
    println!("  Directories:  {}", stats.plugin_dirs.join(", "));
    println!("  Loaded:       {} plugins, {} tools", stats.total_plugins, stats.total_tools);
    println!();

    if plugins.is_empty() {
        println!("  No plugins loaded. Check plugins.dirs in your config.");
    }
    for plugin in &plugins {
        println!("  {} v{}", plugin.name, plugin.version);
        if !plugin.description.is_empty() {
            println!("      {}", plugin.description);
        }
        println!("      tools: {}", plugin.tools.join(", "));
    }
    Ok(())
}
