//! `ember tools`: the registry catalog.

use ember_config::AppConfig;

use super::bootstrap;

pub async fn run(config: AppConfig, json: bool) -> anyhow::Result<()> {
    let runtime = bootstrap(config).await;
    let tools = runtime.registry.list_tools();

    if json {
        println!("{}", serde_json::to_string_pretty(&tools)?);
        return Ok(());
    }

    for tool in &tools {
        let owner = runtime.loader.tool_owner(&tool.name).await.unwrap_or_default();
        println!("{:<18} [{owner}] {}", tool.name, tool.description);
    }
    Ok(())
}
