//! `ember prompt`: show exactly what the model would be told about tools.

use ember_agent::protocol;
use ember_config::AppConfig;

use super::bootstrap;

pub async fn run(config: AppConfig, system: Option<String>) -> anyhow::Result<()> {
    let runtime = bootstrap(config).await;
    let base = system.unwrap_or_else(|| runtime.config.agent.system_prompt.clone());

    if runtime.registry.is_empty() {
        tracing::warn!("No tools loaded; printing the base prompt unchanged");
        println!("{base}");
    } else {
        println!("{}", protocol::inject(&base, &runtime.registry));
    }
    Ok(())
}
