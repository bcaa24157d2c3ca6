//! `ember call <tool> [args]`: run one tool outside the agent loop.

use anyhow::{Context, bail};
use ember_config::AppConfig;
use serde_json::Value;

use super::bootstrap;

pub async fn run(config: AppConfig, tool: &str, args: &str) -> anyhow::Result<()> {
    let arguments = match serde_json::from_str::<Value>(args).context("Arguments must be valid JSON")? {
        Value::Object(map) => map,
        other => bail!("Arguments must be a JSON object, got {other}"),
    };

    let runtime = bootstrap(config).await;
    let output = runtime
        .registry
        .execute(tool, arguments)
        .await
        .with_context(|| format!("Tool '{tool}' failed"))?;
    println!("{output}");
    Ok(())
}
