//! `ember parse`: apply the tool-call parser to a reply read from stdin.

use ember_agent::protocol;
use ember_config::AppConfig;
use serde_json::json;

use super::read_stdin;

pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let input = read_stdin().await?;
    let markers = &config.segmenter;
    let (reasoning, text) = protocol::split_reasoning(&input, &markers.think_open, &markers.think_close);
    let parsed = protocol::parse(&text);

    let report = json!({
        "reasoning": reasoning,
        "requests": parsed.requests,
        "visible_text": parsed.visible_text,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
