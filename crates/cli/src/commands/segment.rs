//! `ember segment`: replay stdin as a stream and print segmenter events.

use anyhow::ensure;
use ember_agent::{Markers, StreamEvent, StreamSegmenter};
use ember_config::AppConfig;

use super::read_stdin;

pub async fn run(config: AppConfig, chunk: usize) -> anyhow::Result<()> {
    ensure!(chunk > 0, "--chunk must be at least 1");
    let input = read_stdin().await?;

    let mut segmenter = StreamSegmenter::new(Markers::from(&config.segmenter));
    for fragment in fragments(&input, chunk) {
        print_events(segmenter.push(fragment))?;
    }
    print_events(segmenter.finish(None))
}

fn print_events(events: Vec<StreamEvent>) -> anyhow::Result<()> {
    for event in events {
        println!("{}", serde_json::to_string(&event)?);
    }
    Ok(())
}

/// Split into pieces of about `size` bytes without cutting a character.
fn fragments(text: &str, size: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let mut end = (start + size).min(text.len());
        while !text.is_char_boundary(end) {
            end += 1;
        }
        pieces.push(&text[start..end]);
        start = end;
    }
    pieces
}
