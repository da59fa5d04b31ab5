//! `conduit replay` - feed a recorded model response through the
//! orchestrator.
//!
//! The input is JSON Lines, one model event per line:
//!
//! ```text
//! {"content": "Let me compute. "}
//! {"tool_call_delta": {"index": 0, "name": "calculate_bmi", "arguments": "{\"w\":70,"}}
//! {"tool_call_delta": {"index": 0, "arguments": "\"h\":1.75}"}}
//! ```

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use futures::StreamExt;

use conduit_agent::{ModelEvent, TurnOutput};

use super::Context;

/// Arguments for `conduit replay`.
#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Events file (JSON Lines)
    pub events: PathBuf,

    /// Detect tool calls written as JSON in the text (overrides config)
    #[arg(long)]
    pub embedded_json: bool,
}

/// Run `conduit replay`.
pub async fn run(args: ReplayArgs, ctx: &Context) -> Result<()> {
    let contents = tokio::fs::read_to_string(&args.events)
        .await
        .with_context(|| format!("reading {}", args.events.display()))?;
    let events = parse_events(&contents)?;
    tracing::debug!(event_count = events.len(), "replaying model events");

    let runtime = ctx.start().await?;
    let orchestrator = runtime
        .orchestrator()
        .with_embedded_json(args.embedded_json || runtime.tools.embedded_json);

    let mut turn = orchestrator.converse(futures::stream::iter(events), runtime.catalog.clone());
    while let Some(output) = turn.next().await {
        print_output(&output, ctx.json_output)?;
    }
    if !ctx.json_output {
        println!();
    }

    runtime.shutdown().await;
    Ok(())
}

fn parse_events(contents: &str) -> Result<Vec<ModelEvent>> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).with_context(|| format!("line {}: invalid model event", n + 1))
        })
        .collect()
}

fn print_output(output: &TurnOutput, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(output)?);
        return Ok(());
    }
    match output {
        TurnOutput::Text(text) => print!("{text}"),
        TurnOutput::ToolResult(result) => {
            let status = if result.is_success() { "ok" } else { "error" };
            println!();
            println!("[{} {} {}] {}", result.tool, result.call_id, status, result.content_text());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_agent::ToolCallFragment;

    #[test]
    fn test_parse_events() {
        let events = parse_events(
            r#"{"content": "hi"}

{"tool_call_delta": {"index": 1, "name": "echo"}}
"#,
        )
        .unwrap();
        assert_eq!(
            events,
            vec![
                ModelEvent::content("hi"),
                ModelEvent::ToolCallDelta(ToolCallFragment::new(1).with_name("echo")),
            ]
        );
    }

    #[test]
    fn test_parse_events_reports_line() {
        let err = parse_events("{\"content\": \"ok\"}\nnot json\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
