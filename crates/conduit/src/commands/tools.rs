//! `conduit tools` - start providers and show the tool catalog.

use anyhow::Result;
use clap::{Args, ValueEnum};

use conduit_mcp::ToolKind;

use super::Context;

/// Model API rendering for the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ToolFormat {
    /// OpenAI function-calling definitions
    Openai,
    /// Claude tool definitions
    Claude,
    /// Text listing for prompt-mode models
    Prompt,
}

/// Arguments for `conduit tools`.
#[derive(Args, Debug)]
pub struct ToolsArgs {
    /// Render the catalog for a model API instead of listing it
    #[arg(long, value_enum)]
    pub format: Option<ToolFormat>,
}

/// Run `conduit tools`.
pub async fn run(args: ToolsArgs, ctx: &Context) -> Result<()> {
    let runtime = ctx.start().await?;
    let catalog = &runtime.catalog;

    match args.format {
        Some(ToolFormat::Openai) => {
            println!("{}", serde_json::to_string_pretty(&catalog.openai_tools())?);
        }
        Some(ToolFormat::Claude) => {
            println!("{}", serde_json::to_string_pretty(&catalog.claude_tools())?);
        }
        Some(ToolFormat::Prompt) => println!("{}", catalog.prompt_text()),
        None if ctx.json_output => {
            let descriptors: Vec<_> = catalog.iter().map(|e| &e.descriptor).collect();
            println!("{}", serde_json::to_string_pretty(&descriptors)?);
        }
        None if catalog.is_empty() => println!("No tools available."),
        None => {
            println!("{:<28} {:<20} {:<10} DESCRIPTION", "NAME", "PROVIDER", "KIND");
            println!("{}", "-".repeat(90));
            for entry in catalog.iter() {
                let kind = match entry.descriptor.kind {
                    ToolKind::Tool => "tool",
                    ToolKind::Prompt => "prompt",
                    ToolKind::Resource { .. } => "resource",
                };
                println!(
                    "{:<28} {:<20} {:<10} {}",
                    entry.name(),
                    entry.provider(),
                    kind,
                    first_line(entry.generic.description_or_default())
                );
                if ctx.verbose {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&entry.generic.parameters.to_json_schema())?
                    );
                }
            }
        }
    }

    runtime.shutdown().await;
    Ok(())
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}
