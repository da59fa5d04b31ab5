//! `conduit call` - run one tool from the catalog.

use anyhow::{Result, bail};
use clap::Args;
use serde_json::Value;

use conduit_agent::ToolOutcome;

use super::Context;

/// Arguments for `conduit call`.
#[derive(Args, Debug)]
pub struct CallArgs {
    /// Tool name
    pub tool: String,

    /// Arguments as a JSON object
    #[arg(default_value = "{}")]
    pub arguments: String,
}

/// Run `conduit call`.
pub async fn run(args: CallArgs, ctx: &Context) -> Result<()> {
    let arguments = match serde_json::from_str::<Value>(&args.arguments) {
        Ok(Value::Object(map)) => map,
        Ok(_) => bail!("arguments must be a JSON object"),
        Err(e) => bail!("invalid JSON arguments: {e}"),
    };

    let runtime = ctx.start().await?;
    let result = runtime
        .orchestrator()
        .call_tool(&runtime.catalog, &args.tool, arguments)
        .await;
    runtime.shutdown().await;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    match &result.outcome {
        ToolOutcome::Success { content } => {
            println!("{content}");
            Ok(())
        }
        ToolOutcome::Failure { .. } => bail!(result.content_text()),
    }
}
