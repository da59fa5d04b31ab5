//! `conduit providers` - list configured providers without starting them.

use anyhow::Result;
use clap::Args;
use serde_json::json;

use conduit_config::ResolvedProvider;

use super::Context;

/// Arguments for `conduit providers`.
#[derive(Args, Debug)]
pub struct ProvidersArgs {}

/// Run `conduit providers`.
pub async fn run(_args: ProvidersArgs, ctx: &Context) -> Result<()> {
    let (_, resolved) = ctx.resolve()?;

    if ctx.json_output {
        let output: Vec<_> = resolved.providers.iter().map(provider_json).collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "providers": output,
                "skipped": resolved.warnings,
            }))?
        );
        return Ok(());
    }

    if resolved.providers.is_empty() {
        println!("No providers configured.");
    } else {
        println!("{:<20} {:<24} {:<10} {:<40}", "NAME", "GROUP", "TRANSPORT", "TARGET");
        println!("{}", "-".repeat(94));
        for provider in &resolved.providers {
            println!(
                "{:<20} {:<24} {:<10} {:<40}",
                provider.name,
                provider.group.to_string(),
                transport(provider),
                target(provider)
            );
            if ctx.verbose {
                let entry = &provider.entry;
                if !entry.env.is_empty() {
                    let keys: Vec<_> = entry.env.keys().map(String::as_str).collect();
                    println!("{:<20} env: {}", "", keys.join(", "));
                }
                println!("{:<20} timeout: {}s", "", entry.timeout_secs());
            }
        }
    }

    for warning in &resolved.warnings {
        println!("skipped: {warning}");
    }
    Ok(())
}

fn provider_json(provider: &ResolvedProvider) -> serde_json::Value {
    json!({
        "name": provider.name,
        "group": provider.group.to_string(),
        "transport": transport(provider),
        "target": target(provider),
        "timeout_secs": provider.entry.timeout_secs(),
    })
}

fn transport(provider: &ResolvedProvider) -> &'static str {
    if provider.entry.is_http() { "http" } else { "stdio" }
}

fn target(provider: &ResolvedProvider) -> String {
    let entry = &provider.entry;
    if entry.is_http() {
        entry.url.clone().unwrap_or_default()
    } else if entry.args.is_empty() {
        entry.command.clone()
    } else {
        format!("{} {}", entry.command, entry.args.join(" "))
    }
}
