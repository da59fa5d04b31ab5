//! The unified tool catalog.
//!
//! One flat namespace of tools across every provider. The catalog is built
//! once, is immutable afterwards, and is shared between turns as
//! `Arc<Catalog>`.

use std::collections::HashMap;

use serde_json::Value;

use conduit_mcp::{SessionError, SessionManager, ToolDescriptor};

use crate::error::CatalogError;
use crate::schema::{GenericTool, NO_DESCRIPTION, to_generic};

/// One catalog entry: the provider's descriptor and its generic form.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    /// Descriptor as reported by the provider.
    pub descriptor: ToolDescriptor,
    /// Provider-neutral translation.
    pub generic: GenericTool,
}

impl CatalogEntry {
    /// Tool name.
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Owning provider.
    pub fn provider(&self) -> &str {
        &self.descriptor.provider
    }
}

/// Outcome of starting providers during [`Catalog::discover`].
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    /// Providers whose capabilities made it into the catalog.
    pub ready: Vec<String>,
    /// Providers that failed to start, with the reason.
    pub failed: Vec<(String, SessionError)>,
}

/// Immutable tool catalog.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    index: HashMap<String, usize>,
}

impl Catalog {
    /// Build a catalog from `(provider, descriptors)` groups.
    ///
    /// Descriptors are re-tagged with their group's provider. Any name
    /// exposed twice fails the whole build.
    pub fn build(
        groups: impl IntoIterator<Item = (String, Vec<ToolDescriptor>)>,
    ) -> Result<Self, CatalogError> {
        let mut catalog = Self::default();
        for (provider, descriptors) in groups {
            for mut descriptor in descriptors {
                descriptor.provider = provider.clone();
                if let Some(&existing) = catalog.index.get(&descriptor.name) {
                    return Err(CatalogError::DuplicateTool {
                        name: descriptor.name,
                        first: catalog.entries[existing].descriptor.provider.clone(),
                        second: provider,
                    });
                }
                let generic = to_generic(&descriptor);
                catalog
                    .index
                    .insert(descriptor.name.clone(), catalog.entries.len());
                catalog.entries.push(CatalogEntry {
                    descriptor,
                    generic,
                });
            }
        }
        Ok(catalog)
    }

    /// Start every configured provider and build a catalog from what they
    /// expose.
    ///
    /// Providers that fail to start are skipped and listed in the report.
    /// Name collisions still fail the build.
    pub async fn discover(
        manager: &SessionManager,
    ) -> Result<(Self, DiscoveryReport), CatalogError> {
        let names = manager.provider_names();
        let listed = futures::future::join_all(names.iter().map(|name| async move {
            (name.to_string(), manager.list_capabilities(name).await)
        }))
        .await;

        let mut report = DiscoveryReport::default();
        let mut groups = Vec::with_capacity(listed.len());
        for (name, result) in listed {
            match result {
                Ok(descriptors) => {
                    report.ready.push(name.clone());
                    groups.push((name, descriptors));
                }
                Err(e) => {
                    tracing::error!(server = %name, error = %e, "skipping provider");
                    report.failed.push((name, e));
                }
            }
        }

        let catalog = Self::build(groups)?;
        tracing::info!(
            tool_count = catalog.len(),
            server_count = report.ready.len(),
            failed_count = report.failed.len(),
            "tool catalog built"
        );
        Ok((catalog, report))
    }

    /// Look up an entry by tool name.
    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    /// Look up a descriptor by tool name.
    pub fn descriptor(&self, name: &str) -> Option<&ToolDescriptor> {
        self.get(name).map(|entry| &entry.descriptor)
    }

    /// Whether the catalog has a tool.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Entries in build order.
    pub fn iter(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter()
    }

    /// Number of tools.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tool definitions for OpenAI-style function calling.
    pub fn openai_tools(&self) -> Vec<Value> {
        self.entries.iter().map(|e| e.generic.to_openai()).collect()
    }

    /// Tool definitions for Claude-style tool use.
    pub fn claude_tools(&self) -> Vec<Value> {
        self.entries.iter().map(|e| e.generic.to_claude()).collect()
    }

    /// Human-readable listing for models that call tools by writing JSON
    /// into their text.
    ///
    /// ```text
    /// Server: health
    ///     Tools:
    ///         calculate_bmi:
    ///             Description: Calculate body mass index
    ///             Parameters:
    ///                 height_m:
    ///                     Type: number
    ///                     Description: Height in meters
    ///             Required: height_m
    /// ```
    pub fn prompt_text(&self) -> String {
        let mut providers: Vec<(&str, Vec<&CatalogEntry>)> = Vec::new();
        for entry in &self.entries {
            match providers.iter_mut().find(|(p, _)| *p == entry.provider()) {
                Some((_, entries)) => entries.push(entry),
                None => providers.push((entry.provider(), vec![entry])),
            }
        }

        providers
            .iter()
            .map(|(provider, entries)| render_provider(provider, entries))
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }
}

fn render_provider(provider: &str, entries: &[&CatalogEntry]) -> String {
    let mut out = format!("Server: {provider}\n    Tools:\n");
    for entry in entries {
        let tool = &entry.generic;
        out.push_str(&format!("        {}:\n", tool.name));
        out.push_str(&format!(
            "            Description: {}\n",
            tool.description_or_default()
        ));

        if let Some(properties) = tool.parameters.properties()
            && !properties.is_empty()
        {
            out.push_str("            Parameters:\n");
            for (name, param) in properties {
                out.push_str(&format!("                {name}:\n"));
                out.push_str(&format!(
                    "                    Type: {}\n",
                    param.type_name()
                ));
                out.push_str(&format!(
                    "                    Description: {}\n",
                    param.description.as_deref().unwrap_or(NO_DESCRIPTION)
                ));
            }
        }

        let required = tool.parameters.required();
        if !required.is_empty() {
            out.push_str(&format!("            Required: {}\n", required.join(", ")));
        }
    }
    out
}
