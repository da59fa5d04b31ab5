//! Capability sets and the provider-neutral tool descriptor.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::protocol::{PromptInfo, ResourceInfo, ToolInfo};

/// Everything one provider exposes.
#[derive(Debug, Clone, Default)]
pub struct CapabilitySet {
    /// Callable tools.
    pub tools: Vec<ToolInfo>,
    /// Readable resources.
    pub resources: Vec<ResourceInfo>,
    /// Prompt templates.
    pub prompts: Vec<PromptInfo>,
}

/// What kind of provider capability a descriptor stands for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ToolKind {
    /// A tool, invoked with `tools/call`.
    Tool,
    /// A prompt template, rendered with `prompts/get`.
    Prompt,
    /// A resource, read with `resources/read`.
    Resource {
        /// Resource URI.
        uri: String,
    },
}

/// One callable capability, tagged with the provider that owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Name exposed to the model.
    pub name: String,
    /// Free-text description.
    pub description: String,
    /// Native JSON Schema for the parameters.
    pub input_schema: Value,
    /// Owning provider.
    pub provider: String,
    /// Capability kind.
    #[serde(flatten)]
    pub kind: ToolKind,
}

impl ToolDescriptor {
    /// Descriptor for a provider tool.
    pub fn from_tool(provider: &str, tool: &ToolInfo) -> Self {
        Self {
            name: tool.name.clone(),
            description: tool.description.clone().unwrap_or_default(),
            input_schema: tool
                .input_schema
                .clone()
                .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
            provider: provider.to_string(),
            kind: ToolKind::Tool,
        }
    }

    /// Descriptor for a prompt template. Every argument is a string.
    pub fn from_prompt(provider: &str, prompt: &PromptInfo) -> Self {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for arg in &prompt.arguments {
            let mut prop = Map::new();
            prop.insert("type".into(), json!("string"));
            if let Some(desc) = &arg.description {
                prop.insert("description".into(), json!(desc));
            }
            properties.insert(arg.name.clone(), Value::Object(prop));
            if arg.required {
                required.push(json!(arg.name));
            }
        }

        Self {
            name: prompt.name.clone(),
            description: prompt.description.clone().unwrap_or_default(),
            input_schema: json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
            provider: provider.to_string(),
            kind: ToolKind::Prompt,
        }
    }

    /// Descriptor for a resource. Resources take no parameters.
    pub fn from_resource(provider: &str, resource: &ResourceInfo) -> Self {
        let description = resource
            .description
            .clone()
            .unwrap_or_else(|| format!("Read the resource at {}", resource.uri));
        Self {
            name: sanitize_name(&resource.name),
            description,
            input_schema: json!({"type": "object", "properties": {}}),
            provider: provider.to_string(),
            kind: ToolKind::Resource {
                uri: resource.uri.clone(),
            },
        }
    }
}

impl CapabilitySet {
    /// Flatten into descriptors owned by `provider`.
    pub fn descriptors(&self, provider: &str) -> Vec<ToolDescriptor> {
        self.tools
            .iter()
            .map(|t| ToolDescriptor::from_tool(provider, t))
            .chain(
                self.prompts
                    .iter()
                    .map(|p| ToolDescriptor::from_prompt(provider, p)),
            )
            .chain(
                self.resources
                    .iter()
                    .map(|r| ToolDescriptor::from_resource(provider, r)),
            )
            .collect()
    }

    /// Total number of capabilities.
    pub fn len(&self) -> usize {
        self.tools.len() + self.resources.len() + self.prompts.len()
    }

    /// Whether the provider exposes nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Function-calling APIs accept `[A-Za-z0-9_-]` in names.
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
