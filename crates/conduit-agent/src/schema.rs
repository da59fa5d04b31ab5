//! Provider-neutral tool schemas.
//!
//! Providers describe parameters with arbitrary JSON Schema. Models accept a
//! much smaller subset, so native schemas are narrowed into a recursive
//! [`ParameterSchema`] tree before they are rendered for a model API. Nodes
//! with no generic equivalent (`$schema`, `format`, `additionalProperties`,
//! vendor metadata) are dropped.

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};

use conduit_mcp::{NativeInvocation, ToolDescriptor, ToolKind};

use crate::catalog::Catalog;
use crate::error::{AgentError, Result};
use crate::types::ToolCallRecord;

/// Description used when a tool or parameter has none.
pub const NO_DESCRIPTION: &str = "No description provided.";

// ─────────────────────────────────────────────────────────────────────────────
// Parameter Schema
// ─────────────────────────────────────────────────────────────────────────────

/// One node of a generic parameter schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSchema {
    /// Node type.
    pub kind: SchemaKind,
    /// Node description (falls back to the native `title`).
    pub description: Option<String>,
}

/// Generic schema node types.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaKind {
    /// An object with named properties.
    Object {
        /// Property schemas.
        properties: BTreeMap<String, ParameterSchema>,
        /// Required property names, all present in `properties`.
        required: Vec<String>,
    },
    /// A homogeneous array.
    Array {
        /// Item schema.
        items: Box<ParameterSchema>,
    },
    /// A string.
    String,
    /// A floating-point number.
    Number,
    /// An integer.
    Integer,
    /// A boolean.
    Boolean,
    /// A closed set of literal values.
    Enum {
        /// Allowed values, in native order.
        values: Vec<Value>,
    },
}

impl ParameterSchema {
    /// A string node with no description.
    pub fn string() -> Self {
        Self {
            kind: SchemaKind::String,
            description: None,
        }
    }

    /// An object node with no properties.
    pub fn empty_object() -> Self {
        Self {
            kind: SchemaKind::Object {
                properties: BTreeMap::new(),
                required: Vec::new(),
            },
            description: None,
        }
    }

    /// Translate a native JSON Schema node.
    pub fn from_native(native: &Value) -> Self {
        Self::parse(native, "")
    }

    fn parse(native: &Value, path: &str) -> Self {
        let Some(node) = native.as_object() else {
            return Self::string();
        };

        let description = node
            .get("description")
            .or_else(|| node.get("title"))
            .and_then(Value::as_str)
            .map(str::to_string);

        if let Some(Value::Array(values)) = node.get("enum") {
            return Self {
                kind: SchemaKind::Enum {
                    values: values.clone(),
                },
                description,
            };
        }

        // `Optional[T]` style unions: take the first non-null variant.
        if !node.contains_key("type")
            && let Some(variant) = first_non_null_variant(node)
        {
            let mut schema = Self::parse(variant, path);
            if description.is_some() {
                schema.description = description;
            }
            return schema;
        }

        let kind = match native_type(node) {
            Some("object") => parse_object(node, path),
            Some("array") => {
                let items = match node.get("items") {
                    Some(items) => Self::parse(items, &format!("{path}[]")),
                    None => {
                        tracing::warn!(
                            property = %display_path(path),
                            "array schema has no items, assuming string items"
                        );
                        Self::string()
                    }
                };
                SchemaKind::Array {
                    items: Box::new(items),
                }
            }
            Some("number") => SchemaKind::Number,
            Some("integer") => SchemaKind::Integer,
            Some("boolean") => SchemaKind::Boolean,
            _ => SchemaKind::String,
        };

        Self { kind, description }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Whether this is an object node.
    pub fn is_object(&self) -> bool {
        matches!(self.kind, SchemaKind::Object { .. })
    }

    /// Object properties, if this is an object node.
    pub fn properties(&self) -> Option<&BTreeMap<String, ParameterSchema>> {
        match &self.kind {
            SchemaKind::Object { properties, .. } => Some(properties),
            _ => None,
        }
    }

    /// Required property names. Empty for non-object nodes.
    pub fn required(&self) -> &[String] {
        match &self.kind {
            SchemaKind::Object { required, .. } => required,
            _ => &[],
        }
    }

    /// JSON Schema type name for this node.
    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            SchemaKind::Object { .. } => "object",
            SchemaKind::Array { .. } => "array",
            SchemaKind::String => "string",
            SchemaKind::Number => "number",
            SchemaKind::Integer => "integer",
            SchemaKind::Boolean => "boolean",
            SchemaKind::Enum { values } => enum_type(values).unwrap_or("string"),
        }
    }

    /// Render as JSON Schema.
    pub fn to_json_schema(&self) -> Value {
        self.render(false)
    }

    /// Render as JSON Schema with every object closed
    /// (`additionalProperties: false`).
    pub fn to_closed_json_schema(&self) -> Value {
        self.render(true)
    }

    fn render(&self, closed: bool) -> Value {
        let mut out = Map::new();
        match &self.kind {
            SchemaKind::Object {
                properties,
                required,
            } => {
                out.insert("type".into(), json!("object"));
                let props: Map<String, Value> = properties
                    .iter()
                    .map(|(name, schema)| (name.clone(), schema.render(closed)))
                    .collect();
                out.insert("properties".into(), Value::Object(props));
                out.insert("required".into(), json!(required));
                if closed {
                    out.insert("additionalProperties".into(), json!(false));
                }
            }
            SchemaKind::Array { items } => {
                out.insert("type".into(), json!("array"));
                out.insert("items".into(), items.render(closed));
            }
            SchemaKind::Enum { values } => {
                if let Some(ty) = enum_type(values) {
                    out.insert("type".into(), json!(ty));
                }
                out.insert("enum".into(), Value::Array(values.clone()));
            }
            _ => {
                out.insert("type".into(), json!(self.type_name()));
            }
        }
        if let Some(description) = &self.description {
            out.insert("description".into(), json!(description));
        }
        Value::Object(out)
    }
}

fn parse_object(node: &Map<String, Value>, path: &str) -> SchemaKind {
    let properties: BTreeMap<String, ParameterSchema> = node
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| {
            props
                .iter()
                .map(|(name, prop)| {
                    let child = if path.is_empty() {
                        name.clone()
                    } else {
                        format!("{path}.{name}")
                    };
                    (name.clone(), ParameterSchema::parse(prop, &child))
                })
                .collect()
        })
        .unwrap_or_default();

    let required = node
        .get("required")
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(Value::as_str)
                .filter(|name| properties.contains_key(*name))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    SchemaKind::Object {
        properties,
        required,
    }
}

/// Native type name. A `["string", "null"]` list yields its first non-null
/// entry; an untyped node is inferred from `properties` or `items`.
fn native_type(node: &Map<String, Value>) -> Option<&str> {
    match node.get("type") {
        Some(Value::String(ty)) => Some(ty.as_str()),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .find(|ty| *ty != "null"),
        _ if node.contains_key("properties") => Some("object"),
        _ if node.contains_key("items") => Some("array"),
        _ => None,
    }
}

fn first_non_null_variant(node: &Map<String, Value>) -> Option<&Value> {
    ["anyOf", "oneOf"]
        .iter()
        .filter_map(|key| node.get(*key).and_then(Value::as_array))
        .flatten()
        .find(|variant| variant.get("type").and_then(Value::as_str) != Some("null"))
}

fn enum_type(values: &[Value]) -> Option<&'static str> {
    if values.is_empty() {
        None
    } else if values.iter().all(Value::is_string) {
        Some("string")
    } else if values.iter().all(|v| v.is_i64() || v.is_u64()) {
        Some("integer")
    } else if values.iter().all(Value::is_number) {
        Some("number")
    } else if values.iter().all(Value::is_boolean) {
        Some("boolean")
    } else {
        None
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() { "<root>" } else { path }
}

// ─────────────────────────────────────────────────────────────────────────────
// Generic Tool
// ─────────────────────────────────────────────────────────────────────────────

/// A tool in provider-neutral form.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericTool {
    /// Tool name.
    pub name: String,
    /// Free-text description (may be empty).
    pub description: String,
    /// Parameter schema. Always an object node.
    pub parameters: ParameterSchema,
}

impl GenericTool {
    /// The description, or [`NO_DESCRIPTION`] when empty.
    pub fn description_or_default(&self) -> &str {
        if self.description.trim().is_empty() {
            NO_DESCRIPTION
        } else {
            &self.description
        }
    }

    /// OpenAI function-calling tool definition.
    pub fn to_openai(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description_or_default(),
                "parameters": self.parameters.to_closed_json_schema(),
            }
        })
    }

    /// Claude tool definition.
    pub fn to_claude(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description_or_default(),
            "input_schema": self.parameters.to_json_schema(),
        })
    }
}

/// Translate a provider descriptor into generic form.
pub fn to_generic(descriptor: &ToolDescriptor) -> GenericTool {
    let mut parameters = ParameterSchema::from_native(&descriptor.input_schema);
    if !parameters.is_object() {
        tracing::warn!(
            tool = %descriptor.name,
            server = %descriptor.provider,
            "tool parameters are not an object schema, ignoring them"
        );
        parameters = ParameterSchema::empty_object();
    }
    // A top-level description would duplicate the tool description.
    parameters.description = None;

    GenericTool {
        name: descriptor.name.clone(),
        description: descriptor.description.clone(),
        parameters,
    }
}

/// A resolved call, ready for the session manager.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeCall {
    /// Provider that owns the tool.
    pub provider: String,
    /// Provider-native invocation.
    pub invocation: NativeInvocation,
}

/// Translate a generic call back into the owning provider's native form.
///
/// Arguments pass through unchanged for tools. Prompt arguments are sent as
/// strings; resources take none.
pub fn from_generic(record: &ToolCallRecord, catalog: &Catalog) -> Result<NativeCall> {
    let descriptor = catalog
        .descriptor(&record.name)
        .ok_or_else(|| AgentError::UnknownTool(record.name.clone()))?;

    let invocation = match &descriptor.kind {
        ToolKind::Tool => NativeInvocation::CallTool {
            name: descriptor.name.clone(),
            arguments: Value::Object(record.arguments.clone()),
        },
        ToolKind::Prompt => NativeInvocation::GetPrompt {
            name: descriptor.name.clone(),
            arguments: record
                .arguments
                .iter()
                .map(|(key, value)| {
                    let value = match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (key.clone(), value)
                })
                .collect(),
        },
        ToolKind::Resource { uri } => NativeInvocation::ReadResource { uri: uri.clone() },
    };

    Ok(NativeCall {
        provider: descriptor.provider.clone(),
        invocation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CallChannel;
    use conduit_mcp::ToolInfo;

    fn bmi_descriptor() -> ToolDescriptor {
        ToolDescriptor::from_tool(
            "health",
            &ToolInfo {
                name: "calculate_bmi".into(),
                description: Some("Calculate body mass index".into()),
                input_schema: Some(json!({
                    "$schema": "http://json-schema.org/draft-07/schema#",
                    "type": "object",
                    "title": "calculate_bmiArguments",
                    "properties": {
                        "weight_kg": {"type": "number", "title": "Weight Kg"},
                        "height_m": {
                            "type": "number",
                            "title": "Height M",
                            "description": "Height in meters",
                            "format": "float"
                        }
                    },
                    "required": ["weight_kg", "height_m"],
                    "additionalProperties": false
                })),
            },
        )
    }

    fn record(name: &str, arguments: Value) -> ToolCallRecord {
        ToolCallRecord {
            id: "call_0".into(),
            name: name.into(),
            arguments: arguments.as_object().cloned().unwrap_or_default(),
            channel: CallChannel::ExplicitDelta,
        }
    }

    #[test]
    fn test_to_generic_drops_unsupported_nodes() {
        let tool = to_generic(&bmi_descriptor());
        assert_eq!(tool.name, "calculate_bmi");

        let schema = tool.parameters.to_json_schema();
        assert!(schema.get("$schema").is_none());
        assert!(schema.get("additionalProperties").is_none());
        assert!(schema.get("description").is_none());
        assert_eq!(schema["required"], json!(["weight_kg", "height_m"]));

        let height = &schema["properties"]["height_m"];
        assert_eq!(height["type"], "number");
        assert_eq!(height["description"], "Height in meters");
        assert!(height.get("format").is_none());
        assert!(height.get("title").is_none());
    }

    #[test]
    fn test_title_used_when_description_missing() {
        let tool = to_generic(&bmi_descriptor());
        let props = tool.parameters.properties().unwrap();
        assert_eq!(props["weight_kg"].description.as_deref(), Some("Weight Kg"));
    }

    #[test]
    fn test_untyped_property_is_string() {
        let schema = ParameterSchema::from_native(&json!({
            "type": "object",
            "properties": {"query": {"description": "Search text"}}
        }));
        let props = schema.properties().unwrap();
        assert_eq!(props["query"].kind, SchemaKind::String);
    }

    #[test]
    fn test_array_without_items_gets_string_items() {
        let schema = ParameterSchema::from_native(&json!({"type": "array"}));
        match schema.kind {
            SchemaKind::Array { items } => assert_eq!(items.kind, SchemaKind::String),
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn test_enum_preserved() {
        let schema = ParameterSchema::from_native(&json!({
            "type": "string",
            "enum": ["celsius", "fahrenheit"]
        }));
        assert_eq!(schema.type_name(), "string");
        assert_eq!(
            schema.to_json_schema(),
            json!({"type": "string", "enum": ["celsius", "fahrenheit"]})
        );
    }

    #[test]
    fn test_nested_objects_and_arrays() {
        let schema = ParameterSchema::from_native(&json!({
            "type": "object",
            "properties": {
                "filters": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {"field": {"type": "string"}, "limit": {"type": "integer"}},
                        "required": ["field", "missing"]
                    }
                }
            }
        }));
        let rendered = schema.to_closed_json_schema();
        let items = &rendered["properties"]["filters"]["items"];
        assert_eq!(items["properties"]["limit"]["type"], "integer");
        assert_eq!(items["required"], json!(["field"]));
        assert_eq!(items["additionalProperties"], false);
    }

    #[test]
    fn test_nullable_types() {
        let schema = ParameterSchema::from_native(&json!({
            "type": "object",
            "properties": {
                "a": {"type": ["integer", "null"]},
                "b": {"anyOf": [{"type": "null"}, {"type": "boolean"}], "description": "flag"}
            }
        }));
        let props = schema.properties().unwrap();
        assert_eq!(props["a"].kind, SchemaKind::Integer);
        assert_eq!(props["b"].kind, SchemaKind::Boolean);
        assert_eq!(props["b"].description.as_deref(), Some("flag"));
    }

    #[test]
    fn test_non_object_parameters_replaced() {
        let mut descriptor = bmi_descriptor();
        descriptor.input_schema = json!({"type": "string"});
        let tool = to_generic(&descriptor);
        assert!(tool.parameters.properties().unwrap().is_empty());
    }

    #[test]
    fn test_openai_rendering() {
        let tool = to_generic(&bmi_descriptor());
        let rendered = tool.to_openai();
        assert_eq!(rendered["type"], "function");
        assert_eq!(rendered["function"]["name"], "calculate_bmi");
        assert_eq!(rendered["function"]["parameters"]["additionalProperties"], false);
    }

    #[test]
    fn test_claude_rendering_defaults_description() {
        let mut descriptor = bmi_descriptor();
        descriptor.description = String::new();
        let rendered = to_generic(&descriptor).to_claude();
        assert_eq!(rendered["description"], NO_DESCRIPTION);
        assert_eq!(rendered["input_schema"]["type"], "object");
    }

    #[test]
    fn test_from_generic_round_trips_arguments() {
        let catalog = Catalog::build(vec![("health".to_string(), vec![bmi_descriptor()])]).unwrap();
        let args = json!({"weight_kg": 70, "height_m": 1.75, "note": {"nested": [1, 2]}});
        let call = from_generic(&record("calculate_bmi", args.clone()), &catalog).unwrap();

        assert_eq!(call.provider, "health");
        assert_eq!(
            call.invocation,
            NativeInvocation::CallTool {
                name: "calculate_bmi".into(),
                arguments: args,
            }
        );
    }

    #[test]
    fn test_from_generic_prompt_and_resource() {
        use conduit_mcp::{PromptInfo, ResourceInfo};

        let prompt: PromptInfo = serde_json::from_value(json!({
            "name": "haiku",
            "arguments": [{"name": "topic", "required": true}, {"name": "lines"}]
        }))
        .unwrap();
        let resource: ResourceInfo = serde_json::from_value(json!({
            "uri": "mem://greeting",
            "name": "greeting"
        }))
        .unwrap();
        let catalog = Catalog::build(vec![(
            "mock".to_string(),
            vec![
                ToolDescriptor::from_prompt("mock", &prompt),
                ToolDescriptor::from_resource("mock", &resource),
            ],
        )])
        .unwrap();

        let call = from_generic(&record("haiku", json!({"topic": "rust", "lines": 3})), &catalog)
            .unwrap();
        match call.invocation {
            NativeInvocation::GetPrompt { name, arguments } => {
                assert_eq!(name, "haiku");
                assert_eq!(arguments["topic"], "rust");
                assert_eq!(arguments["lines"], "3");
            }
            other => panic!("expected prompt, got {other:?}"),
        }

        let call = from_generic(&record("greeting", json!({})), &catalog).unwrap();
        assert_eq!(
            call.invocation,
            NativeInvocation::ReadResource {
                uri: "mem://greeting".into()
            }
        );
    }

    #[test]
    fn test_from_generic_unknown_tool() {
        let catalog = Catalog::default();
        let err = from_generic(&record("missing", json!({})), &catalog).unwrap_err();
        assert!(matches!(err, AgentError::UnknownTool(name) if name == "missing"));
    }
}
