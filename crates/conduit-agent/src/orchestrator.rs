//! The per-turn response pipeline.
//!
//! [`Orchestrator::converse`] consumes one streamed model response and turns
//! it into an ordered stream of [`TurnOutput`] items: user-facing text as it
//! arrives, and one [`ToolResult`] per tool call as each dispatch resolves.
//!
//! Tool calls reach the pipeline two ways:
//! - structured fragments, merged by the [`DeltaAccumulator`] and flushed
//!   when the run of fragments ends;
//! - JSON objects written into the text, found by the [`JsonExtractor`] when
//!   embedded detection is enabled.
//!
//! Dispatches run concurrently with stream consumption. Dropping the stream
//! or cancelling its token drops every outstanding dispatch.

use std::pin::Pin;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{Stream, StreamExt};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::accumulator::DeltaAccumulator;
use crate::catalog::Catalog;
use crate::extractor::{JsonExtractor, Segment};
use crate::invoker::ToolInvoker;
use crate::schema::{NativeCall, from_generic};
use crate::types::{
    CallChannel, MalformedCall, ModelEvent, ToolCallRecord, ToolErrorKind, ToolResult, TurnOutput,
};

/// Stream of turn output items.
pub type TurnStream = Pin<Box<dyn Stream<Item = TurnOutput> + Send + 'static>>;

/// Fields naming the tool in an embedded call, in priority order.
const NAME_FIELDS: [&str; 2] = ["tool", "name"];

/// Fields carrying an embedded call's arguments, in priority order.
const ARGUMENT_FIELDS: [&str; 3] = ["arguments", "args", "input"];

/// Fields naming the provider an embedded call is meant for.
const SERVER_FIELDS: [&str; 2] = ["mcp_server", "server"];

/// Fields excluded when the remaining fields are used as arguments.
const ROUTING_FIELDS: [&str; 4] = ["tool", "name", "mcp_server", "server"];

/// Drives model responses through tool resolution and dispatch.
#[derive(Clone)]
pub struct Orchestrator {
    invoker: Arc<dyn ToolInvoker>,
    embedded_json: bool,
}

impl Orchestrator {
    /// Create an orchestrator that dispatches through `invoker`.
    pub fn new(invoker: Arc<dyn ToolInvoker>) -> Self {
        Self {
            invoker,
            embedded_json: false,
        }
    }

    /// Enable detection of tool calls written as JSON in the text.
    pub fn with_embedded_json(mut self, enabled: bool) -> Self {
        self.embedded_json = enabled;
        self
    }

    /// Whether embedded detection is enabled.
    pub fn embedded_json(&self) -> bool {
        self.embedded_json
    }

    /// Process one model response.
    pub fn converse<S>(&self, events: S, catalog: Arc<Catalog>) -> TurnStream
    where
        S: Stream<Item = ModelEvent> + Send + 'static,
    {
        self.converse_with_cancellation(events, catalog, CancellationToken::new())
    }

    /// Process one model response until it ends or `cancellation` fires.
    pub fn converse_with_cancellation<S>(
        &self,
        events: S,
        catalog: Arc<Catalog>,
        cancellation: CancellationToken,
    ) -> TurnStream
    where
        S: Stream<Item = ModelEvent> + Send + 'static,
    {
        let state = TurnState::new(
            Arc::clone(&self.invoker),
            catalog,
            self.embedded_json,
            cancellation,
        );

        Box::pin(async_stream::stream! {
            let mut state = state;
            let mut events = Box::pin(events);
            let mut events_done = false;

            loop {
                if events_done && state.pending.is_empty() {
                    break;
                }

                let step = tokio::select! {
                    biased;
                    _ = state.cancellation.cancelled() => Step::Cancelled,
                    Some(result) = state.pending.next(), if !state.pending.is_empty() => {
                        Step::Resolved(result)
                    }
                    event = events.next(), if !events_done => Step::Event(event),
                };

                match step {
                    Step::Cancelled => {
                        tracing::debug!(pending = state.pending.len(), "turn cancelled");
                        break;
                    }
                    Step::Resolved(result) => {
                        yield TurnOutput::ToolResult(result);
                    }
                    Step::Event(Some(event)) => {
                        for output in state.on_event(event) {
                            yield output;
                        }
                    }
                    Step::Event(None) => {
                        events_done = true;
                        for output in state.finish() {
                            yield output;
                        }
                    }
                }
            }
        })
    }

    /// Resolve and run a single call outside of a model response.
    pub async fn call_tool(
        &self,
        catalog: &Catalog,
        name: &str,
        arguments: Map<String, Value>,
    ) -> ToolResult {
        let record = ToolCallRecord {
            id: generated_id(),
            name: name.to_string(),
            arguments,
            channel: CallChannel::ExplicitDelta,
        };
        match resolve(&record, catalog) {
            Ok(call) => dispatch(Arc::clone(&self.invoker), record, call).await,
            Err(result) => result,
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("embedded_json", &self.embedded_json)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Turn State
// ─────────────────────────────────────────────────────────────────────────────

enum Step {
    Cancelled,
    Resolved(ToolResult),
    Event(Option<ModelEvent>),
}

/// Everything one turn owns. Dropped with the stream.
struct TurnState {
    invoker: Arc<dyn ToolInvoker>,
    catalog: Arc<Catalog>,
    accumulator: DeltaAccumulator,
    extractor: Option<JsonExtractor>,
    pending: FuturesUnordered<BoxFuture<'static, ToolResult>>,
    cancellation: CancellationToken,
}

impl TurnState {
    fn new(
        invoker: Arc<dyn ToolInvoker>,
        catalog: Arc<Catalog>,
        embedded_json: bool,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            invoker,
            catalog,
            accumulator: DeltaAccumulator::new(),
            extractor: embedded_json.then(JsonExtractor::new),
            pending: FuturesUnordered::new(),
            cancellation,
        }
    }

    fn on_event(&mut self, event: ModelEvent) -> Vec<TurnOutput> {
        match event {
            ModelEvent::ToolCallDelta(fragment) => {
                self.accumulator.push(fragment);
                Vec::new()
            }
            ModelEvent::Content(text) => {
                let mut out = self.flush_deltas();
                if text.is_empty() {
                    return out;
                }
                match self.extractor.as_mut() {
                    Some(extractor) => {
                        extractor.push(&text);
                        let segments = extractor.take_segments();
                        self.route_segments(segments, &mut out);
                    }
                    None => out.push(TurnOutput::Text(text)),
                }
                out
            }
        }
    }

    fn finish(&mut self) -> Vec<TurnOutput> {
        let mut out = self.flush_deltas();
        if let Some(extractor) = self.extractor.as_mut() {
            extractor.finish();
            let segments = extractor.take_segments();
            self.route_segments(segments, &mut out);
        }
        tracing::debug!(pending = self.pending.len(), "model stream ended");
        out
    }

    fn flush_deltas(&mut self) -> Vec<TurnOutput> {
        let mut out = Vec::new();
        for flushed in self.accumulator.flush() {
            match flushed {
                Ok(record) => out.extend(self.submit(record)),
                Err(malformed) => out.push(malformed_output(malformed)),
            }
        }
        out
    }

    /// Plain text passes through; JSON objects that name a tool become calls
    /// and other JSON is passed through as text.
    fn route_segments(&mut self, segments: Vec<Segment>, out: &mut Vec<TurnOutput>) {
        for segment in segments {
            match segment {
                Segment::Text(text) => {
                    if !text.is_empty() {
                        out.push(TurnOutput::Text(text));
                    }
                }
                Segment::Json(found) => match embedded_call(&found.value) {
                    Some(Ok(record)) => {
                        self.check_named_server(&found.value, &record);
                        out.extend(self.submit(record));
                    }
                    Some(Err(malformed)) => out.push(malformed_output(malformed)),
                    None => out.push(TurnOutput::Text(found.raw)),
                },
            }
        }
    }

    /// Calls are routed by tool name. A provider named in the call that is
    /// not the tool's owner only gets a warning.
    fn check_named_server(&self, value: &Value, record: &ToolCallRecord) {
        let Some(named) = named_server(value) else {
            return;
        };
        if let Some(entry) = self.catalog.get(&record.name)
            && entry.provider() != named
        {
            tracing::warn!(
                call_id = %record.id,
                tool = %record.name,
                named_server = %named,
                server = %entry.provider(),
                "embedded call names a different server than the tool's owner"
            );
        }
    }

    /// Queue a dispatch, or return the failure if the call cannot be
    /// resolved.
    fn submit(&mut self, record: ToolCallRecord) -> Option<TurnOutput> {
        match resolve(&record, &self.catalog) {
            Ok(call) => {
                tracing::debug!(
                    call_id = %record.id,
                    tool = %record.name,
                    server = %call.provider,
                    channel = ?record.channel,
                    "dispatching tool call"
                );
                let invoker = Arc::clone(&self.invoker);
                self.pending.push(Box::pin(dispatch(invoker, record, call)));
                None
            }
            Err(result) => Some(TurnOutput::ToolResult(result)),
        }
    }
}

fn resolve(record: &ToolCallRecord, catalog: &Catalog) -> Result<NativeCall, ToolResult> {
    from_generic(record, catalog).map_err(|e| {
        tracing::warn!(call_id = %record.id, tool = %record.name, "model requested an unknown tool");
        ToolResult::failure(
            &record.id,
            &record.name,
            ToolErrorKind::InvocationFailed,
            e.to_string(),
        )
    })
}

async fn dispatch(
    invoker: Arc<dyn ToolInvoker>,
    record: ToolCallRecord,
    call: NativeCall,
) -> ToolResult {
    match invoker.invoke(&call.provider, call.invocation).await {
        Ok(result) => {
            let result = ToolResult::from_call_result(record.id, record.name, &result);
            if !result.is_success() {
                tracing::warn!(call_id = %result.call_id, tool = %result.tool, "tool reported an error");
            }
            result
        }
        Err(e) => ToolResult::failure(
            record.id,
            record.name,
            ToolErrorKind::InvocationFailed,
            e.to_string(),
        ),
    }
}

fn malformed_output(malformed: MalformedCall) -> TurnOutput {
    tracing::warn!(call_id = %malformed.id, reason = %malformed.reason, "malformed tool call");
    TurnOutput::ToolResult(ToolResult::malformed(malformed))
}

fn named_server(value: &Value) -> Option<&str> {
    SERVER_FIELDS
        .iter()
        .filter_map(|field| value.get(*field).and_then(Value::as_str))
        .map(str::trim)
        .find(|name| !name.is_empty())
}

fn generated_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}

/// Interpret an embedded JSON object as a tool call.
///
/// `None` means the object names no tool and is ordinary JSON.
fn embedded_call(value: &Value) -> Option<Result<ToolCallRecord, MalformedCall>> {
    let object = value.as_object()?;
    let name = NAME_FIELDS
        .iter()
        .filter_map(|field| object.get(*field).and_then(Value::as_str))
        .find(|name| !name.trim().is_empty())?
        .trim()
        .to_string();
    let id = generated_id();

    let arguments = match ARGUMENT_FIELDS.iter().find_map(|field| object.get(*field)) {
        Some(Value::Object(map)) => map.clone(),
        Some(Value::Null) => Map::new(),
        Some(Value::String(raw)) if raw.trim().is_empty() => Map::new(),
        Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => map,
            _ => {
                return Some(Err(MalformedCall {
                    id,
                    name: Some(name),
                    reason: "embedded arguments are not a JSON object".into(),
                }));
            }
        },
        Some(_) => {
            return Some(Err(MalformedCall {
                id,
                name: Some(name),
                reason: "embedded arguments are not a JSON object".into(),
            }));
        }
        None => object
            .iter()
            .filter(|(key, _)| !ROUTING_FIELDS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
    };

    Some(Ok(ToolCallRecord {
        id,
        name,
        arguments,
        channel: CallChannel::EmbeddedText,
    }))
}
