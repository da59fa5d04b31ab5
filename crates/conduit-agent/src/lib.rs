//! Tool-call orchestration for Conduit.
//!
//! This crate sits between a streaming model response and the providers
//! managed by [`conduit_mcp::SessionManager`]:
//!
//! - [`Catalog`]: one flat namespace of tools built from every provider, with
//!   renderings for OpenAI, Claude and prompt-mode models
//! - [`schema`]: translation between provider JSON Schema and the generic
//!   [`ParameterSchema`] tree, and back to native invocations
//! - [`DeltaAccumulator`]: reassembles streamed tool-call fragments
//! - [`JsonExtractor`]: finds JSON objects embedded in streamed text
//! - [`Orchestrator`]: drives one model response to an ordered stream of text
//!   and tool results
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use conduit_agent::{Catalog, Orchestrator};
//! use conduit_mcp::SessionManager;
//!
//! let manager = Arc::new(SessionManager::new(descriptors));
//! let (catalog, _report) = Catalog::discover(&manager).await?;
//! let orchestrator = Orchestrator::new(manager.clone());
//!
//! let mut turn = orchestrator.converse(model_events, Arc::new(catalog));
//! while let Some(output) = turn.next().await {
//!     println!("{output:?}");
//! }
//! ```

pub mod accumulator;
pub mod catalog;
pub mod error;
pub mod extractor;
pub mod invoker;
pub mod orchestrator;
pub mod schema;
pub mod types;

pub use accumulator::{AccumulatorState, DeltaAccumulator};
pub use catalog::{Catalog, CatalogEntry, DiscoveryReport};
pub use error::{AgentError, CatalogError, Result};
pub use extractor::{JsonExtractor, JsonMatch, MAX_CANDIDATE_BYTES, Segment};
pub use invoker::ToolInvoker;
pub use orchestrator::{Orchestrator, TurnStream};
pub use schema::{
    GenericTool, NO_DESCRIPTION, NativeCall, ParameterSchema, SchemaKind, from_generic, to_generic,
};
pub use types::{
    CallChannel, MalformedCall, ModelEvent, ToolCallFragment, ToolCallRecord, ToolErrorKind,
    ToolOutcome, ToolResult, TurnOutput,
};
