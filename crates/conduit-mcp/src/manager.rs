//! Session manager for many providers.
//!
//! The [`SessionManager`] owns one slot per configured provider. A slot is
//! started lazily on the first [`acquire`](SessionManager::acquire), lent out
//! as an `Arc<ProviderSession>`, and restarted on the next acquire after it
//! degrades. Nothing polls in the background; a provider that died on its
//! own is noticed the next time someone asks for it.
//!
//! # Example
//!
//! ```rust,ignore
//! use conduit_mcp::{ProviderDescriptor, SessionManager};
//!
//! let manager = SessionManager::new([
//!     ProviderDescriptor::new("bmi", "python3").with_arg("bmi_server.py"),
//! ]);
//!
//! let tools = manager.list_capabilities("bmi").await?;
//! let result = manager
//!     .call_tool("bmi", "calculate_bmi", json!({"weight_kg": 70, "height_m": 1.75}))
//!     .await?;
//! println!("{:?}", result.text());
//!
//! manager.shutdown_all().await;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;

use crate::capability::{CapabilitySet, ToolDescriptor};
use crate::client::{McpClient, ProviderDescriptor};
use crate::error::{McpError, SessionError, SessionResult};
use crate::protocol::{CallToolResult, NativeInvocation};

/// Health of a provider slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// Spawn and handshake in progress.
    Starting,
    /// Handshake done, capabilities cached.
    Ready,
    /// An I/O failure or timeout was observed; restarted on next acquire.
    Degraded,
    /// Failed to start, or shut down. A later acquire starts fresh.
    Terminated,
}

/// A live, initialized provider.
pub struct ProviderSession {
    client: McpClient,
    capabilities: CapabilitySet,
    descriptors: Vec<ToolDescriptor>,
    health: RwLock<HealthState>,
}

impl ProviderSession {
    /// Provider name.
    pub fn name(&self) -> &str {
        self.client.name()
    }

    /// The underlying client.
    pub fn client(&self) -> &McpClient {
        &self.client
    }

    /// Capabilities negotiated at startup.
    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// Cached descriptors for every capability.
    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.descriptors
    }

    /// Current health.
    pub fn health(&self) -> HealthState {
        *self.health.read()
    }

    /// Mark this session as needing a restart.
    pub fn mark_degraded(&self) {
        let mut health = self.health.write();
        if *health == HealthState::Ready {
            tracing::warn!(server = %self.name(), "provider session degraded");
            *health = HealthState::Degraded;
        }
    }

    /// Whether the session can serve requests right now.
    async fn is_usable(&self) -> bool {
        if self.health() != HealthState::Ready {
            return false;
        }
        if !self.client.is_connected().await {
            tracing::warn!(server = %self.name(), "provider process exited");
            self.mark_degraded();
            return false;
        }
        true
    }

    async fn terminate(&self) {
        *self.health.write() = HealthState::Terminated;
        if let Err(e) = self.client.shutdown().await {
            tracing::debug!(server = %self.name(), error = %e, "error during provider shutdown");
        }
    }
}

impl std::fmt::Debug for ProviderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSession")
            .field("name", &self.name())
            .field("health", &self.health())
            .field("capabilities", &self.capabilities.len())
            .finish()
    }
}

#[derive(Clone)]
enum SlotState {
    Vacant,
    Starting,
    Live(Arc<ProviderSession>),
    Terminated,
}

struct SessionSlot {
    descriptor: ProviderDescriptor,
    /// Held across start so concurrent acquires spawn one process.
    gate: tokio::sync::Mutex<()>,
    state: RwLock<SlotState>,
}

impl SessionSlot {
    fn live(&self) -> Option<Arc<ProviderSession>> {
        match &*self.state.read() {
            SlotState::Live(session) => Some(Arc::clone(session)),
            _ => None,
        }
    }
}

/// Owner of every provider session.
pub struct SessionManager {
    slots: HashMap<String, SessionSlot>,
}

impl SessionManager {
    /// Create a manager for the given providers. Nothing is started yet.
    pub fn new(descriptors: impl IntoIterator<Item = ProviderDescriptor>) -> Self {
        let mut slots = HashMap::new();
        for descriptor in descriptors {
            let name = descriptor.name.clone();
            if slots.contains_key(&name) {
                tracing::warn!(server = %name, "duplicate provider descriptor ignored");
                continue;
            }
            tracing::debug!(server = %name, "registering provider");
            slots.insert(
                name,
                SessionSlot {
                    descriptor,
                    gate: tokio::sync::Mutex::new(()),
                    state: RwLock::new(SlotState::Vacant),
                },
            );
        }
        Self { slots }
    }

    /// Names of every configured provider, sorted.
    pub fn provider_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.slots.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Check if a provider is configured.
    pub fn has_provider(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    /// Get the descriptor for a provider.
    pub fn descriptor(&self, name: &str) -> Option<&ProviderDescriptor> {
        self.slots.get(name).map(|s| &s.descriptor)
    }

    /// Health of a provider slot.
    ///
    /// `None` if the provider is not configured or has never been started.
    pub fn health(&self, name: &str) -> Option<HealthState> {
        match &*self.slots.get(name)?.state.read() {
            SlotState::Vacant => None,
            SlotState::Starting => Some(HealthState::Starting),
            SlotState::Live(session) => Some(session.health()),
            SlotState::Terminated => Some(HealthState::Terminated),
        }
    }

    /// Get a ready session, starting or restarting the provider if needed.
    pub async fn acquire(&self, name: &str) -> SessionResult<Arc<ProviderSession>> {
        let slot = self
            .slots
            .get(name)
            .ok_or_else(|| SessionError::unavailable(name, "not configured"))?;

        if let Some(session) = slot.live()
            && session.is_usable().await
        {
            return Ok(session);
        }

        let _gate = slot.gate.lock().await;

        // Another caller may have finished starting it while we waited.
        if let Some(session) = slot.live() {
            if session.is_usable().await {
                return Ok(session);
            }
            tracing::info!(server = %name, health = ?session.health(), "restarting provider");
            session.terminate().await;
        }

        *slot.state.write() = SlotState::Starting;
        match start_session(&slot.descriptor).await {
            Ok(session) => {
                let session = Arc::new(session);
                *slot.state.write() = SlotState::Live(Arc::clone(&session));
                Ok(session)
            }
            Err(e) => {
                tracing::error!(server = %name, error = %e, "failed to start provider");
                *slot.state.write() = SlotState::Terminated;
                Err(SessionError::unavailable(name, e))
            }
        }
    }

    /// Capability descriptors for one provider, starting it if needed.
    pub async fn list_capabilities(&self, name: &str) -> SessionResult<Vec<ToolDescriptor>> {
        Ok(self.acquire(name).await?.descriptors().to_vec())
    }

    /// Call a tool on one provider.
    pub async fn call_tool(
        &self,
        name: &str,
        tool: &str,
        arguments: Value,
    ) -> SessionResult<CallToolResult> {
        self.invoke(
            name,
            NativeInvocation::CallTool {
                name: tool.to_string(),
                arguments,
            },
        )
        .await
    }

    /// Dispatch a native invocation to one provider.
    ///
    /// A failure that breaks the channel degrades the session so the next
    /// acquire restarts it. A JSON-RPC error reply does not.
    pub async fn invoke(
        &self,
        name: &str,
        invocation: NativeInvocation,
    ) -> SessionResult<CallToolResult> {
        let session = self.acquire(name).await?;
        match session.client().invoke(&invocation).await {
            Ok(result) => Ok(result),
            Err(e) => {
                if e.is_connection_failure() {
                    session.mark_degraded();
                }
                tracing::warn!(
                    server = %name,
                    target = %invocation.target(),
                    error = %e,
                    "provider invocation failed"
                );
                Err(SessionError::invocation(name, invocation.target(), e))
            }
        }
    }

    /// Shut down every live session. Slots become `Terminated`.
    pub async fn shutdown_all(&self) {
        let live = self
            .slots
            .values()
            .filter(|slot| slot.live().is_some())
            .count();
        tracing::info!(server_count = live, "shutting down all providers");

        for slot in self.slots.values() {
            let _gate = slot.gate.lock().await;
            let previous = std::mem::replace(&mut *slot.state.write(), SlotState::Terminated);
            match previous {
                SlotState::Live(session) => session.terminate().await,
                SlotState::Vacant => *slot.state.write() = SlotState::Vacant,
                SlotState::Starting | SlotState::Terminated => {}
            }
        }
    }
}

async fn start_session(descriptor: &ProviderDescriptor) -> Result<ProviderSession, McpError> {
    let mut client = McpClient::connect(descriptor.clone())?;

    let handshake = async {
        client.initialize().await?;
        client.list_capabilities().await
    };
    let capabilities = match handshake.await {
        Ok(capabilities) => capabilities,
        Err(e) => {
            let _ = client.shutdown().await;
            return Err(e);
        }
    };

    let descriptors = capabilities.descriptors(&descriptor.name);
    tracing::info!(
        server = %descriptor.name,
        tools = capabilities.tools.len(),
        resources = capabilities.resources.len(),
        prompts = capabilities.prompts.len(),
        "provider ready"
    );

    Ok(ProviderSession {
        client,
        capabilities,
        descriptors,
        health: RwLock::new(HealthState::Ready),
    })
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let health: HashMap<&str, Option<HealthState>> = self
            .slots
            .keys()
            .map(|name| (name.as_str(), self.health(name)))
            .collect();
        f.debug_struct("SessionManager")
            .field("providers", &health)
            .finish()
    }
}
