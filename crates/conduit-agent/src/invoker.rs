//! The dispatch seam between the orchestrator and providers.

use async_trait::async_trait;

use conduit_mcp::{CallToolResult, NativeInvocation, SessionManager, SessionResult};

/// Something that can run a native invocation on a named provider.
///
/// [`SessionManager`] is the production implementation; tests substitute
/// in-process fakes.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Run `invocation` on `provider`.
    async fn invoke(
        &self,
        provider: &str,
        invocation: NativeInvocation,
    ) -> SessionResult<CallToolResult>;
}

#[async_trait]
impl ToolInvoker for SessionManager {
    async fn invoke(
        &self,
        provider: &str,
        invocation: NativeInvocation,
    ) -> SessionResult<CallToolResult> {
        SessionManager::invoke(self, provider, invocation).await
    }
}
