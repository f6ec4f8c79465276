// ABOUTME: Local endpoint adapter - how the mirror tells local callers that
// ABOUTME: the tool catalog changed and should be re-fetched.

use async_trait::async_trait;
use tracing::debug;

use crate::mcp::ServerHandle;

/// Fire-and-forget "catalog changed" broadcast to local callers.
#[async_trait]
pub trait ChangeNotifier: Send + Sync {
    async fn broadcast_changed(&self);
}

#[async_trait]
impl ChangeNotifier for ServerHandle {
    async fn broadcast_changed(&self) {
        if !self.notify_tools_changed() {
            debug!("No initialized client to notify of tool list change");
        }
    }
}
