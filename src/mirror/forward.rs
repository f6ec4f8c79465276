// ABOUTME: Invocation forwarder - the callback bound to each mirrored tool.
// ABOUTME: Decodes args_json and makes exactly one upstream call.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::RemoteEndpoint;
use super::codec;
use crate::error::InvokeError;
use crate::tool::Invoke;

/// Forwards calls for one tool name to the upstream.
pub struct Forwarder {
    name: String,
    remote: Arc<dyn RemoteEndpoint>,
}

impl Forwarder {
    pub fn new(name: impl Into<String>, remote: Arc<dyn RemoteEndpoint>) -> Self {
        Self {
            name: name.into(),
            remote,
        }
    }
}

#[async_trait]
impl Invoke for Forwarder {
    async fn invoke(&self, raw_args: Option<&str>) -> Result<serde_json::Value, InvokeError> {
        let arguments = codec::decode(raw_args)?;

        info!("Forwarding call to {}", self.name);
        self.remote
            .invoke(&self.name, arguments)
            .await
            .map_err(InvokeError::Upstream)
    }
}
