// ABOUTME: Startup configuration - CLI flags with environment fallbacks, read
// ABOUTME: once and turned into the upstream launch settings and local identity.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::warn;

use crate::mcp::{McpClientInfo, McpServerConfig, McpTransport};
use crate::mirror::{DEFAULT_SCHEMA_PREVIEW_LIMIT, Describer};

pub const DEFAULT_REMOTE_URL: &str = "https://rube.app/mcp";
pub const DEFAULT_REMOTE_VERSION: &str = "0.1.29";
pub const DEFAULT_PROXY_NAME: &str = "rube-codex-proxy";

/// Mirror an upstream MCP server's tools over local stdio.
#[derive(Parser, Debug, Clone)]
#[command(name = "rube-proxy", version, about)]
pub struct ProxyConfig {
    /// Upstream MCP endpoint handed to mcp-remote
    #[arg(long, env = "RUBE_REMOTE_URL", default_value = DEFAULT_REMOTE_URL)]
    pub remote_url: String,

    /// Program that launches the upstream bridge
    #[arg(long, env = "RUBE_REMOTE_COMMAND", default_value = "npx")]
    pub remote_command: String,

    /// mcp-remote version used in the default launch arguments
    #[arg(long, env = "RUBE_REMOTE_VERSION", default_value = DEFAULT_REMOTE_VERSION)]
    pub remote_version: String,

    /// Launch arguments: a JSON array of strings, or whitespace-separated words
    #[arg(long, env = "RUBE_REMOTE_ARGS")]
    pub remote_args: Option<String>,

    /// Working directory for the upstream process (defaults to ours)
    #[arg(long, env = "RUBE_REMOTE_CWD")]
    pub remote_cwd: Option<PathBuf>,

    /// Name reported to both sides and used as the log prefix
    #[arg(long, env = "RUBE_PROXY_NAME", default_value = DEFAULT_PROXY_NAME)]
    pub proxy_name: String,

    /// Version reported to both sides
    #[arg(long, env = "RUBE_PROXY_VERSION", default_value = env!("CARGO_PKG_VERSION"))]
    pub proxy_version: String,

    /// Character budget for the schema preview in tool descriptions
    #[arg(long, env = "RUBE_SCHEMA_PREVIEW_LIMIT", default_value_t = DEFAULT_SCHEMA_PREVIEW_LIMIT)]
    pub schema_preview_limit: usize,

    /// Seconds to wait for any single upstream response
    #[arg(long, env = "RUBE_REQUEST_TIMEOUT_SECS", default_value_t = 60)]
    pub request_timeout_secs: u64,

    /// tracing filter directive for diagnostics
    #[arg(long, env = "RUBE_LOG", default_value = "debug")]
    pub log_filter: String,
}

impl ProxyConfig {
    /// Arguments for the upstream bridge process.
    ///
    /// An unset or blank `remote_args` means `-y mcp-remote@<version> <url>`.
    pub fn resolve_remote_args(&self) -> Vec<String> {
        let raw = match self.remote_args.as_deref() {
            Some(raw) if !raw.is_empty() => raw,
            _ => {
                return vec![
                    "-y".to_string(),
                    format!("mcp-remote@{}", self.remote_version),
                    self.remote_url.clone(),
                ];
            }
        };

        parse_launch_args(raw).unwrap_or_else(|e| {
            warn!(
                error = %e,
                "Failed to parse RUBE_REMOTE_ARGS; falling back to whitespace split"
            );
            split_words(raw)
        })
    }

    /// Launch configuration for the upstream client.
    pub fn server_config(&self) -> McpServerConfig {
        McpServerConfig {
            name: "mcp-remote".to_string(),
            transport: McpTransport::Stdio {
                command: self.remote_command.clone(),
                args: self.resolve_remote_args(),
                env: HashMap::new(),
                cwd: self.remote_cwd.clone(),
            },
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    /// Identity the local endpoint presents as `serverInfo`.
    pub fn identity(&self) -> McpClientInfo {
        McpClientInfo {
            name: self.proxy_name.clone(),
            version: self.proxy_version.clone(),
        }
    }

    /// Identity presented to the upstream as `clientInfo`.
    pub fn client_info(&self) -> McpClientInfo {
        McpClientInfo {
            name: format!("{}-remote-client", self.proxy_name),
            version: self.proxy_version.clone(),
        }
    }

    pub fn describer(&self) -> Describer {
        Describer::new(self.schema_preview_limit)
    }
}

/// A JSON array of strings is taken as-is. Any other valid JSON is split on
/// whitespace; only text that is not JSON at all is an error.
fn parse_launch_args(raw: &str) -> Result<Vec<String>, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    Ok(serde_json::from_value::<Vec<String>>(value).unwrap_or_else(|_| split_words(raw)))
}

fn split_words(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(String::from).collect()
}
