// ABOUTME: Proxy runtime - connects the upstream, runs the initial sync, then
// ABOUTME: serves local stdio while reacting to upstream change and loss events.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::config::ProxyConfig;
use crate::error::{McpError, ProxyError, SyncError};
use crate::mcp::{McpClient, McpClientInfo, McpServer, McpTransport};
use crate::mirror::{Describer, RemoteEndpoint, RemoteEvent, Synchronizer, spawn_sync_worker};
use crate::tool::{Registry, RegistryView};

/// Spawn the upstream bridge and complete its handshake.
///
/// Returns the client plus a stream of the events the mirror cares about.
pub async fn connect_upstream(
    config: &ProxyConfig,
) -> Result<(Arc<McpClient>, mpsc::UnboundedReceiver<RemoteEvent>), ProxyError> {
    let server_config = config.server_config();
    let McpTransport::Stdio { command, args, .. } = &server_config.transport;
    let launch = format!("{} {}", command, args.join(" "));

    let mut client = McpClient::connect(server_config)
        .await
        .map_err(ProxyError::UpstreamUnavailable)?;

    let mut transport_events = client.take_events().await.ok_or_else(|| {
        ProxyError::UpstreamUnavailable(McpError::Connection(
            "Upstream event stream unavailable".into(),
        ))
    })?;

    client
        .initialize(config.client_info())
        .await
        .map_err(ProxyError::UpstreamUnavailable)?;
    info!("Connected to {} ({})", client.name(), launch);

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(event) = transport_events.recv().await {
            if let Some(event) = RemoteEvent::from_transport(event) {
                if tx.send(event).is_err() {
                    break;
                }
            }
        }
    });

    Ok((Arc::new(client), rx))
}

/// A started proxy: the initial mirror is in place, the local endpoint is
/// ready to serve.
pub struct Proxy {
    server: McpServer,
    synchronizer: Arc<Synchronizer>,
}

impl Proxy {
    /// Build the local endpoint and run the initial sync pass.
    ///
    /// Losing the upstream during that pass is `UpstreamConnectionLost`, not
    /// a startup failure.
    pub async fn start(
        remote: Arc<dyn RemoteEndpoint>,
        identity: McpClientInfo,
        describer: Describer,
    ) -> Result<Self, ProxyError> {
        let registry = Registry::new();
        let server = McpServer::new(identity, registry.view());
        let notifier = Arc::new(server.handle());
        let synchronizer = Arc::new(Synchronizer::new(remote, registry, notifier, describer));

        let report = synchronizer.sync().await.map_err(|e| match e {
            // The upstream was connected and then went away mid-pass
            SyncError::Listing(McpError::Closed) => {
                error!("Connection to upstream closed unexpectedly. Exiting.");
                ProxyError::UpstreamConnectionLost
            }
            e => ProxyError::Startup(e),
        })?;
        info!("Mirroring {} upstream tools", report.listed);

        Ok(Self {
            server,
            synchronizer,
        })
    }

    /// Read-only view of the mirrored tools.
    pub fn tools(&self) -> RegistryView {
        self.synchronizer.view()
    }

    /// Serve local requests until the local side closes or the upstream goes
    /// away, whichever comes first.
    pub async fn serve<R, W>(
        self,
        reader: R,
        writer: W,
        mut events: mpsc::UnboundedReceiver<RemoteEvent>,
    ) -> Result<(), ProxyError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (trigger, worker) = spawn_sync_worker(Arc::clone(&self.synchronizer));
        let serving = self.server.serve(reader, writer);
        tokio::pin!(serving);

        let result = loop {
            tokio::select! {
                served = &mut serving => {
                    break match served {
                        Ok(()) => {
                            info!("Client disconnected from proxy");
                            Ok(())
                        }
                        Err(e) => Err(ProxyError::Local(e)),
                    };
                }
                event = events.recv() => match event {
                    Some(RemoteEvent::OperationsChanged) => {
                        debug!("Upstream tool list changed");
                        trigger.request();
                    }
                    Some(RemoteEvent::ConnectionLost) | None => {
                        error!("Connection to upstream closed unexpectedly. Exiting.");
                        break Err(ProxyError::UpstreamConnectionLost);
                    }
                },
            }
        };

        worker.abort();
        result
    }
}

/// Run the proxy over process stdio until it exits.
pub async fn run(config: ProxyConfig) -> Result<(), ProxyError> {
    let (client, events) = connect_upstream(&config).await?;

    let result = match Proxy::start(client.clone(), config.identity(), config.describer()).await {
        Ok(proxy) => {
            proxy
                .serve(tokio::io::stdin(), tokio::io::stdout(), events)
                .await
        }
        Err(e) => Err(e),
    };

    if let Err(e) = client.shutdown().await {
        debug!(error = %e, "Upstream shutdown failed");
    }
    result
}
