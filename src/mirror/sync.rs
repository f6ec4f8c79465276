// ABOUTME: Mirror synchronizer - reconciles the upstream catalog into the local
// ABOUTME: registry, one serialized pass at a time, with one broadcast per pass.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{ChangeNotifier, Describer, Forwarder, RemoteEndpoint, RemoteOperation};
use crate::error::SyncError;
use crate::tool::{Registry, RegistryView, ToolDescriptor, ToolState, ToolUpdate};

/// What one reconciliation pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// 1-based sequence number of the pass.
    pub pass: u64,
    /// How many operations the upstream listed.
    pub listed: usize,
    /// Names seen for the first time, in listed order.
    pub registered: Vec<String>,
    /// Names that were disabled and came back.
    pub reactivated: Vec<String>,
    /// Names that went from enabled to disabled.
    pub disabled: Vec<String>,
}

struct MirrorState {
    registry: Registry,
    /// Last-seen input schema per name; keys always match the registry's.
    schemas: HashMap<String, Option<serde_json::Value>>,
    passes: u64,
}

/// Sole writer of the local registry.
///
/// `sync` holds the state lock from listing through broadcast, so passes
/// never interleave even when triggered concurrently.
pub struct Synchronizer {
    remote: Arc<dyn RemoteEndpoint>,
    notifier: Arc<dyn ChangeNotifier>,
    describer: Describer,
    view: RegistryView,
    state: Mutex<MirrorState>,
}

impl Synchronizer {
    pub fn new(
        remote: Arc<dyn RemoteEndpoint>,
        registry: Registry,
        notifier: Arc<dyn ChangeNotifier>,
        describer: Describer,
    ) -> Self {
        let view = registry.view();
        Self {
            remote,
            notifier,
            describer,
            view,
            state: Mutex::new(MirrorState {
                registry,
                schemas: HashMap::new(),
                passes: 0,
            }),
        }
    }

    /// Read-only view of the registry this synchronizer writes.
    pub fn view(&self) -> RegistryView {
        self.view.clone()
    }

    /// Last-seen input schema for a name. The outer `None` means the name was
    /// never listed; the inner one means it was listed without a schema.
    pub async fn cached_schema(&self, name: &str) -> Option<Option<serde_json::Value>> {
        self.state.lock().await.schemas.get(name).cloned()
    }

    /// Run one reconciliation pass.
    ///
    /// On a listing failure nothing changes and nothing is broadcast.
    pub async fn sync(&self) -> Result<SyncReport, SyncError> {
        let mut state = self.state.lock().await;

        let operations = self
            .remote
            .list_operations()
            .await
            .map_err(SyncError::Listing)?;

        let report = self.reconcile(&mut state, &operations).await?;
        self.notifier.broadcast_changed().await;

        debug!(
            pass = report.pass,
            registered = report.registered.len(),
            reactivated = report.reactivated.len(),
            disabled = report.disabled.len(),
            "Synced {} upstream tools",
            report.listed
        );
        Ok(report)
    }

    async fn reconcile(
        &self,
        state: &mut MirrorState,
        operations: &[RemoteOperation],
    ) -> Result<SyncReport, SyncError> {
        let pass = state.passes + 1;
        let mut report = SyncReport {
            pass,
            listed: operations.len(),
            ..Default::default()
        };
        let mut schemas = state.schemas.clone();
        let mut seen = HashSet::new();

        let mut txn = state.registry.begin().await;
        for operation in operations {
            seen.insert(operation.name.as_str());
            schemas.insert(operation.name.clone(), operation.input_schema.clone());
            let description = self.describer.describe(operation);

            match txn.state(&operation.name) {
                None => {
                    let descriptor = ToolDescriptor {
                        name: operation.name.clone(),
                        title: operation
                            .title
                            .clone()
                            .unwrap_or_else(|| operation.name.clone()),
                        description,
                    };
                    let forwarder = Forwarder::new(&operation.name, Arc::clone(&self.remote));
                    txn.register(descriptor, Arc::new(forwarder))?;
                    report.registered.push(operation.name.clone());
                }
                Some(previous) => {
                    txn.update(
                        &operation.name,
                        ToolUpdate {
                            description: Some(description),
                            enabled: Some(true),
                        },
                    )?;
                    if previous == ToolState::Disabled {
                        report.reactivated.push(operation.name.clone());
                    }
                }
            }
        }

        for name in txn.names() {
            if seen.contains(name.as_str()) {
                continue;
            }
            if txn.state(&name) == Some(ToolState::Enabled) {
                report.disabled.push(name.clone());
            }
            txn.update(
                &name,
                ToolUpdate {
                    enabled: Some(false),
                    ..Default::default()
                },
            )?;
        }

        txn.commit().await;
        state.schemas = schemas;
        state.passes = pass;
        Ok(report)
    }
}

/// Requests a reconciliation pass from the sync worker.
#[derive(Clone)]
pub struct SyncTrigger {
    tx: mpsc::UnboundedSender<()>,
}

impl SyncTrigger {
    /// Queue one pass. Returns `false` if the worker has stopped.
    pub fn request(&self) -> bool {
        self.tx.send(()).is_ok()
    }
}

/// Start the single consumer that runs one pass per queued trigger.
///
/// Failed passes are logged and leave the registry as it was.
pub fn spawn_sync_worker(synchronizer: Arc<Synchronizer>) -> (SyncTrigger, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move {
        while rx.recv().await.is_some() {
            if let Err(e) = synchronizer.sync().await {
                warn!(error = %e, "Failed to refresh tool list after remote notification");
            }
        }
    });
    (SyncTrigger { tx }, handle)
}
