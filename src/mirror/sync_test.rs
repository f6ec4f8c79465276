// ABOUTME: Tests for the mirror synchronizer - reconciliation, atomic failure
// ABOUTME: handling, pass serialization, and broadcast ordering.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::oneshot;

use super::*;
use crate::error::{McpError, SyncError};
use crate::tool::{Dispatch, Registry, RegistryView, ToolState};

/// Upstream double with a scripted sequence of catalogs. Once the script is
/// exhausted the last catalog is served again.
#[derive(Default)]
struct FakeRemote {
    catalogs: StdMutex<VecDeque<Result<Vec<RemoteOperation>, String>>>,
    last: StdMutex<Vec<RemoteOperation>>,
    list_gates: StdMutex<VecDeque<oneshot::Receiver<()>>>,
    invoke_gate: StdMutex<Option<oneshot::Receiver<()>>>,
    invocations: StdMutex<Vec<(String, serde_json::Value)>>,
    list_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeRemote {
    fn push_catalog(&self, operations: Vec<RemoteOperation>) {
        self.catalogs.lock().unwrap().push_back(Ok(operations));
    }

    fn push_failure(&self, message: &str) {
        self.catalogs
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }

    fn push_gate(&self, gate: oneshot::Receiver<()>) {
        self.list_gates.lock().unwrap().push_back(gate);
    }
}

#[async_trait]
impl RemoteEndpoint for FakeRemote {
    async fn list_operations(&self) -> Result<Vec<RemoteOperation>, McpError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let gate = self.list_gates.lock().unwrap().pop_front();
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        let next = self.catalogs.lock().unwrap().pop_front();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match next {
            Some(Ok(operations)) => {
                *self.last.lock().unwrap() = operations.clone();
                Ok(operations)
            }
            Some(Err(message)) => Err(McpError::Connection(message)),
            None => Ok(self.last.lock().unwrap().clone()),
        }
    }

    async fn invoke(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, McpError> {
        self.invocations
            .lock()
            .unwrap()
            .push((name.to_string(), arguments));
        let gate = self.invoke_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        Ok(json!({ "content": [{ "type": "text", "text": format!("ran {name}") }] }))
    }
}

/// Records the enabled names visible at the moment of each broadcast.
struct RecordingNotifier {
    view: RegistryView,
    tx: tokio::sync::mpsc::UnboundedSender<Vec<String>>,
}

#[async_trait]
impl ChangeNotifier for RecordingNotifier {
    async fn broadcast_changed(&self) {
        let names = self
            .view
            .enabled()
            .await
            .into_iter()
            .map(|l| l.name)
            .collect();
        let _ = self.tx.send(names);
    }
}

fn op(name: &str, description: &str) -> RemoteOperation {
    RemoteOperation {
        name: name.to_string(),
        title: None,
        description: Some(description.to_string()),
        input_schema: Some(json!({ "type": "object" })),
    }
}

fn setup(
    remote: Arc<FakeRemote>,
) -> (
    Arc<Synchronizer>,
    RegistryView,
    tokio::sync::mpsc::UnboundedReceiver<Vec<String>>,
) {
    let registry = Registry::new();
    let view = registry.view();
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let notifier = Arc::new(RecordingNotifier {
        view: view.clone(),
        tx,
    });
    let synchronizer = Arc::new(Synchronizer::new(
        remote,
        registry,
        notifier,
        Describer::default(),
    ));
    (synchronizer, view, rx)
}

async fn next_broadcast(
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<Vec<String>>,
) -> Vec<String> {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("Timed out waiting for broadcast")
        .expect("Notifier channel closed")
}

#[tokio::test]
async fn test_first_pass_registers_everything_enabled() {
    let remote = Arc::new(FakeRemote::default());
    remote.push_catalog(vec![op("a", "A tool"), op("b", "B tool")]);
    let (synchronizer, view, mut broadcasts) = setup(remote);

    let report = synchronizer.sync().await.unwrap();

    assert_eq!(report.pass, 1);
    assert_eq!(report.listed, 2);
    assert_eq!(report.registered, vec!["a", "b"]);
    assert!(report.disabled.is_empty());
    assert_eq!(view.state("a").await, Some(ToolState::Enabled));
    assert_eq!(view.state("b").await, Some(ToolState::Enabled));
    assert_eq!(next_broadcast(&mut broadcasts).await, vec!["a", "b"]);
}

#[tokio::test]
async fn test_title_falls_back_to_name() {
    let remote = Arc::new(FakeRemote::default());
    let mut titled = op("a", "A tool");
    titled.title = Some("Alpha".into());
    remote.push_catalog(vec![titled, op("b", "B tool")]);
    let (synchronizer, view, _broadcasts) = setup(remote);

    synchronizer.sync().await.unwrap();

    assert_eq!(view.get("a").await.unwrap().title, "Alpha");
    assert_eq!(view.get("b").await.unwrap().title, "b");
}

#[tokio::test]
async fn test_repeat_pass_is_idempotent() {
    let remote = Arc::new(FakeRemote::default());
    remote.push_catalog(vec![op("a", "A tool"), op("b", "B tool")]);
    let (synchronizer, view, mut broadcasts) = setup(remote);

    synchronizer.sync().await.unwrap();
    let before = view.listings().await;
    let report = synchronizer.sync().await.unwrap();

    assert_eq!(report.pass, 2);
    assert!(report.registered.is_empty());
    assert!(report.reactivated.is_empty());
    assert!(report.disabled.is_empty());
    assert_eq!(view.listings().await, before);

    // Every successful pass broadcasts, changed or not
    next_broadcast(&mut broadcasts).await;
    next_broadcast(&mut broadcasts).await;
}

#[tokio::test]
async fn test_vanished_tool_is_disabled_not_removed() {
    let remote = Arc::new(FakeRemote::default());
    remote.push_catalog(vec![op("a", "A tool"), op("b", "B tool")]);
    remote.push_catalog(vec![op("a", "A tool")]);
    let (synchronizer, view, mut broadcasts) = setup(remote);

    synchronizer.sync().await.unwrap();
    let report = synchronizer.sync().await.unwrap();

    assert_eq!(report.disabled, vec!["b"]);
    assert_eq!(view.count().await, 2);
    assert_eq!(view.state("b").await, Some(ToolState::Disabled));
    assert!(matches!(view.dispatch("b").await, Dispatch::Disabled));

    next_broadcast(&mut broadcasts).await;
    assert_eq!(next_broadcast(&mut broadcasts).await, vec!["a"]);
}

#[tokio::test]
async fn test_returning_tool_is_reenabled_with_new_description() {
    let remote = Arc::new(FakeRemote::default());
    remote.push_catalog(vec![op("a", "A tool"), op("b", "old words")]);
    remote.push_catalog(vec![op("a", "A tool")]);
    remote.push_catalog(vec![op("a", "A tool"), op("b", "new words")]);
    let (synchronizer, view, _broadcasts) = setup(remote);

    synchronizer.sync().await.unwrap();
    synchronizer.sync().await.unwrap();
    let report = synchronizer.sync().await.unwrap();

    assert_eq!(report.reactivated, vec!["b"]);
    assert!(report.registered.is_empty());
    let b = view.get("b").await.unwrap();
    assert_eq!(b.state, ToolState::Enabled);
    assert!(b.description.starts_with("new words"));
    assert!(matches!(view.dispatch("b").await, Dispatch::Enabled(_)));
}

#[tokio::test]
async fn test_description_refreshes_while_enabled() {
    let remote = Arc::new(FakeRemote::default());
    remote.push_catalog(vec![op("a", "first")]);
    remote.push_catalog(vec![op("a", "second")]);
    let (synchronizer, view, _broadcasts) = setup(remote);

    synchronizer.sync().await.unwrap();
    synchronizer.sync().await.unwrap();

    assert!(view.get("a").await.unwrap().description.starts_with("second"));
}

#[tokio::test]
async fn test_failed_pass_changes_nothing() {
    let remote = Arc::new(FakeRemote::default());
    remote.push_catalog(vec![op("a", "A tool")]);
    remote.push_failure("upstream hiccup");
    let (synchronizer, view, mut broadcasts) = setup(remote);

    synchronizer.sync().await.unwrap();
    next_broadcast(&mut broadcasts).await;
    let before = view.listings().await;

    let err = synchronizer.sync().await.unwrap_err();
    assert!(matches!(err, SyncError::Listing(McpError::Connection(_))));
    assert_eq!(view.listings().await, before);
    assert!(broadcasts.try_recv().is_err());

    // The pass counter only advances on success
    let report = synchronizer.sync().await.unwrap();
    assert_eq!(report.pass, 2);
}

#[tokio::test]
async fn test_startup_failure_leaves_registry_empty() {
    let remote = Arc::new(FakeRemote::default());
    remote.push_failure("no upstream");
    let (synchronizer, view, mut broadcasts) = setup(remote);

    let err = synchronizer.sync().await.unwrap_err();

    assert!(err.to_string().contains("no upstream"));
    assert_eq!(view.count().await, 0);
    assert!(broadcasts.try_recv().is_err());
}

#[tokio::test]
async fn test_empty_catalog_disables_everything() {
    let remote = Arc::new(FakeRemote::default());
    remote.push_catalog(vec![op("a", "A tool"), op("b", "B tool")]);
    remote.push_catalog(Vec::new());
    let (synchronizer, view, _broadcasts) = setup(remote);

    synchronizer.sync().await.unwrap();
    let report = synchronizer.sync().await.unwrap();

    assert_eq!(report.disabled, vec!["a", "b"]);
    assert!(view.enabled().await.is_empty());
    assert_eq!(view.count().await, 2);
}

#[tokio::test]
async fn test_duplicate_names_in_one_listing_register_once() {
    let remote = Arc::new(FakeRemote::default());
    remote.push_catalog(vec![op("a", "first"), op("a", "second")]);
    let (synchronizer, view, _broadcasts) = setup(remote);

    let report = synchronizer.sync().await.unwrap();

    assert_eq!(report.registered, vec!["a"]);
    assert_eq!(view.count().await, 1);
    assert!(view.get("a").await.unwrap().description.starts_with("second"));
}

#[tokio::test]
async fn test_schema_cache_tracks_registry() {
    let remote = Arc::new(FakeRemote::default());
    let mut bare = op("b", "B tool");
    bare.input_schema = None;
    remote.push_catalog(vec![op("a", "A tool"), bare]);
    remote.push_failure("boom");
    let (synchronizer, _view, _broadcasts) = setup(remote);

    assert_eq!(synchronizer.cached_schema("a").await, None);

    synchronizer.sync().await.unwrap();
    assert_eq!(
        synchronizer.cached_schema("a").await,
        Some(Some(json!({ "type": "object" })))
    );
    assert_eq!(synchronizer.cached_schema("b").await, Some(None));

    synchronizer.sync().await.unwrap_err();
    assert_eq!(synchronizer.cached_schema("b").await, Some(None));
}

#[tokio::test]
async fn test_registered_handler_forwards_to_upstream() {
    let remote = Arc::new(FakeRemote::default());
    remote.push_catalog(vec![op("search", "Find things")]);
    let (synchronizer, view, _broadcasts) = setup(remote.clone());
    synchronizer.sync().await.unwrap();

    let Dispatch::Enabled(handler) = view.dispatch("search").await else {
        panic!("search should be enabled");
    };
    let result = handler.invoke(Some(r#"{"q":"rust"}"#)).await.unwrap();

    assert_eq!(result["content"][0]["text"], "ran search");
    let invocations = remote.invocations.lock().unwrap();
    assert_eq!(invocations.len(), 1);
    assert_eq!(invocations[0], ("search".to_string(), json!({ "q": "rust" })));
}

#[tokio::test]
async fn test_in_flight_call_survives_disable() {
    let remote = Arc::new(FakeRemote::default());
    remote.push_catalog(vec![op("slow", "Slow tool")]);
    remote.push_catalog(Vec::new());
    let (release, gate) = oneshot::channel();
    *remote.invoke_gate.lock().unwrap() = Some(gate);
    let (synchronizer, view, _broadcasts) = setup(remote.clone());
    synchronizer.sync().await.unwrap();

    let Dispatch::Enabled(handler) = view.dispatch("slow").await else {
        panic!("slow should be enabled");
    };
    let call = tokio::spawn(async move { handler.invoke(None).await });
    while remote.invocations.lock().unwrap().is_empty() {
        tokio::task::yield_now().await;
    }

    synchronizer.sync().await.unwrap();
    assert!(matches!(view.dispatch("slow").await, Dispatch::Disabled));

    release.send(()).unwrap();
    let result = call.await.unwrap().unwrap();
    assert_eq!(result["content"][0]["text"], "ran slow");
}

#[tokio::test]
async fn test_concurrent_syncs_never_overlap() {
    let remote = Arc::new(FakeRemote::default());
    let (open_first, first) = oneshot::channel();
    let (open_second, second) = oneshot::channel();
    remote.push_gate(first);
    remote.push_gate(second);
    remote.push_catalog(vec![op("a", "A tool")]);
    remote.push_catalog(vec![op("b", "B tool")]);
    let (synchronizer, view, _broadcasts) = setup(remote.clone());

    let (one, two, ()) = tokio::join!(synchronizer.sync(), synchronizer.sync(), async {
        tokio::task::yield_now().await;
        open_second.send(()).unwrap();
        open_first.send(()).unwrap();
    });

    let mut passes = vec![one.unwrap().pass, two.unwrap().pass];
    passes.sort();
    assert_eq!(passes, vec![1, 2]);
    assert_eq!(remote.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(view.state("a").await, Some(ToolState::Disabled));
    assert_eq!(view.state("b").await, Some(ToolState::Enabled));
}

#[tokio::test]
async fn test_worker_runs_one_pass_per_trigger_in_order() {
    let remote = Arc::new(FakeRemote::default());
    let (open_first, first) = oneshot::channel();
    let (open_second, second) = oneshot::channel();
    remote.push_gate(first);
    remote.push_gate(second);
    remote.push_catalog(vec![op("a", "A tool")]);
    remote.push_catalog(vec![op("b", "B tool")]);
    let (synchronizer, view, mut broadcasts) = setup(remote.clone());
    let (trigger, worker) = spawn_sync_worker(synchronizer);

    assert!(trigger.request());
    assert!(trigger.request());
    tokio::task::yield_now().await;

    // Releasing the second gate first must not let the second pass jump ahead
    open_second.send(()).unwrap();
    open_first.send(()).unwrap();

    assert_eq!(next_broadcast(&mut broadcasts).await, vec!["a"]);
    assert_eq!(next_broadcast(&mut broadcasts).await, vec!["b"]);
    assert_eq!(remote.list_calls.load(Ordering::SeqCst), 2);
    assert_eq!(remote.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(view.state("a").await, Some(ToolState::Disabled));

    worker.abort();
}

#[tokio::test]
async fn test_worker_survives_failed_pass() {
    let remote = Arc::new(FakeRemote::default());
    remote.push_failure("transient");
    remote.push_catalog(vec![op("a", "A tool")]);
    let (synchronizer, view, mut broadcasts) = setup(remote.clone());
    let (trigger, worker) = spawn_sync_worker(synchronizer);

    trigger.request();
    trigger.request();

    assert_eq!(next_broadcast(&mut broadcasts).await, vec!["a"]);
    assert_eq!(remote.list_calls.load(Ordering::SeqCst), 2);
    assert_eq!(view.state("a").await, Some(ToolState::Enabled));

    worker.abort();
}

#[tokio::test]
async fn test_trigger_reports_stopped_worker() {
    let remote = Arc::new(FakeRemote::default());
    let (synchronizer, _view, _broadcasts) = setup(remote);
    let (trigger, worker) = spawn_sync_worker(synchronizer);

    worker.abort();
    let _ = worker.await;

    assert!(!trigger.request());
}
