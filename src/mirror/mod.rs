// ABOUTME: Mirror module - keeps the local tool catalog in step with the
// ABOUTME: upstream's and forwards local calls to it.

pub mod codec;
mod describe;
mod forward;
mod local;
mod remote;
mod sync;

pub use describe::{DEFAULT_SCHEMA_PREVIEW_LIMIT, Describer, NO_SCHEMA_NOTE, TRUNCATION_MARKER};
pub use forward::Forwarder;
pub use local::ChangeNotifier;
pub use remote::{RemoteEndpoint, RemoteEvent, RemoteOperation};
pub use sync::{SyncReport, SyncTrigger, Synchronizer, spawn_sync_worker};

#[cfg(test)]
mod sync_test;
