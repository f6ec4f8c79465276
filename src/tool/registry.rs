// ABOUTME: Implements the Registry - the local catalog of mirrored tools,
// ABOUTME: split into a single-writer handle and cloneable read-only views.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::Invoke;
use crate::error::RegistryError;

/// Lifecycle state of a registered tool. Unregistered tools have no state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolState {
    Enabled,
    Disabled,
}

/// What a new registration looks like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDescriptor {
    pub name: String,
    pub title: String,
    pub description: String,
}

/// Partial update to an existing registration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolUpdate {
    pub description: Option<String>,
    pub enabled: Option<bool>,
}

/// A rendered snapshot of one registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolListing {
    pub name: String,
    pub title: String,
    pub description: String,
    pub state: ToolState,
}

/// How a `tools/call` for a given name should be routed.
pub enum Dispatch {
    Enabled(Arc<dyn Invoke>),
    Disabled,
    Unknown,
}

#[derive(Clone)]
struct MirroredTool {
    name: String,
    title: String,
    description: String,
    enabled: bool,
    handler: Arc<dyn Invoke>,
}

impl MirroredTool {
    fn listing(&self) -> ToolListing {
        ToolListing {
            name: self.name.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            state: if self.enabled {
                ToolState::Enabled
            } else {
                ToolState::Disabled
            },
        }
    }
}

/// Arena of entries plus a name index. Entries are never removed, so indices
/// stay valid for the life of the process.
#[derive(Clone, Default)]
struct Catalog {
    entries: Vec<MirroredTool>,
    index: HashMap<String, usize>,
}

impl Catalog {
    fn get(&self, name: &str) -> Option<&MirroredTool> {
        self.index.get(name).map(|&i| &self.entries[i])
    }
}

/// The writable registry. There is exactly one, owned by whoever keeps the
/// catalog in sync; everyone else holds a [`RegistryView`].
#[derive(Default)]
pub struct Registry {
    catalog: Arc<RwLock<Catalog>>,
}

impl Registry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A read-only view sharing this registry's state.
    pub fn view(&self) -> RegistryView {
        RegistryView {
            catalog: Arc::clone(&self.catalog),
        }
    }

    /// Start a transaction over a private copy of the catalog.
    ///
    /// Nothing is visible to views until [`RegistryTxn::commit`]; dropping the
    /// transaction discards every staged change.
    pub async fn begin(&mut self) -> RegistryTxn<'_> {
        let staged = self.catalog.read().await.clone();
        RegistryTxn {
            registry: self,
            staged,
        }
    }
}

/// A batch of registrations and updates applied all at once.
pub struct RegistryTxn<'a> {
    registry: &'a mut Registry,
    staged: Catalog,
}

impl RegistryTxn<'_> {
    /// Whether a name is registered, counting staged registrations.
    pub fn contains(&self, name: &str) -> bool {
        self.staged.index.contains_key(name)
    }

    /// All registered names in first-registration order.
    pub fn names(&self) -> Vec<String> {
        self.staged.entries.iter().map(|e| e.name.clone()).collect()
    }

    /// Staged state of a name.
    pub fn state(&self, name: &str) -> Option<ToolState> {
        self.staged.get(name).map(|e| e.listing().state)
    }

    /// Register a new, enabled tool.
    pub fn register(
        &mut self,
        descriptor: ToolDescriptor,
        handler: Arc<dyn Invoke>,
    ) -> Result<(), RegistryError> {
        if self.contains(&descriptor.name) {
            return Err(RegistryError::DuplicateRegistration(descriptor.name));
        }

        let slot = self.staged.entries.len();
        self.staged.index.insert(descriptor.name.clone(), slot);
        self.staged.entries.push(MirroredTool {
            name: descriptor.name,
            title: descriptor.title,
            description: descriptor.description,
            enabled: true,
            handler,
        });
        Ok(())
    }

    /// Update the description and/or enabled flag of a registered tool.
    pub fn update(&mut self, name: &str, update: ToolUpdate) -> Result<(), RegistryError> {
        let slot = *self
            .staged
            .index
            .get(name)
            .ok_or_else(|| RegistryError::UnknownOperation(name.to_string()))?;

        let entry = &mut self.staged.entries[slot];
        if let Some(description) = update.description {
            entry.description = description;
        }
        if let Some(enabled) = update.enabled {
            entry.enabled = enabled;
        }
        Ok(())
    }

    /// Publish every staged change in one step.
    pub async fn commit(self) {
        let RegistryTxn { registry, staged } = self;
        *registry.catalog.write().await = staged;
    }
}

/// A cloneable, read-only view of the registry.
#[derive(Clone)]
pub struct RegistryView {
    catalog: Arc<RwLock<Catalog>>,
}

impl RegistryView {
    /// Resolve a name for dispatch, reading the enabled flag right now.
    pub async fn dispatch(&self, name: &str) -> Dispatch {
        let catalog = self.catalog.read().await;
        match catalog.get(name) {
            Some(entry) if entry.enabled => Dispatch::Enabled(Arc::clone(&entry.handler)),
            Some(_) => Dispatch::Disabled,
            None => Dispatch::Unknown,
        }
    }

    /// Current state of a name, or `None` if it was never registered.
    pub async fn state(&self, name: &str) -> Option<ToolState> {
        self.get(name).await.map(|l| l.state)
    }

    /// Snapshot of one entry.
    pub async fn get(&self, name: &str) -> Option<ToolListing> {
        self.catalog.read().await.get(name).map(MirroredTool::listing)
    }

    /// Snapshot of every entry in first-registration order.
    pub async fn listings(&self) -> Vec<ToolListing> {
        let catalog = self.catalog.read().await;
        catalog.entries.iter().map(MirroredTool::listing).collect()
    }

    /// Snapshot of enabled entries in first-registration order.
    pub async fn enabled(&self) -> Vec<ToolListing> {
        let catalog = self.catalog.read().await;
        catalog
            .entries
            .iter()
            .filter(|e| e.enabled)
            .map(MirroredTool::listing)
            .collect()
    }

    /// Number of registered tools, enabled or not.
    pub async fn count(&self) -> usize {
        self.catalog.read().await.entries.len()
    }
}
