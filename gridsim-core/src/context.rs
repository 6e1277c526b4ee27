//! The simulator context: the one piece of shared state every entity
//! needs, passed explicitly rather than reached for as a global.
//!
//! Cyclic references between entities (a resource and its replica
//! manager, a router and its neighbours) are represented with
//! [crate::types::EntityId]s resolved through this registry, never as
//! long-lived direct references — avoiding the aliasing problems a
//! straight translation of the original object graph would run into.
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use once_cell::sync::OnceCell;

use crate::types::EntityId;

/// Name -> id registry, shared by every entity in a simulation run.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    by_name: RwLock<HashMap<String, EntityId>>,
    next_id: std::sync::atomic::AtomicU64,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name`, returning its existing id if already registered.
    pub fn register(&self, name: impl Into<String>) -> EntityId {
        let name = name.into();
        if let Some(id) = self.by_name.read().unwrap().get(&name) {
            return *id;
        }
        let id = EntityId(
            self.next_id
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst),
        );
        self.by_name.write().unwrap().insert(name, id);
        id
    }

    pub fn lookup(&self, name: &str) -> Option<EntityId> {
        self.by_name.read().unwrap().get(name).copied()
    }
}

/// The process-wide set of entity ids whose packets must never be
/// dropped. Writable only before the simulation starts, matching the
/// teacher's `OnceCell`-backed write-once globals.
#[derive(Debug, Default)]
pub struct Whitelist {
    ids: RwLock<HashSet<EntityId>>,
}

impl Whitelist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `entity` to the whitelist, along with its input-port and
    /// output-port ids, so packets addressed to or from any of the three
    /// are protected identically (spec: "adding an id also adds its
    /// input-port and output-port ids").
    pub fn add(&self, entity: EntityId, input_port: EntityId, output_port: EntityId) {
        let mut ids = self.ids.write().unwrap();
        ids.insert(entity);
        ids.insert(input_port);
        ids.insert(output_port);
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.ids.read().unwrap().contains(&id)
    }
}

/// Bundles the registry and whitelist every policy/manager constructor
/// receives. Never stored as a global: always threaded through explicitly.
#[derive(Debug, Clone)]
pub struct SimContext {
    pub registry: Arc<EntityRegistry>,
    pub whitelist: Arc<Whitelist>,
}

impl SimContext {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(EntityRegistry::new()),
            whitelist: Arc::new(Whitelist::new()),
        }
    }
}

impl Default for SimContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A once-per-process marker for the instant the simulation began,
/// mirroring the teacher's `SYSTEM_START_TIME: OnceCell<Instant>` idiom
/// for values that are set exactly once at startup and read everywhere.
pub static SIMULATION_EPOCH: OnceCell<crate::types::SimTime> = OnceCell::new();
