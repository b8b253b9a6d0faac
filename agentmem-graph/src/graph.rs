//! One handle over every repository and engine

use std::sync::Arc;

use crate::error::Result;
use crate::relations::RelationshipEngine;
use crate::repository::{MemoryRepository, PlanRepository, TaskRepository, ZoneRepository};
use crate::store::{Connection, StoreStats};
use crate::traversal::TraversalEngine;

/// Repositories and engines built over one shared [`Connection`].
///
/// Cheap to clone; every clone talks to the same store.
#[derive(Clone)]
pub struct MemoryGraph {
    conn: Arc<Connection>,
    zones: ZoneRepository,
    plans: PlanRepository,
    tasks: TaskRepository,
    memories: MemoryRepository,
    relations: RelationshipEngine,
    traversal: TraversalEngine,
}

impl MemoryGraph {
    pub fn new(conn: Arc<Connection>) -> Self {
        let relations = RelationshipEngine::new(conn.clone());
        Self {
            zones: ZoneRepository::new(conn.clone(), relations.clone()),
            plans: PlanRepository::new(conn.clone(), relations.clone()),
            tasks: TaskRepository::new(conn.clone(), relations.clone()),
            memories: MemoryRepository::new(conn.clone(), relations.clone()),
            traversal: TraversalEngine::new(conn.clone()),
            relations,
            conn,
        }
    }

    pub fn zones(&self) -> &ZoneRepository {
        &self.zones
    }

    pub fn plans(&self) -> &PlanRepository {
        &self.plans
    }

    pub fn tasks(&self) -> &TaskRepository {
        &self.tasks
    }

    pub fn memories(&self) -> &MemoryRepository {
        &self.memories
    }

    pub fn relations(&self) -> &RelationshipEngine {
        &self.relations
    }

    pub fn traversal(&self) -> &TraversalEngine {
        &self.traversal
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    /// Node and edge counts across every zone
    pub fn stats(&self) -> Result<StoreStats> {
        self.conn.stats()
    }
}
