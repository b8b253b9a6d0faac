//! AgentMem graph engine
//!
//! Persistent property graph that AI coding agents use as working memory:
//! zones isolate projects, plans hold ordered tasks, and memories capture
//! freeform knowledge. Everything is linked by typed, directed edges.
//!
//! ## Features
//!
//! - **Zone isolation** - every read and write is scoped to one zone
//! - **Typed edges** - endpoint rules per relation type, idempotent links
//! - **Cascading deletes** - plan deletes remove tasks no other plan holds
//! - **Traversal** - breadth-first, cycle-safe neighbourhood queries
//! - **RocksDB persistence** - atomic write batches, startup retry with backoff
//!
//! ## Example
//!
//! ```ignore
//! use agentmem_graph::{connect, MemoryGraph, NewPlan, NewTask, NewZone, StoreConfig};
//!
//! let conn = connect(&StoreConfig::new("/tmp/agentmem"))?;
//! let graph = MemoryGraph::new(std::sync::Arc::new(conn));
//!
//! let zone = graph.zones().create(NewZone::new("payments"))?;
//! let plan = graph.plans().create(zone.id, NewPlan::new("Stripe rollout"))?;
//! graph.tasks().create(zone.id, NewTask::new("Integrate gateway").in_plan(plan.id))?;
//! ```

pub mod connector;
pub mod error;
pub mod graph;
pub mod node;
pub mod position;
pub mod relations;
pub mod relationship;
pub mod repository;
pub mod store;
pub mod traversal;

// Re-exports for convenience
pub use connector::{connect, connect_with_retry, RetryPolicy, StoreConfig};
pub use error::{GraphError, Result};
pub use graph::MemoryGraph;
pub use node::{
    Memory, MemoryType, MemoryUpdate, Metadata, NewMemory, NewPlan, NewTask, NewZone, Node,
    NodeId, NodeKind, Plan, PlanStatus, PlanUpdate, Task, TaskStatus, TaskUpdate, Zone,
    ZoneUpdate,
};
pub use relations::{CascadeReport, LinkOutcome, RelationshipEngine};
pub use relationship::{Direction, Relation, RelationType};
pub use repository::{
    MemoryRepository, NodeFilter, PlanDeletion, PlanRepository, TaskRepository, ZoneRepository,
};
pub use store::{Connection, StoreStats};
pub use traversal::{RelatedNode, TraversalEngine, MAX_TRAVERSAL_DEPTH};
