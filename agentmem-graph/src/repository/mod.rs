//! Typed repositories for the four node kinds
//!
//! Every repository shares one [`Connection`]. Plan, task and memory
//! operations take the zone id as their scope; reads outside the scope come
//! back empty and writes outside it fail with an isolation violation.

mod memory;
mod plan;
mod task;
mod zone;

pub use memory::MemoryRepository;
pub use plan::{PlanDeletion, PlanRepository};
pub use task::TaskRepository;
pub use zone::ZoneRepository;

pub(crate) use task::hydrate_task;

use serde::Deserialize;

use crate::error::{GraphError, Result};
use crate::node::{MemoryType, Node, NodeId, NodeKind, Zone};
use crate::store::Connection;

/// Page size when the caller gives none
pub const DEFAULT_LIMIT: usize = 50;
/// Largest page a caller may request
pub const MAX_LIMIT: usize = 500;

/// Filters shared by `list` and `search`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeFilter {
    /// Status spelling; only plans and tasks have one
    #[serde(default)]
    pub status: Option<String>,
    /// A node matches only if it carries every listed tag
    #[serde(default)]
    pub tags: Vec<String>,
    /// Substring or keyword match over content, name and description
    #[serde(default)]
    pub text: Option<String>,
    /// Tasks only: restrict to one plan and order by position
    #[serde(default)]
    pub plan_id: Option<NodeId>,
    /// Memories only
    #[serde(default, rename = "type")]
    pub memory_type: Option<MemoryType>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

impl NodeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn plan(mut self, plan_id: NodeId) -> Self {
        self.plan_id = Some(plan_id);
        self
    }

    pub fn memory_type(mut self, memory_type: MemoryType) -> Self {
        self.memory_type = Some(memory_type);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Tag and text predicates plus an already-parsed status spelling
    pub(crate) fn matches(&self, node: &Node, status: Option<&str>) -> bool {
        if let Some(wanted) = status {
            if node.status() != Some(wanted) {
                return false;
            }
        }
        if !self.tags.iter().all(|t| node.tags().contains(t.trim())) {
            return false;
        }
        match &self.text {
            Some(query) => matches_text(node, query),
            None => true,
        }
    }

    /// Skip `offset`, keep at most `limit` (capped at [`MAX_LIMIT`])
    pub(crate) fn paginate<T>(&self, items: Vec<T>) -> Vec<T> {
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        items.into_iter().skip(self.offset).take(limit).collect()
    }

    pub(crate) fn reject_status(&self, kind: NodeKind) -> Result<()> {
        if self.status.is_some() {
            return Err(GraphError::validation(format!(
                "{} nodes have no status to filter on",
                kind
            )));
        }
        Ok(())
    }
}

/// Case-insensitive match: the whole query as a substring of any searchable
/// field, or every whitespace-separated keyword found somewhere.
pub(crate) fn matches_text(node: &Node, query: &str) -> bool {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return true;
    }

    let fields: Vec<String> = node
        .searchable_fields()
        .into_iter()
        .map(|f| f.to_lowercase())
        .collect();

    if fields.iter().any(|f| f.contains(&query)) {
        return true;
    }
    query
        .split_whitespace()
        .all(|kw| fields.iter().any(|f| f.contains(kw)))
}

/// Newest first; id breaks ties so pages are stable
pub(crate) fn sort_newest_first(nodes: &mut [Node]) {
    nodes.sort_by(|a, b| {
        b.created_at()
            .cmp(&a.created_at())
            .then_with(|| a.id().cmp(&b.id()))
    });
}

/// Reject a write on a node that lives outside `scope`
pub(crate) fn ensure_scope(node: &Node, scope: NodeId) -> Result<()> {
    if node.scope() != scope {
        return Err(outside_scope(node, scope));
    }
    Ok(())
}

pub(crate) fn outside_scope(node: &Node, scope: NodeId) -> GraphError {
    GraphError::isolation(format!(
        "{} {} is outside zone {}",
        node.kind(),
        node.id(),
        scope
    ))
}

/// Every node of `kind` indexed under `scope`
pub(crate) fn load_scoped(conn: &Connection, scope: NodeId, kind: NodeKind) -> Result<Vec<Node>> {
    let mut nodes = Vec::new();
    for id in conn.scoped_ids(scope, kind)? {
        match conn.get_node(id)? {
            Some(node) => nodes.push(node),
            None => log::warn!("Scope index points at missing {} {}", kind, id),
        }
    }
    Ok(nodes)
}

/// The zone a new plan or memory is created in must exist
pub(crate) fn require_zone(conn: &Connection, zone_id: NodeId) -> Result<Zone> {
    match conn.get_node(zone_id)? {
        Some(Node::Zone(zone)) => Ok(zone),
        _ => Err(GraphError::not_found(format!("zone {}", zone_id))),
    }
}
