use std::sync::Arc;

use chrono::Utc;

use super::{load_scoped, outside_scope, require_zone, sort_newest_first, NodeFilter};
use crate::error::{GraphError, Result};
use crate::node::{
    normalize_tags, require_text, Memory, MemoryUpdate, NewMemory, Node, NodeId, NodeKind,
};
use crate::relations::RelationshipEngine;
use crate::relationship::{EdgeRecord, RelationType};
use crate::store::Connection;

#[derive(Clone)]
pub struct MemoryRepository {
    conn: Arc<Connection>,
    relations: RelationshipEngine,
}

impl MemoryRepository {
    pub fn new(conn: Arc<Connection>, relations: RelationshipEngine) -> Self {
        Self { conn, relations }
    }

    pub fn create(&self, scope: NodeId, input: NewMemory) -> Result<Memory> {
        let content = require_text("content", &input.content)?;

        let _guard = self.conn.write_guard();
        require_zone(&self.conn, scope)?;

        let now = Utc::now();
        let memory = Memory {
            id: NodeId::new(),
            zone_id: scope,
            content,
            memory_type: input.memory_type.unwrap_or_default(),
            tags: normalize_tags(&input.tags),
            metadata: input.metadata,
            created_at: now,
            updated_at: now,
        };

        let mut batch = self.conn.batch();
        batch.put_node(&Node::Memory(memory.clone()))?;
        batch.put_edge(memory.id, scope, RelationType::BelongsTo, &EdgeRecord::new())?;
        batch.commit()?;

        log::debug!("Stored {} memory {} in zone {}", memory.memory_type, memory.id, scope);
        Ok(memory)
    }

    pub fn get(&self, scope: NodeId, id: NodeId) -> Result<Option<Memory>> {
        match self.conn.get_node(id)? {
            Some(Node::Memory(memory)) if memory.zone_id == scope => Ok(Some(memory)),
            _ => Ok(None),
        }
    }

    pub fn update(&self, scope: NodeId, id: NodeId, update: MemoryUpdate) -> Result<Memory> {
        let _guard = self.conn.write_guard();
        let mut memory = self.load_for_write(scope, id)?;

        if let Some(content) = update.content {
            memory.content = require_text("content", &content)?;
        }
        if let Some(memory_type) = update.memory_type {
            memory.memory_type = memory_type;
        }
        if let Some(tags) = update.tags {
            memory.tags = normalize_tags(&tags);
        }
        if let Some(metadata) = update.metadata {
            memory.metadata = metadata;
        }
        memory.updated_at = Utc::now();

        let mut batch = self.conn.batch();
        batch.put_node(&Node::Memory(memory.clone()))?;
        batch.commit()?;
        Ok(memory)
    }

    /// Delete a memory together with every edge touching it
    pub fn delete(&self, scope: NodeId, id: NodeId) -> Result<()> {
        let _guard = self.conn.write_guard();
        let memory = self.load_for_write(scope, id)?;

        let mut batch = self.conn.batch();
        self.relations.detach_node(&mut batch, id)?;
        batch.delete_node(&Node::Memory(memory))?;
        batch.commit()?;

        log::debug!("Deleted memory {}", id);
        Ok(())
    }

    pub fn list(&self, scope: NodeId, filter: &NodeFilter) -> Result<Vec<Memory>> {
        filter.reject_status(NodeKind::Memory)?;

        let mut nodes = load_scoped(&self.conn, scope, NodeKind::Memory)?;
        nodes.retain(|n| {
            let type_matches = match (n, filter.memory_type) {
                (Node::Memory(m), Some(wanted)) => m.memory_type == wanted,
                _ => true,
            };
            type_matches && filter.matches(n, None)
        });
        sort_newest_first(&mut nodes);

        Ok(filter
            .paginate(nodes)
            .into_iter()
            .filter_map(|n| match n {
                Node::Memory(memory) => Some(memory),
                _ => None,
            })
            .collect())
    }

    pub fn search(&self, scope: NodeId, query: &str, filter: &NodeFilter) -> Result<Vec<Memory>> {
        let filter = NodeFilter {
            text: Some(query.to_string()),
            ..filter.clone()
        };
        self.list(scope, &filter)
    }

    fn load_for_write(&self, scope: NodeId, id: NodeId) -> Result<Memory> {
        match self.conn.get_node(id)? {
            Some(Node::Memory(memory)) if memory.zone_id == scope => Ok(memory),
            Some(node @ Node::Memory(_)) => Err(outside_scope(&node, scope)),
            _ => Err(GraphError::not_found(format!("memory {}", id))),
        }
    }
}
