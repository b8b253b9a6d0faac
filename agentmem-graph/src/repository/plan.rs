use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use super::{load_scoped, outside_scope, require_zone, sort_newest_first, NodeFilter};
use crate::error::{GraphError, Result};
use crate::node::{
    normalize_tags, require_text, NewPlan, Node, NodeId, NodeKind, Plan, PlanStatus, PlanUpdate,
};
use crate::relations::{CascadeReport, RelationshipEngine};
use crate::relationship::{EdgeRecord, RelationType};
use crate::store::Connection;

/// Outcome of deleting a plan
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanDeletion {
    pub plan_id: NodeId,
    #[serde(flatten)]
    pub cascade: CascadeReport,
}

#[derive(Clone)]
pub struct PlanRepository {
    conn: Arc<Connection>,
    relations: RelationshipEngine,
}

impl PlanRepository {
    pub fn new(conn: Arc<Connection>, relations: RelationshipEngine) -> Self {
        Self { conn, relations }
    }

    /// Create a plan in `scope`, linked to it by BELONGS_TO
    pub fn create(&self, scope: NodeId, input: NewPlan) -> Result<Plan> {
        let name = require_text("name", &input.name)?;

        let _guard = self.conn.write_guard();
        require_zone(&self.conn, scope)?;

        let now = Utc::now();
        let plan = Plan {
            id: NodeId::new(),
            zone_id: scope,
            name,
            description: input.description.unwrap_or_default(),
            status: input.status.unwrap_or_default(),
            tags: normalize_tags(&input.tags),
            metadata: input.metadata,
            created_at: now,
            updated_at: now,
        };

        let mut batch = self.conn.batch();
        batch.put_node(&Node::Plan(plan.clone()))?;
        batch.put_edge(plan.id, scope, RelationType::BelongsTo, &EdgeRecord::new())?;
        batch.commit()?;

        log::debug!("Created plan '{}' ({}) in zone {}", plan.name, plan.id, scope);
        Ok(plan)
    }

    pub fn get(&self, scope: NodeId, id: NodeId) -> Result<Option<Plan>> {
        match self.conn.get_node(id)? {
            Some(Node::Plan(plan)) if plan.zone_id == scope => Ok(Some(plan)),
            _ => Ok(None),
        }
    }

    /// Apply the supplied fields only
    pub fn update(&self, scope: NodeId, id: NodeId, update: PlanUpdate) -> Result<Plan> {
        let _guard = self.conn.write_guard();
        let mut plan = self.load_for_write(scope, id)?;

        if let Some(name) = update.name {
            plan.name = require_text("name", &name)?;
        }
        if let Some(description) = update.description {
            plan.description = description;
        }
        if let Some(status) = update.status {
            plan.status = status;
        }
        if let Some(tags) = update.tags {
            plan.tags = normalize_tags(&tags);
        }
        if let Some(metadata) = update.metadata {
            plan.metadata = metadata;
        }
        plan.updated_at = Utc::now();

        let mut batch = self.conn.batch();
        batch.put_node(&Node::Plan(plan.clone()))?;
        batch.commit()?;
        Ok(plan)
    }

    /// Delete a plan. Its tasks lose their membership; those left without
    /// any plan are deleted with it.
    pub fn delete(&self, scope: NodeId, id: NodeId) -> Result<PlanDeletion> {
        let _guard = self.conn.write_guard();
        let plan = self.load_for_write(scope, id)?;

        let mut batch = self.conn.batch();
        let cascade = self.relations.cascade_plan_delete(&mut batch, id)?;
        self.relations.detach_node(&mut batch, id)?;
        batch.delete_node(&Node::Plan(plan))?;
        batch.commit()?;

        log::debug!("Deleted plan {}", id);
        Ok(PlanDeletion {
            plan_id: id,
            cascade,
        })
    }

    pub fn list(&self, scope: NodeId, filter: &NodeFilter) -> Result<Vec<Plan>> {
        let status = filter
            .status
            .as_deref()
            .map(str::parse::<PlanStatus>)
            .transpose()?;

        let mut nodes = load_scoped(&self.conn, scope, NodeKind::Plan)?;
        nodes.retain(|n| filter.matches(n, status.map(|s| s.as_str())));
        sort_newest_first(&mut nodes);

        Ok(filter
            .paginate(nodes)
            .into_iter()
            .filter_map(|n| match n {
                Node::Plan(plan) => Some(plan),
                _ => None,
            })
            .collect())
    }

    pub fn search(&self, scope: NodeId, query: &str, filter: &NodeFilter) -> Result<Vec<Plan>> {
        let filter = NodeFilter {
            text: Some(query.to_string()),
            ..filter.clone()
        };
        self.list(scope, &filter)
    }

    fn load_for_write(&self, scope: NodeId, id: NodeId) -> Result<Plan> {
        match self.conn.get_node(id)? {
            Some(Node::Plan(plan)) if plan.zone_id == scope => Ok(plan),
            Some(node @ Node::Plan(_)) => Err(outside_scope(&node, scope)),
            _ => Err(GraphError::not_found(format!("plan {}", id))),
        }
    }
}
