//! Relationship engine
//!
//! Creates and removes typed edges, enforces endpoint and zone rules, and
//! carries out the cascade steps that repository deletes rely on.

use std::sync::Arc;

use serde::Serialize;

use crate::error::{GraphError, Result};
use crate::node::{Node, NodeId};
use crate::position;
use crate::relationship::{Direction, EdgeRecord, Relation, RelationType};
use crate::repository::ensure_scope;
use crate::store::{Batch, Connection, StoredEdge};

/// Result of a link call
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkOutcome {
    /// False when the edge already existed
    pub created: bool,
    pub relation: Relation,
}

/// Tasks affected by a plan delete
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeReport {
    /// Tasks that survived because another plan still holds them
    pub detached_tasks: Vec<NodeId>,
    /// Tasks deleted because the plan was their last one
    pub deleted_tasks: Vec<NodeId>,
}

#[derive(Clone)]
pub struct RelationshipEngine {
    conn: Arc<Connection>,
}

impl RelationshipEngine {
    pub fn new(conn: Arc<Connection>) -> Self {
        Self { conn }
    }

    /// Create `from -[relation_type]-> to` inside `scope`; a duplicate is a
    /// no-op
    pub fn link(
        &self,
        scope: NodeId,
        from: NodeId,
        to: NodeId,
        relation_type: RelationType,
    ) -> Result<LinkOutcome> {
        if from == to {
            return Err(GraphError::validation("cannot link a node to itself"));
        }

        let _guard = self.conn.write_guard();
        let from_node = self.conn.require_node(from)?;
        let to_node = self.conn.require_node(to)?;

        relation_type.check_endpoints(from_node.kind(), to_node.kind())?;
        ensure_scope(&from_node, scope)?;
        ensure_scope(&to_node, scope)?;

        if let Some(record) = self.conn.get_edge(from, to, relation_type)? {
            log::debug!("Edge {} -[{}]-> {} already exists", from, relation_type, to);
            return Ok(LinkOutcome {
                created: false,
                relation: to_relation(from, to, relation_type, record, Direction::Outgoing),
            });
        }

        let mut record = EdgeRecord::new();
        if relation_type == RelationType::PartOf {
            record = record.with_position(self.next_position(to)?);
        }

        let mut batch = self.conn.batch();
        batch.put_edge(from, to, relation_type, &record)?;
        batch.commit()?;

        log::debug!("Linked {} -[{}]-> {}", from, relation_type, to);
        Ok(LinkOutcome {
            created: true,
            relation: to_relation(from, to, relation_type, record, Direction::Outgoing),
        })
    }

    /// Remove exactly the matching edge; returns false when there was none
    pub fn unlink(
        &self,
        scope: NodeId,
        from: NodeId,
        to: NodeId,
        relation_type: RelationType,
    ) -> Result<bool> {
        if relation_type == RelationType::BelongsTo {
            return Err(GraphError::validation(
                "BELONGS_TO cannot be removed; delete the node instead",
            ));
        }

        let _guard = self.conn.write_guard();
        for id in [from, to] {
            if let Some(node) = self.conn.get_node(id)? {
                ensure_scope(&node, scope)?;
            }
        }

        if self.conn.get_edge(from, to, relation_type)?.is_none() {
            return Ok(false);
        }

        if relation_type == RelationType::PartOf {
            let memberships = self.conn.edges_from(from, Some(RelationType::PartOf))?;
            if memberships.len() <= 1 {
                return Err(GraphError::validation(format!(
                    "task {} must stay part of at least one plan; delete the task instead",
                    from
                )));
            }
        }

        let mut batch = self.conn.batch();
        batch.delete_edge(from, to, relation_type)?;
        batch.commit()?;

        log::debug!("Unlinked {} -[{}]-> {}", from, relation_type, to);
        Ok(true)
    }

    /// Edges touching `id`; empty when the node is unknown or out of scope
    pub fn list_relations(
        &self,
        scope: NodeId,
        id: NodeId,
        direction: Direction,
        relation_type: Option<RelationType>,
    ) -> Result<Vec<Relation>> {
        match self.conn.get_node(id)? {
            Some(node) if node.scope() == scope => {}
            _ => return Ok(Vec::new()),
        }

        let mut relations = Vec::new();
        if direction.includes_outgoing() {
            relations.extend(
                self.conn
                    .edges_from(id, relation_type)?
                    .into_iter()
                    .map(|e| stored_to_relation(e, Direction::Outgoing)),
            );
        }
        if direction.includes_incoming() {
            relations.extend(
                self.conn
                    .edges_to(id, relation_type)?
                    .into_iter()
                    .map(|e| stored_to_relation(e, Direction::Incoming)),
            );
        }
        Ok(relations)
    }

    /// Position after the last task currently in `plan`
    pub(crate) fn next_position(&self, plan: NodeId) -> Result<f64> {
        let last = self
            .conn
            .edges_to(plan, Some(RelationType::PartOf))?
            .into_iter()
            .filter_map(|e| e.record.position)
            .fold(None, |max: Option<f64>, p| Some(max.map_or(p, |m| m.max(p))));
        Ok(position::append_after(last))
    }

    /// Queue removal of every edge touching `id`
    pub(crate) fn detach_node(&self, batch: &mut Batch<'_>, id: NodeId) -> Result<usize> {
        let mut removed = 0;
        for edge in self
            .conn
            .edges_from(id, None)?
            .into_iter()
            .chain(self.conn.edges_to(id, None)?)
        {
            batch.delete_edge(edge.from, edge.to, edge.relation_type)?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Queue the plan-delete cascade: drop every PART_OF edge into `plan`,
    /// then delete each task that no other plan holds.
    pub(crate) fn cascade_plan_delete(
        &self,
        batch: &mut Batch<'_>,
        plan: NodeId,
    ) -> Result<CascadeReport> {
        let mut report = CascadeReport::default();

        for membership in self.conn.edges_to(plan, Some(RelationType::PartOf))? {
            let task = membership.from;
            batch.delete_edge(task, plan, RelationType::PartOf)?;

            let remaining = self
                .conn
                .edges_from(task, Some(RelationType::PartOf))?
                .into_iter()
                .filter(|e| e.to != plan)
                .count();

            if remaining > 0 {
                report.detached_tasks.push(task);
                continue;
            }

            if let Some(node) = self.conn.get_node(task)? {
                self.detach_node(batch, task)?;
                batch.delete_node(&node)?;
                report.deleted_tasks.push(task);
            }
        }

        if !report.deleted_tasks.is_empty() {
            log::info!(
                "Plan {} delete removed {} orphaned task(s), kept {}",
                plan,
                report.deleted_tasks.len(),
                report.detached_tasks.len()
            );
        }
        Ok(report)
    }
}

fn to_relation(
    from: NodeId,
    to: NodeId,
    relation_type: RelationType,
    record: EdgeRecord,
    direction: Direction,
) -> Relation {
    Relation {
        from,
        to,
        relation_type,
        direction,
        position: record.position,
        created_at: record.created_at,
    }
}

fn stored_to_relation(edge: StoredEdge, direction: Direction) -> Relation {
    to_relation(edge.from, edge.to, edge.relation_type, edge.record, direction)
}

/// The node on the far side of an edge, if it is still in `scope`
pub(crate) fn scoped_neighbor(conn: &Connection, id: NodeId, scope: NodeId) -> Result<Option<Node>> {
    Ok(conn.get_node(id)?.filter(|n| n.scope() == scope))
}

#[cfg(test)]
mod tests {
    use crate::node::{NewMemory, NewPlan, NewTask, NewZone};
    use crate::relationship::{Direction, RelationType};
    use crate::test_support::test_graph;
    use crate::GraphError;

    #[test]
    fn test_link_is_idempotent() {
        let (_dir, graph) = test_graph();
        let zone = graph.zones().create(NewZone::new("Z1")).unwrap();
        let plan = graph.plans().create(zone.id, NewPlan::new("P")).unwrap();
        let a = graph.tasks().create(zone.id, NewTask::new("a").in_plan(plan.id)).unwrap();
        let b = graph.tasks().create(zone.id, NewTask::new("b").in_plan(plan.id)).unwrap();

        let first = graph
            .relations()
            .link(zone.id, a.id, b.id, RelationType::DependsOn)
            .unwrap();
        let second = graph
            .relations()
            .link(zone.id, a.id, b.id, RelationType::DependsOn)
            .unwrap();
        assert!(first.created);
        assert!(!second.created);

        let out = graph
            .relations()
            .list_relations(zone.id, a.id, Direction::Outgoing, Some(RelationType::DependsOn))
            .unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_depends_on_does_not_create_blocks() {
        let (_dir, graph) = test_graph();
        let zone = graph.zones().create(NewZone::new("Z1")).unwrap();
        let a = graph.memories().create(zone.id, NewMemory::new("a")).unwrap();
        let b = graph.memories().create(zone.id, NewMemory::new("b")).unwrap();

        graph
            .relations()
            .link(zone.id, a.id, b.id, RelationType::DependsOn)
            .unwrap();
        graph
            .relations()
            .link(zone.id, b.id, a.id, RelationType::Blocks)
            .unwrap();

        assert!(graph
            .relations()
            .unlink(zone.id, a.id, b.id, RelationType::DependsOn)
            .unwrap());

        let blocks = graph
            .relations()
            .list_relations(zone.id, b.id, Direction::Outgoing, Some(RelationType::Blocks))
            .unwrap();
        assert_eq!(blocks.len(), 1);
    }

    #[test]
    fn test_unlink_missing_edge_is_noop() {
        let (_dir, graph) = test_graph();
        let zone = graph.zones().create(NewZone::new("Z1")).unwrap();
        let a = graph.memories().create(zone.id, NewMemory::new("a")).unwrap();
        let b = graph.memories().create(zone.id, NewMemory::new("b")).unwrap();

        let removed = graph
            .relations()
            .unlink(zone.id, a.id, b.id, RelationType::References)
            .unwrap();
        assert!(!removed);
    }

    #[test]
    fn test_incompatible_endpoints_do_not_mutate() {
        let (_dir, graph) = test_graph();
        let zone = graph.zones().create(NewZone::new("Z1")).unwrap();
        let plan = graph.plans().create(zone.id, NewPlan::new("P")).unwrap();
        let memory = graph.memories().create(zone.id, NewMemory::new("m")).unwrap();

        let err = graph
            .relations()
            .link(zone.id, memory.id, plan.id, RelationType::PartOf)
            .unwrap_err();
        assert!(matches!(err, GraphError::Validation(_)));

        let rels = graph
            .relations()
            .list_relations(zone.id, plan.id, Direction::Incoming, Some(RelationType::PartOf))
            .unwrap();
        assert!(rels.is_empty());
    }

    #[test]
    fn test_cross_zone_link_is_isolation_violation() {
        let (_dir, graph) = test_graph();
        let z1 = graph.zones().create(NewZone::new("Z1")).unwrap();
        let z2 = graph.zones().create(NewZone::new("Z2")).unwrap();
        let a = graph.memories().create(z1.id, NewMemory::new("a")).unwrap();
        let b = graph.memories().create(z2.id, NewMemory::new("b")).unwrap();

        let err = graph
            .relations()
            .link(z1.id, a.id, b.id, RelationType::RelatesTo)
            .unwrap_err();
        assert!(matches!(err, GraphError::IsolationViolation(_)));
    }

    #[test]
    fn test_self_link_rejected() {
        let (_dir, graph) = test_graph();
        let zone = graph.zones().create(NewZone::new("Z1")).unwrap();
        let a = graph.memories().create(zone.id, NewMemory::new("a")).unwrap();

        let err = graph
            .relations()
            .link(zone.id, a.id, a.id, RelationType::RelatesTo)
            .unwrap_err();
        assert!(matches!(err, GraphError::Validation(_)));
    }

    #[test]
    fn test_structural_edges_cannot_be_unlinked_into_orphans() {
        let (_dir, graph) = test_graph();
        let zone = graph.zones().create(NewZone::new("Z1")).unwrap();
        let plan = graph.plans().create(zone.id, NewPlan::new("P")).unwrap();
        let task = graph.tasks().create(zone.id, NewTask::new("t").in_plan(plan.id)).unwrap();

        let err = graph
            .relations()
            .unlink(zone.id, task.id, plan.id, RelationType::PartOf)
            .unwrap_err();
        assert!(matches!(err, GraphError::Validation(_)));

        let err = graph
            .relations()
            .unlink(zone.id, plan.id, zone.id, RelationType::BelongsTo)
            .unwrap_err();
        assert!(matches!(err, GraphError::Validation(_)));
    }

    #[test]
    fn test_part_of_link_appends_and_unlink_allowed_with_other_plan() {
        let (_dir, graph) = test_graph();
        let zone = graph.zones().create(NewZone::new("Z1")).unwrap();
        let p1 = graph.plans().create(zone.id, NewPlan::new("P1")).unwrap();
        let p2 = graph.plans().create(zone.id, NewPlan::new("P2")).unwrap();
        graph.tasks().create(zone.id, NewTask::new("existing").in_plan(p2.id)).unwrap();
        let task = graph.tasks().create(zone.id, NewTask::new("t").in_plan(p1.id)).unwrap();

        let outcome = graph
            .relations()
            .link(zone.id, task.id, p2.id, RelationType::PartOf)
            .unwrap();
        assert_eq!(outcome.relation.position, Some(2048.0));

        assert!(graph
            .relations()
            .unlink(zone.id, task.id, p1.id, RelationType::PartOf)
            .unwrap());
    }
}
