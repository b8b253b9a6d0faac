//! Breadth-first neighbourhood queries
//!
//! A traversal starts at one node and expands edges level by level. Each node
//! is reported once, at the shallowest depth it was reached, so cycles
//! terminate. Nothing outside the caller's zone is ever reported or expanded.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use crate::error::{GraphError, Result};
use crate::node::{Node, NodeId};
use crate::relations::scoped_neighbor;
use crate::relationship::{Direction, RelationType};
use crate::repository::hydrate_task;
use crate::store::Connection;

/// Deepest level a traversal may reach; larger requests are clamped
pub const MAX_TRAVERSAL_DEPTH: usize = 10;

/// A node reached by a traversal
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedNode {
    pub node: Node,
    /// Type of the edge that discovered the node
    pub relation_type: RelationType,
    /// Direction of that edge relative to the node being expanded
    pub direction: Direction,
    pub depth: usize,
}

#[derive(Clone)]
pub struct TraversalEngine {
    conn: Arc<Connection>,
}

impl TraversalEngine {
    pub fn new(conn: Arc<Connection>) -> Self {
        Self { conn }
    }

    /// Nodes reachable from `start` within `depth` hops, shallowest first.
    ///
    /// An unknown or out-of-scope start yields an empty result.
    pub fn get_related(
        &self,
        scope: NodeId,
        start: NodeId,
        relation_type: Option<RelationType>,
        direction: Direction,
        depth: usize,
    ) -> Result<Vec<RelatedNode>> {
        if depth == 0 {
            return Err(GraphError::validation("depth must be at least 1"));
        }
        let depth = depth.min(MAX_TRAVERSAL_DEPTH);

        if scoped_neighbor(&self.conn, start, scope)?.is_none() {
            return Ok(Vec::new());
        }

        let mut visited = HashSet::from([start]);
        let mut frontier = vec![start];
        let mut related = Vec::new();

        for level in 1..=depth {
            let mut next = Vec::new();

            for id in frontier {
                for (neighbor, edge_type, edge_direction) in
                    self.expand(id, relation_type, direction)?
                {
                    if !visited.insert(neighbor) {
                        continue;
                    }
                    let node = match scoped_neighbor(&self.conn, neighbor, scope)? {
                        Some(Node::Task(task)) => Node::Task(hydrate_task(&self.conn, task)?),
                        Some(node) => node,
                        None => continue,
                    };
                    related.push(RelatedNode {
                        node,
                        relation_type: edge_type,
                        direction: edge_direction,
                        depth: level,
                    });
                    next.push(neighbor);
                }
            }

            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        log::debug!(
            "Traversal from {} reached {} node(s) within depth {}",
            start,
            related.len(),
            depth
        );
        Ok(related)
    }

    fn expand(
        &self,
        id: NodeId,
        relation_type: Option<RelationType>,
        direction: Direction,
    ) -> Result<Vec<(NodeId, RelationType, Direction)>> {
        let mut edges = Vec::new();
        if direction.includes_outgoing() {
            for edge in self.conn.edges_from(id, relation_type)? {
                edges.push((edge.to, edge.relation_type, Direction::Outgoing));
            }
        }
        if direction.includes_incoming() {
            for edge in self.conn.edges_to(id, relation_type)? {
                edges.push((edge.from, edge.relation_type, Direction::Incoming));
            }
        }
        Ok(edges)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::node::{NewMemory, NewPlan, NewTask, NewZone, PlanStatus};
    use crate::test_support::test_graph;

    #[test]
    fn test_cycle_terminates_and_emits_once() {
        let (_dir, graph) = test_graph();
        let zone = graph.zones().create(NewZone::new("Z1")).unwrap();
        let a = graph.memories().create(zone.id, NewMemory::new("A")).unwrap();
        let b = graph.memories().create(zone.id, NewMemory::new("B")).unwrap();
        let c = graph.memories().create(zone.id, NewMemory::new("C")).unwrap();
        for (from, to) in [(a.id, b.id), (b.id, c.id), (c.id, a.id)] {
            graph
                .relations()
                .link(zone.id, from, to, RelationType::RelatesTo)
                .unwrap();
        }

        let related = graph
            .traversal()
            .get_related(zone.id, a.id, Some(RelationType::RelatesTo), Direction::Outgoing, 5)
            .unwrap();
        let ids: Vec<_> = related.iter().map(|r| r.node.id()).collect();
        assert_eq!(ids, vec![b.id, c.id]);
        assert_eq!(related[0].depth, 1);
        assert_eq!(related[1].depth, 2);

        let both = graph
            .traversal()
            .get_related(zone.id, a.id, None, Direction::Both, 5)
            .unwrap();
        let unique: HashSet<_> = both.iter().map(|r| r.node.id()).collect();
        assert_eq!(unique.len(), both.len());
        assert!(!unique.contains(&a.id));
    }

    #[test]
    fn test_requested_depth_is_capped() {
        let (_dir, graph) = test_graph();
        let zone = graph.zones().create(NewZone::new("Z1")).unwrap();
        let chain: Vec<_> = (0..15)
            .map(|i| {
                graph
                    .memories()
                    .create(zone.id, NewMemory::new(format!("link {}", i)))
                    .unwrap()
            })
            .collect();
        for pair in chain.windows(2) {
            graph
                .relations()
                .link(zone.id, pair[0].id, pair[1].id, RelationType::RelatesTo)
                .unwrap();
        }

        let related = graph
            .traversal()
            .get_related(zone.id, chain[0].id, None, Direction::Outgoing, 50)
            .unwrap();
        assert_eq!(related.len(), MAX_TRAVERSAL_DEPTH);
        assert_eq!(related.iter().map(|r| r.depth).max(), Some(MAX_TRAVERSAL_DEPTH));
        assert_eq!(related.last().unwrap().node.id(), chain[MAX_TRAVERSAL_DEPTH].id);
    }

    #[test]
    fn test_depth_zero_rejected() {
        let (_dir, graph) = test_graph();
        let zone = graph.zones().create(NewZone::new("Z1")).unwrap();
        let a = graph.memories().create(zone.id, NewMemory::new("A")).unwrap();
        let err = graph
            .traversal()
            .get_related(zone.id, a.id, None, Direction::Both, 0)
            .unwrap_err();
        assert!(matches!(err, GraphError::Validation(_)));
    }

    #[test]
    fn test_unknown_or_foreign_start_is_empty() {
        let (_dir, graph) = test_graph();
        let z1 = graph.zones().create(NewZone::new("Z1")).unwrap();
        let z2 = graph.zones().create(NewZone::new("Z2")).unwrap();
        let a = graph.memories().create(z1.id, NewMemory::new("A")).unwrap();

        assert!(graph
            .traversal()
            .get_related(z1.id, NodeId::new(), None, Direction::Both, 2)
            .unwrap()
            .is_empty());
        assert!(graph
            .traversal()
            .get_related(z2.id, a.id, None, Direction::Both, 2)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_dependency_lookup_and_delete() {
        let (_dir, graph) = test_graph();
        let zone = graph.zones().create(NewZone::new("Z1")).unwrap();
        let plan = graph
            .plans()
            .create(zone.id, NewPlan::new("Payments").status(PlanStatus::Draft))
            .unwrap();
        let gateway = graph
            .tasks()
            .create(zone.id, NewTask::new("Integrate gateway").in_plan(plan.id))
            .unwrap();
        let tests = graph
            .tasks()
            .create(zone.id, NewTask::new("Write tests").in_plan(plan.id))
            .unwrap();
        graph
            .relations()
            .link(zone.id, tests.id, gateway.id, RelationType::DependsOn)
            .unwrap();

        let deps = graph
            .traversal()
            .get_related(zone.id, tests.id, Some(RelationType::DependsOn), Direction::Outgoing, 1)
            .unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].node.id(), gateway.id);
        assert_eq!(deps[0].direction, Direction::Outgoing);
        match &deps[0].node {
            Node::Task(task) => assert_eq!(task.position, 1024.0),
            other => panic!("expected a task, got {:?}", other.kind()),
        }

        graph.tasks().delete(zone.id, gateway.id).unwrap();
        assert!(graph
            .traversal()
            .get_related(zone.id, tests.id, Some(RelationType::DependsOn), Direction::Outgoing, 1)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_incoming_reports_direction() {
        let (_dir, graph) = test_graph();
        let zone = graph.zones().create(NewZone::new("Z1")).unwrap();
        let plan = graph.plans().create(zone.id, NewPlan::new("P")).unwrap();
        let task = graph.tasks().create(zone.id, NewTask::new("t").in_plan(plan.id)).unwrap();

        let members = graph
            .traversal()
            .get_related(zone.id, plan.id, Some(RelationType::PartOf), Direction::Incoming, 1)
            .unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].node.id(), task.id);
        assert_eq!(members[0].direction, Direction::Incoming);
        assert_eq!(members[0].relation_type, RelationType::PartOf);
    }
}
