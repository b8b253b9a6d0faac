use std::sync::Arc;

use chrono::{Duration, Utc};

use super::{load_scoped, outside_scope, sort_newest_first, NodeFilter};
use crate::error::{GraphError, Result};
use crate::node::{
    normalize_tags, require_text, NewTask, Node, NodeId, NodeKind, Task, TaskStatus, TaskUpdate,
};
use crate::position;
use crate::relations::RelationshipEngine;
use crate::relationship::{EdgeRecord, RelationType};
use crate::store::{Connection, StoredEdge};

#[derive(Clone)]
pub struct TaskRepository {
    conn: Arc<Connection>,
    relations: RelationshipEngine,
}

impl TaskRepository {
    pub fn new(conn: Arc<Connection>, relations: RelationshipEngine) -> Self {
        Self { conn, relations }
    }

    /// Create a task and append it to every plan in `input.plan_ids` that
    /// resolves inside `scope`
    pub fn create(&self, scope: NodeId, input: NewTask) -> Result<Task> {
        let content = require_text("content", &input.content)?;

        let mut plan_ids: Vec<NodeId> = Vec::with_capacity(input.plan_ids.len());
        for id in input.plan_ids {
            if !plan_ids.contains(&id) {
                plan_ids.push(id);
            }
        }

        let _guard = self.conn.write_guard();

        let mut memberships = Vec::new();
        for plan_id in plan_ids {
            match self.conn.get_node(plan_id)? {
                Some(Node::Plan(plan)) if plan.zone_id == scope => {
                    memberships.push((plan.id, self.relations.next_position(plan.id)?));
                }
                _ => log::warn!("Skipping plan {}: not found in zone {}", plan_id, scope),
            }
        }
        let Some(&(_, first_position)) = memberships.first() else {
            return Err(GraphError::validation(
                "a task needs at least one plan in its zone",
            ));
        };

        let now = Utc::now();
        let task = Task {
            id: NodeId::new(),
            zone_id: scope,
            content,
            status: input.status.unwrap_or_default(),
            position: first_position,
            tags: normalize_tags(&input.tags),
            metadata: input.metadata,
            created_at: now,
            updated_at: now,
        };

        // Edge timestamps follow the order the plans were given in, so the
        // first resolved plan stays the primary one.
        let mut batch = self.conn.batch();
        batch.put_node(&Node::Task(task.clone()))?;
        for (offset, (plan_id, position)) in memberships.iter().enumerate() {
            let record = EdgeRecord {
                created_at: now + Duration::microseconds(offset as i64),
                position: Some(*position),
            };
            batch.put_edge(task.id, *plan_id, RelationType::PartOf, &record)?;
        }
        batch.commit()?;

        log::debug!(
            "Created task {} in {} plan(s) of zone {}",
            task.id,
            memberships.len(),
            scope
        );
        Ok(task)
    }

    pub fn get(&self, scope: NodeId, id: NodeId) -> Result<Option<Task>> {
        match self.conn.get_node(id)? {
            Some(Node::Task(task)) if task.zone_id == scope => {
                Ok(Some(hydrate_task(&self.conn, task)?))
            }
            _ => Ok(None),
        }
    }

    /// Apply the supplied fields only. A new `position` is written to the
    /// membership in `plan_id`, or in the task's primary plan if omitted.
    pub fn update(&self, scope: NodeId, id: NodeId, update: TaskUpdate) -> Result<Task> {
        if update.plan_id.is_some() && update.position.is_none() {
            return Err(GraphError::validation(
                "plan_id only selects the plan a new position applies to; supply position too",
            ));
        }

        let _guard = self.conn.write_guard();
        let mut task = self.load_for_write(scope, id)?;

        if let Some(content) = update.content {
            task.content = require_text("content", &content)?;
        }
        if let Some(status) = update.status {
            task.status = status;
        }
        if let Some(tags) = update.tags {
            task.tags = normalize_tags(&tags);
        }
        if let Some(metadata) = update.metadata {
            task.metadata = metadata;
        }
        task.updated_at = Utc::now();

        let mut batch = self.conn.batch();

        if let Some(new_position) = update.position {
            if !new_position.is_finite() {
                return Err(GraphError::validation("position must be a finite number"));
            }
            let membership = match update.plan_id {
                Some(plan_id) => self.membership(id, plan_id)?,
                None => primary_membership(&self.conn, id)?
                    .ok_or_else(|| GraphError::validation(format!("task {} has no plan", id)))?,
            };

            let collides = self
                .conn
                .edges_to(membership.to, Some(RelationType::PartOf))?
                .iter()
                .any(|e| e.from != id && e.record.position == Some(new_position));
            if collides {
                return Err(GraphError::validation(format!(
                    "position {} is already taken in plan {}",
                    new_position, membership.to
                )));
            }

            let record = membership.record.clone().with_position(new_position);
            batch.put_edge(id, membership.to, RelationType::PartOf, &record)?;
        }

        batch.put_node(&Node::Task(task.clone()))?;
        batch.commit()?;

        hydrate_task(&self.conn, task)
    }

    /// Delete a task together with every edge touching it
    pub fn delete(&self, scope: NodeId, id: NodeId) -> Result<()> {
        let _guard = self.conn.write_guard();
        let task = self.load_for_write(scope, id)?;

        let mut batch = self.conn.batch();
        let removed = self.relations.detach_node(&mut batch, id)?;
        batch.delete_node(&Node::Task(task))?;
        batch.commit()?;

        log::debug!("Deleted task {} and {} edge(s)", id, removed);
        Ok(())
    }

    /// With `plan_id` set: that plan's tasks by position, each reporting its
    /// position in that plan. Otherwise every task in the zone, newest first.
    pub fn list(&self, scope: NodeId, filter: &NodeFilter) -> Result<Vec<Task>> {
        let status = filter
            .status
            .as_deref()
            .map(str::parse::<TaskStatus>)
            .transpose()?;
        let status = status.map(|s| s.as_str());

        let tasks = match filter.plan_id {
            Some(plan_id) => self.list_in_plan(scope, plan_id, filter, status)?,
            None => {
                let mut nodes = load_scoped(&self.conn, scope, NodeKind::Task)?;
                nodes.retain(|n| filter.matches(n, status));
                sort_newest_first(&mut nodes);
                let mut tasks = Vec::with_capacity(nodes.len());
                for node in nodes {
                    if let Node::Task(task) = node {
                        tasks.push(hydrate_task(&self.conn, task)?);
                    }
                }
                tasks
            }
        };

        Ok(filter.paginate(tasks))
    }

    pub fn search(&self, scope: NodeId, query: &str, filter: &NodeFilter) -> Result<Vec<Task>> {
        let filter = NodeFilter {
            text: Some(query.to_string()),
            ..filter.clone()
        };
        self.list(scope, &filter)
    }

    /// Move `task_id` directly after `after` inside `plan_id`, or to the front
    /// when `after` is `None`. Siblings keep their positions unless the gap
    /// is too narrow to split, in which case the plan is renumbered.
    pub fn reorder(
        &self,
        scope: NodeId,
        task_id: NodeId,
        plan_id: NodeId,
        after: Option<NodeId>,
    ) -> Result<Task> {
        if after == Some(task_id) {
            return Err(GraphError::validation("cannot place a task after itself"));
        }

        let _guard = self.conn.write_guard();
        let mut task = self.load_for_write(scope, task_id)?;
        match self.conn.get_node(plan_id)? {
            Some(Node::Plan(plan)) if plan.zone_id == scope => {}
            Some(node @ Node::Plan(_)) => return Err(outside_scope(&node, scope)),
            _ => return Err(GraphError::not_found(format!("plan {}", plan_id))),
        }
        let membership = self.membership(task_id, plan_id)?;

        let mut siblings: Vec<StoredEdge> = self
            .conn
            .edges_to(plan_id, Some(RelationType::PartOf))?
            .into_iter()
            .filter(|e| e.from != task_id)
            .collect();
        sort_by_position(&mut siblings);

        let index = match after {
            None => 0,
            Some(anchor) => {
                siblings
                    .iter()
                    .position(|e| e.from == anchor)
                    .ok_or_else(|| {
                        GraphError::validation(format!("task {} is not in plan {}", anchor, plan_id))
                    })?
                    + 1
            }
        };

        let before = index
            .checked_sub(1)
            .and_then(|i| siblings.get(i))
            .and_then(|e| e.record.position);
        let next = siblings.get(index).and_then(|e| e.record.position);

        let mut batch = self.conn.batch();
        match position::between(before, next) {
            Some(new_position) => {
                let record = membership.record.with_position(new_position);
                batch.put_edge(task_id, plan_id, RelationType::PartOf, &record)?;
            }
            None => {
                log::debug!("Renumbering {} task(s) in plan {}", siblings.len() + 1, plan_id);
                siblings.insert(index, membership);
                for (edge, new_position) in siblings.iter().zip(position::spaced(siblings.len())) {
                    let record = edge.record.clone().with_position(new_position);
                    batch.put_edge(edge.from, plan_id, RelationType::PartOf, &record)?;
                }
            }
        }

        task.updated_at = Utc::now();
        batch.put_node(&Node::Task(task.clone()))?;
        batch.commit()?;

        hydrate_task(&self.conn, task)
    }

    fn list_in_plan(
        &self,
        scope: NodeId,
        plan_id: NodeId,
        filter: &NodeFilter,
        status: Option<&str>,
    ) -> Result<Vec<Task>> {
        match self.conn.get_node(plan_id)? {
            Some(Node::Plan(plan)) if plan.zone_id == scope => {}
            _ => return Ok(Vec::new()),
        }

        let mut memberships = self.conn.edges_to(plan_id, Some(RelationType::PartOf))?;
        sort_by_position(&mut memberships);

        let mut tasks = Vec::with_capacity(memberships.len());
        for edge in memberships {
            let Some(Node::Task(mut task)) = self.conn.get_node(edge.from)? else {
                log::warn!("PART_OF edge into plan {} from missing task {}", plan_id, edge.from);
                continue;
            };
            if task.zone_id != scope {
                continue;
            }
            if let Some(position) = edge.record.position {
                task.position = position;
            }
            let node = Node::Task(task);
            if filter.matches(&node, status) {
                if let Node::Task(task) = node {
                    tasks.push(task);
                }
            }
        }
        Ok(tasks)
    }

    fn membership(&self, task_id: NodeId, plan_id: NodeId) -> Result<StoredEdge> {
        match self.conn.get_edge(task_id, plan_id, RelationType::PartOf)? {
            Some(record) => Ok(StoredEdge {
                from: task_id,
                to: plan_id,
                relation_type: RelationType::PartOf,
                record,
            }),
            None => Err(GraphError::validation(format!(
                "task {} is not part of plan {}",
                task_id, plan_id
            ))),
        }
    }

    fn load_for_write(&self, scope: NodeId, id: NodeId) -> Result<Task> {
        match self.conn.get_node(id)? {
            Some(Node::Task(task)) if task.zone_id == scope => Ok(task),
            Some(node @ Node::Task(_)) => Err(outside_scope(&node, scope)),
            _ => Err(GraphError::not_found(format!("task {}", id))),
        }
    }
}

/// The membership a task was created under: its oldest PART_OF edge
fn primary_membership(conn: &Connection, task_id: NodeId) -> Result<Option<StoredEdge>> {
    Ok(conn
        .edges_from(task_id, Some(RelationType::PartOf))?
        .into_iter()
        .min_by(|a, b| {
            a.record
                .created_at
                .cmp(&b.record.created_at)
                .then_with(|| a.to.cmp(&b.to))
        }))
}

/// Report the position held in the task's primary plan
pub(crate) fn hydrate_task(conn: &Connection, mut task: Task) -> Result<Task> {
    if let Some(position) = primary_membership(conn, task.id)?.and_then(|e| e.record.position) {
        task.position = position;
    }
    Ok(task)
}

fn sort_by_position(edges: &mut [StoredEdge]) {
    edges.sort_by(|a, b| {
        let pa = a.record.position.unwrap_or(f64::MAX);
        let pb = b.record.position.unwrap_or(f64::MAX);
        pa.total_cmp(&pb).then_with(|| a.from.cmp(&b.from))
    });
}
