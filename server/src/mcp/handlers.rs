//! Tool handlers
//!
//! Turns validated tool arguments into graph calls and graph results into
//! JSON. Handlers are synchronous; the server runs them off the async
//! runtime because RocksDB calls block.

use agentmem_graph::{
    Direction, MemoryGraph, MemoryType, MemoryUpdate, NewMemory, NewPlan, NewTask, NewZone,
    NodeFilter, NodeId, PlanUpdate, RelationType, TaskUpdate, ZoneUpdate,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::ToolError;

/// Executes tool calls against one graph
#[derive(Clone)]
pub struct ToolHandler {
    graph: MemoryGraph,
    default_zone: NodeId,
}

/// Arguments of a zone-scoped tool: an optional zone plus the tool's own
/// fields
#[derive(Deserialize)]
struct Scoped<T> {
    #[serde(default)]
    zone_id: Option<NodeId>,
    #[serde(flatten)]
    args: T,
}

#[derive(Deserialize)]
struct ZoneRef {
    zone_id: NodeId,
}

#[derive(Deserialize)]
struct ZoneChange {
    zone_id: NodeId,
    #[serde(flatten)]
    update: ZoneUpdate,
}

#[derive(Deserialize)]
struct MemoryRef {
    memory_id: NodeId,
}

#[derive(Deserialize)]
struct MemoryChange {
    memory_id: NodeId,
    #[serde(flatten)]
    update: MemoryUpdate,
}

#[derive(Deserialize)]
struct PlanRef {
    plan_id: NodeId,
}

#[derive(Deserialize)]
struct PlanChange {
    plan_id: NodeId,
    #[serde(flatten)]
    update: PlanUpdate,
}

#[derive(Deserialize)]
struct TaskRef {
    task_id: NodeId,
}

#[derive(Deserialize)]
struct TaskChange {
    task_id: NodeId,
    #[serde(flatten)]
    update: TaskUpdate,
}

#[derive(Deserialize)]
struct Reorder {
    task_id: NodeId,
    plan_id: NodeId,
    #[serde(default)]
    after_task_id: Option<NodeId>,
}

#[derive(Deserialize)]
struct Edge {
    from_id: NodeId,
    to_id: NodeId,
    #[serde(rename = "type")]
    relation_type: RelationType,
}

#[derive(Deserialize)]
struct EdgeQuery {
    node_id: NodeId,
    #[serde(default)]
    direction: Direction,
    #[serde(default, rename = "type")]
    relation_type: Option<RelationType>,
}

#[derive(Deserialize)]
struct RelatedQuery {
    node_id: NodeId,
    #[serde(default)]
    direction: Direction,
    #[serde(default, rename = "type")]
    relation_type: Option<RelationType>,
    #[serde(default = "default_depth")]
    depth: usize,
}

fn default_depth() -> usize {
    1
}

/// Shared list/search arguments
#[derive(Deserialize, Default)]
struct ListQuery {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    plan_id: Option<NodeId>,
    #[serde(default, rename = "type")]
    memory_type: Option<MemoryType>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    offset: usize,
}

impl ListQuery {
    fn filter(self) -> NodeFilter {
        NodeFilter {
            status: self.status,
            tags: self.tags,
            text: self.query,
            plan_id: self.plan_id,
            memory_type: self.memory_type,
            limit: self.limit,
            offset: self.offset,
        }
    }
}

impl ToolHandler {
    pub fn new(graph: MemoryGraph, default_zone: NodeId) -> Self {
        Self {
            graph,
            default_zone,
        }
    }

    pub fn graph(&self) -> &MemoryGraph {
        &self.graph
    }

    pub fn default_zone(&self) -> NodeId {
        self.default_zone
    }

    /// Run one tool. The name must be a catalog entry and `args` must already
    /// have passed schema validation.
    pub fn call(&self, name: &str, args: Map<String, Value>) -> Result<Value, ToolError> {
        let args = Value::Object(args);
        let graph = &self.graph;

        match name {
            // Zones
            "create_zone" => to_json(graph.zones().create(parse::<NewZone>(args)?)?),
            "get_zone" => {
                let ZoneRef { zone_id } = parse(args)?;
                to_json(graph.zones().get(zone_id)?)
            }
            "list_zones" => {
                let zones = graph.zones().list(&parse::<ListQuery>(args)?.filter())?;
                Ok(json!({ "count": zones.len(), "zones": zones }))
            }
            "update_zone" => {
                let ZoneChange { zone_id, update } = parse(args)?;
                to_json(graph.zones().update(zone_id, update)?)
            }
            "delete_zone" => {
                let ZoneRef { zone_id } = parse(args)?;
                if zone_id == self.default_zone {
                    return Err(ToolError::validation(format!(
                        "zone {} is the server's default zone and cannot be deleted",
                        zone_id
                    )));
                }
                graph.zones().delete(zone_id)?;
                Ok(deleted(zone_id))
            }

            // Memories
            "add_memory" => {
                let (zone, input) = self.scoped::<NewMemory>(args)?;
                to_json(graph.memories().create(zone, input)?)
            }
            "get_memory" => {
                let (zone, MemoryRef { memory_id }) = self.scoped(args)?;
                to_json(graph.memories().get(zone, memory_id)?)
            }
            "update_memory" => {
                let (zone, MemoryChange { memory_id, update }) = self.scoped(args)?;
                to_json(graph.memories().update(zone, memory_id, update)?)
            }
            "delete_memory" => {
                let (zone, MemoryRef { memory_id }) = self.scoped(args)?;
                graph.memories().delete(zone, memory_id)?;
                Ok(deleted(memory_id))
            }
            "search_memories" => {
                let (zone, query) = self.scoped::<ListQuery>(args)?;
                let memories = graph.memories().list(zone, &query.filter())?;
                Ok(json!({ "count": memories.len(), "memories": memories }))
            }

            // Plans
            "create_plan" => {
                let (zone, input) = self.scoped::<NewPlan>(args)?;
                to_json(graph.plans().create(zone, input)?)
            }
            "get_plan" => {
                let (zone, PlanRef { plan_id }) = self.scoped(args)?;
                to_json(graph.plans().get(zone, plan_id)?)
            }
            "update_plan" => {
                let (zone, PlanChange { plan_id, update }) = self.scoped(args)?;
                to_json(graph.plans().update(zone, plan_id, update)?)
            }
            "delete_plan" => {
                let (zone, PlanRef { plan_id }) = self.scoped(args)?;
                to_json(graph.plans().delete(zone, plan_id)?)
            }
            "list_plans" => {
                let (zone, query) = self.scoped::<ListQuery>(args)?;
                let plans = graph.plans().list(zone, &query.filter())?;
                Ok(json!({ "count": plans.len(), "plans": plans }))
            }

            // Tasks
            "create_task" => {
                let (zone, input) = self.scoped::<NewTask>(args)?;
                to_json(graph.tasks().create(zone, input)?)
            }
            "get_task" => {
                let (zone, TaskRef { task_id }) = self.scoped(args)?;
                to_json(graph.tasks().get(zone, task_id)?)
            }
            "update_task" => {
                let (zone, TaskChange { task_id, update }) = self.scoped(args)?;
                to_json(graph.tasks().update(zone, task_id, update)?)
            }
            "delete_task" => {
                let (zone, TaskRef { task_id }) = self.scoped(args)?;
                graph.tasks().delete(zone, task_id)?;
                Ok(deleted(task_id))
            }
            "list_tasks" => {
                let (zone, query) = self.scoped::<ListQuery>(args)?;
                let tasks = graph.tasks().list(zone, &query.filter())?;
                Ok(json!({ "count": tasks.len(), "tasks": tasks }))
            }
            "reorder_task" => {
                let (zone, reorder) = self.scoped::<Reorder>(args)?;
                to_json(graph.tasks().reorder(
                    zone,
                    reorder.task_id,
                    reorder.plan_id,
                    reorder.after_task_id,
                )?)
            }

            // Relationships
            "create_relationship" => {
                let (zone, edge) = self.scoped::<Edge>(args)?;
                to_json(
                    graph
                        .relations()
                        .link(zone, edge.from_id, edge.to_id, edge.relation_type)?,
                )
            }
            "delete_relationship" => {
                let (zone, edge) = self.scoped::<Edge>(args)?;
                let removed =
                    graph
                        .relations()
                        .unlink(zone, edge.from_id, edge.to_id, edge.relation_type)?;
                Ok(json!({ "removed": removed }))
            }
            "list_relationships" => {
                let (zone, query) = self.scoped::<EdgeQuery>(args)?;
                let relationships = graph.relations().list_relations(
                    zone,
                    query.node_id,
                    query.direction,
                    query.relation_type,
                )?;
                Ok(json!({ "count": relationships.len(), "relationships": relationships }))
            }
            "get_related" => {
                let (zone, query) = self.scoped::<RelatedQuery>(args)?;
                let related = graph.traversal().get_related(
                    zone,
                    query.node_id,
                    query.relation_type,
                    query.direction,
                    query.depth,
                )?;
                Ok(json!({ "count": related.len(), "related": related }))
            }

            "memory_stats" => {
                let stats = graph.stats()?;
                let mut value = serde_json::to_value(stats)?;
                value["defaultZoneId"] = json!(self.default_zone);
                Ok(value)
            }

            other => Err(ToolError::validation(format!("unknown tool '{}'", other))),
        }
    }

    /// Split off `zone_id`, falling back to the default zone
    fn scoped<T: DeserializeOwned>(&self, args: Value) -> Result<(NodeId, T), ToolError> {
        let Scoped { zone_id, args } = parse::<Scoped<T>>(args)?;
        Ok((zone_id.unwrap_or(self.default_zone), args))
    }
}

fn parse<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    Ok(serde_json::from_value(args)?)
}

fn to_json<T: Serialize>(value: T) -> Result<Value, ToolError> {
    Ok(serde_json::to_value(value)?)
}

fn deleted(id: NodeId) -> Value {
    json!({ "deleted": true, "id": id })
}
