//! MCP Tool Definitions
//!
//! Declares every AgentMem tool with its input schema. Arguments are checked
//! against these schemas before any handler runs.

use super::protocol::{PropertySchema, Tool, ToolInputSchema};
use agentmem_graph::repository::MAX_LIMIT;
use agentmem_graph::{
    Direction, MemoryType, PlanStatus, RelationType, TaskStatus, MAX_TRAVERSAL_DEPTH,
};
use std::collections::HashMap;

/// Get all available AgentMem tools
pub fn get_all_tools() -> Vec<Tool> {
    vec![
        // Zone Tools (5)
        create_zone_tool(),
        get_zone_tool(),
        list_zones_tool(),
        update_zone_tool(),
        delete_zone_tool(),
        // Memory Tools (5)
        add_memory_tool(),
        get_memory_tool(),
        update_memory_tool(),
        delete_memory_tool(),
        search_memories_tool(),
        // Plan Tools (5)
        create_plan_tool(),
        get_plan_tool(),
        update_plan_tool(),
        delete_plan_tool(),
        list_plans_tool(),
        // Task Tools (6)
        create_task_tool(),
        get_task_tool(),
        update_task_tool(),
        delete_task_tool(),
        list_tasks_tool(),
        reorder_task_tool(),
        // Relationship Tools (4)
        create_relationship_tool(),
        delete_relationship_tool(),
        list_relationships_tool(),
        get_related_tool(),
        // Stats (1)
        memory_stats_tool(),
    ]
}

/// Look up one tool by name
pub fn find_tool(name: &str) -> Option<Tool> {
    get_all_tools().into_iter().find(|t| t.name == name)
}

fn prop(property_type: &str, description: &str) -> PropertySchema {
    PropertySchema {
        property_type: property_type.to_string(),
        description: Some(description.to_string()),
        default: None,
        enum_values: None,
        items: None,
        minimum: None,
        maximum: None,
    }
}

fn string_prop(description: &str) -> PropertySchema {
    prop("string", description)
}

fn number_prop(description: &str) -> PropertySchema {
    prop("number", description)
}

fn integer_prop(description: &str, min: f64, max: Option<f64>, default: Option<u64>) -> PropertySchema {
    PropertySchema {
        minimum: Some(min),
        maximum: max,
        default: default.map(|v| serde_json::json!(v)),
        ..prop("integer", description)
    }
}

fn enum_prop(description: &str, values: &[&str], default: Option<&str>) -> PropertySchema {
    PropertySchema {
        default: default.map(|v| serde_json::json!(v)),
        enum_values: Some(values.iter().map(|s| s.to_string()).collect()),
        ..prop("string", description)
    }
}

fn array_prop(description: &str, item_type: &str) -> PropertySchema {
    PropertySchema {
        items: Some(Box::new(PropertySchema {
            property_type: item_type.to_string(),
            description: None,
            default: None,
            enum_values: None,
            items: None,
            minimum: None,
            maximum: None,
        })),
        ..prop("array", description)
    }
}

fn object_prop(description: &str) -> PropertySchema {
    prop("object", description)
}

fn tool(
    name: &str,
    description: &str,
    properties: HashMap<String, PropertySchema>,
    required: &[&str],
) -> Tool {
    Tool {
        name: name.to_string(),
        description: Some(description.to_string()),
        input_schema: ToolInputSchema {
            schema_type: "object".to_string(),
            properties: Some(properties),
            required: Some(required.iter().map(|s| s.to_string()).collect()),
            additional_properties: false,
        },
    }
}

/// Properties every zone-scoped tool accepts
fn scoped_properties() -> HashMap<String, PropertySchema> {
    let mut properties = HashMap::new();
    properties.insert(
        "zone_id".to_string(),
        string_prop("Zone to operate in (defaults to the server's default zone)"),
    );
    properties
}

fn insert_tags_and_metadata(properties: &mut HashMap<String, PropertySchema>) {
    properties.insert(
        "tags".to_string(),
        array_prop("Tags; replaces the existing set when updating", "string"),
    );
    properties.insert(
        "metadata".to_string(),
        object_prop("Free-form key/value metadata, stored unchanged"),
    );
}

fn insert_paging(properties: &mut HashMap<String, PropertySchema>) {
    properties.insert(
        "limit".to_string(),
        integer_prop(
            "Maximum number of results (default: 50)",
            1.0,
            Some(MAX_LIMIT as f64),
            Some(50),
        ),
    );
    properties.insert(
        "offset".to_string(),
        integer_prop("Number of results to skip", 0.0, None, Some(0)),
    );
}

fn insert_filters(properties: &mut HashMap<String, PropertySchema>) {
    properties.insert(
        "query".to_string(),
        string_prop("Case-insensitive text or keywords to match"),
    );
    properties.insert(
        "tags".to_string(),
        array_prop("Only return nodes carrying all of these tags", "string"),
    );
    insert_paging(properties);
}

// === Zone Tools ===

fn create_zone_tool() -> Tool {
    let mut properties = HashMap::new();
    properties.insert("name".to_string(), string_prop("Unique zone name"));
    properties.insert("description".to_string(), string_prop("What the zone is for"));
    insert_tags_and_metadata(&mut properties);
    tool(
        "create_zone",
        "Create a zone, the isolation boundary for plans, tasks and memories.",
        properties,
        &["name"],
    )
}

fn get_zone_tool() -> Tool {
    let mut properties = HashMap::new();
    properties.insert("zone_id".to_string(), string_prop("Zone id"));
    tool("get_zone", "Get a zone by id.", properties, &["zone_id"])
}

fn list_zones_tool() -> Tool {
    let mut properties = HashMap::new();
    insert_filters(&mut properties);
    tool(
        "list_zones",
        "List zones, newest first, optionally filtered by text or tags.",
        properties,
        &[],
    )
}

fn update_zone_tool() -> Tool {
    let mut properties = HashMap::new();
    properties.insert("zone_id".to_string(), string_prop("Zone id"));
    properties.insert("name".to_string(), string_prop("New unique name"));
    properties.insert("description".to_string(), string_prop("New description"));
    insert_tags_and_metadata(&mut properties);
    tool(
        "update_zone",
        "Update a zone. Only supplied fields change.",
        properties,
        &["zone_id"],
    )
}

fn delete_zone_tool() -> Tool {
    let mut properties = HashMap::new();
    properties.insert("zone_id".to_string(), string_prop("Zone id"));
    tool(
        "delete_zone",
        "Delete an empty zone. Zones that still own plans, tasks or memories are refused.",
        properties,
        &["zone_id"],
    )
}

// === Memory Tools ===

fn add_memory_tool() -> Tool {
    let mut properties = scoped_properties();
    properties.insert("content".to_string(), string_prop("The knowledge to remember"));
    properties.insert(
        "type".to_string(),
        enum_prop("Kind of memory", MemoryType::VALUES, Some("Memory")),
    );
    insert_tags_and_metadata(&mut properties);
    tool(
        "add_memory",
        "Store a memory in a zone.",
        properties,
        &["content"],
    )
}

fn get_memory_tool() -> Tool {
    let mut properties = scoped_properties();
    properties.insert("memory_id".to_string(), string_prop("Memory id"));
    tool("get_memory", "Get a memory by id.", properties, &["memory_id"])
}

fn update_memory_tool() -> Tool {
    let mut properties = scoped_properties();
    properties.insert("memory_id".to_string(), string_prop("Memory id"));
    properties.insert("content".to_string(), string_prop("New content"));
    properties.insert(
        "type".to_string(),
        enum_prop("New kind of memory", MemoryType::VALUES, None),
    );
    insert_tags_and_metadata(&mut properties);
    tool(
        "update_memory",
        "Update a memory. Only supplied fields change.",
        properties,
        &["memory_id"],
    )
}

fn delete_memory_tool() -> Tool {
    let mut properties = scoped_properties();
    properties.insert("memory_id".to_string(), string_prop("Memory id"));
    tool(
        "delete_memory",
        "Delete a memory and every relationship touching it.",
        properties,
        &["memory_id"],
    )
}

fn search_memories_tool() -> Tool {
    let mut properties = scoped_properties();
    insert_filters(&mut properties);
    properties.insert(
        "type".to_string(),
        enum_prop("Only return memories of this kind", MemoryType::VALUES, None),
    );
    tool(
        "search_memories",
        "Search memories in a zone by text, tags and type, newest first.",
        properties,
        &[],
    )
}

// === Plan Tools ===

fn create_plan_tool() -> Tool {
    let mut properties = scoped_properties();
    properties.insert("name".to_string(), string_prop("Plan name"));
    properties.insert("description".to_string(), string_prop("Plan description"));
    properties.insert(
        "status".to_string(),
        enum_prop("Initial status", PlanStatus::VALUES, Some("draft")),
    );
    insert_tags_and_metadata(&mut properties);
    tool("create_plan", "Create a plan in a zone.", properties, &["name"])
}

fn get_plan_tool() -> Tool {
    let mut properties = scoped_properties();
    properties.insert("plan_id".to_string(), string_prop("Plan id"));
    tool("get_plan", "Get a plan by id.", properties, &["plan_id"])
}

fn update_plan_tool() -> Tool {
    let mut properties = scoped_properties();
    properties.insert("plan_id".to_string(), string_prop("Plan id"));
    properties.insert("name".to_string(), string_prop("New name"));
    properties.insert("description".to_string(), string_prop("New description"));
    properties.insert(
        "status".to_string(),
        enum_prop("New status", PlanStatus::VALUES, None),
    );
    insert_tags_and_metadata(&mut properties);
    tool(
        "update_plan",
        "Update a plan. Only supplied fields change.",
        properties,
        &["plan_id"],
    )
}

fn delete_plan_tool() -> Tool {
    let mut properties = scoped_properties();
    properties.insert("plan_id".to_string(), string_prop("Plan id"));
    tool(
        "delete_plan",
        "Delete a plan. Tasks that belong to no other plan are deleted with it.",
        properties,
        &["plan_id"],
    )
}

fn list_plans_tool() -> Tool {
    let mut properties = scoped_properties();
    insert_filters(&mut properties);
    properties.insert(
        "status".to_string(),
        enum_prop("Only return plans with this status", PlanStatus::VALUES, None),
    );
    tool(
        "list_plans",
        "List plans in a zone, newest first.",
        properties,
        &[],
    )
}

// === Task Tools ===

fn create_task_tool() -> Tool {
    let mut properties = scoped_properties();
    properties.insert("content".to_string(), string_prop("What needs doing"));
    properties.insert(
        "plan_ids".to_string(),
        array_prop("Plans the task is part of; it is appended to each", "string"),
    );
    properties.insert(
        "status".to_string(),
        enum_prop("Initial status", TaskStatus::VALUES, Some("pending")),
    );
    insert_tags_and_metadata(&mut properties);
    tool(
        "create_task",
        "Create a task and append it to one or more plans.",
        properties,
        &["content", "plan_ids"],
    )
}

fn get_task_tool() -> Tool {
    let mut properties = scoped_properties();
    properties.insert("task_id".to_string(), string_prop("Task id"));
    tool("get_task", "Get a task by id.", properties, &["task_id"])
}

fn update_task_tool() -> Tool {
    let mut properties = scoped_properties();
    properties.insert("task_id".to_string(), string_prop("Task id"));
    properties.insert("content".to_string(), string_prop("New content"));
    properties.insert(
        "status".to_string(),
        enum_prop("New status", TaskStatus::VALUES, None),
    );
    properties.insert(
        "position".to_string(),
        number_prop("New ordering key; must not equal a sibling's"),
    );
    properties.insert(
        "plan_id".to_string(),
        string_prop("Plan the new position applies to (defaults to the task's first plan); requires position"),
    );
    insert_tags_and_metadata(&mut properties);
    tool(
        "update_task",
        "Update a task. Only supplied fields change.",
        properties,
        &["task_id"],
    )
}

fn delete_task_tool() -> Tool {
    let mut properties = scoped_properties();
    properties.insert("task_id".to_string(), string_prop("Task id"));
    tool(
        "delete_task",
        "Delete a task and every relationship touching it.",
        properties,
        &["task_id"],
    )
}

fn list_tasks_tool() -> Tool {
    let mut properties = scoped_properties();
    insert_filters(&mut properties);
    properties.insert(
        "plan_id".to_string(),
        string_prop("Only tasks in this plan, ordered by position"),
    );
    properties.insert(
        "status".to_string(),
        enum_prop("Only return tasks with this status", TaskStatus::VALUES, None),
    );
    tool(
        "list_tasks",
        "List tasks in a zone, or in one plan ordered by position.",
        properties,
        &[],
    )
}

fn reorder_task_tool() -> Tool {
    let mut properties = scoped_properties();
    properties.insert("task_id".to_string(), string_prop("Task to move"));
    properties.insert("plan_id".to_string(), string_prop("Plan to reorder within"));
    properties.insert(
        "after_task_id".to_string(),
        string_prop("Sibling to place the task after; omit to move it to the front"),
    );
    tool(
        "reorder_task",
        "Move a task within a plan without disturbing the order of its siblings.",
        properties,
        &["task_id", "plan_id"],
    )
}

// === Relationship Tools ===

fn edge_properties(type_description: &str) -> HashMap<String, PropertySchema> {
    let mut properties = scoped_properties();
    properties.insert("from_id".to_string(), string_prop("Source node id"));
    properties.insert("to_id".to_string(), string_prop("Target node id"));
    properties.insert(
        "type".to_string(),
        enum_prop(type_description, &RelationType::names(), None),
    );
    properties
}

fn create_relationship_tool() -> Tool {
    tool(
        "create_relationship",
        "Link two nodes of the same zone with a typed edge. Linking twice is a no-op.",
        edge_properties("Relationship type"),
        &["from_id", "to_id", "type"],
    )
}

fn delete_relationship_tool() -> Tool {
    tool(
        "delete_relationship",
        "Remove one typed edge between two nodes.",
        edge_properties("Relationship type"),
        &["from_id", "to_id", "type"],
    )
}

fn list_relationships_tool() -> Tool {
    let mut properties = scoped_properties();
    properties.insert("node_id".to_string(), string_prop("Node whose edges to list"));
    properties.insert(
        "direction".to_string(),
        enum_prop("Edge direction", Direction::VALUES, Some("outgoing")),
    );
    properties.insert(
        "type".to_string(),
        enum_prop("Only edges of this type", &RelationType::names(), None),
    );
    tool(
        "list_relationships",
        "List the edges touching a node.",
        properties,
        &["node_id"],
    )
}

fn get_related_tool() -> Tool {
    let mut properties = scoped_properties();
    properties.insert("node_id".to_string(), string_prop("Node to start from"));
    properties.insert(
        "type".to_string(),
        enum_prop("Only follow edges of this type", &RelationType::names(), None),
    );
    properties.insert(
        "direction".to_string(),
        enum_prop("Edge direction to follow", Direction::VALUES, Some("outgoing")),
    );
    properties.insert(
        "depth".to_string(),
        integer_prop(
            "How many hops to traverse",
            1.0,
            Some(MAX_TRAVERSAL_DEPTH as f64),
            Some(1),
        ),
    );
    tool(
        "get_related",
        "Find nodes reachable from a node, breadth-first, each reported once at its shallowest depth.",
        properties,
        &["node_id"],
    )
}

fn memory_stats_tool() -> Tool {
    tool(
        "memory_stats",
        "Count nodes by kind and relationships by type.",
        HashMap::new(),
        &[],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_all_tools_count() {
        let tools = get_all_tools();
        // Zones: 5, Memories: 5, Plans: 5, Tasks: 6, Relationships: 4, Stats: 1
        assert_eq!(tools.len(), 26, "Expected 26 tools, got {}", tools.len());
    }

    #[test]
    fn test_tools_have_required_fields() {
        for tool in get_all_tools() {
            assert!(!tool.name.is_empty(), "Tool name should not be empty");
            assert!(
                tool.description.is_some(),
                "Tool {} should have description",
                tool.name
            );
            let properties = tool.input_schema.properties.as_ref().unwrap();
            for required in tool.input_schema.required.as_ref().unwrap() {
                assert!(
                    properties.contains_key(required),
                    "Tool {} requires undeclared property {}",
                    tool.name,
                    required
                );
            }
        }
    }

    #[test]
    fn test_tool_names_are_unique() {
        let tools = get_all_tools();
        let names: Vec<_> = tools.iter().map(|t| &t.name).collect();
        let unique_names: std::collections::HashSet<_> = names.iter().collect();
        assert_eq!(
            names.len(),
            unique_names.len(),
            "Tool names should be unique"
        );
    }

    #[test]
    fn test_enums_come_from_engine_types() {
        let tool = find_tool("create_task").unwrap();
        let properties = tool.input_schema.properties.unwrap();
        let status = &properties["status"];
        assert_eq!(
            status.enum_values.as_deref().unwrap(),
            TaskStatus::VALUES
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .as_slice()
        );
    }
}
