//! Node types and creation/update inputs
//!
//! Four node kinds live in the graph: zones (isolation boundaries), plans,
//! tasks and memories. Every node carries engine-managed timestamps, a tag
//! set and an opaque metadata map that the engine never interprets.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::GraphError;

/// Caller-controlled metadata, passed through unchanged
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Unique identifier for graph nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random NodeId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Discriminator for the four node kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Zone,
    Plan,
    Task,
    Memory,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zone => "zone",
            Self::Plan => "plan",
            Self::Task => "task",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declares a string-backed status enum. Serializes with the declared
/// spelling; parses and deserializes case-insensitively.
macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident, $label:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            /// All accepted spellings, in declaration order
            pub const VALUES: &'static [&'static str] = &[$($text),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = GraphError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                $(
                    if s.eq_ignore_ascii_case($text) {
                        return Ok(Self::$variant);
                    }
                )+
                Err(GraphError::validation(format!(
                    "invalid {} '{}', expected one of: {}",
                    $label,
                    s,
                    Self::VALUES.join(", ")
                )))
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let text = String::deserialize(deserializer)?;
                text.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

string_enum!(
    /// Lifecycle status of a plan
    PlanStatus, "plan status" {
        Draft => "draft",
        Active => "active",
        Completed => "completed",
        Archived => "archived",
    }
);

string_enum!(
    /// Lifecycle status of a task
    TaskStatus, "task status" {
        Pending => "pending",
        InProgress => "in_progress",
        Completed => "completed",
        Cancelled => "cancelled",
        Blocked => "blocked",
    }
);

string_enum!(
    /// Flavour of a memory
    MemoryType, "memory type" {
        Note => "Note",
        Repository => "Repository",
        Memory => "Memory",
    }
);

impl Default for PlanStatus {
    fn default() -> Self {
        Self::Draft
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl Default for MemoryType {
    fn default() -> Self {
        Self::Memory
    }
}

/// Top-level isolation boundary owning plans and memories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    pub id: NodeId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Container for ordered tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: NodeId,
    pub zone_id: NodeId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub status: PlanStatus,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Actionable item ordered within one or more plans
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: NodeId,
    pub zone_id: NodeId,
    pub content: String,
    pub status: TaskStatus,
    /// Ordering key within the plan the task was created under; listing a
    /// plan's tasks reports the position stored on that plan's edge instead.
    pub position: f64,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Freeform knowledge unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    pub id: NodeId,
    pub zone_id: NodeId,
    pub content: String,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A hydrated node of any kind, as stored and as returned by traversal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Zone(Zone),
    Plan(Plan),
    Task(Task),
    Memory(Memory),
}

impl Node {
    pub fn id(&self) -> NodeId {
        match self {
            Self::Zone(z) => z.id,
            Self::Plan(p) => p.id,
            Self::Task(t) => t.id,
            Self::Memory(m) => m.id,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Zone(_) => NodeKind::Zone,
            Self::Plan(_) => NodeKind::Plan,
            Self::Task(_) => NodeKind::Task,
            Self::Memory(_) => NodeKind::Memory,
        }
    }

    /// Zone this node is isolated in; a zone is its own scope
    pub fn scope(&self) -> NodeId {
        match self {
            Self::Zone(z) => z.id,
            Self::Plan(p) => p.zone_id,
            Self::Task(t) => t.zone_id,
            Self::Memory(m) => m.zone_id,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Self::Zone(z) => z.created_at,
            Self::Plan(p) => p.created_at,
            Self::Task(t) => t.created_at,
            Self::Memory(m) => m.created_at,
        }
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        match self {
            Self::Zone(z) => &z.tags,
            Self::Plan(p) => &p.tags,
            Self::Task(t) => &t.tags,
            Self::Memory(m) => &m.tags,
        }
    }

    /// Status spelling, for kinds that have one
    pub fn status(&self) -> Option<&'static str> {
        match self {
            Self::Plan(p) => Some(p.status.as_str()),
            Self::Task(t) => Some(t.status.as_str()),
            Self::Zone(_) | Self::Memory(_) => None,
        }
    }

    /// Fields covered by free-text matching
    pub fn searchable_fields(&self) -> Vec<&str> {
        match self {
            Self::Zone(z) => vec![z.name.as_str(), z.description.as_str()],
            Self::Plan(p) => vec![p.name.as_str(), p.description.as_str()],
            Self::Task(t) => vec![t.content.as_str()],
            Self::Memory(m) => vec![m.content.as_str()],
        }
    }
}

/// Trim tags, drop blanks and de-duplicate
pub fn normalize_tags<I, S>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|t| t.as_ref().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Return a required text field as supplied, or a validation error when it is
/// blank
pub(crate) fn require_text(field: &str, value: &str) -> crate::error::Result<String> {
    if value.trim().is_empty() {
        return Err(GraphError::validation(format!("'{}' is required", field)));
    }
    Ok(value.to_string())
}

/// Input for creating a zone
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewZone {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl NewZone {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// Input for creating a plan
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPlan {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<PlanStatus>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl NewPlan {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn status(mut self, status: PlanStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Input for creating a task
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTask {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub plan_ids: Vec<NodeId>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl NewTask {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    /// Add a plan the task becomes part of
    pub fn in_plan(mut self, plan_id: NodeId) -> Self {
        self.plan_ids.push(plan_id);
        self
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// Input for creating a memory
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewMemory {
    #[serde(default)]
    pub content: String,
    #[serde(default, rename = "type")]
    pub memory_type: Option<MemoryType>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl NewMemory {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn memory_type(mut self, memory_type: MemoryType) -> Self {
        self.memory_type = Some(memory_type);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Partial update of a zone; `None` leaves a field untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ZoneUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<Metadata>,
}

/// Partial update of a plan
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<PlanStatus>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<Metadata>,
}

/// Partial update of a task
///
/// `position` applies to the task's membership in `plan_id`; when `plan_id`
/// is omitted the plan the task was created under is used.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskUpdate {
    pub content: Option<String>,
    pub status: Option<TaskStatus>,
    pub position: Option<f64>,
    pub plan_id: Option<NodeId>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<Metadata>,
}

/// Partial update of a memory
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemoryUpdate {
    pub content: Option<String>,
    #[serde(rename = "type")]
    pub memory_type: Option<MemoryType>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<Metadata>,
}
