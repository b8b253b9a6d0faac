//! Relationship types, directions and endpoint rules

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};
use crate::node::{NodeId, NodeKind};

/// Typed, directed edge kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationType {
    /// Plan/Memory → Zone; exactly one per plan or memory
    BelongsTo,
    /// Task → Plan; carries the task's position inside that plan
    PartOf,
    DependsOn,
    Blocks,
    Follows,
    RelatesTo,
    References,
    Implements,
}

impl RelationType {
    pub const ALL: [RelationType; 8] = [
        Self::BelongsTo,
        Self::PartOf,
        Self::DependsOn,
        Self::Blocks,
        Self::Follows,
        Self::RelatesTo,
        Self::References,
        Self::Implements,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BelongsTo => "BELONGS_TO",
            Self::PartOf => "PART_OF",
            Self::DependsOn => "DEPENDS_ON",
            Self::Blocks => "BLOCKS",
            Self::Follows => "FOLLOWS",
            Self::RelatesTo => "RELATES_TO",
            Self::References => "REFERENCES",
            Self::Implements => "IMPLEMENTS",
        }
    }

    /// Every spelling, for schema enums
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|t| t.as_str()).collect()
    }

    /// Structural edges are maintained by the repositories
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::BelongsTo | Self::PartOf)
    }

    /// Check that `from -[self]-> to` is an allowed pairing
    pub fn check_endpoints(&self, from: NodeKind, to: NodeKind) -> Result<()> {
        let allowed = match self {
            Self::BelongsTo => {
                matches!(from, NodeKind::Plan | NodeKind::Memory) && to == NodeKind::Zone
            }
            Self::PartOf => from == NodeKind::Task && to == NodeKind::Plan,
            _ => from != NodeKind::Zone && to != NodeKind::Zone,
        };

        if allowed {
            Ok(())
        } else {
            Err(GraphError::validation(format!(
                "{} cannot link a {} to a {}",
                self, from, to
            )))
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationType {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == upper)
            .ok_or_else(|| {
                GraphError::validation(format!(
                    "invalid relationship type '{}', expected one of: {}",
                    s,
                    Self::names().join(", ")
                ))
            })
    }
}

/// Edge direction relative to a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
    Both,
}

impl Direction {
    pub const VALUES: &'static [&'static str] = &["incoming", "outgoing", "both"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
            Self::Both => "both",
        }
    }

    pub fn includes_outgoing(&self) -> bool {
        matches!(self, Self::Outgoing | Self::Both)
    }

    pub fn includes_incoming(&self) -> bool {
        matches!(self, Self::Incoming | Self::Both)
    }
}

impl Default for Direction {
    fn default() -> Self {
        Self::Outgoing
    }
}

impl FromStr for Direction {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "incoming" | "in" => Ok(Self::Incoming),
            "outgoing" | "out" => Ok(Self::Outgoing),
            "both" => Ok(Self::Both),
            other => Err(GraphError::validation(format!(
                "invalid direction '{}', expected one of: incoming, outgoing, both",
                other
            ))),
        }
    }
}

/// Properties stored with each edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeRecord {
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<f64>,
}

impl EdgeRecord {
    pub fn new() -> Self {
        Self {
            created_at: Utc::now(),
            position: None,
        }
    }

    pub fn with_position(mut self, position: f64) -> Self {
        self.position = Some(position);
        self
    }
}

impl Default for EdgeRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// A stored edge as seen from one of its endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    pub from: NodeId,
    pub to: NodeId,
    #[serde(rename = "type")]
    pub relation_type: RelationType,
    /// Outgoing when the queried node is `from`, incoming when it is `to`
    pub direction: Direction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl Relation {
    /// The endpoint that is not `id`
    pub fn other_end(&self, id: NodeId) -> NodeId {
        if self.from == id {
            self.to
        } else {
            self.from
        }
    }
}
