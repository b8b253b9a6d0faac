use std::sync::Arc;

use chrono::Utc;

use super::{load_scoped, sort_newest_first, NodeFilter};
use crate::error::{GraphError, Result};
use crate::node::{normalize_tags, require_text, NewZone, Node, NodeId, NodeKind, Zone, ZoneUpdate};
use crate::relations::RelationshipEngine;
use crate::store::{Connection, ROOT_SCOPE};

/// Zones are the isolation boundary and are themselves unscoped.
///
/// Names are unique. A zone can only be deleted once it owns nothing.
#[derive(Clone)]
pub struct ZoneRepository {
    conn: Arc<Connection>,
    relations: RelationshipEngine,
}

impl ZoneRepository {
    pub fn new(conn: Arc<Connection>, relations: RelationshipEngine) -> Self {
        Self { conn, relations }
    }

    pub fn create(&self, input: NewZone) -> Result<Zone> {
        let _guard = self.conn.write_guard();
        self.insert(input)
    }

    /// Return the zone called `name`, creating it first if needed
    pub fn ensure(&self, name: &str) -> Result<Zone> {
        let _guard = self.conn.write_guard();
        if let Some(zone) = self.find_by_name(name)? {
            return Ok(zone);
        }
        self.insert(NewZone::new(name))
    }

    fn insert(&self, input: NewZone) -> Result<Zone> {
        let name = require_text("name", &input.name)?;
        if self.find_by_name(&name)?.is_some() {
            return Err(GraphError::validation(format!(
                "a zone named '{}' already exists",
                name
            )));
        }

        let now = Utc::now();
        let zone = Zone {
            id: NodeId::new(),
            name,
            description: input.description.unwrap_or_default(),
            tags: normalize_tags(&input.tags),
            metadata: input.metadata,
            created_at: now,
            updated_at: now,
        };

        let mut batch = self.conn.batch();
        batch.put_node(&Node::Zone(zone.clone()))?;
        batch.commit()?;

        log::info!("Created zone '{}' ({})", zone.name, zone.id);
        Ok(zone)
    }

    pub fn get(&self, id: NodeId) -> Result<Option<Zone>> {
        match self.conn.get_node(id)? {
            Some(Node::Zone(zone)) => Ok(Some(zone)),
            _ => Ok(None),
        }
    }

    pub fn find_by_name(&self, name: &str) -> Result<Option<Zone>> {
        let name = name.trim();
        Ok(self.all()?.into_iter().find(|z| z.name.trim() == name))
    }

    pub fn update(&self, id: NodeId, update: ZoneUpdate) -> Result<Zone> {
        let _guard = self.conn.write_guard();
        let mut zone = self
            .get(id)?
            .ok_or_else(|| GraphError::not_found(format!("zone {}", id)))?;

        if let Some(name) = update.name {
            let name = require_text("name", &name)?;
            if name.trim() != zone.name.trim() && self.find_by_name(&name)?.is_some() {
                return Err(GraphError::validation(format!(
                    "a zone named '{}' already exists",
                    name
                )));
            }
            zone.name = name;
        }
        if let Some(description) = update.description {
            zone.description = description;
        }
        if let Some(tags) = update.tags {
            zone.tags = normalize_tags(&tags);
        }
        if let Some(metadata) = update.metadata {
            zone.metadata = metadata;
        }
        zone.updated_at = Utc::now();

        let mut batch = self.conn.batch();
        batch.put_node(&Node::Zone(zone.clone()))?;
        batch.commit()?;
        Ok(zone)
    }

    /// Delete an empty zone; a zone still owning plans, tasks or memories is
    /// refused
    pub fn delete(&self, id: NodeId) -> Result<()> {
        let _guard = self.conn.write_guard();
        let zone = self
            .get(id)?
            .ok_or_else(|| GraphError::not_found(format!("zone {}", id)))?;

        if self.conn.zone_has_members(id)? {
            return Err(GraphError::validation(format!(
                "zone '{}' is not empty; delete its plans, tasks and memories first",
                zone.name
            )));
        }

        let mut batch = self.conn.batch();
        self.relations.detach_node(&mut batch, id)?;
        batch.delete_node(&Node::Zone(zone))?;
        batch.commit()?;

        log::info!("Deleted zone {}", id);
        Ok(())
    }

    pub fn list(&self, filter: &NodeFilter) -> Result<Vec<Zone>> {
        filter.reject_status(NodeKind::Zone)?;
        let mut nodes = load_scoped(&self.conn, ROOT_SCOPE, NodeKind::Zone)?;
        nodes.retain(|n| filter.matches(n, None));
        sort_newest_first(&mut nodes);
        Ok(filter.paginate(nodes).into_iter().filter_map(into_zone).collect())
    }

    pub fn search(&self, query: &str, filter: &NodeFilter) -> Result<Vec<Zone>> {
        let filter = NodeFilter {
            text: Some(query.to_string()),
            ..filter.clone()
        };
        self.list(&filter)
    }

    fn all(&self) -> Result<Vec<Zone>> {
        Ok(load_scoped(&self.conn, ROOT_SCOPE, NodeKind::Zone)?
            .into_iter()
            .filter_map(into_zone)
            .collect())
    }
}

fn into_zone(node: Node) -> Option<Zone> {
    match node {
        Node::Zone(zone) => Some(zone),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use crate::node::{NewMemory, NewZone, ZoneUpdate};
    use crate::repository::NodeFilter;
    use crate::test_support::test_graph;
    use crate::GraphError;

    #[test]
    fn test_create_then_get() {
        let (_dir, graph) = test_graph();
        let zone = graph
            .zones()
            .create(NewZone::new("Z1").description("first zone").tag("work"))
            .unwrap();

        let fetched = graph.zones().get(zone.id).unwrap().unwrap();
        assert_eq!(fetched, zone);
        assert_eq!(fetched.name, "Z1");
        assert_eq!(fetched.description, "first zone");
        assert!(fetched.tags.contains("work"));
    }

    #[test]
    fn test_name_required_and_unique() {
        let (_dir, graph) = test_graph();
        assert!(matches!(
            graph.zones().create(NewZone::new("  ")).unwrap_err(),
            GraphError::Validation(_)
        ));
        graph.zones().create(NewZone::new("Z1")).unwrap();
        assert!(matches!(
            graph.zones().create(NewZone::new("Z1")).unwrap_err(),
            GraphError::Validation(_)
        ));
        assert!(matches!(
            graph.zones().create(NewZone::new(" Z1 ")).unwrap_err(),
            GraphError::Validation(_)
        ));
    }

    #[test]
    fn test_ensure_reuses_existing_zone() {
        let (_dir, graph) = test_graph();
        let first = graph.zones().ensure("default").unwrap();
        let second = graph.zones().ensure("default").unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(graph.zones().list(&NodeFilter::new()).unwrap().len(), 1);
    }

    #[test]
    fn test_update_refreshes_updated_at() {
        let (_dir, graph) = test_graph();
        let zone = graph.zones().create(NewZone::new("Z1")).unwrap();
        let updated = graph
            .zones()
            .update(
                zone.id,
                ZoneUpdate {
                    description: Some("renamed".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.name, "Z1");
        assert_eq!(updated.description, "renamed");
        assert!(updated.updated_at >= zone.updated_at);
        assert_eq!(updated.created_at, zone.created_at);
    }

    #[test]
    fn test_non_empty_zone_delete_is_refused() {
        let (_dir, graph) = test_graph();
        let zone = graph.zones().create(NewZone::new("Z1")).unwrap();
        let memory = graph.memories().create(zone.id, NewMemory::new("m")).unwrap();

        let err = graph.zones().delete(zone.id).unwrap_err();
        assert!(matches!(err, GraphError::Validation(_)));
        assert!(graph.zones().get(zone.id).unwrap().is_some());

        graph.memories().delete(zone.id, memory.id).unwrap();
        graph.zones().delete(zone.id).unwrap();
        assert!(graph.zones().get(zone.id).unwrap().is_none());
    }

    #[test]
    fn test_delete_missing_zone_is_not_found() {
        let (_dir, graph) = test_graph();
        let err = graph.zones().delete(crate::NodeId::new()).unwrap_err();
        assert!(matches!(err, GraphError::NotFound(_)));
    }

    #[test]
    fn test_search_by_name() {
        let (_dir, graph) = test_graph();
        graph.zones().create(NewZone::new("payments")).unwrap();
        graph.zones().create(NewZone::new("search")).unwrap();

        let found = graph.zones().search("PAY", &NodeFilter::new()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "payments");
    }
}
