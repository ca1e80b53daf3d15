//! Relationship graphs
//!
//! [`build_schema_graph`] expands one entity into a tree of everything it
//! refers to, depth first. Each identifier is expanded at most once per
//! build; later occurrences are bare leaves, so cycles terminate.
//!
//! [`ReferenceGraph`] is the flat registry-wide view used to find reference
//! cycles (strongly connected components).

use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

use crate::registry::{EntityLookup, GtsStore};

/// One entity in a relationship tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    /// Children keyed by the content path the reference was found at
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub refs: BTreeMap<String, GraphNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<Box<GraphNode>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl GraphNode {
    fn leaf(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Default::default()
        }
    }
}

fn is_json_schema_url(s: &str) -> bool {
    s.starts_with("http://json-schema.org") || s.starts_with("https://json-schema.org")
}

/// Resolve the relationship tree rooted at `id`
pub fn build_schema_graph<L: EntityLookup + ?Sized>(lookup: &L, id: &str) -> GraphNode {
    let mut seen = HashSet::new();
    let node = build_node(lookup, id, &mut seen);
    debug!(id, visited = seen.len(), "built relationship graph");
    node
}

fn build_node<L: EntityLookup + ?Sized>(
    lookup: &L,
    id: &str,
    seen: &mut HashSet<String>,
) -> GraphNode {
    let mut node = GraphNode::leaf(id);
    if !seen.insert(id.to_string()) {
        return node;
    }

    let Some(entity) = lookup.get(id) else {
        node.errors.push("Entity not found".to_string());
        return node;
    };

    for reference in entity.refs() {
        if reference.id == id || is_json_schema_url(&reference.id) {
            continue;
        }
        let child = build_node(lookup, &reference.id, seen);
        node.refs.insert(reference.source_path.clone(), child);
    }

    match entity.schema_id() {
        Some(schema_id) if !is_json_schema_url(schema_id) => {
            node.schema_id = Some(Box::new(build_node(lookup, schema_id, seen)));
        }
        Some(_) => {}
        None if !entity.is_schema() => node.errors.push("Schema not recognized".to_string()),
        None => {}
    }
    node
}

/// A group of entities that refer to each other
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceCycle {
    /// Members in identifier order
    pub members: Vec<String>,
    pub is_self_referential: bool,
}

/// Registry-wide directed graph: an edge for every reference and schema link
pub struct ReferenceGraph {
    graph: DiGraph<String, String>,
    index: HashMap<String, NodeIndex>,
}

impl ReferenceGraph {
    pub fn from_store(store: &GtsStore) -> Self {
        let mut graph = Self {
            graph: DiGraph::new(),
            index: HashMap::new(),
        };

        for (id, entity) in store.items() {
            let from = graph.node(id);
            for reference in entity.refs() {
                let own_id_field = reference.id == id
                    && entity.selected_entity_field() == Some(reference.source_path.as_str());
                if own_id_field || is_json_schema_url(&reference.id) {
                    continue;
                }
                let to = graph.node(&reference.id);
                graph.graph.add_edge(from, to, reference.source_path.clone());
            }
            if let Some(schema_id) = entity.schema_id().filter(|s| !is_json_schema_url(s)) {
                let to = graph.node(schema_id);
                graph.graph.add_edge(from, to, "$schema".to_string());
            }
        }
        graph
    }

    fn node(&mut self, id: &str) -> NodeIndex {
        if let Some(idx) = self.index.get(id) {
            return *idx;
        }
        let idx = self.graph.add_node(id.to_string());
        self.index.insert(id.to_string(), idx);
        idx
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Identifiers `id` points at directly
    pub fn targets(&self, id: &str) -> Vec<&str> {
        let Some(idx) = self.index.get(id) else {
            return Vec::new();
        };
        let mut targets: Vec<&str> = self
            .graph
            .neighbors(*idx)
            .map(|n| self.graph[n].as_str())
            .collect();
        targets.sort_unstable();
        targets.dedup();
        targets
    }

    /// Strongly connected components with more than one member, plus
    /// entities that refer to themselves
    pub fn cycles(&self) -> Vec<ReferenceCycle> {
        let mut cycles: Vec<ReferenceCycle> = kosaraju_scc(&self.graph)
            .into_iter()
            .filter_map(|scc| {
                let self_ref = scc.len() == 1 && self.graph.contains_edge(scc[0], scc[0]);
                if scc.len() < 2 && !self_ref {
                    return None;
                }
                let mut members: Vec<String> = scc.iter().map(|n| self.graph[*n].clone()).collect();
                members.sort();
                Some(ReferenceCycle {
                    members,
                    is_self_referential: self_ref,
                })
            })
            .collect();
        cycles.sort_by(|a, b| a.members.cmp(&b.members));
        cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;
    use crate::entity::JsonEntity;
    use serde_json::{json, Value};

    const A: &str = "gts.x.test.graph.a.v1~";
    const B: &str = "gts.x.test.graph.b.v1~";

    fn schema(id: &str, nested: &str) -> Value {
        json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "$id": format!("gts://{id}"),
            "type": "object",
            "properties": {"nested": {"$ref": nested}}
        })
    }

    fn store(docs: Vec<Value>) -> GtsStore {
        let mut store = GtsStore::new();
        for doc in docs {
            store.register(JsonEntity::new(doc, &ExtractionConfig::default())).unwrap();
        }
        store
    }

    #[test]
    fn test_cycle_terminates() {
        let store = store(vec![schema(A, B), schema(B, A)]);
        let graph = build_schema_graph(&store, A);

        assert_eq!(graph.id, A);
        assert!(graph.errors.is_empty());
        assert!(graph.schema_id.is_none());

        let b = &graph.refs["properties.nested.$ref"];
        assert_eq!(b.id, B);
        let back = &b.refs["properties.nested.$ref"];
        assert_eq!(back, &GraphNode::leaf(A));
    }

    #[test]
    fn test_missing_entity_and_schema() {
        let store = store(vec![json!({
            "id": "gts.x.test.graph.item.v1~x.app.items.one.v1",
            "other": "gts.x.test.graph.gone.v1~"
        })]);

        let graph = build_schema_graph(&store, "gts.x.test.graph.item.v1~x.app.items.one.v1");
        assert_eq!(graph.refs["other"].errors, vec!["Entity not found"]);
        let schema = graph.schema_id.as_ref().unwrap();
        assert_eq!(schema.id, "gts.x.test.graph.item.v1~");
        assert_eq!(schema.errors, vec!["Entity not found"]);

        let missing = build_schema_graph(&store, "gts.x.test.graph.none.v1~");
        assert_eq!(missing.errors, vec!["Entity not found"]);
    }

    #[test]
    fn test_instance_without_schema() {
        let mut store = GtsStore::new();
        store
            .register(JsonEntity::new(
                json!({"gtsId": "gts.x.test.graph.a.v1~", "name": "typed but schemaless"}),
                &ExtractionConfig::default(),
            ))
            .unwrap();
        let graph = build_schema_graph(&store, A);
        assert_eq!(graph.errors, vec!["Schema not recognized"]);

        let json = serde_json::to_value(&graph).unwrap();
        assert!(json.get("refs").is_none());
        assert!(json.get("schema_id").is_none());
    }

    #[test]
    fn test_reference_cycles() {
        let store = store(vec![
            schema(A, B),
            schema(B, A),
            schema("gts.x.test.graph.self.v1~", "gts.x.test.graph.self.v1~"),
            schema("gts.x.test.graph.leaf.v1~", A),
        ]);
        let graph = ReferenceGraph::from_store(&store);
        assert_eq!(graph.targets("gts.x.test.graph.leaf.v1~"), vec![A]);

        let cycles = graph.cycles();
        assert_eq!(cycles.len(), 2);
        assert_eq!(cycles[0].members, vec![A, B]);
        assert!(!cycles[0].is_self_referential);
        assert_eq!(cycles[1].members, vec!["gts.x.test.graph.self.v1~"]);
        assert!(cycles[1].is_self_referential);
    }
}
