//! Workflow graph snapshots.
//!
//! Parsed from the stored graph at execution start and never mutated afterwards.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Presentation-only position of a node on the canvas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A configured node in a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInstance {
    /// Unique within the graph.
    pub id: String,
    /// Reference to `NodeDefinition::name`.
    #[serde(rename = "type")]
    pub node_type: String,
    /// Static config merged under the model-supplied arguments at call time.
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default)]
    pub position: Position,
}

impl NodeInstance {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            config: Map::new(),
            position: Position::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }
}

fn default_source_handle() -> String {
    "output".to_string()
}

fn default_target_handle() -> String {
    "input".to_string()
}

/// Directed edge between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    #[serde(rename = "sourceHandle", default = "default_source_handle")]
    pub source_handle: String,
    #[serde(rename = "targetHandle", default = "default_target_handle")]
    pub target_handle: String,
}

impl GraphEdge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            source_handle: default_source_handle(),
            target_handle: default_target_handle(),
        }
    }
}

/// Nodes and edges of a workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowGraph {
    #[serde(default)]
    pub nodes: Vec<NodeInstance>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
}

impl WorkflowGraph {
    /// Structural check: unique node ids and edges that reference known nodes.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id.as_str()) {
                return Err(format!("Duplicate node id '{}'", node.id));
            }
        }
        for edge in &self.edges {
            for end in [&edge.source, &edge.target] {
                if !seen.contains(end.as_str()) {
                    return Err(format!(
                        "Edge {} -> {} references unknown node '{end}'",
                        edge.source, edge.target
                    ));
                }
            }
        }
        Ok(())
    }
}

/// A workflow as handed to the engine by the caller's store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub graph: WorkflowGraph,
}

impl Workflow {
    pub fn new(id: impl Into<String>, name: impl Into<String>, graph: WorkflowGraph) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            graph,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_graph_parses_stored_shape() {
        let graph: WorkflowGraph = serde_json::from_value(json!({
            "nodes": [
                {"id": "n1", "type": "calculator", "config": {}, "position": {"x": 10, "y": 20}},
                {"id": "n2", "type": "slack_send_message"}
            ],
            "edges": [{"source": "n1", "target": "n2"}]
        }))
        .unwrap();

        assert_eq!(graph.nodes[0].node_type, "calculator");
        assert!((graph.nodes[0].position.x - 10.0).abs() < f64::EPSILON);
        assert_eq!(graph.edges[0].source_handle, "output");
        assert_eq!(graph.edges[0].target_handle, "input");
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_duplicates_and_dangling_edges() {
        let duplicate = WorkflowGraph {
            nodes: vec![NodeInstance::new("a", "x"), NodeInstance::new("a", "y")],
            edges: vec![],
        };
        assert!(duplicate.validate().is_err());

        let dangling = WorkflowGraph {
            nodes: vec![NodeInstance::new("a", "x")],
            edges: vec![GraphEdge::new("a", "missing")],
        };
        assert!(dangling.validate().is_err());
    }
}
