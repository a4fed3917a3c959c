use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type NodeId = String;
pub type EdgeId = String;
pub type CanvasId = String;

/// Opaque key-value record used for node config, step inputs and step outputs
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Closed set of processing kinds a canvas node can have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Query,
    Embed,
    Retrieve,
    Rerank,
    Judge,
    Generate,
    Hyde,
    Agent,
}

impl NodeType {
    pub const ALL: [NodeType; 8] = [
        NodeType::Query,
        NodeType::Embed,
        NodeType::Retrieve,
        NodeType::Rerank,
        NodeType::Judge,
        NodeType::Generate,
        NodeType::Hyde,
        NodeType::Agent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Query => "query",
            NodeType::Embed => "embed",
            NodeType::Retrieve => "retrieve",
            NodeType::Rerank => "rerank",
            NodeType::Judge => "judge",
            NodeType::Generate => "generate",
            NodeType::Hyde => "hyde",
            NodeType::Agent => "agent",
        }
    }

    /// Entry nodes are seeded from the run's original input
    pub fn is_entry(&self) -> bool {
        matches!(self, NodeType::Query)
    }

    /// Terminal nodes produce the run's final output
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeType::Generate | NodeType::Agent)
    }

    /// Node types this type may feed directly.
    pub fn allowed_targets(&self) -> &'static [NodeType] {
        use NodeType::*;
        match self {
            Query => &[Embed, Hyde, Rerank, Judge, Generate, Agent],
            Hyde => &[Embed, Generate],
            Embed => &[Retrieve],
            Retrieve => &[Rerank, Judge, Generate, Agent],
            Rerank => &[Judge, Generate, Agent],
            Judge => &[Generate, Agent],
            Agent => &[Generate],
            Generate => &[],
        }
    }

    pub fn can_connect_to(&self, target: NodeType) -> bool {
        self.allowed_targets().contains(&target)
    }

    /// Ancestor type this node usually expects somewhere upstream
    pub fn expected_ancestor(&self) -> Option<NodeType> {
        match self {
            NodeType::Embed => Some(NodeType::Query),
            NodeType::Retrieve => Some(NodeType::Embed),
            NodeType::Rerank | NodeType::Judge => Some(NodeType::Retrieve),
            _ => None,
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown node type: {}", s))
    }
}

/// User-authored canvas: nodes plus directed edges
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanvasGraph {
    pub nodes: Vec<CanvasNode>,
    pub edges: Vec<CanvasEdge>,
}

impl CanvasGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: CanvasNode) -> NodeId {
        let id = node.id.clone();
        self.nodes.push(node);
        id
    }

    /// Connect two nodes; the edge id is derived from its endpoints.
    pub fn connect(&mut self, source: impl Into<NodeId>, target: impl Into<NodeId>) {
        let source = source.into();
        let target = target.into();
        self.edges.push(CanvasEdge {
            id: format!("{}->{}", source, target),
            source,
            target,
        });
    }

    pub fn find_node(&self, id: &str) -> Option<&CanvasNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// Node specification on a canvas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasNode {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub config: Record,
}

impl CanvasNode {
    pub fn new(id: impl Into<NodeId>, node_type: NodeType) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            node_type,
            config: Record::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }
}

/// Directed connection between two nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasEdge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
}

impl CanvasEdge {
    pub fn new(id: impl Into<EdgeId>, source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_type_round_trips_through_str() {
        for t in NodeType::ALL {
            assert_eq!(t.as_str().parse::<NodeType>().unwrap(), t);
        }
        assert!("rewrite".parse::<NodeType>().is_err());
    }

    #[test]
    fn graph_deserializes_from_canvas_json() {
        let graph: CanvasGraph = serde_json::from_value(serde_json::json!({
            "nodes": [
                {"id": "q", "type": "query", "label": "Question"},
                {"id": "g", "type": "generate", "config": {"model": "small"}}
            ],
            "edges": [{"id": "e1", "source": "q", "target": "g"}]
        }))
        .unwrap();

        assert_eq!(graph.nodes[0].node_type, NodeType::Query);
        assert_eq!(graph.nodes[1].label, "");
        assert_eq!(graph.nodes[1].config["model"], "small");
        assert_eq!(graph.edges[0].target, "g");
    }

    #[test]
    fn generate_is_terminal_and_accepts_no_targets() {
        assert!(NodeType::Generate.is_terminal());
        assert!(NodeType::Generate.allowed_targets().is_empty());
        assert!(NodeType::Query.can_connect_to(NodeType::Embed));
        assert!(!NodeType::Embed.can_connect_to(NodeType::Generate));
    }
}
