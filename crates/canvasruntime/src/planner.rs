use crate::sorter::TopologicalSorter;
use crate::validator;
use canvascore::{CanvasEdge, CanvasGraph, CanvasNode, NodeId, NodeType, PlanningError, Record};
use serde::Serialize;
use std::collections::BTreeMap;

/// One node of the plan together with its immediate predecessors
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStep {
    pub node_id: NodeId,
    pub node_type: NodeType,
    pub label: String,
    pub config: Record,
    pub inputs: Vec<NodeId>,
}

/// Immutable, per-run compilation of a canvas
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlan {
    pub steps: Vec<ExecutionStep>,
    pub input_mapping: BTreeMap<NodeId, Vec<NodeId>>,
}

impl ExecutionPlan {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, node_id: &str) -> Option<&ExecutionStep> {
        self.steps.iter().find(|s| s.node_id == node_id)
    }
}

/// Compile nodes and edges into an execution plan.
///
/// Re-validates first, so a structurally invalid canvas never yields a plan
/// even when the caller skipped validation.
pub fn plan(nodes: &[CanvasNode], edges: &[CanvasEdge]) -> Result<ExecutionPlan, PlanningError> {
    let validation = validator::validate(nodes, edges);
    if !validation.valid {
        return Err(PlanningError::InvalidGraph(validation.errors));
    }

    let order = TopologicalSorter::new(nodes, edges)?.sort()?;

    let mut input_mapping: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
    for node in nodes {
        input_mapping.entry(node.id.clone()).or_default();
    }
    for edge in edges {
        let sources = input_mapping.entry(edge.target.clone()).or_default();
        if !sources.contains(&edge.source) {
            sources.push(edge.source.clone());
        }
    }

    let steps = order
        .into_iter()
        .map(|node| ExecutionStep {
            node_id: node.id.clone(),
            node_type: node.node_type,
            label: node.label.clone(),
            config: node.config.clone(),
            inputs: input_mapping.get(&node.id).cloned().unwrap_or_default(),
        })
        .collect();

    Ok(ExecutionPlan {
        steps,
        input_mapping,
    })
}

pub fn plan_graph(graph: &CanvasGraph) -> Result<ExecutionPlan, PlanningError> {
    plan(&graph.nodes, &graph.edges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvascore::IssueCode;

    fn fan_in() -> CanvasGraph {
        let mut graph = CanvasGraph::new();
        graph.add_node(CanvasNode::new("query", NodeType::Query));
        graph.add_node(CanvasNode::new("embed", NodeType::Embed));
        graph.add_node(CanvasNode::new("retrieve", NodeType::Retrieve));
        graph.add_node(CanvasNode::new("rerank", NodeType::Rerank));
        graph.add_node(
            CanvasNode::new("generate", NodeType::Generate)
                .with_label("Answer")
                .with_config("temperature", 0.2),
        );
        graph.connect("query", "embed");
        graph.connect("embed", "retrieve");
        graph.connect("retrieve", "rerank");
        graph.connect("query", "rerank");
        graph.connect("rerank", "generate");
        graph.connect("query", "generate");
        graph
    }

    #[test]
    fn test_plan_covers_every_node_once() {
        let graph = fan_in();
        let plan = plan_graph(&graph).unwrap();

        assert_eq!(plan.len(), graph.nodes.len());
        let order: Vec<_> = plan.steps.iter().map(|s| s.node_id.as_str()).collect();
        assert_eq!(order, vec!["query", "embed", "retrieve", "rerank", "generate"]);
    }

    #[test]
    fn test_input_mapping_lists_immediate_sources_only() {
        let plan = plan_graph(&fan_in()).unwrap();

        assert!(plan.input_mapping["query"].is_empty());
        assert_eq!(plan.input_mapping["rerank"], vec!["retrieve", "query"]);
        assert_eq!(plan.input_mapping["generate"], vec!["rerank", "query"]);

        let generate = plan.step("generate").unwrap();
        assert_eq!(generate.inputs, plan.input_mapping["generate"]);
        assert_eq!(generate.label, "Answer");
        assert_eq!(generate.config["temperature"], 0.2);
    }

    #[test]
    fn test_planning_is_deterministic() {
        let graph = fan_in();
        assert_eq!(plan_graph(&graph).unwrap(), plan_graph(&graph).unwrap());
    }

    #[test]
    fn test_duplicate_edges_collapse_in_mapping() {
        let mut graph = fan_in();
        graph.connect("query", "generate");
        let plan = plan_graph(&graph).unwrap();
        assert_eq!(plan.input_mapping["generate"], vec!["rerank", "query"]);
    }

    #[test]
    fn test_invalid_graph_is_rejected() {
        let mut graph = fan_in();
        graph.connect("generate", "query");

        match plan_graph(&graph) {
            Err(PlanningError::InvalidGraph(errors)) => {
                assert!(errors.iter().any(|e| e.code == IssueCode::CycleDetected));
            }
            other => panic!("expected invalid graph, got {:?}", other),
        }
    }
}
