use canvascore::{CanvasEdge, CanvasNode, NodeId, PlanningError};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, EdgeRef, Reversed};
use petgraph::Direction;
use std::collections::{HashMap, VecDeque};

/// Adjacency view over a canvas used for ordering and ancestry queries.
///
/// Node indices follow node-list order and edge indices follow edge-list
/// order, which is what makes the produced order stable for ties.
pub struct TopologicalSorter<'a> {
    graph: DiGraph<&'a CanvasNode, &'a CanvasEdge>,
    node_to_index: HashMap<&'a str, NodeIndex>,
}

impl<'a> TopologicalSorter<'a> {
    /// Build a sorter, rejecting duplicate ids and dangling edges.
    pub fn new(nodes: &'a [CanvasNode], edges: &'a [CanvasEdge]) -> Result<Self, PlanningError> {
        Self::build(nodes, edges, true)
    }

    /// Build a sorter that skips duplicate ids and dangling edges.
    ///
    /// Used by the validator, which reports those problems itself.
    pub fn lenient(nodes: &'a [CanvasNode], edges: &'a [CanvasEdge]) -> Self {
        match Self::build(nodes, edges, false) {
            Ok(sorter) => sorter,
            Err(_) => unreachable!("lenient build never fails"),
        }
    }

    fn build(
        nodes: &'a [CanvasNode],
        edges: &'a [CanvasEdge],
        strict: bool,
    ) -> Result<Self, PlanningError> {
        let mut graph = DiGraph::with_capacity(nodes.len(), edges.len());
        let mut node_to_index = HashMap::with_capacity(nodes.len());

        for node in nodes {
            if node_to_index.contains_key(node.id.as_str()) {
                if strict {
                    return Err(PlanningError::DuplicateNode(node.id.clone()));
                }
                continue;
            }
            let idx = graph.add_node(node);
            node_to_index.insert(node.id.as_str(), idx);
        }

        for edge in edges {
            let from = node_to_index.get(edge.source.as_str());
            let to = node_to_index.get(edge.target.as_str());
            match (from, to) {
                (Some(from), Some(to)) => {
                    graph.add_edge(*from, *to, edge);
                }
                _ if !strict => continue,
                (None, _) => {
                    return Err(PlanningError::UnknownNode {
                        edge_id: edge.id.clone(),
                        node_id: edge.source.clone(),
                    })
                }
                (_, None) => {
                    return Err(PlanningError::UnknownNode {
                        edge_id: edge.id.clone(),
                        node_id: edge.target.clone(),
                    })
                }
            }
        }

        Ok(Self {
            graph,
            node_to_index,
        })
    }

    pub(crate) fn graph(&self) -> &DiGraph<&'a CanvasNode, &'a CanvasEdge> {
        &self.graph
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Kahn's algorithm.
    ///
    /// The initial queue holds every in-degree-zero node in discovery order,
    /// entry-type nodes first; successors are released in edge order.
    pub fn sort(&self) -> Result<Vec<&'a CanvasNode>, PlanningError> {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|idx| self.graph.edges_directed(idx, Direction::Incoming).count())
            .collect();

        let roots: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|idx| in_degree[idx.index()] == 0)
            .collect();
        let (entries, others): (Vec<_>, Vec<_>) = roots
            .into_iter()
            .partition(|idx| self.graph[*idx].node_type.is_entry());
        let mut queue: VecDeque<NodeIndex> = entries.into_iter().chain(others).collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(idx) = queue.pop_front() {
            order.push(self.graph[idx]);

            let mut outgoing: Vec<_> = self
                .graph
                .edges_directed(idx, Direction::Outgoing)
                .map(|e| (e.id(), e.target()))
                .collect();
            outgoing.sort_by_key(|(edge, _)| edge.index());

            for (_, target) in outgoing {
                let degree = &mut in_degree[target.index()];
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(target);
                }
            }
        }

        if order.len() < self.graph.node_count() {
            return Err(PlanningError::CycleDetected {
                ordered: order.len(),
                total: self.graph.node_count(),
            });
        }

        Ok(order)
    }

    /// Node ids in execution order
    pub fn order(&self) -> Result<Vec<NodeId>, PlanningError> {
        Ok(self.sort()?.into_iter().map(|n| n.id.clone()).collect())
    }

    /// Every node with a path into `id`, nearest first
    pub fn ancestors(&self, id: &str) -> Vec<&'a CanvasNode> {
        let Some(&start) = self.node_to_index.get(id) else {
            return Vec::new();
        };
        let reversed = Reversed(&self.graph);
        let mut bfs = Bfs::new(reversed, start);
        let mut found = Vec::new();
        while let Some(idx) = bfs.next(reversed) {
            if idx != start {
                found.push(self.graph[idx]);
            }
        }
        found
    }

    /// Every node reachable from `id`, nearest first
    pub fn descendants(&self, id: &str) -> Vec<&'a CanvasNode> {
        let Some(&start) = self.node_to_index.get(id) else {
            return Vec::new();
        };
        let mut bfs = Bfs::new(&self.graph, start);
        let mut found = Vec::new();
        while let Some(idx) = bfs.next(&self.graph) {
            if idx != start {
                found.push(self.graph[idx]);
            }
        }
        found
    }
}

/// Sort a canvas without validating it first
pub fn topological_order(nodes: &[CanvasNode], edges: &[CanvasEdge]) -> Result<Vec<NodeId>, PlanningError> {
    TopologicalSorter::new(nodes, edges)?.order()
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvascore::NodeType;

    fn node(id: &str, node_type: NodeType) -> CanvasNode {
        CanvasNode::new(id, node_type)
    }

    fn edge(source: &str, target: &str) -> CanvasEdge {
        CanvasEdge::new(format!("{}-{}", source, target), source, target)
    }

    fn ids(nodes: Vec<&CanvasNode>) -> Vec<&str> {
        nodes.into_iter().map(|n| n.id.as_str()).collect()
    }

    #[test]
    fn test_chain_sorts_in_edge_order() {
        let nodes = vec![
            node("generate", NodeType::Generate),
            node("retrieve", NodeType::Retrieve),
            node("embed", NodeType::Embed),
            node("query", NodeType::Query),
        ];
        let edges = vec![
            edge("query", "embed"),
            edge("embed", "retrieve"),
            edge("retrieve", "generate"),
        ];

        let order = topological_order(&nodes, &edges).unwrap();
        assert_eq!(order, vec!["query", "embed", "retrieve", "generate"]);
    }

    #[test]
    fn test_ties_follow_edge_order_and_are_stable() {
        let nodes = vec![
            node("q", NodeType::Query),
            node("hyde", NodeType::Hyde),
            node("rerank", NodeType::Rerank),
            node("gen", NodeType::Generate),
        ];
        let edges = vec![
            edge("q", "rerank"),
            edge("q", "hyde"),
            edge("hyde", "gen"),
            edge("rerank", "gen"),
        ];

        let first = topological_order(&nodes, &edges).unwrap();
        let second = topological_order(&nodes, &edges).unwrap();
        assert_eq!(first, vec!["q", "rerank", "hyde", "gen"]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_entry_node_sorts_first_even_when_listed_late() {
        let nodes = vec![
            node("orphan", NodeType::Rerank),
            node("gen", NodeType::Generate),
            node("q", NodeType::Query),
        ];
        let edges = vec![edge("q", "gen")];

        let order = topological_order(&nodes, &edges).unwrap();
        assert_eq!(order, vec!["q", "orphan", "gen"]);
    }

    #[test]
    fn test_cycle_is_a_planning_error() {
        let nodes = vec![node("q", NodeType::Query), node("gen", NodeType::Generate)];
        let edges = vec![edge("q", "gen"), edge("gen", "q")];

        let err = topological_order(&nodes, &edges).unwrap_err();
        assert_eq!(err, PlanningError::CycleDetected { ordered: 0, total: 2 });
    }

    #[test]
    fn test_dangling_edge_is_rejected_in_strict_mode() {
        let nodes = vec![node("q", NodeType::Query)];
        let edges = vec![edge("q", "ghost")];

        let err = TopologicalSorter::new(&nodes, &edges).err().unwrap();
        assert!(matches!(err, PlanningError::UnknownNode { node_id, .. } if node_id == "ghost"));

        let lenient = TopologicalSorter::lenient(&nodes, &edges);
        assert_eq!(lenient.order().unwrap(), vec!["q"]);
    }

    #[test]
    fn test_ancestors_and_descendants() {
        let nodes = vec![
            node("q", NodeType::Query),
            node("embed", NodeType::Embed),
            node("retrieve", NodeType::Retrieve),
            node("gen", NodeType::Generate),
        ];
        let edges = vec![
            edge("q", "embed"),
            edge("embed", "retrieve"),
            edge("retrieve", "gen"),
            edge("q", "gen"),
        ];
        let sorter = TopologicalSorter::new(&nodes, &edges).unwrap();

        let mut up = ids(sorter.ancestors("retrieve"));
        up.sort();
        assert_eq!(up, vec!["embed", "q"]);

        let mut down = ids(sorter.descendants("embed"));
        down.sort();
        assert_eq!(down, vec!["gen", "retrieve"]);

        assert!(sorter.ancestors("q").is_empty());
        assert!(sorter.descendants("missing").is_empty());
    }
}
