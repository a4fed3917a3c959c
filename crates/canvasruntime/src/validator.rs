//! Structural and semantic checks over a canvas graph.
//!
//! Only duplicate ids, a missing entry or terminal node, dangling edges,
//! disallowed connections and cycles block a run. Connectivity gaps and
//! missing upstream stages are reported as warnings so a half-drawn canvas
//! can still be inspected.

use crate::sorter::TopologicalSorter;
use canvascore::{CanvasEdge, CanvasNode, IssueCode, ValidationIssue};
use petgraph::visit::{depth_first_search, DfsEvent};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Outcome of validating a canvas
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn has_error(&self, code: IssueCode) -> bool {
        self.errors.iter().any(|i| i.code == code)
    }

    pub fn has_warning(&self, code: IssueCode) -> bool {
        self.warnings.iter().any(|i| i.code == code)
    }
}

#[derive(Default)]
struct Findings {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

impl Findings {
    fn error(&mut self, issue: ValidationIssue) {
        self.errors.push(issue);
    }

    fn warn(&mut self, issue: ValidationIssue) {
        self.warnings.push(issue);
    }
}

/// Validate a canvas and collect every finding
pub fn validate(nodes: &[CanvasNode], edges: &[CanvasEdge]) -> ValidationResult {
    let mut findings = Findings::default();
    let by_id = index_nodes(nodes, &mut findings);

    check_entry_nodes(nodes, &mut findings);
    check_terminal_nodes(nodes, &mut findings);
    check_edges(edges, &by_id, &mut findings);

    let sorter = TopologicalSorter::lenient(nodes, edges);
    check_cycles(&sorter, &mut findings);
    check_connectivity(&by_id, edges, &mut findings);
    check_expected_ancestors(&by_id, &sorter, &mut findings);

    tracing::debug!(
        "Validated canvas: {} errors, {} warnings",
        findings.errors.len(),
        findings.warnings.len()
    );

    ValidationResult {
        valid: findings.errors.is_empty(),
        errors: findings.errors,
        warnings: findings.warnings,
    }
}

fn index_nodes<'a>(
    nodes: &'a [CanvasNode],
    findings: &mut Findings,
) -> HashMap<&'a str, &'a CanvasNode> {
    let mut by_id = HashMap::with_capacity(nodes.len());
    for node in nodes {
        if by_id.contains_key(node.id.as_str()) {
            findings.error(
                ValidationIssue::new(
                    IssueCode::DuplicateNodeId,
                    format!("Node id '{}' is used more than once", node.id),
                )
                .at_node(&node.id),
            );
            continue;
        }
        by_id.insert(node.id.as_str(), node);
    }
    by_id
}

fn check_entry_nodes(nodes: &[CanvasNode], findings: &mut Findings) {
    let entries: Vec<_> = nodes.iter().filter(|n| n.node_type.is_entry()).collect();
    match entries.as_slice() {
        [] => findings.error(ValidationIssue::new(
            IssueCode::MissingEntryNode,
            "Canvas has no query node",
        )),
        [_] => {}
        [first, rest @ ..] => {
            for extra in rest {
                findings.warn(
                    ValidationIssue::new(
                        IssueCode::MultipleEntryNodes,
                        format!(
                            "Canvas has more than one query node; only '{}' is used as the entry",
                            first.id
                        ),
                    )
                    .at_node(&extra.id),
                );
            }
        }
    }
}

fn check_terminal_nodes(nodes: &[CanvasNode], findings: &mut Findings) {
    if !nodes.iter().any(|n| n.node_type.is_terminal()) {
        findings.error(ValidationIssue::new(
            IssueCode::MissingTerminalNode,
            "Canvas has no generate or agent node to produce an output",
        ));
    }
}

fn check_edges(
    edges: &[CanvasEdge],
    by_id: &HashMap<&str, &CanvasNode>,
    findings: &mut Findings,
) {
    for edge in edges {
        let source = by_id.get(edge.source.as_str());
        let target = by_id.get(edge.target.as_str());

        if source.is_none() {
            findings.error(
                ValidationIssue::new(
                    IssueCode::InvalidSource,
                    format!("Edge '{}' starts at unknown node '{}'", edge.id, edge.source),
                )
                .at_edge(&edge.id),
            );
        }
        if target.is_none() {
            findings.error(
                ValidationIssue::new(
                    IssueCode::InvalidTarget,
                    format!("Edge '{}' ends at unknown node '{}'", edge.id, edge.target),
                )
                .at_edge(&edge.id),
            );
        }

        if let (Some(source), Some(target)) = (source, target) {
            if !source.node_type.can_connect_to(target.node_type) {
                findings.error(
                    ValidationIssue::new(
                        IssueCode::InvalidConnection,
                        format!(
                            "A {} node cannot feed a {} node ('{}' -> '{}')",
                            source.node_type, target.node_type, source.id, target.id
                        ),
                    )
                    .at_node(&target.id)
                    .at_edge(&edge.id),
                );
            }
        }
    }
}

/// Depth-first search; an edge into a node still on the recursion stack closes a cycle.
fn check_cycles(sorter: &TopologicalSorter<'_>, findings: &mut Findings) {
    let graph = sorter.graph();
    let mut back_edges = Vec::new();

    depth_first_search(graph, graph.node_indices(), |event| {
        if let DfsEvent::BackEdge(from, to) = event {
            back_edges.push((from, to));
        }
    });

    let mut reported = HashSet::new();
    for (from, to) in back_edges {
        let Some(edge) = graph.find_edge(from, to).map(|e| graph[e]) else {
            continue;
        };
        if !reported.insert(edge.id.as_str()) {
            continue;
        }
        findings.error(
            ValidationIssue::new(
                IssueCode::CycleDetected,
                format!(
                    "Cycle detected: edge '{}' leads from '{}' back to '{}'",
                    edge.id, graph[from].id, graph[to].id
                ),
            )
            .at_node(&graph[to].id)
            .at_edge(&edge.id),
        );
    }
}

fn check_connectivity(
    by_id: &HashMap<&str, &CanvasNode>,
    edges: &[CanvasEdge],
    findings: &mut Findings,
) {
    let mut has_incoming = HashSet::new();
    let mut has_outgoing = HashSet::new();
    for edge in edges {
        if by_id.contains_key(edge.source.as_str()) && by_id.contains_key(edge.target.as_str()) {
            has_outgoing.insert(edge.source.as_str());
            has_incoming.insert(edge.target.as_str());
        }
    }

    let mut nodes: Vec<_> = by_id.values().collect();
    nodes.sort_by(|a, b| a.id.cmp(&b.id));

    for node in nodes {
        if !node.node_type.is_entry() && !has_incoming.contains(node.id.as_str()) {
            findings.warn(
                ValidationIssue::new(
                    IssueCode::NoIncomingEdges,
                    format!("Node '{}' has no incoming connections", node.id),
                )
                .at_node(&node.id),
            );
        }
        if !node.node_type.is_terminal() && !has_outgoing.contains(node.id.as_str()) {
            findings.warn(
                ValidationIssue::new(
                    IssueCode::NoOutgoingEdges,
                    format!("Node '{}' has no outgoing connections", node.id),
                )
                .at_node(&node.id),
            );
        }
    }
}

fn check_expected_ancestors(
    by_id: &HashMap<&str, &CanvasNode>,
    sorter: &TopologicalSorter<'_>,
    findings: &mut Findings,
) {
    let mut nodes: Vec<_> = by_id.values().collect();
    nodes.sort_by(|a, b| a.id.cmp(&b.id));

    for node in nodes {
        let Some(expected) = node.node_type.expected_ancestor() else {
            continue;
        };
        let satisfied = sorter
            .ancestors(&node.id)
            .iter()
            .any(|ancestor| ancestor.node_type == expected);
        if !satisfied {
            findings.warn(
                ValidationIssue::new(
                    IssueCode::MissingUpstream,
                    format!(
                        "{} node '{}' typically requires a {} node upstream",
                        node.node_type, node.id, expected
                    ),
                )
                .at_node(&node.id),
            );
        }
    }
}
