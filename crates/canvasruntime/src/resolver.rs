//! Declarative input wiring.
//!
//! Each node type maps to a list of bindings. A binding fills one input field
//! from a completed upstream output of the first matching kind (the newest
//! one, or the first entry node for entry kinds), falls back to a field of
//! the run's original input, and is left out otherwise.

use canvascore::{NodeId, NodeType, Record};
use std::collections::HashMap;

/// Source of one input field
#[derive(Debug, Clone, PartialEq)]
pub struct InputBinding {
    pub field: String,
    /// Upstream (kind, output field) pairs in preference order
    pub sources: Vec<(NodeType, String)>,
    /// Field of the run's original input used when no upstream matches
    pub fallback: Option<String>,
}

impl InputBinding {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            sources: Vec::new(),
            fallback: None,
        }
    }

    pub fn from_upstream(mut self, kind: NodeType, output_field: impl Into<String>) -> Self {
        self.sources.push((kind, output_field.into()));
        self
    }

    pub fn or_input(mut self, field: impl Into<String>) -> Self {
        self.fallback = Some(field.into());
        self
    }
}

/// How a node type's input record is assembled
#[derive(Debug, Clone, PartialEq)]
pub enum InputPolicy {
    /// The run's original input, unchanged
    Passthrough,
    Bindings(Vec<InputBinding>),
}

static PASSTHROUGH: InputPolicy = InputPolicy::Passthrough;

/// Outputs of the steps completed so far in one run, in completion order
#[derive(Debug, Clone, Default)]
pub struct CompletedOutputs {
    entries: Vec<(NodeId, NodeType, Record)>,
}

impl CompletedOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node_id: impl Into<NodeId>, node_type: NodeType, output: Record) {
        self.entries.push((node_id.into(), node_type, output));
    }

    pub fn get(&self, node_id: &str) -> Option<&Record> {
        self.entries
            .iter()
            .find(|(id, _, _)| id == node_id)
            .map(|(_, _, output)| output)
    }

    /// `field` from the output of `kind` that feeds downstream nodes.
    ///
    /// Only the first entry node of a graph counts, so entry kinds take the
    /// oldest output; every other kind takes the newest.
    pub fn upstream_field(&self, kind: NodeType, field: &str) -> Option<&serde_json::Value> {
        let mut matching = self
            .entries
            .iter()
            .filter(|(_, node_type, _)| *node_type == kind);
        if kind.is_entry() {
            matching.find_map(|(_, _, output)| output.get(field))
        } else {
            matching.rev().find_map(|(_, _, output)| output.get(field))
        }
    }

    /// Output of the newest terminal-type step, else of the newest step
    pub fn final_output(&self) -> Option<&Record> {
        self.entries
            .iter()
            .rev()
            .find(|(_, node_type, _)| node_type.is_terminal())
            .or_else(|| self.entries.last())
            .map(|(_, _, output)| output)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Generic resolver driven by a per-type policy table
#[derive(Debug, Clone)]
pub struct InputResolver {
    policies: HashMap<NodeType, InputPolicy>,
}

impl InputResolver {
    /// Resolver with no bindings; every type receives the original input
    pub fn empty() -> Self {
        Self {
            policies: HashMap::new(),
        }
    }

    pub fn with_policy(mut self, node_type: NodeType, policy: InputPolicy) -> Self {
        self.policies.insert(node_type, policy);
        self
    }

    pub fn policy(&self, node_type: NodeType) -> &InputPolicy {
        self.policies.get(&node_type).unwrap_or(&PASSTHROUGH)
    }

    /// Build the concrete input for a node of `node_type`
    pub fn resolve(&self, node_type: NodeType, outputs: &CompletedOutputs, original: &Record) -> Record {
        let bindings = match self.policy(node_type) {
            InputPolicy::Passthrough => return original.clone(),
            InputPolicy::Bindings(bindings) => bindings,
        };

        let mut input = Record::new();
        for binding in bindings {
            let upstream = binding
                .sources
                .iter()
                .find_map(|(kind, field)| outputs.upstream_field(*kind, field));
            let value = upstream.or_else(|| {
                binding
                    .fallback
                    .as_deref()
                    .and_then(|field| original.get(field))
            });
            if let Some(value) = value {
                input.insert(binding.field.clone(), value.clone());
            }
        }
        input
    }
}

fn query_binding() -> InputBinding {
    InputBinding::new("query")
        .from_upstream(NodeType::Query, "query")
        .or_input("query")
}

fn documents_binding(preference: &[NodeType]) -> InputBinding {
    preference
        .iter()
        .fold(InputBinding::new("documents"), |binding, kind| {
            binding.from_upstream(*kind, "documents")
        })
        .or_input("documents")
}

impl Default for InputResolver {
    /// The standard retrieval pipeline wiring
    fn default() -> Self {
        use NodeType::*;

        let answer_documents = [Judge, Rerank, Retrieve];

        InputResolver::empty()
            .with_policy(Query, InputPolicy::Passthrough)
            .with_policy(Hyde, InputPolicy::Bindings(vec![query_binding()]))
            .with_policy(
                Embed,
                InputPolicy::Bindings(vec![InputBinding::new("text")
                    .from_upstream(Hyde, "document")
                    .from_upstream(Query, "query")
                    .or_input("query")]),
            )
            .with_policy(
                Retrieve,
                InputPolicy::Bindings(vec![
                    InputBinding::new("embedding")
                        .from_upstream(Embed, "embedding")
                        .or_input("embedding"),
                    query_binding(),
                ]),
            )
            .with_policy(
                Rerank,
                InputPolicy::Bindings(vec![query_binding(), documents_binding(&[Retrieve])]),
            )
            .with_policy(
                Judge,
                InputPolicy::Bindings(vec![query_binding(), documents_binding(&[Rerank, Retrieve])]),
            )
            .with_policy(
                Generate,
                InputPolicy::Bindings(vec![query_binding(), documents_binding(&answer_documents)]),
            )
            .with_policy(
                Agent,
                InputPolicy::Bindings(vec![query_binding(), documents_binding(&answer_documents)]),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_entry_receives_original_input() {
        let resolver = InputResolver::default();
        let original = record(json!({"query": "what is rust", "topK": 5}));
        let input = resolver.resolve(NodeType::Query, &CompletedOutputs::new(), &original);
        assert_eq!(input, original);
    }

    #[test]
    fn test_prefers_most_processed_documents() {
        let resolver = InputResolver::default();
        let mut outputs = CompletedOutputs::new();
        outputs.insert("q", NodeType::Query, record(json!({"query": "q1"})));
        outputs.insert("r", NodeType::Retrieve, record(json!({"documents": ["a", "b", "c"]})));
        outputs.insert("rr", NodeType::Rerank, record(json!({"documents": ["c", "a"]})));

        let input = resolver.resolve(NodeType::Generate, &outputs, &Record::new());
        assert_eq!(input["query"], "q1");
        assert_eq!(input["documents"], json!(["c", "a"]));
    }

    #[test]
    fn test_skips_upstream_without_the_field() {
        let resolver = InputResolver::default();
        let mut outputs = CompletedOutputs::new();
        outputs.insert("r", NodeType::Retrieve, record(json!({"documents": ["a"]})));
        outputs.insert("rr", NodeType::Rerank, record(json!({"scores": [0.9]})));

        let input = resolver.resolve(NodeType::Judge, &outputs, &Record::new());
        assert_eq!(input["documents"], json!(["a"]));
    }

    #[test]
    fn test_falls_back_to_original_input() {
        let resolver = InputResolver::default();
        let original = record(json!({"query": "fallback", "documents": ["doc"]}));

        let input = resolver.resolve(NodeType::Generate, &CompletedOutputs::new(), &original);
        assert_eq!(input["query"], "fallback");
        assert_eq!(input["documents"], json!(["doc"]));
    }

    #[test]
    fn test_absent_everywhere_leaves_field_out() {
        let resolver = InputResolver::default();
        let input = resolver.resolve(NodeType::Retrieve, &CompletedOutputs::new(), &Record::new());
        assert!(input.is_empty());
    }

    #[test]
    fn test_first_entry_output_wins() {
        let resolver = InputResolver::default();
        let mut outputs = CompletedOutputs::new();
        outputs.insert("q1", NodeType::Query, record(json!({"query": "first"})));
        outputs.insert("q2", NodeType::Query, record(json!({"query": "second"})));

        let input = resolver.resolve(NodeType::Generate, &outputs, &Record::new());
        assert_eq!(input["query"], "first");
    }

    #[test]
    fn test_embed_prefers_hypothetical_document() {
        let resolver = InputResolver::default();
        let mut outputs = CompletedOutputs::new();
        outputs.insert("q", NodeType::Query, record(json!({"query": "short"})));
        outputs.insert("h", NodeType::Hyde, record(json!({"document": "a long passage"})));

        let input = resolver.resolve(NodeType::Embed, &outputs, &Record::new());
        assert_eq!(input["text"], "a long passage");
    }

    #[test]
    fn test_custom_policy_overrides_default() {
        let resolver = InputResolver::default().with_policy(
            NodeType::Generate,
            InputPolicy::Bindings(vec![InputBinding::new("prompt").or_input("prompt")]),
        );
        let original = record(json!({"prompt": "hi", "query": "ignored"}));
        let input = resolver.resolve(NodeType::Generate, &CompletedOutputs::new(), &original);
        assert_eq!(input, record(json!({"prompt": "hi"})));
    }
}
