//! Dirty-flag dependency graph.
//!
//! A node can only name inputs that already exist, so ids are a topological
//! order and the graph is acyclic by construction.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::FlowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
struct FlowNode<T> {
    value: T,
    dirty: bool,
    inputs: Vec<NodeId>,
    dependents: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct FlowGraph<T> {
    nodes: Vec<FlowNode<T>>,
}

impl<T> Default for FlowGraph<T> {
    fn default() -> Self {
        Self { nodes: Vec::new() }
    }
}

impl<T> FlowGraph<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// New nodes start dirty so their first read computes them.
    pub fn add_node(&mut self, value: T, inputs: &[NodeId]) -> Result<NodeId, FlowError> {
        if let Some(&input) = inputs.iter().find(|input| input.index() >= self.nodes.len()) {
            return Err(FlowError::UnknownInput { input });
        }
        let id = NodeId(self.nodes.len() as u32);
        let mut unique: Vec<NodeId> = Vec::with_capacity(inputs.len());
        for &input in inputs {
            if !unique.contains(&input) {
                unique.push(input);
                self.nodes[input.index()].dependents.push(id);
            }
        }
        self.nodes.push(FlowNode {
            value,
            dirty: true,
            inputs: unique,
            dependents: Vec::new(),
        });
        Ok(id)
    }

    pub fn value(&self, id: NodeId) -> Option<&T> {
        self.nodes.get(id.index()).map(|node| &node.value)
    }

    pub fn value_mut(&mut self, id: NodeId) -> Option<&mut T> {
        self.nodes.get_mut(id.index()).map(|node| &mut node.value)
    }

    pub fn inputs(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.index())
            .map(|node| node.inputs.as_slice())
            .unwrap_or(&[])
    }

    pub fn dependents(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.index())
            .map(|node| node.dependents.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_dirty(&self, id: NodeId) -> bool {
        self.nodes.get(id.index()).is_some_and(|node| node.dirty)
    }

    /// Marks `id` and every transitive dependent; already-dirty nodes stop
    /// the walk. Returns how many nodes changed state.
    pub fn mark_dirty(&mut self, id: NodeId) -> usize {
        let mut marked = 0;
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get_mut(current.index()) else {
                continue;
            };
            if node.dirty {
                continue;
            }
            node.dirty = true;
            marked += 1;
            stack.extend(node.dependents.iter().copied());
        }
        marked
    }

    /// Marks only the dependents of `id`, leaving `id` itself as it is.
    pub fn mark_downstream_dirty(&mut self, id: NodeId) -> usize {
        let dependents = self.dependents(id).to_vec();
        dependents
            .into_iter()
            .map(|dependent| self.mark_dirty(dependent))
            .sum()
    }

    /// Dirty nodes among `id` and its transitive inputs, inputs first.
    pub fn dirty_upstream(&self, id: NodeId) -> Vec<NodeId> {
        let mut pending = BTreeSet::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !self.is_dirty(current) || !pending.insert(current) {
                continue;
            }
            stack.extend(self.inputs(current).iter().copied());
        }
        // ids are a topological order
        pending.into_iter().collect()
    }

    pub fn dirty_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.dirty)
            .map(|(index, _)| NodeId(index as u32))
            .collect()
    }

    /// Recomputes whatever `id` needs and clears each flag after its
    /// recompute succeeds. A clean node costs nothing. On error the failing
    /// node and everything after it stay dirty.
    pub fn refresh<E, F>(&mut self, id: NodeId, mut recompute: F) -> Result<usize, E>
    where
        F: FnMut(NodeId, &T) -> Result<(), E>,
    {
        let pending = self.dirty_upstream(id);
        for &node in &pending {
            recompute(node, &self.nodes[node.index()].value)?;
            self.nodes[node.index()].dirty = false;
        }
        Ok(pending.len())
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use super::*;

    fn chain() -> (FlowGraph<&'static str>, NodeId, NodeId, NodeId) {
        let mut graph = FlowGraph::new();
        let c = graph.add_node("c", &[]).unwrap();
        let b = graph.add_node("b", &[c]).unwrap();
        let a = graph.add_node("a", &[b]).unwrap();
        (graph, a, b, c)
    }

    fn refresh_logged(graph: &mut FlowGraph<&'static str>, id: NodeId) -> Vec<&'static str> {
        let mut log = Vec::new();
        graph
            .refresh(id, |_, value| {
                log.push(*value);
                Ok::<_, Infallible>(())
            })
            .unwrap();
        log
    }

    #[test]
    fn marking_a_source_dirties_the_whole_chain() {
        let (mut graph, a, b, c) = chain();
        refresh_logged(&mut graph, a);
        assert!(!graph.is_dirty(a) && !graph.is_dirty(b) && !graph.is_dirty(c));

        assert_eq!(graph.mark_dirty(c), 3);
        assert!(graph.is_dirty(a) && graph.is_dirty(b) && graph.is_dirty(c));

        assert_eq!(refresh_logged(&mut graph, a), vec!["c", "b", "a"]);
        assert!(!graph.is_dirty(a) && !graph.is_dirty(b) && !graph.is_dirty(c));
    }

    #[test]
    fn clean_reads_are_memoized() {
        let (mut graph, a, _, _) = chain();
        assert_eq!(refresh_logged(&mut graph, a).len(), 3);
        assert!(refresh_logged(&mut graph, a).is_empty());
        assert!(refresh_logged(&mut graph, a).is_empty());
    }

    #[test]
    fn reading_a_middle_node_leaves_dependents_dirty() {
        let (mut graph, a, b, c) = chain();
        refresh_logged(&mut graph, a);
        graph.mark_dirty(c);
        assert_eq!(refresh_logged(&mut graph, b), vec!["c", "b"]);
        assert!(graph.is_dirty(a));
        assert_eq!(refresh_logged(&mut graph, a), vec!["a"]);
    }

    #[test]
    fn diamond_recomputes_each_node_once() {
        let mut graph = FlowGraph::new();
        let source = graph.add_node("source", &[]).unwrap();
        let left = graph.add_node("left", &[source]).unwrap();
        let right = graph.add_node("right", &[source]).unwrap();
        let sink = graph.add_node("sink", &[left, right, left]).unwrap();
        assert_eq!(graph.inputs(sink), &[left, right]);
        refresh_logged(&mut graph, sink);

        assert_eq!(graph.mark_dirty(source), 4);
        assert_eq!(graph.mark_dirty(source), 0);
        assert_eq!(
            refresh_logged(&mut graph, sink),
            vec!["source", "left", "right", "sink"]
        );
    }

    #[test]
    fn downstream_marking_skips_the_node_itself() {
        let (mut graph, a, b, c) = chain();
        refresh_logged(&mut graph, a);
        assert_eq!(graph.mark_downstream_dirty(b), 1);
        assert!(graph.is_dirty(a));
        assert!(!graph.is_dirty(b) && !graph.is_dirty(c));
        assert_eq!(refresh_logged(&mut graph, a), vec!["a"]);
    }

    #[test]
    fn inputs_must_exist_before_the_node() {
        let mut graph: FlowGraph<()> = FlowGraph::new();
        let first = graph.add_node((), &[]).unwrap();
        let err = graph.add_node((), &[NodeId(5)]).unwrap_err();
        assert_eq!(err, FlowError::UnknownInput { input: NodeId(5) });
        assert_eq!(graph.len(), 1);
        assert!(graph.dependents(first).is_empty());
    }

    #[test]
    fn failed_recompute_keeps_flags() {
        let (mut graph, a, b, c) = chain();
        let result: Result<usize, &str> =
            graph.refresh(a, |_, value| if *value == "b" { Err("boom") } else { Ok(()) });
        assert_eq!(result, Err("boom"));
        assert!(!graph.is_dirty(c));
        assert!(graph.is_dirty(b) && graph.is_dirty(a));
    }
}
