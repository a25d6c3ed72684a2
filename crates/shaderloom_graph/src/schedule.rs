// SPDX-License-Identifier: MIT OR Apache-2.0
//! Topological scheduling of the pipeline graph.
//!
//! The schedule is computed backwards from the render output: a node is
//! ordered once every consumer that eventually reaches the output has been
//! ordered. Feedback targets join as weak roots so a shader that is only
//! read through a `LastFrame` node still renders. Reversing the result puts
//! producers first.

use std::collections::VecDeque;

use crate::compiler::BuildError;
use crate::graph::Graph;
use crate::link::LinkId;
use crate::node::NodeId;
use indexmap::{IndexMap, IndexSet};

/// An upstream node feeding one input slot of a scheduled node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Producer {
    /// Source node
    pub node: NodeId,
    /// Destination input slot
    pub slot: u32,
    /// The link carrying the data
    pub link: LinkId,
}

/// Execution order of a graph, producers first
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    order: Vec<NodeId>,
    render_output: NodeId,
    direct_render_node: NodeId,
    producers: IndexMap<NodeId, Vec<Producer>>,
}

impl Schedule {
    /// Order the nodes of `graph` that contribute to the render output.
    ///
    /// Fails with [`BuildError::AmbiguousSink`] unless exactly one shader
    /// links to the render output, and with [`BuildError::Cycle`] when
    /// links (feedback references aside) form a loop.
    pub fn build(graph: &Graph) -> Result<Self, BuildError> {
        let sinks: Vec<_> = graph.sink_links().collect();
        let [sink] = sinks.as_slice() else {
            return Err(BuildError::AmbiguousSink { count: sinks.len() });
        };
        let render_output = sink.to_node;
        let direct_render_node = sink.from_node;

        let mut producers: IndexMap<NodeId, Vec<Producer>> = IndexMap::new();
        for link in graph.links() {
            let consumer = graph
                .node(link.to_node)
                .ok_or(BuildError::MissingNode(link.to_node))?;
            let slot = consumer
                .input_slot(link.to_pin)
                .ok_or(BuildError::MissingNode(link.to_node))?;
            producers.entry(link.to_node).or_default().push(Producer {
                node: link.from_node,
                slot,
                link: link.id,
            });
        }

        let weak_roots: IndexSet<NodeId> = graph
            .nodes()
            .filter_map(|n| n.last_frame_target())
            .filter(|target| graph.node(*target).is_some())
            .collect();

        // Only consumers that themselves feed a root hold a producer back.
        let reachable = reachable_from(
            std::iter::once(render_output).chain(weak_roots.iter().copied()),
            &producers,
        );
        let mut consumers: IndexMap<NodeId, usize> = IndexMap::new();
        for link in graph.links() {
            if reachable.contains(&link.to_node) {
                *consumers.entry(link.from_node).or_default() += 1;
            }
        }

        let mut queue = VecDeque::from([render_output]);
        for root in &weak_roots {
            if *root != render_output && !consumers.contains_key(root) {
                queue.push_back(*root);
            }
        }

        let mut visited: IndexSet<NodeId> = IndexSet::new();
        let mut order = Vec::new();
        while let Some(node) = queue.pop_front() {
            visited.insert(node);
            order.push(node);
            for producer in producers.get(&node).into_iter().flatten() {
                visited.insert(producer.node);
                if let Some(remaining) = consumers.get_mut(&producer.node) {
                    *remaining = remaining.saturating_sub(1);
                    if *remaining == 0 {
                        queue.push_back(producer.node);
                    }
                }
            }
        }

        if visited.len() != order.len() {
            let stuck: Vec<_> = visited
                .iter()
                .filter(|n| !order.contains(n))
                .filter_map(|n| graph.node(*n))
                .map(|n| n.name.as_str())
                .collect();
            tracing::error!(nodes = ?stuck, "Loop detected");
            return Err(BuildError::Cycle);
        }

        order.reverse();
        tracing::debug!(nodes = order.len(), "Scheduled pipeline");
        Ok(Self {
            order,
            render_output,
            direct_render_node,
            producers,
        })
    }

    /// Nodes in execution order
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    /// Whether the node takes part in the pipeline
    pub fn contains(&self, node: NodeId) -> bool {
        self.order.contains(&node)
    }

    /// Position of a node in the execution order
    pub fn position(&self, node: NodeId) -> Option<usize> {
        self.order.iter().position(|n| *n == node)
    }

    /// Upstream nodes feeding `node`, in link order
    pub fn producers(&self, node: NodeId) -> &[Producer] {
        self.producers.get(&node).map_or(&[], Vec::as_slice)
    }

    /// The render output node
    pub fn render_output(&self) -> NodeId {
        self.render_output
    }

    /// The shader drawing to the surface
    pub fn direct_render_node(&self) -> NodeId {
        self.direct_render_node
    }
}

fn reachable_from(
    roots: impl IntoIterator<Item = NodeId>,
    producers: &IndexMap<NodeId, Vec<Producer>>,
) -> IndexSet<NodeId> {
    let mut reachable = IndexSet::new();
    let mut stack: Vec<NodeId> = roots.into_iter().collect();
    while let Some(node) = stack.pop() {
        if reachable.insert(node) {
            stack.extend(producers.get(&node).into_iter().flatten().map(|p| p.node));
        }
    }
    reachable
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pin::PinId;

    fn out(graph: &Graph, node: NodeId) -> PinId {
        graph.node(node).unwrap().outputs[0].id
    }

    fn input(graph: &Graph, node: NodeId, slot: usize) -> PinId {
        graph.node(node).unwrap().inputs[slot].id
    }

    #[test]
    fn test_producers_come_first() {
        let mut graph = Graph::with_initial_pipeline();
        let b = graph.direct_render_node().unwrap();
        let a = graph.spawn_shader("");
        let feedback = graph.spawn_last_frame(Some(a)).unwrap();
        graph.connect(out(&graph, a), input(&graph, b, 0)).unwrap();
        graph.connect(out(&graph, feedback), input(&graph, b, 1)).unwrap();

        let schedule = Schedule::build(&graph).unwrap();
        let output = graph.render_output().unwrap();
        assert_eq!(schedule.order().len(), 4);
        assert!(schedule.position(a) < schedule.position(b));
        assert!(schedule.position(feedback) < schedule.position(b));
        assert_eq!(schedule.order().last(), Some(&output));
        assert_eq!(schedule.direct_render_node(), b);
        assert_eq!(schedule.producers(b).len(), 2);
        assert_eq!(schedule.producers(b)[1].slot, 1);
        assert!(schedule.producers(a).is_empty());
    }

    #[test]
    fn test_missing_or_non_shader_sink_is_ambiguous() {
        let mut graph = Graph::with_initial_pipeline();
        let direct = graph.direct_render_node().unwrap();
        let link = graph.links_to_node(graph.render_output().unwrap()).next().unwrap().id;
        graph.disconnect(link);
        assert_eq!(
            Schedule::build(&graph),
            Err(BuildError::AmbiguousSink { count: 0 })
        );

        let keyboard = graph.spawn_keyboard();
        let output = graph.render_output().unwrap();
        graph.connect(out(&graph, keyboard), input(&graph, output, 0)).unwrap();
        assert_eq!(
            Schedule::build(&graph),
            Err(BuildError::AmbiguousSink { count: 0 })
        );
        assert!(graph.node(direct).is_some());
    }

    #[test]
    fn test_link_cycle_is_detected() {
        let mut graph = Graph::with_initial_pipeline();
        let b = graph.direct_render_node().unwrap();
        let a = graph.spawn_shader("");
        graph.connect(out(&graph, a), input(&graph, b, 0)).unwrap();
        graph.connect(out(&graph, b), input(&graph, a, 0)).unwrap();
        assert_eq!(Schedule::build(&graph), Err(BuildError::Cycle));
    }

    #[test]
    fn test_feedback_loop_is_not_a_cycle() {
        let mut graph = Graph::with_initial_pipeline();
        let a = graph.direct_render_node().unwrap();
        let b = graph.spawn_shader("");
        let feedback = graph.spawn_last_frame(Some(b)).unwrap();
        graph.connect(out(&graph, b), input(&graph, a, 0)).unwrap();
        graph.connect(out(&graph, feedback), input(&graph, b, 0)).unwrap();

        let schedule = Schedule::build(&graph).unwrap();
        let output = graph.render_output().unwrap();
        assert_eq!(schedule.order(), &[feedback, b, a, output]);
    }

    #[test]
    fn test_dangling_consumers_are_ignored() {
        let mut graph = Graph::with_initial_pipeline();
        let direct = graph.direct_render_node().unwrap();
        let orphan = graph.spawn_shader("");
        graph.connect(out(&graph, direct), input(&graph, orphan, 0)).unwrap();

        let schedule = Schedule::build(&graph).unwrap();
        assert_eq!(schedule.order().len(), 2);
        assert!(!schedule.contains(orphan));
    }

    #[test]
    fn test_unreferenced_feedback_target_is_a_weak_root() {
        let mut graph = Graph::with_initial_pipeline();
        let hidden = graph.spawn_shader("");
        graph.spawn_last_frame(Some(hidden)).unwrap();

        let schedule = Schedule::build(&graph).unwrap();
        assert!(schedule.contains(hidden));
        assert_eq!(schedule.order().len(), 3);

        let plan = crate::allocator::BufferPlan::plan(&graph, &schedule).unwrap();
        assert_eq!(plan.buffering(hidden), crate::allocator::Buffering::Double);
    }
}
