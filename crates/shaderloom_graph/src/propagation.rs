// SPDX-License-Identifier: MIT OR Apache-2.0
//! Content type propagation.
//!
//! Node content types are authored on shaders and fixed for sources. This
//! pass pushes them along links and feedback references until every pin
//! agrees with what flows into it.

use crate::compiler::BuildError;
use crate::graph::Graph;
use crate::node::{ContentType, NodeId};
use crate::pin::PinId;
use indexmap::IndexMap;

/// Upper bound on propagation passes before giving up
pub const MAX_PROPAGATION_PASSES: usize = 32;

/// Propagate content types to a fixed point.
///
/// Returns the number of passes run, including the final pass that changed
/// nothing.
pub fn propagate_types(graph: &mut Graph) -> Result<usize, BuildError> {
    for pass in 1..=MAX_PROPAGATION_PASSES {
        if !propagation_pass(graph)? {
            tracing::trace!(passes = pass, "Type propagation converged");
            return Ok(pass);
        }
    }
    Err(BuildError::TypePropagationDiverged {
        passes: MAX_PROPAGATION_PASSES,
    })
}

/// Run one pass, returning whether anything changed.
fn propagation_pass(graph: &mut Graph) -> Result<bool, BuildError> {
    let mut changed = false;

    // Feedback nodes expose their target's content.
    let feedback: Vec<(NodeId, ContentType)> = graph
        .nodes()
        .filter_map(|node| {
            let target = node.last_frame_target()?;
            let target = graph.node(target).filter(|t| t.is_shader())?;
            Some((node.id, target.content_type))
        })
        .collect();
    for (id, content_type) in feedback {
        if let Some(node) = graph.node_mut(id) {
            if node.content_type != content_type {
                node.content_type = content_type;
                changed = true;
            }
        }
    }

    let mut sources: IndexMap<PinId, NodeId> = IndexMap::new();
    for link in graph.links() {
        if sources.insert(link.to_pin, link.from_node).is_some() {
            return Err(BuildError::FanIn { pin: link.to_pin });
        }
    }
    let input_types: IndexMap<PinId, ContentType> = sources
        .iter()
        .map(|(pin, source)| {
            let content_type = graph
                .node(*source)
                .map(|n| n.content_type)
                .unwrap_or_default();
            (*pin, content_type)
        })
        .collect();

    for node in graph.nodes_mut() {
        for pin in &mut node.inputs {
            let content_type = input_types.get(&pin.id).copied().unwrap_or_default();
            if pin.content_type != content_type {
                pin.content_type = content_type;
                changed = true;
            }
        }
        for pin in &mut node.outputs {
            if pin.content_type != node.content_type {
                pin.content_type = node.content_type;
                changed = true;
            }
        }
    }

    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::Link;

    #[test]
    fn test_cube_map_shader_reaches_consumers_through_feedback() {
        let mut graph = Graph::with_initial_pipeline();
        let cube = graph.spawn_shader("");
        graph.set_shader_content_type(cube, ContentType::CubeMap).unwrap();
        let feedback = graph.spawn_last_frame(Some(cube)).unwrap();
        let direct = graph.direct_render_node().unwrap();
        let feedback_out = graph.node(feedback).unwrap().outputs[0].id;
        let direct_in = graph.node(direct).unwrap().inputs[2].id;
        graph.connect(feedback_out, direct_in).unwrap();

        let passes = propagate_types(&mut graph).unwrap();
        assert!(passes > 1);

        let feedback = graph.node(feedback).unwrap();
        assert_eq!(feedback.content_type, ContentType::CubeMap);
        assert_eq!(feedback.outputs[0].content_type, ContentType::CubeMap);
        let direct = graph.node(direct).unwrap();
        assert_eq!(direct.inputs[2].content_type, ContentType::CubeMap);
        assert_eq!(direct.inputs[0].content_type, ContentType::Image);
        assert_eq!(graph.node(cube).unwrap().outputs[0].content_type, ContentType::CubeMap);
    }

    #[test]
    fn test_second_run_changes_nothing() {
        let mut graph = Graph::with_initial_pipeline();
        let texture = graph.spawn_cube_map(None);
        let direct = graph.direct_render_node().unwrap();
        let from = graph.node(texture).unwrap().outputs[0].id;
        let to = graph.node(direct).unwrap().inputs[0].id;
        graph.connect(from, to).unwrap();

        propagate_types(&mut graph).unwrap();
        let before: Vec<_> = graph.nodes().cloned().collect();
        assert_eq!(propagate_types(&mut graph).unwrap(), 1);
        let after: Vec<_> = graph.nodes().cloned().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_unlinked_inputs_fall_back_to_image() {
        let mut graph = Graph::new();
        let shader = graph.spawn_shader("");
        let cube = graph.spawn_cube_map(None);
        let from = graph.node(cube).unwrap().outputs[0].id;
        let to = graph.node(shader).unwrap().inputs[0].id;
        let link = graph.connect(from, to).unwrap();
        propagate_types(&mut graph).unwrap();
        assert_eq!(graph.node(shader).unwrap().inputs[0].content_type, ContentType::CubeMap);

        graph.disconnect(link);
        propagate_types(&mut graph).unwrap();
        assert_eq!(graph.node(shader).unwrap().inputs[0].content_type, ContentType::Image);
    }

    #[test]
    fn test_fan_in_fails_fast() {
        let mut graph = Graph::new();
        let a = graph.spawn_shader("");
        let b = graph.spawn_shader("");
        let c = graph.spawn_shader("");
        let a_out = graph.node(a).unwrap().outputs[0].id;
        let b_out = graph.node(b).unwrap().outputs[0].id;
        let c_in = graph.node(c).unwrap().inputs[0].id;
        graph.connect(a_out, c_in).unwrap();
        graph.insert_link_unchecked(Link::new(b, b_out, c, c_in));

        assert_eq!(
            propagate_types(&mut graph).unwrap_err(),
            BuildError::FanIn { pin: c_in }
        );
    }
}
