//! Joint hierarchy flattening (§4.5 step 7).
//!
//! Every joint referenced by any skin is joined into one BFS traversal
//! starting from joints whose parent is not itself a referenced joint,
//! assigning contiguous indices in traversal order. This guarantees a
//! parent's index is always less than any child's.

use std::collections::{HashMap, VecDeque};

use super::metadata::JointMetadata;

/// A joint node before flattening, identified by its source (e.g. glTF node) index.
#[derive(Debug, Clone)]
pub struct JointNode {
    /// Source node index, used only to resolve `children`/`parent` before flattening.
    pub source_index: u32,
    /// Source index of the parent node, or `None` for a root.
    pub parent_source_index: Option<u32>,
    /// Joint name.
    pub name: String,
    /// Inverse bind matrix.
    pub inverse_bind: [f32; 16],
}

/// Flattens a set of joint nodes into BFS order, remapping `parent` to the
/// new contiguous index space. Roots (nodes whose parent is absent from
/// `nodes`) are visited in their input order.
pub fn flatten_joints(nodes: &[JointNode]) -> (Vec<JointMetadata>, HashMap<u32, u32>) {
    let by_source: HashMap<u32, usize> = nodes.iter().enumerate().map(|(i, n)| (n.source_index, i)).collect();

    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    let mut roots = Vec::new();
    for node in nodes {
        match node.parent_source_index {
            Some(parent) if by_source.contains_key(&parent) => {
                children.entry(parent).or_default().push(node.source_index);
            }
            _ => roots.push(node.source_index),
        }
    }

    let mut new_index: HashMap<u32, u32> = HashMap::new();
    let mut order = Vec::with_capacity(nodes.len());
    let mut queue: VecDeque<u32> = roots.into_iter().collect();

    while let Some(source) = queue.pop_front() {
        if new_index.contains_key(&source) {
            continue;
        }
        new_index.insert(source, order.len() as u32);
        order.push(source);

        if let Some(kids) = children.get(&source) {
            queue.extend(kids.iter().copied());
        }
    }

    let flattened = order
        .iter()
        .map(|&source| {
            let node = &nodes[by_source[&source]];
            let parent = node.parent_source_index.and_then(|p| new_index.get(&p).copied());
            JointMetadata { name: node.name.clone(), parent, inverse_bind: node.inverse_bind }
        })
        .collect();

    (flattened, new_index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(source: u32, parent: Option<u32>, name: &str) -> JointNode {
        JointNode { source_index: source, parent_source_index: parent, name: name.into(), inverse_bind: [0.0; 16] }
    }

    #[test]
    fn parent_index_always_precedes_child_index() {
        // A tree with two roots and a deeper branch to exercise BFS ordering.
        let nodes = vec![
            node(10, None, "root_a"),
            node(20, None, "root_b"),
            node(11, Some(10), "child_of_a"),
            node(21, Some(20), "child_of_b"),
            node(12, Some(11), "grandchild"),
        ];

        let (joints, _index) = flatten_joints(&nodes);
        assert_eq!(joints.len(), 5);

        for (i, joint) in joints.iter().enumerate() {
            if let Some(parent) = joint.parent {
                assert!((parent as usize) < i, "joint {i} parent {parent} must precede it");
            }
        }
    }

    #[test]
    fn joint_with_no_referenced_parent_becomes_a_root() {
        let nodes = vec![node(5, Some(999), "orphan")];
        let (joints, _) = flatten_joints(&nodes);
        assert_eq!(joints[0].parent, None);
    }
}
