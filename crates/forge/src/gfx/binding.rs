//! Shader binding coalescing (§4.4).
//!
//! A pipeline's descriptor set layouts are derived by merging the sorted
//! `(set, index)` binding lists of every shader stage, the way the original
//! does it: walk every shader's next pending binding in lockstep, advance
//! the stage(s) whose pending binding has the smallest `(set, index)`, and
//! fold them into one coalesced entry. Bindings at the same slot across
//! stages must agree on descriptor type; a mismatch is a compile error.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

bitflags::bitflags! {
    /// Shader stages, mirrored after `VkShaderStageFlags`.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct ShaderStages: u32 {
        /// Vertex stage.
        const VERTEX = 1 << 0;
        /// Fragment stage.
        const FRAGMENT = 1 << 1;
        /// Compute stage.
        const COMPUTE = 1 << 2;
        /// Task (amplification) stage.
        const TASK = 1 << 3;
        /// Mesh stage.
        const MESH = 1 << 4;
    }
}

/// Descriptor type of a single binding, as declared by one shader stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    /// Uniform (constant) buffer.
    UniformBuffer,
    /// Read/write storage buffer.
    StorageBuffer,
    /// Sampled image.
    SampledImage,
    /// Storage image.
    StorageImage,
    /// Combined image/sampler.
    Sampler,
}

/// A single binding as declared by one shader stage, before coalescing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderBinding {
    /// Descriptor set index.
    pub set: u32,
    /// Binding index within the set.
    pub index: u32,
    /// Descriptor type.
    pub ty: DescriptorType,
    /// Array length; `0` means "inherit bindless capacity" (unsized array).
    pub count: u32,
    /// The stage declaring this binding.
    pub stage: ShaderStages,
}

/// A shader's bindings, pre-sorted by `(set, index)`.
#[derive(Debug, Clone)]
pub struct ShaderBindingList {
    bindings: Vec<ShaderBinding>,
}

impl ShaderBindingList {
    /// Builds a binding list, sorting by `(set, index)` as the merge requires.
    pub fn new(mut bindings: Vec<ShaderBinding>) -> Self {
        bindings.sort_by_key(|b| (b.set, b.index));
        Self { bindings }
    }
}

/// One coalesced binding, merged across every stage that declares it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoalescedBinding {
    /// Binding index within the set.
    pub index: u32,
    /// Descriptor type, agreed on by every declaring stage.
    pub ty: DescriptorType,
    /// Descriptor count: the max across declaring stages, or the bindless
    /// capacity if any stage left it unsized.
    pub count: u32,
    /// Union of stages that reference this binding.
    pub stages: ShaderStages,
    /// `true` if any declaring stage left the array unsized.
    pub bindless: bool,
}

const BINDLESS_CAPACITY: u32 = 1 << 16;

/// Merges the binding lists of every shader stage of a pipeline into one
/// descriptor set layout per set, the way the original's multi-way merge
/// over `(set, index)` does it.
pub fn coalesce_bindings(shaders: &[ShaderBindingList]) -> Result<Vec<Vec<CoalescedBinding>>> {
    let mut cursors = vec![0usize; shaders.len()];
    let mut sets: BTreeMap<u32, Vec<CoalescedBinding>> = BTreeMap::new();

    loop {
        // Find the smallest pending (set, index) across all shaders.
        let mut next: Option<(u32, u32)> = None;
        for (i, shader) in shaders.iter().enumerate() {
            if let Some(binding) = shader.bindings.get(cursors[i]) {
                let key = (binding.set, binding.index);
                if next.is_none_or(|n| key < n) {
                    next = Some(key);
                }
            }
        }

        let Some((set, index)) = next else { break };

        let mut ty = None;
        let mut count = 0u32;
        let mut stages = ShaderStages::empty();
        let mut bindless = false;

        for (i, shader) in shaders.iter().enumerate() {
            let Some(binding) = shader.bindings.get(cursors[i]) else { continue };
            if (binding.set, binding.index) != (set, index) {
                continue;
            }

            match ty {
                None => ty = Some(binding.ty),
                Some(existing) if existing == binding.ty => {}
                Some(_) => {
                    return Err(Error::InvalidArgument(format!(
                        "descriptor type mismatch at set {set} binding {index}"
                    )));
                }
            }

            stages |= binding.stage;
            if binding.count == 0 {
                bindless = true;
            } else {
                count = count.max(binding.count);
            }

            cursors[i] += 1;
        }

        if bindless {
            count = BINDLESS_CAPACITY;
        }

        sets.entry(set).or_default().push(CoalescedBinding {
            index,
            ty: ty.expect("at least one stage contributed this binding"),
            count,
            stages,
            bindless,
        });
    }

    let set_count = sets.keys().next_back().map_or(0, |max| max + 1);
    let mut result = vec![Vec::new(); set_count as usize];
    for (set, bindings) in sets {
        result[set as usize] = bindings;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(set: u32, index: u32, ty: DescriptorType, count: u32, stage: ShaderStages) -> ShaderBinding {
        ShaderBinding { set, index, ty, count, stage }
    }

    #[test]
    fn merges_disjoint_bindings_preserving_order() {
        let vertex = ShaderBindingList::new(vec![
            binding(0, 0, DescriptorType::UniformBuffer, 1, ShaderStages::VERTEX),
        ]);
        let fragment = ShaderBindingList::new(vec![
            binding(0, 1, DescriptorType::SampledImage, 1, ShaderStages::FRAGMENT),
        ]);

        let sets = coalesce_bindings(&[vertex, fragment]).unwrap();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].len(), 2);
        assert_eq!(sets[0][0].index, 0);
        assert_eq!(sets[0][1].index, 1);
    }

    #[test]
    fn unions_stage_flags_for_shared_bindings() {
        let vertex = ShaderBindingList::new(vec![
            binding(0, 0, DescriptorType::UniformBuffer, 1, ShaderStages::VERTEX),
        ]);
        let fragment = ShaderBindingList::new(vec![
            binding(0, 0, DescriptorType::UniformBuffer, 1, ShaderStages::FRAGMENT),
        ]);

        let sets = coalesce_bindings(&[vertex, fragment]).unwrap();
        assert_eq!(sets[0][0].stages, ShaderStages::VERTEX | ShaderStages::FRAGMENT);
    }

    #[test]
    fn conflicting_descriptor_types_are_rejected() {
        let vertex = ShaderBindingList::new(vec![
            binding(0, 0, DescriptorType::UniformBuffer, 1, ShaderStages::VERTEX),
        ]);
        let fragment = ShaderBindingList::new(vec![
            binding(0, 0, DescriptorType::StorageBuffer, 1, ShaderStages::FRAGMENT),
        ]);

        assert!(coalesce_bindings(&[vertex, fragment]).is_err());
    }

    #[test]
    fn unsized_array_inherits_bindless_capacity() {
        let shader = ShaderBindingList::new(vec![
            binding(0, 0, DescriptorType::SampledImage, 0, ShaderStages::FRAGMENT),
        ]);
        let sets = coalesce_bindings(&[shader]).unwrap();
        assert!(sets[0][0].bindless);
        assert_eq!(sets[0][0].count, BINDLESS_CAPACITY);
    }
}
