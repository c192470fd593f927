//! GPU pipeline cache and background compiler (§4.4).
//!
//! Structured the way a real render backend's pipeline manager is: cache
//! maps guarded by their own mutex, layouts interned and shared via `Arc`,
//! and a background worker pool that upgrades fast-linked variants to fully
//! optimized ones without blocking the render thread.

pub mod binding;
pub mod compiler;
pub mod device;
pub mod layout;
pub mod pipeline;
pub mod state;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use binding::{coalesce_bindings, ShaderBindingList};
use compiler::CompilerPool;
use device::{GfxDevice, ShaderCode};
use layout::{DescriptorSetLayoutKey, LayoutCache, PipelineLayout};
use pipeline::{ComputePipeline, GraphicsPipeline, GraphicsPipelineVariant, PipelineError};
use state::{PipelineVariantKey, PushConstantRange};

use crate::error::Result;

pub use binding::{CoalescedBinding, DescriptorType, ShaderBinding, ShaderStages};
pub use device::DeviceCaps;
pub use layout::DescriptorSetLayout;
pub use state::{ColorFormat, CullMode, RenderState, RenderTargetState, SpecConstants, SubgroupSizePolicy, Topology};

/// A shader stage's compiled bytecode plus its declared bindings, as input
/// to pipeline layout derivation.
pub struct ShaderStage {
    /// Compiled bytecode.
    pub code: ShaderCode,
    /// Declared bindings, any order.
    pub bindings: Vec<ShaderBinding>,
    /// Push-constant block size this stage requests, in bytes.
    pub push_constant_bytes: u32,
    /// The stage flag identifying this shader.
    pub stage: ShaderStages,
}

/// Top-level pipeline cache: owns layout interning and a background
/// compiler pool, and hands out graphics/compute pipelines grounded on them.
pub struct PipelineCache<D: GfxDevice + 'static> {
    device: Arc<D>,
    layouts: LayoutCache<D>,
    compiler: Arc<CompilerPool>,
    graphics: Mutex<HashMap<usize, Arc<GraphicsPipeline<D>>>>,
    compute: Mutex<HashMap<usize, Arc<ComputePipeline<D>>>>,
}

impl<D: GfxDevice + 'static> PipelineCache<D> {
    /// Creates a cache with one compiler thread per hardware thread.
    pub fn new(device: Arc<D>) -> Self {
        let compiler = Arc::new(CompilerPool::for_hardware_concurrency());
        Self { layouts: LayoutCache::new(Arc::clone(&device)), device, compiler, graphics: Mutex::new(HashMap::new()), compute: Mutex::new(HashMap::new()) }
    }

    /// Derives the pipeline layout for a set of shader stages by coalescing
    /// their bindings, the way `getPipelineLayoutForShaders` does.
    pub fn pipeline_layout(&self, stages: &[ShaderStage]) -> Result<Arc<PipelineLayout>> {
        let lists: Vec<ShaderBindingList> = stages
            .iter()
            .map(|stage| {
                ShaderBindingList::new(
                    stage
                        .bindings
                        .iter()
                        .map(|b| ShaderBinding { stage: stage.stage, ..*b })
                        .collect(),
                )
            })
            .collect();

        let sets = coalesce_bindings(&lists)?;

        let mut set_layouts = Vec::with_capacity(sets.len());
        for bindings in sets {
            set_layouts.push(self.layouts.get_set_layout(DescriptorSetLayoutKey::new(bindings))?);
        }

        let push_constants = stages.iter().fold(PushConstantRange::default(), |mut acc, stage| {
            if stage.push_constant_bytes > 0 {
                acc.stages |= stage.stage;
                acc.bytes = acc.bytes.max(stage.push_constant_bytes);
            }
            acc
        });

        self.layouts.get_pipeline_layout(set_layouts, push_constants.stages, push_constants.bytes)
    }

    /// Gets or creates the graphics pipeline for `stages`, keyed by the
    /// identity of its layout and shader bytecode pointers.
    pub fn get_or_create_graphics(&self, key: usize, layout: Arc<PipelineLayout>, shaders: Vec<ShaderCode>) -> Arc<GraphicsPipeline<D>> {
        let mut cache = self.graphics.lock().expect("pipeline cache poisoned");
        Arc::clone(cache.entry(key).or_insert_with(|| {
            log::debug!("creating graphics pipeline {key:#x}");
            Arc::new(GraphicsPipeline::new(Arc::clone(&self.device), Arc::clone(&self.compiler), layout, shaders))
        }))
    }

    /// Gets or creates the compute pipeline for `key`.
    pub fn get_or_create_compute(&self, key: usize, layout: Arc<PipelineLayout>, shader: ShaderCode) -> Arc<ComputePipeline<D>> {
        let mut cache = self.compute.lock().expect("pipeline cache poisoned");
        Arc::clone(cache.entry(key).or_insert_with(|| {
            log::debug!("creating compute pipeline {key:#x}");
            Arc::new(ComputePipeline::new(Arc::clone(&self.device), layout, shader))
        }))
    }

    /// Resolves a graphics pipeline variant for the given render/target state.
    pub fn get_variant(&self, pipeline: &Arc<GraphicsPipeline<D>>, key: &PipelineVariantKey) -> std::result::Result<GraphicsPipelineVariant, PipelineError> {
        pipeline.get_variant(key).map_err(PipelineError::CompileFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::binding::DescriptorType;
    use crate::gfx::device::tests::FakeDevice;

    #[test]
    fn pipeline_layout_coalesces_stage_bindings() {
        let cache = PipelineCache::new(Arc::new(FakeDevice::default()));

        let vertex = ShaderStage {
            code: vec![],
            bindings: vec![ShaderBinding { set: 0, index: 0, ty: DescriptorType::UniformBuffer, count: 1, stage: ShaderStages::VERTEX }],
            push_constant_bytes: 64,
            stage: ShaderStages::VERTEX,
        };
        let fragment = ShaderStage {
            code: vec![],
            bindings: vec![ShaderBinding { set: 0, index: 1, ty: DescriptorType::SampledImage, count: 1, stage: ShaderStages::FRAGMENT }],
            push_constant_bytes: 0,
            stage: ShaderStages::FRAGMENT,
        };

        let layout = cache.pipeline_layout(&[vertex, fragment]).unwrap();
        assert_eq!(layout.set_count(), 1);
        assert!(layout.set_layout(0).is_some());
    }

    #[test]
    fn identical_stage_sets_share_a_pipeline_layout() {
        let cache = PipelineCache::new(Arc::new(FakeDevice::default()));
        let stage = |set| ShaderStage {
            code: vec![],
            bindings: vec![ShaderBinding { set: 0, index: 0, ty: DescriptorType::UniformBuffer, count: 1, stage: set }],
            push_constant_bytes: 0,
            stage: set,
        };

        let a = cache.pipeline_layout(&[stage(ShaderStages::VERTEX)]).unwrap();
        let b = cache.pipeline_layout(&[stage(ShaderStages::VERTEX)]).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
