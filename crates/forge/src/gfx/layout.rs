//! Descriptor set and pipeline layout interning (§4.4).
//!
//! Layouts are looked up by structural key and handed out as `Arc`s so two
//! pipelines with identical binding sets share one GPU layout object;
//! callers can cheaply test "is this the same layout" with `Arc::ptr_eq`
//! instead of comparing keys.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::binding::{CoalescedBinding, ShaderStages};
use super::device::GfxDevice;
use crate::error::Result;

/// Structural key identifying a descriptor set layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DescriptorSetLayoutKey {
    bindings: Vec<CoalescedBinding>,
}

impl std::hash::Hash for CoalescedBinding {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.ty.hash(state);
        self.count.hash(state);
        self.stages.bits().hash(state);
        self.bindless.hash(state);
    }
}

impl DescriptorSetLayoutKey {
    /// Builds a key from a set's coalesced bindings.
    pub fn new(bindings: Vec<CoalescedBinding>) -> Self {
        Self { bindings }
    }

    /// The set's bindings.
    pub fn bindings(&self) -> &[CoalescedBinding] {
        &self.bindings
    }
}

/// An interned, GPU-backed descriptor set layout.
pub struct DescriptorSetLayout {
    key: DescriptorSetLayoutKey,
    handle: u64,
}

impl DescriptorSetLayout {
    /// The opaque device handle.
    pub fn handle(&self) -> u64 {
        self.handle
    }

    /// `true` if this set has no bindings at all.
    pub fn is_empty(&self) -> bool {
        self.key.bindings.is_empty()
    }

    /// `true` if this set's only binding is an unsized, update-after-bind array.
    pub fn is_bindless(&self) -> bool {
        self.key.bindings.len() == 1 && self.key.bindings[0].bindless
    }
}

/// Structural key identifying a pipeline layout: its descriptor set layouts
/// plus the push-constant range every stage agreed on.
#[derive(Clone)]
pub struct PipelineLayoutKey {
    /// Per-set layouts, interned.
    pub sets: Vec<Arc<DescriptorSetLayout>>,
    /// Union of stages contributing push constants.
    pub push_constant_stages: ShaderStages,
    /// Largest push-constant block requested by any stage.
    pub push_constant_bytes: u32,
}

impl PartialEq for PipelineLayoutKey {
    fn eq(&self, other: &Self) -> bool {
        self.sets.len() == other.sets.len()
            && self.sets.iter().zip(&other.sets).all(|(a, b)| Arc::ptr_eq(a, b))
            && self.push_constant_stages == other.push_constant_stages
            && self.push_constant_bytes == other.push_constant_bytes
    }
}
impl Eq for PipelineLayoutKey {}

impl std::hash::Hash for PipelineLayoutKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        for set in &self.sets {
            (Arc::as_ptr(set) as usize).hash(state);
        }
        self.push_constant_stages.bits().hash(state);
        self.push_constant_bytes.hash(state);
    }
}

/// An interned, GPU-backed pipeline layout.
pub struct PipelineLayout {
    key: PipelineLayoutKey,
    handle: u64,
}

impl PipelineLayout {
    /// The opaque device handle.
    pub fn handle(&self) -> u64 {
        self.handle
    }

    /// Number of descriptor sets in this layout.
    pub fn set_count(&self) -> u32 {
        self.key.sets.len() as u32
    }

    /// The layout of one descriptor set, if it exists.
    pub fn set_layout(&self, set: u32) -> Option<&Arc<DescriptorSetLayout>> {
        self.key.sets.get(set as usize)
    }
}

/// Interns descriptor set and pipeline layouts keyed by their structure so
/// pipelines with equal binding sets share GPU objects.
pub struct LayoutCache<D: GfxDevice> {
    device: Arc<D>,
    set_layouts: Mutex<HashMap<DescriptorSetLayoutKey, Arc<DescriptorSetLayout>>>,
    pipeline_layouts: Mutex<HashMap<PipelineLayoutKeyHash, Arc<PipelineLayout>>>,
}

/// Pipeline layouts are keyed by interned-set-pointer identity, which isn't
/// stable across runs, so the cache indexes them by the sets' own keys
/// instead of re-deriving a `HashMap` key from `Arc` pointers.
type PipelineLayoutKeyHash = (Vec<DescriptorSetLayoutKey>, u32, u32);

impl<D: GfxDevice> LayoutCache<D> {
    /// Creates a cache bound to `device`.
    pub fn new(device: Arc<D>) -> Self {
        Self { device, set_layouts: Mutex::new(HashMap::new()), pipeline_layouts: Mutex::new(HashMap::new()) }
    }

    /// Looks up or creates the descriptor set layout for `key`.
    pub fn get_set_layout(&self, key: DescriptorSetLayoutKey) -> Result<Arc<DescriptorSetLayout>> {
        let mut cache = self.set_layouts.lock().expect("layout cache poisoned");
        if let Some(layout) = cache.get(&key) {
            return Ok(Arc::clone(layout));
        }

        let handle = self.device.create_descriptor_set_layout(key.bindings())?;
        let layout = Arc::new(DescriptorSetLayout { key: key.clone(), handle });
        cache.insert(key, Arc::clone(&layout));
        log::debug!("created descriptor set layout {handle:#x}");
        Ok(layout)
    }

    /// Looks up or creates the pipeline layout merging `sets`.
    pub fn get_pipeline_layout(
        &self,
        sets: Vec<Arc<DescriptorSetLayout>>,
        push_constant_stages: ShaderStages,
        push_constant_bytes: u32,
    ) -> Result<Arc<PipelineLayout>> {
        let hash_key: PipelineLayoutKeyHash =
            (sets.iter().map(|s| s.key.clone()).collect(), push_constant_stages.bits(), push_constant_bytes);

        let mut cache = self.pipeline_layouts.lock().expect("layout cache poisoned");
        if let Some(layout) = cache.get(&hash_key) {
            return Ok(Arc::clone(layout));
        }

        let set_handles: Vec<u64> = sets.iter().map(|s| s.handle).collect();
        let handle = self.device.create_pipeline_layout(&set_handles, push_constant_bytes)?;
        let key = PipelineLayoutKey { sets, push_constant_stages, push_constant_bytes };
        let layout = Arc::new(PipelineLayout { key, handle });
        cache.insert(hash_key, Arc::clone(&layout));
        log::debug!("created pipeline layout {handle:#x}");
        Ok(layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::binding::DescriptorType;
    use crate::gfx::device::tests::FakeDevice;

    fn key(bindings: u32) -> DescriptorSetLayoutKey {
        DescriptorSetLayoutKey::new(vec![CoalescedBinding {
            index: 0,
            ty: DescriptorType::UniformBuffer,
            count: bindings,
            stages: ShaderStages::VERTEX,
            bindless: false,
        }])
    }

    #[test]
    fn identical_keys_return_pointer_equal_layouts() {
        let cache = LayoutCache::new(Arc::new(FakeDevice::default()));
        let a = cache.get_set_layout(key(1)).unwrap();
        let b = cache.get_set_layout(key(1)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn distinct_keys_return_distinct_layouts() {
        let cache = LayoutCache::new(Arc::new(FakeDevice::default()));
        let a = cache.get_set_layout(key(1)).unwrap();
        let b = cache.get_set_layout(key(2)).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn pipeline_layouts_with_same_sets_are_interned() {
        let cache = LayoutCache::new(Arc::new(FakeDevice::default()));
        let set = cache.get_set_layout(key(1)).unwrap();

        let a = cache.get_pipeline_layout(vec![Arc::clone(&set)], ShaderStages::VERTEX, 64).unwrap();
        let b = cache.get_pipeline_layout(vec![Arc::clone(&set)], ShaderStages::VERTEX, 64).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
