//! Graphics and compute pipeline objects (§4.4).
//!
//! [`GraphicsPipeline::get_variant`] implements the four-step selection the
//! original uses to keep the render-thread hot path off the compiler:
//!
//! 1. **Optimized lookup** — a previously fast-linked-and-then-fully-compiled
//!    variant is published via release-store/acquire-load; if present, use it.
//! 2. **Linked lookup** — a fast-linked (but not yet fully optimized) variant
//!    exists; use it while a background job upgrades it to optimized.
//! 3. **Fast-link-and-defer** — no variant exists yet, but the device can
//!    fast-link from the base library; link synchronously, publish as
//!    "linked", and queue an optimized compile in the background.
//! 4. **Synchronous compile** — fast-linking isn't available; compile the
//!    fully specialized variant on the calling thread.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::compiler::{CompileJob, CompilerPool};
use super::device::{GfxDevice, ShaderCode};
use super::layout::PipelineLayout;
use super::state::{PipelineVariantKey, RenderState, RenderTargetState};
use crate::error::{Error, Result};

/// A GPU pipeline handle plus which selection tier produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphicsPipelineVariant {
    /// The opaque device handle.
    pub handle: u64,
    /// `true` once the variant has been fully, synchronously optimized.
    pub optimized: bool,
}

struct VariantSlot {
    /// Fully optimized handle, published with `Release`; `0` means none yet.
    optimized: AtomicU64,
    /// Fast-linked (not yet optimized) handle; `0` means none yet.
    linked: Mutex<u64>,
    /// Set once an optimize job has been queued, so it's only queued once.
    optimize_queued: Mutex<bool>,
}

impl VariantSlot {
    fn new() -> Self {
        Self { optimized: AtomicU64::new(0), linked: Mutex::new(0), optimize_queued: Mutex::new(false) }
    }
}

/// A graphics pipeline: a base library plus a cache of per-render-state
/// specialized variants.
pub struct GraphicsPipeline<D: GfxDevice> {
    device: Arc<D>,
    compiler: Arc<CompilerPool>,
    layout: Arc<PipelineLayout>,
    shaders: Vec<ShaderCode>,
    base: AtomicU64,
    variants: Mutex<HashMap<PipelineVariantKey, Arc<VariantSlot>>>,
}

/// Errors raised while compiling or selecting a graphics pipeline variant.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// The device rejected a compile request.
    #[error("pipeline compile failed: {0}")]
    CompileFailed(#[from] Error),
}

impl<D: GfxDevice + 'static> GraphicsPipeline<D> {
    /// Creates a pipeline; the base library is compiled lazily on first use.
    pub fn new(device: Arc<D>, compiler: Arc<CompilerPool>, layout: Arc<PipelineLayout>, shaders: Vec<ShaderCode>) -> Self {
        Self { device, compiler, layout, shaders, base: AtomicU64::new(0), variants: Mutex::new(HashMap::new()) }
    }

    fn base_library(&self) -> Result<u64> {
        let existing = self.base.load(Ordering::Acquire);
        if existing != 0 {
            return Ok(existing);
        }

        let handle = self.device.compile_graphics_base(self.layout.handle(), &self.shaders)?;
        self.base.store(handle, Ordering::Release);
        Ok(handle)
    }

    fn slot_for(&self, key: &PipelineVariantKey) -> Arc<VariantSlot> {
        let mut variants = self.variants.lock().expect("pipeline cache poisoned");
        Arc::clone(variants.entry(key.clone()).or_insert_with(|| Arc::new(VariantSlot::new())))
    }

    /// Returns a usable handle for `key`, compiling or linking it if needed.
    /// Never blocks on an optimize job already in flight: a fast-linked
    /// handle from step 3 is returned immediately and upgraded later.
    pub fn get_variant(self: &Arc<Self>, key: &PipelineVariantKey) -> Result<GraphicsPipelineVariant> {
        let slot = self.slot_for(key);

        // Step 1: optimized lookup.
        let optimized = slot.optimized.load(Ordering::Acquire);
        if optimized != 0 {
            return Ok(GraphicsPipelineVariant { handle: optimized, optimized: true });
        }

        // Step 2: linked lookup.
        {
            let linked = *slot.linked.lock().expect("pipeline cache poisoned");
            if linked != 0 {
                self.queue_optimize(Arc::clone(&slot), key.clone());
                return Ok(GraphicsPipelineVariant { handle: linked, optimized: false });
            }
        }

        let caps = self.device.capabilities();
        if caps.fast_link {
            // Step 3: fast-link now, defer the full optimize.
            let base = self.base_library()?;
            if let Some(handle) = self.device.link_graphics_variant(base, &key.render_state, &key.target_state)? {
                *slot.linked.lock().expect("pipeline cache poisoned") = handle;
                self.queue_optimize(slot, key.clone());
                return Ok(GraphicsPipelineVariant { handle, optimized: false });
            }
        }

        // Step 4: synchronous compile; no faster path is available.
        let handle = self.compile_variant_locked(key)?;
        slot.optimized.store(handle, Ordering::Release);
        Ok(GraphicsPipelineVariant { handle, optimized: true })
    }

    fn queue_optimize(self: &Arc<Self>, slot: Arc<VariantSlot>, key: PipelineVariantKey) {
        let mut queued = slot.optimize_queued.lock().expect("pipeline cache poisoned");
        if *queued {
            return;
        }
        *queued = true;
        drop(queued);

        let pipeline = Arc::clone(self);
        self.compiler.submit(CompileJob::GraphicsVariant(Box::new(move || {
            if let Ok(handle) = pipeline.compile_variant_locked(&key) {
                slot.optimized.store(handle, Ordering::Release);
            }
            // A failed background optimize just leaves the linked handle in
            // place; the next get_variant call re-queues it.
            *slot.optimize_queued.lock().expect("pipeline cache poisoned") = false;
        })));
    }

    fn compile_variant_locked(&self, key: &PipelineVariantKey) -> Result<u64> {
        self.device.compile_graphics_variant(
            self.layout.handle(),
            &self.shaders,
            &key.render_state,
            &key.target_state,
            key,
        )
    }
}

/// A compute pipeline, compiled once on first use and cached thereafter.
pub struct ComputePipeline<D: GfxDevice> {
    device: Arc<D>,
    layout: Arc<PipelineLayout>,
    shader: ShaderCode,
    handle: AtomicU64,
}

impl<D: GfxDevice> ComputePipeline<D> {
    /// Creates a pipeline; compilation is deferred to the first [`Self::handle`] call.
    pub fn new(device: Arc<D>, layout: Arc<PipelineLayout>, shader: ShaderCode) -> Self {
        Self { device, layout, shader, handle: AtomicU64::new(0) }
    }

    /// Returns the compiled handle, compiling on first call.
    pub fn handle(&self) -> Result<u64> {
        let existing = self.handle.load(Ordering::Acquire);
        if existing != 0 {
            return Ok(existing);
        }

        let handle = self.device.compile_compute(self.layout.handle(), &self.shader)?;
        self.handle.store(handle, Ordering::Release);
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::device::tests::FakeDevice;
    use crate::gfx::state::{ColorFormat, CullMode, RenderTargetState, Topology};

    fn layout(device: &Arc<FakeDevice>) -> Arc<PipelineLayout> {
        use crate::gfx::layout::LayoutCache;
        let cache = LayoutCache::new(Arc::clone(device));
        cache.get_pipeline_layout(vec![], super::super::binding::ShaderStages::VERTEX, 0).unwrap()
    }

    fn variant_key() -> PipelineVariantKey {
        PipelineVariantKey {
            render_state: Arc::new(RenderState {
                topology: Topology::TriangleList,
                cull_mode: CullMode::Back,
                depth_test: true,
                depth_write: true,
                alpha_blending: false,
            }),
            target_state: Arc::new(RenderTargetState {
                color_formats: vec![ColorFormat::Rgba8Unorm],
                depth_format: None,
                sample_count: 1,
            }),
        }
    }

    #[test]
    fn get_variant_returns_a_valid_handle() {
        let device = Arc::new(FakeDevice::default());
        let compiler = Arc::new(CompilerPool::new(1));
        let pipeline = Arc::new(GraphicsPipeline::new(Arc::clone(&device), compiler, layout(&device), vec![]));

        let variant = pipeline.get_variant(&variant_key()).unwrap();
        assert_ne!(variant.handle, 0);
    }

    #[test]
    fn fast_link_settles_to_optimized_after_background_compile() {
        let device = Arc::new(FakeDevice::default());
        let compiler = Arc::new(CompilerPool::new(1));
        let pipeline = Arc::new(GraphicsPipeline::new(Arc::clone(&device), Arc::clone(&compiler), layout(&device), vec![]));

        let key = variant_key();
        let first = pipeline.get_variant(&key).unwrap();
        assert!(!first.optimized, "fast-link should publish a linked, not yet optimized, handle");

        drop(compiler); // join the pool, forcing the queued optimize job to finish
        let second = pipeline.get_variant(&key).unwrap();
        assert!(second.optimized);
    }

    #[test]
    fn without_fast_link_falls_back_to_synchronous_compile() {
        let device = Arc::new(FakeDevice::without_libraries());
        let compiler = Arc::new(CompilerPool::new(1));
        let pipeline = Arc::new(GraphicsPipeline::new(Arc::clone(&device), compiler, layout(&device), vec![]));

        let variant = pipeline.get_variant(&variant_key()).unwrap();
        assert!(variant.optimized);
    }

    #[test]
    fn repeated_lookups_return_the_same_handle() {
        let device = Arc::new(FakeDevice::without_libraries());
        let compiler = Arc::new(CompilerPool::new(1));
        let pipeline = Arc::new(GraphicsPipeline::new(Arc::clone(&device), compiler, layout(&device), vec![]));

        let key = variant_key();
        let a = pipeline.get_variant(&key).unwrap();
        let b = pipeline.get_variant(&key).unwrap();
        assert_eq!(a.handle, b.handle);
    }
}
