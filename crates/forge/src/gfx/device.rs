//! GPU backend seam for the pipeline cache (§4.4).
//!
//! The cache never touches a concrete graphics API directly; it drives a
//! [`GfxDevice`] implementation instead. A real backend wraps a concrete
//! graphics API's device handle; tests and the reference implementation use
//! an in-memory fake.

use super::binding::CoalescedBinding;
use super::state::{PipelineVariantKey, RenderState, RenderTargetState};
use crate::error::Result;

/// A compiled shader module's backend-specific bytecode.
pub type ShaderCode = Vec<u32>;

/// Device feature flags relevant to pipeline compilation strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceCaps {
    /// Whether graphics pipeline libraries (base + fast-link variants) are supported.
    pub pipeline_libraries: bool,
    /// Whether fast-linked variants can be created without a full compile.
    pub fast_link: bool,
    /// Minimum subgroup size the device reports.
    pub min_subgroup_size: u32,
    /// Maximum subgroup size the device reports.
    pub max_subgroup_size: u32,
}

/// Abstracts the handful of GPU operations the pipeline cache needs.
///
/// Every method returns an opaque `u64` handle; the cache never interprets
/// these beyond identity and `0` meaning "no handle".
pub trait GfxDevice: Send + Sync {
    /// Reports this device's compilation-relevant capabilities.
    fn capabilities(&self) -> DeviceCaps;

    /// Creates a descriptor set layout from coalesced bindings.
    fn create_descriptor_set_layout(&self, bindings: &[CoalescedBinding]) -> Result<u64>;

    /// Creates a pipeline layout from a set of descriptor set layout handles.
    fn create_pipeline_layout(&self, sets: &[u64], push_constant_bytes: u32) -> Result<u64>;

    /// Fully compiles a compute pipeline.
    fn compile_compute(&self, layout: u64, shader: &ShaderCode) -> Result<u64>;

    /// Compiles a graphics pipeline base library: everything except the
    /// render-state-dependent vertex input and fragment output stages.
    fn compile_graphics_base(
        &self,
        layout: u64,
        shaders: &[ShaderCode],
    ) -> Result<u64>;

    /// Synchronously compiles a fully specialized graphics pipeline variant.
    fn compile_graphics_variant(
        &self,
        layout: u64,
        shaders: &[ShaderCode],
        render_state: &RenderState,
        target_state: &RenderTargetState,
        key: &PipelineVariantKey,
    ) -> Result<u64>;

    /// Links a fast-linkable variant from a base library plus render state,
    /// without a full shader recompile. Returns `None` if the device can't
    /// fast-link this combination.
    fn link_graphics_variant(
        &self,
        base: u64,
        render_state: &RenderState,
        target_state: &RenderTargetState,
    ) -> Result<Option<u64>>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// An in-memory [`GfxDevice`] that hands out incrementing fake handles.
    pub struct FakeDevice {
        next_handle: AtomicU64,
        caps: DeviceCaps,
        fast_link_fails: bool,
    }

    impl Default for FakeDevice {
        fn default() -> Self {
            Self {
                next_handle: AtomicU64::new(1),
                caps: DeviceCaps { pipeline_libraries: true, fast_link: true, min_subgroup_size: 4, max_subgroup_size: 64 },
                fast_link_fails: false,
            }
        }
    }

    impl FakeDevice {
        /// A device that reports fast-link support but always declines to link.
        pub fn with_fast_link_failing() -> Self {
            Self { fast_link_fails: true, ..Self::default() }
        }

        /// A device without pipeline library support at all.
        pub fn without_libraries() -> Self {
            Self { caps: DeviceCaps { pipeline_libraries: false, ..DeviceCaps::default() }, ..Self::default() }
        }

        fn alloc(&self) -> u64 {
            self.next_handle.fetch_add(1, Ordering::Relaxed)
        }
    }

    impl GfxDevice for FakeDevice {
        fn capabilities(&self) -> DeviceCaps {
            self.caps
        }

        fn create_descriptor_set_layout(&self, _bindings: &[CoalescedBinding]) -> Result<u64> {
            Ok(self.alloc())
        }

        fn create_pipeline_layout(&self, _sets: &[u64], _push_constant_bytes: u32) -> Result<u64> {
            Ok(self.alloc())
        }

        fn compile_compute(&self, _layout: u64, _shader: &ShaderCode) -> Result<u64> {
            Ok(self.alloc())
        }

        fn compile_graphics_base(&self, _layout: u64, _shaders: &[ShaderCode]) -> Result<u64> {
            Ok(self.alloc())
        }

        fn compile_graphics_variant(
            &self,
            _layout: u64,
            _shaders: &[ShaderCode],
            _render_state: &RenderState,
            _target_state: &RenderTargetState,
            _key: &PipelineVariantKey,
        ) -> Result<u64> {
            Ok(self.alloc())
        }

        fn link_graphics_variant(
            &self,
            _base: u64,
            _render_state: &RenderState,
            _target_state: &RenderTargetState,
        ) -> Result<Option<u64>> {
            if self.fast_link_fails {
                Ok(None)
            } else {
                Ok(Some(self.alloc()))
            }
        }
    }
}
