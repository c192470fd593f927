//! Render state description (§4.4).
//!
//! `RenderState` and `RenderTargetState` are interned the same way layouts
//! are: value-identical state objects should collapse to one cache entry so
//! a `PipelineVariantKey` built from their pointers is cheap to compare.

use std::sync::Arc;

use super::binding::ShaderStages;

/// Primitive topology for input assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topology {
    /// Independent triangles.
    TriangleList,
    /// Triangle strip.
    TriangleStrip,
    /// Independent lines.
    LineList,
    /// Independent points.
    PointList,
}

/// Rasterizer cull mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    /// No culling.
    None,
    /// Cull front-facing triangles.
    Front,
    /// Cull back-facing triangles.
    Back,
}

/// The subset of graphics state that varies per pipeline variant: topology,
/// rasterizer, and blend configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderState {
    /// Primitive topology.
    pub topology: Topology,
    /// Cull mode.
    pub cull_mode: CullMode,
    /// Whether depth testing is enabled.
    pub depth_test: bool,
    /// Whether depth writes are enabled.
    pub depth_write: bool,
    /// Whether alpha blending is enabled.
    pub alpha_blending: bool,
}

/// Render target formats and sample count a pipeline variant targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderTargetState {
    /// Color attachment formats, one per render target slot.
    pub color_formats: Vec<ColorFormat>,
    /// Depth/stencil attachment format, if any.
    pub depth_format: Option<ColorFormat>,
    /// MSAA sample count; `1` means no multisampling.
    pub sample_count: u32,
}

/// A small enumeration of the formats the converter and cache care about;
/// a real backend would map these to native format enums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorFormat {
    /// 8-bit-per-channel RGBA, linear.
    Rgba8Unorm,
    /// 8-bit-per-channel RGBA, sRGB-encoded.
    Rgba8Srgb,
    /// 32-bit float depth.
    Depth32Float,
}

/// Identifies one fully specialized graphics pipeline variant: a render
/// state and target state pair, both interned so identity comparison is a
/// pointer check.
#[derive(Debug, Clone)]
pub struct PipelineVariantKey {
    /// Interned render state.
    pub render_state: Arc<RenderState>,
    /// Interned render target state.
    pub target_state: Arc<RenderTargetState>,
}

impl PartialEq for PipelineVariantKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.render_state, &other.render_state)
            && Arc::ptr_eq(&self.target_state, &other.target_state)
    }
}
impl Eq for PipelineVariantKey {}

impl std::hash::Hash for PipelineVariantKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.render_state) as usize).hash(state);
        (Arc::as_ptr(&self.target_state) as usize).hash(state);
    }
}

/// Policy governing which subgroup size a compute/mesh pipeline requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubgroupSizePolicy {
    /// Let the driver pick.
    Default,
    /// Request the device's minimum supported subgroup size.
    RequireMin,
    /// Request the device's maximum supported subgroup size.
    RequireMax,
    /// Request a specific size; compilation fails if unsupported.
    RequireExact(u32),
}

/// Spec-constant values patched into a shader at compile time.
#[derive(Debug, Clone, Default)]
pub struct SpecConstants {
    values: Vec<(u32, u32)>,
}

impl SpecConstants {
    /// Sets spec constant `id` to `value`, overwriting any previous value.
    pub fn set(&mut self, id: u32, value: u32) {
        if let Some(entry) = self.values.iter_mut().find(|(existing, _)| *existing == id) {
            entry.1 = value;
        } else {
            self.values.push((id, value));
        }
    }

    /// The patched `(id, value)` pairs, sorted by id for deterministic output.
    pub fn entries(&self) -> Vec<(u32, u32)> {
        let mut entries = self.values.clone();
        entries.sort_by_key(|(id, _)| *id);
        entries
    }
}

/// Push-constant usage merged across every stage of a pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushConstantRange {
    /// Stages contributing push constants.
    pub stages: ShaderStages,
    /// Largest requested block size, in bytes.
    pub bytes: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_constants_overwrite_and_sort() {
        let mut consts = SpecConstants::default();
        consts.set(3, 10);
        consts.set(1, 20);
        consts.set(3, 99);
        assert_eq!(consts.entries(), vec![(1, 20), (3, 99)]);
    }

    #[test]
    fn variant_keys_compare_by_identity_not_value() {
        let a = Arc::new(RenderState {
            topology: Topology::TriangleList,
            cull_mode: CullMode::Back,
            depth_test: true,
            depth_write: true,
            alpha_blending: false,
        });
        let b = Arc::new((*a).clone());
        let target = Arc::new(RenderTargetState {
            color_formats: vec![ColorFormat::Rgba8Unorm],
            depth_format: None,
            sample_count: 1,
        });

        let key_a = PipelineVariantKey { render_state: Arc::clone(&a), target_state: Arc::clone(&target) };
        let key_b = PipelineVariantKey { render_state: b, target_state: target };
        assert_ne!(key_a, key_b, "value-equal but distinct Arcs must not compare equal");

        let key_a2 = PipelineVariantKey { render_state: a, target_state: Arc::clone(&key_a.target_state) };
        assert_eq!(key_a, key_a2);
    }
}
