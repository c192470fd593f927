//! Geometry container metadata types (§3, §6).

use half::f16;

use crate::foundation::math::{Quat, Vec3};

/// A 3D axis-aligned bounding box stored as half-precision floats, matching
/// the container's on-disk representation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner.
    pub min: [f16; 3],
    /// Maximum corner.
    pub max: [f16; 3],
}

impl Aabb {
    /// An AABB that contains nothing; unioning it with any box yields that box.
    pub const EMPTY: Self = Self { min: [f16::INFINITY; 3], max: [f16::NEG_INFINITY; 3] };

    /// Builds an AABB from full-precision extents, rounding to `f16`.
    pub fn from_f32(min: [f32; 3], max: [f32; 3]) -> Self {
        Self { min: min.map(f16::from_f32), max: max.map(f16::from_f32) }
    }

    /// The smallest box containing both `self` and `other`.
    pub fn union(self, other: Self) -> Self {
        let mut min = [f16::ZERO; 3];
        let mut max = [f16::ZERO; 3];
        for i in 0..3 {
            min[i] = f16::from_f32(self.min[i].to_f32().min(other.min[i].to_f32()));
            max[i] = f16::from_f32(self.max[i].to_f32().max(other.max[i].to_f32()));
        }
        Self { min, max }
    }
}

/// Per-mesh metadata: which LODs and instances belong to it.
#[derive(Debug, Clone)]
pub struct MeshMetadata {
    /// Mesh name.
    pub name: String,
    /// Index of the first [`LodMetadata`] belonging to this mesh.
    pub lod_metadata_index: u16,
    /// Number of LODs belonging to this mesh.
    pub lod_count: u16,
    /// Index of the first instance referencing this mesh.
    pub instance_data_index: u16,
}

/// Per-LOD metadata: selection distance and meshlet range.
#[derive(Debug, Clone, Copy)]
pub struct LodMetadata {
    /// Maximum view distance at which this LOD is selected; `0` means infinite.
    pub max_view_distance: f32,
    /// Index of this LOD's first meshlet within the mesh's meshlet run.
    pub first_meshlet_index: u32,
    /// Number of meshlets in this LOD.
    pub meshlet_count: u32,
}

/// A mesh instance: a placement in the scene plus optional skin data.
#[derive(Debug, Clone)]
pub struct InstanceMetadata {
    /// Instance name.
    pub name: String,
    /// Index of the [`MeshMetadata`] this instance places.
    pub mesh_index: u16,
    /// Rotation.
    pub rotation: Quat,
    /// Translation.
    pub translation: Vec3,
    /// Offset into the flattened joint-index array, if skinned.
    pub skin_offset: Option<u32>,
}

/// A material's vertex/shading/morph stream layout.
#[derive(Debug, Clone)]
pub struct MaterialMetadata {
    /// Material name.
    pub name: String,
    /// Index of the first [`AttributeMetadata`] for this material.
    pub attribute_index: u16,
    /// Number of attributes for this material.
    pub attribute_count: u16,
    /// Byte stride of the vertex stream.
    pub vertex_data_stride: u16,
    /// Byte stride of the shading stream.
    pub shading_data_stride: u16,
    /// Byte stride of one morph-target data record.
    pub morph_data_stride: u16,
}

/// Vertex attribute semantic, matching glTF's accessor semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeSemantic {
    /// Vertex position.
    Position,
    /// Vertex normal.
    Normal,
    /// Vertex tangent.
    Tangent,
    /// Texture coordinates.
    TexCoord,
    /// Vertex color.
    Color,
    /// Joint indices.
    Joints,
    /// Joint weights.
    Weights,
}

/// Where an attribute's data lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeStream {
    /// The meshlet's position/vertex stream.
    Vertex,
    /// The meshlet's shading (non-positional) stream.
    Shading,
}

/// A single packed vertex attribute.
#[derive(Debug, Clone)]
pub struct AttributeMetadata {
    /// Attribute name (e.g. `TEXCOORD_0`).
    pub name: String,
    /// Which stream this attribute is packed into.
    pub stream: AttributeStream,
    /// Semantic meaning.
    pub semantic: AttributeSemantic,
    /// Index for repeated semantics (e.g. `TEXCOORD_1`).
    pub semantic_index: u16,
    /// Byte offset within the stream's stride.
    pub offset: u16,
}

/// One node in the joint hierarchy, already flattened to BFS order.
#[derive(Debug, Clone)]
pub struct JointMetadata {
    /// Joint name.
    pub name: String,
    /// Index of the parent joint, or `None` for a root.
    ///
    /// Invariant: `parent.unwrap() < own index` always holds post-flatten.
    pub parent: Option<u32>,
    /// Inverse bind matrix, row-major, translation in the last column.
    pub inverse_bind: [f32; 16],
}

/// A named morph target.
#[derive(Debug, Clone)]
pub struct MorphTargetMetadata {
    /// Morph target name.
    pub name: String,
}

/// Geometry-wide info: version and global AABB.
#[derive(Debug, Clone, Copy)]
pub struct GeometryInfo {
    /// Union of every mesh instance's world-space AABB.
    pub aabb: Aabb,
}
