//! GLTF → meshlet geometry converter and container format (§4.5, §6).
//!
//! `metadata`/`meshlet` define the in-memory shapes, `joints` flattens skin
//! hierarchies, `container` serializes the result, and `convert` drives the
//! whole pipeline from already-extracted glTF primitives to a [`Geometry`].

mod container;
mod convert;
mod joints;
mod meshlet;
mod metadata;

pub use container::Geometry;
pub use convert::{build_instance, convert, position_attribute, register_morph_target, SourceMorphTarget, SourcePrimitive};
pub use joints::{flatten_joints, JointNode};
pub use meshlet::{
    build_meshlet, CullingInfo, Meshlet, MeshletHeader, MeshletMorphTarget, MeshletSectionOffsets, MeshletVertex,
    NO_JOINT,
};
pub use metadata::{
    Aabb, AttributeMetadata, AttributeSemantic, AttributeStream, GeometryInfo, InstanceMetadata, JointMetadata,
    LodMetadata, MaterialMetadata, MeshMetadata, MorphTargetMetadata,
};
