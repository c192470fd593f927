//! Geometry container serialization (§4.5 step 8-9, §6, §8).
//!
//! Buffer 0 holds the header, every metadata array, and (by convention
//! here) the joint-index arrays; LOD meshlet data lives in buffers 1..N.
//! Arrays are written in the fixed order the format specifies, each
//! preceded by its count where the count isn't otherwise inferable.

use crate::error::{Error, Result};
use crate::foundation::math::{Quat, Vec3};

use super::meshlet::Meshlet;
use super::metadata::{
    Aabb, AttributeMetadata, AttributeSemantic, AttributeStream, GeometryInfo, InstanceMetadata, JointMetadata,
    LodMetadata, MaterialMetadata, MeshMetadata, MorphTargetMetadata,
};

const VERSION: u16 = 0;

/// A fully built, in-memory geometry asset.
#[derive(Debug, Clone)]
pub struct Geometry {
    /// Header info (global AABB).
    pub info: GeometryInfo,
    /// Ordered meshes.
    pub meshes: Vec<MeshMetadata>,
    /// Ordered LODs, sorted descending by max view distance (0 = +inf) within each mesh.
    pub lods: Vec<LodMetadata>,
    /// Ordered mesh instances.
    pub instances: Vec<InstanceMetadata>,
    /// Flattened joint-index arrays, one run per skinned instance.
    pub skin_indices: Vec<u16>,
    /// Assembled meshlets, in LOD order.
    pub meshlets: Vec<Meshlet>,
    /// Ordered materials.
    pub materials: Vec<MaterialMetadata>,
    /// Ordered attributes.
    pub attributes: Vec<AttributeMetadata>,
    /// Flattened joint hierarchy, BFS order.
    pub joints: Vec<JointMetadata>,
    /// Morph target names.
    pub morph_targets: Vec<MorphTargetMetadata>,
}

impl Geometry {
    /// Serializes the full geometry container (metadata only; meshlet
    /// buffers themselves are written separately per §4.5 step 8).
    pub fn serialize(&self) -> Vec<u8> {
        let mut w = Writer::default();
        w.u16(VERSION);
        w.f16(self.info.aabb.min[0]);
        w.f16(self.info.aabb.min[1]);
        w.f16(self.info.aabb.min[2]);
        w.f16(self.info.aabb.max[0]);
        w.f16(self.info.aabb.max[1]);
        w.f16(self.info.aabb.max[2]);

        w.u32(self.meshes.len() as u32);
        for mesh in &self.meshes {
            w.string(&mesh.name);
            w.u16(mesh.lod_metadata_index);
            w.u16(mesh.lod_count);
            w.u16(mesh.instance_data_index);
        }

        w.u16(self.lods.len() as u16);
        for lod in &self.lods {
            w.f32(lod.max_view_distance);
            w.u32(lod.first_meshlet_index);
            w.u32(lod.meshlet_count);
        }

        w.u16(self.instances.len() as u16);
        for instance in &self.instances {
            w.string(&instance.name);
            w.u16(instance.mesh_index);
            w.f32(instance.rotation.coords.x);
            w.f32(instance.rotation.coords.y);
            w.f32(instance.rotation.coords.z);
            w.f32(instance.rotation.coords.w);
            w.f32(instance.translation.x);
            w.f32(instance.translation.y);
            w.f32(instance.translation.z);
            w.u32(instance.skin_offset.map_or(u32::MAX, |v| v));
        }

        w.u32(self.skin_indices.len() as u32);
        for index in &self.skin_indices {
            w.u16(*index);
        }

        w.u32(self.materials.len() as u32);
        for material in &self.materials {
            w.string(&material.name);
            w.u16(material.attribute_index);
            w.u16(material.attribute_count);
            w.u16(material.vertex_data_stride);
            w.u16(material.shading_data_stride);
            w.u16(material.morph_data_stride);
        }

        w.u16(self.attributes.len() as u16);
        for attribute in &self.attributes {
            w.string(&attribute.name);
            w.u8(attribute.stream as u8);
            w.u8(attribute.semantic as u8);
            w.u16(attribute.semantic_index);
            w.u16(attribute.offset);
        }

        w.u32(self.joints.len() as u32);
        for joint in &self.joints {
            w.string(&joint.name);
            w.u32(joint.parent.map_or(u32::MAX, |v| v));
            for v in joint.inverse_bind {
                w.f32(v);
            }
        }

        w.u16(self.morph_targets.len() as u16);
        for target in &self.morph_targets {
            w.string(&target.name);
        }

        w.bytes
    }

    /// Inverse of [`Self::serialize`].
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let mut r = Reader::new(data);
        let version = r.u16()?;
        if version != VERSION {
            return Err(Error::InvalidInput(format!("unsupported geometry version {version}")));
        }

        let aabb = Aabb {
            min: [r.f16()?, r.f16()?, r.f16()?],
            max: [r.f16()?, r.f16()?, r.f16()?],
        };

        let mesh_count = r.u32()?;
        let mut meshes = Vec::with_capacity(mesh_count as usize);
        for _ in 0..mesh_count {
            meshes.push(MeshMetadata {
                name: r.string()?,
                lod_metadata_index: r.u16()?,
                lod_count: r.u16()?,
                instance_data_index: r.u16()?,
            });
        }

        let lod_count = r.u16()?;
        let mut lods = Vec::with_capacity(lod_count as usize);
        for _ in 0..lod_count {
            lods.push(LodMetadata { max_view_distance: r.f32()?, first_meshlet_index: r.u32()?, meshlet_count: r.u32()? });
        }

        let instance_count = r.u16()?;
        let mut instances = Vec::with_capacity(instance_count as usize);
        for _ in 0..instance_count {
            let name = r.string()?;
            let mesh_index = r.u16()?;
            let (i, j, k, qw) = (r.f32()?, r.f32()?, r.f32()?, r.f32()?);
            let rotation = Quat::new_normalize(nalgebra::Quaternion::new(qw, i, j, k));
            let translation = Vec3::new(r.f32()?, r.f32()?, r.f32()?);
            let skin_offset = r.u32()?;
            instances.push(InstanceMetadata {
                name,
                mesh_index,
                rotation,
                translation,
                skin_offset: (skin_offset != u32::MAX).then_some(skin_offset),
            });
        }

        let skin_index_count = r.u32()?;
        let mut skin_indices = Vec::with_capacity(skin_index_count as usize);
        for _ in 0..skin_index_count {
            skin_indices.push(r.u16()?);
        }

        let material_count = r.u32()?;
        let mut materials = Vec::with_capacity(material_count as usize);
        for _ in 0..material_count {
            materials.push(MaterialMetadata {
                name: r.string()?,
                attribute_index: r.u16()?,
                attribute_count: r.u16()?,
                vertex_data_stride: r.u16()?,
                shading_data_stride: r.u16()?,
                morph_data_stride: r.u16()?,
            });
        }

        let attribute_count = r.u16()?;
        let mut attributes = Vec::with_capacity(attribute_count as usize);
        for _ in 0..attribute_count {
            attributes.push(AttributeMetadata {
                name: r.string()?,
                stream: decode_stream(r.u8()?)?,
                semantic: decode_semantic(r.u8()?)?,
                semantic_index: r.u16()?,
                offset: r.u16()?,
            });
        }

        let joint_count = r.u32()?;
        let mut joints = Vec::with_capacity(joint_count as usize);
        for _ in 0..joint_count {
            let name = r.string()?;
            let parent = r.u32()?;
            let mut inverse_bind = [0.0f32; 16];
            for v in &mut inverse_bind {
                *v = r.f32()?;
            }
            joints.push(JointMetadata { name, parent: (parent != u32::MAX).then_some(parent), inverse_bind });
        }

        let morph_count = r.u16()?;
        let mut morph_targets = Vec::with_capacity(morph_count as usize);
        for _ in 0..morph_count {
            morph_targets.push(MorphTargetMetadata { name: r.string()? });
        }

        Ok(Self {
            info: GeometryInfo { aabb },
            meshes,
            lods,
            instances,
            skin_indices,
            meshlets: Vec::new(),
            materials,
            attributes,
            joints,
            morph_targets,
        })
    }
}

fn decode_stream(tag: u8) -> Result<AttributeStream> {
    match tag {
        0 => Ok(AttributeStream::Vertex),
        1 => Ok(AttributeStream::Shading),
        _ => Err(Error::InvalidInput(format!("bad attribute stream tag {tag}"))),
    }
}

fn decode_semantic(tag: u8) -> Result<AttributeSemantic> {
    match tag {
        0 => Ok(AttributeSemantic::Position),
        1 => Ok(AttributeSemantic::Normal),
        2 => Ok(AttributeSemantic::Tangent),
        3 => Ok(AttributeSemantic::TexCoord),
        4 => Ok(AttributeSemantic::Color),
        5 => Ok(AttributeSemantic::Joints),
        6 => Ok(AttributeSemantic::Weights),
        _ => Err(Error::InvalidInput(format!("bad attribute semantic tag {tag}"))),
    }
}

#[derive(Default)]
struct Writer {
    bytes: Vec<u8>,
}

impl Writer {
    fn u8(&mut self, v: u8) {
        self.bytes.push(v);
    }
    fn u16(&mut self, v: u16) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }
    fn u32(&mut self, v: u32) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }
    fn f32(&mut self, v: f32) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }
    fn f16(&mut self, v: half::f16) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }
    fn string(&mut self, s: &str) {
        self.u16(s.len() as u16);
        self.bytes.extend_from_slice(s.as_bytes());
    }
}

struct Reader<'a> {
    data: &'a [u8],
    cursor: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, cursor: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let slice = self.data.get(self.cursor..self.cursor + n).ok_or_else(|| Error::InvalidInput("geometry stream truncated".into()))?;
        self.cursor += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }
    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }
    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }
    fn f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }
    fn f16(&mut self) -> Result<half::f16> {
        Ok(half::f16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }
    fn string(&mut self) -> Result<String> {
        let len = self.u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| Error::InvalidInput("geometry name is not valid UTF-8".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Geometry {
        Geometry {
            info: GeometryInfo { aabb: Aabb::from_f32([-1.0, -1.0, -1.0], [1.0, 1.0, 1.0]) },
            meshes: vec![MeshMetadata { name: "cube".into(), lod_metadata_index: 0, lod_count: 1, instance_data_index: 0 }],
            lods: vec![LodMetadata { max_view_distance: 0.0, first_meshlet_index: 0, meshlet_count: 1 }],
            instances: vec![InstanceMetadata {
                name: "cube_0".into(),
                mesh_index: 0,
                rotation: Quat::identity(),
                translation: Vec3::new(1.0, 2.0, 3.0),
                skin_offset: None,
            }],
            skin_indices: vec![],
            meshlets: vec![],
            materials: vec![MaterialMetadata { name: "default".into(), attribute_index: 0, attribute_count: 1, vertex_data_stride: 12, shading_data_stride: 8, morph_data_stride: 0 }],
            attributes: vec![AttributeMetadata { name: "POSITION".into(), stream: AttributeStream::Vertex, semantic: AttributeSemantic::Position, semantic_index: 0, offset: 0 }],
            joints: vec![JointMetadata { name: "root".into(), parent: None, inverse_bind: [0.0; 16] }],
            morph_targets: vec![MorphTargetMetadata { name: "blink".into() }],
        }
    }

    #[test]
    fn deserialize_inverts_serialize() {
        let geometry = sample();
        let bytes = geometry.serialize();
        let restored = Geometry::deserialize(&bytes).unwrap();

        assert_eq!(restored.meshes.len(), geometry.meshes.len());
        assert_eq!(restored.meshes[0].name, "cube");
        assert_eq!(restored.instances[0].translation, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(restored.joints[0].name, "root");
        assert_eq!(restored.morph_targets[0].name, "blink");
        assert_eq!(restored.info.aabb, geometry.info.aabb);
    }

    #[test]
    fn truncated_stream_is_rejected() {
        let bytes = sample().serialize();
        assert!(Geometry::deserialize(&bytes[..bytes.len() - 3]).is_err());
    }
}
