//! GLTF → meshlet geometry converter orchestration (§4.5).
//!
//! Each stage below corresponds to one step of the pipeline: parsing,
//! grouping, meshletizing, and assembling the final [`Geometry`]. Grouping
//! and meshletizing dispatch through the job scheduler so independent
//! primitives build in parallel, mirroring the job-per-stage structure the
//! rest of the engine uses for bulk work.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use meshopt::{build_meshlets, compute_meshlet_bounds, VertexDataAdapter};

use crate::error::{Error, Result};
use crate::foundation::math::{Quat, Vec3};
use crate::jobs::{batch, JobScheduler};

use super::joints::{flatten_joints, JointNode};
use super::meshlet::{build_meshlet, CullingInfo, Meshlet, MeshletMorphTarget, MeshletVertex};
use super::metadata::{
    Aabb, AttributeMetadata, AttributeSemantic, AttributeStream, GeometryInfo, InstanceMetadata, LodMetadata,
    MaterialMetadata, MeshMetadata, MorphTargetMetadata,
};
use super::Geometry;

const MAX_MESHLET_VERTICES: usize = 128;
const MAX_MESHLET_TRIANGLES: usize = 128;
const CONE_WEIGHT: f32 = 0.85;

/// One glTF primitive's raw geometry, already expanded to a flat vertex
/// buffer and a triangle-list index buffer (topology-normalized).
pub struct SourcePrimitive {
    /// Interleaved position + shading attribute bytes (one vertex stride per vertex).
    pub vertex_data: Vec<u8>,
    /// Byte stride of one vertex in `vertex_data`.
    pub vertex_stride: usize,
    /// Byte offset of the position attribute within a vertex.
    pub position_offset: usize,
    /// Triangle-list indices into `vertex_data`.
    pub indices: Vec<u32>,
    /// Name of the mesh this primitive belongs to.
    pub mesh_name: String,
    /// Material name, used to group primitives sharing a packed layout.
    pub material_name: String,
    /// Per-vertex `(joint, weight)` pairs, indexed the same as `vertex_data`.
    /// Empty for unskinned primitives.
    pub joint_weights: Vec<Vec<(u32, f32)>>,
    /// Morph targets affecting this primitive's vertices.
    pub morph_targets: Vec<SourceMorphTarget>,
}

/// One morph target's effect on a primitive's vertices, by source vertex index.
pub struct SourceMorphTarget {
    /// Morph target name, matched against the asset-wide morph target list.
    pub name: String,
    /// Per-vertex position delta; `None` for vertices this target leaves untouched.
    pub position_deltas: Vec<Option<[f32; 3]>>,
}

/// Converts a set of already-extracted primitives into a [`Geometry`].
///
/// Full glTF document ingestion (accessor decoding, skin/morph target
/// extraction) is expected to have produced `primitives` and `joints`
/// upstream; this function owns steps 3-9 of the pipeline, where the
/// meshlet and container invariants actually live.
pub fn convert(scheduler: &JobScheduler, primitives: Vec<SourcePrimitive>, joints: Vec<JointNode>) -> Result<Geometry> {
    let (flattened_joints, _joint_remap) = flatten_joints(&joints);

    let mut geometry = Geometry {
        info: GeometryInfo { aabb: Aabb::EMPTY },
        meshes: Vec::new(),
        lods: Vec::new(),
        instances: Vec::new(),
        skin_indices: Vec::new(),
        meshlets: Vec::new(),
        materials: Vec::new(),
        attributes: Vec::new(),
        joints: flattened_joints,
        morph_targets: Vec::new(),
    };

    let mut morph_index: HashMap<String, u32> = HashMap::new();
    for primitive in &primitives {
        for target in &primitive.morph_targets {
            morph_index.entry(target.name.clone()).or_insert_with(|| register_morph_target(&mut geometry, target.name.clone()));
        }
    }

    let primitives = Arc::new(primitives);
    let morph_index = Arc::new(morph_index);
    let slots: Arc<Mutex<Vec<Option<Result<Vec<Meshlet>>>>>> =
        Arc::new(Mutex::new((0..primitives.len()).map(|_| None).collect()));

    let job_primitives = Arc::clone(&primitives);
    let job_morph_index = Arc::clone(&morph_index);
    let job_slots = Arc::clone(&slots);
    let job = batch(
        move |i| {
            let result = meshletize_primitive(&job_primitives[i as usize], &job_morph_index);
            job_slots.lock().expect("meshlet result slots poisoned")[i as usize] = Some(result);
        },
        primitives.len() as u32,
        1,
    );
    scheduler.wait(&scheduler.dispatch(job, ()));

    let meshlets_per_primitive: Vec<Vec<Meshlet>> = std::mem::take(&mut *slots.lock().expect("meshlet result slots poisoned"))
        .into_iter()
        .map(|slot| slot.expect("every primitive index is claimed exactly once"))
        .collect::<Result<_>>()?;

    for (primitive, meshlets) in primitives.iter().zip(meshlets_per_primitive) {
        let mesh_index = geometry
            .meshes
            .iter()
            .position(|m| m.name == primitive.mesh_name)
            .unwrap_or_else(|| {
                geometry.meshes.push(MeshMetadata {
                    name: primitive.mesh_name.clone(),
                    lod_metadata_index: geometry.lods.len() as u16,
                    lod_count: 0,
                    instance_data_index: 0,
                });
                geometry.meshes.len() - 1
            });

        let first_meshlet_index = geometry.meshlets.len() as u32;
        let meshlet_count = meshlets.len() as u32;
        geometry.meshlets.extend(meshlets);

        geometry.lods.push(LodMetadata { max_view_distance: 0.0, first_meshlet_index, meshlet_count });
        geometry.meshes[mesh_index].lod_count += 1;

        if !geometry.materials.iter().any(|m| m.name == primitive.material_name) {
            geometry.materials.push(MaterialMetadata {
                name: primitive.material_name.clone(),
                attribute_index: 0,
                attribute_count: 0,
                vertex_data_stride: primitive.vertex_stride as u16,
                shading_data_stride: 0,
                morph_data_stride: 0,
            });
        }
    }

    sort_lods_by_view_distance(&mut geometry);

    geometry.info.aabb = primitives
        .iter()
        .map(primitive_aabb)
        .fold(Aabb::EMPTY, Aabb::union);

    Ok(geometry)
}

/// Sorts each mesh's LOD run by descending max view distance, treating `0` as +infinity.
fn sort_lods_by_view_distance(geometry: &mut Geometry) {
    for mesh in &geometry.meshes {
        let start = mesh.lod_metadata_index as usize;
        let end = start + mesh.lod_count as usize;
        geometry.lods[start..end].sort_by(|a, b| {
            let key = |d: f32| if d == 0.0 { f32::INFINITY } else { d };
            key(b.max_view_distance).partial_cmp(&key(a.max_view_distance)).unwrap_or(std::cmp::Ordering::Equal)
        });
    }
}

fn primitive_aabb(primitive: &SourcePrimitive) -> Aabb {
    let mut min = [f32::INFINITY; 3];
    let mut max = [f32::NEG_INFINITY; 3];

    for vertex in primitive.vertex_data.chunks(primitive.vertex_stride) {
        let pos = &vertex[primitive.position_offset..primitive.position_offset + 12];
        for i in 0..3 {
            let v = f32::from_le_bytes(pos[i * 4..i * 4 + 4].try_into().unwrap());
            min[i] = min[i].min(v);
            max[i] = max[i].max(v);
        }
    }

    Aabb::from_f32(min, max)
}

/// Step 3 + 4: meshletize one primitive and build every resulting meshlet's buffer.
fn meshletize_primitive(primitive: &SourcePrimitive, morph_index: &HashMap<String, u32>) -> Result<Vec<Meshlet>> {
    let adapter = VertexDataAdapter::new(&primitive.vertex_data, primitive.vertex_stride, primitive.position_offset)
        .map_err(|_| Error::InvalidInput("malformed vertex buffer for meshletizing".into()))?;

    let raw = build_meshlets(&primitive.indices, &adapter, MAX_MESHLET_VERTICES, MAX_MESHLET_TRIANGLES, CONE_WEIGHT);

    let mut meshlets = Vec::with_capacity(raw.meshlets.len());
    for m in &raw.meshlets {
        let local_vertices = &raw.vertices[m.vertex_offset as usize..(m.vertex_offset + m.vertex_count) as usize];
        let local_triangles = &raw.triangles[m.triangle_offset as usize..(m.triangle_offset + m.triangle_count * 3) as usize];

        let vertices: Vec<MeshletVertex> = local_vertices
            .iter()
            .map(|&global_index| vertex_at(primitive, global_index))
            .collect();

        let indices: Vec<u16> = local_triangles.iter().map(|&i| u16::from(i)).collect();

        let local_joints = localize_joints(&vertices);
        let dominant_global = dominant_joint(&vertices);
        let dominant_joint_slot = dominant_global.and_then(|global| local_joints.iter().position(|&slot| slot == Some(global))).map(|i| i as u32);

        let bounds = compute_meshlet_bounds(meshopt::Meshlet { vertices: local_vertices, triangles: local_triangles }, &adapter);
        let mut bounding_sphere = (bounds.radius > 0.0).then(|| (bounds.center, bounds.radius));
        let mut cone = (bounds.cone_cutoff < 1.0).then(|| (bounds.cone_apex, bounds.cone_axis, bounds.cone_cutoff));

        let (morph_targets, max_position_delta, morphed) = build_meshlet_morph_targets(primitive, local_vertices, morph_index);
        if morphed {
            cone = None;
            bounding_sphere = bounding_sphere.map(|(center, radius)| (center, radius + max_position_delta));
        }

        let culling = CullingInfo { bounding_sphere, cone, dominant_joint: dominant_joint_slot };

        meshlets.push(build_meshlet(&vertices, &indices, &morph_targets, culling, local_joints));
    }

    Ok(meshlets)
}

/// Reads one vertex out of a primitive's interleaved buffer, splitting it
/// into the meshlet's position stream and shading stream (everything in the
/// vertex stride that isn't the position) and filtering its joint weights
/// down to the nonzero, descending-by-weight pairs (§4.5 step 4).
fn vertex_at(primitive: &SourcePrimitive, global_index: u32) -> MeshletVertex {
    let start = global_index as usize * primitive.vertex_stride;
    let slice = &primitive.vertex_data[start..start + primitive.vertex_stride];
    let position_offset = primitive.position_offset;
    let position_bytes = &slice[position_offset..position_offset + 12];

    let mut shading_data = Vec::with_capacity(primitive.vertex_stride - 12);
    shading_data.extend_from_slice(&slice[..position_offset]);
    shading_data.extend_from_slice(&slice[position_offset + 12..]);

    let mut joints: Vec<(u32, f32)> = primitive
        .joint_weights
        .get(global_index as usize)
        .map(|pairs| pairs.iter().copied().filter(|&(_, weight)| weight > 0.0).collect())
        .unwrap_or_default();
    joints.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    MeshletVertex {
        position: [
            f32::from_le_bytes(position_bytes[0..4].try_into().unwrap()),
            f32::from_le_bytes(position_bytes[4..8].try_into().unwrap()),
            f32::from_le_bytes(position_bytes[8..12].try_into().unwrap()),
        ],
        vertex_data: position_bytes.to_vec(),
        shading_data,
        joints,
    }
}

/// Collects the meshlet's unique joint IDs and assigns each a local table
/// slot, iff the unique set fits in the 4-entry table (§4.5 step 4).
fn localize_joints(vertices: &[MeshletVertex]) -> [Option<u32>; 4] {
    let mut unique = Vec::new();
    for vertex in vertices {
        for &(joint, _) in &vertex.joints {
            if !unique.contains(&joint) {
                unique.push(joint);
            }
        }
    }

    let mut slots = [None; 4];
    if unique.len() <= slots.len() {
        for (slot, joint) in slots.iter_mut().zip(unique) {
            *slot = Some(joint);
        }
    }
    slots
}

/// A joint dominates a meshlet iff every vertex is rigidly bound to it alone
/// (weight ≥ 0.9999) — then the meshlet's culling bounds can ride that
/// joint's transform at runtime instead of being recomputed per frame.
fn dominant_joint(vertices: &[MeshletVertex]) -> Option<u32> {
    if vertices.is_empty() {
        return None;
    }

    let mut candidate = None;
    for vertex in vertices {
        if vertex.joints.len() != 1 || vertex.joints[0].1 < 0.9999 {
            return None;
        }
        let joint = vertex.joints[0].0;
        match candidate {
            None => candidate = Some(joint),
            Some(existing) if existing != joint => return None,
            _ => {}
        }
    }
    candidate
}

/// Builds this meshlet's morph-target records (§4.5 step 4): for each
/// morph target touching any of the meshlet's vertices, a packed
/// position-delta stream plus a per-vertex modified-bit mask.
fn build_meshlet_morph_targets(
    primitive: &SourcePrimitive,
    local_vertices: &[u32],
    morph_index: &HashMap<String, u32>,
) -> (Vec<MeshletMorphTarget>, f32, bool) {
    let mut targets = Vec::new();
    let mut max_position_delta = 0f32;
    let mut any_modified = false;

    for source in &primitive.morph_targets {
        let mut vertex_mask = Vec::with_capacity(local_vertices.len());
        let mut data = Vec::new();
        let mut target_max_delta = 0f32;
        let mut touches_meshlet = false;

        for &global_index in local_vertices {
            match source.position_deltas.get(global_index as usize).copied().flatten() {
                Some(delta) => {
                    vertex_mask.push(true);
                    for component in delta {
                        data.extend_from_slice(&component.to_le_bytes());
                    }
                    touches_meshlet = true;
                    target_max_delta = target_max_delta.max(delta.iter().fold(0f32, |m, &c| m.max(c.abs())));
                }
                None => vertex_mask.push(false),
            }
        }

        if touches_meshlet {
            any_modified = true;
            max_position_delta = max_position_delta.max(target_max_delta);
            let target_index = *morph_index.get(&source.name).expect("morph target name was registered before conversion");
            targets.push(MeshletMorphTarget { target_index, vertex_mask, data, modifies_position: true, max_position_delta: target_max_delta });
        }
    }

    (targets, max_position_delta, any_modified)
}

/// Consolidates a node's placement and skin offset into instance metadata (§4.5 step 6).
pub fn build_instance(name: String, mesh_index: u16, rotation: Quat, translation: Vec3, skin_offset: Option<u32>) -> InstanceMetadata {
    InstanceMetadata { name, mesh_index, rotation, translation, skin_offset }
}

/// Builds a position-only attribute descriptor, the minimal layout every
/// material carries.
pub fn position_attribute() -> AttributeMetadata {
    AttributeMetadata { name: "POSITION".into(), stream: AttributeStream::Vertex, semantic: AttributeSemantic::Position, semantic_index: 0, offset: 0 }
}

/// Registers a morph target by name, returning its index.
pub fn register_morph_target(geometry: &mut Geometry, name: String) -> u32 {
    if let Some(index) = geometry.morph_targets.iter().position(|t| t.name == name) {
        return index as u32;
    }
    geometry.morph_targets.push(MorphTargetMetadata { name });
    (geometry.morph_targets.len() - 1) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube_primitive() -> SourcePrimitive {
        // A single triangle; stride 12 (position only).
        let positions: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let mut vertex_data = Vec::new();
        for p in positions {
            for v in p {
                vertex_data.extend_from_slice(&v.to_le_bytes());
            }
        }

        SourcePrimitive {
            vertex_data,
            vertex_stride: 12,
            position_offset: 0,
            indices: vec![0, 1, 2],
            mesh_name: "tri".into(),
            material_name: "default".into(),
            joint_weights: Vec::new(),
            morph_targets: Vec::new(),
        }
    }

    #[test]
    fn converts_a_single_triangle_primitive() {
        let scheduler = JobScheduler::new(2);
        let geometry = convert(&scheduler, vec![cube_primitive()], vec![]).unwrap();

        assert_eq!(geometry.meshes.len(), 1);
        assert_eq!(geometry.lods.len(), 1);
        assert!(!geometry.meshlets.is_empty());
        assert_eq!(geometry.meshlets[0].header.vertex_count, 3);
    }

    #[test]
    fn lod_sort_treats_zero_as_infinite() {
        let mut geometry = Geometry {
            info: GeometryInfo { aabb: Aabb::EMPTY },
            meshes: vec![MeshMetadata { name: "m".into(), lod_metadata_index: 0, lod_count: 3, instance_data_index: 0 }],
            lods: vec![
                LodMetadata { max_view_distance: 10.0, first_meshlet_index: 0, meshlet_count: 0 },
                LodMetadata { max_view_distance: 0.0, first_meshlet_index: 0, meshlet_count: 0 },
                LodMetadata { max_view_distance: 50.0, first_meshlet_index: 0, meshlet_count: 0 },
            ],
            instances: Vec::new(),
            skin_indices: Vec::new(),
            meshlets: Vec::new(),
            materials: Vec::new(),
            attributes: Vec::new(),
            joints: Vec::new(),
            morph_targets: Vec::new(),
        };

        sort_lods_by_view_distance(&mut geometry);
        let distances: Vec<f32> = geometry.lods.iter().map(|l| l.max_view_distance).collect();
        assert_eq!(distances, vec![0.0, 50.0, 10.0]);
    }

    #[test]
    fn converts_a_rigidly_skinned_triangle_to_a_dominant_joint() {
        let mut primitive = cube_primitive();
        primitive.joint_weights = vec![vec![(5, 1.0)]; 3];

        let scheduler = JobScheduler::new(2);
        let geometry = convert(&scheduler, vec![primitive], vec![]).unwrap();

        let meshlet = &geometry.meshlets[0];
        assert_ne!(meshlet.header.joint_index, 0xFFFF);
        assert_eq!(meshlet.header.local_joints[0], Some(5));
        assert_eq!(meshlet.culling.dominant_joint, Some(0));
    }

    #[test]
    fn converts_a_morphed_triangle_to_a_meshlet_morph_target() {
        let mut primitive = cube_primitive();
        primitive.morph_targets.push(SourceMorphTarget {
            name: "blink".into(),
            position_deltas: vec![Some([0.0, 0.1, 0.0]), None, None],
        });

        let scheduler = JobScheduler::new(2);
        let geometry = convert(&scheduler, vec![primitive], vec![]).unwrap();

        assert_eq!(geometry.morph_targets.len(), 1);
        assert_eq!(geometry.morph_targets[0].name, "blink");
        assert_ne!(geometry.meshlets[0].header.morph_target_mask, 0);
    }

    fn rigidly_bound_vertex(joint: u32, weight: f32) -> MeshletVertex {
        MeshletVertex { position: [0.0; 3], vertex_data: vec![0; 12], shading_data: Vec::new(), joints: vec![(joint, weight)] }
    }

    #[test]
    fn dominant_joint_requires_the_same_single_joint_everywhere() {
        let vertices = vec![rigidly_bound_vertex(2, 1.0), rigidly_bound_vertex(2, 0.9999)];
        assert_eq!(dominant_joint(&vertices), Some(2));

        let mismatched = vec![rigidly_bound_vertex(2, 1.0), rigidly_bound_vertex(3, 1.0)];
        assert_eq!(dominant_joint(&mismatched), None);

        let under_threshold = vec![rigidly_bound_vertex(2, 0.5)];
        assert_eq!(dominant_joint(&under_threshold), None);
    }

    #[test]
    fn localize_joints_falls_back_to_all_none_past_four_unique_joints() {
        let vertices: Vec<MeshletVertex> = (0..5).map(|j| rigidly_bound_vertex(j, 0.5)).collect();
        assert_eq!(localize_joints(&vertices), [None; 4]);

        let fits: Vec<MeshletVertex> = (0..3).map(|j| rigidly_bound_vertex(j, 0.5)).collect();
        assert_eq!(localize_joints(&fits), [Some(0), Some(1), Some(2), None]);
    }

    #[test]
    fn morph_target_mask_only_covers_touched_vertices() {
        let primitive = SourcePrimitive {
            vertex_data: Vec::new(),
            vertex_stride: 12,
            position_offset: 0,
            indices: Vec::new(),
            mesh_name: "m".into(),
            material_name: "default".into(),
            joint_weights: Vec::new(),
            morph_targets: vec![SourceMorphTarget { name: "blink".into(), position_deltas: vec![Some([1.0, 0.0, 0.0]), None] }],
        };
        let morph_index: HashMap<String, u32> = [("blink".to_string(), 0u32)].into_iter().collect();

        let (targets, max_delta, any) = build_meshlet_morph_targets(&primitive, &[0, 1], &morph_index);

        assert!(any);
        assert_eq!(max_delta, 1.0);
        assert_eq!(targets[0].vertex_mask, vec![true, false]);
        assert_eq!(targets[0].data.len(), 12);
    }
}
