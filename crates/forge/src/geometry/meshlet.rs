//! Meshlet assembly (§3, §4.5 step 4, §6).
//!
//! A meshlet's buffer is assembled in one fixed section order — dual-index
//! table, vertex stream, primitive indices, shading stream, morph-target
//! info table, morph data — with every section padded up to a 16-byte unit
//! so intra-meshlet offsets stay in those units.

const ALIGNMENT: usize = 16;
const MAX_VERTICES: usize = 128;
const MAX_PRIMITIVES: usize = 128;
pub const NO_JOINT: u16 = 0xFFFF;

fn align_up(size: usize) -> usize {
    (size + ALIGNMENT - 1) / ALIGNMENT * ALIGNMENT
}

/// A vertex as produced by the meshletizer, before stream packing: position
/// plus up to 4 (joint, weight) pairs sorted by descending weight.
#[derive(Debug, Clone)]
pub struct MeshletVertex {
    /// Local position, object space.
    pub position: [f32; 3],
    /// Packed vertex-stream bytes (per the material's layout).
    pub vertex_data: Vec<u8>,
    /// Packed shading-stream bytes.
    pub shading_data: Vec<u8>,
    /// `(joint, weight)` pairs, descending by weight, zero-weight entries dropped.
    pub joints: Vec<(u32, f32)>,
}

/// One morph target's effect on a meshlet: a delta record per modified vertex.
#[derive(Debug, Clone)]
pub struct MeshletMorphTarget {
    /// Index into the asset's morph target list.
    pub target_index: u32,
    /// `true` for each local vertex this target modifies.
    pub vertex_mask: Vec<bool>,
    /// One packed delta record (per the material's morph stride) per `true` bit in `vertex_mask`.
    pub data: Vec<u8>,
    /// `true` if this target modifies any position component.
    pub modifies_position: bool,
    /// Largest per-axis position delta this target introduces, for bounding sphere inflation.
    pub max_position_delta: f32,
}

/// Culling information computed from a meshlet's geometry.
#[derive(Debug, Clone, Copy, Default)]
pub struct CullingInfo {
    /// Bounding sphere center and radius, if the radius is nonzero.
    pub bounding_sphere: Option<([f32; 3], f32)>,
    /// Culling cone apex/axis/cutoff, if cutoff < 1.
    pub cone: Option<([f32; 3], [f32; 3], f32)>,
    /// Index of the dominant joint, or `None` if there isn't a unique one.
    pub dominant_joint: Option<u32>,
}

/// Header fields preceding a meshlet's packed buffer.
#[derive(Debug, Clone)]
pub struct MeshletHeader {
    /// Number of unique vertices.
    pub vertex_count: u16,
    /// Number of triangles.
    pub primitive_count: u16,
    /// Up to 4 global joint IDs referenced by this meshlet, `None` if unused.
    pub local_joints: [Option<u32>; 4],
    /// Bit `i` set iff morph target `i` modifies this meshlet.
    pub morph_target_mask: u64,
    /// Dominant joint index, or `0xFFFF` if none.
    pub joint_index: u16,
    /// `dataOffset` of each section, in 16-byte units, in buffer order.
    pub section_offsets: MeshletSectionOffsets,
}

/// Offsets (16-byte units) of each fixed-order section within a meshlet buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeshletSectionOffsets {
    /// Dual-index table offset; equals `vertex_stream` if dual indexing is disabled.
    pub dual_index_table: u32,
    /// Vertex (position) stream offset.
    pub vertex_stream: u32,
    /// Primitive (triangle) index offset.
    pub primitive_indices: u32,
    /// Shading stream offset.
    pub shading_stream: u32,
    /// Morph-target info table offset.
    pub morph_info: u32,
    /// Morph data offset.
    pub morph_data: u32,
}

/// A fully assembled meshlet: header plus its packed buffer.
#[derive(Debug, Clone)]
pub struct Meshlet {
    /// The meshlet's header.
    pub header: MeshletHeader,
    /// Culling info.
    pub culling: CullingInfo,
    /// The packed section buffer, 16-byte-unit aligned throughout.
    pub buffer: Vec<u8>,
}

/// Deduplicates `(vertex, shading)` pairs across a meshlet's original
/// per-corner vertex list, returning the unique streams plus a per-corner
/// `(vertex_index, shading_index)` pair table.
fn dual_index(vertices: &[MeshletVertex]) -> (Vec<&MeshletVertex>, Vec<&MeshletVertex>, Vec<(u16, u16)>) {
    let mut unique_vertex: Vec<&MeshletVertex> = Vec::new();
    let mut unique_shading: Vec<&MeshletVertex> = Vec::new();
    let mut vertex_lookup: Vec<(&[u8], u16)> = Vec::new();
    let mut shading_lookup: Vec<(&[u8], u16)> = Vec::new();
    let mut pairs = Vec::with_capacity(vertices.len());

    for vertex in vertices {
        let vi = match vertex_lookup.iter().position(|(data, _)| *data == vertex.vertex_data.as_slice()) {
            Some(pos) => vertex_lookup[pos].1,
            None => {
                let index = unique_vertex.len() as u16;
                unique_vertex.push(vertex);
                vertex_lookup.push((vertex.vertex_data.as_slice(), index));
                index
            }
        };

        let si = match shading_lookup.iter().position(|(data, _)| *data == vertex.shading_data.as_slice()) {
            Some(pos) => shading_lookup[pos].1,
            None => {
                let index = unique_shading.len() as u16;
                unique_shading.push(vertex);
                shading_lookup.push((vertex.shading_data.as_slice(), index));
                index
            }
        };

        pairs.push((vi, si));
    }

    (unique_vertex, unique_shading, pairs)
}

/// Assembles one meshlet's buffer from its per-corner vertices and indices,
/// choosing dual indexing iff it is not larger than the non-indexed layout.
pub fn build_meshlet(
    vertices: &[MeshletVertex],
    triangle_indices: &[u16],
    morph_targets: &[MeshletMorphTarget],
    culling: CullingInfo,
    local_joints: [Option<u32>; 4],
) -> Meshlet {
    assert!(vertices.len() <= MAX_VERTICES);
    assert!(triangle_indices.len() / 3 <= MAX_PRIMITIVES);

    let vstride = vertices.first().map_or(0, |v| v.vertex_data.len());
    let sstride = vertices.first().map_or(0, |v| v.shading_data.len());

    let (unique_vertex, unique_shading, pairs) = dual_index(vertices);

    let dual_size = 2 * vertices.len() // (vi, si) as u16 each
        + unique_vertex.len() * vstride
        + unique_shading.len() * sstride;
    let flat_size = vertices.len() * vstride + vertices.len() * sstride;

    let use_dual = dual_size <= flat_size && unique_vertex.len() < vertices.len().max(1);

    let mut buffer = Vec::new();
    let mut offsets = MeshletSectionOffsets::default();

    // Section 1: dual-index table.
    offsets.dual_index_table = (buffer.len() / ALIGNMENT) as u32;
    if use_dual {
        for (vi, si) in &pairs {
            buffer.extend_from_slice(&vi.to_le_bytes());
            buffer.extend_from_slice(&si.to_le_bytes());
        }
        pad(&mut buffer);
    }

    // Section 2: vertex stream.
    offsets.vertex_stream = (buffer.len() / ALIGNMENT) as u32;
    let vertex_source: Vec<&MeshletVertex> = if use_dual { unique_vertex.clone() } else { vertices.iter().collect() };
    for v in &vertex_source {
        buffer.extend_from_slice(&v.vertex_data);
    }
    pad(&mut buffer);

    // Section 3: primitive indices.
    offsets.primitive_indices = (buffer.len() / ALIGNMENT) as u32;
    for &index in triangle_indices {
        buffer.extend_from_slice(&index.to_le_bytes());
    }
    pad(&mut buffer);

    // Section 4: shading stream.
    offsets.shading_stream = (buffer.len() / ALIGNMENT) as u32;
    let shading_source: Vec<&MeshletVertex> = if use_dual { unique_shading.clone() } else { vertices.iter().collect() };
    for v in &shading_source {
        buffer.extend_from_slice(&v.shading_data);
    }
    pad(&mut buffer);

    // Section 5: morph-target info table.
    offsets.morph_info = (buffer.len() / ALIGNMENT) as u32;
    let active_targets: Vec<&MeshletMorphTarget> = morph_targets.iter().filter(|t| t.vertex_mask.iter().any(|&m| m)).collect();
    let mut data_index = 0u32;
    let mut morph_mask = 0u64;
    let mut info_entries = Vec::new();
    for target in &active_targets {
        info_entries.push((data_index, target));
        data_index += target.vertex_mask.iter().filter(|&&m| m).count() as u32;
        if let Some(bit) = target.target_index.checked_rem(64) {
            morph_mask |= 1u64 << bit;
        }
    }
    for (start, target) in &info_entries {
        buffer.extend_from_slice(&start.to_le_bytes());
        let mut mask_bytes = vec![0u8; vertices.len().div_ceil(8)];
        for (i, &modified) in target.vertex_mask.iter().enumerate() {
            if modified {
                mask_bytes[i / 8] |= 1 << (i % 8);
            }
        }
        buffer.extend_from_slice(&mask_bytes);
    }
    pad(&mut buffer);

    // Section 6: morph data.
    offsets.morph_data = (buffer.len() / ALIGNMENT) as u32;
    for target in &active_targets {
        buffer.extend_from_slice(&target.data);
    }
    pad(&mut buffer);

    let joint_index = culling.dominant_joint.map_or(NO_JOINT, |j| j as u16);

    Meshlet {
        header: MeshletHeader {
            vertex_count: vertices.len() as u16,
            primitive_count: (triangle_indices.len() / 3) as u16,
            local_joints,
            morph_target_mask: morph_mask,
            joint_index,
            section_offsets: offsets,
        },
        culling,
        buffer,
    }
}

fn pad(buffer: &mut Vec<u8>) {
    buffer.resize(align_up(buffer.len()), 0);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(pos: [f32; 3], vdata: u8, sdata: u8) -> MeshletVertex {
        MeshletVertex { position: pos, vertex_data: vec![vdata; 12], shading_data: vec![sdata; 8], joints: Vec::new() }
    }

    #[test]
    fn every_section_offset_is_16_byte_aligned() {
        let vertices = vec![vertex([0.0, 0.0, 0.0], 1, 10), vertex([1.0, 0.0, 0.0], 2, 11), vertex([0.0, 1.0, 0.0], 3, 12)];
        let meshlet = build_meshlet(&vertices, &[0, 1, 2], &[], CullingInfo::default(), [None; 4]);

        let offsets = meshlet.header.section_offsets;
        for offset in [offsets.dual_index_table, offsets.vertex_stream, offsets.primitive_indices, offsets.shading_stream, offsets.morph_info, offsets.morph_data] {
            assert_eq!((offset as usize) * ALIGNMENT % ALIGNMENT, 0);
        }
        assert_eq!(meshlet.buffer.len() % ALIGNMENT, 0);
    }

    #[test]
    fn sections_appear_in_fixed_order() {
        let vertices = vec![vertex([0.0, 0.0, 0.0], 1, 10), vertex([1.0, 0.0, 0.0], 1, 10)]; // duplicate data -> dual indexing kicks in
        let meshlet = build_meshlet(&vertices, &[0, 1, 0], &[], CullingInfo::default(), [None; 4]);
        let offsets = meshlet.header.section_offsets;

        assert!(offsets.dual_index_table <= offsets.vertex_stream);
        assert!(offsets.vertex_stream <= offsets.primitive_indices);
        assert!(offsets.primitive_indices <= offsets.shading_stream);
        assert!(offsets.shading_stream <= offsets.morph_info);
        assert!(offsets.morph_info <= offsets.morph_data);
    }

    #[test]
    fn dual_indexing_reconstructs_the_same_vertex_stream() {
        let vertices = vec![
            vertex([0.0, 0.0, 0.0], 1, 10),
            vertex([1.0, 0.0, 0.0], 2, 11),
            vertex([0.0, 0.0, 0.0], 1, 10), // duplicate of vertex 0
        ];
        let (unique_vertex, _unique_shading, pairs) = dual_index(&vertices);

        let reconstructed: Vec<&[u8]> = pairs.iter().map(|&(vi, _)| unique_vertex[vi as usize].vertex_data.as_slice()).collect();
        let expected: Vec<&[u8]> = vertices.iter().map(|v| v.vertex_data.as_slice()).collect();
        assert_eq!(reconstructed, expected);
    }

    #[test]
    fn unique_dominant_joint_sets_joint_index_and_bounds() {
        let vertices = vec![vertex([0.0, 0.0, 0.0], 1, 10)];
        let culling = CullingInfo { bounding_sphere: Some(([0.0, 0.0, 0.0], 1.0)), cone: None, dominant_joint: Some(3) };
        let meshlet = build_meshlet(&vertices, &[0, 0, 0], &[], culling, [Some(3), None, None, None]);

        assert_ne!(meshlet.header.joint_index, NO_JOINT);
        assert!(meshlet.culling.bounding_sphere.is_some());
    }
}
