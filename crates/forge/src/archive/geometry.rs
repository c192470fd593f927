//! Geometry build job: runs the meshlet converter, then serializes and
//! GDeflates the result (§4.6 "Geometry build").

use std::sync::{Arc, Mutex};

use crate::geometry::{convert, Geometry, JointNode, SourcePrimitive};
use crate::jobs::{simple, JobScheduler};

use super::format::{BuiltFile, BuiltSubFile, Compression, FourCC};
use super::result::{AtomicBuildResult, BuildJob, BuildProgress, BuildResult, JobCompletion};

/// Converts glTF primitives into a meshlet [`Geometry`] and packs it as a
/// `"GEOM"` archive file: a `"META"` sub-file holding the serialized
/// metadata, and a `"DATA"` sub-file holding the concatenated meshlet
/// buffers, GDeflate-compressed.
pub struct GeometryBuildJob {
    name: String,
    completion: JobCompletion,
    output: Mutex<Option<BuiltFile>>,
    result: AtomicBuildResult,
}

impl GeometryBuildJob {
    /// Constructs the job and immediately dispatches the conversion work.
    ///
    /// `converter` runs on its own [`JobScheduler`] (the meshlet converter
    /// dispatches per-primitive jobs internally); `scheduler` only owns this
    /// job's own single synchronous step.
    #[must_use]
    pub fn new(
        scheduler: &JobScheduler,
        converter: Arc<JobScheduler>,
        name: String,
        primitives: Vec<SourcePrimitive>,
        joints: Vec<JointNode>,
    ) -> Arc<Self> {
        let job = Arc::new(Self { name, completion: JobCompletion::new(), output: Mutex::new(None), result: AtomicBuildResult::new() });

        let dispatched = Arc::clone(&job);
        let inputs = Mutex::new(Some((primitives, joints)));
        scheduler.dispatch(
            simple(move || {
                let (primitives, joints) = inputs.lock().expect("geometry build job inputs poisoned").take().expect("geometry build job's single work item ran more than once");
                match convert(&converter, primitives, joints).map_err(BuildResult::from).and_then(|geometry| pack(&dispatched.name, &geometry).map_err(BuildResult::from)) {
                    Ok(file) => *dispatched.output.lock().expect("geometry build job output poisoned") = Some(file),
                    Err(result) => dispatched.result.fail_if_success(result),
                }
                dispatched.completion.mark_done();
            }),
            (),
        );
        job
    }
}

fn pack(name: &str, geometry: &Geometry) -> crate::error::Result<BuiltFile> {
    let metadata = geometry.serialize();
    let metadata_compressed = crate::io::deflate::deflate_encode(&metadata)?;

    let mut data = Vec::new();
    for meshlet in &geometry.meshlets {
        data.extend_from_slice(&meshlet.buffer);
    }
    let data_compressed = crate::io::deflate::gdeflate_encode(&data)?;

    Ok(BuiltFile {
        type_tag: FourCC::from_str("GEOM"),
        name: name.to_string(),
        inline_data: Vec::new(),
        sub_files: vec![
            BuiltSubFile { identifier: FourCC::from_str("META"), compression: Compression::Deflate, raw_size: metadata.len() as u64, compressed_data: metadata_compressed },
            BuiltSubFile { identifier: FourCC::from_str("DATA"), compression: Compression::GDeflate, raw_size: data.len() as u64, compressed_data: data_compressed },
        ],
    })
}

impl BuildJob for GeometryBuildJob {
    fn progress(&self) -> (BuildResult, BuildProgress) {
        let status = self.result.load();
        let done = self.completion.is_done();
        let status = if status == BuildResult::Success && !done { BuildResult::InProgress } else { status };
        (status, BuildProgress { completed: u32::from(done), total: 1 })
    }

    fn file_info(&self) -> (BuildResult, Option<BuiltFile>) {
        self.completion.wait();
        let status = self.result.load();
        if status.is_failure() {
            return (status, None);
        }
        (BuildResult::Success, self.output.lock().expect("geometry build job output poisoned").clone())
    }

    fn abort(&self) {
        self.result.fail_if_success(BuildResult::Aborted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> SourcePrimitive {
        let positions: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let mut vertex_data = Vec::new();
        for p in positions {
            for v in p {
                vertex_data.extend_from_slice(&v.to_le_bytes());
            }
        }
        SourcePrimitive { vertex_data, vertex_stride: 12, position_offset: 0, indices: vec![0, 1, 2], mesh_name: "tri".into(), material_name: "default".into(), joint_weights: Vec::new(), morph_targets: Vec::new() }
    }

    #[test]
    fn builds_a_geom_file_with_meta_and_data_sub_files() {
        let scheduler = JobScheduler::new(1);
        let converter = Arc::new(JobScheduler::new(2));
        let job = GeometryBuildJob::new(&scheduler, converter, "mesh".into(), vec![triangle()], Vec::new());

        let (status, file) = job.file_info();
        assert_eq!(status, BuildResult::Success);
        let file = file.unwrap();
        assert_eq!(file.type_tag, FourCC::from_str("GEOM"));
        assert_eq!(file.sub_files.len(), 2);
        assert_eq!(file.sub_files[0].identifier, FourCC::from_str("META"));
        assert_eq!(file.sub_files[1].identifier, FourCC::from_str("DATA"));
    }
}
