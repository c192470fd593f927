//! Basic build job: an already-formed [`FileDesc`] whose sub-files are
//! optionally compressed in parallel (§4.6 "Basic").

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::jobs::{batch, JobScheduler};

use super::format::{BuiltFile, BuiltSubFile, Compression, FileDesc, SubFileDesc};
use super::result::{AtomicBuildResult, BuildJob, BuildProgress, BuildResult, JobCompletion};

fn compress_one(desc: &SubFileDesc) -> crate::error::Result<BuiltSubFile> {
    let compressed_data = match desc.compression {
        Compression::None => desc.data.clone(),
        Compression::Deflate => crate::io::deflate::deflate_encode(&desc.data)?,
        Compression::GDeflate => crate::io::deflate::gdeflate_encode(&desc.data)?,
    };

    Ok(BuiltSubFile {
        identifier: desc.identifier,
        compression: desc.compression,
        raw_size: desc.data.len() as u64,
        compressed_data,
    })
}

/// Compresses each of `desc`'s sub-files in parallel and emits the resulting
/// [`BuiltFile`] unchanged otherwise.
pub struct BasicBuildJob {
    type_tag: super::format::FourCC,
    name: String,
    inline_data: Vec<u8>,
    sub_file_descs: Vec<SubFileDesc>,
    built: Mutex<Vec<Option<BuiltSubFile>>>,
    completion: JobCompletion,
    result: AtomicBuildResult,
}

impl BasicBuildJob {
    /// Constructs the job and immediately dispatches its compression work.
    #[must_use]
    pub fn new(scheduler: &JobScheduler, desc: FileDesc) -> Arc<Self> {
        let sub_file_count = desc.sub_files.len();
        let job = Arc::new(Self {
            type_tag: desc.type_tag,
            name: desc.name,
            inline_data: desc.inline_data,
            sub_file_descs: desc.sub_files,
            built: Mutex::new((0..sub_file_count).map(|_| None).collect()),
            completion: JobCompletion::new(),
            result: AtomicBuildResult::new(),
        });

        if sub_file_count == 0 {
            job.completion.mark_done();
            return job;
        }

        let remaining = Arc::new(AtomicU32::new(sub_file_count as u32));
        let dispatched = Arc::clone(&job);
        scheduler.dispatch(
            batch(
                move |i| {
                    match compress_one(&dispatched.sub_file_descs[i as usize]) {
                        Ok(built) => dispatched.built.lock().expect("basic build job output poisoned")[i as usize] = Some(built),
                        Err(err) => dispatched.result.fail_if_success(err.into()),
                    }
                    if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                        dispatched.completion.mark_done();
                    }
                },
                sub_file_count as u32,
                1,
            ),
            (),
        );
        job
    }
}

impl BuildJob for BasicBuildJob {
    fn progress(&self) -> (BuildResult, BuildProgress) {
        let status = self.result.load();
        let built = self.built.lock().expect("basic build job output poisoned");
        let completed = built.iter().filter(|b| b.is_some()).count() as u32;
        let total = built.len() as u32;

        let status = if status == BuildResult::Success && completed < total { BuildResult::InProgress } else { status };
        (status, BuildProgress { completed, total })
    }

    fn file_info(&self) -> (BuildResult, Option<BuiltFile>) {
        self.completion.wait();
        let status = self.result.load();
        if status.is_failure() {
            return (status, None);
        }

        let sub_files = self
            .built
            .lock()
            .expect("basic build job output poisoned")
            .iter()
            .map(|b| b.clone().expect("every sub-file index is claimed exactly once"))
            .collect();

        (BuildResult::Success, Some(BuiltFile { type_tag: self.type_tag, name: self.name.clone(), inline_data: self.inline_data.clone(), sub_files }))
    }

    fn abort(&self) {
        self.result.fail_if_success(BuildResult::Aborted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::format::FourCC;

    #[test]
    fn compresses_every_sub_file_and_preserves_inline_data() {
        let scheduler = JobScheduler::new(2);
        let desc = FileDesc {
            type_tag: FourCC::from_str("BASC"),
            name: "basic".into(),
            inline_data: vec![1, 2, 3],
            sub_files: vec![
                SubFileDesc { identifier: FourCC::from_str("A"), compression: Compression::None, data: vec![9; 16] },
                SubFileDesc { identifier: FourCC::from_str("B"), compression: Compression::Deflate, data: vec![7; 512] },
            ],
        };

        let job = BasicBuildJob::new(&scheduler, desc);
        let (status, file) = job.file_info();
        assert_eq!(status, BuildResult::Success);
        let file = file.unwrap();
        assert_eq!(file.inline_data, vec![1, 2, 3]);
        assert_eq!(file.sub_files.len(), 2);
        assert_eq!(file.sub_files[0].compressed_data, vec![9; 16]);
    }

    #[test]
    fn a_file_with_no_sub_files_completes_immediately() {
        let scheduler = JobScheduler::new(1);
        let desc = FileDesc { type_tag: FourCC::from_str("BASC"), name: "empty".into(), inline_data: Vec::new(), sub_files: Vec::new() };
        let job = BasicBuildJob::new(&scheduler, desc);
        let (status, file) = job.file_info();
        assert_eq!(status, BuildResult::Success);
        assert!(file.unwrap().sub_files.is_empty());
    }
}
