//! Merge build job: copies one file from an existing archive unchanged,
//! preserving its compression (§4.6 "Merge").

use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::jobs::{simple, JobScheduler};

use super::container::Archive;
use super::format::{BuiltFile, BuiltSubFile};
use super::result::{AtomicBuildResult, BuildJob, BuildProgress, BuildResult, JobCompletion};

/// Copies file `file_index` out of `archive` verbatim, without re-decoding
/// its sub-files.
pub struct MergeBuildJob {
    completion: JobCompletion,
    output: Mutex<Option<BuiltFile>>,
    result: AtomicBuildResult,
}

impl MergeBuildJob {
    /// Constructs the job and immediately dispatches the copy.
    #[must_use]
    pub fn new(scheduler: &JobScheduler, archive: Arc<Archive>, file_index: usize) -> Arc<Self> {
        let job = Arc::new(Self { completion: JobCompletion::new(), output: Mutex::new(None), result: AtomicBuildResult::new() });

        let dispatched = Arc::clone(&job);
        scheduler.dispatch(
            simple(move || {
                match copy_file(&archive, file_index) {
                    Ok(file) => *dispatched.output.lock().expect("merge build job output poisoned") = Some(file),
                    Err(err) => dispatched.result.fail_if_success(err.into()),
                }
                dispatched.completion.mark_done();
            }),
            (),
        );
        job
    }
}

fn copy_file(archive: &Archive, file_index: usize) -> Result<BuiltFile> {
    let entry = archive.files().get(file_index).ok_or_else(|| Error::NotFound(format!("archive file index {file_index}")))?;

    let sub_files = entry
        .sub_files
        .iter()
        .map(|sub_file| {
            let bytes = archive.sub_file_bytes(sub_file).ok_or_else(|| Error::InvalidInput("merged sub-file range out of bounds".into()))?;
            Ok(BuiltSubFile { identifier: sub_file.identifier, compression: sub_file.compression, raw_size: sub_file.raw_size, compressed_data: bytes.to_vec() })
        })
        .collect::<Result<_>>()?;

    Ok(BuiltFile { type_tag: entry.type_tag, name: entry.name.clone(), inline_data: entry.inline_data.clone(), sub_files })
}

impl BuildJob for MergeBuildJob {
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
        (BuildResult::Success, self.output.lock().expect("merge build job output poisoned").clone())
    }

    fn abort(&self) {
        self.result.fail_if_success(BuildResult::Aborted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::container::build_archive;
    use super::super::format::{Compression, FourCC};

    fn sample_archive() -> Archive {
        let files = vec![BuiltFile {
            type_tag: FourCC::from_str("SHDR"),
            name: "shd.spv".into(),
            inline_data: vec![1, 2],
            sub_files: vec![BuiltSubFile {
                identifier: FourCC::from_str("SPIR"),
                compression: Compression::None,
                raw_size: 4,
                compressed_data: vec![1, 2, 3, 4],
            }],
        }];
        Archive::parse(&build_archive(&files).unwrap()).unwrap()
    }

    #[test]
    fn merge_copies_a_file_verbatim() {
        let scheduler = JobScheduler::new(1);
        let archive = Arc::new(sample_archive());
        let job = MergeBuildJob::new(&scheduler, archive, 0);

        let (status, file) = job.file_info();
        assert_eq!(status, BuildResult::Success);
        let file = file.unwrap();
        assert_eq!(file.name, "shd.spv");
        assert_eq!(file.sub_files[0].compressed_data, vec![1, 2, 3, 4]);
    }

    #[test]
    fn merging_a_missing_index_reports_not_found() {
        let scheduler = JobScheduler::new(1);
        let archive = Arc::new(sample_archive());
        let job = MergeBuildJob::new(&scheduler, archive, 7);

        let (status, file) = job.file_info();
        assert_eq!(status, BuildResult::InvalidInput);
        assert!(file.is_none());
    }
}
