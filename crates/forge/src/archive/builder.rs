//! Archive builder: collects build jobs, waits for them in order, and
//! assembles the finished container (§4.6, §6).

use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};

use super::container::build_archive;
use super::format::BuiltFile;
use super::result::{BuildJob, BuildProgress, BuildResult};

/// Dispatches and tracks a set of [`BuildJob`]s, in the order they were
/// added, and assembles their finished files into an archive container.
///
/// Each concrete job dispatches its own work at construction time; this
/// type only sequences waiting on them and reports aggregate progress.
pub struct ArchiveBuilder {
    jobs: Mutex<Vec<Arc<dyn BuildJob>>>,
    locked: Mutex<bool>,
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self { jobs: Mutex::new(Vec::new()), locked: Mutex::new(false) }
    }

    /// Registers an already-dispatched build job. Returns `false` if
    /// [`Self::build`] has already started.
    pub fn add_job(&self, job: Arc<dyn BuildJob>) -> bool {
        if *self.locked.lock().expect("archive builder lock poisoned") {
            return false;
        }
        self.jobs.lock().expect("archive builder jobs poisoned").push(job);
        true
    }

    /// Current status and summed progress across every registered job. The
    /// first non-success result found wins.
    #[must_use]
    pub fn progress(&self) -> (BuildResult, BuildProgress) {
        let jobs = self.jobs.lock().expect("archive builder jobs poisoned");
        let mut overall = BuildResult::Success;
        let mut total = BuildProgress::default();

        for job in jobs.iter() {
            let (status, progress) = job.progress();
            total.add(progress);
            if overall == BuildResult::Success {
                overall = status;
            }
        }
        (overall, total)
    }

    /// Sends an abort signal to every registered job.
    pub fn abort(&self) {
        for job in self.jobs.lock().expect("archive builder jobs poisoned").iter() {
            job.abort();
        }
    }

    /// Waits for every job to complete, in the order they were added, and
    /// serializes the resulting files into an archive container.
    ///
    /// Must only be called once; no further jobs may be added afterward.
    pub fn build(&self) -> Result<Vec<u8>> {
        *self.locked.lock().expect("archive builder lock poisoned") = true;

        let jobs = self.jobs.lock().expect("archive builder jobs poisoned");
        let mut files: Vec<BuiltFile> = Vec::with_capacity(jobs.len());

        for job in jobs.iter() {
            let (status, file) = job.file_info();
            if status.is_failure() {
                return Err(build_error(status));
            }
            files.push(file.ok_or_else(|| Error::InvalidInput("build job reported success with no file".into()))?);
        }

        build_archive(&files)
    }
}

fn build_error(status: BuildResult) -> Error {
    match status {
        BuildResult::Aborted => Error::Aborted,
        BuildResult::InvalidArgument => Error::InvalidArgument("archive build job failed".into()),
        BuildResult::IoError => Error::IoError(std::io::Error::other("archive build job I/O failure")),
        _ => Error::InvalidInput("archive build job failed".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::basic::BasicBuildJob;
    use crate::archive::format::{Compression, FileDesc, FourCC, SubFileDesc};
    use crate::archive::merge::MergeBuildJob;
    use crate::archive::shader::ShaderBuildJob;
    use crate::jobs::JobScheduler;

    #[test]
    fn builds_an_archive_from_multiple_job_kinds() {
        let scheduler = JobScheduler::new(2);
        let builder = ArchiveBuilder::new();

        let basic = BasicBuildJob::new(
            &scheduler,
            FileDesc {
                type_tag: FourCC::from_str("BASC"),
                name: "basic".into(),
                inline_data: Vec::new(),
                sub_files: vec![SubFileDesc { identifier: FourCC::from_str("A"), compression: Compression::None, data: vec![1, 2, 3] }],
            },
        );
        assert!(builder.add_job(basic));

        let mut words: Vec<u32> = vec![0x0723_0203, 0x0001_0000, 0, 10, 0];
        words.push((4 << 16) | 15);
        words.push(0);
        words.push(1);
        words.push(2);
        let mut spirv = Vec::new();
        for w in words {
            spirv.extend_from_slice(&w.to_le_bytes());
        }
        let shader = ShaderBuildJob::new(&scheduler, "shader".into(), spirv);
        assert!(builder.add_job(shader));

        let bytes = builder.build().unwrap();
        assert!(!bytes.is_empty());

        let (status, progress) = builder.progress();
        assert_eq!(status, BuildResult::Success);
        assert_eq!(progress.total, progress.completed);
    }

    #[test]
    fn adding_a_job_after_build_starts_is_rejected() {
        let scheduler = JobScheduler::new(1);
        let builder = ArchiveBuilder::new();
        builder.build().unwrap();

        let job = MergeBuildJob::new(&scheduler, Arc::new(crate::archive::container::Archive::parse(&build_archive(&[]).unwrap()).unwrap()), 0);
        assert!(!builder.add_job(job));
    }

    #[test]
    fn a_failing_job_fails_the_whole_build() {
        let scheduler = JobScheduler::new(1);
        let builder = ArchiveBuilder::new();
        let archive = Arc::new(crate::archive::container::Archive::parse(&build_archive(&[]).unwrap()).unwrap());
        let job = MergeBuildJob::new(&scheduler, archive, 0); // out of range -> InvalidInput
        builder.add_job(job);

        assert!(builder.build().is_err());
    }
}
