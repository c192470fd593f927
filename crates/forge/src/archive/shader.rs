//! Shader build job: reflect, encode, and compress a SPIR-V binary (§4.6).

use std::sync::Mutex;

use crate::error::Result;
use crate::io::deflate::deflate_encode;
use crate::io::spirv::spirv_encode;
use crate::jobs::{simple, JobScheduler};

use super::format::{BuiltFile, BuiltSubFile, Compression, FourCC};
use super::result::{AtomicBuildResult, BuildJob, BuildProgress, BuildResult, JobCompletion};

/// Counts SPIR-V entry points and resource bindings by scanning `OpEntryPoint`
/// (15) and `OpDecorate ... Binding/DescriptorSet` (71) instructions, the
/// minimal reflection this tool needs to describe a shader's interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShaderReflection {
    /// Number of `OpEntryPoint` instructions.
    pub entry_point_count: u32,
    /// Highest descriptor set index referenced by any binding, plus one.
    pub descriptor_set_count: u32,
    /// Number of `Binding`/`DescriptorSet` decorations found.
    pub binding_count: u32,
}

impl ShaderReflection {
    /// Serializes this reflection as the archive file's inline data.
    #[must_use]
    pub fn serialize(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(12);
        out.extend_from_slice(&self.entry_point_count.to_le_bytes());
        out.extend_from_slice(&self.descriptor_set_count.to_le_bytes());
        out.extend_from_slice(&self.binding_count.to_le_bytes());
        out
    }
}

const OP_ENTRY_POINT: u32 = 15;
const OP_DECORATE: u32 = 71;
const DECORATION_BINDING: u32 = 33;
const DECORATION_DESCRIPTOR_SET: u32 = 34;

/// Walks a SPIR-V module's instruction stream, extracting entry points and
/// binding decorations. Returns `None` if the stream is too short to carry a
/// valid header.
#[must_use]
pub fn reflect(spirv: &[u8]) -> Option<ShaderReflection> {
    if spirv.len() < 20 || spirv.len() % 4 != 0 {
        return None;
    }

    let word = |i: usize| -> u32 {
        let o = i * 4;
        u32::from_le_bytes([spirv[o], spirv[o + 1], spirv[o + 2], spirv[o + 3]])
    };

    let word_count = spirv.len() / 4;
    let mut reflection = ShaderReflection::default();
    let mut max_set = 0u32;
    let mut i = 5; // skip the 5-word module header (magic, version, generator, bound, schema)

    while i < word_count {
        let instruction = word(i);
        let length = (instruction >> 16) as usize;
        let opcode = instruction & 0xFFFF;
        if length == 0 || i + length > word_count {
            break;
        }

        if opcode == OP_ENTRY_POINT {
            reflection.entry_point_count += 1;
        } else if opcode == OP_DECORATE && length >= 3 {
            let decoration = word(i + 2);
            if decoration == DECORATION_BINDING {
                reflection.binding_count += 1;
            } else if decoration == DECORATION_DESCRIPTOR_SET && length >= 4 {
                max_set = max_set.max(word(i + 3) + 1);
            }
        }

        i += length;
    }

    reflection.descriptor_set_count = max_set;
    Some(reflection)
}

/// Builds a `"SHDR"` archive file from a raw SPIR-V binary: the inline data
/// is the serialized reflection, the sole `"SPIR"` sub-file is the
/// variable-to-fixed-encoded binary, deflated.
pub struct ShaderBuildJob {
    name: String,
    spirv: Vec<u8>,
    completion: JobCompletion,
    output: Mutex<Option<BuiltFile>>,
    result: AtomicBuildResult,
}

impl ShaderBuildJob {
    /// Constructs the job and immediately dispatches its processing work.
    #[must_use]
    pub fn new(scheduler: &JobScheduler, name: String, spirv: Vec<u8>) -> std::sync::Arc<Self> {
        let job = std::sync::Arc::new(Self {
            name,
            spirv,
            completion: JobCompletion::new(),
            output: Mutex::new(None),
            result: AtomicBuildResult::new(),
        });

        let dispatched = std::sync::Arc::clone(&job);
        scheduler.dispatch(
            simple(move || {
                if let Err(err) = dispatched.process() {
                    dispatched.result.fail_if_success(err.into());
                }
                dispatched.completion.mark_done();
            }),
            (),
        );
        job
    }

    fn process(&self) -> Result<()> {
        let reflection = reflect(&self.spirv).ok_or_else(|| crate::error::Error::InvalidInput("SPIR-V binary too short to reflect".into()))?;
        let encoded = spirv_encode(&self.spirv);
        let compressed = deflate_encode(&encoded)?;

        *self.output.lock().expect("shader build job output poisoned") = Some(BuiltFile {
            type_tag: FourCC::from_str("SHDR"),
            name: self.name.clone(),
            inline_data: reflection.serialize(),
            sub_files: vec![BuiltSubFile {
                identifier: FourCC::from_str("SPIR"),
                compression: Compression::Deflate,
                raw_size: encoded.len() as u64,
                compressed_data: compressed,
            }],
        });
        Ok(())
    }
}

impl BuildJob for ShaderBuildJob {
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
        (BuildResult::Success, self.output.lock().expect("shader build job output poisoned").clone())
    }

    fn abort(&self) {
        self.result.fail_if_success(BuildResult::Aborted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_spirv() -> Vec<u8> {
        let mut words: Vec<u32> = vec![0x0723_0203, 0x0001_0000, 0, 10, 0];
        words.push((4 << 16) | OP_ENTRY_POINT);
        words.push(0);
        words.push(1);
        words.push(2);
        words.push((5 << 16) | OP_DECORATE);
        words.push(3);
        words.push(DECORATION_DESCRIPTOR_SET);
        words.push(0);
        words.push(1);
        let mut bytes = Vec::with_capacity(words.len() * 4);
        for w in words {
            bytes.extend_from_slice(&w.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn reflect_counts_entry_points_and_descriptor_sets() {
        let reflection = reflect(&sample_spirv()).unwrap();
        assert_eq!(reflection.entry_point_count, 1);
        assert_eq!(reflection.descriptor_set_count, 1);
    }

    #[test]
    fn build_produces_a_deflate_compressed_spir_sub_file() {
        let scheduler = JobScheduler::new(2);
        let job = ShaderBuildJob::new(&scheduler, "basic".into(), sample_spirv());

        let (status, file) = job.file_info();
        assert_eq!(status, BuildResult::Success);
        let file = file.unwrap();
        assert_eq!(file.type_tag, FourCC::from_str("SHDR"));
        assert_eq!(file.sub_files[0].identifier, FourCC::from_str("SPIR"));
        assert_eq!(file.sub_files[0].compression, Compression::Deflate);
    }
}
