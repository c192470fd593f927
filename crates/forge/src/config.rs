//! Configuration system.
//!
//! Engine-level settings (worker thread counts, scratch buffer geometry, archive
//! compression defaults) are plain `serde` structs loadable from TOML or RON,
//! the same way `rust_engine`'s original config layer worked.

pub use serde::{Deserialize, Serialize};

/// Configuration trait shared by every loadable settings struct.
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from a file, inferring the format from its extension.
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

        if path.ends_with(".toml") {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to a file, inferring the format from its extension.
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, Default::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// Underlying file IO failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The file's contents did not parse as the expected format.
    #[error("parse error: {0}")]
    Parse(String),
    /// The struct could not be serialized into the target format.
    #[error("serialize error: {0}")]
    Serialize(String),
    /// The path's extension is not one of `.toml`/`.ron`.
    #[error("unsupported config format: {0}")]
    UnsupportedFormat(String),
}

/// Settings governing the job scheduler and pipeline compiler worker pools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of job scheduler worker threads. `0` means hardware concurrency.
    pub job_workers: usize,
    /// Number of pipeline compiler worker threads. `0` means hardware concurrency.
    pub compiler_workers: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            job_workers: 0,
            compiler_workers: 0,
        }
    }
}

impl Config for WorkerConfig {}

impl WorkerConfig {
    /// Resolve `0` to the actual hardware concurrency.
    pub fn resolved_job_workers(&self) -> usize {
        resolve_worker_count(self.job_workers)
    }

    /// Resolve `0` to the actual hardware concurrency.
    pub fn resolved_compiler_workers(&self) -> usize {
        resolve_worker_count(self.compiler_workers)
    }
}

fn resolve_worker_count(configured: usize) -> usize {
    if configured != 0 {
        return configured;
    }
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
}

/// Settings governing scratch buffer geometry, per `spec.md` §4.3 defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScratchConfig {
    /// Size of one scratch page, in bytes.
    pub page_size: u64,
    /// Number of pages per per-buffer allocator.
    pub page_count: u32,
}

impl Default for ScratchConfig {
    fn default() -> Self {
        Self {
            page_size: 1 << 20,
            page_count: 64,
        }
    }
}

impl Config for ScratchConfig {}

/// Settings governing archive build defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Allow BC7 texture encoding when the caller didn't forbid it.
    pub allow_bc7: bool,
    /// Generate mipmaps by default for texture build jobs.
    pub generate_mips: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            allow_bc7: true,
            generate_mips: true,
        }
    }
}

impl Config for ArchiveConfig {}
