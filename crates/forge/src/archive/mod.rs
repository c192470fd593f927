//! Archive builder: packs compiled assets into a single container file
//! (§4.6, §6).
//!
//! Each [`BuildJob`] kind (basic, shader, geometry, texture, merge) owns its
//! own compression and dispatches its work against a [`crate::jobs::JobScheduler`]
//! at construction time. [`ArchiveBuilder`] only sequences waiting on them
//! and serializes the result via [`container::build_archive`].

mod basic;
mod builder;
mod container;
mod format;
mod geometry;
mod merge;
mod result;
mod shader;
mod texture;

pub use basic::BasicBuildJob;
pub use builder::ArchiveBuilder;
pub use container::{Archive, FileEntry, SubFileEntry};
pub use format::{BuiltFile, BuiltSubFile, Compression, FileDesc, FourCC, SubFileDesc};
pub use geometry::GeometryBuildJob;
pub use merge::MergeBuildJob;
pub use result::{BuildJob, BuildProgress, BuildResult};
pub use shader::{reflect, ShaderBuildJob, ShaderReflection};
pub use texture::{generate_mip, select_format, TextureBuildJob, TextureFormat};
