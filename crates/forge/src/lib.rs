//! # forge
//!
//! A backend-agnostic graphics runtime and offline asset pipeline. The library
//! provides a job scheduler, a stream/codec toolbox, a scratch GPU allocator, a
//! pipeline cache with an asynchronous compiler, a GLTF-to-meshlet geometry
//! converter, an archive builder, and the asset residency lifecycle that ties a
//! running engine to the packaged assets these tools produce.
//!
//! ## Layout
//!
//! - [`jobs`] — work-stealing job scheduler with dependency graphs.
//! - [`io`] — buffered streams, bitstream, Huffman, LZSS, (G)Deflate and SPIR-V codecs.
//! - [`foundation::scratch`] — bucket + linear scratch allocator for GPU staging.
//! - [`gfx`] — descriptor/pipeline-layout interning and the pipeline cache.
//! - [`geometry`] — meshlet builder, geometry container format, GLTF import.
//! - [`archive`] — parallel build-job graph and the compressed container writer.
//! - [`assets`] — asset residency state machine.

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]
#![forbid(unsafe_code)]

pub mod foundation;
pub mod jobs;
pub mod io;
pub mod gfx;
pub mod geometry;
pub mod archive;
pub mod assets;
pub mod config;
pub mod error;

pub use error::{Error, Result};

/// Common imports for engine users.
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::foundation::math::{Vec3, Quat};
    pub use crate::jobs::{JobScheduler, JobHandle};
    pub use crate::archive::{ArchiveBuilder, BuildResult};
}
