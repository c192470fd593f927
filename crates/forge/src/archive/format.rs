//! Archive wire-format value types (§6).

use std::fmt;

/// A 4-byte ASCII tag identifying a file type or sub-file kind, e.g. `b"SHDR"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Builds a tag from a 4-byte ASCII literal.
    #[must_use]
    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Builds a tag from a string, space-padding or truncating to 4 bytes.
    #[must_use]
    pub fn from_str(s: &str) -> Self {
        let mut bytes = [b' '; 4];
        for (i, b) in s.as_bytes().iter().take(4).enumerate() {
            bytes[i] = *b;
        }
        Self(bytes)
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// Sub-file compression, matching the on-disk `compression:u8` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Stored verbatim.
    None,
    /// Raw Deflate.
    Deflate,
    /// Paged GDeflate.
    GDeflate,
}

impl Compression {
    pub(super) fn tag(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Deflate => 1,
            Self::GDeflate => 2,
        }
    }

    pub(super) fn from_tag(tag: u8) -> crate::error::Result<Self> {
        match tag {
            0 => Ok(Self::None),
            1 => Ok(Self::Deflate),
            2 => Ok(Self::GDeflate),
            other => Err(crate::error::Error::InvalidInput(format!("unknown sub-file compression tag {other}"))),
        }
    }
}

/// One sub-file's raw payload and desired compression, before a build job
/// compresses it.
pub struct SubFileDesc {
    /// Sub-file identifier.
    pub identifier: FourCC,
    /// How to compress `data` when building the archive.
    pub compression: Compression,
    /// Uncompressed payload.
    pub data: Vec<u8>,
}

/// A fully-formed `FileDesc`, ready to hand to [`super::BasicBuildJob`].
pub struct FileDesc {
    /// File type tag.
    pub type_tag: FourCC,
    /// File name.
    pub name: String,
    /// Optional inline data (a format-specific header or index).
    pub inline_data: Vec<u8>,
    /// This file's sub-files.
    pub sub_files: Vec<SubFileDesc>,
}

/// One sub-file after a build job has compressed it.
#[derive(Debug, Clone)]
pub struct BuiltSubFile {
    /// Sub-file identifier.
    pub identifier: FourCC,
    /// Compression applied to `compressed_data`.
    pub compression: Compression,
    /// Size of the data before compression.
    pub raw_size: u64,
    /// Compressed payload.
    pub compressed_data: Vec<u8>,
}

/// A fully-built archive file, ready to be written into a container.
#[derive(Debug, Clone)]
pub struct BuiltFile {
    /// File type tag.
    pub type_tag: FourCC,
    /// File name.
    pub name: String,
    /// Inline data, stored uncompressed inside the metadata blob.
    pub inline_data: Vec<u8>,
    /// This file's sub-files, already compressed.
    pub sub_files: Vec<BuiltSubFile>,
}
