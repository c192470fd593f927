//! Archive container binary format (§6).
//!
//! ```text
//! Header { magic[6]="ASFILE", version:u16, fileCount:u32,
//!          fileOffset:u64, compressedMetadataSize:u32, rawMetadataSize:u32 }
//! CompressedMetadata  // deflate of:
//!   FileMetadata[fileCount] { type:FourCC, nameLength:u32, subFileCount:u32, inlineDataSize:u64 }
//!   Names               // concatenated, each NUL-terminated
//!   SubFileMetadata[Σ subFileCount] { identifier:FourCC, compression:u8, _:u24, offset:u64,
//!                                     compressedSize:u64, rawSize:u64 }
//!   InlineData          // concatenated in file order
//! SubFileData           // concatenated in sub-file order, no padding
//! ```
//! Sub-file `offset` is relative to the start of `SubFileData`, i.e. to
//! `header.fileOffset`.

use crate::error::{Error, Result};
use crate::io::deflate::{deflate_decode, deflate_encode};

use super::format::{BuiltFile, BuiltSubFile, Compression, FourCC};

const MAGIC: &[u8; 6] = b"ASFILE";
const VERSION: u16 = 0;
const HEADER_SIZE: usize = 6 + 2 + 4 + 8 + 4 + 4;

/// Serializes `files` into a complete archive container.
pub fn build_archive(files: &[BuiltFile]) -> Result<Vec<u8>> {
    let mut raw_metadata = Vec::new();

    for file in files {
        raw_metadata.extend_from_slice(&file.type_tag.0);
        raw_metadata.extend_from_slice(&(u32::try_from(file.name.len()).unwrap_or(u32::MAX)).to_le_bytes());
        raw_metadata.extend_from_slice(&(u32::try_from(file.sub_files.len()).unwrap_or(u32::MAX)).to_le_bytes());
        raw_metadata.extend_from_slice(&(file.inline_data.len() as u64).to_le_bytes());
    }

    for file in files {
        raw_metadata.extend_from_slice(file.name.as_bytes());
        raw_metadata.push(0);
    }

    let mut sub_file_offset: u64 = 0;
    for file in files {
        for sub_file in &file.sub_files {
            raw_metadata.extend_from_slice(&sub_file.identifier.0);
            raw_metadata.push(sub_file.compression.tag());
            raw_metadata.extend_from_slice(&[0u8; 3]);
            raw_metadata.extend_from_slice(&sub_file_offset.to_le_bytes());
            raw_metadata.extend_from_slice(&(sub_file.compressed_data.len() as u64).to_le_bytes());
            raw_metadata.extend_from_slice(&sub_file.raw_size.to_le_bytes());
            sub_file_offset += sub_file.compressed_data.len() as u64;
        }
    }

    for file in files {
        raw_metadata.extend_from_slice(&file.inline_data);
    }

    let compressed_metadata = deflate_encode(&raw_metadata)?;

    let mut out = Vec::with_capacity(HEADER_SIZE + compressed_metadata.len() + sub_file_offset as usize);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&(files.len() as u32).to_le_bytes());
    let file_offset = (HEADER_SIZE + compressed_metadata.len()) as u64;
    out.extend_from_slice(&file_offset.to_le_bytes());
    out.extend_from_slice(&(compressed_metadata.len() as u32).to_le_bytes());
    out.extend_from_slice(&(raw_metadata.len() as u32).to_le_bytes());
    out.extend_from_slice(&compressed_metadata);

    for file in files {
        for sub_file in &file.sub_files {
            out.extend_from_slice(&sub_file.compressed_data);
        }
    }

    Ok(out)
}

/// One sub-file's location and metadata as read back from a container.
#[derive(Debug, Clone, Copy)]
pub struct SubFileEntry {
    /// Sub-file identifier.
    pub identifier: FourCC,
    /// Compression applied to the stored bytes.
    pub compression: Compression,
    /// Byte offset of this sub-file's data, relative to the archive's `SubFileData` region.
    pub offset: u64,
    /// Size of the compressed bytes.
    pub compressed_size: u64,
    /// Size once decompressed.
    pub raw_size: u64,
}

/// One file's metadata as read back from a container.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// File type tag.
    pub type_tag: FourCC,
    /// File name.
    pub name: String,
    /// Inline data stored with this file.
    pub inline_data: Vec<u8>,
    /// This file's sub-files.
    pub sub_files: Vec<SubFileEntry>,
}

/// A parsed archive: its file table plus the raw, still-compressed sub-file region.
pub struct Archive {
    files: Vec<FileEntry>,
    sub_file_data: Vec<u8>,
}

impl Archive {
    /// Parses a complete archive container.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = Reader { data, cursor: 0 };

        if reader.data.len() < HEADER_SIZE {
            return Err(Error::InvalidInput("archive shorter than its header".into()));
        }

        let magic = reader.take(6)?;
        if magic != MAGIC {
            return Err(Error::InvalidInput("archive magic mismatch".into()));
        }

        let _version = reader.u16()?;
        let file_count = reader.u32()? as usize;
        let file_offset = reader.u64()?;
        let compressed_metadata_size = reader.u32()? as usize;
        let raw_metadata_size = reader.u32()? as usize;

        let compressed_metadata = reader.take(compressed_metadata_size)?;
        let raw_metadata = deflate_decode(compressed_metadata)?;
        if raw_metadata.len() != raw_metadata_size {
            return Err(Error::InvalidInput("archive metadata size mismatch".into()));
        }

        let mut meta = Reader { data: &raw_metadata, cursor: 0 };

        struct RawFile {
            type_tag: FourCC,
            name_length: usize,
            sub_file_count: usize,
            inline_data_size: usize,
        }

        let mut raw_files = Vec::with_capacity(file_count);
        for _ in 0..file_count {
            let type_tag = FourCC(meta.take(4)?.try_into().unwrap());
            let name_length = meta.u32()? as usize;
            let sub_file_count = meta.u32()? as usize;
            let inline_data_size = meta.u64()? as usize;
            raw_files.push(RawFile { type_tag, name_length, sub_file_count, inline_data_size });
        }

        let mut names = Vec::with_capacity(file_count);
        for raw in &raw_files {
            let bytes = meta.take(raw.name_length)?;
            let terminator = meta.u8()?;
            if terminator != 0 {
                return Err(Error::InvalidInput("archive file name missing NUL terminator".into()));
            }
            names.push(String::from_utf8(bytes.to_vec()).map_err(|_| Error::InvalidInput("archive file name is not valid UTF-8".into()))?);
        }

        let mut sub_files_per_file = Vec::with_capacity(file_count);
        for raw in &raw_files {
            let mut sub_files = Vec::with_capacity(raw.sub_file_count);
            for _ in 0..raw.sub_file_count {
                let identifier = FourCC(meta.take(4)?.try_into().unwrap());
                let compression = Compression::from_tag(meta.u8()?)?;
                meta.take(3)?;
                let offset = meta.u64()?;
                let compressed_size = meta.u64()?;
                let raw_size = meta.u64()?;
                sub_files.push(SubFileEntry { identifier, compression, offset, compressed_size, raw_size });
            }
            sub_files_per_file.push(sub_files);
        }

        let mut files = Vec::with_capacity(file_count);
        for ((raw, name), sub_files) in raw_files.into_iter().zip(names).zip(sub_files_per_file) {
            let inline_data = meta.take(raw.inline_data_size)?.to_vec();
            files.push(FileEntry { type_tag: raw.type_tag, name, inline_data, sub_files });
        }

        let file_offset = usize::try_from(file_offset).map_err(|_| Error::InvalidInput("archive file offset overflows usize".into()))?;
        let sub_file_data = data.get(file_offset..).ok_or_else(|| Error::InvalidInput("archive file offset past end of data".into()))?.to_vec();

        Ok(Self { files, sub_file_data })
    }

    /// This archive's file table.
    #[must_use]
    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }

    /// The raw (still-compressed) bytes of one sub-file.
    #[must_use]
    pub fn sub_file_bytes(&self, entry: &SubFileEntry) -> Option<&[u8]> {
        let start = usize::try_from(entry.offset).ok()?;
        let end = start + usize::try_from(entry.compressed_size).ok()?;
        self.sub_file_data.get(start..end)
    }

    /// Decompresses one sub-file's data.
    pub fn read_sub_file(&self, entry: &SubFileEntry) -> Result<Vec<u8>> {
        let bytes = self.sub_file_bytes(entry).ok_or_else(|| Error::InvalidInput("sub-file range out of bounds".into()))?;
        match entry.compression {
            Compression::None => Ok(bytes.to_vec()),
            Compression::Deflate => deflate_decode(bytes),
            Compression::GDeflate => crate::io::deflate::gdeflate_decode(bytes),
        }
    }
}

struct Reader<'a> {
    data: &'a [u8],
    cursor: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.cursor.checked_add(len).ok_or_else(|| Error::InvalidInput("archive field length overflows".into()))?;
        let slice = self.data.get(self.cursor..end).ok_or_else(|| Error::InvalidInput("truncated archive stream".into()))?;
        self.cursor = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_files() -> Vec<BuiltFile> {
        vec![
            BuiltFile {
                type_tag: FourCC::from_str("TEX "),
                name: "tex.ktx".into(),
                inline_data: Vec::new(),
                sub_files: vec![BuiltSubFile {
                    identifier: FourCC::from_str("000"),
                    compression: Compression::GDeflate,
                    raw_size: 256,
                    compressed_data: crate::io::deflate::gdeflate_encode(&vec![0xABu8; 256]).unwrap(),
                }],
            },
            BuiltFile {
                type_tag: FourCC::from_str("SHDR"),
                name: "shd.spv".into(),
                inline_data: Vec::new(),
                sub_files: vec![BuiltSubFile {
                    identifier: FourCC::from_str("SPIR"),
                    compression: Compression::Deflate,
                    raw_size: 128,
                    compressed_data: deflate_encode(&vec![0x5Au8; 128]).unwrap(),
                }],
            },
        ]
    }

    #[test]
    fn archive_round_trip_matches_scenario_six() {
        let bytes = build_archive(&sample_files()).unwrap();
        let archive = Archive::parse(&bytes).unwrap();

        assert_eq!(archive.files().len(), 2);

        let tex = &archive.files()[0];
        assert_eq!(tex.name, "tex.ktx");
        let tex_data = archive.read_sub_file(&tex.sub_files[0]).unwrap();
        assert_eq!(tex_data, vec![0xABu8; 256]);

        let shader = &archive.files()[1];
        assert_eq!(shader.name, "shd.spv");
        let shader_data = archive.read_sub_file(&shader.sub_files[0]).unwrap();
        assert_eq!(shader_data, vec![0x5Au8; 128]);
    }

    #[test]
    fn truncated_archive_is_rejected() {
        let bytes = build_archive(&sample_files()).unwrap();
        assert!(Archive::parse(&bytes[..bytes.len() - 10]).is_err());
    }
}
