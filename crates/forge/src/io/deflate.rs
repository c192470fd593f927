//! Deflate and GDeflate framing over [`flate2`] (§4.2).
//!
//! `gdeflate_encode` independently compresses 64 KiB input pages so a GPU
//! decompressor could process them in parallel; the page table records
//! each page's byte offset and size, and every page is padded to a dword
//! boundary. This crate's [`gdeflate_decode`] runs the page decompression
//! on the CPU, but the container layout matches what a GPU reader expects.

use std::io::{Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::error::{Error, Result};

const GDEFLATE_PAGE_SIZE: usize = 1 << 16;
const HEADER_SIZE: usize = 16;
const PAGE_ENTRY_SIZE: usize = 8;

/// Compresses `input` with raw Deflate.
pub fn deflate_encode(input: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(input)?;
    Ok(encoder.finish()?)
}

/// Decompresses a raw Deflate stream produced by [`deflate_encode`].
pub fn deflate_decode(input: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = DeflateDecoder::new(input);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

fn align_dword(size: usize) -> usize {
    (size + 3) & !3
}

/// Compresses `input` as a page table of independently Deflate-compressed
/// 64 KiB pages, padded to dword alignment.
pub fn gdeflate_encode(input: &[u8]) -> Result<Vec<u8>> {
    let pages: Vec<Vec<u8>> = input
        .chunks(GDEFLATE_PAGE_SIZE)
        .map(deflate_encode)
        .collect::<Result<_>>()?;
    let page_count = pages.len().max(1);

    let mut out = Vec::with_capacity(HEADER_SIZE + page_count * PAGE_ENTRY_SIZE);
    out.extend_from_slice(&(page_count as u32).to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&(input.len() as u32).to_le_bytes());

    let mut offset = HEADER_SIZE + page_count * PAGE_ENTRY_SIZE;
    let mut metadata = Vec::with_capacity(page_count * PAGE_ENTRY_SIZE);
    for page in &pages {
        metadata.extend_from_slice(&(offset as u32).to_le_bytes());
        metadata.extend_from_slice(&(page.len() as u32).to_le_bytes());
        offset += align_dword(page.len());
    }
    out.extend_from_slice(&metadata);

    for page in &pages {
        out.extend_from_slice(page);
        out.resize(out.len() + (align_dword(page.len()) - page.len()), 0);
    }

    Ok(out)
}

/// Decompresses a stream produced by [`gdeflate_encode`].
pub fn gdeflate_decode(input: &[u8]) -> Result<Vec<u8>> {
    if input.len() < HEADER_SIZE {
        return Err(Error::InvalidInput("gdeflate stream shorter than header".into()));
    }

    let page_count = u32::from_le_bytes(input[0..4].try_into().unwrap()) as usize;
    let uncompressed_size = u32::from_le_bytes(input[12..16].try_into().unwrap()) as usize;

    let metadata_start = HEADER_SIZE;
    let metadata_end = metadata_start + page_count * PAGE_ENTRY_SIZE;
    let metadata = input
        .get(metadata_start..metadata_end)
        .ok_or_else(|| Error::InvalidInput("gdeflate page table truncated".into()))?;

    let mut out = Vec::with_capacity(uncompressed_size);
    for entry in metadata.chunks(PAGE_ENTRY_SIZE) {
        let page_offset = u32::from_le_bytes(entry[0..4].try_into().unwrap()) as usize;
        let page_size = u32::from_le_bytes(entry[4..8].try_into().unwrap()) as usize;
        let page = input
            .get(page_offset..page_offset + page_size)
            .ok_or_else(|| Error::InvalidInput("gdeflate page out of bounds".into()))?;
        out.extend_from_slice(&deflate_decode(page)?);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deflate_round_trips() {
        let data = b"hello hello hello hello world world world".repeat(100);
        let encoded = deflate_encode(&data).unwrap();
        assert_eq!(deflate_decode(&encoded).unwrap(), data);
    }

    #[test]
    fn gdeflate_round_trips_multiple_pages() {
        let data: Vec<u8> = (0..(GDEFLATE_PAGE_SIZE * 3 + 123)).map(|i| (i % 97) as u8).collect();
        let encoded = gdeflate_encode(&data).unwrap();
        assert_eq!(gdeflate_decode(&encoded).unwrap(), data);
    }

    #[test]
    fn gdeflate_round_trips_empty_input() {
        let encoded = gdeflate_encode(&[]).unwrap();
        assert_eq!(gdeflate_decode(&encoded).unwrap(), Vec::<u8>::new());
    }
}
