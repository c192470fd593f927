//! LZSS followed by per-chunk Huffman coding (§4.2).
//!
//! The input is LZSS-encoded first, then split into 64 KiB chunks. Each
//! chunk independently decides whether Huffman coding beats storing the
//! chunk as raw bytes: a 1-bit header per chunk records the choice, so
//! high-entropy chunks (where the Huffman table would cost more than it
//! saves) fall back to a literal byte run.

use super::bitstream::{BitstreamReader, BitstreamWriter};
use super::huffman::{HuffmanCounter, HuffmanDecoder, HuffmanTrie};
use super::lzss::{lzss_decode, lzss_encode};

const CHUNK_SIZE: usize = 1 << 16;

/// Encodes `data` with LZSS then chunked Huffman coding.
pub fn huff_lzss_encode(data: &[u8]) -> Vec<u8> {
    let lzss_data = lzss_encode(data, 0);

    let mut writer = BitstreamWriter::new();
    writer.write(lzss_data.len() as u64, 32);

    for chunk in lzss_data.chunks(CHUNK_SIZE) {
        let mut counter = HuffmanCounter::new();
        counter.add(chunk);

        let trie = HuffmanTrie::new(&counter);
        let encoder = trie.create_encoder();
        let decoder = trie.create_decoder();

        let huffman_bits = decoder.table_bit_length() + encoder.encoded_bit_length(&counter);

        if huffman_bits < (chunk.len() as u64) * 8 {
            writer.write(1, 1);
            decoder.write(&mut writer);
            encoder.encode(&mut writer, chunk);
        } else {
            writer.write(0, 1);
            for &byte in chunk {
                writer.write(byte as u64, 8);
            }
        }
    }

    writer.into_bytes()
}

/// Decodes a stream produced by [`huff_lzss_encode`].
pub fn huff_lzss_decode(data: &[u8]) -> Vec<u8> {
    let mut reader = BitstreamReader::new(data);
    let lzss_size = reader.read(32) as usize;

    let mut lzss_data = Vec::with_capacity(lzss_size);
    let mut remaining = lzss_size;

    while remaining > 0 {
        let chunk_size = remaining.min(CHUNK_SIZE);

        if reader.read(1) != 0 {
            let decoder = HuffmanDecoder::read(&mut reader);
            lzss_data.extend(decoder.decode(&mut reader, chunk_size));
        } else {
            for _ in 0..chunk_size {
                lzss_data.push(reader.read(8) as u8);
            }
        }

        remaining -= chunk_size;
    }

    lzss_decode(&lzss_data).expect("huff-lzss stream produced an invalid lzss payload")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_mixed_content() {
        let mut data = Vec::new();
        data.extend_from_slice(&b"ABCABCABCABCABCABCABC".repeat(100));
        data.extend_from_slice(&[0x00, 0xFF, 0x13, 0x37, 0xDE, 0xAD, 0xBE, 0xEF].repeat(50));

        let encoded = huff_lzss_encode(&data);
        assert_eq!(huff_lzss_decode(&encoded), data);
    }

    #[test]
    fn round_trips_chunk_boundary_sizes() {
        for &len in &[0usize, 1, CHUNK_SIZE - 1, CHUNK_SIZE, CHUNK_SIZE + 1, CHUNK_SIZE * 2 + 7] {
            let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let encoded = huff_lzss_encode(&data);
            assert_eq!(huff_lzss_decode(&encoded), data);
        }
    }
}
