//! Variable-to-fixed SPIR-V token codec (§4.2).
//!
//! SPIR-V words are packed two-at-a-time into a single dword wherever their
//! magnitudes allow, which fits opcode/length tokens (usually well under 20
//! bits) alongside the type ID that tends to follow them. Encoded dwords
//! are grouped into blocks of 16, each preceded by a control dword storing
//! one 2-bit schema per slot:
//!
//! - `0x0`: one 32-bit word
//! - `0x1`: a 20-bit word followed by a 12-bit word
//! - `0x2`: two 16-bit words
//! - `0x3`: a 12-bit word followed by a 20-bit word

const BLOCK_LEN: usize = 16;
const SHIFT_AMOUNTS: u32 = 0x0c10_1420;

fn words(data: &[u8]) -> Vec<u32> {
    data.chunks_exact(4).map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect()
}

/// Encodes a SPIR-V binary (a sequence of little-endian dwords) into the
/// packed block format.
pub fn spirv_encode(data: &[u8]) -> Vec<u8> {
    let dwords = words(data);
    let mut out = Vec::new();
    out.extend_from_slice(&(dwords.len() as u32).to_le_bytes());

    let mut block = [0u32; BLOCK_LEN];
    let mut block_control = 0u32;
    let mut block_size = 0usize;

    let mut i = 0usize;
    let mut a = 0u32;
    let mut needs_read = true;

    while i < dwords.len() {
        if needs_read {
            a = dwords[i];
            needs_read = false;
        }

        let (schema, encode);

        if i + 1 < dwords.len() {
            let b = dwords[i + 1];

            if a < (1 << 16) && b <= (1 << 16) {
                schema = 0x2;
                encode = a | (b << 16);
            } else if a < (1 << 20) && b < (1 << 12) {
                schema = 0x1;
                encode = a | (b << 20);
            } else if a < (1 << 12) && b < (1 << 20) {
                schema = 0x3;
                encode = a | (b << 12);
            } else {
                schema = 0x0;
                encode = a;
                a = b;
            }

            needs_read = schema != 0;
        } else {
            schema = 0x0;
            encode = a;
        }

        block_control |= schema << (block_size * 2);
        block[block_size] = encode;
        block_size += 1;

        i += if schema != 0 { 2 } else { 1 };

        if block_size == BLOCK_LEN || i == dwords.len() {
            out.extend_from_slice(&block_control.to_le_bytes());
            for &word in &block[..block_size] {
                out.extend_from_slice(&word.to_le_bytes());
            }
            block_control = 0;
            block_size = 0;
        }
    }

    out
}

/// Decodes a stream produced by [`spirv_encode`] back into a SPIR-V binary.
pub fn spirv_decode(input: &[u8]) -> Vec<u8> {
    let mut cursor = 0usize;
    let mut read_u32 = |cursor: &mut usize| -> u32 {
        let value = u32::from_le_bytes(input[*cursor..*cursor + 4].try_into().unwrap());
        *cursor += 4;
        value
    };

    let dwords_total = read_u32(&mut cursor);
    let mut dwords_written = 0u32;
    let mut out = Vec::with_capacity(dwords_total as usize * 4);

    while dwords_written < dwords_total {
        let block_control = read_u32(&mut cursor);

        let mut i = 0;
        while i < BLOCK_LEN && dwords_written < dwords_total {
            let dword = read_u32(&mut cursor);

            let schema = (block_control >> (i * 2)) & 0x3;
            let shift = (SHIFT_AMOUNTS >> (schema * 8)) & 0xff;
            let mask = !(!0u64 << shift);
            let encode = dword as u64;

            out.extend_from_slice(&(encode & mask).to_le_bytes()[..4]);
            dwords_written += 1;

            if schema != 0 {
                out.extend_from_slice(&(encode >> shift).to_le_bytes()[..4]);
                dwords_written += 1;
            }

            i += 1;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_synthetic_spirv_stream() {
        let words: Vec<u32> = vec![
            0x0723_0203, 5, 1, 2, 0x10, 0x20, 0x30, 100_000, 7, 8, 9, 10, 11,
        ];
        let data: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();

        let encoded = spirv_encode(&data);
        assert_eq!(spirv_decode(&encoded), data);
    }

    #[test]
    fn round_trips_empty_and_odd_sized_blocks() {
        assert_eq!(spirv_decode(&spirv_encode(&[])), Vec::<u8>::new());

        let words: Vec<u32> = (0..37).collect();
        let data: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        assert_eq!(spirv_decode(&spirv_encode(&data)), data);
    }
}
