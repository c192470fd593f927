//! Streams and codecs (§4.2): bit packing, LZSS, Huffman, their composition,
//! Deflate/GDeflate framing, the SPIR-V token codec, and the async I/O
//! request state machine.

pub mod bitstream;
pub mod deflate;
pub mod huff_lzss;
pub mod huffman;
pub mod lzss;
pub mod request;
pub mod spirv;

pub use bitstream::{BitstreamReader, BitstreamWriter};
pub use lzss::{lzss_decode, lzss_encode, LzssError};
pub use request::{IoRequest, IoStatus};
