//! RFC 7541 HPACK: header compression for HTTP/2.
//!
//! A connection owns one [`block::Encoder`] (for headers it sends) and one
//! [`block::Decoder`] (for headers it receives); the two compression
//! contexts are never shared, matching RFC 7541 §2.2.

mod block;
mod huffman;
mod integer;
mod table;

pub use block::{Decoder, Encoder};
pub use table::STATIC_TABLE;

pub const DEFAULT_DYNAMIC_TABLE_SIZE: usize = 4096;
