//! Archive metadata codec and block-stream framing.
//!
//! Layout, all integers little endian:
//!
//! ```text
//! header  = "PARZv1.1" i32:block_size SEP i32:crc SEP
//! object  = SEP i32:path_len utf16le:path i64:original_size SEP i32:crc SEP
//!           i64:block_count (i32:len bytes)* i32:last_block_size
//! tail    = SEP i32:count (i64:header_offset i64:compressed_size)* i64:tail_start SEP i32:crc SEP
//! ```

pub mod blocks;
pub mod consts;
pub mod headers;
pub mod model;
pub mod reader;
pub mod tail;
pub mod writer;

pub use blocks::{BlockStreamReader, BlockStreamWriter};
pub use consts::*;
pub use headers::{ArchiveHeader, ObjectHeader};
pub use model::{ArchiveMetadata, ObjectInArchive};
pub use reader::{ArchiveReader, browse};
pub use tail::{ArchiveTail, TailEntry};
pub use writer::{ArchiveWriter, ObjectPlacement, WriteState};
