//! Audio/video data model shared by the demuxing layer: packets, streams,
//! codec parameters and the per-stream seek index.

mod packet;
pub use packet::*;

/// Per-stream timestamp to byte position table
pub mod index;

mod stream;
pub use stream::*;

pub use index::{IndexEntry, IndexFlags, SeekFlags, SeekIndex, MAX_INDEX_ENTRIES};
