//! # Byte I/O Layer
//!
//! Pluggable byte sources and the buffered cursor layered over them.
//!
//! - [`Protocol`] / [`ProtocolContext`]: a named source and one opened
//!   resource of it
//! - [`ProtocolRegistry`]: ordered lookup of protocols by filename scheme
//! - [`ProtocolHandle`]: an opened resource bound to its protocol
//! - [`BufferedCursor`]: read-ahead window with little-endian readers,
//!   seek/tell and bulk reads
//! - [`FileProtocol`]: local files
//!
//! ```rust
//! use demuxio::io::{BufferedCursor, Whence};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut cursor = BufferedCursor::from_bytes(vec![0x34, 0x12, 0x78, 0x56, 0x34, 0x12]);
//! assert_eq!(cursor.read_le16(), 0x1234);
//! assert_eq!(cursor.read_le32(), 0x12345678);
//! assert_eq!(cursor.seek(0, Whence::Set)?, 0);
//! assert_eq!(cursor.tell(), 0);
//! # Ok(())
//! # }
//! ```

/// Buffered cursor over a protocol handle or an in-memory block
pub mod cursor;

/// Local file protocol
pub mod file;

/// Protocol traits, registry and handles
pub mod protocol;

pub use cursor::BufferedCursor;
pub use file::FileProtocol;
pub use protocol::{OpenMode, Protocol, ProtocolContext, ProtocolHandle, ProtocolRegistry, Whence};
