#![doc(html_root_url = "https://docs.rs/demuxio/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

//! # demuxio - Buffered I/O and Demuxing Core
//!
//! `demuxio` is the input side of a media-file reader. It turns a filename
//! into a stream of container packets:
//!
//! 1. a [`Protocol`](io::Protocol) opens the byte source,
//! 2. a [`BufferedCursor`](io::BufferedCursor) puts a read-ahead window in
//!    front of it,
//! 3. format probing reads a growing sample and scores every registered
//!    [`InputFormat`](format::InputFormat),
//! 4. a [`DemuxSession`](format::DemuxSession) runs the chosen format's header
//!    reader once and then hands out packets, seeking through each stream's
//!    [`SeekIndex`](av::SeekIndex).
//!
//! Concrete container parsers live outside this crate and plug in through the
//! [`InputFormat`](format::InputFormat) and [`Demuxer`](format::Demuxer) traits.
//! Everything is synchronous and single-threaded.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use demuxio::Context;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut ctx = Context::with_defaults();
//! // ctx.register_input_format(MyAviFormat);
//!
//! let mut session = ctx.open_input_file("clip.avi", None, 0, None)?;
//! while let Ok(packet) = session.read_packet() {
//!     println!("stream {} pts {:?} ({} bytes)", packet.stream_index, packet.pts, packet.size());
//! }
//! session.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - `io`: protocols, protocol handles and the buffered cursor
//! - `format`: the format contract, probing and the demux session
//! - `av`: packets, streams, codec parameters and the seek index
//! - `context`: the registry owner that opens files
//! - `config`: buffering and probing tunables
//! - `error`: the crate error type

/// Packets, streams and seek index
pub mod av;

/// Protocol and format registry
pub mod context;

/// Error types and utilities
pub mod error;

/// Container format contract, probing and demux sessions
pub mod format;

/// Byte sources and buffered cursor
pub mod io;

/// Configuration module
pub mod config;

pub use context::Context;
pub use error::{DemuxError, Result};
