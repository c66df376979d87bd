//! # Container Formats
//!
//! The contract concrete demuxers implement, format probing, and the demux
//! session that drives a chosen format.
//!
//! A container format is registered as an [`InputFormat`]: a descriptor
//! with a name, candidate extensions and an optional probe. Opening a session
//! asks the descriptor for a fresh [`Demuxer`], the format's private parsing
//! state, and calls its header reader once before packets are pulled.

use crate::av::{Packet, Rational};
use crate::Result;

/// Format probing
pub mod probe;

/// Demux session lifecycle
pub mod session;

pub use probe::{match_ext, probe_input_format, ProbeData, SCORE_EXTENSION, SCORE_MAX};
pub use session::{DemuxContext, DemuxSession, OpenStreamError, SeekOutcome, SessionState, MAX_STREAMS};

/// Hints a caller may pass to the header reader.
///
/// Formats that cannot learn these values from the stream itself (raw
/// formats, mostly) read them from here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormatParameters {
    /// Time base for streams the format creates
    pub time_base: Option<Rational>,
    /// Audio sample rate
    pub sample_rate: Option<u32>,
    /// Audio channel count
    pub channels: Option<u16>,
    /// Picture width
    pub width: Option<u32>,
    /// Picture height
    pub height: Option<u32>,
}

/// A registered container format.
pub trait InputFormat {
    /// Short unique name.
    fn name(&self) -> &str;

    /// Descriptive name for display.
    fn long_name(&self) -> &str {
        self.name()
    }

    /// Comma-separated candidate file extensions, e.g. `"avi,divx"`.
    fn extensions(&self) -> Option<&str> {
        None
    }

    /// Scores a byte sample, conventionally 0 to [`SCORE_MAX`].
    ///
    /// Returning `None` means the format has no probe, in which case only
    /// its extensions are considered.
    fn probe(&self, _data: &ProbeData) -> Option<u32> {
        None
    }

    /// Creates default private state for a new session.
    fn new_demuxer(&self) -> Box<dyn Demuxer>;
}

/// Per-session parsing state of a container format.
pub trait Demuxer {
    /// Parses the container header once, registering streams through
    /// [`DemuxContext::new_stream`].
    fn read_header(&mut self, ctx: &mut DemuxContext, params: &FormatParameters) -> Result<()>;

    /// Reads exactly one packet, or returns [`DemuxError::EndOfStream`](crate::DemuxError::EndOfStream).
    fn read_packet(&mut self, ctx: &mut DemuxContext) -> Result<Packet>;

    /// Releases format resources. Runs while the cursor is still open.
    fn read_close(&mut self, _ctx: &mut DemuxContext) -> Result<()> {
        Ok(())
    }
}
