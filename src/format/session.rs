use super::{Demuxer, FormatParameters, InputFormat};
use crate::av::{IndexEntry, Packet, SeekFlags, Stream};
use crate::error::{DemuxError, Result};
use crate::io::{BufferedCursor, Whence};
use log::{debug, info, warn};
use std::fmt;
use std::sync::Arc;

/// Maximum number of streams a session may expose.
pub const MAX_STREAMS: usize = 20;

/// Lifecycle of a demux session.
///
/// `Unopened`, `Probed` and `HeaderRead` are passed through while opening; a
/// [`DemuxSession`] handed to the caller is `Streaming` until closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing opened yet
    Unopened,
    /// Source open and format chosen
    Probed,
    /// Header parsed, streams known
    HeaderRead,
    /// Handing out packets
    Streaming,
    /// Torn down
    Closed,
}

/// State the format callbacks operate on: the cursor and the stream list.
pub struct DemuxContext {
    pb: BufferedCursor,
    streams: Vec<Stream>,
    filename: String,
}

impl DemuxContext {
    fn new(pb: BufferedCursor, filename: &str) -> Self {
        Self {
            pb,
            streams: Vec::new(),
            filename: filename.to_string(),
        }
    }

    /// Buffered cursor over the container bytes.
    pub fn io(&mut self) -> &mut BufferedCursor {
        &mut self.pb
    }

    /// Registers a new stream.
    ///
    /// Fails with [`DemuxError::TooManyStreams`] once [`MAX_STREAMS`] exist.
    pub fn new_stream(&mut self, id: i32) -> Result<&mut Stream> {
        if self.streams.len() >= MAX_STREAMS {
            return Err(DemuxError::TooManyStreams(MAX_STREAMS));
        }
        let index = self.streams.len();
        debug!("{}: new stream #{} (id {})", self.filename, index, id);
        self.streams.push(Stream::new(index, id));
        Ok(&mut self.streams[index])
    }

    /// Streams created so far.
    pub fn streams(&self) -> &[Stream] {
        &self.streams
    }

    /// Stream by index.
    pub fn stream(&self, index: usize) -> Option<&Stream> {
        self.streams.get(index)
    }

    /// Mutable stream by index, e.g. to add index entries.
    pub fn stream_mut(&mut self, index: usize) -> Option<&mut Stream> {
        self.streams.get_mut(index)
    }

    /// Number of streams.
    pub fn nb_streams(&self) -> usize {
        self.streams.len()
    }

    /// Name the input was opened with.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    fn into_cursor(self) -> BufferedCursor {
        self.pb
    }
}

impl fmt::Debug for DemuxContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DemuxContext")
            .field("filename", &self.filename)
            .field("streams", &self.streams.len())
            .field("offset", &self.pb.tell())
            .finish()
    }
}

/// Failed [`DemuxSession::open_input_stream`].
///
/// The cursor was never owned by a session, so it goes back to the caller,
/// who is responsible for closing it.
#[derive(Debug)]
pub struct OpenStreamError {
    /// Why the header was rejected
    pub error: DemuxError,
    /// The still open cursor
    pub cursor: BufferedCursor,
}

impl fmt::Display for OpenStreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to open input stream: {}", self.error)
    }
}

impl std::error::Error for OpenStreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Where a [`DemuxSession::seek_frame`] landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOutcome {
    /// Cursor positioned at an index entry
    Indexed(IndexEntry),
    /// No usable index entry; cursor rewound to the first byte after the
    /// header for a linear re-read
    Rewound(u64),
}

/// One opened, format-identified container.
pub struct DemuxSession {
    format: Arc<dyn InputFormat>,
    demuxer: Option<Box<dyn Demuxer>>,
    ctx: DemuxContext,
    data_offset: u64,
    state: SessionState,
}

impl DemuxSession {
    /// Runs `format`'s header reader over `cursor`.
    ///
    /// On failure the private state and any streams created so far are
    /// dropped and the cursor is handed back inside [`OpenStreamError`].
    pub fn open_input_stream(
        cursor: BufferedCursor,
        filename: &str,
        format: Arc<dyn InputFormat>,
        params: Option<&FormatParameters>,
    ) -> std::result::Result<Self, OpenStreamError> {
        let default_params = FormatParameters::default();
        let params = params.unwrap_or(&default_params);

        let mut demuxer = format.new_demuxer();
        let mut ctx = DemuxContext::new(cursor, filename);

        if let Err(error) = demuxer.read_header(&mut ctx, params) {
            warn!("{}: {} header rejected: {}", filename, format.name(), error);
            drop(demuxer);
            return Err(OpenStreamError {
                error,
                cursor: ctx.into_cursor(),
            });
        }
        debug!("{}: state {:?}", filename, SessionState::HeaderRead);

        let data_offset = ctx.pb.tell();
        info!(
            "{}: opened as {} with {} stream(s), data at {}",
            filename,
            format.name(),
            ctx.nb_streams(),
            data_offset
        );

        Ok(Self {
            format,
            demuxer: Some(demuxer),
            ctx,
            data_offset,
            state: SessionState::Streaming,
        })
    }

    /// Reads the next packet from the format.
    pub fn read_packet(&mut self) -> Result<Packet> {
        match self.demuxer.as_mut() {
            Some(demuxer) => demuxer.read_packet(&mut self.ctx),
            None => Err(DemuxError::InvalidArgument("session is closed".into())),
        }
    }

    /// Positions the cursor for reading `timestamp` of `stream_index`.
    ///
    /// Uses the stream's seek index when it has a suitable entry. Otherwise
    /// rewinds to the start of the data so packets can be re-read linearly.
    pub fn seek_frame(
        &mut self,
        stream_index: usize,
        timestamp: i64,
        flags: SeekFlags,
    ) -> Result<SeekOutcome> {
        if self.state != SessionState::Streaming {
            return Err(DemuxError::InvalidArgument("session is closed".into()));
        }
        let stream = self.ctx.stream(stream_index).ok_or_else(|| {
            DemuxError::InvalidArgument(format!("no stream #{}", stream_index))
        })?;

        let entry = stream
            .search_timestamp(timestamp, flags)
            .and_then(|i| stream.index_entries().get(i).copied());

        match entry {
            Some(entry) => {
                debug!(
                    "stream #{}: seek to {} via index entry at {}",
                    stream_index, timestamp, entry.pos
                );
                self.ctx.pb.seek(entry.pos as i64, Whence::Set)?;
                Ok(SeekOutcome::Indexed(entry))
            }
            None => {
                debug!(
                    "stream #{}: no index entry for {}, rewinding to {}",
                    stream_index, timestamp, self.data_offset
                );
                self.ctx.pb.seek(self.data_offset as i64, Whence::Set)?;
                Ok(SeekOutcome::Rewound(self.data_offset))
            }
        }
    }

    /// Closes the session: format close callback, streams, cursor (and its
    /// protocol handle), then the format's private state, in that order.
    pub fn close(mut self) -> Result<()> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.state = SessionState::Closed;

        let mut demuxer = self.demuxer.take();
        let close_result = match demuxer.as_mut() {
            Some(demuxer) => demuxer.read_close(&mut self.ctx),
            None => Ok(()),
        };
        if let Err(e) = &close_result {
            warn!("{}: {} close callback failed: {}", self.ctx.filename, self.format.name(), e);
        }

        self.ctx.streams.clear();
        let io_result = self.ctx.pb.close();
        drop(demuxer);
        debug!("{}: state {:?}", self.ctx.filename, SessionState::Closed);

        close_result.and(io_result)
    }

    /// Format the session was opened with.
    pub fn format(&self) -> &Arc<dyn InputFormat> {
        &self.format
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Streams created so far.
    pub fn streams(&self) -> &[Stream] {
        self.ctx.streams()
    }

    /// Mutable stream by index, e.g. to add index entries.
    pub fn stream_mut(&mut self, index: usize) -> Option<&mut Stream> {
        self.ctx.stream_mut(index)
    }

    /// Offset of the first byte after the container header.
    pub fn data_offset(&self) -> u64 {
        self.data_offset
    }

    /// Direct access to the format state shared with the callbacks.
    pub fn context(&mut self) -> &mut DemuxContext {
        &mut self.ctx
    }

    /// Name the input was opened with.
    pub fn filename(&self) -> &str {
        self.ctx.filename()
    }
}

impl Drop for DemuxSession {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            warn!("{}: error while closing session: {}", self.ctx.filename, e);
        }
    }
}

impl fmt::Debug for DemuxSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DemuxSession")
            .field("format", &self.format.name())
            .field("state", &self.state)
            .field("data_offset", &self.data_offset)
            .field("ctx", &self.ctx)
            .finish()
    }
}
