//! Top-level registry of protocols and input formats.

use crate::config::{self, Config};
use crate::error::{DemuxError, Result};
use crate::format::{
    probe_input_format, DemuxSession, FormatParameters, InputFormat, OpenStreamError, ProbeData,
    SessionState,
};
use crate::io::{BufferedCursor, FileProtocol, OpenMode, Protocol, ProtocolRegistry, Whence};
use log::{debug, info, warn};
use std::fmt;
use std::sync::Arc;

/// Owns the registered protocols and input formats and opens files with
/// them.
///
/// Registration happens once, right after construction; lookups keep
/// registration order.
pub struct Context {
    protocols: ProtocolRegistry,
    formats: Vec<Arc<dyn InputFormat>>,
    config: Config,
}

impl Context {
    /// Empty context using the process-wide configuration.
    pub fn new() -> Self {
        Self::with_config(config::get())
    }

    /// Empty context with an explicit configuration.
    ///
    /// Out-of-range values are corrected the same way as loaded ones.
    pub fn with_config(mut config: Config) -> Self {
        config.sanitize();
        Self {
            protocols: ProtocolRegistry::new(),
            formats: Vec::new(),
            config,
        }
    }

    /// Context with the built-in protocols registered.
    ///
    /// Container formats are supplied by the caller.
    pub fn with_defaults() -> Self {
        let mut ctx = Self::new();
        ctx.register_protocol(FileProtocol);
        ctx
    }

    /// Adds a protocol. Later lookups see it after the earlier ones.
    pub fn register_protocol<P: Protocol + 'static>(&mut self, protocol: P) {
        self.protocols.register(Arc::new(protocol));
    }

    /// Adds an input format to the probe list.
    pub fn register_input_format<F: InputFormat + 'static>(&mut self, format: F) {
        debug!("registering input format {}", format.name());
        self.formats.push(Arc::new(format));
    }

    /// Registered protocols, in registration order.
    pub fn protocols(&self) -> &ProtocolRegistry {
        &self.protocols
    }

    /// Registered input formats, in probe order.
    pub fn input_formats(&self) -> &[Arc<dyn InputFormat>] {
        &self.formats
    }

    /// Configuration snapshot this context opens files with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registered format with the given name.
    pub fn find_input_format(&self, name: &str) -> Option<Arc<dyn InputFormat>> {
        self.formats.iter().find(|f| f.name() == name).cloned()
    }

    /// Best matching format for a probe sample. See [`probe_input_format`].
    pub fn probe_input_format(&self, pd: &ProbeData) -> Option<Arc<dyn InputFormat>> {
        probe_input_format(&self.formats, pd).map(|(format, _)| format)
    }

    /// Opens `filename` for reading with the default window size.
    pub fn open_cursor(&self, filename: &str) -> Result<BufferedCursor> {
        BufferedCursor::open_with_capacity(
            &self.protocols,
            filename,
            OpenMode::ReadOnly,
            self.config.io_buffer_size,
        )
    }

    fn open_sized_cursor(&self, filename: &str, buf_size: usize) -> Result<BufferedCursor> {
        let mut cursor = self.open_cursor(filename)?;
        if buf_size > 0 {
            if let Err(e) = cursor.set_buffer_size(buf_size) {
                close_quietly(&mut cursor);
                return Err(e);
            }
        }
        Ok(cursor)
    }

    /// Opens and demuxes `filename`.
    ///
    /// Without an explicit `format` the container is probed. `buf_size`
    /// overrides the cursor window when non-zero. Every failure closes what
    /// was opened before returning.
    pub fn open_input_file(
        &self,
        filename: &str,
        format: Option<Arc<dyn InputFormat>>,
        buf_size: usize,
        params: Option<&FormatParameters>,
    ) -> Result<DemuxSession> {
        debug!("{}: state {:?}", filename, SessionState::Unopened);
        let mut cursor = self.open_sized_cursor(filename, buf_size)?;

        let format = match format {
            Some(format) => format,
            None => match self.probe(&mut cursor, filename, buf_size) {
                Ok(format) => format,
                Err(e) => {
                    close_quietly(&mut cursor);
                    return Err(e);
                }
            },
        };
        debug!("{}: state {:?} as {}", filename, SessionState::Probed, format.name());

        match DemuxSession::open_input_stream(cursor, filename, format, params) {
            Ok(session) => Ok(session),
            Err(OpenStreamError { error, mut cursor }) => {
                close_quietly(&mut cursor);
                Err(error)
            }
        }
    }

    /// Reads a growing sample from the start of `cursor` until a format
    /// claims it.
    ///
    /// The sample doubles from `probe_buf_min` up to `probe_buf_max` and the
    /// cursor is rewound after every read. A source that cannot rewind is
    /// closed and opened again, replacing `cursor`.
    fn probe(
        &self,
        cursor: &mut BufferedCursor,
        filename: &str,
        buf_size: usize,
    ) -> Result<Arc<dyn InputFormat>> {
        let mut pd = ProbeData::new(filename, Vec::new());
        let mut probe_size = self.config.probe_buf_min;

        while probe_size <= self.config.probe_buf_max {
            pd.buf.resize(probe_size, 0);
            let len = cursor.read(&mut pd.buf);
            pd.buf.truncate(len);

            match cursor.seek(0, Whence::Set) {
                Ok(_) => {}
                Err(e) if e.is_unsupported() => {
                    debug!("{}: cannot rewind, reopening for next probe", filename);
                    close_quietly(cursor);
                    *cursor = self.open_sized_cursor(filename, buf_size)?;
                }
                Err(e) => return Err(e),
            }

            if let Some((format, score)) = probe_input_format(&self.formats, &pd) {
                info!(
                    "{}: detected {} (score {}) from {} bytes",
                    filename,
                    format.name(),
                    score,
                    pd.buf_size()
                );
                return Ok(format);
            }
            probe_size = match probe_size.checked_mul(2) {
                Some(next) => next,
                None => break,
            };
        }

        debug!("{}: no format after {} probe bytes", filename, pd.buf_size());
        Err(DemuxError::NoMatchingFormat)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("protocols", &self.protocols)
            .field(
                "formats",
                &self.formats.iter().map(|f| f.name()).collect::<Vec<_>>(),
            )
            .field("config", &self.config)
            .finish()
    }
}

fn close_quietly(cursor: &mut BufferedCursor) {
    if let Err(e) = cursor.close() {
        warn!("error while closing cursor: {}", e);
    }
}
