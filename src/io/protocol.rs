use crate::error::{DemuxError, Result};
use log::{debug, trace, warn};
use std::fmt;
use std::io;
use std::sync::Arc;
use url::Url;

/// Origin of a seek request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// Absolute offset from the start of the resource
    Set,
    /// Relative to the current position
    Current,
    /// Relative to the end of the resource (only used for size queries)
    End,
}

/// Access mode requested when opening a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// Read only
    #[default]
    ReadOnly,
    /// Write only
    WriteOnly,
    /// Read and write
    ReadWrite,
}

impl OpenMode {
    /// Whether a buffered cursor over this resource operates in write mode.
    pub fn is_write(self) -> bool {
        matches!(self, OpenMode::WriteOnly | OpenMode::ReadWrite)
    }
}

/// A named, pluggable byte source.
///
/// Implementations are registered once in a [`ProtocolRegistry`] and are
/// immutable afterwards. Opening a resource yields the per-resource state
/// implementing [`ProtocolContext`].
pub trait Protocol {
    /// Unique protocol name, also matched against the filename scheme.
    fn name(&self) -> &str;

    /// Opens `filename` and returns the protocol-private state for it.
    fn open(&self, filename: &str, mode: OpenMode) -> Result<Box<dyn ProtocolContext>>;
}

/// Operations on one opened resource.
///
/// `read` is mandatory. `write` and `seek` default to
/// [`DemuxError::Unsupported`] so non-seekable or read-only sources simply
/// leave them out.
pub trait ProtocolContext {
    /// Reads up to `buf.len()` bytes. `Ok(0)` means end of resource.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Writes `buf`, returning the number of bytes accepted.
    fn write(&mut self, _buf: &[u8]) -> Result<usize> {
        Err(DemuxError::Unsupported("write"))
    }

    /// Moves the resource position and returns the new absolute offset.
    fn seek(&mut self, _offset: i64, _whence: Whence) -> Result<u64> {
        Err(DemuxError::Unsupported("seek"))
    }

    /// Releases the resource.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Maximum packet size of a packetized source, 0 when unbounded.
    fn max_packet_size(&self) -> usize {
        0
    }
}

/// Ordered set of registered protocols.
///
/// Lookup scans in registration order and the first match wins, so a
/// duplicate name registered later is never selected.
#[derive(Default, Clone)]
pub struct ProtocolRegistry {
    protocols: Vec<Arc<dyn Protocol>>,
}

impl ProtocolRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a protocol.
    pub fn register(&mut self, protocol: Arc<dyn Protocol>) {
        debug!("registering protocol {}", protocol.name());
        self.protocols.push(protocol);
    }

    /// Number of registered protocols.
    pub fn len(&self) -> usize {
        self.protocols.len()
    }

    /// Whether no protocol is registered.
    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }

    /// Iterates protocols in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Protocol>> {
        self.protocols.iter()
    }

    /// Resolves the protocol responsible for `filename`.
    ///
    /// A scheme prefix (`name:`) selects the protocol of that name. Without a
    /// match the only registered protocol is used when there is exactly one,
    /// and a plain path falls back to the `file` protocol.
    pub fn find(&self, filename: &str) -> Result<Arc<dyn Protocol>> {
        let scheme = scheme_of(filename);

        if let Some(scheme) = scheme.as_deref() {
            if let Some(p) = self.by_name(scheme) {
                return Ok(p.clone());
            }
        }

        if self.protocols.len() == 1 {
            return Ok(self.protocols[0].clone());
        }

        if scheme.is_none() {
            if let Some(p) = self.by_name("file") {
                return Ok(p.clone());
            }
        }

        Err(DemuxError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no protocol accepts {}", filename),
        )))
    }

    fn by_name(&self, name: &str) -> Option<&Arc<dyn Protocol>> {
        self.protocols
            .iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Debug for ProtocolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.protocols.iter().map(|p| p.name()))
            .finish()
    }
}

/// Scheme of `filename` when it parses as an absolute URL.
///
/// Single-letter schemes are drive letters (`C:\clip.avi`), not protocols.
pub(crate) fn scheme_of(filename: &str) -> Option<String> {
    match Url::parse(filename) {
        Ok(url) if url.scheme().len() > 1 => Some(url.scheme().to_string()),
        _ => None,
    }
}

/// One opened resource bound to the protocol that opened it.
///
/// The handle is closed exactly once: either explicitly through
/// [`ProtocolHandle::close`] or when it is dropped.
pub struct ProtocolHandle {
    protocol: Arc<dyn Protocol>,
    mode: OpenMode,
    max_packet_size: usize,
    context: Option<Box<dyn ProtocolContext>>,
    filename: String,
}

impl ProtocolHandle {
    /// Resolves a protocol for `filename` and opens it.
    pub fn open(registry: &ProtocolRegistry, filename: &str, mode: OpenMode) -> Result<Self> {
        let protocol = registry.find(filename)?;
        let context = protocol.open(filename, mode)?;
        let max_packet_size = context.max_packet_size();
        debug!(
            "opened {} via {} ({:?}, max packet size {})",
            filename,
            protocol.name(),
            mode,
            max_packet_size
        );
        Ok(Self {
            protocol,
            mode,
            max_packet_size,
            context: Some(context),
            filename: filename.to_string(),
        })
    }

    fn context(&mut self) -> Result<&mut Box<dyn ProtocolContext>> {
        self.context
            .as_mut()
            .ok_or_else(|| DemuxError::InvalidArgument("protocol handle is closed".into()))
    }

    /// Reads up to `buf.len()` bytes; `Ok(0)` is end of resource.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.context()?.read(buf)?;
        trace!("{}: read {} of {} bytes", self.filename, n, buf.len());
        Ok(n)
    }

    /// Writes `buf` through the protocol.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if self.mode == OpenMode::ReadOnly {
            return Err(DemuxError::Unsupported("write on read-only handle"));
        }
        self.context()?.write(buf)
    }

    /// Seeks the underlying resource.
    pub fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        self.context()?.seek(offset, whence)
    }

    /// Closes the resource.
    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        match self.context.take() {
            Some(mut context) => {
                debug!("closing {} via {}", self.filename, self.protocol.name());
                context.close()
            }
            None => Ok(()),
        }
    }

    /// Protocol that opened this handle.
    pub fn protocol(&self) -> &Arc<dyn Protocol> {
        &self.protocol
    }

    /// Mode the resource was opened with.
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Maximum packet size reported at open time, 0 when unbounded.
    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    /// Filename the handle was opened with.
    pub fn filename(&self) -> &str {
        &self.filename
    }
}

impl Drop for ProtocolHandle {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("failed to close {}: {}", self.filename, e);
        }
    }
}

impl fmt::Debug for ProtocolHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolHandle")
            .field("protocol", &self.protocol.name())
            .field("mode", &self.mode)
            .field("max_packet_size", &self.max_packet_size)
            .field("filename", &self.filename)
            .field("open", &self.context.is_some())
            .finish()
    }
}
