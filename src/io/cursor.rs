use super::protocol::{OpenMode, ProtocolHandle, ProtocolRegistry, Whence};
use crate::config::IO_BUFFER_SIZE;
use crate::error::{DemuxError, Result};
use log::{debug, trace, warn};
use std::io;

/// Where a cursor gets its bytes from.
#[derive(Debug)]
enum Backend {
    /// Reads and seeks forward to an opened protocol handle
    Handle(ProtocolHandle),
    /// The buffer itself holds the whole resource; there is nothing to
    /// refill from and nothing to seek
    Memory,
    Closed,
}

fn backend_read(backend: &mut Backend, buf: &mut [u8]) -> Result<usize> {
    match backend {
        Backend::Handle(handle) => handle.read(buf),
        Backend::Memory => Ok(0),
        Backend::Closed => Err(DemuxError::InvalidArgument("cursor is closed".into())),
    }
}

fn alloc_buffer(size: usize) -> Result<Vec<u8>> {
    if size == 0 {
        return Err(DemuxError::InvalidArgument(
            "buffer size must be at least one byte".into(),
        ));
    }
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(size)
        .map_err(|_| DemuxError::OutOfMemory)?;
    buffer.resize(size, 0);
    Ok(buffer)
}

/// Fixed-capacity read-ahead window over a byte source.
///
/// In read mode `buffer[ptr..end]` holds the unread bytes and `pos` is the
/// resource offset of `end`, so the logical read offset is
/// `pos - (end - ptr)`. In write mode `pos` is the resource offset of the
/// buffer start, the whole capacity from `ptr` onward is writable, `end`
/// equals the capacity and the logical offset is `pos + ptr`.
///
/// Byte readers never fail: once the source is exhausted they return 0 and
/// the sticky [`eof`](Self::eof) flag (plus [`error`](Self::error) for read
/// failures) tells the caller why.
#[derive(Debug)]
pub struct BufferedCursor {
    buffer: Vec<u8>,
    ptr: usize,
    end: usize,
    pos: u64,
    write_flag: bool,
    must_flush: bool,
    eof_reached: bool,
    error: Option<DemuxError>,
    max_packet_size: usize,
    io_started: bool,
    backend: Backend,
}

impl BufferedCursor {
    fn init(buffer: Vec<u8>, write_flag: bool, backend: Backend) -> Self {
        let end = if write_flag { buffer.len() } else { 0 };
        Self {
            buffer,
            ptr: 0,
            end,
            pos: 0,
            write_flag,
            must_flush: false,
            eof_reached: false,
            error: None,
            max_packet_size: 0,
            io_started: false,
            backend,
        }
    }

    /// Opens `filename` through the registry with the default window size.
    pub fn open(registry: &ProtocolRegistry, filename: &str, mode: OpenMode) -> Result<Self> {
        Self::open_with_capacity(registry, filename, mode, IO_BUFFER_SIZE)
    }

    /// Opens `filename`, sizing the buffer to the protocol's maximum packet
    /// size when it reports one and to `default_size` otherwise.
    pub fn open_with_capacity(
        registry: &ProtocolRegistry,
        filename: &str,
        mode: OpenMode,
        default_size: usize,
    ) -> Result<Self> {
        let handle = ProtocolHandle::open(registry, filename, mode)?;
        let max_packet_size = handle.max_packet_size();
        // no need to buffer more than one packet
        let size = if max_packet_size > 0 {
            max_packet_size
        } else {
            default_size
        };

        let buffer = match alloc_buffer(size) {
            Ok(buffer) => buffer,
            Err(e) => {
                if let Err(close_err) = handle.close() {
                    warn!("failed to close {} after open error: {}", filename, close_err);
                }
                return Err(e);
            }
        };

        let mut cursor = Self::init(buffer, mode.is_write(), Backend::Handle(handle));
        cursor.max_packet_size = max_packet_size;
        debug!("cursor over {} with {} byte window", filename, size);
        Ok(cursor)
    }

    /// Wraps an already opened handle with a `capacity`-byte window.
    pub fn from_handle(handle: ProtocolHandle, capacity: usize) -> Result<Self> {
        let buffer = alloc_buffer(capacity)?;
        let max_packet_size = handle.max_packet_size();
        let write_flag = handle.mode().is_write();
        let mut cursor = Self::init(buffer, write_flag, Backend::Handle(handle));
        cursor.max_packet_size = max_packet_size;
        Ok(cursor)
    }

    /// Reads from a fixed in-memory block.
    ///
    /// The block becomes the buffer, so every offset inside it can be reached
    /// by an in-memory seek. There is no seek primitive behind it: seeking
    /// outside the block and [`size`](Self::size) report
    /// [`DemuxError::Unsupported`].
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        let mut data = data.into();
        let len = data.len();
        if data.is_empty() {
            data.push(0);
        }
        let mut cursor = Self::init(data, false, Backend::Memory);
        cursor.end = len;
        cursor.pos = len as u64;
        cursor
    }

    /// Replaces the buffer with one of `size` bytes. Only valid before any I/O.
    pub fn set_buffer_size(&mut self, size: usize) -> Result<()> {
        if self.io_started {
            return Err(DemuxError::InvalidArgument(
                "buffer size must be set before any I/O".into(),
            ));
        }
        if matches!(self.backend, Backend::Memory) {
            return Err(DemuxError::InvalidArgument(
                "cannot resize an in-memory cursor".into(),
            ));
        }
        self.buffer = alloc_buffer(size)?;
        self.ptr = 0;
        self.end = if self.write_flag { size } else { 0 };
        Ok(())
    }

    fn fill_buffer(&mut self) {
        if self.eof_reached {
            return;
        }
        self.io_started = true;
        match backend_read(&mut self.backend, &mut self.buffer) {
            Ok(0) => {
                // leave the buffer alone so a seek back can replay it
                self.eof_reached = true;
            }
            Ok(len) => {
                trace!("refilled {} bytes at offset {}", len, self.pos);
                self.pos += len as u64;
                self.ptr = 0;
                self.end = len;
            }
            Err(e) => {
                debug!("read failed at offset {}: {}", self.pos, e);
                self.eof_reached = true;
                self.error = Some(e);
            }
        }
    }

    /// Next byte, or 0 once the source is exhausted.
    pub fn read_u8(&mut self) -> u8 {
        if self.ptr >= self.end {
            self.fill_buffer();
            if self.ptr >= self.end {
                return 0;
            }
        }
        let byte = self.buffer[self.ptr];
        self.ptr += 1;
        byte
    }

    /// Little-endian 16-bit value.
    pub fn read_le16(&mut self) -> u16 {
        let lo = self.read_u8() as u16;
        lo | (self.read_u8() as u16) << 8
    }

    /// Little-endian 24-bit value.
    pub fn read_le24(&mut self) -> u32 {
        let lo = self.read_le16() as u32;
        lo | (self.read_u8() as u32) << 16
    }

    /// Little-endian 32-bit value.
    pub fn read_le32(&mut self) -> u32 {
        let lo = self.read_le16() as u32;
        lo | (self.read_le16() as u32) << 16
    }

    /// Little-endian 64-bit value.
    pub fn read_le64(&mut self) -> u64 {
        let lo = self.read_le32() as u64;
        lo | (self.read_le32() as u64) << 32
    }

    /// Four raw bytes in stream order, e.g. a RIFF chunk id.
    pub fn read_fourcc(&mut self) -> [u8; 4] {
        [
            self.read_u8(),
            self.read_u8(),
            self.read_u8(),
            self.read_u8(),
        ]
    }

    /// Copies up to `buf.len()` bytes, draining the window first.
    ///
    /// Once the window is empty, a remaining request larger than the whole
    /// window is read straight into `buf`. Returns the number of bytes
    /// transferred, which is short only at end of stream or on error.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let mut done = 0;
        while done < buf.len() {
            let remaining = buf.len() - done;
            let available = self.end - self.ptr;

            if available > 0 {
                let len = available.min(remaining);
                buf[done..done + len].copy_from_slice(&self.buffer[self.ptr..self.ptr + len]);
                self.ptr += len;
                done += len;
                continue;
            }

            if remaining > self.buffer.len() {
                self.io_started = true;
                match backend_read(&mut self.backend, &mut buf[done..]) {
                    Ok(0) => {
                        self.eof_reached = true;
                        break;
                    }
                    Ok(len) => {
                        trace!("direct read of {} bytes at offset {}", len, self.pos);
                        self.pos += len as u64;
                        done += len;
                        self.ptr = 0;
                        self.end = 0;
                    }
                    Err(e) => {
                        self.eof_reached = true;
                        self.error = Some(e);
                        break;
                    }
                }
            } else {
                self.fill_buffer();
                if self.end == self.ptr {
                    break;
                }
            }
        }
        done
    }

    /// Moves the logical read position.
    ///
    /// Only [`Whence::Set`] and [`Whence::Current`] are accepted. Targets inside
    /// the current window are reached without I/O; anything else empties the
    /// window and seeks the source. A successful seek clears the EOF flag,
    /// except the zero relative seek, which only reports the position.
    pub fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let target = match whence {
            Whence::Current => {
                let current = self.tell();
                if offset == 0 {
                    return Ok(current);
                }
                (current as i64).checked_add(offset).ok_or_else(|| {
                    DemuxError::InvalidArgument(format!("seek offset {} overflows", offset))
                })?
            }
            Whence::Set => offset,
            Whence::End => {
                return Err(DemuxError::InvalidArgument(
                    "end-relative seeks are not supported".into(),
                ))
            }
        };
        if target < 0 {
            return Err(DemuxError::InvalidArgument(format!(
                "seek before start of stream ({})",
                target
            )));
        }
        let target = target as u64;

        let window_start = self.window_start();
        let window_len = (if self.write_flag { self.ptr } else { self.end }) as u64;
        if target >= window_start && target - window_start <= window_len {
            self.ptr = (target - window_start) as usize;
        } else {
            let handle = match &mut self.backend {
                Backend::Handle(handle) => handle,
                Backend::Memory => return Err(DemuxError::Unsupported("seek")),
                Backend::Closed => {
                    return Err(DemuxError::InvalidArgument("cursor is closed".into()))
                }
            };
            self.ptr = 0;
            self.end = if self.write_flag { self.buffer.len() } else { 0 };
            debug!("seeking source from {} to {}", self.pos, target);
            handle.seek(target as i64, Whence::Set)?;
            self.pos = target;
        }
        self.eof_reached = false;
        Ok(target)
    }

    /// Skips `offset` bytes relative to the current position.
    pub fn skip(&mut self, offset: i64) -> Result<u64> {
        self.seek(offset, Whence::Current)
    }

    /// Logical offset. Never performs I/O.
    pub fn tell(&self) -> u64 {
        self.window_start() + self.ptr as u64
    }

    // In write mode the window starts at `pos` and grows with `ptr`; in read
    // mode it ends at `pos`.
    fn window_start(&self) -> u64 {
        if self.write_flag {
            self.pos
        } else {
            self.pos - self.end as u64
        }
    }

    /// Total size of the source.
    ///
    /// Seeks the source to its end and back to the window end. Must not be
    /// interleaved with a read in progress.
    pub fn size(&mut self) -> Result<u64> {
        let handle = match &mut self.backend {
            Backend::Handle(handle) => handle,
            Backend::Memory => return Err(DemuxError::Unsupported("size")),
            Backend::Closed => return Err(DemuxError::InvalidArgument("cursor is closed".into())),
        };
        let size = handle.seek(0, Whence::End)?;
        handle.seek(self.pos as i64, Whence::Set)?;
        Ok(size)
    }

    /// Whether end of stream has been reached. Cleared by a successful seek.
    pub fn eof(&self) -> bool {
        self.eof_reached
    }

    /// Last read error latched by a refill, if any.
    pub fn error(&self) -> Option<&DemuxError> {
        self.error.as_ref()
    }

    /// Buffer capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes buffered and not yet consumed.
    pub fn buffered(&self) -> usize {
        self.end - self.ptr
    }

    /// Resource offset of the end of the window.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Maximum packet size reported by the protocol, 0 when unbounded.
    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    /// Whether the cursor was opened for writing.
    pub fn is_write(&self) -> bool {
        self.write_flag
    }

    /// Whether buffered output is pending for the next seek.
    pub fn must_flush(&self) -> bool {
        self.must_flush
    }

    /// Whether the cursor is still bound to a source.
    pub fn is_open(&self) -> bool {
        !matches!(self.backend, Backend::Closed)
    }

    /// Releases the buffer and closes the underlying handle.
    ///
    /// Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        self.buffer = Vec::new();
        self.ptr = 0;
        self.end = 0;
        match std::mem::replace(&mut self.backend, Backend::Closed) {
            Backend::Handle(handle) => handle.close(),
            Backend::Memory | Backend::Closed => Ok(()),
        }
    }
}

impl io::Read for BufferedCursor {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = BufferedCursor::read(self, buf);
        if n == 0 && !buf.is_empty() {
            if let Some(e) = &self.error {
                let kind = match e {
                    DemuxError::Io(inner) => inner.kind(),
                    _ => io::ErrorKind::Other,
                };
                return Err(io::Error::new(kind, e.to_string()));
            }
        }
        Ok(n)
    }
}
