use thiserror::Error;

/// Errors surfaced by the I/O, probing and demuxing layers.
#[derive(Error, Debug)]
pub enum DemuxError {
    /// Failure reported by the underlying byte source, or no protocol
    /// accepted the requested resource.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A buffer or table could not be allocated.
    #[error("out of memory")]
    OutOfMemory,

    /// The byte source does not implement the requested operation
    /// (the "broken pipe" condition for non-seekable sources).
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    /// A caller-supplied value or call order is not acceptable.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Probing finished without any registered format claiming the input.
    #[error("no registered input format matches the stream")]
    NoMatchingFormat,

    /// Growing a table would exceed the largest representable entry count.
    #[error("allocation limit exceeded: {0}")]
    AllocationLimit(String),

    /// A session already holds the maximum number of streams.
    #[error("too many streams (limit is {0})")]
    TooManyStreams(usize),

    /// An index insert would break the ascending timestamp order.
    #[error("timestamp {timestamp} would be inserted before existing entry at {existing}")]
    OutOfOrderTimestamp {
        /// Timestamp of the rejected entry
        timestamp: i64,
        /// Timestamp of the entry it collided with
        existing: i64,
    },

    /// The container bytes are malformed.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// No further packets can be read from the session.
    #[error("end of stream")]
    EndOfStream,
}

impl DemuxError {
    /// Returns true for the "not supported / broken pipe" condition.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, DemuxError::Unsupported(_))
    }

    /// Returns true when the error marks the end of the packet stream.
    pub fn is_eof(&self) -> bool {
        match self {
            DemuxError::EndOfStream => true,
            DemuxError::Io(e) => e.kind() == std::io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }
}

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, DemuxError>;
