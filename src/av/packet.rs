use bytes::Bytes;
use std::time::Duration;

/// One unit of demuxed data, as returned by a single `read_packet` call.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    /// Payload bytes
    pub data: Bytes,
    /// Presentation timestamp in stream time base units
    pub pts: Option<i64>,
    /// Decoding timestamp in stream time base units
    pub dts: Option<i64>,
    /// Index of the stream this packet belongs to
    pub stream_index: usize,
    /// Whether decoding can start at this packet
    pub is_key: bool,
    /// Display duration, when the container carries one
    pub duration: Option<Duration>,
    /// Byte offset of the packet in the source, when known
    pub pos: Option<u64>,
}

impl Packet {
    /// Packet for stream 0 with no timing information.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            pts: None,
            dts: None,
            stream_index: 0,
            is_key: false,
            duration: None,
            pos: None,
        }
    }

    /// Sets the presentation timestamp.
    pub fn with_pts(mut self, pts: i64) -> Self {
        self.pts = Some(pts);
        self
    }

    /// Sets the decoding timestamp.
    pub fn with_dts(mut self, dts: i64) -> Self {
        self.dts = Some(dts);
        self
    }

    /// Sets the owning stream.
    pub fn with_stream_index(mut self, index: usize) -> Self {
        self.stream_index = index;
        self
    }

    /// Marks the packet as a keyframe.
    pub fn with_key_flag(mut self, is_key: bool) -> Self {
        self.is_key = is_key;
        self
    }

    /// Sets the display duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Records the source byte offset.
    pub fn with_pos(mut self, pos: u64) -> Self {
        self.pos = Some(pos);
        self
    }

    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Index flags matching this packet, for feeding a [`SeekIndex`](super::SeekIndex).
    pub fn index_flags(&self) -> super::IndexFlags {
        if self.is_key {
            super::IndexFlags::KEYFRAME
        } else {
            super::IndexFlags::empty()
        }
    }
}
