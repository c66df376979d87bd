use super::index::{IndexFlags, SeekFlags, SeekIndex};
use crate::error::Result;
use bytes::Bytes;
use std::fmt;

/// Exact fraction, used for time bases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Rational {
    /// Numerator
    pub num: i32,
    /// Denominator
    pub den: i32,
}

impl Rational {
    /// `num / den`, not reduced.
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// Value as a float, 0.0 when the denominator is unset.
    pub fn as_f64(self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Kind of elementary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaType {
    /// Not set by the demuxer
    #[default]
    Unknown,
    /// Video frames
    Video,
    /// Audio samples
    Audio,
    /// Opaque data track
    Data,
    /// Subtitles or captions
    Subtitle,
}

/// Codec description filled in by the demuxer. Opaque to the I/O core.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodecParameters {
    /// Kind of stream
    pub media_type: MediaType,
    /// Container-level codec tag, e.g. a fourcc read little-endian
    pub codec_tag: u32,
    /// Picture width in pixels
    pub width: Option<u32>,
    /// Picture height in pixels
    pub height: Option<u32>,
    /// Audio samples per second
    pub sample_rate: Option<u32>,
    /// Audio channel count
    pub channels: Option<u16>,
    /// Average bit rate in bits per second
    pub bit_rate: Option<u64>,
    /// Codec setup data, e.g. a decoder config record
    pub extra_data: Option<Bytes>,
}

/// One elementary stream of a demux session.
#[derive(Debug, Clone)]
pub struct Stream {
    /// Position in the session's stream list
    pub index: usize,
    /// Container-specific identifier
    pub id: i32,
    /// Unit of the stream's timestamps in seconds
    pub time_base: Rational,
    /// Number of significant timestamp bits
    pub pts_wrap_bits: u32,
    /// Stream duration in time base units, when the header declares it
    pub duration: Option<i64>,
    /// Codec description
    pub codec: CodecParameters,
    index_entries: SeekIndex,
}

impl Stream {
    pub(crate) fn new(index: usize, id: i32) -> Self {
        Self {
            index,
            id,
            time_base: Rational::default(),
            pts_wrap_bits: 33,
            duration: None,
            codec: CodecParameters::default(),
            index_entries: SeekIndex::new(),
        }
    }

    /// Sets the timestamp wrap width and time base of the stream.
    pub fn set_pts_info(&mut self, pts_wrap_bits: u32, num: i32, den: i32) {
        self.pts_wrap_bits = pts_wrap_bits;
        self.time_base = Rational::new(num, den);
    }

    /// Adds a seek point. See [`SeekIndex::add_entry`].
    pub fn add_index_entry(
        &mut self,
        pos: u64,
        timestamp: i64,
        size: u32,
        distance: u32,
        flags: IndexFlags,
    ) -> Result<usize> {
        self.index_entries
            .add_entry(pos, timestamp, size, distance, flags)
    }

    /// Looks up a seek point. See [`SeekIndex::search`].
    pub fn search_timestamp(&self, wanted: i64, flags: SeekFlags) -> Option<usize> {
        self.index_entries.search(wanted, flags)
    }

    /// Seek index built up by the demuxer.
    pub fn index_entries(&self) -> &SeekIndex {
        &self.index_entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_set_pts_info() {
        let mut stream = Stream::new(0, 7);
        stream.set_pts_info(64, 1, 25);
        assert_eq!(stream.time_base, Rational::new(1, 25));
        assert_eq!(stream.pts_wrap_bits, 64);
        assert_eq!(stream.time_base.to_string(), "1/25");
        assert!((stream.time_base.as_f64() - 0.04).abs() < 1e-9);
        assert_eq!(Rational::default().as_f64(), 0.0);
    }

    #[test]
    fn test_stream_index_delegation() {
        let mut stream = Stream::new(0, 0);
        stream.add_index_entry(0, 0, 10, 0, IndexFlags::KEYFRAME).unwrap();
        stream.add_index_entry(10, 40, 10, 1, IndexFlags::empty()).unwrap();
        assert_eq!(stream.index_entries().len(), 2);
        assert_eq!(stream.search_timestamp(40, SeekFlags::BACKWARD), Some(0));
        assert_eq!(stream.search_timestamp(40, SeekFlags::ANY), Some(1));
    }
}
