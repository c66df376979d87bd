use crate::error::{DemuxError, Result};
use std::mem::size_of;
use std::ops::BitOr;

/// Flags stored on an [`IndexEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct IndexFlags(u32);

impl IndexFlags {
    /// Entry can be decoded without earlier frames.
    pub const KEYFRAME: Self = Self(0x0001);

    /// No flags set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Whether every flag in `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Raw flag bits.
    pub const fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for IndexFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Lookup policy for [`SeekIndex::search`] and session seeks.
///
/// The default searches forward and only accepts keyframes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct SeekFlags(u32);

impl SeekFlags {
    /// Prefer the closest entry at or before the wanted timestamp.
    pub const BACKWARD: Self = Self(0x0001);
    /// Accept any entry, not only keyframes.
    pub const ANY: Self = Self(0x0004);

    /// Forward, keyframe-aligned search.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Whether every flag in `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for SeekFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// One random-access point of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Byte position of the frame in the resource
    pub pos: u64,
    /// Presentation timestamp in stream time base units
    pub timestamp: i64,
    /// Frame size in bytes
    pub size: u32,
    /// Distance in frames to the previous keyframe, as reported by the demuxer
    pub distance: u32,
    /// Entry flags
    pub flags: IndexFlags,
}

impl IndexEntry {
    /// Whether the entry is flagged as a keyframe.
    pub fn is_keyframe(&self) -> bool {
        self.flags.contains(IndexFlags::KEYFRAME)
    }
}

/// Largest number of entries an index may hold.
pub const MAX_INDEX_ENTRIES: usize = u32::MAX as usize / size_of::<IndexEntry>();

/// Timestamp-ordered table of index entries.
///
/// Timestamps are strictly ascending at all times. Entries can only be
/// appended past the last timestamp or overwrite an entry with the same
/// timestamp; anything that would land before an existing later entry is
/// rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeekIndex {
    entries: Vec<IndexEntry>,
}

impl SeekIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry and returns its position in the table.
    pub fn add_entry(
        &mut self,
        pos: u64,
        timestamp: i64,
        size: u32,
        distance: u32,
        flags: IndexFlags,
    ) -> Result<usize> {
        if self.entries.len() + 1 >= MAX_INDEX_ENTRIES {
            return Err(DemuxError::AllocationLimit(format!(
                "index holds {} entries",
                self.entries.len()
            )));
        }
        self.entries
            .try_reserve(1)
            .map_err(|_| DemuxError::OutOfMemory)?;

        let entry = IndexEntry {
            pos,
            timestamp,
            size,
            distance,
            flags,
        };

        match self.search(timestamp, SeekFlags::ANY) {
            None => {
                debug_assert!(self
                    .entries
                    .last()
                    .map_or(true, |last| last.timestamp < timestamp));
                self.entries.push(entry);
                Ok(self.entries.len() - 1)
            }
            Some(index) => {
                let existing = &mut self.entries[index];
                if existing.timestamp != timestamp {
                    return Err(DemuxError::OutOfOrderTimestamp {
                        timestamp,
                        existing: existing.timestamp,
                    });
                }
                *existing = entry;
                Ok(index)
            }
        }
    }

    /// Finds the entry to use for `wanted`.
    ///
    /// Binary search brackets `wanted` between two neighbours; `BACKWARD`
    /// picks the lower one, otherwise the upper one. Unless `ANY` is set the
    /// result then walks in the same direction to the nearest keyframe.
    /// Running off either end yields `None`.
    pub fn search(&self, wanted: i64, flags: SeekFlags) -> Option<usize> {
        let len = self.entries.len() as isize;
        let mut a: isize = -1;
        let mut b: isize = len;

        while b - a > 1 {
            let m = (a + b) >> 1;
            let timestamp = self.entries[m as usize].timestamp;
            if timestamp >= wanted {
                b = m;
            }
            if timestamp <= wanted {
                a = m;
            }
        }

        let backward = flags.contains(SeekFlags::BACKWARD);
        let mut m = if backward { a } else { b };

        if !flags.contains(SeekFlags::ANY) {
            while m >= 0 && m < len && !self.entries[m as usize].is_keyframe() {
                m += if backward { -1 } else { 1 };
            }
        }

        if m < 0 || m >= len {
            None
        } else {
            Some(m as usize)
        }
    }

    /// Entry at `index`.
    pub fn get(&self, index: usize) -> Option<&IndexEntry> {
        self.entries.get(index)
    }

    /// All entries in timestamp order.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
