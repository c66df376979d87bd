use super::InputFormat;
use log::trace;
use std::sync::Arc;

/// Score given to a format whose extension matches the filename.
pub const SCORE_EXTENSION: u32 = 50;

/// Score of a certain signature match.
pub const SCORE_MAX: u32 = 100;

// Extension tokens longer than this are compared truncated
const MAX_EXT_TOKEN: usize = 31;

/// Sample handed to format probes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeData {
    /// Name the input was opened with
    pub filename: String,
    /// Leading bytes of the input
    pub buf: Vec<u8>,
}

impl ProbeData {
    /// Sample of `filename`.
    pub fn new(filename: impl Into<String>, buf: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            buf,
        }
    }

    /// Number of sample bytes.
    pub fn buf_size(&self) -> usize {
        self.buf.len()
    }
}

/// Whether the extension of `filename` is one of the comma-separated
/// `extensions`, compared case-insensitively.
///
/// The extension is everything after the last `.` of the whole name, so
/// `.avi` has the extension `avi` and a dot in a directory name counts too.
pub fn match_ext(filename: &str, extensions: &str) -> bool {
    let ext = match filename.rsplit_once('.') {
        Some((_, ext)) => ext,
        None => return false,
    };
    extensions.split(',').any(|token| {
        let token = match token.char_indices().nth(MAX_EXT_TOKEN) {
            Some((cut, _)) => &token[..cut],
            None => token,
        };
        token.eq_ignore_ascii_case(ext)
    })
}

/// Picks the best scoring format for `pd`.
///
/// A format with a probe is scored by it alone; otherwise an extension match
/// scores [`SCORE_EXTENSION`]. Only a strictly higher score replaces the
/// current best, so the earliest registered format wins ties. Returns `None`
/// when every score is 0.
pub fn probe_input_format(
    formats: &[Arc<dyn InputFormat>],
    pd: &ProbeData,
) -> Option<(Arc<dyn InputFormat>, u32)> {
    let mut best: Option<(Arc<dyn InputFormat>, u32)> = None;
    let mut score_max = 0;

    for format in formats {
        let score = match format.probe(pd) {
            Some(score) => score,
            None => match format.extensions() {
                Some(exts) if match_ext(&pd.filename, exts) => SCORE_EXTENSION,
                _ => 0,
            },
        };
        trace!(
            "probe {} on {} bytes of {}: score {}",
            format.name(),
            pd.buf_size(),
            pd.filename,
            score
        );
        if score > score_max {
            score_max = score;
            best = Some((format.clone(), score));
        }
    }

    best
}
