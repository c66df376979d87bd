use super::protocol::{OpenMode, Protocol, ProtocolContext, Whence};
use crate::error::{DemuxError, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use url::Url;

/// Local file protocol.
///
/// Accepts plain paths, `file:` prefixed paths and `file://` URLs.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileProtocol;

impl FileProtocol {
    /// Protocol name used for scheme matching.
    pub const NAME: &'static str = "file";
}

fn resolve_path(filename: &str) -> PathBuf {
    if filename.starts_with("file://") {
        if let Some(path) = Url::parse(filename)
            .ok()
            .and_then(|url| url.to_file_path().ok())
        {
            return path;
        }
    }
    if let Some(rest) = filename.strip_prefix("file:") {
        return PathBuf::from(rest);
    }
    PathBuf::from(filename)
}

impl Protocol for FileProtocol {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn open(&self, filename: &str, mode: OpenMode) -> Result<Box<dyn ProtocolContext>> {
        let path = resolve_path(filename);
        let mut options = OpenOptions::new();
        match mode {
            OpenMode::ReadOnly => options.read(true),
            OpenMode::WriteOnly => options.write(true).create(true).truncate(true),
            OpenMode::ReadWrite => options.read(true).write(true).create(true).truncate(true),
        };
        let file = options.open(&path)?;
        Ok(Box::new(FileContext { file }))
    }
}

struct FileContext {
    file: File,
}

impl ProtocolContext for FileContext {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.file.read(buf)?)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        Ok(self.file.write(buf)?)
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let from = match whence {
            Whence::Set => {
                if offset < 0 {
                    return Err(DemuxError::InvalidArgument(format!(
                        "negative absolute offset {}",
                        offset
                    )));
                }
                SeekFrom::Start(offset as u64)
            }
            Whence::Current => SeekFrom::Current(offset),
            Whence::End => SeekFrom::End(offset),
        };
        Ok(self.file.seek(from)?)
    }

    fn close(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }
}
