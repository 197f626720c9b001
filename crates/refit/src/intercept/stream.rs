//! Streams handed back to the host for an opened load.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::PathBuf;

/// Content source for an opened load.
///
/// `Memory` serves transformed text as if it had been read from the
/// file; `File` is the untouched default path. Both arms are readable
/// and seekable, so the host can rewind either exactly as it could a
/// real file.
#[derive(Debug)]
pub enum SourceStream {
    /// Transformed content served from memory.
    Memory(Cursor<Vec<u8>>),

    /// The real file, untouched.
    File(File),
}

impl SourceStream {
    /// Wrap transformed content.
    pub fn from_content(content: String) -> Self {
        SourceStream::Memory(Cursor::new(content.into_bytes()))
    }

    /// Content length in bytes.
    pub fn content_len(&self) -> io::Result<u64> {
        match self {
            SourceStream::Memory(cursor) => Ok(cursor.get_ref().len() as u64),
            SourceStream::File(file) => Ok(file.metadata()?.len()),
        }
    }
}

impl Read for SourceStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            SourceStream::Memory(cursor) => cursor.read(buf),
            SourceStream::File(file) => file.read(buf),
        }
    }
}

impl Seek for SourceStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            SourceStream::Memory(cursor) => cursor.seek(pos),
            SourceStream::File(file) => file.seek(pos),
        }
    }
}

/// An opened load: the stream to read plus the path it resolved to.
///
/// The resolved path is reported identically whether or not the content
/// was transformed.
#[derive(Debug)]
pub struct OpenedLoad {
    /// Stream the host reads the (possibly rewritten) text from.
    pub stream: SourceStream,

    /// Fully resolved path of the underlying file.
    pub resolved: PathBuf,
}

impl OpenedLoad {
    /// Whether the content was rewritten and is served from memory.
    pub fn transformed(&self) -> bool {
        matches!(self.stream, SourceStream::Memory(_))
    }
}
