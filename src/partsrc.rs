//! # Part source abstraction (C2, spec.md §4.2)
//!
//! A `PartSource` is a pull-style byte source used to add one fork to an archive. It must
//! tolerate being opened, fully read, rewound, and re-read, since some archive codecs need
//! two passes (CRC then compress). Three variants: file-backed, memory-backed, and a
//! generated AppleDouble header (used for MacZip output, spec.md §4.3, and clip sources,
//! spec.md §4.9).

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;

use crate::attribs::FileAttribs;
use crate::error::CoreError;

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
enum State {
    Fresh,
    Open,
    Closed,
}

/// Pull-style byte source for one fork of an add operation (spec.md §4.2).
pub trait PartSource {
    fn open(&mut self) -> Result<(), CoreError>;
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, CoreError>;
    fn rewind(&mut self) -> Result<(), CoreError>;
    fn close(&mut self) -> Result<(), CoreError>;
    /// Total length, if known without reading to the end (archives that need sizes up
    /// front, e.g. for a local file header, call this before `open`).
    fn len_hint(&self) -> Option<u64> {
        None
    }
}

/// Read all remaining bytes from a `PartSource` already in the open state.
pub fn read_to_end(src: &mut dyn PartSource) -> Result<Vec<u8>, CoreError> {
    let mut out = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = src.read(&mut buf)?;
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    Ok(out)
}

/// Wraps a host file; supports an optional import-converter interposition on read
/// (spec.md §4.2 `FileBacked`). The converter, if present, runs once on open and its
/// output is buffered — two-pass archive codecs still see a rewindable, byte-identical
/// stream on the second pass.
pub struct FileBacked {
    path: PathBuf,
    converter: Option<Box<dyn Fn(&[u8]) -> Result<Vec<u8>, CoreError>>>,
    state: State,
    buf: Vec<u8>,
    pos: usize,
}

impl FileBacked {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), converter: None, state: State::Fresh, buf: Vec::new(), pos: 0 }
    }
    pub fn with_converter(
        path: impl Into<PathBuf>,
        converter: Box<dyn Fn(&[u8]) -> Result<Vec<u8>, CoreError>>,
    ) -> Self {
        Self { path: path.into(), converter: Some(converter), state: State::Fresh, buf: Vec::new(), pos: 0 }
    }
}

impl PartSource for FileBacked {
    fn open(&mut self) -> Result<(), CoreError> {
        if self.state == State::Closed {
            return Err(CoreError::PartSourceSequence("open() called after close()".into()));
        }
        let mut raw = Vec::new();
        File::open(&self.path)?.read_to_end(&mut raw)?;
        self.buf = match &self.converter {
            Some(conv) => conv(&raw)?,
            None => raw,
        };
        self.pos = 0;
        self.state = State::Open;
        Ok(())
    }
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, CoreError> {
        if self.state != State::Open {
            return Err(CoreError::PartSourceSequence("read() before open()".into()));
        }
        let remaining = &self.buf[self.pos..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }
    fn rewind(&mut self) -> Result<(), CoreError> {
        if self.state != State::Open {
            return Err(CoreError::PartSourceSequence("rewind() before open()".into()));
        }
        self.pos = 0;
        Ok(())
    }
    fn close(&mut self) -> Result<(), CoreError> {
        self.state = State::Closed;
        self.buf.clear();
        Ok(())
    }
    fn len_hint(&self) -> Option<u64> {
        std::fs::metadata(&self.path).ok().map(|m| m.len())
    }
}

/// Wraps a byte buffer already in memory: empty data forks, generated AppleDouble headers,
/// and clip-paste receive buffers all use this (spec.md §4.2 `MemoryBacked`).
pub struct MemoryBacked {
    data: Vec<u8>,
    state: State,
    pos: usize,
}

impl MemoryBacked {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, state: State::Fresh, pos: 0 }
    }
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl PartSource for MemoryBacked {
    fn open(&mut self) -> Result<(), CoreError> {
        if self.state == State::Closed {
            return Err(CoreError::PartSourceSequence("open() called after close()".into()));
        }
        self.pos = 0;
        self.state = State::Open;
        Ok(())
    }
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, CoreError> {
        if self.state != State::Open {
            return Err(CoreError::PartSourceSequence("read() before open()".into()));
        }
        let remaining = &self.data[self.pos..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }
    fn rewind(&mut self) -> Result<(), CoreError> {
        if self.state != State::Open {
            return Err(CoreError::PartSourceSequence("rewind() before open()".into()));
        }
        self.pos = 0;
        Ok(())
    }
    fn close(&mut self) -> Result<(), CoreError> {
        self.state = State::Closed;
        Ok(())
    }
    fn len_hint(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }
}

/// Builds an AppleDouble "header" record in memory on `open()`, from a source entry's
/// attributes plus an optional resource fork, so ZIP output can carry a MacZip sidecar
/// (spec.md §4.2 `GeneratedADF`, §4.3).
pub struct GeneratedADF {
    attribs: FileAttribs,
    rsrc: Option<Vec<u8>>,
    inner: Option<MemoryBacked>,
}

impl GeneratedADF {
    pub fn new(attribs: FileAttribs, rsrc: Option<Vec<u8>>) -> Self {
        Self { attribs, rsrc, inner: None }
    }
}

impl PartSource for GeneratedADF {
    fn open(&mut self) -> Result<(), CoreError> {
        let bytes = crate::adf::build(&self.attribs, None, self.rsrc.as_deref(), true);
        let mut inner = MemoryBacked::new(bytes);
        inner.open()?;
        self.inner = Some(inner);
        Ok(())
    }
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, CoreError> {
        match &mut self.inner {
            Some(inner) => inner.read(buf),
            None => Err(CoreError::PartSourceSequence("read() before open()".into())),
        }
    }
    fn rewind(&mut self) -> Result<(), CoreError> {
        match &mut self.inner {
            Some(inner) => inner.rewind(),
            None => Err(CoreError::PartSourceSequence("rewind() before open()".into())),
        }
    }
    fn close(&mut self) -> Result<(), CoreError> {
        if let Some(inner) = &mut self.inner {
            inner.close()?;
        }
        self.inner = None;
        Ok(())
    }
}

/// Optional leak-detector instrumentation (spec.md §9 "Finalizer-based leak detection"):
/// counts outstanding opens that were never closed. Rust has no reliable ordering across an
/// arbitrary `Drop` graph, so rather than assert-in-destructor like the source, this wraps a
/// `PartSource` and logs via the hook if it is dropped still open — active whenever a
/// caller opts in (debug builds, or a hook that requests it).
pub struct LeakGuard<'a, S: PartSource> {
    inner: S,
    hook: &'a dyn crate::hook::AppHook,
    label: String,
    opened: bool,
}

impl<'a, S: PartSource> LeakGuard<'a, S> {
    pub fn new(inner: S, hook: &'a dyn crate::hook::AppHook, label: impl Into<String>) -> Self {
        Self { inner, hook, label: label.into(), opened: false }
    }
}

impl<'a, S: PartSource> PartSource for LeakGuard<'a, S> {
    fn open(&mut self) -> Result<(), CoreError> {
        self.inner.open()?;
        self.opened = true;
        Ok(())
    }
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, CoreError> {
        self.inner.read(buf)
    }
    fn rewind(&mut self) -> Result<(), CoreError> {
        self.inner.rewind()
    }
    fn close(&mut self) -> Result<(), CoreError> {
        self.inner.close()?;
        self.opened = false;
        Ok(())
    }
    fn len_hint(&self) -> Option<u64> {
        self.inner.len_hint()
    }
}

impl<'a, S: PartSource> Drop for LeakGuard<'a, S> {
    fn drop(&mut self) {
        if self.opened {
            self.hook.log(
                crate::hook::LogLevel::Error,
                &format!("part source '{}' dropped without close()", self.label),
            );
        }
    }
}

/// Convenience seekable adapter so a `PartSource` can satisfy codecs that want `Read + Seek`
/// over a fully-buffered fork (used by archive codecs needing random access for CRC passes).
pub struct BufferedSeek {
    buf: Vec<u8>,
    pos: u64,
}

impl BufferedSeek {
    pub fn from_source(src: &mut dyn PartSource) -> Result<Self, CoreError> {
        src.open()?;
        let buf = read_to_end(src)?;
        src.close()?;
        Ok(Self { buf, pos: 0 })
    }
}

impl Read for BufferedSeek {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let start = self.pos as usize;
        if start >= self.buf.len() {
            return Ok(0);
        }
        let remaining = &self.buf[start..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for BufferedSeek {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::End(p) => self.buf.len() as i64 + p,
            SeekFrom::Current(p) => self.pos as i64 + p,
        };
        if new_pos < 0 {
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, "seek before start"));
        }
        self.pos = new_pos as u64;
        Ok(self.pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_backed_supports_rewind_and_reread() {
        let mut src = MemoryBacked::new(b"hello".to_vec());
        src.open().unwrap();
        let first = read_to_end(&mut src).unwrap();
        src.rewind().unwrap();
        let second = read_to_end(&mut src).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, b"hello");
    }

    #[test]
    fn read_before_open_is_an_error() {
        let mut src = MemoryBacked::new(b"hello".to_vec());
        let mut buf = [0u8; 4];
        assert!(src.read(&mut buf).is_err());
    }

    #[test]
    fn generated_adf_carries_resource_fork_not_data() {
        let attribs = FileAttribs::new("THING");
        let mut src = GeneratedADF::new(attribs, Some(b"rsrc".to_vec()));
        src.open().unwrap();
        let bytes = read_to_end(&mut src).unwrap();
        let parsed = crate::adf::parse(&bytes).unwrap();
        assert!(parsed.is_double);
        assert_eq!(parsed.data_fork, None);
        assert_eq!(parsed.resource_fork.as_deref(), Some(&b"rsrc"[..]));
    }

    struct DropLogger(std::cell::RefCell<Vec<String>>);
    impl crate::hook::AppHook for DropLogger {
        fn log(&self, _level: crate::hook::LogLevel, msg: &dyn std::fmt::Display) {
            self.0.borrow_mut().push(msg.to_string());
        }
    }

    #[test]
    fn leak_guard_logs_if_dropped_while_open() {
        let hook = DropLogger(std::cell::RefCell::new(Vec::new()));
        {
            let mut guard = LeakGuard::new(MemoryBacked::empty(), &hook, "leaky");
            guard.open().unwrap();
        }
        assert_eq!(hook.0.borrow().len(), 1);
    }

    #[test]
    fn leak_guard_silent_when_closed() {
        let hook = DropLogger(std::cell::RefCell::new(Vec::new()));
        {
            let mut guard = LeakGuard::new(MemoryBacked::empty(), &hook, "clean");
            guard.open().unwrap();
            guard.close().unwrap();
        }
        assert!(hook.0.borrow().is_empty());
    }
}
