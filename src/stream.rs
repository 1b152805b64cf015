//! Unbuffered byte stream over an OS descriptor
//!
//! The supervisor hands each pipe to a worker thread and keeps a second
//! reference so it can close the stream from outside during cleanup.
//! Closing drops the stream's own handle; a read or write already in
//! flight keeps the descriptor alive until it returns, so the descriptor
//! number is never recycled under a running syscall. Such a call only
//! returns once the other end of the pipe goes away, which is why the
//! supervisor kills the tool's process group before joining its workers.

use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::MediaError;

/// Byte stream with an explicit, idempotent close
#[derive(Debug)]
pub struct ByteStream {
    handle: Mutex<Option<Arc<File>>>,
}

impl ByteStream {
    /// Wrap an open file or pipe end
    pub fn new(file: File) -> Self {
        Self {
            handle: Mutex::new(Some(Arc::new(file))),
        }
    }

    /// Wrap any owned descriptor, e.g. `ChildStdin` or `ChildStderr`
    #[cfg(unix)]
    pub fn from_fd(fd: impl Into<std::os::fd::OwnedFd>) -> Self {
        Self::new(File::from(fd.into()))
    }

    /// Wrap any owned handle, e.g. `ChildStdin` or `ChildStderr`
    #[cfg(windows)]
    pub fn from_fd(handle: impl Into<std::os::windows::io::OwnedHandle>) -> Self {
        Self::new(File::from(handle.into()))
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<File>>> {
        // The guarded value is a plain Option, a panic elsewhere cannot corrupt it
        self.handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn acquire(&self, operation: &str) -> Result<Arc<File>, MediaError> {
        self.lock()
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| MediaError::stream_closed(operation))
    }

    /// Read up to `buf.len()` bytes; returns 0 at end-of-stream
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, MediaError> {
        let file = self.acquire("Read")?;
        let mut file: &File = &file;
        loop {
            match file.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Write some of `buf`; returns the number of bytes written
    pub fn write(&self, buf: &[u8]) -> Result<usize, MediaError> {
        let file = self.acquire("Write")?;
        let mut file: &File = &file;
        loop {
            match file.write(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Write the whole buffer, re-checking the closed state between writes
    pub fn write_all(&self, mut buf: &[u8]) -> Result<(), MediaError> {
        while !buf.is_empty() {
            let n = self.write(buf)?;
            if n == 0 {
                return Err(std::io::Error::from(ErrorKind::WriteZero).into());
            }
            buf = &buf[n..];
        }
        Ok(())
    }

    /// Release the descriptor; later calls are no-ops
    pub fn close(&self) {
        self.lock().take();
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.lock().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MediaErrorKind;
    use std::io::{Seek, SeekFrom};

    fn scratch_file(contents: &[u8]) -> File {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(contents).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        file
    }

    #[test]
    fn test_read_until_end_of_stream() {
        let stream = ByteStream::new(scratch_file(b"hello world"));
        let mut buf = [0u8; 4];
        let mut out = Vec::new();
        loop {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            assert!(n <= 4);
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn test_write_then_read_back() {
        let file = tempfile::tempfile().unwrap();
        let reader = file.try_clone().unwrap();
        let stream = ByteStream::new(file);
        stream.write_all(b"chunk").unwrap();
        stream.close();

        let mut reader = reader;
        reader.seek(SeekFrom::Start(0)).unwrap();
        let mut text = String::new();
        reader.read_to_string(&mut text).unwrap();
        assert_eq!(text, "chunk");
    }

    #[test]
    fn test_closed_stream_rejects_io() {
        let stream = ByteStream::new(scratch_file(b"data"));
        assert!(!stream.is_closed());
        stream.close();
        assert!(stream.is_closed());

        let mut buf = [0u8; 4];
        let err = stream.read(&mut buf).unwrap_err();
        assert_eq!(err.kind, MediaErrorKind::StreamClosed);
        let err = stream.write(b"x").unwrap_err();
        assert_eq!(err.kind, MediaErrorKind::StreamClosed);
    }

    #[test]
    fn test_close_is_idempotent() {
        let stream = ByteStream::new(scratch_file(b""));
        stream.close();
        stream.close();
        assert!(stream.is_closed());
    }

    #[test]
    fn test_close_from_another_thread() {
        let stream = Arc::new(ByteStream::new(scratch_file(b"abc")));
        let remote = Arc::clone(&stream);
        std::thread::spawn(move || remote.close()).join().unwrap();

        let mut buf = [0u8; 3];
        assert!(stream.read(&mut buf).is_err());
    }
}
