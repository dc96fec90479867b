//! Queue-depth-one I/O ring for log file writes.
//!
//! Each WAL log owns one [`IoRing`] and issues at most one write at a
//! time: either submit-and-wait (blocking flush) or submit-and-forget
//! (watermark flush). Files without a raw descriptor - the in-memory and
//! simulated backends - take a synchronous positional-write path through
//! the same interface, so the engine code is identical in production and
//! under the simulation harness.

#![allow(unsafe_code)]

use crate::error::{EngineError, EngineResult};
use duokv_storage::VfsFile;
use io_uring::{opcode, types, IoUring};
use std::io;
use std::os::unix::io::RawFd;

/// Submission queue depth. One in-flight write per log is all the WAL's
/// flush discipline requires.
const RING_DEPTH: u32 = 1;

/// A thin submission/completion wrapper around the kernel ring.
///
/// # Buffer validity
///
/// For `wait = false` submissions the caller must keep the buffer region
/// unchanged until the next call that drains the ring (`submit_write`,
/// `fsync`, or `drain`). The WAL upholds this by never reusing staging
/// space while a submission is outstanding.
pub struct IoRing {
    ring: Option<IoUring>,
    in_flight: bool,
}

impl IoRing {
    /// Creates a ring, degrading to the synchronous path when the kernel
    /// does not support `io_uring`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ring: IoUring::new(RING_DEPTH).ok(),
            in_flight: false,
        }
    }

    /// Returns whether kernel-ring submission is available.
    #[must_use]
    pub fn is_kernel_backed(&self) -> bool {
        self.ring.is_some()
    }

    /// Submits a write of `buf` at `file_offset`.
    ///
    /// With `wait = true` the call returns once the write completed. With
    /// `wait = false` it returns after submission; a failure of the write
    /// surfaces on the next draining call.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Io`] when the submission or completion
    /// reports a negative status, or the storage error of the fallback
    /// path.
    pub fn submit_write(
        &mut self,
        file: &mut dyn VfsFile,
        buf: &[u8],
        file_offset: u64,
        wait: bool,
    ) -> EngineResult<()> {
        match file.raw_fd() {
            Some(fd) if self.ring.is_some() => self.submit_kernel_write(fd, buf, file_offset, wait),
            _ => {
                file.write_at(file_offset, buf)?;
                Ok(())
            }
        }
    }

    fn submit_kernel_write(
        &mut self,
        fd: RawFd,
        buf: &[u8],
        file_offset: u64,
        wait: bool,
    ) -> EngineResult<()> {
        self.drain()?;
        let Some(ring) = self.ring.as_mut() else {
            return Ok(());
        };

        let entry = opcode::Write::new(types::Fd(fd), buf.as_ptr(), buf.len() as u32)
            .offset(file_offset)
            .build();

        // Safety: the buffer outlives the submission. For wait = false the
        // caller contract (see type docs) keeps the region stable until the
        // next drain.
        unsafe {
            ring.submission()
                .push(&entry)
                .map_err(|_| io::Error::new(io::ErrorKind::Other, "submission queue full"))?;
        }

        if wait {
            Self::complete_one(ring)?;
        } else {
            ring.submit()?;
            self.in_flight = true;
        }

        Ok(())
    }

    /// Syncs the file's data to durable storage through the ring.
    ///
    /// # Errors
    ///
    /// Returns an error if a pending write or the sync itself failed.
    pub fn fsync(&mut self, file: &mut dyn VfsFile) -> EngineResult<()> {
        let fd = match file.raw_fd() {
            Some(fd) if self.ring.is_some() => fd,
            _ => {
                file.sync()?;
                return Ok(());
            }
        };

        self.drain()?;
        let Some(ring) = self.ring.as_mut() else {
            return Ok(());
        };

        let entry = opcode::Fsync::new(types::Fd(fd)).build();
        // Safety: fsync entries reference no caller memory.
        unsafe {
            ring.submission()
                .push(&entry)
                .map_err(|_| io::Error::new(io::ErrorKind::Other, "submission queue full"))?;
        }
        Self::complete_one(ring)?;
        Ok(())
    }

    /// Waits for an outstanding submit-and-forget write, if any.
    ///
    /// # Errors
    ///
    /// Surfaces the deferred failure of that write.
    pub fn drain(&mut self) -> EngineResult<()> {
        if !self.in_flight {
            return Ok(());
        }
        self.in_flight = false;
        if let Some(ring) = self.ring.as_mut() {
            Self::complete_one(ring)?;
        }
        Ok(())
    }

    fn complete_one(ring: &mut IoUring) -> EngineResult<()> {
        ring.submit_and_wait(1)?;
        if let Some(cqe) = ring.completion().next() {
            if cqe.result() < 0 {
                return Err(EngineError::Io(io::Error::from_raw_os_error(-cqe.result())));
            }
        }
        Ok(())
    }

    /// Releases the ring. Pending completions are waited for first.
    pub fn close(mut self) -> EngineResult<()> {
        self.drain()
    }
}

impl Default for IoRing {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for IoRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoRing")
            .field("kernel_backed", &self.ring.is_some())
            .field("in_flight", &self.in_flight)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duokv_storage::{FileVfs, MemVfs, Vfs};
    use std::path::Path;
    use tempfile::tempdir;

    #[test]
    fn sync_fallback_for_memory_files() {
        let vfs = MemVfs::new();
        let mut file = vfs.open(Path::new("a.bin")).unwrap();
        let mut ring = IoRing::new();

        ring.submit_write(file.as_mut(), b"hello", 0, true).unwrap();
        ring.submit_write(file.as_mut(), b" world", 5, false)
            .unwrap();
        ring.fsync(file.as_mut()).unwrap();

        assert_eq!(&file.read_at(0, 11).unwrap(), b"hello world");
    }

    #[test]
    fn kernel_write_and_wait() {
        let dir = tempdir().unwrap();
        let vfs = FileVfs::new();
        let mut file = vfs.open(&dir.path().join("ring.bin")).unwrap();
        let mut ring = IoRing::new();

        ring.submit_write(file.as_mut(), b"ring data", 0, true)
            .unwrap();
        ring.fsync(file.as_mut()).unwrap();

        // The handle's size cache does not see ring writes; reopen to read.
        let reopened = vfs.open(&dir.path().join("ring.bin")).unwrap();
        assert_eq!(&reopened.read_at(0, 9).unwrap(), b"ring data");
    }

    #[test]
    fn fire_and_forget_then_drain() {
        let dir = tempdir().unwrap();
        let vfs = FileVfs::new();
        let mut file = vfs.open(&dir.path().join("ring.bin")).unwrap();
        let mut ring = IoRing::new();

        let payload = b"deferred write".to_vec();
        ring.submit_write(file.as_mut(), &payload, 0, false).unwrap();
        ring.drain().unwrap();
        ring.fsync(file.as_mut()).unwrap();

        let reopened = vfs.open(&dir.path().join("ring.bin")).unwrap();
        assert_eq!(&reopened.read_at(0, payload.len()).unwrap(), &payload);
    }

    #[test]
    fn write_at_nonzero_offset() {
        let dir = tempdir().unwrap();
        let vfs = FileVfs::new();
        let mut file = vfs.open(&dir.path().join("ring.bin")).unwrap();
        let mut ring = IoRing::new();

        ring.submit_write(file.as_mut(), b"aaaa", 0, true).unwrap();
        ring.submit_write(file.as_mut(), b"bb", 2, true).unwrap();
        ring.fsync(file.as_mut()).unwrap();

        let reopened = vfs.open(&dir.path().join("ring.bin")).unwrap();
        assert_eq!(&reopened.read_at(0, 4).unwrap(), b"aabb");
    }
}
