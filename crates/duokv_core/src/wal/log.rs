//! The dual write-ahead log.
//!
//! Each log stages appends in a fixed in-memory buffer and hands filled
//! regions to its I/O ring. The buffer is reused ring-style: when an
//! append does not fit, the write cursor wraps to the start if that space
//! has already been flushed, and falls back to a blocking flush otherwise.
//! The backing file itself is append-only; record offsets are file
//! offsets and grow monotonically.

use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::ioring::IoRing;
use crate::wal::record::{
    encode_intent, wall_clock_ns, CompletionRecord, CompletionStatus, Operation,
    MAX_KEY_LEN, MAX_VALUE_LEN,
};
use crate::wal::replay;
use duokv_storage::{Vfs, VfsFile};
use std::path::{Path, PathBuf};

/// One staged log: an in-memory ring over an append-only file.
struct LogBuffer {
    path: PathBuf,
    file: Box<dyn VfsFile>,
    ring: IoRing,
    buf: Vec<u8>,
    /// Next append position in the buffer.
    write_offset: usize,
    /// Buffer position up to which bytes have been handed to the file.
    flushed_to: usize,
    /// High end of the pending tail while the cursor is wrapped.
    wrap_point: Option<usize>,
    /// File offset where the next flush writes.
    file_base: u64,
    /// Bytes appended since the last flush.
    pending_len: usize,
    watermark: usize,
    sync_on_flush: bool,
}

impl LogBuffer {
    fn open(vfs: &dyn Vfs, path: &Path, config: &Config) -> EngineResult<Self> {
        let file = vfs.open(path)?;
        let file_base = file.size()?;

        let mut buf = Vec::new();
        buf.try_reserve_exact(config.buffer_size)
            .map_err(|_| EngineError::OutOfMemory {
                requested: config.buffer_size,
            })?;
        buf.resize(config.buffer_size, 0);

        Ok(Self {
            path: path.to_path_buf(),
            file,
            ring: IoRing::new(),
            buf,
            write_offset: 0,
            flushed_to: 0,
            wrap_point: None,
            file_base,
            pending_len: 0,
            watermark: config.watermark_bytes(),
            sync_on_flush: config.sync_on_flush,
        })
    }

    /// Returns whether no reusable space remains without flushing.
    fn is_full(&self) -> bool {
        match self.wrap_point {
            Some(_) => self.write_offset >= self.flushed_to,
            None => self.write_offset >= self.buf.len() && self.flushed_to == 0,
        }
    }

    /// Appends `bytes` and returns the file offset where the record begins.
    fn append(&mut self, bytes: &[u8]) -> EngineResult<u32> {
        let total = bytes.len();
        if total > self.buf.len() {
            return Err(EngineError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("record of {total} bytes exceeds the staging buffer"),
            )));
        }

        match self.wrap_point {
            None => {
                if self.write_offset + total > self.buf.len() {
                    if self.flushed_to >= total {
                        // The head of the buffer is already on disk; reuse
                        // it. Any outstanding submission must land before
                        // its bytes are overwritten.
                        self.ring.drain()?;
                        self.wrap_point = Some(self.write_offset);
                        self.write_offset = 0;
                    } else {
                        self.flush_and_reset()?;
                    }
                }
            }
            Some(_) => {
                if self.write_offset + total > self.flushed_to {
                    self.flush_and_reset()?;
                }
            }
        }

        let record_offset = u32::try_from(self.file_base + self.pending_len as u64)
            .map_err(|_| EngineError::LogFull {
                path: self.path.display().to_string(),
            })?;

        let old_write = self.write_offset;
        self.buf[old_write..old_write + total].copy_from_slice(bytes);
        self.write_offset = old_write + total;
        self.pending_len += total;

        if self.wrap_point.is_none() && old_write < self.watermark && self.write_offset >= self.watermark
        {
            self.flush_internal(false)?;
        }

        Ok(record_offset)
    }

    /// Hands all pending bytes to the file. Blocking flushes wait for the
    /// writes and sync; fire-and-forget flushes return after submission.
    fn flush_internal(&mut self, wait: bool) -> EngineResult<()> {
        if self.pending_len > 0 {
            let spans: [(usize, usize); 2] = match self.wrap_point {
                Some(wp) => [(self.flushed_to, wp), (0, self.write_offset)],
                None => [(self.flushed_to, self.write_offset), (0, 0)],
            };

            let mut file_offset = self.file_base;
            for &(start, end) in spans.iter().filter(|&&(start, end)| end > start) {
                self.ring
                    .submit_write(self.file.as_mut(), &self.buf[start..end], file_offset, wait)?;
                file_offset += (end - start) as u64;
            }

            self.file_base += self.pending_len as u64;
            self.pending_len = 0;
        }

        self.flushed_to = self.write_offset;
        self.wrap_point = None;

        if wait {
            self.ring.drain()?;
            if self.sync_on_flush {
                self.ring.fsync(self.file.as_mut())?;
            }
        }

        Ok(())
    }

    /// Blocking flush followed by a full buffer reset, used when an append
    /// finds no reusable space.
    fn flush_and_reset(&mut self) -> EngineResult<()> {
        self.flush_internal(true)?;
        self.write_offset = 0;
        self.flushed_to = 0;
        Ok(())
    }

    /// Reads the entire durable contents of the log file.
    fn read_file(&self) -> EngineResult<Vec<u8>> {
        let size = self.file.size()?;
        Ok(self.file.read_at(0, size as usize)?)
    }

    fn close(mut self) -> EngineResult<()> {
        self.flush_internal(true)?;
        self.ring.close()
    }
}

/// The dual write-ahead log: one intent log, one completion log, each
/// with its own staging buffer and I/O ring.
pub struct DualWal {
    intent: LogBuffer,
    completion: LogBuffer,
}

impl DualWal {
    /// Opens (creating if absent) both log files.
    ///
    /// # Errors
    ///
    /// Returns an error if either file cannot be opened or a staging
    /// buffer cannot be allocated.
    pub fn open(
        vfs: &dyn Vfs,
        intent_path: &Path,
        completion_path: &Path,
        config: &Config,
    ) -> EngineResult<Self> {
        Ok(Self {
            intent: LogBuffer::open(vfs, intent_path, config)?,
            completion: LogBuffer::open(vfs, completion_path, config)?,
        })
    }

    /// Appends an intent record and returns the offset where it begins in
    /// the intent log.
    ///
    /// # Errors
    ///
    /// Returns `KeyTooLarge` / `ValueTooLarge` for payloads the record
    /// format cannot carry, or an I/O error from an overflow flush.
    pub fn append_intent(
        &mut self,
        op: Operation,
        key: &[u8],
        value: &[u8],
    ) -> EngineResult<u32> {
        if key.len() > MAX_KEY_LEN {
            return Err(EngineError::KeyTooLarge {
                len: key.len(),
                max: MAX_KEY_LEN,
            });
        }
        if value.len() > MAX_VALUE_LEN {
            return Err(EngineError::ValueTooLarge {
                len: value.len(),
                max: MAX_VALUE_LEN,
            });
        }

        let record = encode_intent(op, key, value, wall_clock_ns());
        self.intent.append(&record)
    }

    /// Appends a completion record referencing `intent_offset`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error from an overflow flush.
    pub fn append_completion(
        &mut self,
        intent_offset: u32,
        status: CompletionStatus,
        data_crc: u16,
    ) -> EngineResult<()> {
        let record = CompletionRecord::encode(intent_offset, status, data_crc, wall_clock_ns());
        self.completion.append(&record)?;
        Ok(())
    }

    /// Blocking flush of both logs. On return every accepted append is
    /// persisted.
    ///
    /// # Errors
    ///
    /// Returns the first I/O failure from either log.
    pub fn flush(&mut self) -> EngineResult<()> {
        self.intent.flush_internal(true)?;
        self.completion.flush_internal(true)?;
        Ok(())
    }

    /// Replays the durable contents of both logs.
    ///
    /// Visits every recoverable intent record in file order as
    /// `visit(op, key, value, completed)`, where `completed` is true iff
    /// a successful completion references the record and its data CRC
    /// matches. Returns the number of structurally invalid records
    /// observed; corruption is counted, never raised.
    ///
    /// # Errors
    ///
    /// Returns an error only for I/O failures while reading the files.
    pub fn replay<F>(&mut self, mut visit: F) -> EngineResult<u64>
    where
        F: FnMut(Operation, &[u8], &[u8], bool),
    {
        let intent_bytes = self.intent.read_file()?;
        let completion_bytes = self.completion.read_file()?;
        Ok(replay::scan(
            &intent_bytes,
            &completion_bytes,
            wall_clock_ns(),
            &mut visit,
        ))
    }

    /// Returns whether either staging buffer has exhausted its reusable
    /// space.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.intent.is_full() || self.completion.is_full()
    }

    /// Flushes and releases both logs.
    ///
    /// # Errors
    ///
    /// Returns the first failure from either log's final flush.
    pub fn close(self) -> EngineResult<()> {
        self.intent.close()?;
        self.completion.close()
    }
}

impl std::fmt::Debug for DualWal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DualWal")
            .field("intent_path", &self.intent.path)
            .field("completion_path", &self.completion.path)
            .field("intent_pending", &self.intent.pending_len)
            .field("completion_pending", &self.completion.pending_len)
            .finish()
    }
}
