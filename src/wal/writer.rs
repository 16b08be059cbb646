//! Segment Writer
//!
//! Appends encoded records to the active segment through an in-memory
//! buffer, rotates to a new segment by size, and runs a background
//! thread that flushes the buffer on a fixed interval.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::BytesMut;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::config::Config;
use crate::error::{Result, WalError};

use super::segment::{list_segments, segment_path, FIRST_SEGMENT_ID};
use super::Record;

/// Writes records to the highest-numbered segment in a directory
///
/// ## Concurrency:
/// - `active`: shared with the flusher thread, which only ever `try_lock`s it
/// - All methods use `&self`
pub struct SegmentWriter {
    /// Directory holding the segments
    dir: PathBuf,

    /// Active segment state (file, offset, buffer)
    active: Arc<Mutex<ActiveSegment>>,

    /// Background flusher, taken on close
    flusher: Mutex<Option<Flusher>>,
}

/// Handle to the background flush thread
struct Flusher {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// Mutable writer state guarded by the writer lock
struct ActiveSegment {
    dir: PathBuf,
    path: PathBuf,
    id: u64,
    /// None once closed
    file: Option<File>,
    /// Logical end of the segment: bytes on disk plus bytes still buffered
    offset: u64,
    buf: BytesMut,
    buffer_bytes: usize,
    max_segment_bytes: u64,
    sync: bool,
    closed: bool,
}

impl SegmentWriter {
    /// Open the latest segment in `dir` for appending, creating segment 1 if
    /// the directory has none, and start the background flusher.
    pub fn open(dir: &Path, config: &Config) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .map_err(|e| WalError::io("create WAL directory", dir, e))?;

        let (id, path) = list_segments(dir)?
            .pop()
            .unwrap_or_else(|| (FIRST_SEGMENT_ID, segment_path(dir, FIRST_SEGMENT_ID)));
        let (file, offset) = open_for_append(&path)?;

        debug!(segment = id, offset, path = %path.display(), "opened active WAL segment");

        let active = Arc::new(Mutex::new(ActiveSegment {
            dir: dir.to_path_buf(),
            path,
            id,
            file: Some(file),
            offset,
            buf: BytesMut::with_capacity(config.buffer_bytes),
            buffer_bytes: config.buffer_bytes,
            max_segment_bytes: config.max_segment_bytes,
            sync: config.sync,
            closed: false,
        }));

        let flusher = Flusher::spawn(dir, Arc::clone(&active), config.flush_interval)?;

        Ok(Self {
            dir: dir.to_path_buf(),
            active,
            flusher: Mutex::new(Some(flusher)),
        })
    }

    /// Append a record, returning its sequence number
    ///
    /// Rotates first if the record would not fit in the active segment.
    /// Flushes immediately when configured for synchronous durability or
    /// when the buffer is full.
    ///
    /// On error the record is not in the log: nothing of it stays buffered
    /// and any partly written bytes are cut off before the next flush.
    pub fn write(&self, record: &Record) -> Result<u64> {
        self.append(record, false)
    }

    /// Append a record and flush it, together with anything buffered
    /// before it, before returning
    pub fn write_sync(&self, record: &Record) -> Result<u64> {
        self.append(record, true)
    }

    fn append(&self, record: &Record, force_flush: bool) -> Result<u64> {
        let encoded = record.encode()?;

        let mut active = self.active.lock();
        active.append(&encoded, force_flush)?;

        trace!(
            sequence = record.sequence,
            txn = record.transaction_id,
            len = encoded.len(),
            "appended WAL record"
        );
        Ok(record.sequence)
    }

    /// Write buffered bytes to the segment file (and fsync if configured)
    pub fn flush(&self) -> Result<()> {
        self.active.lock().flush_buffer()
    }

    /// Stop the flusher, flush what is left and close the segment file
    ///
    /// Idempotent. Writes after close fail with `WalError::Closed`.
    pub fn close(&self) -> Result<()> {
        {
            let mut active = self.active.lock();
            if active.closed {
                return Ok(());
            }
            active.closed = true;
        }

        // Signal, then join; the flusher does one last flush on its way out.
        if let Some(flusher) = self.flusher.lock().take() {
            let _ = flusher.stop.send(());
            if flusher.handle.join().is_err() {
                warn!(dir = %self.dir.display(), "WAL flusher thread panicked");
            }
        }

        let mut active = self.active.lock();
        active.flush_buffer()?;
        if let Some(file) = active.file.take() {
            if active.sync {
                file.sync_all()
                    .map_err(|e| WalError::io("sync segment", &active.path, e))?;
            }
        }

        debug!(segment = active.id, offset = active.offset, "closed WAL writer");
        Ok(())
    }

    /// Cut the log at `offset` within `segment_id`
    ///
    /// Removes every newer segment, truncates the given one and makes it the
    /// active segment. Anything still buffered is discarded.
    pub fn truncate_tail(&self, segment_id: u64, offset: u64) -> Result<()> {
        let mut active = self.active.lock();
        if active.closed {
            return Err(WalError::Closed);
        }
        active.buf.clear();
        active.file = None;

        let mut target = segment_path(&self.dir, segment_id);
        for (id, path) in list_segments(&self.dir)? {
            if id > segment_id {
                std::fs::remove_file(&path)
                    .map_err(|e| WalError::io("remove segment", &path, e))?;
                warn!(segment = id, "removed WAL segment past damaged record");
            } else if id == segment_id {
                target = path;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&target)
            .map_err(|e| WalError::io("open segment", &target, e))?;
        file.set_len(offset)
            .map_err(|e| WalError::io("truncate segment", &target, e))?;
        file.sync_all()
            .map_err(|e| WalError::io("sync segment", &target, e))?;
        drop(file);

        let (file, offset) = open_for_append(&target)?;
        active.id = segment_id;
        active.path = target;
        active.file = Some(file);
        active.offset = offset;

        warn!(segment = segment_id, offset, "truncated WAL tail");
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Id of the segment currently accepting appends
    pub fn segment_id(&self) -> u64 {
        self.active.lock().id
    }

    /// Logical size of the active segment, buffered bytes included
    pub fn offset(&self) -> u64 {
        self.active.lock().offset
    }

    /// Bytes waiting in the write buffer
    pub fn buffered_len(&self) -> usize {
        self.active.lock().buf.len()
    }

    /// Directory holding the segments
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Drop for SegmentWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "failed to close WAL writer on drop");
        }
    }
}

impl ActiveSegment {
    fn append(&mut self, encoded: &[u8], force_flush: bool) -> Result<()> {
        if self.closed {
            return Err(WalError::Closed);
        }

        let len = encoded.len() as u64;
        // An empty segment takes the record whatever its size.
        if self.offset > 0 && self.offset + len > self.max_segment_bytes {
            self.rotate()?;
        }

        let buffered = self.buf.len();
        self.buf.extend_from_slice(encoded);
        self.offset += len;

        if force_flush || self.sync || self.buf.len() >= self.buffer_bytes {
            if let Err(e) = self.flush_buffer() {
                // Earlier records stay buffered; this one is dropped.
                self.buf.truncate(buffered);
                self.offset -= len;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Bytes of the active segment known to be written in full
    fn durable_len(&self) -> u64 {
        self.offset - self.buf.len() as u64
    }

    /// Write the buffer out, clearing it only once every byte (and the
    /// fsync, when configured) has succeeded
    ///
    /// A failure drops the file handle; the next flush reopens the segment
    /// and cuts it back to `durable_len` before writing the buffer again.
    fn flush_buffer(&mut self) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        if self.file.is_none() {
            self.repair()?;
        }
        let Some(file) = self.file.as_mut() else {
            return Err(WalError::Closed);
        };

        if let Err(e) = write_out(file, &self.buf, self.sync, &self.path) {
            self.file = None;
            return Err(e);
        }
        self.buf.clear();
        Ok(())
    }

    /// Reopen the active segment after a failed flush, discarding any
    /// partly written tail
    fn repair(&mut self) -> Result<()> {
        let durable = self.durable_len();
        let (file, _) = open_for_append(&self.path)?;
        file.set_len(durable)
            .map_err(|e| WalError::io("truncate segment", &self.path, e))?;

        warn!(segment = self.id, offset = durable, "reopened WAL segment after failed flush");
        self.file = Some(file);
        Ok(())
    }

    /// Seal the active segment and continue in `id + 1`
    fn rotate(&mut self) -> Result<()> {
        self.flush_buffer()?;
        self.file = None;

        let next = self.id + 1;
        let path = segment_path(&self.dir, next);
        let (file, offset) = open_for_append(&path)?;

        debug!(from = self.id, to = next, "rotated WAL segment");

        self.id = next;
        self.path = path;
        self.file = Some(file);
        self.offset = offset;
        Ok(())
    }
}

impl Flusher {
    fn spawn(dir: &Path, active: Arc<Mutex<ActiveSegment>>, interval: Duration) -> Result<Self> {
        let (stop, stop_rx) = channel::bounded(1);
        let handle = thread::Builder::new()
            .name("wal-flusher".to_string())
            .spawn(move || run_flusher(active, stop_rx, interval))
            .map_err(|e| WalError::io("spawn flusher", dir, e))?;

        Ok(Self { stop, handle })
    }
}

fn run_flusher(active: Arc<Mutex<ActiveSegment>>, stop: Receiver<()>, interval: Duration) {
    let ticker = channel::tick(interval);

    loop {
        let stopping = channel::select! {
            recv(stop) -> _ => true,
            recv(ticker) -> _ => false,
        };

        if stopping {
            if let Err(e) = active.lock().flush_buffer() {
                warn!(error = %e, "final background flush failed");
            }
            return;
        }

        // Never wait on a foreground writer; try again next tick.
        match active.try_lock() {
            Some(mut segment) => {
                if let Err(e) = segment.flush_buffer() {
                    warn!(error = %e, "background flush failed");
                }
            }
            None => trace!("writer busy, skipping background flush"),
        }
    }
}

fn write_out(file: &mut File, buf: &[u8], sync: bool, path: &Path) -> Result<()> {
    file.write_all(buf)
        .map_err(|e| WalError::io("flush segment", path, e))?;
    if sync {
        file.sync_data()
            .map_err(|e| WalError::io("sync segment", path, e))?;
    }
    Ok(())
}

fn open_for_append(path: &Path) -> Result<(File, u64)> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| WalError::io("open segment", path, e))?;
    let offset = file
        .seek(SeekFrom::End(0))
        .map_err(|e| WalError::io("seek segment", path, e))?;
    Ok((file, offset))
}
