//! Segment Reader
//!
//! Presents every segment in a directory as one ordered stream of records.
//! There is no index: every full pass starts again from the first segment.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::error::{Result, WalError};

use super::record::payload_len;
use super::segment::list_segments;
use super::{Record, HEADER_SIZE};

/// Sequential reader over all segments of a WAL directory
pub struct SegmentReader {
    /// Directory holding the segments
    dir: PathBuf,
    /// Segments sorted by id
    segments: Vec<(u64, PathBuf)>,
    /// Index into `segments` of the segment being read
    current: usize,
    /// Open handle on `segments[current]`, opened lazily
    file: Option<BufReader<File>>,
    /// Offset of the next record within the current segment
    offset: u64,
}

impl SegmentReader {
    /// Enumerate the segments in `dir`; nothing is opened until the first read
    pub fn open(dir: &Path) -> Result<Self> {
        let segments = list_segments(dir)?;
        trace!(count = segments.len(), dir = %dir.display(), "enumerated WAL segments");

        Ok(Self {
            dir: dir.to_path_buf(),
            segments,
            current: 0,
            file: None,
            offset: 0,
        })
    }

    /// Read the next record
    ///
    /// Returns:
    /// - `Ok(Some(record))`: next record in log order
    /// - `Ok(None)`: every segment is exhausted
    /// - `Err(Truncated)`: a header or payload ends early
    /// - `Err(Corruption)`: the bytes do not decode
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            if self.file.is_none() {
                let Some((_, path)) = self.segments.get(self.current) else {
                    return Ok(None);
                };
                let file = File::open(path).map_err(|e| WalError::io("open segment", path, e))?;
                self.file = Some(BufReader::new(file));
                self.offset = 0;
            }

            let path = &self.segments[self.current].1;
            let Some(file) = self.file.as_mut() else {
                continue;
            };

            let mut header = [0u8; HEADER_SIZE];
            let read = read_up_to(file, &mut header)
                .map_err(|e| WalError::io("read record header", path, e))?;

            if read == 0 {
                // Clean end of this segment; move on to the next one.
                self.file = None;
                self.current += 1;
                continue;
            }
            if read < HEADER_SIZE {
                return Err(WalError::Truncated {
                    path: path.clone(),
                    offset: self.offset,
                    needed: HEADER_SIZE,
                    found: read,
                });
            }

            let total = HEADER_SIZE + payload_len(&header);
            let mut buf = vec![0u8; total];
            buf[..HEADER_SIZE].copy_from_slice(&header);

            let read = read_up_to(file, &mut buf[HEADER_SIZE..])
                .map_err(|e| WalError::io("read record payload", path, e))?;
            if read < total - HEADER_SIZE {
                return Err(WalError::Truncated {
                    path: path.clone(),
                    offset: self.offset,
                    needed: total,
                    found: HEADER_SIZE + read,
                });
            }

            let record = Record::decode(&buf).map_err(|e| WalError::Corruption {
                path: path.clone(),
                offset: self.offset,
                source: Box::new(e),
            })?;

            self.offset += total as u64;
            return Ok(Some(record));
        }
    }

    /// Rewind to the first segment
    ///
    /// The directory is enumerated again so segments created by rotation
    /// since the last pass are included.
    pub fn seek_to_start(&mut self) -> Result<()> {
        self.close();
        self.segments = list_segments(&self.dir)?;
        self.current = 0;
        self.offset = 0;
        Ok(())
    }

    /// Segment id and offset of the next record to be read
    ///
    /// After an error this is the start of the offending record.
    /// `None` once the log is exhausted.
    pub fn position(&self) -> Option<(u64, u64)> {
        self.segments
            .get(self.current)
            .map(|(id, _)| (*id, self.offset))
    }

    /// Iterate over the remaining records
    pub fn records(&mut self) -> Records<'_> {
        Records { reader: self }
    }

    /// Release the open segment handle
    pub fn close(&mut self) {
        self.file = None;
    }

    /// Number of segments seen by the last enumeration
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }
}

/// Iterator over the records of a [`SegmentReader`]
pub struct Records<'a> {
    reader: &'a mut SegmentReader,
}

impl Iterator for Records<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.next_record().transpose()
    }
}

/// Fill `buf` as far as the stream allows, returning the bytes read
fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
