//! Segment file naming and discovery
//!
//! Segments are named `{id:020}.wal` and ordered by the numeric id,
//! so a hand-renamed `7.wal` still sorts before `00000000000000000010.wal`.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, WalError};

/// File extension of segment files
pub const SEGMENT_EXTENSION: &str = "wal";

/// Id of the first segment in an empty directory
pub const FIRST_SEGMENT_ID: u64 = 1;

/// Path of the segment with the given id
pub fn segment_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(format!("{:020}.{}", id, SEGMENT_EXTENSION))
}

/// Parse a segment id from a file name
/// "00000000000000000042.wal" → Some(42)
pub fn parse_segment_id(path: &Path) -> Option<u64> {
    if path.extension()? != SEGMENT_EXTENSION {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

/// All segments in `dir`, sorted by id ascending
pub fn list_segments(dir: &Path) -> Result<Vec<(u64, PathBuf)>> {
    let mut segments = Vec::new();

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(segments),
        Err(e) => return Err(WalError::io("list segments", dir, e)),
    };

    for entry in entries {
        let entry = entry.map_err(|e| WalError::io("list segments", dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(id) = parse_segment_id(&path) {
            segments.push((id, path));
        }
    }

    segments.sort_by_key(|(id, _)| *id);
    Ok(segments)
}
