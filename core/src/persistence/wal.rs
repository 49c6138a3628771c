use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use super::fsync::{ensure_parent_dir, sync_parent_dir, truncate_file_fully_synced};
use super::{PersistenceError, WalEntry};

pub(super) fn append_wal(
    path: &Path,
    entry: &WalEntry,
    sync_on_write: bool,
) -> Result<(), PersistenceError> {
    append_wal_batch(path, std::slice::from_ref(entry), sync_on_write)
}

pub(super) fn append_wal_batch(
    path: &Path,
    entries: &[WalEntry],
    sync_on_write: bool,
) -> Result<(), PersistenceError> {
    if entries.is_empty() {
        return Ok(());
    }
    ensure_parent_dir(path)?;

    let existed = path.exists();
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut buffer = Vec::new();
    for entry in entries {
        serde_json::to_writer(&mut buffer, entry)?;
        buffer.push(b'\n');
    }
    file.write_all(&buffer)?;
    if sync_on_write {
        file.flush()?;
        file.sync_data()?;
    }
    if !existed {
        sync_parent_dir(path)?;
    }
    Ok(())
}

pub(super) fn truncate_wal(path: &Path) -> Result<(), PersistenceError> {
    ensure_parent_dir(path)?;
    truncate_file_fully_synced(path)?;
    Ok(())
}

/// Feeds every entry to `apply` in log order and returns how many were
/// read. A final line cut short by a crash is ignored; any other bad line
/// fails the replay.
pub(super) fn replay_wal(
    path: &Path,
    mut apply: impl FnMut(&WalEntry) -> Result<(), PersistenceError>,
) -> Result<usize, PersistenceError> {
    if !path.exists() {
        return Ok(0);
    }

    let mut reader = BufReader::new(File::open(path)?);
    let mut line = String::new();
    let mut line_number = 0usize;
    let mut read = 0usize;

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        line_number += 1;

        let has_trailing_newline = line.ends_with('\n');
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let entry: WalEntry = match serde_json::from_str(trimmed) {
            Ok(entry) => entry,
            Err(error) => {
                let torn_tail = !has_trailing_newline
                    && matches!(error.classify(), serde_json::error::Category::Eof)
                    && reader
                        .fill_buf()
                        .map(|remaining| remaining.is_empty())
                        .unwrap_or(false);
                if torn_tail {
                    tracing::warn!(line = line_number, "ignoring torn wal tail");
                    break;
                }
                return Err(PersistenceError::InvalidData(format!(
                    "invalid wal line {line_number}: {error}"
                )));
            }
        };

        apply(&entry).map_err(|error| {
            PersistenceError::InvalidData(format!(
                "failed to apply wal line {line_number}: {error}"
            ))
        })?;
        read += 1;
    }

    Ok(read)
}
