//! Append-only CSV cache of position metadata.
//!
//! Rows are `TokenID,Term,DueDate`. A missing file is created with just the
//! header; a malformed row fails the whole load. Entries are never updated once
//! written.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ClaimError;
use crate::gateway::PositionId;

const HEADER: [&str; 3] = ["TokenID", "Term", "DueDate"];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedPosition {
    #[serde(rename = "TokenID")]
    pub position_id: PositionId,
    #[serde(rename = "Term")]
    pub term: u16,
    #[serde(rename = "DueDate")]
    pub due_date: String,
}

#[derive(Debug)]
pub struct PositionCache {
    path: PathBuf,
    entries: HashMap<PositionId, CachedPosition>,
}

impl PositionCache {
    /// Loads the table at `path`, creating it with a header row if absent.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ClaimError> {
        let path = path.into();
        let is_empty = match std::fs::metadata(&path) {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => return Err(ClaimError::storage(&path, e)),
        };
        if is_empty {
            write_header(&path)?;
            log::info!("initialised position cache {}", path.display());
            return Ok(Self {
                path,
                entries: HashMap::new(),
            });
        }

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&path)
            .map_err(|e| ClaimError::storage(&path, e))?;
        let mut entries = HashMap::new();
        for row in reader.deserialize::<CachedPosition>() {
            let entry = row.map_err(|e| ClaimError::storage(&path, e))?;
            if entries.contains_key(&entry.position_id) {
                log::warn!(
                    "position cache {}: duplicate row for {} ignored",
                    path.display(),
                    entry.position_id
                );
                continue;
            }
            entries.insert(entry.position_id, entry);
        }
        log::info!(
            "loaded {} cached positions from {}",
            entries.len(),
            path.display()
        );
        Ok(Self { path, entries })
    }

    pub fn get(&self, id: PositionId) -> Option<&CachedPosition> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: PositionId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records `entry` in memory, then appends it to disk. A failed disk write is
    /// logged and the in-memory entry is kept for the rest of the run.
    pub fn append(&mut self, entry: CachedPosition) {
        if self.entries.contains_key(&entry.position_id) {
            return;
        }
        let id = entry.position_id;
        self.entries.insert(id, entry.clone());
        if let Err(e) = append_row(&self.path, &entry) {
            log::warn!(
                "position cache {}: failed to persist {}: {}",
                self.path.display(),
                id,
                e
            );
        }
    }
}

fn write_header(path: &Path) -> Result<(), ClaimError> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| ClaimError::storage(path, e))?;
    writer
        .write_record(HEADER)
        .map_err(|e| ClaimError::storage(path, e))?;
    writer.flush().map_err(|e| ClaimError::storage(path, e))
}

fn append_row(path: &Path, entry: &CachedPosition) -> Result<(), Box<dyn std::error::Error>> {
    let mut file: File = OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)?;
    // A hand-edited file may lack the final newline; don't glue the row onto it.
    if file.metadata()?.len() > 0 {
        let mut last = [0u8; 1];
        file.seek(SeekFrom::End(-1))?;
        file.read_exact(&mut last)?;
        if last[0] != b'\n' {
            file.write_all(b"\n")?;
        }
    }
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    writer.serialize(entry)?;
    writer.flush()?;
    Ok(())
}
