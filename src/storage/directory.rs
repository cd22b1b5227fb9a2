//! Directory-backed snapshot store
//!
//! Layout:
//! - `fingerprints.txt` newline-delimited fingerprints
//! - `pending.jsonl` one pending record per line, in queue order
//! - `tags.json` the shared tag map
//! - `producers.txt` and `sinks.txt` newline-delimited identities
//! - `manifest.json` written last, so a directory with a manifest is complete

use crate::item::Fingerprint;
use crate::storage::traits::{SnapshotStore, StorageError, StorageResult};
use crate::storage::{PendingRecord, SchedulerSnapshot, SnapshotManifest};
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const FINGERPRINTS_FILE: &str = "fingerprints.txt";
pub const PENDING_FILE: &str = "pending.jsonl";
pub const TAGS_FILE: &str = "tags.json";
pub const PRODUCERS_FILE: &str = "producers.txt";
pub const SINKS_FILE: &str = "sinks.txt";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Snapshot store rooted at a directory
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, file: &str) -> PathBuf {
        self.root.join(file)
    }

    /// Opens a file for reading, mapping absence to [`StorageError::MissingFile`]
    fn open(&self, file: &str) -> StorageResult<File> {
        let path = self.path(file);
        File::open(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::MissingFile(path),
            _ => StorageError::Io(e),
        })
    }

    fn write_lines<I, S>(&self, file: &str, lines: I) -> StorageResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut writer = BufWriter::new(File::create(self.path(file))?);
        for line in lines {
            writeln!(writer, "{}", line.as_ref())?;
        }
        writer.flush()?;
        Ok(())
    }

    fn read_lines(&self, file: &str) -> StorageResult<Vec<String>> {
        let reader = BufReader::new(self.open(file)?);
        let mut lines = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                lines.push(trimmed.to_string());
            }
        }
        Ok(lines)
    }

    fn read_pending(&self) -> StorageResult<Vec<PendingRecord>> {
        let reader = BufReader::new(self.open(PENDING_FILE)?);
        let mut records = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line).map_err(|e| StorageError::Malformed {
                file: PENDING_FILE.to_string(),
                line: index + 1,
                message: e.to_string(),
            })?;
            records.push(record);
        }
        Ok(records)
    }

    fn ensure_exists(&self) -> StorageResult<()> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(StorageError::MissingDirectory(self.root.clone()))
        }
    }
}

impl SnapshotStore for DirectoryStore {
    fn write_snapshot(&self, snapshot: &SchedulerSnapshot) -> StorageResult<SnapshotManifest> {
        fs::create_dir_all(&self.root)?;

        // Drop the old manifest first so an interrupted save is not mistaken for a complete one
        let manifest_path = self.path(MANIFEST_FILE);
        if manifest_path.exists() {
            fs::remove_file(&manifest_path)?;
        }

        self.write_lines(
            FINGERPRINTS_FILE,
            snapshot.fingerprints.iter().map(Fingerprint::as_str),
        )?;

        let mut pending = BufWriter::new(File::create(self.path(PENDING_FILE))?);
        for record in &snapshot.pending {
            serde_json::to_writer(&mut pending, record)?;
            pending.write_all(b"\n")?;
        }
        pending.flush()?;

        let mut tags = BufWriter::new(File::create(self.path(TAGS_FILE))?);
        serde_json::to_writer_pretty(&mut tags, &snapshot.tags)?;
        tags.flush()?;

        self.write_lines(PRODUCERS_FILE, &snapshot.producers)?;
        self.write_lines(SINKS_FILE, &snapshot.sinks)?;

        let manifest = snapshot.manifest();
        let mut file = BufWriter::new(File::create(&manifest_path)?);
        serde_json::to_writer_pretty(&mut file, &manifest)?;
        file.flush()?;

        tracing::debug!(dir = %self.root.display(), pending = manifest.pending, "Snapshot written");
        Ok(manifest)
    }

    fn read_snapshot(&self) -> StorageResult<SchedulerSnapshot> {
        self.ensure_exists()?;
        let manifest = self.read_manifest()?;

        let fingerprints = self
            .read_lines(FINGERPRINTS_FILE)?
            .into_iter()
            .map(Fingerprint::from_hex)
            .collect();
        let pending = self.read_pending()?;
        let tags: HashMap<String, Value> =
            serde_json::from_reader(BufReader::new(self.open(TAGS_FILE)?))?;

        Ok(SchedulerSnapshot {
            fingerprints,
            pending,
            tags,
            producers: self.read_lines(PRODUCERS_FILE)?,
            sinks: self.read_lines(SINKS_FILE)?,
            config_hash: manifest.config_hash,
        })
    }

    fn read_manifest(&self) -> StorageResult<SnapshotManifest> {
        self.ensure_exists()?;
        let manifest = serde_json::from_reader(BufReader::new(self.open(MANIFEST_FILE)?))?;
        Ok(manifest)
    }

    fn location(&self) -> &Path {
        &self.root
    }
}
