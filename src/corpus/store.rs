use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

use crate::core::error::{Error, Result};
use crate::core::types::DocumentRecord;

/// One record in the append log: either an upsert or a wipe of the whole
/// corpus. Mirrors the length-prefixed, CRC-checked record shape used to
/// persist segments elsewhere in this crate, applied here to document
/// writes instead of postings.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum LogOp {
    Put(DocumentRecord),
    DeleteAll,
}

/// A snapshot of the whole store, written periodically so the append log
/// can be replayed from a recent point rather than from the beginning.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct Snapshot {
    documents: HashMap<u32, DocumentRecord>,
    origins: BTreeSet<String>,
    dirty: HashSet<u32>,
}

/// The corpus document store: an in-memory map backed by an append-only,
/// CRC-checked log plus periodic snapshots. A crash between writes can
/// never corrupt the authoritative record because every write is either
/// fully appended (checksum verifies) or not replayed at all.
pub struct DocumentStore {
    log_path: std::path::PathBuf,
    snapshot_path: std::path::PathBuf,
    log_file: File,
    documents: HashMap<u32, DocumentRecord>,
    origins: BTreeSet<String>,
    dirty: HashSet<u32>,
}

fn write_record(file: &mut File, op: &LogOp) -> Result<()> {
    let data = bincode::serialize(op)?;
    let mut hasher = Hasher::new();
    hasher.update(&data);
    let checksum = hasher.finalize();

    file.write_all(&(data.len() as u32).to_le_bytes())?;
    file.write_all(&data)?;
    file.write_all(&checksum.to_le_bytes())?;
    Ok(())
}

fn read_record(bytes: &[u8], pos: &mut usize) -> Option<Result<LogOp>> {
    if *pos + 4 > bytes.len() {
        return None;
    }
    let len = u32::from_le_bytes(bytes[*pos..*pos + 4].try_into().unwrap()) as usize;
    let data_start = *pos + 4;
    let data_end = data_start + len;
    let crc_end = data_end + 4;
    if crc_end > bytes.len() {
        return None;
    }

    let data = &bytes[data_start..data_end];
    let stored_crc = u32::from_le_bytes(bytes[data_end..crc_end].try_into().unwrap());
    let mut hasher = Hasher::new();
    hasher.update(data);
    let actual_crc = hasher.finalize();

    *pos = crc_end;

    if actual_crc != stored_crc {
        return Some(Err(Error::corpus_integrity(
            "document log record failed checksum, truncating replay here",
        )));
    }
    match bincode::deserialize::<LogOp>(data) {
        Ok(op) => Some(Ok(op)),
        Err(e) => Some(Err(e.into())),
    }
}

impl DocumentStore {
    pub fn open(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)?;
        let log_path = data_dir.join("documents.log");
        let snapshot_path = data_dir.join("documents.snapshot");

        let mut snapshot = Snapshot::default();
        if snapshot_path.exists() {
            let bytes = fs::read(&snapshot_path)?;
            if !bytes.is_empty() {
                snapshot = bincode::deserialize(&bytes)?;
            }
        }

        let mut store = DocumentStore {
            log_path: log_path.clone(),
            snapshot_path,
            log_file: OpenOptions::new().create(true).append(true).read(true).open(&log_path)?,
            documents: snapshot.documents,
            origins: snapshot.origins,
            dirty: snapshot.dirty,
        };

        store.replay_log()?;
        Ok(store)
    }

    fn replay_log(&mut self) -> Result<()> {
        let mut bytes = Vec::new();
        File::open(&self.log_path)?.read_to_end(&mut bytes)?;

        let mut pos = 0;
        while let Some(result) = read_record(&bytes, &mut pos) {
            match result {
                Ok(LogOp::Put(record)) => {
                    self.apply_put(record);
                }
                Ok(LogOp::DeleteAll) => {
                    self.documents.clear();
                    self.origins.clear();
                    self.dirty.clear();
                }
                Err(e) => {
                    eprintln!("corpus: {} (log={})", e, self.log_path.display());
                    break;
                }
            }
        }
        Ok(())
    }

    fn apply_put(&mut self, record: DocumentRecord) {
        let pmid = record.pmid;
        let changed = match self.documents.get_mut(&pmid) {
            Some(existing) => existing.apply_update(&record),
            None => {
                let is_new_text = record.title.is_some()
                    || record.abstract_text.is_some()
                    || record.body.is_some()
                    || record.pub_year.is_some();
                self.documents.insert(pmid, record.clone());
                is_new_text
            }
        };
        if let Some(ref origin) = record.origin {
            self.origins.insert(origin.clone());
        }
        if changed {
            self.dirty.insert(pmid);
        }
    }

    /// Upserts a batch of (possibly partial) records, logging each before
    /// applying it to the in-memory map.
    pub fn put(&mut self, records: &[DocumentRecord]) -> Result<()> {
        for record in records {
            write_record(&mut self.log_file, &LogOp::Put(record.clone()))?;
        }
        self.log_file.sync_all()?;
        for record in records {
            self.apply_put(record.clone());
        }
        Ok(())
    }

    pub fn get(&self, pmid: u32) -> Option<&DocumentRecord> {
        self.documents.get(&pmid)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn origins(&self) -> Vec<String> {
        self.origins.iter().cloned().collect()
    }

    pub fn pmids(&self) -> impl Iterator<Item = u32> + '_ {
        self.documents.keys().copied()
    }

    pub fn year_map(&self) -> HashMap<u32, u16> {
        self.documents.iter().map(|(pmid, doc)| (*pmid, doc.year())).collect()
    }

    /// Drops every record, returning how many were removed.
    pub fn delete_all(&mut self) -> Result<usize> {
        write_record(&mut self.log_file, &LogOp::DeleteAll)?;
        self.log_file.sync_all()?;
        let count = self.documents.len();
        self.documents.clear();
        self.origins.clear();
        self.dirty.clear();
        Ok(count)
    }

    pub fn dirty(&self) -> impl Iterator<Item = u32> + '_ {
        self.dirty.iter().copied()
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    pub fn mark_clean(&mut self, pmids: &[u32]) {
        for pmid in pmids {
            self.dirty.remove(pmid);
        }
    }

    /// Writes a full snapshot and truncates the log. Call after a
    /// successful indexing pass, once `mark_clean` has run, so recovery
    /// never has to replay further back than the last build.
    pub fn checkpoint(&mut self) -> Result<()> {
        let snapshot = Snapshot {
            documents: self.documents.clone(),
            origins: self.origins.clone(),
            dirty: self.dirty.clone(),
        };
        let data = bincode::serialize(&snapshot)?;
        let tmp_path = self.snapshot_path.with_extension("snapshot.tmp");
        fs::write(&tmp_path, &data)?;
        fs::rename(&tmp_path, &self.snapshot_path)?;

        self.log_file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .read(true)
            .open(&self.log_path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn rec(pmid: u32, title: &str, year: u16) -> DocumentRecord {
        DocumentRecord {
            pmid,
            pub_year: Some(year),
            title: Some(title.to_string()),
            origin: Some("test.xml".into()),
            ..Default::default()
        }
    }

    #[test]
    fn put_then_reopen_survives() -> Result<()> {
        let dir = tempdir().unwrap();
        {
            let mut store = DocumentStore::open(dir.path())?;
            store.put(&[rec(1, "Ion channels", 2020)])?;
        }
        let store = DocumentStore::open(dir.path())?;
        assert_eq!(store.get(1).unwrap().title.as_deref(), Some("Ion channels"));
        assert_eq!(store.dirty_count(), 1);
        Ok(())
    }

    #[test]
    fn partial_update_preserves_existing_fields() -> Result<()> {
        let dir = tempdir().unwrap();
        let mut store = DocumentStore::open(dir.path())?;
        store.put(&[rec(1, "Ion channels", 2020)])?;
        store.put(&[DocumentRecord { pmid: 1, citation_count: Some(7), ..Default::default() }])?;
        let doc = store.get(1).unwrap();
        assert_eq!(doc.title.as_deref(), Some("Ion channels"));
        assert_eq!(doc.citation_count, Some(7));
        Ok(())
    }

    #[test]
    fn checkpoint_truncates_log_but_preserves_state() -> Result<()> {
        let dir = tempdir().unwrap();
        let mut store = DocumentStore::open(dir.path())?;
        store.put(&[rec(1, "Ion channels", 2020)])?;
        store.mark_clean(&[1]);
        store.checkpoint()?;
        drop(store);

        let store = DocumentStore::open(dir.path())?;
        assert_eq!(store.len(), 1);
        assert_eq!(store.dirty_count(), 0);
        Ok(())
    }

    #[test]
    fn delete_all_clears_everything() -> Result<()> {
        let dir = tempdir().unwrap();
        let mut store = DocumentStore::open(dir.path())?;
        store.put(&[rec(1, "a", 2020), rec(2, "b", 2021)])?;
        let removed = store.delete_all()?;
        assert_eq!(removed, 2);
        assert!(store.is_empty());
        assert_eq!(store.origins().len(), 0);
        Ok(())
    }
}
