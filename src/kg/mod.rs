//! The relationship store (§4.8): a small tabular side-store for curated
//! `(head, relation, tail)` facts with evidence PMIDs, persisted with the
//! same append-log-plus-snapshot discipline as the document store since it
//! is explicitly not core algorithmic work and should not need a second
//! storage engine.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

use crate::core::error::{Error, Result};
use crate::corpus::DocumentStore;
use crate::query::engine::YearRange;
use crate::tokenize::sanitize_term;

const MAX_EVIDENCE: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relation {
    pub head: String,
    pub head_type: String,
    pub relation: String,
    pub tail: String,
    pub tail_type: String,
    pub evidence: Vec<u32>,
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum LogOp {
    Put(Relation),
    DeleteAll,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct Snapshot {
    rows: Vec<Relation>,
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
        return Some(Err(Error::corpus_integrity("relationship log record failed checksum, truncating replay here")));
    }
    match bincode::deserialize::<LogOp>(data) {
        Ok(op) => Some(Ok(op)),
        Err(e) => Some(Err(e.into())),
    }
}

fn key(raw: &str) -> String {
    sanitize_term(raw, false)
}

/// Curated `(head, relation, tail)` rows with head/tail indexes for
/// `get(a, b)` lookups in either direction.
pub struct KnowledgeGraph {
    log_path: PathBuf,
    snapshot_path: PathBuf,
    log_file: File,
    rows: Vec<Relation>,
    head_index: HashMap<String, Vec<usize>>,
    tail_index: HashMap<String, Vec<usize>>,
}

impl KnowledgeGraph {
    pub fn open(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)?;
        let log_path = data_dir.join("_kg.log");
        let snapshot_path = data_dir.join("_kg.snapshot");

        let mut snapshot = Snapshot::default();
        if snapshot_path.exists() {
            let bytes = fs::read(&snapshot_path)?;
            if !bytes.is_empty() {
                snapshot = bincode::deserialize(&bytes)?;
            }
        }

        let mut kg = KnowledgeGraph {
            log_path: log_path.clone(),
            snapshot_path,
            log_file: OpenOptions::new().create(true).append(true).read(true).open(&log_path)?,
            rows: Vec::new(),
            head_index: HashMap::new(),
            tail_index: HashMap::new(),
        };
        for row in snapshot.rows {
            kg.index_row(row);
        }
        kg.replay_log()?;
        Ok(kg)
    }

    fn replay_log(&mut self) -> Result<()> {
        let mut bytes = Vec::new();
        File::open(&self.log_path)?.read_to_end(&mut bytes)?;
        let mut pos = 0;
        while let Some(result) = read_record(&bytes, &mut pos) {
            match result {
                Ok(LogOp::Put(row)) => self.index_row(row),
                Ok(LogOp::DeleteAll) => {
                    self.rows.clear();
                    self.head_index.clear();
                    self.tail_index.clear();
                }
                Err(e) => {
                    eprintln!("kg: {} (log={})", e, self.log_path.display());
                    break;
                }
            }
        }
        Ok(())
    }

    fn index_row(&mut self, row: Relation) {
        let idx = self.rows.len();
        self.head_index.entry(key(&row.head)).or_default().push(idx);
        self.tail_index.entry(key(&row.tail)).or_default().push(idx);
        self.rows.push(row);
    }

    pub fn insert(&mut self, mut row: Relation) -> Result<()> {
        row.head = key(&row.head);
        row.tail = key(&row.tail);
        write_record(&mut self.log_file, &LogOp::Put(row.clone()))?;
        self.log_file.sync_all()?;
        self.index_row(row);
        Ok(())
    }

    /// Rows where `(head=a ∧ tail=b) ∨ (head=b ∧ tail=a)`, each capped at
    /// the first 100 evidence PMIDs, optionally censored by publication
    /// year via the document store.
    pub fn get(&self, a: &str, b: &str, documents: Option<(&DocumentStore, YearRange)>) -> Vec<Relation> {
        let (ka, kb) = (key(a), key(b));
        let mut indices: Vec<usize> = Vec::new();

        let forward = self.head_index.get(&ka).into_iter().flatten().copied();
        let reverse = self.head_index.get(&kb).into_iter().flatten().copied();
        for idx in forward {
            if self.rows[idx].tail == kb {
                indices.push(idx);
            }
        }
        for idx in reverse {
            if self.rows[idx].tail == ka && !indices.contains(&idx) {
                indices.push(idx);
            }
        }

        indices
            .into_iter()
            .map(|idx| {
                let mut row = self.rows[idx].clone();
                if let Some((store, range)) = documents {
                    row.evidence.retain(|pmid| {
                        store.get(*pmid).map(|doc| range.contains(doc.year())).unwrap_or(false)
                    });
                }
                row.evidence.truncate(MAX_EVIDENCE);
                row
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn delete_all(&mut self) -> Result<()> {
        write_record(&mut self.log_file, &LogOp::DeleteAll)?;
        self.log_file.sync_all()?;
        self.rows.clear();
        self.head_index.clear();
        self.tail_index.clear();
        Ok(())
    }

    pub fn checkpoint(&mut self) -> Result<()> {
        let snapshot = Snapshot { rows: self.rows.clone() };
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

    fn row(head: &str, tail: &str) -> Relation {
        Relation {
            head: head.to_string(),
            head_type: "gene".into(),
            relation: "associated_with".into(),
            tail: tail.to_string(),
            tail_type: "disease".into(),
            evidence: vec![1, 2, 3],
            source: "curated".into(),
        }
    }

    #[test]
    fn lookup_matches_either_direction() -> Result<()> {
        let dir = tempdir().unwrap();
        let mut kg = KnowledgeGraph::open(dir.path())?;
        kg.insert(row("BRCA1", "breast cancer"))?;

        assert_eq!(kg.get("BRCA1", "breast cancer", None).len(), 1);
        assert_eq!(kg.get("breast cancer", "BRCA1", None).len(), 1);
        assert!(kg.get("BRCA1", "lung cancer", None).is_empty());
        Ok(())
    }

    #[test]
    fn head_and_tail_are_sanitized_on_insert_and_lookup() -> Result<()> {
        let dir = tempdir().unwrap();
        let mut kg = KnowledgeGraph::open(dir.path())?;
        kg.insert(row("BRCA1", "Breast_Cancer"))?;
        assert_eq!(kg.get("brca1", "breast cancer", None).len(), 1);
        Ok(())
    }

    #[test]
    fn evidence_is_capped_at_one_hundred() -> Result<()> {
        let dir = tempdir().unwrap();
        let mut kg = KnowledgeGraph::open(dir.path())?;
        let mut r = row("a", "b");
        r.evidence = (0..500).collect();
        kg.insert(r)?;
        assert_eq!(kg.get("a", "b", None)[0].evidence.len(), MAX_EVIDENCE);
        Ok(())
    }

    #[test]
    fn reopen_survives_checkpoint() -> Result<()> {
        let dir = tempdir().unwrap();
        {
            let mut kg = KnowledgeGraph::open(dir.path())?;
            kg.insert(row("a", "b"))?;
            kg.checkpoint()?;
        }
        let kg = KnowledgeGraph::open(dir.path())?;
        assert_eq!(kg.len(), 1);
        Ok(())
    }
}
