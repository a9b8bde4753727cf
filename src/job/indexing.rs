//! The indexing job (§4.7): the only writer of the on-disk index. Rebuilds
//! the full consolidated index from the document store's current contents,
//! publishes it by atomic rename, then marks the pmids that triggered the
//! rebuild clean and checkpoints the document log.

use crate::core::config::Config;
use crate::core::error::Result;
use crate::corpus::DocumentStore;
use crate::index::builder::{ConsolidatedIndex, IndexBuilder, IndexBuilderConfig};
use crate::index::cdb::write_index;
use crate::job::lock::CorpusLock;
use crate::progress::{clamp_progress, CancellationToken, ProgressSink};

/// Runs one indexing pass. Returns `None` if the corpus lock could not be
/// acquired (another job already in flight — "nothing enqueued") or if
/// there is nothing dirty to index; otherwise the number of pmids newly
/// marked clean.
pub fn run_indexing_job(
    store: &mut DocumentStore,
    config: &Config,
    builder_config: IndexBuilderConfig,
    cancel: &CancellationToken,
    progress: &dyn ProgressSink,
) -> Result<Option<usize>> {
    let lock = match CorpusLock::try_acquire(&config.lock_path()) {
        Ok(lock) => lock,
        Err(_) => return Ok(None),
    };

    let dirty: Vec<u32> = store.dirty().collect();
    if dirty.is_empty() {
        drop(lock);
        return Ok(Some(0));
    }

    let result = build_and_publish(store, config, builder_config, cancel, progress, &dirty);
    drop(lock);
    result.map(Some)
}

fn build_and_publish(
    store: &mut DocumentStore,
    config: &Config,
    builder_config: IndexBuilderConfig,
    cancel: &CancellationToken,
    progress: &dyn ProgressSink,
    dirty: &[u32],
) -> Result<usize> {
    let mut builder = IndexBuilder::new(builder_config);

    let pmids: Vec<u32> = store.pmids().collect();
    let total = pmids.len().max(1);
    for (i, pmid) in pmids.iter().enumerate() {
        cancel.check()?;
        if let Some(doc) = store.get(*pmid) {
            builder.add_document(*pmid, doc.year(), doc)?;
        }
        progress.report(clamp_progress(i + 1, total) * 0.9);
    }

    let consolidated: ConsolidatedIndex = builder.consolidate(cancel)?;
    write_index(&consolidated, &config.index_path(), &config.index_tmp_path())?;

    store.mark_clean(dirty);
    store.checkpoint()?;

    progress.report(1.0);
    Ok(dirty.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::DocumentRecord;
    use crate::progress::NullProgress;
    use tempfile::tempdir;

    #[test]
    fn rebuilds_index_and_clears_dirty_set() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = dir.path().to_path_buf();

        let mut store = DocumentStore::open(&config.data_dir).unwrap();
        store
            .put(&[DocumentRecord { pmid: 1, title: Some("cancer".into()), pub_year: Some(2020), ..Default::default() }])
            .unwrap();

        let outcome = run_indexing_job(
            &mut store,
            &config,
            IndexBuilderConfig::default(),
            &CancellationToken::new(),
            &NullProgress,
        )
        .unwrap();

        assert_eq!(outcome, Some(1));
        assert_eq!(store.dirty_count(), 0);
        assert!(config.index_path().exists());
    }

    #[test]
    fn nothing_to_index_reports_zero() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = dir.path().to_path_buf();
        let mut store = DocumentStore::open(&config.data_dir).unwrap();

        let outcome = run_indexing_job(
            &mut store,
            &config,
            IndexBuilderConfig::default(),
            &CancellationToken::new(),
            &NullProgress,
        )
        .unwrap();
        assert_eq!(outcome, Some(0));
    }

    #[test]
    fn held_lock_reports_nothing_enqueued() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = dir.path().to_path_buf();
        std::fs::create_dir_all(&config.data_dir).unwrap();
        let _held = CorpusLock::try_acquire(&config.lock_path()).unwrap();

        let mut store = DocumentStore::open(&config.data_dir).unwrap();
        store
            .put(&[DocumentRecord { pmid: 1, title: Some("cancer".into()), ..Default::default() }])
            .unwrap();

        let outcome = run_indexing_job(
            &mut store,
            &config,
            IndexBuilderConfig::default(),
            &CancellationToken::new(),
            &NullProgress,
        )
        .unwrap();
        assert_eq!(outcome, None);
    }
}
