//! Newline-delimited JSON citation-count ingestion (§4.9). Each line is a
//! partial update against an already-known PMID; a line naming an unknown
//! PMID is skipped and logged rather than treated as an error.

use std::io::BufRead;

use serde::Deserialize;

use crate::core::error::Result;
use crate::core::types::DocumentRecord;

#[derive(Debug, Deserialize)]
struct CitationRecord {
    pmid: u32,
    citation_count: Option<u32>,
}

/// Reads NDJSON citation records, calling `lookup` to confirm the PMID is
/// known and `on_update` with the resulting partial-update record for the
/// ones that are. Returns `(applied, skipped)`.
pub fn parse_citations<R: BufRead>(
    reader: R,
    mut lookup: impl FnMut(u32) -> bool,
    mut on_update: impl FnMut(DocumentRecord) -> Result<()>,
) -> Result<(usize, usize)> {
    let mut applied = 0usize;
    let mut skipped = 0usize;

    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let record: CitationRecord = serde_json::from_str(trimmed)?;

        if !lookup(record.pmid) {
            eprintln!("ingest: citation record for unknown pmid {} skipped", record.pmid);
            skipped += 1;
            continue;
        }

        on_update(DocumentRecord {
            pmid: record.pmid,
            citation_count: Some(record.citation_count.unwrap_or(0)),
            ..Default::default()
        })?;
        applied += 1;
    }

    Ok((applied, skipped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io::Cursor;

    #[test]
    fn applies_known_pmids_and_skips_unknown() {
        let known: HashSet<u32> = [1, 2].into_iter().collect();
        let ndjson = "{\"pmid\":1,\"citation_count\":10}\n{\"pmid\":2}\n{\"pmid\":3,\"citation_count\":5}\n";

        let mut applied_records = Vec::new();
        let (applied, skipped) = parse_citations(
            Cursor::new(ndjson),
            |pmid| known.contains(&pmid),
            |record| {
                applied_records.push(record);
                Ok(())
            },
        )
        .unwrap();

        assert_eq!(applied, 2);
        assert_eq!(skipped, 1);
        assert_eq!(applied_records[0].citation_count, Some(10));
        assert_eq!(applied_records[1].citation_count, Some(0));
    }
}
