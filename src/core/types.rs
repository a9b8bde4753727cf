use serde::{Deserialize, Serialize};

/// Publication year used when ingestion cannot resolve one. Never a real
/// year, so any censor range clamped to [1000, 2100] naturally excludes it.
pub const UNKNOWN_YEAR: u16 = 9999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pmid(pub u32);

impl Pmid {
    pub fn new(id: u32) -> Self {
        Pmid(id)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl From<u32> for Pmid {
    fn from(id: u32) -> Self {
        Pmid(id)
    }
}

impl std::fmt::Display for Pmid {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The authoritative per-document record. `None` fields in an update are
/// "no change", never "clear this field" — see `DocumentRecord::apply_update`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub pmid: u32,
    pub pub_year: Option<u16>,
    pub title: Option<String>,
    pub abstract_text: Option<String>,
    pub body: Option<String>,
    pub origin: Option<String>,
    pub citation_count: Option<u32>,
}

impl DocumentRecord {
    pub fn new(pmid: u32) -> Self {
        DocumentRecord { pmid, ..Default::default() }
    }

    /// Merges `update` into `self`, overwriting only fields that are
    /// present in `update`. Returns whether text content (title/abstract/
    /// body) or the publication year changed, which is what marks a
    /// document dirty for re-indexing.
    pub fn apply_update(&mut self, update: &DocumentRecord) -> bool {
        let mut text_changed = false;

        if let Some(year) = update.pub_year {
            if self.pub_year != Some(year) {
                text_changed = true;
            }
            self.pub_year = Some(year);
        }
        if let Some(ref title) = update.title {
            if self.title.as_deref() != Some(title.as_str()) {
                text_changed = true;
            }
            self.title = Some(title.clone());
        }
        if let Some(ref abs) = update.abstract_text {
            if self.abstract_text.as_deref() != Some(abs.as_str()) {
                text_changed = true;
            }
            self.abstract_text = Some(abs.clone());
        }
        if let Some(ref body) = update.body {
            if self.body.as_deref() != Some(body.as_str()) {
                text_changed = true;
            }
            self.body = Some(body.clone());
        }
        if let Some(ref origin) = update.origin {
            self.origin = Some(origin.clone());
        }
        if let Some(count) = update.citation_count {
            self.citation_count = Some(count);
        }

        text_changed
    }

    pub fn year(&self) -> u16 {
        self.pub_year.unwrap_or(UNKNOWN_YEAR)
    }

    /// Concatenated searchable text in field order, the text the tokenizer
    /// and index builder operate on.
    pub fn searchable_text(&self) -> String {
        let mut out = String::new();
        if let Some(ref t) = self.title {
            out.push_str(t);
        }
        if let Some(ref a) = self.abstract_text {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(a);
        }
        if let Some(ref b) = self.body {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(b);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_update_overwrites_only_present_fields() {
        let mut doc = DocumentRecord::new(1);
        doc.apply_update(&DocumentRecord {
            pmid: 1,
            title: Some("first title".into()),
            pub_year: Some(2020),
            ..Default::default()
        });
        assert_eq!(doc.title.as_deref(), Some("first title"));
        assert_eq!(doc.pub_year, Some(2020));

        let changed = doc.apply_update(&DocumentRecord {
            pmid: 1,
            citation_count: Some(5),
            ..Default::default()
        });
        assert!(!changed, "citation-count-only update should not dirty the document");
        assert_eq!(doc.title.as_deref(), Some("first title"));
        assert_eq!(doc.citation_count, Some(5));
    }

    #[test]
    fn text_change_is_detected() {
        let mut doc = DocumentRecord::new(1);
        doc.apply_update(&DocumentRecord {
            pmid: 1,
            abstract_text: Some("ion channel".into()),
            ..Default::default()
        });
        let changed = doc.apply_update(&DocumentRecord {
            pmid: 1,
            abstract_text: Some("ion channel revised".into()),
            ..Default::default()
        });
        assert!(changed);
    }
}
