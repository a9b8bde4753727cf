//! Streaming parser for PubMed-shaped citation XML (§4.9). Reads
//! `PubmedArticle` elements one at a time without buffering the whole
//! document, since baseline archive files can run into the gigabytes.

use std::io::BufRead;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::core::error::Result;
use crate::core::types::{DocumentRecord, UNKNOWN_YEAR};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    None,
    Pmid,
    ArticleTitle,
    AbstractText,
    JournalYear,
    DateCompletedYear,
    MedlineDate,
}

/// Parses a whole PubMed XML document into its `DocumentRecord`s, calling
/// `on_document` once per `PubmedArticle` so callers can stream straight
/// into the document store without materializing the full list.
pub fn parse_pubmed_xml<R: BufRead>(reader: R, mut on_document: impl FnMut(DocumentRecord) -> Result<()>) -> Result<usize> {
    let mut xml = Reader::from_reader(reader);
    xml.config_mut().trim_text_start = true;
    xml.config_mut().trim_text_end = true;

    let mut buf = Vec::new();
    let mut field = Field::None;
    let mut in_journal_issue = false;
    let mut in_date_completed = false;

    let mut pmid: Option<u32> = None;
    let mut title: Option<String> = None;
    let mut abstract_parts: Vec<String> = Vec::new();
    let mut journal_year: Option<u16> = None;
    let mut date_completed_year: Option<u16> = None;
    let mut medline_date: Option<String> = None;
    let mut count = 0usize;

    loop {
        match xml.read_event_into(&mut buf)? {
            Event::Start(e) => {
                match e.local_name().as_ref() {
                    b"PubmedArticle" => {
                        pmid = None;
                        title = None;
                        abstract_parts.clear();
                        journal_year = None;
                        date_completed_year = None;
                        medline_date = None;
                    }
                    b"PMID" => field = Field::Pmid,
                    b"ArticleTitle" => field = Field::ArticleTitle,
                    b"AbstractText" => field = Field::AbstractText,
                    b"JournalIssue" => in_journal_issue = true,
                    b"DateCompleted" => in_date_completed = true,
                    b"Year" if in_journal_issue => field = Field::JournalYear,
                    b"Year" if in_date_completed => field = Field::DateCompletedYear,
                    b"MedlineDate" => field = Field::MedlineDate,
                    _ => {}
                }
            }
            Event::Text(e) => {
                let text = e.unescape().unwrap_or_default().into_owned();
                match field {
                    Field::Pmid => {
                        if pmid.is_none() {
                            pmid = text.trim().parse().ok();
                        }
                    }
                    Field::ArticleTitle => title = Some(text),
                    Field::AbstractText => abstract_parts.push(text),
                    Field::JournalYear => journal_year = text.trim().parse().ok(),
                    Field::DateCompletedYear => date_completed_year = text.trim().parse().ok(),
                    Field::MedlineDate => medline_date = Some(text),
                    Field::None => {}
                }
            }
            Event::End(e) => {
                match e.local_name().as_ref() {
                    b"JournalIssue" => in_journal_issue = false,
                    b"DateCompleted" => in_date_completed = false,
                    b"PMID" | b"ArticleTitle" | b"AbstractText" | b"Year" | b"MedlineDate" => field = Field::None,
                    b"PubmedArticle" => {
                        if let Some(pmid) = pmid {
                            let year = journal_year
                                .or(date_completed_year)
                                .or_else(|| medline_date.as_deref().and_then(extract_year_from_medline_date))
                                .unwrap_or(UNKNOWN_YEAR);
                            let abstract_text =
                                if abstract_parts.is_empty() { None } else { Some(abstract_parts.join(" ")) };

                            on_document(DocumentRecord {
                                pmid,
                                pub_year: Some(year),
                                title: title.clone(),
                                abstract_text,
                                body: None,
                                origin: Some("pubmed_xml".to_string()),
                                citation_count: None,
                            })?;
                            count += 1;
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(count)
}

/// Pulls a 4-digit year out of a free-text `MedlineDate` (e.g. "2019 Jan-Feb"
/// or "2005-2006"), matching `\b(1\d{3}|20\d{2})\b` without pulling in a
/// regex engine for one pattern.
fn extract_year_from_medline_date(text: &str) -> Option<u16> {
    let bytes = text.as_bytes();
    for start in 0..bytes.len() {
        if start + 4 > bytes.len() {
            break;
        }
        let candidate = &bytes[start..start + 4];
        if !candidate.iter().all(u8::is_ascii_digit) {
            continue;
        }
        let boundary_before = start == 0 || !bytes[start - 1].is_ascii_alphanumeric();
        let boundary_after = start + 4 == bytes.len() || !bytes[start + 4].is_ascii_alphanumeric();
        if !boundary_before || !boundary_after {
            continue;
        }
        if candidate[0] == b'1' && candidate[1].is_ascii_digit() {
            if let Ok(year) = std::str::from_utf8(candidate).unwrap().parse() {
                return Some(year);
            }
        }
        if candidate[0] == b'2' && candidate[1] == b'0' {
            if let Ok(year) = std::str::from_utf8(candidate).unwrap().parse() {
                return Some(year);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<PubmedArticleSet>
<PubmedArticle>
  <MedlineCitation>
    <PMID>12345</PMID>
    <Article>
      <ArticleTitle>Ion channel gating in neurons</ArticleTitle>
      <Abstract>
        <AbstractText>First part.</AbstractText>
        <AbstractText>Second part.</AbstractText>
      </Abstract>
      <Journal>
        <JournalIssue>
          <PubDate><Year>2019</Year></PubDate>
        </JournalIssue>
      </Journal>
    </Article>
    <DateCompleted><Year>2020</Year></DateCompleted>
  </MedlineCitation>
</PubmedArticle>
<PubmedArticle>
  <MedlineCitation>
    <PMID>67890</PMID>
    <Article>
      <ArticleTitle>Undated article</ArticleTitle>
      <Journal>
        <JournalIssue>
          <PubDate><MedlineDate>2011 Spring</MedlineDate></PubDate>
        </JournalIssue>
      </Journal>
    </Article>
  </MedlineCitation>
</PubmedArticle>
</PubmedArticleSet>
"#;

    #[test]
    fn parses_title_year_and_concatenated_abstract() {
        let mut docs = Vec::new();
        let count = parse_pubmed_xml(Cursor::new(SAMPLE), |doc| {
            docs.push(doc);
            Ok(())
        })
        .unwrap();

        assert_eq!(count, 2);
        assert_eq!(docs[0].pmid, 12345);
        assert_eq!(docs[0].pub_year, Some(2019));
        assert_eq!(docs[0].abstract_text.as_deref(), Some("First part. Second part."));
        assert_eq!(docs[1].pub_year, Some(2011));
    }

    #[test]
    fn missing_year_falls_back_to_sentinel() {
        let xml = SAMPLE.replace("<Year>2019</Year>", "").replace("<DateCompleted><Year>2020</Year></DateCompleted>", "");
        let mut docs = Vec::new();
        parse_pubmed_xml(Cursor::new(xml), |doc| {
            docs.push(doc);
            Ok(())
        })
        .unwrap();
        assert_eq!(docs[0].pub_year, Some(UNKNOWN_YEAR));
    }
}
