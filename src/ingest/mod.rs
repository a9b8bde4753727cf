pub mod citations;
pub mod pubmed_xml;

pub use citations::parse_citations;
pub use pubmed_xml::parse_pubmed_xml;
