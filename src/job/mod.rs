pub mod indexing;
pub mod lock;

pub use indexing::run_indexing_job;
pub use lock::CorpusLock;
