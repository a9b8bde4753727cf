use std::fmt;
use std::path::PathBuf;

/// Number of workers dedicated to each job priority class (§5 scheduling
/// model). The pool itself lives in the external job runtime; this crate
/// only needs to know the shape so callers can size their own pools
/// consistently with what was configured here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerCounts {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub indexing: usize,
}

impl Default for WorkerCounts {
    fn default() -> Self {
        let cpus = num_cpus::get().max(1);
        WorkerCounts {
            high: cpus,
            medium: (cpus / 2).max(1),
            low: (cpus / 4).max(1),
            indexing: 1,
        }
    }
}

/// A secret value that never shows up in `Debug` output, logs, or result
/// payloads.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Secret(REDACTED)")
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub worker_counts: WorkerCounts,
    pub server_port: u16,
    pub timezone: String,

    pub query_cache_size: usize,
    pub posting_cache_budget_bytes: usize,

    pub indexing_batch_size: usize,

    /// API keys for the HTTP/LLM collaborators that sit outside this crate.
    /// Carried here only so the one process-wide config object is also the
    /// one place secrets are loaded and redacted.
    pub api_key: Secret,
    pub llm_api_key: Secret,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from("./data"),
            worker_counts: WorkerCounts::default(),
            server_port: 8080,
            timezone: "UTC".to_string(),

            query_cache_size: 10_000,
            posting_cache_budget_bytes: 100 * 1024 * 1024,

            indexing_batch_size: 1000,

            api_key: Secret::default(),
            llm_api_key: Secret::default(),
        }
    }
}

impl Config {
    pub fn documents_path(&self) -> PathBuf {
        self.data_dir.join("documents.log")
    }

    pub fn documents_snapshot_path(&self) -> PathBuf {
        self.data_dir.join("documents.snapshot")
    }

    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join("index.cdb")
    }

    pub fn index_tmp_path(&self) -> PathBuf {
        self.data_dir.join("index.cdb.tmp")
    }

    pub fn kg_path(&self) -> PathBuf {
        self.data_dir.join("_kg.db")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.data_dir.join(".lock")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_debug_is_redacted() {
        let s = Secret::new("sk-super-secret");
        assert_eq!(format!("{:?}", s), "Secret(REDACTED)");
    }

    #[test]
    fn config_debug_does_not_leak_secret() {
        let mut cfg = Config::default();
        cfg.api_key = Secret::new("topsecret");
        let rendered = format!("{:?}", cfg);
        assert!(!rendered.contains("topsecret"));
    }
}
