pub mod driver;
pub mod types;

pub use driver::{run_km_paired, run_km_standard, run_skim_paired, run_skim_standard, surface_pmids};
pub use types::{KmParams, KmResult, Scoring, SkimResult};
