pub mod cache;
pub mod engine;

pub use engine::{QueryEngine, YearRange};
