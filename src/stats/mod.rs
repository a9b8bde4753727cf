pub mod contingency;

pub use contingency::{prediction_score, ContingencyTable};
