pub mod builder;
pub mod cache;
pub mod cdb;
pub mod posting;
