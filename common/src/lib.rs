pub mod document;
pub mod error;
pub mod graph;
pub mod utils;
