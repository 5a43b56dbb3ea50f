//! Text extractors for the correspondent graph.
//!
//! Extractors scan unstructured message content for participants that the
//! structured sender/recipient records do not carry.

pub mod forwarded;

pub use forwarded::{extract_candidates, HeaderCandidate, HeaderField};
