//! Transfer-pattern routing core: precomputes, per source stop, the DAG of
//! stop sequences appearing on any Pareto-optimal journey, and answers
//! journey queries by unfolding those DAGs against a live timetable instead
//! of searching the full graph.

use thiserror::Error;

pub mod build;
pub mod geomath;
pub mod pattern;
pub mod query;
pub mod scenario;
pub mod search;
pub mod street;
pub mod timetable;

/// Errors raised while building, merging or persisting a transfer-pattern
/// index. Unknown labels during a merge indicate a data-version mismatch
/// between chunks and are fatal to the build.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown stop label: {0}")]
    UnknownStop(String),
    #[error("unknown trip pattern code: {0}")]
    UnknownTripPattern(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}
