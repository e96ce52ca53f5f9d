//! Query processing: semantic patching, transactional execution, and
//! per-statement analytics.

mod executor;
mod logger;
mod patcher;

pub use executor::{QueryExecutor, QueryOutcome};
pub use logger::{QueryLogEntry, QueryLogger, QueryTimer};
pub use patcher::{QueryPatcher, UNQUALIFIED_TABLE};
