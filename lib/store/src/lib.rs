//! PostgreSQL persistence for the miniflow execution engine.
//!
//! One module per table. Every function takes an explicit
//! `&mut PgConnection` as its first argument; transaction scope is owned by
//! the caller (`pool.begin()` … `commit()`), so a service function decides
//! which operations share a transaction and which run on a plain pooled
//! connection.
//!
//! Row structs mirror the table shape; conversion into domain records
//! happens in one place per table so malformed rows surface as decode
//! errors instead of leaking `String`s into the domain.

pub mod edges;
pub mod execution_inputs;
pub mod execution_outputs;
pub mod executions;
pub mod nodes;
pub mod pagination;
pub mod paths;
pub mod resources;
pub mod scripts;
pub mod triggers;
pub mod workflows;

use std::str::FromStr;

/// Wraps a row-level conversion failure as a sqlx decode error.
pub(crate) fn decode_err(message: impl Into<String>) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        message.into(),
    )))
}

/// Parses a typed ID column, mapping failures to decode errors.
pub(crate) fn parse_id<T>(column: &str, raw: &str) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| decode_err(format!("invalid {column} '{raw}': {e}")))
}
