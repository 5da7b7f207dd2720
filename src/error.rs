//! Typed error hierarchy for the map, feed, and config readers.
//!
//! Construction-time failures are logged and degrade to an empty artifact rather than
//! propagating (see `BuildingMap::load`, `FeedProcessor::new`); these error types exist
//! so callers that *do* want the underlying cause (tests, the driver binary) can get at
//! it, not because every failure is fatal.

use thiserror::Error;

/// Failure modes for `BuildingMap::load`.
#[derive(Debug, Error)]
pub enum MapError {
    #[error("failed to read map file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("map row {row} has {found} columns, expected {expected} (from row 0)")]
    RaggedRow {
        row: usize,
        found: usize,
        expected: usize,
    },

    #[error("map row {row} contains a non-integer region id: {token:?}")]
    BadRegionId { row: usize, token: String },

    #[error("map row {row} col {col} has region id {id}, outside 0..{max}")]
    RegionIdOutOfRange {
        row: usize,
        col: usize,
        id: i64,
        max: usize,
    },
}

/// Failure modes for `FeedProcessor::new`.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("failed to read feed file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("feed line {line} could not be parsed: {detail}")]
    Format { line: usize, detail: String },
}

/// Failure modes surfaced while parsing the driver's key=value config file.
///
/// A bad value for a single key is never fatal to the whole file: parsing
/// collects these as warnings rather than returning early, and `ConfigError` is only
/// used where a caller explicitly wants the detail (tests, `--strict`-style tooling).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config key {key:?} has an unparseable value {value:?}, keeping default")]
    BadValue { key: String, value: String },
}
