//! Crate-wide error type.
use std::path::PathBuf;

use failure::Fail;

/// Errors produced while building or querying a mapping analysis.
///
/// Library code never panics or calls `std::process::exit`; only
/// `bin/maestro.rs` does, after printing the `Display` of one of these.
#[derive(Debug, Fail)]
pub enum ModelError {
    /// A loop variable is both `Unroll`/`Merge` and `TemporalMap`/`SpatialMap`.
    #[fail(
        display = "loop variable `{}` cannot be both unrolled/merged and mapped",
        var
    )]
    ConfigConflict { var: String },
    /// No loop in the loop table matches a directive's variable.
    #[fail(display = "no loop matches directive variable `{}`", var)]
    MissingLoop { var: String },
    /// A query ran against a mapping analyzer whose derived maps are stale.
    #[fail(display = "preprocess() must be re-run after set_map_size()")]
    StalePreprocess,
    /// A dataflow or layer file line could not be parsed.
    #[fail(display = "{:?}:{}: {}", file, line, reason)]
    ParseError {
        file: PathBuf,
        line: usize,
        reason: String,
    },
    /// The dataflow or layer file could not be opened or read.
    #[fail(display = "{}", _0)]
    Io(#[cause] std::io::Error),
    /// A tensor name used in a query is not registered with the analyzer.
    #[fail(display = "unknown tensor `{}`", _0)]
    UnknownTensor(String),
}

impl From<std::io::Error> for ModelError {
    fn from(e: std::io::Error) -> Self {
        ModelError::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, ModelError>;
