//! Closed error taxonomy shared by every module in the crate.
//!
//! Internal code returns `Result<T, QioError>`; only the CLI binary (`cli.rs`) collects
//! these into `anyhow::Result` at the process boundary, per the teacher's split between
//! typed errors inside the library and `anyhow` at the edge.

use thiserror::Error;

/// The exit-code range a `QioError` falls into (see spec §6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitRange {
    InsufficientResources,
    InvalidInput,
    Runtime,
    FileIo,
}

/// A single closed enumeration of everything that can go wrong.
///
/// Every variant carries a numeric tag matching the `_QTK<code>` prefix emitted at the
/// process boundary. Kinds in 001-100 are user errors arising from resource exhaustion;
/// 101-200 are malformed input; 201-300 are runtime/logic errors; 301-400 are file I/O.
#[derive(Error, Debug)]
pub enum QioError {
    #[error("memory limit exceeded during init")]
    MemoryLimited,
    #[error("insufficient time budget for requested work: {0}")]
    TimeoutInsufficient(String),

    #[error("duplicate variable id in term: {0}")]
    DuplicatedVariable(String),
    #[error("missing required input: {0}")]
    MissingInput(String),
    #[error("invalid type: {0}")]
    InvalidTypes(String),
    #[error("invalid initial configuration: {0}")]
    InitialConfigError(String),
    #[error("parsing error: {0}")]
    ParsingError(String),
    #[error("invalid value: {0}")]
    ValueError(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),
    #[error("key does not exist: {0}")]
    KeyDoesNotExist(String),
    #[error("internal invariant violated: {0}")]
    Invariant(String),

    #[error("file I/O error: {0}")]
    FileIo(String),
}

impl QioError {
    /// The `_QTK<code>` numeric tag for this error, per spec §6's partition table.
    pub fn code(&self) -> u16 {
        use QioError::*;
        match self {
            MemoryLimited => 1,
            TimeoutInsufficient(_) => 2,
            DuplicatedVariable(_) => 101,
            MissingInput(_) => 102,
            InvalidTypes(_) => 103,
            InitialConfigError(_) => 104,
            ParsingError(_) => 105,
            ValueError(_) => 107,
            NotImplemented(_) => 201,
            KeyDoesNotExist(_) => 202,
            Invariant(_) => 203,
            FileIo(_) => 301,
        }
    }

    pub fn range(&self) -> ExitRange {
        match self.code() {
            1..=100 => ExitRange::InsufficientResources,
            101..=200 => ExitRange::InvalidInput,
            301..=400 => ExitRange::FileIo,
            _ => ExitRange::Runtime,
        }
    }

    /// Whether a solver's `init()` can recover from this by retrying with the
    /// memory-saving compact model variant (spec §4.9/§7's single recoverable class).
    pub fn is_recoverable_memory_limited(&self) -> bool {
        matches!(self, QioError::MemoryLimited)
    }

    /// The tagged line printed at the process boundary on user error.
    pub fn tagged_line(&self) -> String {
        format!("_QTK{:03} {}", self.code(), self)
    }
}

pub type QioResult<T> = Result<T, QioError>;
