use cosmwasm_std::StdError;
use cosmwasm_vm::{BackendError, VmError};
use rustyline::error::ReadlineError;
use thiserror::Error;

pub type HarnessResult<T> = Result<T, HarnessError>;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("out of gas in {descriptor}: requested {requested}, remaining {remaining}")]
    OutOfGas {
        descriptor: String,
        requested: u64,
        remaining: u64,
    },

    #[error("unsupported query type: {kind}")]
    UnsupportedQuery { kind: String },

    #[error("iterator with id {0} does not exist")]
    IteratorDoesNotExist(u32),

    #[error("address translation failed: {0}")]
    Address(String),

    #[error("invalid wasm code: {0}")]
    InvalidWasm(String),

    #[error("no code stored under checksum {0}")]
    ChecksumNotFound(String),

    /// The contract ran to completion and returned an error result.
    #[error("contract returned error: {0}")]
    Contract(String),

    #[error("unknown call type [{0}], must be one of (init | handle | query)")]
    UnknownCallKind(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Vm(#[from] VmError),

    #[error(transparent)]
    Std(#[from] StdError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Readline(#[from] ReadlineError),
}

impl HarnessError {
    pub fn out_of_gas<D: Into<String>>(descriptor: D, requested: u64, remaining: u64) -> Self {
        HarnessError::OutOfGas {
            descriptor: descriptor.into(),
            requested,
            remaining,
        }
    }

    pub fn is_out_of_gas(&self) -> bool {
        matches!(self, HarnessError::OutOfGas { .. })
    }
}

// Errors that cross back into the VM through a backend trait.
impl From<HarnessError> for BackendError {
    fn from(err: HarnessError) -> Self {
        match err {
            HarnessError::OutOfGas { .. } => BackendError::out_of_gas(),
            HarnessError::IteratorDoesNotExist(id) => BackendError::iterator_does_not_exist(id),
            other => BackendError::unknown(other.to_string()),
        }
    }
}
