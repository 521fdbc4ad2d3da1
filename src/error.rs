use thiserror::Error;

use crate::parse::{ParseError, TokenTableError};
use crate::path::AddressingError;
use crate::proof::DecodeError;
use crate::types::TypeCheckError;

/// An internal invariant violation, such as a rule applied where its
/// preconditions do not hold.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("assertion failed: {message}")]
pub struct AssertionFailure {
    pub message: String,
    /// Ordinal of the proof step the failure concerns, if any.
    pub ordinal: Option<u64>,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Addressing(#[from] AddressingError),
    #[error(transparent)]
    TypeCheck(#[from] TypeCheckError),
    #[error(transparent)]
    Assertion(#[from] AssertionFailure),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    TokenTable(#[from] TokenTableError),
}
