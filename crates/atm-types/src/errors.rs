//! # Error Types
//!
//! Errors raised while constructing or checking wire values.

use thiserror::Error;

/// Errors produced by address well-formedness checks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// Neither a public nor a private part is present.
    #[error("address carries neither a public nor a private part")]
    Empty,

    /// Public E.164 part is empty or longer than 12 digits.
    #[error("public address length {len} outside 1..={max}")]
    PublicLength { len: usize, max: usize },

    /// Public E.164 part contains something other than decimal digits.
    #[error("public address contains non-digit character {0:?}")]
    NonDigit(char),
}
