//! Error types for the tag-and-probe crates.

use thiserror::Error;

/// Error raised by validation, normalization and fitting layers.
///
/// Raw shape evaluation never produces one of these: degenerate parameters surface there as
/// non-finite density values instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid input (lengths, bounds, non-finite values, empty data)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Numerical failure (e.g. non-positive normalization integral)
    #[error("Computation error: {0}")]
    Computation(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
