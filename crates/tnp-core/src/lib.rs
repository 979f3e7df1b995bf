//! # tnp-core
//!
//! Shared plumbing for the tag-and-probe shape crates:
//! - [`Error`] / [`Result`] used by every fallible layer above raw shape evaluation.
//! - [`traits::LogDensityModel`], the contract between likelihood models and fitters.
//! - [`FitResult`], the outcome of a maximum-likelihood fit.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use types::FitResult;
