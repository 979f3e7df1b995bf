//! # tnp-fit
//!
//! Per-bin fits for tag-and-probe efficiency measurements.
//!
//! This crate provides:
//! - [`model::TnpBinModel`], an extended signal + background likelihood over one bin's events
//! - [`mle::MaximumLikelihoodEstimator`], L-BFGS minimization with Hessian uncertainties
//! - [`spec::BinModelSpec`], a JSON model description compiled against an event store
//! - [`efficiency`], efficiency and interval extraction from pass/fail yields

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Efficiency from pass/fail yields and Wilson intervals.
pub mod efficiency;
/// Maximum-likelihood estimation via L-BFGS.
pub mod mle;
/// Extended mixture likelihood for one bin.
pub mod model;
/// Bounded L-BFGS over the free parameters of a model.
pub mod optimizer;
/// JSON bin model description.
pub mod spec;

pub use efficiency::{Efficiency, wilson_interval};
pub use mle::MaximumLikelihoodEstimator;
pub use model::{Parameter, Process, TnpBinModel};
pub use optimizer::{BoundedLbfgs, Minimum, OptimizerConfig};
pub use spec::{BinModelSpec, read_bin_model_spec};
