//! # tnp-shapes
//!
//! Signal and background line shapes for tag-and-probe invariant-mass fits.
//!
//! This crate provides:
//! - [`pdf::ModDscbPdf`], a double-sided Crystal Ball with two-component tails.
//! - [`pdf::GaussBernPdf`], a Gaussian core with Bernstein-polynomial tails.
//! - [`pdf::CbExGaussPdf`], a Crystal Ball joined to a Gaussian of independent width.
//! - Backgrounds ([`pdf::CmsShapePdf`], [`pdf::BernsteinPdf`]).
//!
//! Each shape is available as a pure function of a parameter snapshot, as a
//! [`pdf::BoundShape`] reading shared [`param::RealVar`] cells, and as a normalized
//! [`pdf::UnbinnedPdf`] over an [`EventStore`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod event_store;
pub mod math;
pub mod normalize;
pub mod param;
pub mod pdf;

pub use event_store::{EventStore, ObservableSpec};
pub use normalize::NormalizationConfig;
pub use param::{Param, RealVar};
pub use pdf::{
    BernsteinPdf, BoundShape, CbExGauss, CbExGaussParams, CbExGaussPdf, CmsShape, CmsShapeParams,
    CmsShapePdf, GaussBern, GaussBernCore, GaussBernPdf, ModDscb, ModDscbParams, ModDscbPdf,
    Side, UnbinnedPdf,
};
