//! Externally owned parameter cells.
//!
//! A fitting host owns the parameter values and updates them between evaluations. Shapes keep
//! `Arc<RealVar>` handles and re-read the current value on every evaluation, so a bound shape
//! never caches anything.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A named real-valued cell with bounds.
///
/// The value is stored as raw `f64` bits in an atomic, so readers on other threads always see
/// a whole value. Bounds are fixed at construction; an observable uses them as its fit domain.
pub struct RealVar {
    name: String,
    value: AtomicU64,
    bounds: (f64, f64),
}

impl RealVar {
    /// Create a new shared cell.
    pub fn new(name: impl Into<String>, value: f64, bounds: (f64, f64)) -> Arc<Self> {
        Arc::new(Self { name: name.into(), value: AtomicU64::new(value.to_bits()), bounds })
    }

    /// Create an unbounded cell (bounds `(-inf, +inf)`).
    pub fn free(name: impl Into<String>, value: f64) -> Arc<Self> {
        Self::new(name, value, (f64::NEG_INFINITY, f64::INFINITY))
    }

    /// Create a cell whose bounds collapse onto its value.
    pub fn constant(name: impl Into<String>, value: f64) -> Arc<Self> {
        Self::new(name, value, (value, value))
    }

    /// Parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value.
    #[inline]
    pub fn value(&self) -> f64 {
        f64::from_bits(self.value.load(Ordering::Acquire))
    }

    /// Overwrite the current value. Bounds are not enforced here; that is the minimizer's job.
    #[inline]
    pub fn set_value(&self, value: f64) {
        self.value.store(value.to_bits(), Ordering::Release);
    }

    /// Bounds `(low, high)`.
    pub fn bounds(&self) -> (f64, f64) {
        self.bounds
    }

    /// Lower bound.
    pub fn min(&self) -> f64 {
        self.bounds.0
    }

    /// Upper bound.
    pub fn max(&self) -> f64 {
        self.bounds.1
    }
}

impl fmt::Debug for RealVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealVar")
            .field("name", &self.name)
            .field("value", &self.value())
            .field("bounds", &self.bounds)
            .finish()
    }
}

/// Shared handle to a parameter cell.
pub type Param = Arc<RealVar>;
