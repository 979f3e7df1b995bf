//! Columnar event storage for unbinned likelihood evaluation.

use std::collections::{BTreeMap, HashMap};
use tnp_core::{Error, Result};

/// An observable column together with its fit domain.
#[derive(Debug, Clone)]
pub struct ObservableSpec {
    /// Column name in the resulting [`EventStore`].
    pub name: String,
    /// Fit domain `(low, high)`; used as the normalization range and as the Bernstein tail
    /// anchors.
    pub bounds: (f64, f64),
}

impl ObservableSpec {
    /// Observable over `bounds`.
    pub fn new(name: impl Into<String>, bounds: (f64, f64)) -> Self {
        Self { name: name.into(), bounds }
    }
}

/// Columnar event storage (Structure-of-Arrays / SoA).
#[derive(Debug, Clone)]
pub struct EventStore {
    n_events: usize,
    column_names: Vec<String>,
    columns: Vec<Vec<f64>>,
    name_to_index: HashMap<String, usize>,
    bounds: HashMap<String, (f64, f64)>,
    weights: Option<Vec<f64>>,
}

impl EventStore {
    /// Create an [`EventStore`] from already materialized columns.
    ///
    /// `observables` defines which columns are required and their bounds. Extra columns are
    /// ignored. Values must be finite and inside the bounds; weights, when given, must be
    /// finite and non-negative.
    pub fn from_columns(
        observables: Vec<ObservableSpec>,
        columns: impl IntoIterator<Item = (String, Vec<f64>)>,
        weights: Option<Vec<f64>>,
    ) -> Result<Self> {
        if observables.is_empty() {
            return Err(Error::Validation("EventStore requires at least one observable".into()));
        }

        let mut by_name: BTreeMap<String, Vec<f64>> = columns.into_iter().collect();

        let mut column_names = Vec::with_capacity(observables.len());
        let mut cols = Vec::with_capacity(observables.len());
        let mut bounds = HashMap::with_capacity(observables.len());
        let mut n_events: Option<usize> = None;

        for obs in &observables {
            let (lo, hi) = obs.bounds;
            if !(lo.is_finite() && hi.is_finite() && lo < hi) {
                return Err(Error::Validation(format!(
                    "invalid bounds for observable '{}': expected finite low < high, got ({lo}, {hi})",
                    obs.name
                )));
            }
            let col = by_name.remove(&obs.name).ok_or_else(|| {
                Error::Validation(format!("missing observable column '{}'", obs.name))
            })?;
            match n_events {
                Some(ne) if ne != col.len() => {
                    return Err(Error::Validation(format!(
                        "column length mismatch for '{}': expected {ne}, got {}",
                        obs.name,
                        col.len()
                    )));
                }
                Some(_) => {}
                None => n_events = Some(col.len()),
            }
            if col.iter().any(|x| !x.is_finite()) {
                return Err(Error::Validation(format!(
                    "observable '{}' contains non-finite values",
                    obs.name
                )));
            }
            if col.iter().any(|&x| x < lo || x > hi) {
                return Err(Error::Validation(format!(
                    "observable '{}' contains values outside bounds ({lo}, {hi})",
                    obs.name
                )));
            }
            column_names.push(obs.name.clone());
            cols.push(col);
            bounds.insert(obs.name.clone(), obs.bounds);
        }

        let n_events = n_events.unwrap_or(0);

        if let Some(w) = &weights {
            if w.len() != n_events {
                return Err(Error::Validation(format!(
                    "weights length mismatch: expected {n_events}, got {}",
                    w.len()
                )));
            }
            if w.iter().any(|x| !x.is_finite() || *x < 0.0) {
                return Err(Error::Validation("weights must be finite and >= 0".into()));
            }
        }

        let name_to_index =
            column_names.iter().enumerate().map(|(i, n)| (n.clone(), i)).collect::<HashMap<_, _>>();

        Ok(Self { n_events, column_names, columns: cols, name_to_index, bounds, weights })
    }

    /// Single-observable store from a histogram: one weighted event per bin at the bin centre.
    ///
    /// Negative bin contents are zeroed. The observable bounds are the outer bin edges.
    pub fn from_histogram(name: impl Into<String>, edges: &[f64], contents: &[f64]) -> Result<Self> {
        if edges.len() < 2 || contents.len() + 1 != edges.len() {
            return Err(Error::Validation(format!(
                "histogram needs len(edges) == len(contents) + 1 >= 2, got {} edges and {} bins",
                edges.len(),
                contents.len()
            )));
        }
        if edges.windows(2).any(|w| w[0].partial_cmp(&w[1]) != Some(core::cmp::Ordering::Less)) {
            return Err(Error::Validation("histogram edges must be strictly increasing".into()));
        }
        let name = name.into();
        let centers = edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();
        let weights = contents.iter().map(|&c| if c > 0.0 { c } else { 0.0 }).collect();
        let bounds = (edges[0], edges[edges.len() - 1]);
        Self::from_columns(
            vec![ObservableSpec::new(name.clone(), bounds)],
            vec![(name, centers)],
            Some(weights),
        )
    }

    /// Number of events.
    pub fn n_events(&self) -> usize {
        self.n_events
    }

    /// Names of stored columns (stable order).
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Get a column by name.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        let idx = self.name_to_index.get(name).copied()?;
        self.columns.get(idx).map(|c| c.as_slice())
    }

    /// Bounds for an observable, if defined.
    pub fn bounds(&self, name: &str) -> Option<(f64, f64)> {
        self.bounds.get(name).copied()
    }

    /// Optional per-event weights.
    pub fn weights(&self) -> Option<&[f64]> {
        self.weights.as_deref()
    }

    /// Sum of weights (event count when unweighted).
    pub fn sum_weights(&self) -> f64 {
        match &self.weights {
            Some(w) => w.iter().sum(),
            None => self.n_events as f64,
        }
    }

    /// Column and bounds for `name`, or a validation error naming what is missing.
    pub fn column_with_bounds(&self, name: &str) -> Result<(&[f64], (f64, f64))> {
        let xs = self
            .column(name)
            .ok_or_else(|| Error::Validation(format!("missing column '{name}'")))?;
        let bounds = self
            .bounds(name)
            .ok_or_else(|| Error::Validation(format!("missing bounds for '{name}'")))?;
        Ok((xs, bounds))
    }
}
