//! JSON description of a tag-and-probe bin model and its compilation into a [`TnpBinModel`].
//!
//! ```json
//! {
//!   "observable": { "name": "mass", "bounds": [60.0, 120.0] },
//!   "parameters": [ { "name": "x0", "init": 91.0, "bounds": [85.0, 97.0] }, ... ],
//!   "signal":     { "pdf": { "type": "mod_dscb", "params": ["x0", ...] }, "yield": "nSig" },
//!   "background": { "pdf": { "type": "cms_shape", "params": [...] }, "yield": "nBkg" }
//! }
//! ```

#![allow(missing_docs)]

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tnp_shapes::{
    BernsteinPdf, CbExGaussPdf, CmsShapePdf, EventStore, GaussBernPdf, ModDscbPdf, ObservableSpec,
    UnbinnedPdf,
};

use crate::model::{Parameter, Process, TnpBinModel};
use crate::optimizer::OptimizerConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct BinModelSpec {
    pub observable: ObservableDef,
    pub parameters: Vec<ParameterSpec>,
    pub signal: ProcessSpec,
    pub background: ProcessSpec,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservableDef {
    pub name: String,
    pub bounds: [f64; 2],
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub init: f64,
    /// Omitted bounds mean the parameter is fixed at `init`.
    #[serde(default)]
    pub bounds: Option<[f64; 2]>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessSpec {
    #[serde(default)]
    pub name: Option<String>,
    pub pdf: PdfSpec,
    #[serde(rename = "yield")]
    pub yield_param: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PdfSpec {
    /// `[x0, sigmaL, sigmaR, alphaL, nL1, nL2, fL, alphaR, nR1, nR2, fR]`
    ModDscb { params: Vec<String> },
    /// `params`: `[x0, sigma, alphaL, alphaR]`; the tail orders are the list lengths.
    GaussBern {
        params: Vec<String>,
        #[serde(default)]
        bern_left: Vec<String>,
        #[serde(default)]
        bern_right: Vec<String>,
    },
    /// `[m0, sigma, alpha, n, sigma_2, tail_left]`
    CbExGauss { params: Vec<String> },
    /// `[acms, beta, gamma, peak]`
    CmsShape { params: Vec<String> },
    /// `[c0, ..., cn]`
    Bernstein { params: Vec<String> },
}

impl PdfSpec {
    fn build(&self, observable: &str) -> Result<(Arc<dyn UnbinnedPdf>, Vec<String>)> {
        let check_len = |what: &str, params: &[String], n: usize| -> Result<()> {
            if params.len() != n {
                anyhow::bail!("{what} params must have length {n}, got {}", params.len());
            }
            Ok(())
        };
        Ok(match self {
            PdfSpec::ModDscb { params } => {
                check_len("mod_dscb", params, 11)?;
                (Arc::new(ModDscbPdf::new(observable)), params.clone())
            }
            PdfSpec::GaussBern { params, bern_left, bern_right } => {
                check_len("gauss_bern", params, 4)?;
                let pdf = GaussBernPdf::new(observable, bern_left.len(), bern_right.len());
                let names =
                    params.iter().chain(bern_left).chain(bern_right).cloned().collect::<Vec<_>>();
                (Arc::new(pdf), names)
            }
            PdfSpec::CbExGauss { params } => {
                check_len("cb_ex_gauss", params, 6)?;
                (Arc::new(CbExGaussPdf::new(observable)), params.clone())
            }
            PdfSpec::CmsShape { params } => {
                check_len("cms_shape", params, 4)?;
                (Arc::new(CmsShapePdf::new(observable)), params.clone())
            }
            PdfSpec::Bernstein { params } => {
                if params.is_empty() {
                    anyhow::bail!("bernstein needs at least one coefficient");
                }
                (Arc::new(BernsteinPdf::new(observable, params.len() - 1)), params.clone())
            }
        })
    }
}

impl BinModelSpec {
    /// Parse from a JSON string.
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("failed to parse bin model spec")
    }

    /// The observable as an [`ObservableSpec`].
    pub fn observable_spec(&self) -> ObservableSpec {
        ObservableSpec::new(self.observable.name.clone(), (self.observable.bounds[0], self.observable.bounds[1]))
    }

    /// Index of the signal yield parameter (for efficiency extraction).
    pub fn n_sig_index(&self) -> Result<usize> {
        self.parameters
            .iter()
            .position(|p| p.name == self.signal.yield_param)
            .ok_or_else(|| anyhow::anyhow!("unknown yield parameter: '{}'", self.signal.yield_param))
    }

    /// Build the model on `events`, which must carry the observable with matching bounds.
    pub fn compile(&self, events: Arc<EventStore>) -> Result<TnpBinModel> {
        if self.parameters.is_empty() {
            anyhow::bail!("bin model spec: parameters must be non-empty");
        }

        let obs = &self.observable.name;
        let bounds = events
            .bounds(obs)
            .ok_or_else(|| anyhow::anyhow!("events have no observable '{obs}'"))?;
        let [lo, hi] = self.observable.bounds;
        if (bounds.0 - lo).abs() > 1e-9 || (bounds.1 - hi).abs() > 1e-9 {
            anyhow::bail!(
                "observable '{obs}' bounds mismatch: spec [{lo}, {hi}], events [{}, {}]",
                bounds.0,
                bounds.1
            );
        }

        let mut parameters = Vec::with_capacity(self.parameters.len());
        let mut index_by_name = HashMap::<&str, usize>::new();
        for (i, p) in self.parameters.iter().enumerate() {
            if index_by_name.insert(p.name.as_str(), i).is_some() {
                anyhow::bail!("duplicate parameter name: '{}'", p.name);
            }
            parameters.push(match p.bounds {
                Some([lo, hi]) => Parameter::new(p.name.clone(), p.init, (lo, hi)),
                None => Parameter::fixed(p.name.clone(), p.init),
            });
        }

        let resolve = |name: &str| -> Result<usize> {
            index_by_name
                .get(name)
                .copied()
                .ok_or_else(|| anyhow::anyhow!("unknown parameter name: '{name}'"))
        };

        let mut processes = Vec::with_capacity(2);
        for (default_name, proc) in [("signal", &self.signal), ("background", &self.background)] {
            let name = proc.name.clone().unwrap_or_else(|| default_name.to_string());
            let (pdf, shape_names) =
                proc.pdf.build(obs).with_context(|| format!("process '{name}'"))?;
            let shape_param_indices = shape_names
                .iter()
                .map(|n| resolve(n))
                .collect::<Result<Vec<_>>>()
                .with_context(|| format!("process '{name}' shape parameters"))?;
            let yield_index = resolve(&proc.yield_param)
                .with_context(|| format!("process '{name}' yield"))?;
            processes.push(Process { name, pdf, shape_param_indices, yield_index });
        }

        TnpBinModel::new(parameters, events, processes).context("invalid bin model")
    }
}

/// Read and parse a bin model spec from a JSON file.
pub fn read_bin_model_spec(path: &Path) -> Result<BinModelSpec> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    BinModelSpec::from_json_str(&text)
        .with_context(|| format!("failed to parse bin model spec from {}", path.display()))
}
