//! Toy Z-peak fits: sample pass/fail bins, fit them, and extract the efficiency.

use approx::assert_relative_eq;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Poisson};
use std::sync::Arc;
use tnp_core::traits::LogDensityModel;
use tnp_fit::{
    BinModelSpec, Efficiency, MaximumLikelihoodEstimator, Parameter, Process, TnpBinModel,
    wilson_interval,
};
use tnp_shapes::{BernsteinPdf, EventStore, ModDscbPdf, ObservableSpec, UnbinnedPdf};

const RANGE: (f64, f64) = (60.0, 120.0);

// x0, sigmaL, sigmaR, alphaL, nL1, nL2, fL, alphaR, nR1, nR2, fR
const DSCB_TRUTH: [f64; 11] = [91.0, 2.5, 2.5, 1.2, 2.0, 5.0, 0.5, 1.5, 3.0, 8.0, 0.5];
const BKG_TRUTH: [f64; 2] = [1.0, 0.4];

fn toy_bin(n_sig: usize, n_bkg: usize, seed: u64) -> Arc<EventStore> {
    let mut rng = StdRng::seed_from_u64(seed);
    let sig = ModDscbPdf::new("mass").sample(&DSCB_TRUTH, n_sig, RANGE, &mut rng).unwrap();
    let bkg = BernsteinPdf::new("mass", 1).sample(&BKG_TRUTH, n_bkg, RANGE, &mut rng).unwrap();
    let mut xs = sig.column("mass").unwrap().to_vec();
    xs.extend_from_slice(bkg.column("mass").unwrap());
    Arc::new(
        EventStore::from_columns(
            vec![ObservableSpec::new("mass", RANGE)],
            vec![("mass".to_string(), xs)],
            None,
        )
        .unwrap(),
    )
}

/// Toy bin with Poisson-fluctuated counts around the given means.
fn poisson_toy_bin(mu_sig: f64, mu_bkg: f64, seed: u64) -> Arc<EventStore> {
    let mut rng = StdRng::seed_from_u64(seed ^ 0x9e37_79b9);
    let n_sig = Poisson::new(mu_sig).unwrap().sample(&mut rng) as usize;
    let n_bkg = Poisson::new(mu_bkg).unwrap().sample(&mut rng) as usize;
    toy_bin(n_sig, n_bkg, seed)
}

fn model(data: Arc<EventStore>, n_total: f64) -> TnpBinModel {
    let mut parameters = vec![
        Parameter::new("x0", 90.0, (85.0, 97.0)),
        Parameter::new("sigmaL", 2.0, (0.5, 6.0)),
        Parameter::new("sigmaR", 3.0, (0.5, 6.0)),
    ];
    let names = ModDscbPdf::new("mass").param_names();
    for (name, &v) in names.iter().zip(&DSCB_TRUTH).skip(3) {
        parameters.push(Parameter::fixed(name.clone(), v));
    }
    parameters.push(Parameter::fixed("c0", 1.0));
    parameters.push(Parameter::new("c1", 1.0, (0.0, 5.0)));
    parameters.push(Parameter::new("nSig", 0.5 * n_total, (0.0, 2.0 * n_total)));
    parameters.push(Parameter::new("nBkg", 0.5 * n_total, (0.0, 2.0 * n_total)));

    let processes = vec![
        Process {
            name: "signal".into(),
            pdf: Arc::new(ModDscbPdf::new("mass")),
            shape_param_indices: (0..11).collect(),
            yield_index: 13,
        },
        Process {
            name: "background".into(),
            pdf: Arc::new(BernsteinPdf::new("mass", 1)),
            shape_param_indices: vec![11, 12],
            yield_index: 14,
        },
    ];
    TnpBinModel::new(parameters, data, processes).unwrap()
}

#[test]
fn test_pass_fail_fit_recovers_yields_and_efficiency() {
    let pass_data = poisson_toy_bin(2000.0, 500.0, 11);
    let n_pass_events = pass_data.n_events() as f64;
    let pass = model(pass_data, 2500.0);
    let fail = model(poisson_toy_bin(500.0, 1500.0, 12), 2000.0);

    let mle = MaximumLikelihoodEstimator::new();
    let results = mle.fit_batch(&[pass, fail]);
    let pass_fit = results[0].as_ref().unwrap();
    let fail_fit = results[1].as_ref().unwrap();

    let s_pass = pass_fit.value("nSig").unwrap();
    let u_pass = pass_fit.uncertainty("nSig").unwrap();
    assert!(u_pass > 0.0 && u_pass < 200.0, "unc = {u_pass}");
    assert!((s_pass - 2000.0).abs() < 5.0 * u_pass, "nSig = {s_pass} +- {u_pass}");
    // Extended fit: total yield matches the event count.
    let total = s_pass + pass_fit.value("nBkg").unwrap();
    assert_relative_eq!(total, n_pass_events, max_relative = 1e-3);
    assert!((pass_fit.value("x0").unwrap() - 91.0).abs() < 0.5);

    let s_fail = fail_fit.value("nSig").unwrap();
    let u_fail = fail_fit.uncertainty("nSig").unwrap();
    assert!((s_fail - 500.0).abs() < 5.0 * u_fail, "nSig = {s_fail} +- {u_fail}");

    // Fixed parameters carry no uncertainty.
    assert_eq!(pass_fit.uncertainty("alphaL"), Some(0.0));

    let eff = Efficiency::from_fits(pass_fit, fail_fit, 13).unwrap();
    assert!(eff.uncertainty > 0.0 && eff.uncertainty < 0.05);
    assert!((eff.value - 0.8).abs() < 5.0 * eff.uncertainty, "{eff:?}");

    let (lo, hi) = wilson_interval(s_pass, s_fail).unwrap();
    assert!(lo < eff.value && eff.value < hi);
}

#[test]
fn test_histogram_fit_from_json_spec() {
    let events = toy_bin(3000, 1000, 21);
    let xs = events.column("mass").unwrap();
    let edges: Vec<f64> = (0..=60).map(|i| 60.0 + i as f64).collect();
    let mut contents = vec![0.0; 60];
    for &x in xs {
        let bin = ((x - 60.0).floor() as usize).min(59);
        contents[bin] += 1.0;
    }
    let hist = Arc::new(EventStore::from_histogram("mass", &edges, &contents).unwrap());
    assert_relative_eq!(hist.sum_weights(), 4000.0, epsilon = 1e-9);

    let spec = BinModelSpec::from_json_str(
        r#"{
            "observable": { "name": "mass", "bounds": [60.0, 120.0] },
            "parameters": [
                { "name": "x0", "init": 90.0, "bounds": [85.0, 97.0] },
                { "name": "sigmaL", "init": 2.0, "bounds": [0.5, 6.0] },
                { "name": "sigmaR", "init": 3.0, "bounds": [0.5, 6.0] },
                { "name": "alphaL", "init": 1.2 },
                { "name": "nL1", "init": 2.0 },
                { "name": "nL2", "init": 5.0 },
                { "name": "fL", "init": 0.5 },
                { "name": "alphaR", "init": 1.5 },
                { "name": "nR1", "init": 3.0 },
                { "name": "nR2", "init": 8.0 },
                { "name": "fR", "init": 0.5 },
                { "name": "c0", "init": 1.0 },
                { "name": "c1", "init": 1.0, "bounds": [0.0, 5.0] },
                { "name": "nSig", "init": 2000.0, "bounds": [0.0, 8000.0] },
                { "name": "nBkg", "init": 2000.0, "bounds": [0.0, 8000.0] }
            ],
            "signal": {
                "pdf": { "type": "mod_dscb", "params": ["x0", "sigmaL", "sigmaR", "alphaL", "nL1",
                         "nL2", "fL", "alphaR", "nR1", "nR2", "fR"] },
                "yield": "nSig"
            },
            "background": {
                "pdf": { "type": "bernstein", "params": ["c0", "c1"] },
                "yield": "nBkg"
            }
        }"#,
    )
    .unwrap();
    let n_sig = spec.n_sig_index().unwrap();
    let model = spec.compile(hist).unwrap();
    assert_eq!(model.dim(), 15);

    let mle = MaximumLikelihoodEstimator::with_config(spec.optimizer.clone());
    let fit = mle.fit(&model).unwrap();
    let s = fit.parameters[n_sig];
    let u = fit.uncertainties[n_sig];
    // Bin-centre evaluation biases the shape slightly; allow a loose window.
    assert!((s - 3000.0).abs() < 5.0 * u + 60.0, "nSig = {s} +- {u}");
    assert!(fit.nll.is_finite());
}
