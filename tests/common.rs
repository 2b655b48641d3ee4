//! Shared fixtures: a deterministic synthetic run-level collection
//! (2 subjects × 2 runs × 16 events per run).
use ndarray::Array1;
use neurodm::{
    entities, merge_variables, CollectionConfig, Entities, RunInfo, SparseRunVariable, Values,
    Variable, VariableCollection,
};

#[allow(unused)]
pub const N_EVENTS: usize = 16;
#[allow(unused)]
pub const N_RUNS: usize = 4;
#[allow(unused)]
pub const RUN_DURATION: f64 = 64.0;

#[allow(unused)]
pub fn run_info(subject: &str, run: i64) -> RunInfo {
    let mut ents = entities([("subject", subject), ("task", "gamble")]);
    ents.insert("run".into(), run.into());
    RunInfo::new(ents, RUN_DURATION, 2.0, 32)
}

#[allow(unused)]
pub fn all_runs() -> Vec<RunInfo> {
    vec![
        run_info("01", 1),
        run_info("01", 2),
        run_info("02", 1),
        run_info("02", 2),
    ]
}

/// Event onsets within a run: every 4 s, duration 3 s — no overlap, and the
/// last event (onset 60) ends inside the 64 s run.
#[allow(unused)]
pub fn sparse_from(name: &str, f: impl Fn(usize) -> f64, runs: &[RunInfo]) -> Variable {
    let parts: Vec<Variable> = runs
        .iter()
        .enumerate()
        .map(|(ri, run)| {
            let values = Array1::from_iter((0..N_EVENTS).map(|i| f(ri * N_EVENTS + i)));
            let onset = Array1::from_iter((0..N_EVENTS).map(|i| i as f64 * 4.0));
            let duration = Array1::from_elem(N_EVENTS, 3.0);
            let ents: Vec<Entities> = (0..N_EVENTS).map(|_| run.entities.clone()).collect();
            Variable::Sparse(
                SparseRunVariable::new(
                    name,
                    Values::Numeric(values),
                    onset,
                    duration,
                    ents,
                    vec![run.clone()],
                )
                .unwrap(),
            )
        })
        .collect();
    merge_variables(&parts, None).unwrap()
}

#[allow(unused)]
pub fn categorical_from(name: &str, f: impl Fn(usize) -> String, runs: &[RunInfo]) -> Variable {
    let parts: Vec<Variable> = runs
        .iter()
        .enumerate()
        .map(|(ri, run)| {
            let values: Vec<String> = (0..N_EVENTS).map(|i| f(ri * N_EVENTS + i)).collect();
            let onset = Array1::from_iter((0..N_EVENTS).map(|i| i as f64 * 4.0));
            let duration = Array1::from_elem(N_EVENTS, 3.0);
            let ents: Vec<Entities> = (0..N_EVENTS).map(|_| run.entities.clone()).collect();
            Variable::Sparse(
                SparseRunVariable::new(
                    name,
                    Values::Categorical(values),
                    onset,
                    duration,
                    ents,
                    vec![run.clone()],
                )
                .unwrap(),
            )
        })
        .collect();
    merge_variables(&parts, None).unwrap()
}

// Deterministic synthetic signals. `gain` carries half of `RT`, so the two
// stay materially correlated within every run.
#[allow(unused)]
pub fn rt(g: usize) -> f64 {
    1.5 + (g as f64 * 0.37).sin() * 0.5
}

#[allow(unused)]
pub fn gain(g: usize) -> f64 {
    0.5 * rt(g) + (g as f64 * 0.23).cos() * 0.3 + 1.0
}

#[allow(unused)]
pub fn respcat(g: usize) -> f64 {
    (g % 3) as f64 - 1.0
}

#[allow(unused)]
pub fn respnum(g: usize) -> f64 {
    (g % 5) as f64
}

#[allow(unused)]
pub fn collection() -> VariableCollection {
    let runs = all_runs();
    let vars = vec![
        sparse_from("RT", rt, &runs),
        sparse_from("gain", gain, &runs),
        sparse_from("respcat", respcat, &runs),
        sparse_from("respnum", respnum, &runs),
        categorical_from("trial_type", |_| "gamble".to_string(), &runs),
    ];
    VariableCollection::new(vars, CollectionConfig::default())
}

/// Pearson correlation between two equal-length slices.
#[allow(unused)]
pub fn corr(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len() as f64;
    let ma = a.iter().sum::<f64>() / n;
    let mb = b.iter().sum::<f64>() / n;
    let cov: f64 = a.iter().zip(b).map(|(x, y)| (x - ma) * (y - mb)).sum();
    let va: f64 = a.iter().map(|x| (x - ma) * (x - ma)).sum();
    let vb: f64 = b.iter().map(|y| (y - mb) * (y - mb)).sum();
    cov / (va.sqrt() * vb.sqrt())
}
