mod common;
use common::*;

use approx::assert_abs_diff_eq;
use ndarray::array;
use neurodm::{
    apply_transform as apply, entities, get_grouper, CollectionConfig, Comparison, Error,
    FactorConstraint, Predicate, ReplaceAttr, RunInfo, SparseRunVariable, TransformOptions,
    Transformation, Value, Values, VarAttr, Variable, VariableCollection,
};

fn out(names: &[&str]) -> TransformOptions {
    TransformOptions {
        outputs: names.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

fn by_run_subject() -> Vec<String> {
    vec!["run".to_string(), "subject".to_string()]
}

#[test]
fn product_multiplies_rowwise() {
    let mut c = collection();
    apply(&mut c, &Transformation::Product, &["gain", "RT"], &out(&["prod"])).unwrap();
    let prod = c.require("prod").unwrap().numeric().unwrap().clone();
    let gain = c.require("gain").unwrap().numeric().unwrap();
    let rt = c.require("RT").unwrap().numeric().unwrap();
    for i in 0..prod.len() {
        assert_abs_diff_eq!(prod[i], gain[i] * rt[i], epsilon = 1e-12);
    }
}

#[test]
fn sum_validates_weight_arity() {
    let mut c = collection();
    apply(
        &mut c,
        &Transformation::Sum { weights: None },
        &["gain", "RT"],
        &out(&["sum"]),
    )
    .unwrap();
    let plain = c.require("sum").unwrap().numeric().unwrap().clone();

    apply(
        &mut c,
        &Transformation::Sum { weights: Some(vec![2.0, 2.0]) },
        &["gain", "RT"],
        &out(&["sum"]),
    )
    .unwrap();
    let doubled = c.require("sum").unwrap().numeric().unwrap();
    for i in 0..plain.len() {
        assert_abs_diff_eq!(doubled[i], 2.0 * plain[i], epsilon = 1e-12);
    }

    let bad = apply(
        &mut c,
        &Transformation::Sum { weights: Some(vec![1.0, 1.0, 1.0]) },
        &["gain", "RT"],
        &out(&["sum"]),
    );
    assert!(matches!(bad, Err(Error::ParameterValidation(_))));
}

#[test]
fn scale_zscores_per_group() {
    let reference = collection();
    let mut c = collection();
    let opts = TransformOptions {
        outputs: vec!["RT_Z".into()],
        groupby: by_run_subject(),
        ..Default::default()
    };
    apply(
        &mut c,
        &Transformation::Scale { demean: true, rescale: true },
        &["RT"],
        &opts,
    )
    .unwrap();

    let rt_var = reference.require("RT").unwrap();
    let y = rt_var.numeric().unwrap();
    let z = c.require("RT_Z").unwrap().numeric().unwrap();
    for rows in get_grouper(&rt_var.index(), &by_run_subject()).values() {
        let n = rows.len() as f64;
        let mean: f64 = rows.iter().map(|&i| y[i]).sum::<f64>() / n;
        let std: f64 =
            (rows.iter().map(|&i| (y[i] - mean) * (y[i] - mean)).sum::<f64>() / (n - 1.0)).sqrt();
        for &i in rows {
            assert_abs_diff_eq!(z[i], (y[i] - mean) / std, epsilon = 1e-10);
        }
    }
}

#[test]
fn demean_centers_in_place() {
    let mut c = collection();
    apply(&mut c, &Transformation::Demean, &["gain"], &TransformOptions::default()).unwrap();
    let demeaned = c.require("gain").unwrap().numeric().unwrap();
    assert_abs_diff_eq!(demeaned.sum(), 0.0, epsilon = 1e-9);
}

#[test]
fn orthogonalize_sparse_decorrelates_per_group() {
    let mut c = collection();
    let pre = c.require("gain").unwrap().numeric().unwrap().to_vec();
    let rt_vals = c.require("RT").unwrap().numeric().unwrap().to_vec();
    let index = c.require("RT").unwrap().index();

    let opts = TransformOptions { groupby: by_run_subject(), ..Default::default() };
    apply(
        &mut c,
        &Transformation::Orthogonalize { other: vec!["RT".into()] },
        &["gain"],
        &opts,
    )
    .unwrap();
    let post = c.require("gain").unwrap().numeric().unwrap().to_vec();

    let mut any_pre_correlated = false;
    for rows in get_grouper(&index, &by_run_subject()).values() {
        let gather = |xs: &[f64]| rows.iter().map(|&i| xs[i]).collect::<Vec<_>>();
        let pre_r = corr(&gather(&pre), &gather(&rt_vals));
        let post_r = corr(&gather(&post), &gather(&rt_vals));
        if pre_r.abs() > 0.2 {
            any_pre_correlated = true;
        }
        assert!(post_r.abs() < 1e-4, "group still correlated: {post_r}");
    }
    assert!(any_pre_correlated, "fixture should start correlated");
}

#[test]
fn orthogonalize_dense_aligns_on_a_shared_grid() {
    let mut c = collection();
    let rt_dense = match c.require("RT").unwrap() {
        Variable::Sparse(s) => s.to_dense(10.0).unwrap(),
        other => panic!("expected sparse, got {other:?}"),
    };
    let gain_dense = match c.require("gain").unwrap() {
        Variable::Sparse(s) => s.to_dense(10.0).unwrap(),
        other => panic!("expected sparse, got {other:?}"),
    };
    assert!(corr(&rt_dense.values.to_vec(), &gain_dense.values.to_vec()).abs() > 0.2);

    let opts = TransformOptions { dense: true, ..Default::default() };
    apply(
        &mut c,
        &Transformation::Orthogonalize { other: vec!["RT".into()] },
        &["gain"],
        &opts,
    )
    .unwrap();

    let post = c.require("gain").unwrap();
    assert!(matches!(post, Variable::Dense(_)));
    assert_eq!(post.len(), N_RUNS * 640);
    let post_r = corr(&post.numeric().unwrap().to_vec(), &rt_dense.values.to_vec());
    assert!(post_r.abs() < 1e-4, "dense residual still correlated: {post_r}");
}

#[test]
fn threshold_binarize_counts_survivors() {
    let mut c = collection();
    apply(&mut c, &Transformation::Demean, &["gain"], &TransformOptions::default()).unwrap();
    let vals = c.require("gain").unwrap().numeric().unwrap().clone();
    let expected = vals.iter().filter(|&&v| v >= 0.2).count() as f64;
    assert!(expected > 0.0 && expected < vals.len() as f64);

    apply(
        &mut c,
        &Transformation::Threshold { threshold: 0.2, binarize: true, above: true, signed: true },
        &["gain"],
        &out(&["pg_bin"]),
    )
    .unwrap();
    let bin = c.require("pg_bin").unwrap().numeric().unwrap();
    assert!(bin.iter().all(|&v| v == 0.0 || v == 1.0));
    assert_abs_diff_eq!(bin.sum(), expected, epsilon = 1e-12);
}

#[test]
fn threshold_unsigned_below_keeps_small_magnitudes() {
    let mut c = collection();
    apply(&mut c, &Transformation::Demean, &["gain"], &TransformOptions::default()).unwrap();
    let vals = c.require("gain").unwrap().numeric().unwrap().clone();
    let expected = vals.iter().filter(|&&v| v.abs() <= 0.1).count() as f64;

    apply(
        &mut c,
        &Transformation::Threshold {
            threshold: -0.1,
            binarize: true,
            above: false,
            signed: false,
        },
        &["gain"],
        &out(&["small"]),
    )
    .unwrap();
    assert_abs_diff_eq!(
        c.require("small").unwrap().numeric().unwrap().sum(),
        expected,
        epsilon = 1e-12
    );
}

#[test]
fn factor_full_rank_indicators_sum_to_one() {
    let mut c = collection();
    apply(
        &mut c,
        &Transformation::Factor { constraint: FactorConstraint::FullRank, sep: ".".into() },
        &["respcat"],
        &TransformOptions::default(),
    )
    .unwrap();
    assert!(!c.contains("respcat"));
    let names = ["respcat.-1", "respcat.0", "respcat.1"];
    let cols: Vec<_> = names
        .iter()
        .map(|n| c.require(n).unwrap().numeric().unwrap().clone())
        .collect();
    for col in &cols {
        assert!(col.iter().all(|&v| v == 0.0 || v == 1.0));
    }
    for i in 0..cols[0].len() {
        let row_sum: f64 = cols.iter().map(|col| col[i]).sum();
        assert_eq!(row_sum, 1.0);
    }
}

#[test]
fn factor_drop_one_omits_first_level() {
    let mut c = collection();
    apply(
        &mut c,
        &Transformation::Factor { constraint: FactorConstraint::DropOne, sep: ".".into() },
        &["respcat"],
        &TransformOptions::default(),
    )
    .unwrap();
    assert!(!c.contains("respcat.-1"));
    let cols: Vec<_> = ["respcat.0", "respcat.1"]
        .iter()
        .map(|n| c.require(n).unwrap().numeric().unwrap().clone())
        .collect();
    for i in 0..cols[0].len() {
        let row_sum: f64 = cols.iter().map(|col| col[i]).sum();
        assert!(row_sum == 0.0 || row_sum == 1.0);
    }
}

#[test]
fn factor_mean_zero_rows_sum_to_plus_or_minus_one() {
    let mut c = collection();
    apply(
        &mut c,
        &Transformation::Factor { constraint: FactorConstraint::MeanZero, sep: ".".into() },
        &["respcat"],
        &TransformOptions::default(),
    )
    .unwrap();
    let cols: Vec<_> = ["respcat.0", "respcat.1"]
        .iter()
        .map(|n| c.require(n).unwrap().numeric().unwrap().clone())
        .collect();
    for col in &cols {
        assert!(col.iter().all(|&v| v == 1.0 || v == 0.0 || v == -0.5));
    }
    for i in 0..cols[0].len() {
        let row_sum: f64 = cols.iter().map(|col| col[i]).sum();
        assert!(row_sum == 1.0 || row_sum == -1.0, "row {i} sums to {row_sum}");
    }
}

#[test]
fn factor_single_level_keeps_one_indicator() {
    let mut c = collection();
    apply(
        &mut c,
        &Transformation::Factor { constraint: FactorConstraint::MeanZero, sep: ".".into() },
        &["trial_type"],
        &TransformOptions::default(),
    )
    .unwrap();
    let ind = c.require("trial_type.gamble").unwrap().numeric().unwrap();
    assert!(ind.iter().all(|&v| v == 1.0));
}

#[test]
fn factor_honors_separator() {
    let mut c = collection();
    apply(
        &mut c,
        &Transformation::Factor { constraint: FactorConstraint::FullRank, sep: "@".into() },
        &["trial_type"],
        &TransformOptions::default(),
    )
    .unwrap();
    assert!(c.contains("trial_type@gamble"));
}

#[test]
fn split_sparse_by_variable_preserves_onsets() {
    let mut c = collection();
    let mut pre_onsets = match c.require("RT").unwrap() {
        Variable::Sparse(s) => s.onset.to_vec(),
        other => panic!("expected sparse, got {other:?}"),
    };

    apply(
        &mut c,
        &Transformation::Split { by: vec!["respcat".into()], drop_orig: true },
        &["RT"],
        &TransformOptions::default(),
    )
    .unwrap();
    assert!(!c.contains("RT"));

    let mut post_onsets = Vec::new();
    for name in ["RT.-1", "RT.0", "RT.1"] {
        match c.require(name).unwrap() {
            Variable::Sparse(s) => post_onsets.extend(s.onset.iter().copied()),
            other => panic!("expected sparse, got {other:?}"),
        }
    }
    pre_onsets.sort_by(|a, b| a.total_cmp(b));
    post_onsets.sort_by(|a, b| a.total_cmp(b));
    assert_eq!(pre_onsets, post_onsets);
}

#[test]
fn split_by_variable_and_entity_joins_labels() {
    let mut c = collection();
    apply(
        &mut c,
        &Transformation::Split { by: vec!["respcat".into(), "run".into()], drop_orig: true },
        &["gain"],
        &TransformOptions::default(),
    )
    .unwrap();
    assert!(c.contains("gain.-1_1"));
    assert!(c.contains("gain.1_2"));
}

#[test]
fn split_dense_multiplies_factored_indicators() {
    let mut c = collection();
    let dense = match c.require("RT").unwrap() {
        Variable::Sparse(s) => {
            let mut d = s.to_dense(10.0).unwrap();
            d.name = "RT_d".into();
            d
        }
        other => panic!("expected sparse, got {other:?}"),
    };
    let n = dense.values.len();
    c.insert(Variable::Dense(dense));

    apply(
        &mut c,
        &Transformation::Split { by: vec!["respcat".into()], drop_orig: false },
        &["RT_d"],
        &TransformOptions::default(),
    )
    .unwrap();
    assert!(c.contains("RT_d"));
    for name in ["RT_d.respcat[-1]", "RT_d.respcat[0]", "RT_d.respcat[1]"] {
        assert_eq!(c.require(name).unwrap().len(), n);
    }
}

#[test]
fn filter_on_own_and_auxiliary_values() {
    let mut c = collection();
    let expected = (0..N_RUNS * N_EVENTS).filter(|&g| respcat(g) > 0.0).count();
    apply(
        &mut c,
        &Transformation::Filter {
            predicate: Predicate::new(Comparison::Gt, 0.0),
            by: None,
        },
        &["respcat"],
        &TransformOptions::default(),
    )
    .unwrap();
    let respcat_var = c.require("respcat").unwrap();
    assert_eq!(respcat_var.len(), expected);
    assert!(respcat_var.numeric().unwrap().iter().all(|&v| v > 0.0));

    let by_expected = (0..N_RUNS * N_EVENTS).filter(|&g| gain(g) > 1.8).count();
    apply(
        &mut c,
        &Transformation::Filter {
            predicate: Predicate::new(Comparison::Gt, 1.8),
            by: Some("gain".into()),
        },
        &["RT"],
        &TransformOptions::default(),
    )
    .unwrap();
    assert_eq!(c.require("RT").unwrap().len(), by_expected);
}

#[test]
fn replace_rewrites_values_durations_and_onsets() {
    let mut c = collection();
    apply(
        &mut c,
        &Transformation::Replace {
            mapping: vec![(Value::Num(-1.0), Value::Num(5.0))],
            attr: ReplaceAttr::Values,
        },
        &["respcat"],
        &TransformOptions::default(),
    )
    .unwrap();
    let vals = c.require("respcat").unwrap().numeric().unwrap();
    assert!(vals.iter().all(|&v| v == 5.0 || v == 0.0 || v == 1.0));
    assert!(vals.iter().any(|&v| v == 5.0));

    apply(
        &mut c,
        &Transformation::Replace {
            mapping: vec![(Value::Num(3.0), Value::Num(2.0))],
            attr: ReplaceAttr::Duration,
        },
        &["gain"],
        &TransformOptions::default(),
    )
    .unwrap();
    apply(
        &mut c,
        &Transformation::Replace {
            mapping: vec![(Value::Num(0.0), Value::Num(0.5))],
            attr: ReplaceAttr::Onset,
        },
        &["gain"],
        &TransformOptions::default(),
    )
    .unwrap();
    match c.require("gain").unwrap() {
        Variable::Sparse(s) => {
            assert!(s.duration.iter().all(|&d| d == 2.0));
            assert_eq!(s.onset[0], 0.5);
            assert_eq!(s.onset[1], 4.0);
        }
        other => panic!("expected sparse, got {other:?}"),
    }
}

#[test]
fn and_or_not_combine_indicators() {
    let mut c = collection();
    apply(
        &mut c,
        &Transformation::Factor { constraint: FactorConstraint::FullRank, sep: ".".into() },
        &["respnum"],
        &TransformOptions::default(),
    )
    .unwrap();
    let names: Vec<String> = (0..5).map(|d| format!("respnum.{d}")).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();

    apply(&mut c, &Transformation::Or, &name_refs, &out(&["disjunction"])).unwrap();
    assert!(c
        .require("disjunction")
        .unwrap()
        .numeric()
        .unwrap()
        .iter()
        .all(|&v| v == 1.0));

    apply(&mut c, &Transformation::And, &name_refs, &out(&["conjunction"])).unwrap();
    assert_eq!(c.require("conjunction").unwrap().numeric().unwrap().sum(), 0.0);

    apply(&mut c, &Transformation::Not, &["respnum.0"], &out(&["not0"])).unwrap();
    let ind = c.require("respnum.0").unwrap().numeric().unwrap();
    let not0 = c.require("not0").unwrap().numeric().unwrap();
    for i in 0..ind.len() {
        assert_eq!(not0[i], 1.0 - ind[i]);
    }
}

#[test]
fn drop_na_compacts_rows_in_lockstep() {
    let run = RunInfo::new(entities([("subject", "01")]), 20.0, 2.0, 10);
    let var = SparseRunVariable::new(
        "var",
        Values::Numeric(array![1.0, 1.0, f64::NAN, 1.0]),
        array![2.0, 5.0, 11.0, 17.0],
        array![1.2, 1.6, 0.8, 2.0],
        vec![run.entities.clone(); 4],
        vec![run],
    )
    .unwrap();
    let mut c = VariableCollection::new(
        vec![Variable::Sparse(var)],
        CollectionConfig::default(),
    );

    apply(&mut c, &Transformation::DropNa, &["var"], &TransformOptions::default()).unwrap();
    match c.require("var").unwrap() {
        Variable::Sparse(s) => {
            assert_eq!(s.values.as_numeric().unwrap().to_vec(), vec![1.0, 1.0, 1.0]);
            assert_eq!(s.onset.to_vec(), vec![2.0, 5.0, 17.0]);
            assert_eq!(s.duration.to_vec(), vec![1.2, 1.6, 2.0]);
            assert_eq!(s.entities.len(), 3);
        }
        other => panic!("expected sparse, got {other:?}"),
    }
}

#[test]
fn assign_swaps_attributes_between_variables() {
    let mut c = collection();
    let gain_vals = c.require("gain").unwrap().numeric().unwrap().clone();
    let (rt_vals, rt_onset, rt_duration) = match c.require("RT").unwrap() {
        Variable::Sparse(s) => (
            s.values.as_numeric().unwrap().clone(),
            s.onset.clone(),
            s.duration.clone(),
        ),
        other => panic!("expected sparse, got {other:?}"),
    };

    apply(
        &mut c,
        &Transformation::Assign {
            target: "RT".into(),
            input_attr: VarAttr::Amplitude,
            target_attr: VarAttr::Onset,
        },
        &["gain"],
        &out(&["test1"]),
    )
    .unwrap();
    match c.require("test1").unwrap() {
        Variable::Sparse(s) => {
            assert_eq!(s.onset, gain_vals);
            assert_eq!(s.duration, rt_duration);
            assert_eq!(s.values.as_numeric().unwrap(), &rt_vals);
        }
        other => panic!("expected sparse, got {other:?}"),
    }

    apply(
        &mut c,
        &Transformation::Assign {
            target: "gain".into(),
            input_attr: VarAttr::Onset,
            target_attr: VarAttr::Amplitude,
        },
        &["RT"],
        &out(&["test2"]),
    )
    .unwrap();
    let t2 = c.require("test2").unwrap();
    assert_eq!(t2.numeric().unwrap(), &rt_onset);
}

#[test]
fn copy_duplicates_under_a_new_name() {
    let mut c = collection();
    apply(&mut c, &Transformation::Copy, &["RT"], &out(&["RT_copy"])).unwrap();
    assert_eq!(
        c.require("RT_copy").unwrap().numeric().unwrap(),
        c.require("RT").unwrap().numeric().unwrap()
    );
}

#[test]
fn regex_expansion_checks_output_arity() {
    let mut c = collection();

    // ^resp expands to {respcat, respnum}: one output name is an arity error.
    let opts = TransformOptions {
        outputs: vec!["only_one".into()],
        regex_inputs: true,
        ..Default::default()
    };
    let bad = apply(&mut c, &Transformation::Copy, &["^resp"], &opts);
    assert!(matches!(bad, Err(Error::ExpansionArity { inputs: 2, outputs: 1 })));

    // No outputs at all: copy refuses to overwrite its inputs.
    let opts = TransformOptions { regex_inputs: true, ..Default::default() };
    let bad = apply(&mut c, &Transformation::Copy, &["^resp"], &opts);
    assert!(matches!(bad, Err(Error::ParameterValidation(_))));

    // Suffix naming expands cleanly.
    let opts = TransformOptions {
        output_suffix: Some("_copy".into()),
        regex_inputs: true,
        ..Default::default()
    };
    apply(&mut c, &Transformation::Copy, &["^resp"], &opts).unwrap();
    assert!(c.contains("respcat_copy"));
    assert!(c.contains("respnum_copy"));

    // A pattern matching nothing is a missing-variable error.
    let opts = TransformOptions { regex_inputs: true, ..Default::default() };
    let bad = apply(&mut c, &Transformation::Delete, &["^zzz"], &opts);
    assert!(matches!(bad, Err(Error::MissingVariable(_))));
}

#[test]
fn unknown_variable_names_are_rejected() {
    let mut c = collection();
    let bad = apply(
        &mut c,
        &Transformation::Scale { demean: true, rescale: true },
        &["nope"],
        &TransformOptions::default(),
    );
    assert!(matches!(bad, Err(Error::MissingVariable(_))));
}

#[test]
fn rename_select_delete_manage_the_catalog() {
    let mut c = collection();
    apply(&mut c, &Transformation::Rename, &["RT"], &out(&["reaction_time"])).unwrap();
    assert!(!c.contains("RT"));
    assert_eq!(c.require("reaction_time").unwrap().name(), "reaction_time");

    apply(
        &mut c,
        &Transformation::Select,
        &["reaction_time", "gain"],
        &TransformOptions::default(),
    )
    .unwrap();
    assert_eq!(c.names(), vec!["gain", "reaction_time"]);

    apply(&mut c, &Transformation::Delete, &["gain"], &TransformOptions::default()).unwrap();
    assert!(!c.contains("gain"));
}
