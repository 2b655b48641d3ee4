//! # neurodm — event variables and design matrices for neuroimaging datasets
//!
//! `neurodm` models the experimental-event and metadata variables extracted
//! from datasets organized under the BIDS directory/filename convention and
//! turns them into design-matrix columns for statistical modeling. The crate
//! covers the variable representation and transformation engine: the dual
//! sparse/dense data model, the densification/resampling bridge between
//! event-based and continuous representations, and a catalog of named
//! transformations over collections of aligned variables. Dataset discovery
//! and index persistence are external collaborators — the core consumes
//! already-parsed tables and run descriptors.
//!
//! ## Pipeline overview
//!
//! ```text
//! sub-*/func/*_events.tsv          participants.tsv
//!   │                                │
//!   ├─ load::read_tsv()             typed columns (numeric / text, n/a → NaN)
//!   ├─ load::load_variables()       per-run sparse variables, merged by name,
//!   │                               keyed by analysis level
//!   ├─ VariableCollection           name → variable map over shared config
//!   ├─ transform::apply()           scale / factor / orthogonalize / ...
//!   ├─ resample(force_dense)        sparse events → dense series at one rate
//!   └─ get_design_matrix()          long-format {onset, duration, amplitude,
//!        │                           condition, entities} table
//!        └─→ design_matrix.tsv
//! ```
//!
//! ## Quick start
//!
//! ```
//! use ndarray::array;
//! use neurodm::{
//!     entities, CollectionConfig, RunInfo, SparseRunVariable, Values, Variable,
//!     VariableCollection,
//! };
//!
//! // One 20 s run for subject 01, and a reaction-time event variable.
//! let run = RunInfo::new(entities([("subject", "01")]), 20.0, 2.0, 10);
//! let rt = SparseRunVariable::new(
//!     "RT",
//!     Values::Numeric(array![1.0, 0.4, 0.7]),
//!     array![2.0, 5.0, 11.0],
//!     array![1.2, 1.6, 0.8],
//!     vec![run.entities.clone(); 3],
//!     vec![run],
//! )
//! .unwrap();
//!
//! let mut coll = VariableCollection::new(
//!     vec![Variable::Sparse(rt)],
//!     CollectionConfig::default(),
//! );
//!
//! // Densify everything at 10 Hz, then pull the long-format design matrix.
//! coll.resample(10.0, true, Default::default()).unwrap();
//! let dm = coll.get_design_matrix(None, &[], &[]).unwrap();
//! assert_eq!(dm.len(), 200); // ceil(20 s × 10 Hz)
//! ```
//!
//! ## Applying transformations
//!
//! ```
//! use ndarray::array;
//! use neurodm::{
//!     apply_transform, entities, CollectionConfig, RunInfo, SparseRunVariable,
//!     Transformation, TransformOptions, Values, Variable, VariableCollection,
//! };
//!
//! let run = RunInfo::new(entities([("subject", "01")]), 20.0, 2.0, 10);
//! let make = |name: &str, vals| {
//!     Variable::Sparse(SparseRunVariable::new(
//!         name,
//!         Values::Numeric(vals),
//!         array![2.0, 5.0, 11.0],
//!         array![1.0, 1.0, 1.0],
//!         vec![run.entities.clone(); 3],
//!         vec![run.clone()],
//!     ).unwrap())
//! };
//! let mut coll = VariableCollection::new(
//!     vec![make("gain", array![1.0, 2.0, 3.0]), make("loss", array![4.0, 5.0, 6.0])],
//!     CollectionConfig::default(),
//! );
//!
//! let opts = TransformOptions { outputs: vec!["total".into()], ..Default::default() };
//! apply_transform(
//!     &mut coll,
//!     &Transformation::Sum { weights: None },
//!     &["gain", "loss"],
//!     &opts,
//! )
//! .unwrap();
//! assert_eq!(coll.require("total").unwrap().numeric().unwrap().to_vec(), vec![5.0, 7.0, 9.0]);
//! ```

pub mod collection;
pub mod entities;
pub mod error;
pub mod load;
pub mod resample;
pub mod transform;
pub mod variable;

// ── Crate-root re-exports ─────────────────────────────────────────────────
//
// Everything a downstream user is likely to need is available directly as
// `neurodm::Foo` without having to know the internal module layout.

// collection
pub use collection::{
    get_grouper, CollectionConfig, DesignMatrix, DesignRow, VariableCollection,
};

// entities
pub use entities::{entities, fmt_num, AggFunc, Entities, Level, RunInfo, Value};

// error
pub use error::{Error, Result};

// load — table ingestion, level-keyed datasets, TSV helpers
pub use load::{
    load_participants, load_run_events, load_variables, parse_tsv, read_tsv,
    write_design_matrix_tsv, Column, Dataset, Table,
};

// resample — interpolation kernel + supporting math
pub use resample::{interp1d, n_resampled, sample_grid, Kind};

// transform — catalog, descriptor, driver
pub use transform::{
    apply as apply_transform, Comparison, FactorConstraint, Predicate, ReplaceAttr,
    TransformOptions, TransformSpec, TransformStep, Transformation, VarAttr,
};

// variable hierarchy
pub use variable::{
    merge_variables, CloneOverrides, DenseRunVariable, SimpleVariable, SparseRunVariable,
    Values, Variable,
};

/// Run a transformation pipeline over a collection, then extract the
/// long-format design matrix.
///
/// This is the main entry point for callers that hold an assembled
/// [`VariableCollection`] and a declarative list of steps: each step is
/// applied in order (mutating the collection in place), and the selected
/// columns are joined into one table tagged by condition name.
///
/// # Errors
///
/// Fails on the first step that references an unknown variable, declares an
/// incompatible output arity, or violates an operation's parameter
/// contract; the collection is left in the state produced by the steps that
/// already ran.
pub fn build_design_matrix(
    collection: &mut VariableCollection,
    steps: &[TransformStep],
    columns: Option<&[String]>,
    groupby: &[String],
    filters: &[(String, Vec<Value>)],
) -> Result<DesignMatrix> {
    for step in steps {
        step.apply(collection)?;
    }
    collection.get_design_matrix(columns, groupby, filters)
}
