//! Ingestion of parsed event and participant tables.
//!
//! The indexing/discovery layer that walks a dataset and resolves metadata
//! inheritance is an external collaborator; this module consumes what it
//! produces — per-run event tables plus run descriptors, and a
//! participants table — and assembles them into level-keyed variable
//! collections. TSV helpers cover the common on-disk shape (`events.tsv`,
//! `participants.tsv`, tab-delimited, `n/a` for missing).
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use ndarray::Array1;

use crate::collection::{CollectionConfig, DesignMatrix, VariableCollection};
use crate::entities::{entities, fmt_num, Entities, Level, RunInfo};
use crate::error::{Error, Result};
use crate::variable::{merge_variables, SimpleVariable, SparseRunVariable, Values, Variable};

/// Column names reserved for event timing in event tables.
pub const RESERVED_COLUMNS: &[&str] = &["onset", "duration"];

/// One parsed column.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Numeric(Vec<f64>),
    Text(Vec<String>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Text(t) => t.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn to_values(&self) -> Values {
        match self {
            Column::Numeric(v) => Values::Numeric(Array1::from_vec(v.clone())),
            Column::Text(t) => Values::Categorical(t.clone()),
        }
    }
}

/// An ordered set of named columns, as handed over by the indexing layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<(String, Column)>,
}

impl Table {
    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, |(_, c)| c.len())
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
    }

    fn required_numeric(&self, name: &str) -> Result<&Vec<f64>> {
        match self.get(name) {
            Some(Column::Numeric(v)) => Ok(v),
            Some(Column::Text(_)) => Err(Error::Table(format!(
                "column '{name}' must be numeric"
            ))),
            None => Err(Error::Table(format!("missing required column '{name}'"))),
        }
    }
}

/// Parse a tab-delimited table from any reader. Columns whose every cell is
/// a number (or `n/a`/empty, which become NaN) come out numeric; the rest
/// stay text.
pub fn parse_tsv<R: Read>(reader: R) -> Result<Table> {
    let mut rdr = csv::ReaderBuilder::new().delimiter(b'\t').from_reader(reader);
    let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for record in rdr.records() {
        let record = record?;
        if record.len() != headers.len() {
            return Err(Error::Table(format!(
                "row has {} fields, expected {}",
                record.len(),
                headers.len()
            )));
        }
        for (i, field) in record.iter().enumerate() {
            cells[i].push(field.to_string());
        }
    }

    let columns = headers
        .into_iter()
        .zip(cells)
        .map(|(name, raw)| {
            let parsed: Option<Vec<f64>> = raw
                .iter()
                .map(|s| {
                    let s = s.trim();
                    if s.is_empty() || s == "n/a" {
                        Some(f64::NAN)
                    } else {
                        s.parse::<f64>().ok()
                    }
                })
                .collect();
            match parsed {
                Some(nums) => (name, Column::Numeric(nums)),
                None => (name, Column::Text(raw)),
            }
        })
        .collect();
    Ok(Table { columns })
}

/// Read a tab-delimited file; see [`parse_tsv`].
pub fn read_tsv(path: &Path) -> Result<Table> {
    let file = std::fs::File::open(path)?;
    parse_tsv(file)
}

/// Assemble per-run event tables into a run-level collection.
///
/// `onset` and `duration` are reserved timing columns (`duration` may be
/// omitted when the config carries a default); every other column becomes
/// one sparse variable per run, merged across runs by name.
pub fn load_run_events(
    runs: &[(RunInfo, Table)],
    config: CollectionConfig,
) -> Result<VariableCollection> {
    let mut per_name: BTreeMap<String, Vec<Variable>> = BTreeMap::new();
    for (run, table) in runs {
        let n = table.n_rows();
        let onset = Array1::from_vec(table.required_numeric("onset")?.clone());
        let duration = match table.get("duration") {
            Some(_) => Array1::from_vec(table.required_numeric("duration")?.clone()),
            None => match config.default_duration {
                Some(d) => Array1::from_elem(n, d),
                None => {
                    return Err(Error::Table(
                        "missing required column 'duration' and no default duration configured"
                            .into(),
                    ))
                }
            },
        };
        let entity_rows: Vec<Entities> = (0..n).map(|_| run.entities.clone()).collect();

        for (name, col) in &table.columns {
            if RESERVED_COLUMNS.contains(&name.as_str()) {
                continue;
            }
            let var = SparseRunVariable::new(
                name.clone(),
                col.to_values(),
                onset.clone(),
                duration.clone(),
                entity_rows.clone(),
                vec![run.clone()],
            )?;
            per_name.entry(name.clone()).or_default().push(Variable::Sparse(var));
        }
        log::debug!("loaded {n} events for run {:?}", run.entities);
    }

    let merged: Vec<Variable> = per_name
        .values()
        .map(|vs| merge_variables(vs, None))
        .collect::<Result<_>>()?;
    Ok(VariableCollection::new(merged, config))
}

/// Build per-subject simple variables from a participants table.
///
/// The subject identifier comes from a `participant_id` (BIDS, `sub-`
/// prefix stripped) or `subject` column; every other column becomes one
/// variable with a one-row-per-subject index.
pub fn load_participants(table: &Table) -> Result<Vec<Variable>> {
    let (id_name, id_col) = table
        .columns
        .iter()
        .find(|(n, _)| n == "participant_id" || n == "subject")
        .ok_or_else(|| {
            Error::Table("participants table needs a 'participant_id' or 'subject' column".into())
        })?;

    let ids: Vec<String> = match id_col {
        Column::Text(t) => t
            .iter()
            .map(|s| s.strip_prefix("sub-").unwrap_or(s).to_string())
            .collect(),
        Column::Numeric(v) => v.iter().map(|x| fmt_num(*x)).collect(),
    };
    let entity_rows: Vec<Entities> = ids
        .iter()
        .map(|id| entities([("subject", id.as_str())]))
        .collect();

    let mut out = Vec::new();
    for (name, col) in &table.columns {
        if name == id_name {
            continue;
        }
        out.push(Variable::Simple(SimpleVariable::new(
            name.clone(),
            col.to_values(),
            entity_rows.clone(),
        )?));
    }
    Ok(out)
}

/// Collections keyed by analysis level.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub collections: BTreeMap<Level, VariableCollection>,
}

impl Dataset {
    pub fn collection(&self, level: Level) -> Option<&VariableCollection> {
        self.collections.get(&level)
    }

    pub fn collection_mut(&mut self, level: Level) -> Option<&mut VariableCollection> {
        self.collections.get_mut(&level)
    }
}

/// Load event and participant sources into level-keyed collections. All
/// collections share one config instance.
pub fn load_variables(
    runs: &[(RunInfo, Table)],
    participants: Option<&Table>,
    config: CollectionConfig,
) -> Result<Dataset> {
    let mut dataset = Dataset::default();
    let run_coll = load_run_events(runs, config)?;
    let shared = run_coll.config().clone();
    dataset.collections.insert(Level::Run, run_coll);

    if let Some(table) = participants {
        let vars = load_participants(table)?;
        dataset.collections.insert(
            Level::Subject,
            VariableCollection::with_shared_config(vars, shared),
        );
    }
    Ok(dataset)
}

/// Write a design matrix as a tab-delimited table, `n/a` for absent cells.
pub fn write_design_matrix_tsv(dm: &DesignMatrix, path: &Path) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().delimiter(b'\t').from_path(path)?;
    wtr.write_record(dm.column_names())?;
    for row in &dm.rows {
        let mut record = vec![
            row.onset.map_or_else(|| "n/a".into(), fmt_num),
            row.duration.map_or_else(|| "n/a".into(), fmt_num),
            row.amplitude.to_string(),
            row.condition.clone(),
        ];
        for col in &dm.entity_columns {
            record.push(
                row.entities
                    .get(col)
                    .map_or_else(|| "n/a".into(), |v| v.to_string()),
            );
        }
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}
