//! Raw MAT-file parsing.
//!
//! Two layouts are understood.
//!
//! **Struct array** (as exported by pyaldata): a `trial_data` struct with one
//! element per trial. Scalar fields become per-trial scalars, `idx_*` fields
//! are 1-based event indices (empty or NaN = absent), matrix fields are the
//! time-varying signals, and the `monkey` / `date` text fields name the
//! subject and recording date.
//!
//! **Column variables**: one numeric variable per trial-table column.
//!
//! * `trial_id`, `target_id`, `trial_length` – one value per trial (required);
//! * `bin_size` – optional scalar;
//! * `idx_*` – 1-based MATLAB event indices, one per trial (NaN = absent);
//! * any variable with `sum(trial_length)` rows – a time-varying field whose
//!   rows are split across the trials in order;
//! * any other variable with one value per trial – a per-trial scalar.
//!
//! Subject and recording date default to the file name
//! (`Chewie_CO_CS_2016-10-14.mat`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use align_core::models::{Trial, TrialTable};
use align_core::{AlignError, Result};
use chrono::NaiveDate;
use matfile::{MatFile, NumericData};
use ndarray::{s, Array2, ShapeBuilder};
use regex::Regex;
use tracing::debug;

use crate::mat5::{read_variables, MatValue};

/// Name of the struct array holding one element per trial.
pub const TRIAL_DATA_VARIABLE: &str = "trial_data";

// ── Public API ────────────────────────────────────────────────────────────────

/// Parse a raw `.mat` session file into a [`TrialTable`].
pub fn parse_mat_file(path: &Path) -> Result<TrialTable> {
    let bytes = std::fs::read(path).map_err(|source| AlignError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let mat = MatFile::parse(bytes.as_slice()).map_err(|e| AlignError::MatParse {
        path: path.to_path_buf(),
        message: format!("{:?}", e),
    })?;

    let variables = mat
        .arrays()
        .iter()
        .filter_map(|array| {
            let values = widen(array.data())?;
            let size: &[usize] = array.size();
            match size {
                [rows, cols] => Some(Variable {
                    name: array.name().to_string(),
                    rows: *rows,
                    cols: *cols,
                    values,
                }),
                _ => {
                    debug!("Skipping {}-d variable {}", size.len(), array.name());
                    None
                }
            }
        })
        .collect::<Vec<_>>();

    let (subject, session, date) = session_identity(path);
    let parsed = if variables.iter().any(|v| v.name == "trial_length") {
        table_from_variables(&variables, subject, session)
    } else {
        table_from_struct_file(&bytes, subject, session)
    };
    let mut table = parsed.map_err(|e| match e {
        AlignError::MissingField(message)
        | AlignError::ShapeMismatch(message)
        | AlignError::MatParse { message, .. } => AlignError::MatParse {
            path: path.to_path_buf(),
            message,
        },
        other => other,
    })?;
    if date.is_some() {
        table.date = date;
    }

    debug!(
        "Parsed {}: {} trials, fields {:?}",
        path.display(),
        table.len(),
        table.time_varying_fields()
    );
    Ok(table)
}

/// Subject, session name and recording date encoded in a file name.
///
/// The subject is the stem up to the first `_`; the date is the first
/// `YYYY-MM-DD` or `YYYYMMDD` group in the stem.
pub fn session_identity(path: &Path) -> (String, String, Option<NaiveDate>) {
    let session = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let subject = session
        .split('_')
        .next()
        .unwrap_or(session.as_str())
        .to_string();

    let date = Regex::new(r"\d{4}-\d{2}-\d{2}|\d{8}")
        .ok()
        .and_then(|re| re.find(&session).map(|m| m.as_str().to_string()))
        .and_then(|text| parse_date(&text));

    (subject, session, date)
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    ["%Y-%m-%d", "%Y%m%d", "%m-%d-%Y", "%Y/%m/%d", "%m/%d/%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text.trim(), fmt).ok())
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Error for content that is not a trial table; the path is filled in by
/// [`parse_mat_file`].
fn malformed(message: String) -> AlignError {
    AlignError::MatParse {
        path: PathBuf::new(),
        message,
    }
}

/// Integral, finite identifier of trial `index`.
fn identifier(value: f64, field: &str, index: usize) -> Result<i64> {
    if value.is_finite() && value.fract() == 0.0 {
        Ok(value as i64)
    } else {
        Err(malformed(format!(
            "{} of trial {} is {}, expected an integer",
            field, index, value
        )))
    }
}

/// One 2-d MAT variable, values in column-major order.
struct Variable {
    name: String,
    rows: usize,
    cols: usize,
    values: Vec<f64>,
}

impl Variable {
    fn is_vector(&self) -> bool {
        self.rows == 1 || self.cols == 1
    }

    fn is_vector_of(&self, n: usize) -> bool {
        self.values.len() == n && self.is_vector()
    }

    fn matrix(&self) -> Result<Array2<f64>> {
        Array2::from_shape_vec((self.rows, self.cols).f(), self.values.clone())
            .map_err(|e| AlignError::ShapeMismatch(format!("{}: {}", self.name, e)))
    }
}

/// Convert the real part of any numeric class to `f64`.
fn widen(data: &NumericData) -> Option<Vec<f64>> {
    macro_rules! widen_real {
        ($real:expr) => {
            Some($real.iter().map(|&v| v as f64).collect())
        };
    }
    #[allow(unreachable_patterns)]
    match data {
        NumericData::Double { real, .. } => Some(real.clone()),
        NumericData::Single { real, .. } => widen_real!(real),
        NumericData::Int8 { real, .. } => widen_real!(real),
        NumericData::UInt8 { real, .. } => widen_real!(real),
        NumericData::Int16 { real, .. } => widen_real!(real),
        NumericData::UInt16 { real, .. } => widen_real!(real),
        NumericData::Int32 { real, .. } => widen_real!(real),
        NumericData::UInt32 { real, .. } => widen_real!(real),
        NumericData::Int64 { real, .. } => widen_real!(real),
        NumericData::UInt64 { real, .. } => widen_real!(real),
        _ => None,
    }
}

fn required<'a>(variables: &'a [Variable], name: &str, n: Option<usize>) -> Result<&'a Variable> {
    let var = variables
        .iter()
        .find(|v| v.name == name)
        .ok_or_else(|| AlignError::MissingField(name.to_string()))?;
    let fits = match n {
        Some(n) => var.is_vector_of(n),
        None => var.is_vector(),
    };
    if !fits {
        return Err(AlignError::ShapeMismatch(format!(
            "{} has shape {}x{}, expected a vector{}",
            name,
            var.rows,
            var.cols,
            n.map(|n| format!(" of {} values", n)).unwrap_or_default()
        )));
    }
    Ok(var)
}

fn table_from_variables(
    variables: &[Variable],
    subject: String,
    session: String,
) -> Result<TrialTable> {
    let length_var = required(variables, "trial_length", None)?;
    let lengths: Vec<usize> = length_var
        .values
        .iter()
        .map(|&v| {
            if v >= 0.0 && v.fract() == 0.0 {
                Ok(v as usize)
            } else {
                Err(AlignError::ShapeMismatch(format!(
                    "trial_length holds {} which is not a bin count",
                    v
                )))
            }
        })
        .collect::<Result<_>>()?;
    let n_trials = lengths.len();
    let total_bins: usize = lengths.iter().sum();

    let trial_ids = &required(variables, "trial_id", Some(n_trials))?.values;
    let target_ids = &required(variables, "target_id", Some(n_trials))?.values;
    let bin_size = variables
        .iter()
        .find(|v| v.name == "bin_size" && v.values.len() == 1)
        .map(|v| v.values[0]);

    let mut trials: Vec<Trial> = (0..n_trials)
        .map(|i| {
            Ok(Trial {
                trial_id: identifier(trial_ids[i], "trial_id", i)?,
                target_id: identifier(target_ids[i], "target_id", i)?,
                indices: BTreeMap::new(),
                scalars: BTreeMap::new(),
                signals: BTreeMap::new(),
            })
        })
        .collect::<Result<_>>()?;

    for var in variables {
        match var.name.as_str() {
            "trial_length" | "trial_id" | "target_id" | "bin_size" => continue,
            name if name.starts_with("idx_") && var.is_vector_of(n_trials) => {
                for (trial, &v) in trials.iter_mut().zip(&var.values) {
                    if !v.is_nan() {
                        trial.indices.insert(var.name.clone(), v as i64 - 1);
                    }
                }
            }
            _ if var.rows == total_bins && total_bins > 0 => {
                let matrix = var.matrix()?;
                let mut start = 0;
                for (trial, &len) in trials.iter_mut().zip(&lengths) {
                    trial.signals.insert(
                        var.name.clone(),
                        matrix.slice(s![start..start + len, ..]).to_owned(),
                    );
                    start += len;
                }
            }
            _ if var.is_vector_of(n_trials) => {
                for (trial, &v) in trials.iter_mut().zip(&var.values) {
                    trial.scalars.insert(var.name.clone(), v);
                }
            }
            _ => debug!(
                "Ignoring variable {} ({}x{}) that fits no trial column",
                var.name, var.rows, var.cols
            ),
        }
    }

    let mut table = TrialTable::new(subject, session, trials)?;
    table.bin_size = bin_size;
    Ok(table)
}

// ── Struct-array layout ───────────────────────────────────────────────────────

fn table_from_struct_file(bytes: &[u8], subject: String, session: String) -> Result<TrialTable> {
    let values = read_variables(bytes).map_err(malformed)?;

    let chosen = values
        .iter()
        .find(|(name, v)| name == TRIAL_DATA_VARIABLE && matches!(v, MatValue::Struct { .. }))
        .or_else(|| values.iter().find(|(_, v)| matches!(v, MatValue::Struct { .. })));

    match chosen {
        Some((name, MatValue::Struct { fields, elements, .. })) => {
            debug!("Reading struct array {} ({} elements)", name, elements.len());
            table_from_struct(fields, elements, subject, session)
        }
        _ => match values
            .iter()
            .find(|(_, v)| !matches!(v, MatValue::Numeric { .. }))
        {
            Some((name, v)) => Err(malformed(format!(
                "variable {} is a {} array; expected a {} struct array or numeric trial columns",
                name,
                v.kind(),
                TRIAL_DATA_VARIABLE
            ))),
            None => Err(AlignError::MissingField("trial_length".to_string())),
        },
    }
}

fn struct_field<'a>(fields: &[String], row: &'a [MatValue], name: &str) -> Option<&'a MatValue> {
    fields.iter().position(|f| f == name).and_then(|i| row.get(i))
}

fn struct_identifier(fields: &[String], row: &[MatValue], name: &str, index: usize) -> Result<i64> {
    match struct_field(fields, row, name) {
        Some(MatValue::Numeric { values, .. }) if values.len() == 1 => {
            identifier(values[0], name, index)
        }
        Some(other) => Err(malformed(format!(
            "{} of trial {} is a {} value, expected one number",
            name,
            index,
            other.kind()
        ))),
        None => Err(AlignError::MissingField(name.to_string())),
    }
}

fn table_from_struct(
    fields: &[String],
    elements: &[Vec<MatValue>],
    subject: String,
    session: String,
) -> Result<TrialTable> {
    let mut trials = Vec::with_capacity(elements.len());
    for (index, row) in elements.iter().enumerate() {
        let mut trial = Trial {
            trial_id: struct_identifier(fields, row, "trial_id", index)?,
            target_id: struct_identifier(fields, row, "target_id", index)?,
            indices: BTreeMap::new(),
            scalars: BTreeMap::new(),
            signals: BTreeMap::new(),
        };

        for (name, value) in fields.iter().zip(row) {
            let MatValue::Numeric { dims, values } = value else {
                continue;
            };
            match name.as_str() {
                "trial_id" | "target_id" | "bin_size" => {}
                idx if idx.starts_with("idx_") => {
                    if values.len() > 1 {
                        debug!("{} of trial {} holds {} indices; using the first", idx, index, values.len());
                    }
                    if let Some(&v) = values.first().filter(|v| v.is_finite()) {
                        trial.indices.insert(name.clone(), v as i64 - 1);
                    }
                }
                _ if values.is_empty() => {
                    trial.scalars.insert(name.clone(), f64::NAN);
                }
                _ if values.len() == 1 => {
                    trial.scalars.insert(name.clone(), values[0]);
                }
                _ => {
                    let &[rows, cols] = dims.as_slice() else {
                        debug!("Skipping {}-d field {} of trial {}", dims.len(), name, index);
                        continue;
                    };
                    if rows < 2 {
                        debug!("Skipping row vector {} of trial {}", name, index);
                        continue;
                    }
                    let matrix = Array2::from_shape_vec((rows, cols).f(), values.clone())
                        .map_err(|e| malformed(format!("{} of trial {}: {}", name, index, e)))?;
                    trial.signals.insert(name.clone(), matrix);
                }
            }
        }
        trials.push(trial);
    }

    let first = elements.first();
    let text_field = |name: &str| match first.and_then(|row| struct_field(fields, row, name)) {
        Some(MatValue::Text(text)) if !text.is_empty() => Some(text.clone()),
        _ => None,
    };
    let subject = text_field("monkey").unwrap_or(subject);
    let date = text_field("date").and_then(|text| parse_date(&text));
    let bin_size = match first.and_then(|row| struct_field(fields, row, "bin_size")) {
        Some(MatValue::Numeric { values, .. }) if values.len() == 1 => Some(values[0]),
        _ => None,
    };

    let mut table = TrialTable::new(subject, session, trials)?;
    table.date = date;
    table.bin_size = bin_size;
    Ok(table)
}

// ── Test fixtures ─────────────────────────────────────────────────────────────


// ── Tests ─────────────────────────────────────────────────────────────────────
