use chrono::NaiveDate;
use ndarray::{concatenate, s, Array2, ArrayView2, Axis};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Range;

use crate::epoch::Epoch;
use crate::error::{AlignError, Result};

/// One row of a trial table.
#[derive(Debug, Clone, PartialEq)]
pub struct Trial {
    /// Identifier of the trial within its session.
    pub trial_id: i64,
    /// Experimental condition (reach direction) of the trial.
    pub target_id: i64,
    /// Event indices (`idx_*`), 0-based rows relative to the trial start.
    pub indices: BTreeMap<String, i64>,
    /// Other per-trial numeric columns.
    pub scalars: BTreeMap<String, f64>,
    /// Time-varying fields, each a `time × feature` matrix.
    pub signals: BTreeMap<String, Array2<f64>>,
}

impl Trial {
    /// Number of time bins, taken from the first declared signal.
    pub fn n_timepoints(&self) -> usize {
        self.signals.values().next().map_or(0, |m| m.nrows())
    }

    /// Borrow one time-varying field.
    pub fn signal(&self, field: &str) -> Result<&Array2<f64>> {
        self.signals.get(field).ok_or_else(|| {
            AlignError::MissingField(format!("{} (trial {})", field, self.trial_id))
        })
    }

    /// Copy of the trial whose signals keep only `rows`.
    ///
    /// Event indices are shifted so they stay relative to the new first row.
    pub fn restrict_rows(&self, rows: Range<usize>) -> Trial {
        let offset = rows.start as i64;
        Trial {
            trial_id: self.trial_id,
            target_id: self.target_id,
            indices: self
                .indices
                .iter()
                .map(|(k, v)| (k.clone(), v - offset))
                .collect(),
            scalars: self.scalars.clone(),
            signals: self
                .signals
                .iter()
                .map(|(k, m)| (k.clone(), m.slice(s![rows.clone(), ..]).to_owned()))
                .collect(),
        }
    }
}

/// In-memory representation of one recording session, one row per trial.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialTable {
    /// Animal / subject label, e.g. `"Chewie"`.
    pub subject: String,
    /// Session name (the file stem of the recording).
    pub session: String,
    /// Recording date, when the session name carries one.
    pub date: Option<NaiveDate>,
    /// Width of one time bin in seconds.
    pub bin_size: Option<f64>,
    /// The trials, in recording order.
    pub trials: Vec<Trial>,
}

impl TrialTable {
    /// Build a table and check that its trials share one schema.
    pub fn new(
        subject: impl Into<String>,
        session: impl Into<String>,
        trials: Vec<Trial>,
    ) -> Result<Self> {
        let table = TrialTable {
            subject: subject.into(),
            session: session.into(),
            date: None,
            bin_size: None,
            trials,
        };
        table.validate()?;
        Ok(table)
    }

    /// Check the shared-schema invariants.
    ///
    /// Every trial must declare the same signal fields with the same feature
    /// count per field, and all signals of one trial must agree in length.
    pub fn validate(&self) -> Result<()> {
        let Some(first) = self.trials.first() else {
            return Ok(());
        };
        let widths: BTreeMap<&str, usize> = first
            .signals
            .iter()
            .map(|(k, m)| (k.as_str(), m.ncols()))
            .collect();

        for trial in &self.trials {
            if trial.signals.len() != widths.len()
                || !trial.signals.keys().all(|k| widths.contains_key(k.as_str()))
            {
                return Err(AlignError::SchemaMismatch(format!(
                    "trial {} of {} declares fields {:?}, expected {:?}",
                    trial.trial_id,
                    self.session,
                    trial.signals.keys().collect::<Vec<_>>(),
                    widths.keys().collect::<Vec<_>>()
                )));
            }
            let n_bins = trial.n_timepoints();
            for (field, matrix) in &trial.signals {
                if matrix.ncols() != widths[field.as_str()] {
                    return Err(AlignError::SchemaMismatch(format!(
                        "field {} has {} columns in trial {}, expected {}",
                        field,
                        matrix.ncols(),
                        trial.trial_id,
                        widths[field.as_str()]
                    )));
                }
                if matrix.nrows() != n_bins {
                    return Err(AlignError::SchemaMismatch(format!(
                        "field {} has {} bins in trial {}, other fields have {}",
                        field,
                        matrix.nrows(),
                        trial.trial_id,
                        n_bins
                    )));
                }
            }
        }
        Ok(())
    }

    /// Name of the firing-rate field of a brain area, e.g. `"M1_rates"`.
    pub fn signal_field(area: &str) -> String {
        format!("{}_rates", area)
    }

    /// Number of trials.
    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    /// Sorted distinct target identifiers.
    pub fn target_ids(&self) -> Vec<i64> {
        let set: BTreeSet<i64> = self.trials.iter().map(|t| t.target_id).collect();
        set.into_iter().collect()
    }

    /// Trials of one target, in table order.
    pub fn trials_for_target(&self, target: i64) -> Vec<&Trial> {
        self.trials
            .iter()
            .filter(|t| t.target_id == target)
            .collect()
    }

    /// Names of the time-varying fields.
    pub fn time_varying_fields(&self) -> Vec<&str> {
        self.trials
            .first()
            .map(|t| t.signals.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Stack one field of every trial along the time axis.
    pub fn concat_signal(&self, field: &str) -> Result<Array2<f64>> {
        if self.trials.is_empty() {
            return Err(AlignError::EmptyInput(format!(
                "session {} has no trials",
                self.session
            )));
        }
        let views: Vec<ArrayView2<'_, f64>> = self
            .trials
            .iter()
            .map(|t| t.signal(field).map(|m| m.view()))
            .collect::<Result<_>>()?;
        concatenate(Axis(0), &views).map_err(|e| AlignError::ShapeMismatch(e.to_string()))
    }

    /// New table whose trials are cut down to `epoch`.
    pub fn restrict(&self, epoch: &Epoch) -> Result<TrialTable> {
        let trials = self
            .trials
            .iter()
            .map(|t| epoch.range_for(t).map(|rows| t.restrict_rows(rows)))
            .collect::<Result<Vec<_>>>()?;
        Ok(TrialTable {
            subject: self.subject.clone(),
            session: self.session.clone(),
            date: self.date,
            bin_size: self.bin_size,
            trials,
        })
    }

    /// Short description of the dataset.
    pub fn summary(&self) -> TableSummary {
        let first = self.trials.first();
        let unit_counts = first
            .map(|t| {
                t.signals
                    .iter()
                    .filter(|(k, _)| k.contains("spike") || k.ends_with("_rates"))
                    .map(|(k, m)| (k.clone(), m.ncols()))
                    .collect()
            })
            .unwrap_or_default();

        TableSummary {
            subject: self.subject.clone(),
            session: self.session.clone(),
            date: self.date,
            n_trials: self.trials.len(),
            time_signals: self
                .time_varying_fields()
                .into_iter()
                .map(str::to_string)
                .collect(),
            unit_counts,
            targets: self.target_ids(),
        }
    }
}

/// Overview of one session, printed by the `summary` command.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TableSummary {
    pub subject: String,
    pub session: String,
    pub date: Option<NaiveDate>,
    pub n_trials: usize,
    pub time_signals: Vec<String>,
    /// Unit (column) count of every spike / rate field.
    pub unit_counts: BTreeMap<String, usize>,
    pub targets: Vec<i64>,
}

impl fmt::Display for TableSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.date {
            Some(date) => writeln!(f, "{} {} ({})", self.subject, self.session, date)?,
            None => writeln!(f, "{} {}", self.subject, self.session)?,
        }
        writeln!(f, "time signals: {}", self.time_signals.join(", "))?;
        for (field, units) in &self.unit_counts {
            writeln!(f, "{} units: {}", field, units)?;
        }
        writeln!(f, "trials: {}, targets: {:?}", self.n_trials, self.targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trial(trial_id: i64, target_id: i64, n_bins: usize) -> Trial {
        let mut signals = BTreeMap::new();
        signals.insert(
            "M1_rates".to_string(),
            Array2::from_shape_fn((n_bins, 4), |(t, j)| (trial_id * 100) as f64 + (t * 4 + j) as f64),
        );
        signals.insert("pos".to_string(), Array2::zeros((n_bins, 2)));
        let mut indices = BTreeMap::new();
        indices.insert("idx_movement_on".to_string(), 5);
        Trial {
            trial_id,
            target_id,
            indices,
            scalars: BTreeMap::new(),
            signals,
        }
    }

    // ── validate ──────────────────────────────────────────────────────────────

    #[test]
    fn test_new_accepts_consistent_trials() {
        let table = TrialTable::new("Chewie", "Chewie_CO_2016", vec![trial(0, 0, 10), trial(1, 1, 12)]);
        assert!(table.is_ok());
    }

    #[test]
    fn test_new_rejects_missing_field() {
        let mut odd = trial(1, 0, 10);
        odd.signals.remove("pos");
        let err = TrialTable::new("Chewie", "s", vec![trial(0, 0, 10), odd]).unwrap_err();
        assert!(matches!(err, AlignError::SchemaMismatch(_)));
    }

    #[test]
    fn test_new_rejects_unequal_lengths_within_trial() {
        let mut odd = trial(1, 0, 10);
        odd.signals.insert("pos".to_string(), Array2::zeros((9, 2)));
        let err = TrialTable::new("Chewie", "s", vec![odd]).unwrap_err();
        assert!(matches!(err, AlignError::SchemaMismatch(_)));
    }

    #[test]
    fn test_new_rejects_unequal_widths() {
        let mut odd = trial(1, 0, 10);
        odd.signals.insert("pos".to_string(), Array2::zeros((10, 3)));
        let err = TrialTable::new("Chewie", "s", vec![trial(0, 0, 10), odd]).unwrap_err();
        assert!(matches!(err, AlignError::SchemaMismatch(_)));
    }

    // ── queries ───────────────────────────────────────────────────────────────

    #[test]
    fn test_target_ids_sorted_unique() {
        let table = TrialTable::new(
            "Mihili",
            "s",
            vec![trial(0, 3, 5), trial(1, 1, 5), trial(2, 3, 5), trial(3, 0, 5)],
        )
        .unwrap();
        assert_eq!(table.target_ids(), vec![0, 1, 3]);
        let ids: Vec<i64> = table.trials_for_target(3).iter().map(|t| t.trial_id).collect();
        assert_eq!(ids, vec![0, 2]);
    }

    #[test]
    fn test_concat_signal_stacks_rows() {
        let table = TrialTable::new("Mihili", "s", vec![trial(0, 0, 5), trial(1, 0, 7)]).unwrap();
        let all = table.concat_signal("M1_rates").unwrap();
        assert_eq!(all.dim(), (12, 4));
        assert_eq!(all[[5, 0]], 100.0);
    }

    #[test]
    fn test_concat_signal_missing_field() {
        let table = TrialTable::new("Mihili", "s", vec![trial(0, 0, 5)]).unwrap();
        assert!(matches!(
            table.concat_signal("PMd_rates"),
            Err(AlignError::MissingField(_))
        ));
    }

    #[test]
    fn test_signal_field_name() {
        assert_eq!(TrialTable::signal_field("PMd"), "PMd_rates");
    }

    // ── restrict ──────────────────────────────────────────────────────────────

    #[test]
    fn test_restrict_cuts_and_shifts_indices() {
        let table = TrialTable::new("Mihili", "s", vec![trial(0, 0, 20), trial(1, 0, 30)]).unwrap();
        let epoch = Epoch::around("idx_movement_on", -2, 5);
        let cut = table.restrict(&epoch).unwrap();
        for t in &cut.trials {
            assert_eq!(t.n_timepoints(), 8);
            assert_eq!(t.indices["idx_movement_on"], 2);
        }
        // First kept row is row 3 of the original trial.
        assert_eq!(cut.trials[0].signals["M1_rates"][[0, 0]], 12.0);
    }

    #[test]
    fn test_restrict_out_of_range() {
        let table = TrialTable::new("Mihili", "s", vec![trial(0, 0, 8)]).unwrap();
        let epoch = Epoch::around("idx_movement_on", 0, 10);
        assert!(matches!(
            table.restrict(&epoch),
            Err(AlignError::IndexOutOfRange(_))
        ));
    }

    // ── summary ───────────────────────────────────────────────────────────────

    #[test]
    fn test_summary_display() {
        let table = TrialTable::new("Chewie", "Chewie_CO_CS", vec![trial(0, 0, 5), trial(1, 2, 5)]).unwrap();
        let summary = table.summary();
        assert_eq!(summary.n_trials, 2);
        assert_eq!(summary.unit_counts.get("M1_rates"), Some(&4));
        assert!(!summary.unit_counts.contains_key("pos"));
        let text = summary.to_string();
        assert!(text.contains("Chewie Chewie_CO_CS"));
        assert!(text.contains("M1_rates units: 4"));
        assert!(text.contains("targets: [0, 2]"));
    }
}
