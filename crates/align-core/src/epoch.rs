//! Named time windows used to restrict trials before analysis.
//!
//! An [`Epoch`] is anchored on one or two per-trial event indices (the
//! `idx_*` fields of a trial table) and resolves to an inclusive row range
//! for every trial.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{AlignError, Result};
use crate::models::Trial;

/// A time window expressed relative to trial events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Epoch {
    /// Rows `idx(point) + rel_start ..= idx(point) + rel_end`.
    AroundPoint {
        point: String,
        rel_start: i64,
        rel_end: i64,
    },
    /// Rows `idx(start) + rel_start ..= idx(end) + rel_end`.
    BetweenPoints {
        start: String,
        end: String,
        rel_start: i64,
        rel_end: i64,
    },
}

impl Epoch {
    /// Window around a single event, e.g. `Epoch::around("idx_movement_on", -5, 40)`.
    pub fn around(point: impl Into<String>, rel_start: i64, rel_end: i64) -> Self {
        Epoch::AroundPoint {
            point: point.into(),
            rel_start,
            rel_end,
        }
    }

    /// Window spanning two events.
    pub fn between(
        start: impl Into<String>,
        end: impl Into<String>,
        rel_start: i64,
        rel_end: i64,
    ) -> Self {
        Epoch::BetweenPoints {
            start: start.into(),
            end: end.into(),
            rel_start,
            rel_end,
        }
    }

    /// Number of rows the window covers when it does not depend on the trial.
    ///
    /// `None` for [`Epoch::BetweenPoints`], whose length varies per trial.
    pub fn fixed_len(&self) -> Option<usize> {
        match self {
            Epoch::AroundPoint {
                rel_start, rel_end, ..
            } => usize::try_from(rel_end - rel_start + 1).ok(),
            Epoch::BetweenPoints { .. } => None,
        }
    }

    /// Resolve the window into a half-open row range of `trial`.
    pub fn range_for(&self, trial: &Trial) -> Result<Range<usize>> {
        let (first, last) = match self {
            Epoch::AroundPoint {
                point,
                rel_start,
                rel_end,
            } => {
                let idx = event_index(trial, point)?;
                (idx + rel_start, idx + rel_end)
            }
            Epoch::BetweenPoints {
                start,
                end,
                rel_start,
                rel_end,
            } => (
                event_index(trial, start)? + rel_start,
                event_index(trial, end)? + rel_end,
            ),
        };

        let n_bins = trial.n_timepoints() as i64;
        if first < 0 || last >= n_bins || last < first {
            return Err(AlignError::IndexOutOfRange(format!(
                "epoch rows {}..={} outside trial {} with {} bins",
                first, last, trial.trial_id, n_bins
            )));
        }

        Ok(first as usize..(last + 1) as usize)
    }
}

fn event_index(trial: &Trial, name: &str) -> Result<i64> {
    trial.indices.get(name).copied().ok_or_else(|| {
        AlignError::MissingField(format!("{} (trial {})", name, trial.trial_id))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use std::collections::BTreeMap;

    fn trial_with_bins(n_bins: usize, movement_on: i64) -> Trial {
        let mut signals = BTreeMap::new();
        signals.insert("M1_rates".to_string(), Array2::zeros((n_bins, 3)));
        let mut indices = BTreeMap::new();
        indices.insert("idx_movement_on".to_string(), movement_on);
        indices.insert("idx_go_cue".to_string(), movement_on - 4);
        Trial {
            trial_id: 7,
            target_id: 1,
            indices,
            scalars: BTreeMap::new(),
            signals,
        }
    }

    #[test]
    fn test_around_point_is_inclusive() {
        let trial = trial_with_bins(50, 20);
        let epoch = Epoch::around("idx_movement_on", -5, 10);
        assert_eq!(epoch.range_for(&trial).unwrap(), 15..31);
        assert_eq!(epoch.fixed_len(), Some(16));
    }

    #[test]
    fn test_between_points() {
        let trial = trial_with_bins(50, 20);
        let epoch = Epoch::between("idx_go_cue", "idx_movement_on", 0, 2);
        assert_eq!(epoch.range_for(&trial).unwrap(), 16..23);
        assert_eq!(epoch.fixed_len(), None);
    }

    #[test]
    fn test_window_past_trial_end() {
        let trial = trial_with_bins(25, 20);
        let epoch = Epoch::around("idx_movement_on", 0, 10);
        let err = epoch.range_for(&trial).unwrap_err();
        assert!(matches!(err, AlignError::IndexOutOfRange(_)));
    }

    #[test]
    fn test_window_before_trial_start() {
        let trial = trial_with_bins(50, 3);
        let epoch = Epoch::around("idx_movement_on", -5, 5);
        assert!(matches!(
            epoch.range_for(&trial),
            Err(AlignError::IndexOutOfRange(_))
        ));
    }

    #[test]
    fn test_missing_event() {
        let trial = trial_with_bins(50, 20);
        let epoch = Epoch::around("idx_reward", 0, 5);
        assert!(matches!(
            epoch.range_for(&trial),
            Err(AlignError::MissingField(_))
        ));
    }

    #[test]
    fn test_epoch_json_round_trip() {
        let epoch = Epoch::around("idx_movement_on", -5, 40);
        let json = serde_json::to_string(&epoch).unwrap();
        assert!(json.contains("\"kind\":\"around_point\""));
        let back: Epoch = serde_json::from_str(&json).unwrap();
        assert_eq!(back, epoch);
    }
}
