//! Dense `session × target × trial × time × component` arrays.
//!
//! Every builder follows the same recipe: find the targets of the first
//! session, find the smallest trial count over all (session, target) pairs,
//! fit a reduction model per session, then fill the array with a random
//! subset of each target's trials.

use std::borrow::Cow;

use align_core::epoch::Epoch;
use align_core::models::{Trial, TrialTable};
use align_core::stats::{abs_percentile, nan_mean_axis0};
use align_core::{AlignError, Result};
use ndarray::{s, Array2, Array5};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::pca::{Pca, ReductionModel, Reducer};

/// Percentile of the kinematic magnitude mapped to 1 by normalisation.
const KINEMATIC_PERCENTILE: f64 = 99.0;

// ── Options ───────────────────────────────────────────────────────────────────

/// Inputs of [`data_array`] besides the sessions themselves.
#[derive(Debug)]
pub struct ArrayOptions {
    /// Window every trial is restricted to; `None` keeps whole trials.
    pub epoch: Option<Epoch>,
    /// Brain area; the `"<area>_rates"` field is reduced.
    pub area: String,
    /// Model fit per session.
    pub reducer: Reducer,
}

impl Default for ArrayOptions {
    fn default() -> Self {
        Self {
            epoch: None,
            area: "M1".to_string(),
            reducer: Reducer::default(),
        }
    }
}

/// How the kinematic array of [`data_array_with_kinematics`] is prepared.
#[derive(Debug, Clone)]
pub struct KinematicOptions {
    /// Time-varying field holding the kinematics.
    pub field: String,
    /// Divide by the 99th-percentile magnitude of each session.
    pub normalize: bool,
}

impl Default for KinematicOptions {
    fn default() -> Self {
        Self {
            field: "pos".to_string(),
            normalize: false,
        }
    }
}

// ── Builders ──────────────────────────────────────────────────────────────────

/// Reduce every session and stack the results.
///
/// The trial axis holds the smallest trial count over all (session, target)
/// pairs and the time axis the restricted length of the first session. Each
/// target's trials are drawn in a random order that differs from the
/// recorded one; the kept trials are written in table order.
///
/// A single session is passed as `std::slice::from_ref(&table)`.
pub fn data_array<R: Rng + ?Sized>(
    tables: &[TrialTable],
    options: &mut ArrayOptions,
    rng: &mut R,
) -> Result<Array5<f64>> {
    let field = TrialTable::signal_field(&options.area);
    let targets = shared_targets(tables)?;
    let n_shared = shared_trial_count(tables, &targets);

    let restricted: Vec<Cow<'_, TrialTable>> = match &options.epoch {
        Some(epoch) => tables
            .iter()
            .map(|t| t.restrict(epoch).map(Cow::Owned))
            .collect::<Result<_>>()?,
        None => tables.iter().map(Cow::Borrowed).collect(),
    };
    let n_timepoints = first_trial_len(&restricted[0], &field)?;
    let n_components = options.reducer.n_components();

    let mut out = Array5::zeros((
        tables.len(),
        targets.len(),
        n_shared,
        n_timepoints,
        n_components,
    ));

    for (session, table) in restricted.iter().enumerate() {
        let reduced = reduce_trials(table, &field, options.reducer.model_mut())?;
        for (target_idx, &target) in targets.iter().enumerate() {
            let positions = target_positions(table, target);
            let kept = pick_trials(positions.len(), n_shared, Shuffle::AvoidIdentity, rng);
            for (rank, &k) in kept.iter().enumerate() {
                let trial_data = &reduced[positions[k]];
                expect_shape(trial_data, (n_timepoints, n_components), table, positions[k])?;
                out.slice_mut(s![session, target_idx, rank, .., ..])
                    .assign(trial_data);
            }
        }
    }

    info!("Built {} array with shape {:?}", options.area, out.shape());
    Ok(out)
}

/// Like [`data_array`] but without an epoch: each kept trial contributes a
/// random window of `window_len` bins.
///
/// `window_len` must be shorter than every kept trial; `None` keeps whole
/// trials, which then must all have the same length.
pub fn random_window_array<R: Rng + ?Sized>(
    tables: &[TrialTable],
    window_len: Option<usize>,
    area: &str,
    reducer: &mut Reducer,
    rng: &mut R,
) -> Result<Array5<f64>> {
    let field = TrialTable::signal_field(area);
    let targets = shared_targets(tables)?;
    let n_shared = shared_trial_count(tables, &targets);

    let n_timepoints = first_trial_len(&tables[0], &field)?;
    let window = match window_len {
        Some(len) if len >= n_timepoints => {
            return Err(AlignError::IndexOutOfRange(format!(
                "window of {} bins is not shorter than trials of {} bins",
                len, n_timepoints
            )))
        }
        Some(len) => len,
        None => n_timepoints,
    };
    let n_components = reducer.n_components();

    let mut out = Array5::zeros((tables.len(), targets.len(), n_shared, window, n_components));

    for (session, table) in tables.iter().enumerate() {
        let reduced = reduce_trials(table, &field, reducer.model_mut())?;
        for (target_idx, &target) in targets.iter().enumerate() {
            let positions = target_positions(table, target);
            let kept = pick_trials(positions.len(), n_shared, Shuffle::Plain, rng);
            for (rank, &k) in kept.iter().enumerate() {
                let trial_data = &reduced[positions[k]];
                let len = trial_data.nrows();
                expect_shape(trial_data, (len, n_components), table, positions[k])?;
                let start = match window_len {
                    Some(w) if w >= len => {
                        return Err(AlignError::IndexOutOfRange(format!(
                            "window of {} bins does not fit trial {} of {} ({} bins)",
                            w, table.trials[positions[k]].trial_id, table.session, len
                        )))
                    }
                    Some(w) => rng.gen_range(0..len - w),
                    None => {
                        expect_shape(trial_data, (window, n_components), table, positions[k])?;
                        0
                    }
                };
                out.slice_mut(s![session, target_idx, rank, .., ..])
                    .assign(&trial_data.slice(s![start..start + window, ..]));
            }
        }
    }

    info!("Built random-window {} array with shape {:?}", area, out.shape());
    Ok(out)
}

/// Like [`data_array`] with PCA, additionally returning the matching
/// kinematic array `session × target × trial × time × kinematic dim`.
///
/// Kinematics are centred on their NaN-ignoring mean over the whole
/// (unrestricted) session and, when requested, divided by the
/// 99th-percentile magnitude of the restricted session.
pub fn data_array_with_kinematics<R: Rng + ?Sized>(
    tables: &[TrialTable],
    epoch: &Epoch,
    area: &str,
    n_components: usize,
    kinematics: &KinematicOptions,
    rng: &mut R,
) -> Result<(Array5<f64>, Array5<f64>)> {
    let field = TrialTable::signal_field(area);
    let targets = shared_targets(tables)?;
    let n_shared = shared_trial_count(tables, &targets);

    let first = tables[0].restrict(epoch)?;
    let n_timepoints = first_trial_len(&first, &field)?;
    let n_outputs = first_trial(&first)?.signal(&kinematics.field)?.ncols();

    let mut rates_out = Array5::zeros((
        tables.len(),
        targets.len(),
        n_shared,
        n_timepoints,
        n_components,
    ));
    let mut kin_out = Array5::zeros((tables.len(), targets.len(), n_shared, n_timepoints, n_outputs));

    for (session, table) in tables.iter().enumerate() {
        let mut cut = table.restrict(epoch)?;
        let mean = nan_mean_axis0(table.concat_signal(&kinematics.field)?.view());
        for trial in cut.trials.iter_mut() {
            let trial_id = trial.trial_id;
            let kin = trial.signals.get_mut(&kinematics.field).ok_or_else(|| {
                AlignError::MissingField(format!("{} (trial {})", kinematics.field, trial_id))
            })?;
            *kin -= &mean;
        }
        if kinematics.normalize {
            normalize_kinematics(&mut cut, &kinematics.field);
        }

        let mut pca = Pca::new(n_components);
        let reduced = reduce_trials(&cut, &field, &mut pca)?;

        for (target_idx, &target) in targets.iter().enumerate() {
            let positions = target_positions(&cut, target);
            let kept = pick_trials(positions.len(), n_shared, Shuffle::Plain, rng);
            for (rank, &k) in kept.iter().enumerate() {
                let pos = positions[k];
                let trial_rates = &reduced[pos];
                let trial_kin = cut.trials[pos].signal(&kinematics.field)?;
                expect_shape(trial_rates, (n_timepoints, n_components), &cut, pos)?;
                expect_shape(trial_kin, (n_timepoints, n_outputs), &cut, pos)?;
                rates_out
                    .slice_mut(s![session, target_idx, rank, .., ..])
                    .assign(trial_rates);
                kin_out
                    .slice_mut(s![session, target_idx, rank, .., ..])
                    .assign(trial_kin);
            }
        }
    }

    info!(
        "Built {} array {:?} with kinematics {:?}",
        area,
        rates_out.shape(),
        kin_out.shape()
    );
    Ok((rates_out, kin_out))
}

// ── Internal helpers ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shuffle {
    /// Redraw while the permutation is the identity.
    AvoidIdentity,
    Plain,
}

/// Targets of the first session, checked against every other session.
fn shared_targets(tables: &[TrialTable]) -> Result<Vec<i64>> {
    let first = tables
        .first()
        .ok_or_else(|| AlignError::EmptyInput("no sessions given".to_string()))?;
    let targets = first.target_ids();
    if targets.is_empty() {
        return Err(AlignError::EmptyInput(format!(
            "session {} has no trials",
            first.session
        )));
    }

    for (session, table) in tables.iter().enumerate().skip(1) {
        let ids = table.target_ids();
        if let Some(&missing) = targets.iter().find(|t| !ids.contains(t)) {
            return Err(AlignError::TargetMismatch {
                session,
                target: missing,
            });
        }
        if ids.len() > targets.len() {
            warn!(
                "Session {} has targets {:?}; only {:?} are used",
                table.session, ids, targets
            );
        }
    }
    Ok(targets)
}

/// Smallest trial count over all (session, target) pairs.
fn shared_trial_count(tables: &[TrialTable], targets: &[i64]) -> usize {
    tables
        .iter()
        .flat_map(|table| targets.iter().map(move |&t| table.trials_for_target(t).len()))
        .min()
        .unwrap_or(0)
}

fn first_trial(table: &TrialTable) -> Result<&Trial> {
    table.trials.first().ok_or_else(|| {
        AlignError::EmptyInput(format!("session {} has no trials", table.session))
    })
}

fn first_trial_len(table: &TrialTable, field: &str) -> Result<usize> {
    Ok(first_trial(table)?.signal(field)?.nrows())
}

/// Fit `model` on all of `table`'s rows of `field`, then reduce each trial.
fn reduce_trials(
    table: &TrialTable,
    field: &str,
    model: &mut dyn ReductionModel,
) -> Result<Vec<Array2<f64>>> {
    let rates = table.concat_signal(field)?;
    model.fit(rates.view())?;
    debug!(
        "Fit {} components on {} ({} rows)",
        model.n_components(),
        table.session,
        rates.nrows()
    );
    table
        .trials
        .iter()
        .map(|t| model.transform(t.signal(field)?.view()))
        .collect()
}

fn target_positions(table: &TrialTable, target: i64) -> Vec<usize> {
    table
        .trials
        .iter()
        .enumerate()
        .filter(|(_, t)| t.target_id == target)
        .map(|(i, _)| i)
        .collect()
}

/// Choose `n_keep` of `n` trials at random; returned ascending.
fn pick_trials<R: Rng + ?Sized>(n: usize, n_keep: usize, mode: Shuffle, rng: &mut R) -> Vec<usize> {
    let identity: Vec<usize> = (0..n).collect();
    let mut order = identity.clone();
    order.shuffle(rng);
    if mode == Shuffle::AvoidIdentity && n > 1 {
        while order == identity {
            order.shuffle(rng);
        }
    }
    let mut kept = order[..n_keep.min(n)].to_vec();
    kept.sort_unstable();
    kept
}

fn expect_shape(
    data: &Array2<f64>,
    expected: (usize, usize),
    table: &TrialTable,
    position: usize,
) -> Result<()> {
    if data.dim() == expected {
        return Ok(());
    }
    Err(AlignError::ShapeMismatch(format!(
        "trial {} of {} has shape {:?}, expected {:?}",
        table.trials[position].trial_id,
        table.session,
        data.dim(),
        expected
    )))
}

fn normalize_kinematics(table: &mut TrialTable, field: &str) {
    let magnitude = abs_percentile(
        table
            .trials
            .iter()
            .filter_map(|t| t.signals.get(field))
            .flat_map(|m| m.iter()),
        KINEMATIC_PERCENTILE,
    );
    if !(magnitude.is_finite() && magnitude > 0.0) {
        warn!(
            "Kinematics of {} have magnitude {}; left unnormalised",
            table.session, magnitude
        );
        return;
    }
    for trial in table.trials.iter_mut() {
        if let Some(kin) = trial.signals.get_mut(field) {
            kin.mapv_inplace(|v| v / magnitude);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
