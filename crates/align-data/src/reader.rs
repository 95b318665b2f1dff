//! Session file loading with an on-disk cache.
//!
//! Raw `.mat` recordings are parsed once; the resulting [`TrialTable`] is
//! written next to the raw file as a `.json` snapshot, which later loads
//! read instead of re-parsing the MAT file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use align_core::models::{Trial, TrialTable};
use align_core::serial::{DenseArray, JsonFloat};
use align_core::{AlignError, Result};
use chrono::NaiveDate;
use ndarray::Ix2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::mat::parse_mat_file;

/// Extension of raw recording files.
pub const RAW_EXTENSION: &str = "mat";
/// Extension of cached trial-table snapshots.
pub const CACHE_EXTENSION: &str = "json";

const SNAPSHOT_KIND: &str = "trial_table";
const SNAPSHOT_VERSION: u32 = 1;

// ── Public API ────────────────────────────────────────────────────────────────

/// Load a session file into a [`TrialTable`].
///
/// * `*.json` – a cached snapshot, returned directly.
/// * `*.mat` – the sibling `*.json` snapshot when it exists; otherwise the
///   MAT file is parsed and the snapshot is written for next time.
///
/// Any other extension is rejected with [`AlignError::UnsupportedFormat`].
pub fn load_trial_table(path: &Path) -> Result<TrialTable> {
    if !path.is_file() {
        return Err(AlignError::NotAFile(path.to_path_buf()));
    }

    match path.extension().and_then(|e| e.to_str()) {
        Some(CACHE_EXTENSION) => load_cached_table(path),
        Some(RAW_EXTENSION) => {
            let cache_path = cache_path_for(path);
            if cache_path.exists() {
                debug!("Using cached table {}", cache_path.display());
                return load_cached_table(&cache_path);
            }

            info!("Parsing raw session {}", path.display());
            let table = parse_mat_file(path)?;
            if let Err(e) = write_cached_table(&table, &cache_path) {
                warn!("Could not write cache {}: {}", cache_path.display(), e);
            }
            Ok(table)
        }
        _ => Err(AlignError::UnsupportedFormat(path.to_path_buf())),
    }
}

/// Sibling cache path of a raw file: same stem, `.json` extension.
pub fn cache_path_for(raw_path: &Path) -> PathBuf {
    raw_path.with_extension(CACHE_EXTENSION)
}

/// Read a cached snapshot, rejecting documents that are not trial tables.
pub fn load_cached_table(path: &Path) -> Result<TrialTable> {
    let content = std::fs::read_to_string(path).map_err(|source| AlignError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let value: serde_json::Value = serde_json::from_str(&content)?;

    if value.get("kind").and_then(|k| k.as_str()) != Some(SNAPSHOT_KIND) {
        return Err(AlignError::NotATrialTable(path.to_path_buf()));
    }
    let snapshot: TableSnapshot = serde_json::from_value(value).map_err(|e| {
        debug!("Snapshot {} does not decode: {}", path.display(), e);
        AlignError::NotATrialTable(path.to_path_buf())
    })?;
    if snapshot.version != SNAPSHOT_VERSION {
        warn!(
            "Cache {} has version {}, expected {}",
            path.display(),
            snapshot.version,
            SNAPSHOT_VERSION
        );
    }

    snapshot.into_table()
}

/// Atomically write `table` as a snapshot to `path`.
pub fn write_cached_table(table: &TrialTable, path: &Path) -> Result<()> {
    let json = serde_json::to_string(&TableSnapshot::from_table(table))?;

    // Write to a temp file then rename for atomicity.
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    debug!("Wrote cache {}", path.display());
    Ok(())
}

// ── Snapshot format ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct TableSnapshot {
    kind: String,
    version: u32,
    subject: String,
    session: String,
    #[serde(default)]
    date: Option<NaiveDate>,
    #[serde(default)]
    bin_size: Option<f64>,
    trials: Vec<TrialSnapshot>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TrialSnapshot {
    trial_id: i64,
    target_id: i64,
    #[serde(default)]
    indices: BTreeMap<String, i64>,
    #[serde(default)]
    scalars: BTreeMap<String, JsonFloat>,
    signals: BTreeMap<String, DenseArray>,
}

impl TableSnapshot {
    fn from_table(table: &TrialTable) -> Self {
        TableSnapshot {
            kind: SNAPSHOT_KIND.to_string(),
            version: SNAPSHOT_VERSION,
            subject: table.subject.clone(),
            session: table.session.clone(),
            date: table.date,
            bin_size: table.bin_size,
            trials: table
                .trials
                .iter()
                .map(|t| TrialSnapshot {
                    trial_id: t.trial_id,
                    target_id: t.target_id,
                    indices: t.indices.clone(),
                    scalars: t
                        .scalars
                        .iter()
                        .map(|(k, &v)| (k.clone(), JsonFloat(v)))
                        .collect(),
                    signals: t
                        .signals
                        .iter()
                        .map(|(k, m)| (k.clone(), DenseArray::from_array(m)))
                        .collect(),
                })
                .collect(),
        }
    }

    fn into_table(self) -> Result<TrialTable> {
        let trials = self
            .trials
            .into_iter()
            .map(|t| {
                let signals = t
                    .signals
                    .into_iter()
                    .map(|(k, dense)| dense.to_array_dim::<Ix2>().map(|m| (k, m)))
                    .collect::<Result<_>>()?;
                Ok(Trial {
                    trial_id: t.trial_id,
                    target_id: t.target_id,
                    indices: t.indices,
                    scalars: t
                        .scalars
                        .into_iter()
                        .map(|(k, v)| (k, v.0))
                        .collect(),
                    signals,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut table = TrialTable::new(self.subject, self.session, trials)?;
        table.date = self.date;
        table.bin_size = self.bin_size;
        Ok(table)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
