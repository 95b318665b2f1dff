//! Session catalogs: which recordings belong to an analysis.
//!
//! A catalog is a small JSON file listing, per brain area, the session files
//! of every subject, plus a few example sessions used for raster figures:
//!
//! ```json
//! {
//!   "areas": { "MCx": { "Chewie": ["Chewie_CO_2016-10-14.mat"] } },
//!   "examples": ["Chewie/Chewie_CO_2016-10-14.mat"]
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use align_core::epoch::Epoch;
use align_core::models::TrialTable;
use align_core::{AlignError, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::reader::{load_trial_table, RAW_EXTENSION};

/// Subjects containing this marker are left out of area collections.
pub const DEFAULT_SKIP_MARKERS: &[&str] = &["Mr"];

/// One `(subject, session file)` entry of a catalog.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SessionRef {
    pub subject: String,
    pub session: String,
}

impl SessionRef {
    /// Location of the session file under `root`: `root/subject/session`.
    pub fn path_in(&self, root: &Path) -> PathBuf {
        root.join(&self.subject).join(&self.session)
    }
}

/// Recording sessions grouped by area and subject.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionCatalog {
    /// area → subject → session files (duplicates allowed).
    #[serde(default)]
    pub areas: BTreeMap<String, BTreeMap<String, Vec<String>>>,
    /// Example sessions, relative to the data root.
    #[serde(default)]
    pub examples: Vec<String>,
}

impl SessionCatalog {
    /// Load a catalog from a JSON file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| AlignError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Distinct sessions of `area`, sorted by subject then session.
    ///
    /// Subjects whose name contains any of `skip_markers` are left out.
    pub fn sessions_for_area(&self, area: &str, skip_markers: &[&str]) -> Result<Vec<SessionRef>> {
        let subjects = self
            .areas
            .get(area)
            .ok_or_else(|| AlignError::Config(format!("area {} not in catalog", area)))?;

        let sessions: BTreeSet<SessionRef> = subjects
            .iter()
            .filter(|(subject, _)| !skip_markers.iter().any(|m| subject.contains(m)))
            .flat_map(|(subject, files)| {
                files.iter().map(move |f| SessionRef {
                    subject: subject.clone(),
                    session: f.clone(),
                })
            })
            .collect();

        Ok(sessions.into_iter().collect())
    }
}

// ── Collection loading ────────────────────────────────────────────────────────

/// Load every session of `area` and run `prep` on each table.
///
/// Returns the session list alongside the tables, in the same order.
pub fn load_area_sessions<F>(
    root: &Path,
    catalog: &SessionCatalog,
    area: &str,
    skip_markers: &[&str],
    mut prep: F,
) -> Result<(Vec<SessionRef>, Vec<TrialTable>)>
where
    F: FnMut(TrialTable) -> Result<TrialTable>,
{
    let sessions = catalog.sessions_for_area(area, skip_markers)?;
    let tables = sessions
        .iter()
        .map(|s| load_trial_table(&s.path_in(root)).and_then(&mut prep))
        .collect::<Result<Vec<_>>>()?;

    info!("Loaded {} {} sessions from {}", tables.len(), area, root.display());
    Ok((sessions, tables))
}

/// Load the example sessions, optionally restricted to `epoch`.
pub fn load_example_sessions(
    root: &Path,
    catalog: &SessionCatalog,
    epoch: Option<&Epoch>,
) -> Result<Vec<TrialTable>> {
    catalog
        .examples
        .iter()
        .map(|rel| {
            let table = load_trial_table(&root.join(rel))?;
            match epoch {
                Some(epoch) => table.restrict(epoch),
                None => Ok(table),
            }
        })
        .collect()
}

/// Find all raw session files recursively under `root`, sorted by path.
pub fn find_mat_files(root: &Path) -> Vec<PathBuf> {
    if !root.exists() {
        warn!("Data root does not exist: {}", root.display());
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .map(|ext| ext == RAW_EXTENSION)
                    .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    files
}

// ── Tests ─────────────────────────────────────────────────────────────────────
