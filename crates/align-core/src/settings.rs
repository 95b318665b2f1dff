use clap::{CommandFactory, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::epoch::Epoch;
use crate::params::{default_data_root, DEFAULT_SEED};

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Align trial-structured neural recordings into dense PCA arrays
#[derive(Parser, Debug, Clone)]
#[command(
    name = "neural-align",
    about = "Align trial-structured neural recordings into dense PCA arrays",
    version
)]
pub struct Settings {
    /// Root directory of the recording files
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Seed of the shared random generator
    #[arg(long, default_value_t = DEFAULT_SEED)]
    pub seed: u64,

    /// Brain area whose firing rates are reduced (M1, PMd, S1, ...)
    #[arg(long, default_value = "M1")]
    pub area: String,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Clear saved configuration
    #[arg(long)]
    pub clear: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// What to do with the loaded sessions.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Print a summary of each session
    Summary {
        #[command(flatten)]
        sessions: SessionArgs,
    },

    /// List the cross-session pairs used for alignment
    Pairs {
        #[command(flatten)]
        sessions: SessionArgs,

        /// Subject-name marker; two sessions whose subjects both contain it are not paired
        #[arg(long = "shared-marker", default_values_t = vec!["Chewie".to_string()])]
        shared_markers: Vec<String>,
    },

    /// Build the session × target × trial × time × component array
    Build(BuildArgs),

    /// Print the plotting parameters as JSON
    Style,
}

/// Where the sessions of a command come from.
///
/// Exactly one source: explicit files, a catalog (the `--area` collection or
/// its examples), or every raw file under the data root.
#[derive(clap::Args, Debug, Clone, PartialEq, Default)]
pub struct SessionArgs {
    /// Raw (.mat) or cached (.json) session files
    #[arg(required_unless_present_any = ["catalog", "all"])]
    pub files: Vec<PathBuf>,

    /// Session catalog (JSON); loads the sessions it lists for --area
    #[arg(long, conflicts_with = "files")]
    pub catalog: Option<PathBuf>,

    /// Load the catalog's example sessions instead of the area collection
    #[arg(long, requires = "catalog")]
    pub examples: bool,

    /// Load every raw session file found under the data root
    #[arg(long, conflicts_with_all = ["files", "catalog"])]
    pub all: bool,
}

/// Options of the `build` command.
#[derive(clap::Args, Debug, Clone, PartialEq)]
pub struct BuildArgs {
    #[command(flatten)]
    pub sessions: SessionArgs,

    /// Number of PCA components
    #[arg(long, default_value_t = 10)]
    pub components: usize,

    /// Event the time window is anchored on, e.g. idx_movement_on
    #[arg(long)]
    pub epoch_point: Option<String>,

    /// Second event; the window then spans epoch-point .. epoch-end
    #[arg(long, requires = "epoch_point")]
    pub epoch_end: Option<String>,

    /// Window start relative to the anchor, in bins
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub rel_start: i64,

    /// Window end (inclusive) relative to the anchor, in bins
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub rel_end: i64,

    /// Draw a random window of this many bins from each trial instead of an epoch
    #[arg(long, conflicts_with = "epoch_point")]
    pub window_len: Option<usize>,

    /// Also build the matched kinematic array from this field (e.g. pos)
    #[arg(long, requires = "epoch_point")]
    pub kinematics: Option<String>,

    /// Divide the kinematics by their 99th-percentile magnitude
    #[arg(long, requires = "kinematics")]
    pub normalize_kinematics: bool,

    /// Number of past time bins appended to every row
    #[arg(long, default_value_t = 0)]
    pub history: usize,

    /// Write the resulting array(s) as JSON here
    #[arg(long)]
    pub output: Option<PathBuf>,
}

impl BuildArgs {
    /// The time window selected on the command line, if any.
    pub fn epoch(&self) -> Option<Epoch> {
        let point = self.epoch_point.as_ref()?;
        Some(match &self.epoch_end {
            Some(end) => Epoch::between(point.clone(), end.clone(), self.rel_start, self.rel_end),
            None => Epoch::around(point.clone(), self.rel_start, self.rel_end),
        })
    }
}

// ── LastUsedParams ─────────────────────────────────────────────────────────────

/// Persisted last-used parameters saved to `~/.neural-align/last_used.json`.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct LastUsedParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
}

impl LastUsedParams {
    /// Return the default path to the persisted config file.
    /// Uses `~/.neural-align/last_used.json`.
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Return the config path rooted at `base_dir` (used for testing).
    pub fn config_path_in(base_dir: &std::path::Path) -> PathBuf {
        base_dir.join(".neural-align").join("last_used.json")
    }

    /// Load persisted params from an explicit path.
    /// Returns `Default` when the file is absent or cannot be parsed.
    pub fn load_from(path: &std::path::Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_default()
    }

    /// Atomically write params to an explicit path.
    pub fn save_to(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;

        // Write to a temp file then rename for atomicity.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;

        Ok(())
    }

    /// Delete the config file at an explicit path if it exists.
    pub fn clear_at(path: &std::path::Path) -> Result<(), std::io::Error> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse CLI arguments, merge with last-used params where no explicit CLI
    /// value was provided, and persist the result.
    pub fn load_with_last_used() -> Self {
        Self::load_with_last_used_impl(
            std::env::args_os().collect(),
            &LastUsedParams::config_path(),
        )
    }

    /// Full implementation – accepts args and an explicit config path so that
    /// tests can redirect to a temporary directory.
    pub fn load_with_last_used_impl(
        args: Vec<std::ffi::OsString>,
        config_path: &std::path::Path,
    ) -> Self {
        // Build raw ArgMatches so we can query ValueSource.
        let matches = Settings::command().get_matches_from(args.clone());

        let mut settings = Settings::parse_from(args);

        if settings.clear {
            let _ = LastUsedParams::clear_at(config_path);
            return Self::resolve_defaults(settings);
        }

        let last = LastUsedParams::load_from(config_path);

        // CLI always wins over persisted values.
        if settings.root.is_none() {
            settings.root = last.root;
        }
        if !is_arg_explicitly_set(&matches, "seed") {
            if let Some(v) = last.seed {
                settings.seed = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "area") {
            if let Some(v) = last.area {
                settings.area = v;
            }
        }

        settings = Self::resolve_defaults(settings);

        let params = LastUsedParams::from(&settings);
        let _ = params.save_to(config_path);

        settings
    }

    /// Fill in the data root and apply the `--debug` flag.
    fn resolve_defaults(mut settings: Settings) -> Settings {
        if settings.root.is_none() {
            settings.root = Some(default_data_root());
        }
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }
        settings
    }

    /// Root directory of the recording files.
    pub fn data_root(&self) -> PathBuf {
        self.root.clone().unwrap_or_else(default_data_root)
    }

    /// Resolve a session file argument against the data root.
    pub fn resolve_file(&self, file: &std::path::Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.data_root().join(file)
        }
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────────

impl From<&Settings> for LastUsedParams {
    fn from(s: &Settings) -> Self {
        LastUsedParams {
            root: s.root.clone(),
            seed: Some(s.seed),
            area: Some(s.area.clone()),
        }
    }
}

/// Returns `true` when `name` was supplied explicitly on the command line
/// (not via default value or environment variable).
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches.value_source(name) == Some(clap::parser::ValueSource::CommandLine)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
