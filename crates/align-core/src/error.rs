use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the alignment pipeline.
#[derive(Error, Debug)]
pub enum AlignError {
    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The given path does not point to a regular file.
    #[error("Path is not to a file: {0}")]
    NotAFile(PathBuf),

    /// The file extension is neither a raw recording nor a cached table.
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(PathBuf),

    /// A cache file was readable but does not hold a trial table.
    #[error("Wrong data in cache file {0}")]
    NotATrialTable(PathBuf),

    /// A JSON document could not be parsed.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A raw MAT file could not be decoded into a trial table.
    #[error("Failed to parse MAT file {path}: {message}")]
    MatParse { path: PathBuf, message: String },

    /// A required field (column, signal or event index) is absent.
    #[error("Missing field: {0}")]
    MissingField(String),

    /// Trials of one table disagree on their declared fields.
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A window or index falls outside the available data.
    #[error("Index out of range: {0}")]
    IndexOutOfRange(String),

    /// Array extents that must agree do not.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A session lacks a target present in the first session.
    #[error("Session {session} has no trials for target {target}")]
    TargetMismatch { session: usize, target: i64 },

    /// An operation received no data to work on.
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// The dimensionality-reduction model could not be fit or applied.
    #[error("Reduction model error: {0}")]
    Reduction(String),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenience alias used throughout the alignment crates.
pub type Result<T> = std::result::Result<T, AlignError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_file_read() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = AlignError::FileRead {
            path: PathBuf::from("/data/Chewie_CO_2016-10-14.mat"),
            source: io_err,
        };
        let msg = err.to_string();
        assert!(msg.contains("Failed to read file"));
        assert!(msg.contains("Chewie_CO_2016-10-14.mat"));
        assert!(msg.contains("no such file"));
    }

    #[test]
    fn test_error_display_unsupported_format() {
        let err = AlignError::UnsupportedFormat(PathBuf::from("/data/session.csv"));
        assert_eq!(err.to_string(), "Unsupported file format: /data/session.csv");
    }

    #[test]
    fn test_error_display_not_a_trial_table() {
        let err = AlignError::NotATrialTable(PathBuf::from("/data/session.json"));
        assert_eq!(err.to_string(), "Wrong data in cache file /data/session.json");
    }

    #[test]
    fn test_error_display_target_mismatch() {
        let err = AlignError::TargetMismatch {
            session: 2,
            target: 5,
        };
        assert_eq!(err.to_string(), "Session 2 has no trials for target 5");
    }

    #[test]
    fn test_error_display_index_out_of_range() {
        let err = AlignError::IndexOutOfRange("window 40..60 exceeds 50 bins".to_string());
        assert_eq!(
            err.to_string(),
            "Index out of range: window 40..60 exceeds 50 bins"
        );
    }

    #[test]
    fn test_error_display_mat_parse() {
        let err = AlignError::MatParse {
            path: PathBuf::from("/data/x.mat"),
            message: "missing trial_length".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to parse MAT file /data/x.mat: missing trial_length"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: AlignError = io_err.into();
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid}").unwrap_err();
        let err: AlignError = json_err.into();
        assert!(err.to_string().contains("Failed to parse JSON"));
    }
}
