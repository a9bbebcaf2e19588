use std::path::PathBuf;

/// Problems with the run's configuration. Always fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown format '{0}'")]
    UnknownFormat(String),

    #[error("invalid pattern: {0}")]
    PatternCompile(#[from] regex::Error),

    #[error("pattern declares no named capture groups")]
    NoNamedGroups,

    #[error("log_format template is empty")]
    EmptyTemplate,

    #[error("invalid log_format template: {0}")]
    InvalidTemplate(String),

    #[error("buffer size must be at least 1 byte, got {0}")]
    InvalidBufferSize(usize),

    #[error("custom format '{0}' shadows a built-in preset")]
    ShadowedPreset(String),

    #[error("failed to read settings file '{path}': {source}")]
    SettingsRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings file '{path}': {source}")]
    SettingsParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Problems with one input. The input is skipped, the run goes on.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to open input file '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("'{0}' is a directory")]
    IsDirectory(PathBuf),

    #[error("invalid glob pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("no files match '{0}'")]
    NoMatches(String),

    #[error(transparent)]
    Glob(#[from] glob::GlobError),

    #[error("failed to read {name}: {source}")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Why a single line produced no record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseFailure {
    #[error("unparsable line")]
    Unparsable,

    #[error("line too long: {length} > {max_length}")]
    LineTooLong { length: usize, max_length: usize },
}

/// Errors that stop the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to start filter '{program}': {source}")]
    FilterSpawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to close filter input: {0}")]
    FilterClose(#[source] std::io::Error),

    #[error("filter '{program}' exited with {status}")]
    FilterStatus {
        program: PathBuf,
        status: std::process::ExitStatus,
    },

    #[error("{name}: line {line}: {failure}")]
    Aborted {
        name: String,
        line: usize,
        failure: ParseFailure,
    },

    #[error("interrupted")]
    Interrupted,
}

impl ProcessingError {
    /// True when the downstream reader went away.
    pub fn is_broken_pipe(&self) -> bool {
        matches!(self, ProcessingError::IoError(e) if e.kind() == std::io::ErrorKind::BrokenPipe)
    }
}
