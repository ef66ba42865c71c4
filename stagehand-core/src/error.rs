use std::path::PathBuf;

/// Everything that can stop a staging run.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// Bad rule, pattern, culture tag, or a missing required tool.
    #[error("configuration error: {0}")]
    Config(String),

    /// Two source files that differ only in case.
    #[error("staging manifest already contains {first} (or a file that differs in case only): {second}")]
    Collision { first: String, second: String },

    #[error("{tool} exited with code {code}")]
    ExternalTool { tool: String, code: i32 },

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: unparsable stamp {value:?}")]
    BadStamp { path: PathBuf, line: usize, value: String },

    #[error("{path}:{line}: {reason}")]
    Manifest { path: PathBuf, line: usize, reason: String },

    #[error("staging cancelled")]
    Cancelled,

    #[error("staging directory {dir} is locked by another run")]
    Busy { dir: PathBuf },
}

impl StageError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StageError::Io { path: path.into(), source }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        StageError::Config(msg.into())
    }

    /// Whether re-running the whole staging operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StageError::ExternalTool { .. } | StageError::Cancelled | StageError::Busy { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, StageError>;

/// Attach a path to a raw `std::io::Result`.
pub(crate) trait IoContext<T> {
    fn at(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn at(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| StageError::io(path, e))
    }
}
