use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, LaunchError>;

/// Every way a launch can fail. All of them are fatal: nothing has been
/// started yet when they occur, so there is nothing to retry against.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("cannot determine the location of the running archive: {reason}")]
    PathResolution {
        reason: String,
        #[source]
        source: Option<io::Error>,
    },

    #[error("failed to read archive {}: {reason}", path.display())]
    ArchiveRead {
        path: PathBuf,
        reason: String,
        #[source]
        source: Option<io::Error>,
    },

    #[error("{0}")]
    ConfigurationMissing(String),

    #[error("{0}")]
    ConfigurationInvalid(String),

    #[error("{0}")]
    ResourceNotFound(String),

    #[error("Failed to create a temporary file in '{}'.", dir.display())]
    TempFileCreation {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to extract {entry} to {}", target.display())]
    Copy {
        entry: String,
        target: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{0}")]
    SymbolResolution(String),

    #[error("failed to run {}: {reason}", program.display())]
    Invocation {
        program: PathBuf,
        reason: String,
        #[source]
        source: Option<io::Error>,
    },
}

impl LaunchError {
    pub(crate) fn path(reason: impl Into<String>, source: Option<io::Error>) -> Self {
        Self::PathResolution {
            reason: reason.into(),
            source,
        }
    }

    pub(crate) fn archive(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ArchiveRead {
            path: path.into(),
            reason: reason.into(),
            source: None,
        }
    }

    pub(crate) fn archive_io(path: impl Into<PathBuf>, reason: impl Into<String>, source: io::Error) -> Self {
        Self::ArchiveRead {
            path: path.into(),
            reason: reason.into(),
            source: Some(source),
        }
    }
}
