use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::domain::Subsystem;

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("No project manifest found (searched: {})", display_paths(.searched))]
    ManifestNotFound { searched: Vec<PathBuf> },

    #[error("Invalid project manifest {}: {reason}", .path.display())]
    ManifestInvalid { path: PathBuf, reason: String },

    #[error("Port {port} is already in use")]
    PortInUse { port: u16 },

    #[error("Could not probe port {port}: {reason}")]
    PortProbeFailed { port: u16, reason: String },

    #[error("Environment preparation failed: {0}")]
    EnvironmentFailed(String),

    #[error("Dependency hydration failed: {0}")]
    HydrationFailed(String),

    #[error("Function scaffolding failed: {0}")]
    ScaffoldFailed(String),

    #[error("{subsystem} failed to start: {reason}")]
    SubsystemStartFailed { subsystem: Subsystem, reason: String },

    #[error("Teardown failed for {}", display_failures(.0))]
    TeardownFailed(Vec<TeardownFailure>),

    #[error("Startup step #{index} `{step}` failed: {source}")]
    StepFailed {
        index: usize,
        step: String,
        #[source]
        source: Box<SandboxError>,
    },

    #[error("Startup script `{command}` failed: {reason}")]
    StartupScriptFailed { command: String, reason: String },

    #[error("Startup sequence has already run")]
    SequenceAlreadyRun,

    #[error("Startup cancelled before step `{before_step}`")]
    Cancelled { before_step: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    /// Create a subsystem start failure.
    pub fn start_failed(subsystem: Subsystem, reason: impl fmt::Display) -> Self {
        Self::SubsystemStartFailed {
            subsystem,
            reason: reason.to_string(),
        }
    }

    /// A single subsystem that failed to shut down.
    pub fn teardown_failed(subsystem: Subsystem, reason: impl fmt::Display) -> Self {
        Self::TeardownFailed(vec![TeardownFailure {
            subsystem,
            reason: reason.to_string(),
        }])
    }

    /// Attach the position of the failing startup step.
    pub fn at_step(self, index: usize, step: impl Into<String>) -> Self {
        Self::StepFailed {
            index,
            step: step.into(),
            source: Box::new(self),
        }
    }

    /// The underlying failure with any positional step context removed.
    pub fn root_cause(&self) -> &SandboxError {
        match self {
            Self::StepFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Owned variant of [`SandboxError::root_cause`].
    pub fn into_root_cause(self) -> SandboxError {
        match self {
            Self::StepFailed { source, .. } => source.into_root_cause(),
            other => other,
        }
    }

    /// Name of the outermost failing step, if the error carries one.
    pub fn failed_step(&self) -> Option<(usize, &str)> {
        match self {
            Self::StepFailed { index, step, .. } => Some((*index, step.as_str())),
            _ => None,
        }
    }
}

/// One subsystem that could not be closed cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownFailure {
    pub subsystem: Subsystem,
    pub reason: String,
}

impl fmt::Display for TeardownFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.subsystem, self.reason)
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn display_failures(failures: &[TeardownFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, SandboxError>;
