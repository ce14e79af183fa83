//! Definitions of errors that can occur during a migration run

use std::{
    error::Error,
    fmt::{self, Display, Formatter},
};

/// Errors that can occur while deploying a single step of a migration.
///
/// These are recorded in the run output rather than aborting the process,
/// so that the operator always sees exactly which steps landed on-chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployError {
    /// The step names an artifact that was never registered
    UnknownArtifact(String),
    /// A literal argument does not fit the declared parameter type,
    /// or the number of arguments does not match the signature
    ArgumentTypeMismatch(String),
    /// A back-reference names a step that has not completed in this run
    UnresolvedReference(String),
    /// The RPC transport failed; the only retryable condition
    ConnectivityError(String),
    /// The transaction was not confirmed within the configured timeout
    DeploymentTimeout(String),
    /// The network rejected or reverted the transaction
    DeploymentReverted(String),
    /// A post-deploy call failed; the deployment itself stands
    PostDeployActionFailed(String),
}

impl DeployError {
    /// Whether the operation that produced this error may be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeployError::ConnectivityError(_))
    }

    /// Whether this error was detected from the plan alone, before any
    /// network I/O took place
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            DeployError::UnknownArtifact(_)
                | DeployError::ArgumentTypeMismatch(_)
                | DeployError::UnresolvedReference(_)
        )
    }
}

impl Display for DeployError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DeployError::UnknownArtifact(s) => write!(f, "unknown artifact: {}", s),
            DeployError::ArgumentTypeMismatch(s) => write!(f, "argument type mismatch: {}", s),
            DeployError::UnresolvedReference(s) => write!(f, "unresolved reference: {}", s),
            DeployError::ConnectivityError(s) => write!(f, "connectivity error: {}", s),
            DeployError::DeploymentTimeout(s) => write!(f, "deployment timed out: {}", s),
            DeployError::DeploymentReverted(s) => write!(f, "deployment reverted: {}", s),
            DeployError::PostDeployActionFailed(s) => {
                write!(f, "post-deploy action failed: {}", s)
            }
        }
    }
}

impl Error for DeployError {}

/// Errors in the structure of a migration plan, detected before it runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// Two steps share the same name
    DuplicateStep(String),
    /// A step references a step declared after it, or itself
    ForwardReference {
        /// The referencing step
        step: String,
        /// The referenced step
        reference: String,
    },
    /// A step references a step that does not exist in the plan
    UnknownReference {
        /// The referencing step
        step: String,
        /// The referenced step
        reference: String,
    },
}

impl Display for PlanError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            PlanError::DuplicateStep(s) => write!(f, "duplicate step name `{}`", s),
            PlanError::ForwardReference { step, reference } => write!(
                f,
                "step `{}` references `{}`, which is not declared before it",
                step, reference
            ),
            PlanError::UnknownReference { step, reference } => {
                write!(f, "step `{}` references unknown step `{}`", step, reference)
            }
        }
    }
}

impl Error for PlanError {}

/// Errors that can occur during the execution of the migration scripts
#[derive(Debug)]
pub enum ScriptError {
    /// Error reading a file
    ReadFile(String),
    /// Error writing a file
    WriteFile(String),
    /// Error parsing a compilation artifact
    ArtifactParsing(String),
    /// Error initializing the RPC client
    ClientInitialization(String),
    /// Error in the plan file or the selected environment
    Config(String),
    /// The plan is structurally invalid
    Plan(PlanError),
    /// A step could not be resolved during a dry run
    Deploy(DeployError),
    /// Error de/serializing a file
    Serde(String),
    /// The migration ran, but not every step succeeded
    RunFailed(String),
}

impl Display for ScriptError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ScriptError::ReadFile(s) => write!(f, "error reading file: {}", s),
            ScriptError::WriteFile(s) => write!(f, "error writing file: {}", s),
            ScriptError::ArtifactParsing(s) => write!(f, "error parsing artifact: {}", s),
            ScriptError::ClientInitialization(s) => write!(f, "error initializing client: {}", s),
            ScriptError::Config(s) => write!(f, "invalid configuration: {}", s),
            ScriptError::Plan(e) => write!(f, "invalid plan: {}", e),
            ScriptError::Deploy(e) => write!(f, "{}", e),
            ScriptError::Serde(s) => write!(f, "error de/serializing: {}", s),
            ScriptError::RunFailed(s) => write!(f, "migration did not complete: {}", s),
        }
    }
}

impl Error for ScriptError {}

impl From<PlanError> for ScriptError {
    fn from(e: PlanError) -> Self {
        ScriptError::Plan(e)
    }
}

impl From<DeployError> for ScriptError {
    fn from(e: DeployError) -> Self {
        ScriptError::Deploy(e)
    }
}
