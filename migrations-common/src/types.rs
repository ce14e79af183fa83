//! Types describing the steps of a contract migration plan

use std::{
    fmt::{self, Display},
    str::FromStr,
};

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

use crate::{constants::ARTIFACT_VERSION_SEPARATOR, custom_serde::U256Literal};

// -------------
// | ARTIFACTS |
// -------------

/// Identifies a compiled contract artifact by name and, optionally, version.
///
/// Different revisions of a contract may take different constructor
/// arguments, so a plan pins the revision it was written against by
/// referring to e.g. `Time@2` rather than just `Time`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArtifactId {
    /// The contract name, e.g. `LandType`
    pub name: String,
    /// The artifact revision, if the artifact is versioned
    pub version: Option<String>,
}

impl ArtifactId {
    /// An unversioned artifact id
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    /// A versioned artifact id
    pub fn versioned(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: Some(version.into()),
        }
    }
}

impl Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}{}{}", self.name, ARTIFACT_VERSION_SEPARATOR, version),
            None => write!(f, "{}", self.name),
        }
    }
}

/// An error parsing an [`ArtifactId`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactIdParseError(pub String);

impl Display for ArtifactIdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid artifact id `{}`", self.0)
    }
}

impl std::error::Error for ArtifactIdParseError {}

impl FromStr for ArtifactId {
    type Err = ArtifactIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ArtifactIdParseError(s.to_string());
        match s.split_once(ARTIFACT_VERSION_SEPARATOR) {
            Some((name, version)) => {
                if name.is_empty()
                    || version.is_empty()
                    || version.contains(ARTIFACT_VERSION_SEPARATOR)
                {
                    return Err(invalid());
                }
                Ok(ArtifactId::versioned(name, version))
            }
            None if s.is_empty() => Err(invalid()),
            None => Ok(ArtifactId::new(s)),
        }
    }
}

impl From<&str> for ArtifactId {
    fn from(name: &str) -> Self {
        ArtifactId::new(name)
    }
}

// ------------
// | LITERALS |
// ------------

/// A literal value passed to a constructor or a post-deploy call
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiteralValue {
    /// An account or contract address
    Address(Address),
    /// An unsigned integer of up to 256 bits
    Number(#[serde_as(as = "U256Literal")] U256),
    /// A UTF-8 string
    String(String),
    /// A boolean
    Bool(bool),
    /// An array of addresses
    Addresses(Vec<Address>),
    /// An array of unsigned integers
    Numbers(#[serde_as(as = "Vec<U256Literal>")] Vec<U256>),
    /// An array of strings
    Strings(Vec<String>),
}

impl LiteralValue {
    /// A number literal
    pub fn number(n: u64) -> Self {
        LiteralValue::Number(U256::from(n))
    }

    /// A string literal
    pub fn string(s: impl Into<String>) -> Self {
        LiteralValue::String(s.into())
    }

    /// A human-readable name for the kind of the literal, used in diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            LiteralValue::Address(_) => "address",
            LiteralValue::Number(_) => "number",
            LiteralValue::String(_) => "string",
            LiteralValue::Bool(_) => "bool",
            LiteralValue::Addresses(_) => "address array",
            LiteralValue::Numbers(_) => "number array",
            LiteralValue::Strings(_) => "string array",
        }
    }
}

impl Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        /// Write a bracketed, comma-separated list
        fn list<T: Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
            write!(f, "[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{item}")?;
            }
            write!(f, "]")
        }

        match self {
            LiteralValue::Address(a) => write!(f, "{a:#x}"),
            LiteralValue::Number(n) => write!(f, "{n}"),
            LiteralValue::String(s) => write!(f, "{s:?}"),
            LiteralValue::Bool(b) => write!(f, "{b}"),
            LiteralValue::Addresses(a) => list(f, a),
            LiteralValue::Numbers(n) => list(f, n),
            LiteralValue::Strings(s) => {
                let quoted: Vec<String> = s.iter().map(|s| format!("{s:?}")).collect();
                list(f, &quoted)
            }
        }
    }
}

// ---------
// | STEPS |
// ---------

/// A constructor argument: either a literal or the address produced by an
/// earlier step of the same run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgumentSpec {
    /// A literal value, passed through as-is
    Literal(LiteralValue),
    /// The address deployed by the named step
    Reference(String),
}

impl From<LiteralValue> for ArgumentSpec {
    fn from(value: LiteralValue) -> Self {
        ArgumentSpec::Literal(value)
    }
}

/// A call made against a freshly deployed contract, e.g. a role grant
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostDeployAction {
    /// The name of the contract method to invoke
    pub method: String,
    /// The literal arguments to the method, in order
    pub arguments: Vec<LiteralValue>,
}

impl PostDeployAction {
    /// Construct a new post-deploy action
    pub fn new(method: impl Into<String>, arguments: Vec<LiteralValue>) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }
}

impl Display for PostDeployAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.method)?;
        for (i, arg) in self.arguments.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ")")
    }
}

/// A single step of a migration: deploy one artifact, then run its
/// post-deploy actions
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentStep {
    /// The name under which the deployed address is recorded
    pub name: String,
    /// The artifact to deploy
    #[serde_as(as = "DisplayFromStr")]
    pub artifact: ArtifactId,
    /// The constructor arguments, in positional order
    pub arguments: Vec<ArgumentSpec>,
    /// The calls to make once the contract is deployed, in order
    pub post_deploy: Vec<PostDeployAction>,
}

impl DeploymentStep {
    /// A step with no arguments and no post-deploy actions
    pub fn new(name: impl Into<String>, artifact: impl Into<ArtifactId>) -> Self {
        Self {
            name: name.into(),
            artifact: artifact.into(),
            arguments: Vec::new(),
            post_deploy: Vec::new(),
        }
    }

    /// Append a literal constructor argument
    pub fn with_literal(mut self, value: LiteralValue) -> Self {
        self.arguments.push(ArgumentSpec::Literal(value));
        self
    }

    /// Append a constructor argument referencing an earlier step's address
    pub fn with_reference(mut self, step: impl Into<String>) -> Self {
        self.arguments.push(ArgumentSpec::Reference(step.into()));
        self
    }

    /// Append a post-deploy action
    pub fn with_action(mut self, action: PostDeployAction) -> Self {
        self.post_deploy.push(action);
        self
    }

    /// The names of the steps this step references, in argument order
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.arguments.iter().filter_map(|arg| match arg {
            ArgumentSpec::Reference(step) => Some(step.as_str()),
            ArgumentSpec::Literal(_) => None,
        })
    }
}
