//! The plan file: one list of steps shared by every environment, with the
//! values that differ between environments pulled out into variables.
//!
//! Variables and addresses from earlier migrations are substituted when the
//! plan is loaded, so the pipeline only ever sees literals and references
//! to earlier steps of the same run.

use std::{collections::BTreeMap, path::Path};

use itertools::Itertools;
use migrations_common::types::{
    ArgumentSpec, ArtifactId, DeploymentStep, LiteralValue, PostDeployAction,
};
use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr};

use crate::{
    errors::ScriptError,
    manifest::DeploymentManifest,
    pipeline::{DeploymentPlan, FailurePolicy},
    post_deploy::ActionPolicy,
    utils::get_json_from_file,
};

/// A parsed plan file
#[derive(Clone, Debug, Deserialize)]
pub struct PlanFile {
    /// The environments the plan can be run against, by name
    pub environments: BTreeMap<String, EnvironmentConfig>,
    /// The steps, in declaration order
    pub steps: Vec<StepConfig>,
}

/// The settings of one environment
#[derive(Clone, Debug, Default, Deserialize)]
pub struct EnvironmentConfig {
    /// Values substituted for `{"var": ..}` arguments
    #[serde(default)]
    pub variables: BTreeMap<String, LiteralValue>,
    /// The failure policy used unless overridden
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// The post-deploy action policy used unless overridden
    #[serde(default)]
    pub action_policy: ActionPolicy,
}

/// A step as written in the plan file
#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct StepConfig {
    /// The step name, the artifact name if omitted
    #[serde(default)]
    pub name: Option<String>,
    /// The artifact, as `Name` or `Name@version`
    #[serde_as(as = "DisplayFromStr")]
    pub artifact: ArtifactId,
    /// The constructor arguments
    #[serde(default)]
    pub arguments: Vec<ArgumentConfig>,
    /// The post-deploy actions
    #[serde(default)]
    pub post_deploy: Vec<ActionConfig>,
}

impl StepConfig {
    /// The name the step's address is recorded under
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.artifact.name)
    }
}

/// A post-deploy action as written in the plan file
#[derive(Clone, Debug, Deserialize)]
pub struct ActionConfig {
    /// The method to call
    pub method: String,
    /// The call arguments
    #[serde(default)]
    pub arguments: Vec<ArgumentConfig>,
}

/// An argument as written in the plan file
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ArgumentConfig {
    /// The address deployed by an earlier step of this run
    Ref {
        /// The referenced step
        #[serde(rename = "ref")]
        step: String,
    },
    /// An environment variable
    Var {
        /// The variable name
        var: String,
    },
    /// An address recorded by an earlier migration
    External {
        /// The step name in the previous deployments manifest
        external: String,
    },
    /// A literal value
    Literal(LiteralValue),
}

/// A plan materialized for one environment
#[derive(Clone, Debug)]
pub struct LoadedPlan {
    /// The validated steps
    pub plan: DeploymentPlan,
    /// The environment's failure policy
    pub failure_policy: FailurePolicy,
    /// The environment's post-deploy action policy
    pub action_policy: ActionPolicy,
}

impl PlanFile {
    /// Read and parse a plan file
    pub fn load(path: &Path) -> Result<Self, ScriptError> {
        let json = get_json_from_file(path)?;
        serde_json::from_value(json)
            .map_err(|e| ScriptError::Config(format!("{}: {e}", path.display())))
    }

    /// Look up an environment by name
    pub fn environment(&self, name: &str) -> Result<&EnvironmentConfig, ScriptError> {
        self.environments.get(name).ok_or_else(|| {
            ScriptError::Config(format!(
                "unknown environment `{name}`, expected one of: {}",
                self.environments.keys().join(", ")
            ))
        })
    }

    /// Substitute the environment's variables and the previous migration's
    /// addresses into the steps, and validate the resulting plan
    pub fn materialize(
        &self,
        env_name: &str,
        previous: Option<&DeploymentManifest>,
    ) -> Result<LoadedPlan, ScriptError> {
        let env = self.environment(env_name)?;
        let substitutions = Substitutions { env_name, env, previous };

        let steps = self
            .steps
            .iter()
            .map(|step| substitutions.step(step))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(LoadedPlan {
            plan: DeploymentPlan::new(steps)?,
            failure_policy: env.failure_policy,
            action_policy: env.action_policy,
        })
    }
}

/// The values available for substitution into a plan
struct Substitutions<'a> {
    /// The name of the environment, for diagnostics
    env_name: &'a str,
    /// The environment being materialized
    env: &'a EnvironmentConfig,
    /// The deployments of an earlier migration, if given
    previous: Option<&'a DeploymentManifest>,
}

impl Substitutions<'_> {
    /// Materialize a step
    fn step(&self, step: &StepConfig) -> Result<DeploymentStep, ScriptError> {
        let arguments = step
            .arguments
            .iter()
            .map(|arg| match arg {
                ArgumentConfig::Ref { step: reference } => {
                    Ok(ArgumentSpec::Reference(reference.clone()))
                }
                other => self.literal(other, step.name()).map(ArgumentSpec::Literal),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let post_deploy = step
            .post_deploy
            .iter()
            .map(|action| {
                let arguments = action
                    .arguments
                    .iter()
                    .map(|arg| self.literal(arg, step.name()))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(PostDeployAction::new(action.method.clone(), arguments))
            })
            .collect::<Result<Vec<_>, ScriptError>>()?;

        Ok(DeploymentStep {
            name: step.name().to_string(),
            artifact: step.artifact.clone(),
            arguments,
            post_deploy,
        })
    }

    /// Substitute a non-reference argument with its literal value
    fn literal(&self, arg: &ArgumentConfig, step: &str) -> Result<LiteralValue, ScriptError> {
        match arg {
            ArgumentConfig::Literal(value) => Ok(value.clone()),
            ArgumentConfig::Var { var } => self.env.variables.get(var).cloned().ok_or_else(|| {
                ScriptError::Config(format!(
                    "step `{step}` uses variable `{var}`, which environment `{}` does not define",
                    self.env_name
                ))
            }),
            ArgumentConfig::External { external } => self
                .previous
                .ok_or_else(|| {
                    ScriptError::Config(format!(
                        "step `{step}` uses the address of `{external}` from a previous \
                         migration, but no previous deployments were given"
                    ))
                })?
                .get(external)
                .map(LiteralValue::Address)
                .ok_or_else(|| {
                    ScriptError::Config(format!(
                        "step `{step}`: `{external}` is not in the previous deployments"
                    ))
                }),
            ArgumentConfig::Ref { step: reference } => Err(ScriptError::Config(format!(
                "step `{step}`: references to `{reference}` are only allowed in constructor \
                 arguments"
            ))),
        }
    }
}
