use alloy::primitives::address;
use deploy_scripts::{
    artifacts::ArtifactRegistry,
    config::PlanFile,
    mock::{MockNetwork, MOCK_SENDER},
    pipeline::{dry_run, FailurePolicy, Orchestrator, RunStatus},
    post_deploy::ActionPolicy,
};
use eyre::Result;
use migrations_common::types::{ArgumentSpec, LiteralValue};

mod common;
use common::{address_word, artifact, config, registry, ROLE_METHODS};

/// The land registry migration plan
const LAND_REGISTRY: &str = include_str!("../../deployments/land-registry.json");

/// Artifacts matching the constructors of the land registry contracts
fn land_registry() -> Result<ArtifactRegistry> {
    registry(vec![
        artifact(
            "Time",
            &["address", "uint256", "string", "string", "uint8", "string", "uint256"],
            ROLE_METHODS,
        )?,
        artifact(
            "LandType",
            &["address", "string", "string", "uint256[]", "uint256[]"],
            ROLE_METHODS,
        )?,
        artifact("Lands", &["address", "string", "string", "string[]", "uint256[]"], ROLE_METHODS)?,
        artifact("Land", &["address", "string", "string", "address", "uint256"], ROLE_METHODS)?,
        artifact("QuadKey", &["address", "string", "string", "address", "string"], ROLE_METHODS)?,
        artifact(
            "Manager",
            &["address", "address", "address", "address", "uint256", "uint256", "uint256"],
            &[],
        )?,
    ])
}

#[test]
fn test_environments() -> Result<()> {
    let plan: PlanFile = serde_json::from_str(LAND_REGISTRY)?;

    let development = plan.materialize("development", None)?;
    let mainnet = plan.materialize("mainnet", None)?;

    assert_eq!(development.failure_policy, FailurePolicy::BestEffort);
    assert_eq!(mainnet.failure_policy, FailurePolicy::Abort);
    assert_eq!(mainnet.action_policy, ActionPolicy::AbortRemaining);

    let creator = &mainnet.plan.steps()[0].arguments[0];
    assert_eq!(
        creator,
        &ArgumentSpec::Literal(LiteralValue::Address(address!(
            "743daf3b561f35bfc21b239d336c2d24581a16b4"
        )))
    );
    let names: Vec<&str> = mainnet.plan.steps().iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["Time", "LandType", "Lands", "Land", "QuadKey", "Manager"]);

    Ok(())
}

#[test]
fn test_dry_run() -> Result<()> {
    let plan: PlanFile = serde_json::from_str(LAND_REGISTRY)?;
    let loaded = plan.materialize("mainnet", None)?;

    let results = dry_run(&land_registry()?, &loaded.plan);

    assert_eq!(results.len(), 6);
    for result in results {
        assert!(result.outcome.is_ok(), "{}: {:?}", result.step, result.outcome);
    }

    Ok(())
}

#[tokio::test]
async fn test_full_migration() -> Result<()> {
    let plan: PlanFile = serde_json::from_str(LAND_REGISTRY)?;
    let loaded = plan.materialize("development", None)?;
    let registry = land_registry()?;
    let network = MockNetwork::new();

    let report = Orchestrator::new(
        &registry,
        &network,
        config(loaded.failure_policy, loaded.action_policy),
    )
    .run(&loaded.plan)
    .await;

    assert_eq!(report.status, RunStatus::AllSucceeded);
    assert_eq!(report.failed_actions(), 0);
    assert_eq!(report.ledger.len(), 6);
    // addMinter and addPauser on Time, then addPauser on four contracts
    let calls = network.calls();
    assert_eq!(calls.len(), 6);
    assert!(calls.iter().all(|(_, calldata)| calldata.ends_with(&address_word(MOCK_SENDER))));

    // The manager is created with the addresses of the contracts it manages
    let manager = network.creations().pop().expect("manager created");
    let args = &manager[manager.len() - 7 * 32..];
    for (i, step) in ["Time", "LandType", "Land"].iter().enumerate() {
        let deployed = report.ledger.get(step).expect("dependency deployed");
        assert_eq!(&args[(i + 1) * 32..(i + 2) * 32], &address_word(deployed));
    }

    Ok(())
}
