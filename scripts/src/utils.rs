//! Utilities for the migration scripts.

use std::{fs, future::Future, path::Path};

use serde_json::Value;
use tokio::time::sleep;
use tracing::warn;

use crate::{
    errors::{DeployError, ScriptError},
    executor::RetryPolicy,
};

/// Run a network operation, retrying it with exponential backoff while it
/// fails with a retryable error and retries remain.
///
/// Only errors for which [`DeployError::is_retryable`] holds are retried;
/// everything else is returned immediately.
pub async fn with_retries<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut f: F,
) -> Result<T, DeployError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DeployError>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                let delay = policy.backoff(attempt);
                attempt += 1;
                warn!(
                    "{operation} failed ({e}), retry {attempt}/{} in {delay:?}",
                    policy.max_retries
                );
                sleep(delay).await;
            }
            res => return res,
        }
    }
}

/// Read and parse a JSON file
pub fn get_json_from_file(file_path: &Path) -> Result<Value, ScriptError> {
    let contents = fs::read_to_string(file_path)
        .map_err(|e| ScriptError::ReadFile(format!("{}: {e}", file_path.display())))?;

    serde_json::from_str(&contents)
        .map_err(|e| ScriptError::Serde(format!("{}: {e}", file_path.display())))
}

/// Write a JSON value to a file, pretty-printed
pub fn write_json_to_file(file_path: &Path, value: &Value) -> Result<(), ScriptError> {
    let contents =
        serde_json::to_string_pretty(value).map_err(|e| ScriptError::Serde(e.to_string()))?;

    fs::write(file_path, contents)
        .map_err(|e| ScriptError::WriteFile(format!("{}: {e}", file_path.display())))
}
