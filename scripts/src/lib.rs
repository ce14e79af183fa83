//! Scripts for migrating a set of interdependent contracts onto a chain:
//! deploying each in order, wiring the addresses of earlier deployments
//! into later ones, and configuring each contract once it is live.

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

pub mod artifacts;
pub mod cli;
mod commands;
pub mod config;
pub mod constants;
pub mod errors;
pub mod executor;
pub mod ledger;
pub mod manifest;
#[cfg(any(test, feature = "test-helpers"))]
pub mod mock;
pub mod network;
pub mod pipeline;
pub mod post_deploy;
pub mod resolver;
pub mod utils;
