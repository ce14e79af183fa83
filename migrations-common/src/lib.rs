//! Common types describing a contract migration plan, shared between the
//! plan loader, the deployment pipeline, and tests

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

pub mod constants;
pub mod custom_serde;
pub mod types;
