//! Constants shared by the plan types

/// The separator between an artifact's name and its version, e.g. `Time@2`
pub const ARTIFACT_VERSION_SEPARATOR: char = '@';

/// The prefix of a hex-encoded number literal
pub const HEX_PREFIX: &str = "0x";
