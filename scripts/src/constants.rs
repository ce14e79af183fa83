//! Constants used in the migration scripts

/// The RPC URL used when none is given, the default Anvil / Ganache endpoint
pub const DEFAULT_RPC_URL: &str = "http://localhost:8545";

/// The default path of the deployments manifest
pub const DEFAULT_DEPLOYMENTS_PATH: &str = "deployments.json";

/// The deployments key in the `deployments.json` file
pub const DEPLOYMENTS_KEY: &str = "deployments";

/// How long to wait for a transaction to be included before giving up
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 120;

/// How many times a transport failure is retried before surfacing
pub const DEFAULT_CONNECTIVITY_RETRIES: u32 = 3;

/// The delay before the first retry of a transport failure,
/// doubled on every subsequent retry
pub const INITIAL_RETRY_BACKOFF_MS: u64 = 500;

/// The longest delay between two retries of a transport failure
pub const MAX_RETRY_BACKOFF_MS: u64 = 30_000;

/// The interval at which transaction receipts are polled
pub const RECEIPT_POLL_INTERVAL_MS: u64 = 250;

/// The extension of a JSON compilation artifact (Truffle, Hardhat, Foundry)
pub const JSON_EXTENSION: &str = "json";

/// The extension of a standalone ABI file, as emitted by `solc --abi`
pub const ABI_EXTENSION: &str = "abi";

/// The extension of a standalone bytecode file, as emitted by `solc --bin`
pub const BIN_EXTENSION: &str = "bin";

/// The hex prefix stripped from bytecode strings
pub const HEX_PREFIX: &str = "0x";

/// The marker solc leaves in bytecode for unlinked library addresses
pub const UNLINKED_LIBRARY_MARKER: &str = "__";

/// The file stem suffix of Hardhat debug files written next to each artifact
pub const DEBUG_ARTIFACT_SUFFIX: &str = ".dbg";

/// The directory Hardhat and Foundry write full compiler input and output to
pub const BUILD_INFO_DIR: &str = "build-info";
