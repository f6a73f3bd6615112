/// Application name, used for data directories and lock metadata.
pub const APP_NAME: &str = "sitestack";

/// Length of the truncated object hashes used for manifests and snapshots.
pub const OBJ_HASH_PREFIX_LEN: usize = 20;

/// Default stack file evaluated by the CLI.
pub const DEFAULT_STACK_FILE: &str = "stack.lua";

/// Default stack name when none is supplied.
pub const DEFAULT_STACK_NAME: &str = "dev";

/// Default region for the local provider.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default account id used when composing ARNs.
pub const DEFAULT_ACCOUNT_ID: &str = "000000000000";
