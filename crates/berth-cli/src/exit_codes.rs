//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// Success - operation completed without errors
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Validation error - invalid names, values or overrides
pub const VALIDATION_ERROR: i32 = 2;

/// Template error - chart rendering failed
pub const TEMPLATE_ERROR: i32 = 3;

/// Chart error - missing chart or invalid berth.yaml
pub const CHART_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Secret error - missing key, undecryptable or malformed secret values
pub const SECRET_ERROR: i32 = 6;

/// Registry error - image reference could not be resolved
pub const REGISTRY_ERROR: i32 = 7;

/// Deploy error - the cluster rejected the release
pub const DEPLOY_ERROR: i32 = 8;

/// Timeout - release not ready in time, or the deadline elapsed
pub const TIMEOUT_ERROR: i32 = 9;

/// Usage error - invalid arguments or options (following sysexits.h convention)
pub const USAGE_ERROR: i32 = 64;
