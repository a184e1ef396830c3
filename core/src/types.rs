//! Shared primitive types used across the engine.

/// Row id of an account. Review passes process accounts in ascending id.
pub type AccountId = i64;

/// Seconds since the unix epoch.
pub type UnixTime = i64;

/// Traffic volume in bytes.
pub type Bytes = i64;
