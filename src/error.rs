//! The closed set of status codes the engine can report.
//!
//! Mirrors the thread-local "last error" slot of the original design as an
//! explicit return value: every fallible engine operation returns
//! `Result<T, StatusCode>` instead of stashing an error behind the call.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Convenient result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, StatusCode>;

/// Status codes returned by engine operations and copied verbatim into
/// reply payloads at the dispatch boundary.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
pub enum StatusCode {
    /// Open on a missing key, or get on a missing value.
    #[error("object name not found")]
    ObjectNameNotFound,
    /// Create found an existing key at the requested path (non-fatal, `created=0`).
    #[error("object name collision")]
    ObjectNameCollision,
    /// A path began with a leading backslash.
    #[error("object path invalid")]
    ObjectPathInvalid,
    /// A path exceeded the maximum length for its kind.
    #[error("object name invalid")]
    ObjectNameInvalid,
    /// A path segment, value name, or request shape was malformed.
    #[error("invalid parameter")]
    InvalidParameter,
    /// A value name or symlink-hop count exceeded its limit.
    #[error("name too long")]
    NameTooLong,
    /// A non-volatile child was requested under a volatile parent.
    #[error("child must be volatile")]
    ChildMustBeVolatile,
    /// Delete on a non-empty key, or a write to a symlink's non-link value.
    #[error("access denied")]
    AccessDenied,
    /// Operation on a tombstoned key.
    #[error("key deleted")]
    KeyDeleted,
    /// Enumeration index was out of range.
    #[error("no more entries")]
    NoMoreEntries,
    /// Allocation failure; caller may retry.
    #[error("not enough memory")]
    NoMemory,
    /// The load parser rejected the file's header or architecture tag.
    #[error("not a registry file")]
    NotRegistryFile,
    /// A privileged command was issued without the matching privilege.
    #[error("privilege not held")]
    PrivilegeNotHeld,
    /// A notification was successfully armed.
    #[error("pending")]
    Pending,
}
