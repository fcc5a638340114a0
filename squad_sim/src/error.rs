// Errors at the persistence and configuration boundary.
//
// Nothing inside a tick returns `SimError`: invalid commands are filtered,
// unreachable targets are `None`, empty inventory is a no-op. These errors
// only come out of the functions that parse external data (config JSON,
// snapshots, replay files) or that a host calls in the wrong mode.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("failed to (de)serialize JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid map definition: {reason}")]
    InvalidMap { reason: String },

    #[error("invalid game config: {reason}")]
    InvalidConfig { reason: String },

    #[error("operation not supported in replay mode")]
    UnsupportedInReplay,

    #[error("operation only supported in replay mode")]
    ReplayOnly,
}
