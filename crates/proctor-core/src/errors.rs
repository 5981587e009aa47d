/// Session-level failures surfaced to `prepare`/`start` callers.
///
/// Per-runtime liveness failures are never errors: one unresponsive runtime
/// must not abort execution on the others, so they travel as ordinary
/// `runtime:timeout` events instead.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("pool connection failed: {0}")]
    ConnectFailed(String),

    #[error("session aborted")]
    Aborted,

    #[error("pool connection closed")]
    PoolClosed,

    #[error("emit failed: {0}")]
    EmitFailed(String),
}

impl SessionError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::ConnectFailed(_) => "connect_failed",
            Self::Aborted => "aborted",
            Self::PoolClosed => "pool_closed",
            Self::EmitFailed(_) => "emit_failed",
        }
    }
}
