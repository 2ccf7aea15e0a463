use thiserror::Error;

/// Coarse failure category. Callers decide whether to retry from this alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    LockTimeout,
    StorageFailure,
    ValidationFailure,
}

impl ErrorKind {
    /// Only lock timeouts can succeed on an unchanged retry.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::LockTimeout)
    }
}

#[derive(Debug, Error)]
pub enum AgoraError {
    #[error("room '{0}' not found")]
    RoomNotFound(String),

    #[error("agent '{agent}' has no presence record in room '{room}'")]
    AgentNotFound { room: String, agent: String },

    #[error("room '{0}' already exists")]
    RoomExists(String),

    #[error("agent '{agent}' was never present in room '{room}'")]
    AgentNotPresent { room: String, agent: String },

    #[error("agent '{agent}' is not online in room '{room}'")]
    AgentOffline { room: String, agent: String },

    #[error("timed out after {waited_ms}ms waiting for lock on {path}")]
    LockTimeout { path: String, waited_ms: u64 },

    #[error("corrupt document '{0}': {1}")]
    Corrupt(String, String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AgoraError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RoomNotFound(_) | Self::AgentNotFound { .. } => ErrorKind::NotFound,
            Self::RoomExists(_) | Self::AgentNotPresent { .. } | Self::AgentOffline { .. } => {
                ErrorKind::Conflict
            }
            Self::LockTimeout { .. } => ErrorKind::LockTimeout,
            Self::Corrupt(_, _) | Self::Io(_) | Self::Json(_) => ErrorKind::StorageFailure,
            Self::Validation(_) => ErrorKind::ValidationFailure,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::RoomNotFound(_) => "room_not_found",
            Self::AgentNotFound { .. } => "agent_not_found",
            Self::RoomExists(_) => "room_exists",
            Self::AgentNotPresent { .. } => "agent_not_present",
            Self::AgentOffline { .. } => "agent_offline",
            Self::LockTimeout { .. } => "lock_timeout",
            Self::Corrupt(_, _) => "corrupt_document",
            Self::Validation(_) => "validation_failed",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, AgoraError>;
