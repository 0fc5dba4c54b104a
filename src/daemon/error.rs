use std::fmt;

/// Typed failures of the tracking core. Everything else travels as a plain
/// [anyhow::Error]; these exist so that callers can react to them, for
/// example the CLI turning a conflict into a readable message.
#[derive(Debug)]
pub enum TrackError {
    /// A session start was attempted while another entry is still active.
    Conflict { active_id: String },
    /// The referenced entry does not exist or is not the active one.
    NotFound { id: String },
    /// The OS refused a sampling call. Latched until the user acknowledges
    /// it, time and retries never clear it.
    PermissionDenied { detail: String },
}

impl fmt::Display for TrackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackError::Conflict { active_id } => {
                write!(f, "a session is already active ({active_id})")
            }
            TrackError::NotFound { id } => write!(f, "no active session with id {id}"),
            TrackError::PermissionDenied { detail } => {
                write!(f, "sampling permission denied: {detail}")
            }
        }
    }
}

impl std::error::Error for TrackError {}
