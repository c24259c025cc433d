use serde::{Deserialize, Serialize};

/// Lifecycle of a resumable chunked upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadState {
    /// Chunks are still arriving
    Collecting,
    /// Every declared chunk has been staged
    Complete,
    /// Reassembled into a blob (terminal)
    Merged,
    /// Cancelled before completion (terminal)
    Aborted,
}

impl UploadState {
    /// Check if transition is valid
    pub fn can_transition_to(&self, target: UploadState) -> bool {
        matches!(
            (self, target),
            (UploadState::Collecting, UploadState::Complete)
                | (UploadState::Collecting, UploadState::Aborted)
                | (UploadState::Complete, UploadState::Merged)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadState::Merged | UploadState::Aborted)
    }
}

impl std::fmt::Display for UploadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadState::Collecting => write!(f, "COLLECTING"),
            UploadState::Complete => write!(f, "COMPLETE"),
            UploadState::Merged => write!(f, "MERGED"),
            UploadState::Aborted => write!(f, "ABORTED"),
        }
    }
}

impl std::str::FromStr for UploadState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "COLLECTING" => Ok(UploadState::Collecting),
            "COMPLETE" => Ok(UploadState::Complete),
            "MERGED" => Ok(UploadState::Merged),
            "ABORTED" => Ok(UploadState::Aborted),
            _ => Err(format!("Invalid upload state: {}", s)),
        }
    }
}
