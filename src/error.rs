//! Stable error codes for the mirror run.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Object store error: {0}")]
    Store(String),

    #[error("Unable to open directory {path}: {reason}")]
    DirectoryAccess { path: String, reason: String },

    #[error("Upload failed for [{key}]: {reason}")]
    Upload { key: String, reason: String },

    #[error("Delete failed for [{key}]: {reason}")]
    Delete { key: String, reason: String },

    #[error("Invalid phase transition: {0}")]
    InvalidPhase(String),

    #[error("{0}")]
    Io(String),
}

impl MirrorError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIG_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Store(_) => "STORE_ERROR",
            Self::DirectoryAccess { .. } => "DIRECTORY_ACCESS",
            Self::Upload { .. } => "UPLOAD_FAILED",
            Self::Delete { .. } => "DELETE_FAILED",
            Self::InvalidPhase(_) => "INVALID_PHASE",
            Self::Io(_) => "IO_ERROR",
        }
    }

    /// Process exit code when this error ends the run.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Upload { .. } | Self::Delete { .. } => 2,
            _ => 1,
        }
    }

    pub fn to_serde(&self) -> MirrorErrorDto {
        MirrorErrorDto {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

impl From<std::io::Error> for MirrorError {
    fn from(e: std::io::Error) -> Self {
        MirrorError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for MirrorError {
    fn from(e: serde_json::Error) -> Self {
        MirrorError::Configuration(format!("Invalid config file: {}", e))
    }
}

impl serde::Serialize for MirrorError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_serde().serialize(serializer)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MirrorErrorDto {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_item_failures_exit_with_two() {
        let err = MirrorError::Upload {
            key: "a.txt".to_string(),
            reason: "timeout".to_string(),
        };
        assert_eq!(err.exit_code(), 2);
        assert_eq!(err.code(), "UPLOAD_FAILED");
    }

    #[test]
    fn fatal_errors_exit_with_one() {
        assert_eq!(MirrorError::Configuration("x".into()).exit_code(), 1);
        assert_eq!(MirrorError::NotFound("bucket".into()).exit_code(), 1);
        assert_eq!(MirrorError::Store("denied".into()).exit_code(), 1);
    }

    #[test]
    fn serializes_as_code_and_message() {
        let json = serde_json::to_value(MirrorError::NotFound("bucket b".into())).unwrap();
        assert_eq!(json["code"], "NOT_FOUND");
        assert_eq!(json["message"], "Not found: bucket b");
    }
}
