//! Local backup errors

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Disk-full codes reported by the OS: `ENOSPC`
#[cfg(unix)]
const DISK_FULL_CODES: &[i32] = &[28];
/// `ERROR_HANDLE_DISK_FULL`, `ERROR_DISK_FULL`
#[cfg(windows)]
const DISK_FULL_CODES: &[i32] = &[39, 112];
#[cfg(not(any(unix, windows)))]
const DISK_FULL_CODES: &[i32] = &[];

/// Why a backup write failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteCause {
    PermissionDenied,
    DiskFull,
    Other,
}

impl WriteCause {
    fn of(error: &io::Error) -> Self {
        if error.kind() == io::ErrorKind::PermissionDenied {
            WriteCause::PermissionDenied
        } else if error
            .raw_os_error()
            .is_some_and(|code| DISK_FULL_CODES.contains(&code))
        {
            WriteCause::DiskFull
        } else {
            WriteCause::Other
        }
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Cannot write local backup '{path}': {source}")]
    Write {
        path: PathBuf,
        cause: WriteCause,
        #[source]
        source: io::Error,
    },

    #[error("Cannot read local backup '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The backup file exists but does not decode
    #[error("Local backup '{path}' is corrupt: {details}")]
    Corrupt { path: PathBuf, details: String },

    #[error("Failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StorageError {
    /// Wrap a failed write, classifying the cause
    pub fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StorageError::Write {
            path: path.into(),
            cause: WriteCause::of(&source),
            source,
        }
    }

    /// What the user can do about it, when there is something
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            StorageError::Write {
                cause: WriteCause::DiskFull,
                ..
            } => Some("Free up disk space, then run `cadence sync`"),
            StorageError::Write {
                cause: WriteCause::PermissionDenied,
                ..
            } => Some("Check permissions on the Cadence data directory"),
            StorageError::Corrupt { .. } => Some("The next save replaces the backup"),
            _ => None,
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_write() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err = StorageError::write("/test/path", io_err);

        assert!(matches!(
            err,
            StorageError::Write {
                cause: WriteCause::PermissionDenied,
                ..
            }
        ));
        assert!(err.recovery_suggestion().unwrap().contains("permissions"));
    }

    #[cfg(unix)]
    #[test]
    fn test_disk_full_write() {
        let err = StorageError::write("/full/disk", io::Error::from_raw_os_error(28));

        assert!(matches!(
            err,
            StorageError::Write {
                cause: WriteCause::DiskFull,
                ..
            }
        ));
        assert!(err.recovery_suggestion().unwrap().contains("disk space"));
    }

    #[test]
    fn test_other_write_has_no_suggestion() {
        // Message text alone does not make it a disk-full error
        let io_err = io::Error::new(io::ErrorKind::Other, "No space left on device");
        let err = StorageError::write("/busy", io_err);

        assert!(matches!(
            err,
            StorageError::Write {
                cause: WriteCause::Other,
                ..
            }
        ));
        assert!(err.recovery_suggestion().is_none());
        assert!(err.to_string().contains("/busy"));
    }

    #[test]
    fn test_corrupt_display() {
        let err = StorageError::Corrupt {
            path: PathBuf::from("/data/snapshots/abc.json"),
            details: "expected value at line 1".to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("is corrupt"));
        assert!(msg.contains("abc.json"));
        assert!(err.recovery_suggestion().is_some());
    }
}
