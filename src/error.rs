//! Error taxonomy shared across the filesystem core.
//!
//! Low-level components return structured `FsError` values; the operation
//! handlers translate them to POSIX codes at the boundary via [`FsError::errno`].

use std::fmt;

use thiserror::Error;

/// Classification of a failed remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// 401/403 — the token was rejected.
    Auth,
    /// 404 — the resource does not exist on the server.
    NotFound,
    /// The server reported `nameAlreadyExists`.
    NameConflict,
    /// Any other server-side failure, including 5xx.
    Server,
    /// Transport failure or request timeout.
    Network,
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RemoteErrorKind::Auth => "auth",
            RemoteErrorKind::NotFound => "not_found",
            RemoteErrorKind::NameConflict => "name_conflict",
            RemoteErrorKind::Server => "server",
            RemoteErrorKind::Network => "network",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum FsError {
    #[error("{0} does not exist on the server or in the local cache")]
    NotFound(String),

    #[error("{0} requires a signed-in account")]
    NeedCredential(String),

    #[error("remote call failed ({kind}): {message}")]
    Remote {
        kind: RemoteErrorKind,
        message: String,
    },

    #[error("{0} has not been assigned a server id yet")]
    LocalOnlyId(String),

    #[error("local i/o error: {0}")]
    LocalIo(String),

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("cache store error: {0}")]
    Store(#[from] sled::Error),

    #[error("metadata serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl FsError {
    pub fn remote(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        FsError::Remote {
            kind,
            message: message.into(),
        }
    }

    /// The server's brief post-create inconsistency window surfaces as a
    /// `resourceModified` error code; callers retry those once.
    pub fn is_resource_modified(&self) -> bool {
        matches!(self, FsError::Remote { message, .. } if message.contains("resourceModified"))
    }

    pub fn is_name_conflict(&self) -> bool {
        matches!(
            self,
            FsError::Remote {
                kind: RemoteErrorKind::NameConflict,
                ..
            }
        )
    }

    /// Translate to the POSIX code handed back to the kernel shim.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound(_) => libc::ENOENT,
            FsError::NeedCredential(_) => libc::EIO,
            FsError::Remote { kind, .. } => match kind {
                RemoteErrorKind::NotFound => libc::ENOENT,
                RemoteErrorKind::NameConflict => libc::EEXIST,
                RemoteErrorKind::Auth => libc::EIO,
                RemoteErrorKind::Server | RemoteErrorKind::Network => libc::EREMOTEIO,
            },
            FsError::LocalOnlyId(_) => libc::EBADF,
            FsError::LocalIo(_) => libc::EIO,
            FsError::Unsupported(_) => libc::ENOSYS,
            FsError::Store(_) | FsError::Serde(_) => libc::EIO,
        }
    }
}

pub type FsResult<T> = Result<T, FsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping_matches_the_posix_surface() {
        assert_eq!(FsError::NotFound("/x".into()).errno(), libc::ENOENT);
        assert_eq!(FsError::NeedCredential("/x".into()).errno(), libc::EIO);
        assert_eq!(FsError::LocalOnlyId("local-abc".into()).errno(), libc::EBADF);
        assert_eq!(FsError::Unsupported("chown").errno(), libc::ENOSYS);
        assert_eq!(
            FsError::remote(RemoteErrorKind::Server, "500").errno(),
            libc::EREMOTEIO
        );
        assert_eq!(
            FsError::remote(RemoteErrorKind::Network, "timed out").errno(),
            libc::EREMOTEIO
        );
        assert_eq!(
            FsError::remote(RemoteErrorKind::NotFound, "404").errno(),
            libc::ENOENT
        );
    }

    #[test]
    fn resource_modified_detection_scans_the_message() {
        let err = FsError::remote(
            RemoteErrorKind::Server,
            "412 Precondition Failed: resourceModified",
        );
        assert!(err.is_resource_modified());
        assert!(!FsError::remote(RemoteErrorKind::Server, "boom").is_resource_modified());
        assert!(!FsError::NotFound("/x".into()).is_resource_modified());
    }
}
